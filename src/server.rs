use crate::config::now_ms;
use crate::error::BracketError;
use crate::history::HistoryState;
use crate::store::{TournamentRecord, TournamentStore, TournamentSummary};
use crate::tournament::Tournament;
use crate::types::*;

use axum::{
    extract::{Path as AxumPath, State as AxumState},
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::{get, get_service, post},
    Json, Router,
};
use chrono::{Local, NaiveDate};
use rand::SeedableRng;
use rand_chacha::ChaCha8Rng;
use serde::{Deserialize, Serialize};
use serde_json::json;
use std::{
    collections::HashMap,
    path::PathBuf,
    sync::{Arc, Mutex},
};
use tokio::net::TcpListener;
use tower_http::services::ServeDir;
use tracing::{error, info};

// ── State ──────────────────────────────────────────────────────────────

#[derive(Clone)]
pub struct AppState {
    pub store: Arc<TournamentStore>,
    pub tournaments: SharedTournaments,
    pub rng: SharedRng,
    pub history_limit: usize,
}

impl AppState {
    pub fn new(store: TournamentStore, history_limit: usize, shuffle_seed: Option<u64>) -> Self {
        let rng = match shuffle_seed {
            Some(seed) => ChaCha8Rng::seed_from_u64(seed),
            None => ChaCha8Rng::from_entropy(),
        };
        Self {
            store: Arc::new(store),
            tournaments: Arc::new(Mutex::new(HashMap::new())),
            rng: Arc::new(Mutex::new(rng)),
            history_limit,
        }
    }
}

// ── Errors ─────────────────────────────────────────────────────────────

#[derive(Debug)]
pub struct ApiError {
    status: StatusCode,
    message: String,
}

impl ApiError {
    fn new(status: StatusCode, message: impl Into<String>) -> Self {
        Self { status, message: message.into() }
    }

    fn internal(message: String) -> Self {
        error!("{message}");
        Self::new(StatusCode::INTERNAL_SERVER_ERROR, message)
    }

    fn not_found(id: &str) -> Self {
        Self::new(StatusCode::NOT_FOUND, format!("tournament {id} not found"))
    }

    pub fn status(&self) -> StatusCode {
        self.status
    }
}

impl From<BracketError> for ApiError {
    fn from(err: BracketError) -> Self {
        let status = match &err {
            BracketError::InvalidInput(_) => StatusCode::BAD_REQUEST,
            BracketError::OutcomeLocked { .. } => StatusCode::CONFLICT,
            _ => StatusCode::INTERNAL_SERVER_ERROR,
        };
        if status.is_server_error() {
            error!("bracket error: {err}");
        }
        Self::new(status, err.to_string())
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        (self.status, Json(json!({ "message": self.message }))).into_response()
    }
}

// ── Payloads ───────────────────────────────────────────────────────────

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateTournamentRequest {
    pub name: String,
    #[serde(default)]
    pub date: Option<NaiveDate>,
    #[serde(rename = "type")]
    pub kind: BracketKind,
    pub players: String,
}

#[derive(Debug, Serialize)]
pub struct CreateTournamentResponse {
    pub id: String,
    pub warnings: Vec<String>,
}

/// Score edit for one match; an absent side is left as it is.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ScoreUpdateRequest {
    pub match_id: MatchId,
    #[serde(default)]
    pub p1: Option<String>,
    #[serde(default)]
    pub p2: Option<String>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TournamentView {
    pub public_id: String,
    pub name: String,
    pub tournament_date: NaiveDate,
    #[serde(rename = "type")]
    pub kind: BracketKind,
    pub bracket_data: BracketStructure,
    #[serde(flatten)]
    pub history: HistoryState,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub changed: Option<bool>,
}

impl TournamentView {
    fn of(record: &TournamentRecord, changed: Option<bool>) -> Self {
        Self {
            public_id: record.public_id.clone(),
            name: record.name.clone(),
            tournament_date: record.tournament_date,
            kind: record.kind,
            bracket_data: record.bracket_data.current().clone(),
            history: record.bracket_data.history_state(),
            changed,
        }
    }
}

// ── Session access ─────────────────────────────────────────────────────

/// Run `f` on a copy of the live tournament, loading it on first use.
/// `f` reports whether it changed the record; a changed copy replaces the
/// cached one only once it is saved.
fn with_tournament<T>(
    state: &AppState,
    id: &str,
    f: impl FnOnce(&mut TournamentRecord) -> Result<(T, bool), ApiError>,
) -> Result<T, ApiError> {
    let mut cache = state.tournaments.lock().unwrap_or_else(|e| e.into_inner());
    if !cache.contains_key(id) {
        let mut record = state
            .store
            .get(id)
            .map_err(ApiError::internal)?
            .ok_or_else(|| ApiError::not_found(id))?;
        record.bracket_data.set_history_limit(state.history_limit);
        cache.insert(id.to_string(), record);
    }
    let mut next = cache.get(id).cloned().ok_or_else(|| ApiError::not_found(id))?;
    let (value, dirty) = f(&mut next)?;
    if dirty {
        next.updated_at_ms = now_ms();
        state.store.save(&next).map_err(ApiError::internal)?;
        cache.insert(id.to_string(), next);
    }
    Ok(value)
}

// ── Handlers ───────────────────────────────────────────────────────────

async fn list_tournaments(
    AxumState(state): AxumState<AppState>,
) -> Result<Json<Vec<TournamentSummary>>, ApiError> {
    state.store.list().map(Json).map_err(ApiError::internal)
}

async fn create_tournament(
    AxumState(state): AxumState<AppState>,
    Json(req): Json<CreateTournamentRequest>,
) -> Result<(StatusCode, Json<CreateTournamentResponse>), ApiError> {
    let date = req.date.unwrap_or_else(|| Local::now().date_naive());
    let (mut record, warnings) = {
        let mut rng = state.rng.lock().unwrap_or_else(|e| e.into_inner());
        let tournament = Tournament::create(&req.name, date, req.kind, &req.players, &mut *rng)?;
        let warnings = tournament.warnings.clone();
        let record = state.store.create(tournament, &mut *rng).map_err(ApiError::internal)?;
        (record, warnings)
    };
    record.bracket_data.set_history_limit(state.history_limit);

    let response = CreateTournamentResponse {
        id: record.public_id.clone(),
        warnings,
    };
    state
        .tournaments
        .lock()
        .unwrap_or_else(|e| e.into_inner())
        .insert(record.public_id.clone(), record);
    Ok((StatusCode::CREATED, Json(response)))
}

async fn get_tournament(
    AxumState(state): AxumState<AppState>,
    AxumPath(id): AxumPath<String>,
) -> Result<Json<TournamentView>, ApiError> {
    with_tournament(&state, &id, |record| Ok((TournamentView::of(record, None), false))).map(Json)
}

async fn delete_tournament(
    AxumState(state): AxumState<AppState>,
    AxumPath(id): AxumPath<String>,
) -> Result<StatusCode, ApiError> {
    let mut cache = state.tournaments.lock().unwrap_or_else(|e| e.into_inner());
    cache.remove(&id);
    if state.store.delete(&id).map_err(ApiError::internal)? {
        Ok(StatusCode::NO_CONTENT)
    } else {
        Err(ApiError::not_found(&id))
    }
}

async fn update_scores(
    AxumState(state): AxumState<AppState>,
    AxumPath(id): AxumPath<String>,
    Json(req): Json<ScoreUpdateRequest>,
) -> Result<Json<TournamentView>, ApiError> {
    let edits: Vec<(SlotIndex, Option<Score>)> = [(SlotIndex::P1, &req.p1), (SlotIndex::P2, &req.p2)]
        .into_iter()
        .filter_map(|(slot, raw)| raw.as_deref().map(|raw| (slot, Score::parse(raw))))
        .collect();
    if edits.is_empty() {
        return Err(ApiError::new(StatusCode::BAD_REQUEST, "no score given"));
    }
    with_tournament(&state, &id, |record| {
        let changed = record.bracket_data.update_scores(req.match_id, &edits)?;
        Ok((TournamentView::of(record, Some(changed)), changed))
    })
    .map(Json)
}

async fn undo(
    AxumState(state): AxumState<AppState>,
    AxumPath(id): AxumPath<String>,
) -> Result<Json<TournamentView>, ApiError> {
    with_tournament(&state, &id, |record| {
        let changed = record.bracket_data.undo();
        Ok((TournamentView::of(record, Some(changed)), changed))
    })
    .map(Json)
}

async fn redo(
    AxumState(state): AxumState<AppState>,
    AxumPath(id): AxumPath<String>,
) -> Result<Json<TournamentView>, ApiError> {
    with_tournament(&state, &id, |record| {
        let changed = record.bracket_data.redo();
        Ok((TournamentView::of(record, Some(changed)), changed))
    })
    .map(Json)
}

// ── Router ─────────────────────────────────────────────────────────────

pub fn router(state: AppState, static_dir: Option<PathBuf>) -> Router {
    let api = Router::new()
        .route("/api/tournaments", get(list_tournaments).post(create_tournament))
        .route("/api/tournaments/:id", get(get_tournament).delete(delete_tournament))
        .route("/api/tournaments/:id/scores", post(update_scores))
        .route("/api/tournaments/:id/undo", post(undo))
        .route("/api/tournaments/:id/redo", post(redo))
        .with_state(state);
    match static_dir {
        Some(dir) => api.fallback_service(get_service(ServeDir::new(dir))),
        None => api,
    }
}

pub async fn serve(state: AppState, static_dir: Option<PathBuf>, addr: &str) -> Result<(), String> {
    let app = router(state, static_dir);
    let listener = TcpListener::bind(addr)
        .await
        .map_err(|e| format!("bind {addr}: {e}"))?;
    info!("bracket server listening at http://{addr}/");
    axum::serve(listener, app)
        .await
        .map_err(|e| format!("server error: {e}"))
}
