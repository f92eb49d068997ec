pub mod types;
pub mod error;
pub mod config;
pub mod seed_math;
pub mod parsing;
pub mod seeding;
pub mod structure;
pub mod resolution;
pub mod history;
pub mod tournament;
pub mod store;
pub mod server;

pub use error::{BracketError, BracketResult};
pub use history::{HistoryState, SessionState};
pub use resolution::{stabilize, StabilizeReport};
pub use structure::build_structure;
pub use tournament::Tournament;
pub use types::{BracketKind, BracketStructure, Match, MatchSlot, Player, Score, SlotIndex};

use config::*;
use server::AppState;
use store::TournamentStore;

use std::fs;
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

// ── Entry point ────────────────────────────────────────────────────────

pub async fn run() {
    load_env_file();

    let config = match load_config() {
        Ok(config) => config,
        Err(e) => {
            eprintln!("{e}");
            return;
        }
    };

    // Initialize tracing with rolling file output
    let logs_dir = resolve_path(&config.log_dir);
    fs::create_dir_all(&logs_dir).ok();
    let file_appender = tracing_appender::rolling::daily(&logs_dir, "bracket.log");
    let (non_blocking, _guard) = tracing_appender::non_blocking(file_appender);
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with_writer(non_blocking)
        .with_ansi(false)
        .init();
    info!("Bracket engine starting");
    log_config_warnings(&config);

    let store = match TournamentStore::open(&resolve_path(&config.data_dir)) {
        Ok(store) => store,
        Err(e) => {
            error!("{e}");
            return;
        }
    };
    info!("tournaments stored in {}", store.dir().display());

    let state = AppState::new(store, config.history_limit, config.shuffle_seed);
    if let Err(e) = server::serve(state, static_dir(&config), &config.bind_addr).await {
        error!("{e}");
    }
}
