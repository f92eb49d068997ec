use chrono::NaiveDate;
use rand::Rng;
use tracing::{info, warn};

use crate::error::{BracketError, BracketResult};
use crate::history::SessionState;
use crate::parsing::parse_player_list;
use crate::seeding::place_players;
use crate::structure::{build_structure, seat_players};
use crate::types::BracketKind;

/// A freshly created tournament, ready to be stored.
#[derive(Clone, Debug)]
pub struct Tournament {
  pub name: String,
  pub date: NaiveDate,
  pub kind: BracketKind,
  pub session: SessionState,
  pub players: usize,
  pub size: usize,
  pub byes: usize,
  pub warnings: Vec<String>,
}

impl Tournament {
  /// Parse the entry list, place everyone, build the bracket and settle
  /// every automatic result.
  pub fn create<R: Rng + ?Sized>(
    name: &str,
    date: NaiveDate,
    kind: BracketKind,
    raw_players: &str,
    rng: &mut R,
  ) -> BracketResult<Tournament> {
    let name = name.trim();
    if name.is_empty() {
      return Err(BracketError::InvalidInput("tournament name is required".to_string()));
    }

    let parsed = parse_player_list(raw_players);
    for warning in &parsed.warnings {
      warn!(tournament = name, "{warning}");
    }
    let players = parsed.total();
    if players < 2 {
      return Err(BracketError::InvalidInput(format!(
        "at least 2 players are required, got {players}"
      )));
    }

    let placement = place_players(&parsed.seeded, &parsed.unseeded, rng);
    let mut structure = build_structure(kind, players)?;
    seat_players(&mut structure, &placement.slots)?;
    let session = SessionState::new(structure)?;

    info!(
      tournament = name,
      %kind,
      players,
      size = placement.size,
      byes = placement.byes,
      "tournament created"
    );
    Ok(Tournament {
      name: name.to_string(),
      date,
      kind,
      session,
      players,
      size: placement.size,
      byes: placement.byes,
      warnings: parsed.warnings,
    })
  }
}
