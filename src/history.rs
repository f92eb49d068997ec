use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::error::BracketResult;
use crate::resolution::{retract_outcome, stabilize, StabilizeReport};
use crate::types::{BracketStructure, MatchId, Score, SlotIndex, DEFAULT_HISTORY_LIMIT};

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct HistoryState {
  pub can_undo: bool,
  pub can_redo: bool,
}

/// One tournament's bracket plus its undo/redo stacks. Snapshots share
/// untouched matches with the current state.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionState {
  current: BracketStructure,
  #[serde(default)]
  undo: Vec<BracketStructure>,
  #[serde(default)]
  redo: Vec<BracketStructure>,
  #[serde(skip, default = "default_history_limit")]
  history_limit: usize,
}

fn default_history_limit() -> usize {
  DEFAULT_HISTORY_LIMIT
}

impl SessionState {
  /// Start a session on `structure`, stabilized.
  pub fn new(structure: BracketStructure) -> BracketResult<Self> {
    let mut session = SessionState {
      current: structure,
      undo: Vec::new(),
      redo: Vec::new(),
      history_limit: DEFAULT_HISTORY_LIMIT,
    };
    stabilize(&mut session.current)?;
    Ok(session)
  }

  pub fn with_history_limit(mut self, limit: usize) -> Self {
    self.set_history_limit(limit);
    self
  }

  pub fn set_history_limit(&mut self, limit: usize) {
    self.history_limit = limit.max(1);
    self.trim_undo();
  }

  /// Replace the bracket and drop all history.
  pub fn initialize(&mut self, structure: BracketStructure) -> BracketResult<StabilizeReport> {
    let mut next = structure;
    let report = stabilize(&mut next)?;
    self.current = next;
    self.undo.clear();
    self.redo.clear();
    Ok(report)
  }

  pub fn current(&self) -> &BracketStructure {
    &self.current
  }

  pub fn history_state(&self) -> HistoryState {
    HistoryState {
      can_undo: !self.undo.is_empty(),
      can_redo: !self.redo.is_empty(),
    }
  }

  pub fn undo_depth(&self) -> usize {
    self.undo.len()
  }

  /// Set or clear (`None`) one slot's score. Returns `Ok(false)` without
  /// touching anything when the match or player does not exist.
  pub fn update_score(&mut self, match_id: MatchId, slot: SlotIndex, score: Option<Score>) -> BracketResult<bool> {
    self.update_scores(match_id, &[(slot, score)])
  }

  /// Apply several slot edits to one match as a single undoable step.
  ///
  /// The edit is all-or-nothing: on error the session is left as it was.
  pub fn update_scores(&mut self, match_id: MatchId, edits: &[(SlotIndex, Option<Score>)]) -> BracketResult<bool> {
    let Some(target) = self.current.find(match_id) else {
      warn!(match_id, "score update for unknown match ignored");
      return Ok(false);
    };
    if target.is_champion_box || target.is_skipped {
      warn!(match_id, "score update for a match that is not played ignored");
      return Ok(false);
    }
    if edits.is_empty() || edits.iter().any(|(slot, _)| !target.slot(*slot).is_occupied()) {
      warn!(match_id, "score update for a slot without a player ignored");
      return Ok(false);
    }

    let mut next = self.current.clone();
    retract_outcome(&mut next, match_id)?;
    if let Some(m) = next.find_mut(match_id) {
      for (slot, score) in edits {
        if let Some(player) = m.slot_mut(*slot).player_mut() {
          player.score = score.clone();
        }
      }
      m.is_processed = false;
    }
    let report = stabilize(&mut next)?;

    let previous = std::mem::replace(&mut self.current, next);
    self.undo.push(previous);
    self.trim_undo();
    self.redo.clear();
    debug!(match_id, processed = report.processed.len(), "score applied");
    Ok(true)
  }

  pub fn undo(&mut self) -> bool {
    let Some(previous) = self.undo.pop() else {
      return false;
    };
    let current = std::mem::replace(&mut self.current, previous);
    self.redo.push(current);
    true
  }

  pub fn redo(&mut self) -> bool {
    let Some(next) = self.redo.pop() else {
      return false;
    };
    let current = std::mem::replace(&mut self.current, next);
    self.undo.push(current);
    self.trim_undo();
    true
  }

  fn trim_undo(&mut self) {
    if self.undo.len() > self.history_limit {
      let excess = self.undo.len() - self.history_limit;
      self.undo.drain(..excess);
    }
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::error::BracketError;
  use crate::structure::{build_structure, seat_players};
  use crate::types::{BracketKind, MatchSlot, Placeholder, Player};
  use std::sync::Arc;

  fn session(names: &[&str]) -> SessionState {
    let mut structure = build_structure(BracketKind::Single, names.len()).unwrap();
    let players: Vec<Player> = names.iter().map(|name| Player::new(*name)).collect();
    seat_players(&mut structure, &players).unwrap();
    SessionState::new(structure).unwrap()
  }

  fn both(p1: &str, p2: &str) -> [(SlotIndex, Option<Score>); 2] {
    [(SlotIndex::P1, Score::parse(p1)), (SlotIndex::P2, Score::parse(p2))]
  }

  fn occupant(session: &SessionState, id: MatchId, slot: SlotIndex) -> Option<String> {
    session.current().find(id)?.slot(slot).player().map(|p| p.name.clone())
  }

  #[test]
  fn test_unknown_match_is_a_no_op() {
    let mut s = session(&["A", "B", "C", "D"]);
    let before = s.clone();
    assert!(!s.update_score(99, SlotIndex::P1, Score::parse("1")).unwrap());
    assert!(!s.update_score(3, SlotIndex::P1, Score::parse("1")).unwrap());
    assert!(!s.update_score(4, SlotIndex::P1, Score::parse("1")).unwrap());
    assert_eq!(s, before);
    assert_eq!(
      s.history_state(),
      HistoryState {
        can_undo: false,
        can_redo: false
      }
    );
  }

  #[test]
  fn test_single_slot_edits_build_up_to_a_decision() {
    let mut s = session(&["A", "B", "C", "D"]);
    assert!(s.update_score(1, SlotIndex::P1, Score::parse("2")).unwrap());
    assert!(!s.current().find(1).unwrap().is_processed);
    assert!(s.update_score(1, SlotIndex::P2, Score::parse("0")).unwrap());
    assert_eq!(occupant(&s, 3, SlotIndex::P1).as_deref(), Some("A"));
    assert_eq!(s.undo_depth(), 2);
  }

  #[test]
  fn test_undo_redo_restore_identical_states() {
    let mut s = session(&["A", "B", "C", "D"]);
    s.update_scores(1, &both("2", "1")).unwrap();
    let after_edit = s.current().clone();

    assert!(s.undo());
    assert_eq!(s.current().find(3).unwrap().p1, MatchSlot::Placeholder(Placeholder::WinnerOf(1)));
    assert_eq!(s.history_state(), HistoryState { can_undo: false, can_redo: true });

    assert!(s.redo());
    assert_eq!(s.current(), &after_edit);
    assert!(!s.redo());
  }

  #[test]
  fn test_new_edit_clears_redo() {
    let mut s = session(&["A", "B", "C", "D"]);
    s.update_scores(1, &both("2", "1")).unwrap();
    s.undo();
    assert!(s.history_state().can_redo);
    s.update_scores(2, &both("0", "3")).unwrap();
    assert!(!s.history_state().can_redo);
    assert_eq!(s.undo_depth(), 1);
  }

  #[test]
  fn test_empty_stacks_are_no_ops() {
    let mut s = session(&["A", "B"]);
    let before = s.clone();
    assert!(!s.undo());
    assert!(!s.redo());
    assert_eq!(s, before);
  }

  #[test]
  fn test_rescoring_a_decided_match_moves_the_winner() {
    let mut s = session(&["A", "B", "C", "D"]);
    s.update_scores(1, &both("2", "1")).unwrap();
    s.update_scores(1, &both("1", "2")).unwrap();
    assert_eq!(occupant(&s, 3, SlotIndex::P1).as_deref(), Some("B"));
    assert_eq!(s.current().ranking()["3rd-4th"].len(), 1);
    assert_eq!(s.current().ranking()["3rd-4th"][0].name, "A");
  }

  #[test]
  fn test_clearing_a_score_reopens_the_match() {
    let mut s = session(&["A", "B", "C", "D"]);
    s.update_scores(1, &both("2", "1")).unwrap();
    assert!(s.update_score(1, SlotIndex::P1, None).unwrap());
    assert_eq!(s.current().find(3).unwrap().p1, MatchSlot::Placeholder(Placeholder::WinnerOf(1)));
    assert!(s.current().ranking()["3rd-4th"].is_empty());
  }

  #[test]
  fn test_locked_edit_leaves_session_unchanged() {
    let mut s = session(&["A", "B", "C", "D"]);
    s.update_scores(1, &both("2", "1")).unwrap();
    s.update_scores(2, &both("2", "1")).unwrap();
    s.update_scores(3, &both("2", "1")).unwrap();
    let before = s.clone();
    assert_eq!(
      s.update_scores(1, &both("0", "2")),
      Err(BracketError::OutcomeLocked { match_id: 1, downstream: 3 })
    );
    assert_eq!(s, before);
  }

  #[test]
  fn test_snapshots_share_untouched_matches() {
    let mut s = session(&["A", "B", "C", "D", "E", "F", "G", "H"]);
    s.update_scores(1, &both("2", "1")).unwrap();
    let previous = &s.undo[0];
    let (BracketStructure::Single(old), BracketStructure::Single(new)) =
      (previous, s.current())
    else {
      panic!("expected single brackets");
    };
    assert!(Arc::ptr_eq(&old.rounds[0][3], &new.rounds[0][3]));
    assert!(!Arc::ptr_eq(&old.rounds[0][0], &new.rounds[0][0]));
  }

  #[test]
  fn test_history_limit_drops_oldest_snapshots() {
    let mut s = session(&["A", "B", "C", "D"]).with_history_limit(2);
    s.update_score(1, SlotIndex::P1, Score::parse("1")).unwrap();
    s.update_score(1, SlotIndex::P1, Score::parse("2")).unwrap();
    s.update_score(1, SlotIndex::P1, Score::parse("3")).unwrap();
    assert_eq!(s.undo_depth(), 2);
  }

  #[test]
  fn test_initialize_discards_history() {
    let mut s = session(&["A", "B", "C", "D"]);
    s.update_scores(1, &both("2", "1")).unwrap();
    let fresh = build_structure(BracketKind::Double, 4).unwrap();
    s.initialize(fresh).unwrap();
    assert_eq!(s.history_state(), HistoryState { can_undo: false, can_redo: false });
    assert_eq!(s.current().kind(), BracketKind::Double);
  }

  #[test]
  fn test_session_round_trips_through_json() {
    let mut s = session(&["A", "B", "C", "D"]);
    s.update_scores(1, &both("2", "1")).unwrap();
    s.undo();
    let json = serde_json::to_string(&s).unwrap();
    let back: SessionState = serde_json::from_str(&json).unwrap();
    assert_eq!(back, s);
  }
}
