use serde::Serialize;
use std::cmp::Ordering;
use std::collections::HashMap;
use tracing::{debug, error, warn};

use crate::error::{BracketError, BracketResult};
use crate::types::{
  BracketStructure, Destination, GrandFinalLayout, Match, MatchId, MatchLocation, MatchSlot, Placeholder, Player,
  Score, SlotIndex, SECOND_PLACE,
};

type MatchIndex = HashMap<MatchId, MatchLocation>;

#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct StabilizeReport {
  pub passes: usize,
  pub walkovers: Vec<MatchId>,
  pub processed: Vec<MatchId>,
}

impl StabilizeReport {
  pub fn changed(&self) -> bool {
    !self.walkovers.is_empty() || !self.processed.is_empty()
  }
}

/// Winning slot of a match between `p1` and `p2`, if the scores decide one.
pub fn decide(p1: &Player, p2: &Player) -> Option<SlotIndex> {
  match (p1.has_walkover(), p2.has_walkover()) {
    (true, false) => Some(SlotIndex::P1),
    (false, true) => Some(SlotIndex::P2),
    (true, true) => None,
    (false, false) => {
      let a = p1.score.as_ref().and_then(Score::points)?;
      let b = p2.score.as_ref().and_then(Score::points)?;
      match a.cmp(&b) {
        Ordering::Greater => Some(SlotIndex::P1),
        Ordering::Less => Some(SlotIndex::P2),
        Ordering::Equal => None,
      }
    }
  }
}

// ── Outcome routing ────────────────────────────────────────────────────

struct Route {
  to: Destination,
  /// What the target slot held before the player arrived.
  restore: Placeholder,
}

struct Routes {
  winner: Option<Route>,
  loser: Option<Route>,
  skip_reset: Option<MatchId>,
}

struct Outcome {
  winner: Player,
  loser: Option<Player>,
  routes: Routes,
}

fn routes_for(m: &Match, winner_slot: Option<SlotIndex>, layout: Option<GrandFinalLayout>) -> Routes {
  if let (Some(layout), Some(SlotIndex::P1)) = (layout, winner_slot) {
    if m.id == layout.opener {
      // Winners-side champion took the opener: no reset.
      return Routes {
        winner: Some(Route {
          to: Destination::Slot {
            match_id: layout.champion_box,
            slot: SlotIndex::P1,
          },
          restore: Placeholder::WinnerOf(layout.reset),
        }),
        loser: Some(Route {
          to: Destination::Ranking(SECOND_PLACE.to_string()),
          restore: Placeholder::LoserOf(m.id),
        }),
        skip_reset: Some(layout.reset),
      };
    }
  }
  Routes {
    winner: m.winner_destination.clone().map(|to| Route {
      to,
      restore: Placeholder::WinnerOf(m.id),
    }),
    loser: m.loser_destination.clone().map(|to| Route {
      to,
      restore: Placeholder::LoserOf(m.id),
    }),
    skip_reset: None,
  }
}

fn outcome_of(m: &Match, layout: Option<GrandFinalLayout>) -> Option<Outcome> {
  if m.is_champion_box {
    let winner = m.p1.player()?.clone();
    return Some(Outcome {
      winner,
      loser: None,
      routes: routes_for(m, None, layout),
    });
  }
  let (p1, p2) = m.players()?;
  let winner_slot = decide(p1, p2)?;
  Some(Outcome {
    winner: m.slot(winner_slot).player()?.clone(),
    loser: m.slot(winner_slot.other()).player().cloned(),
    routes: routes_for(m, Some(winner_slot), layout),
  })
}

/// Slot that should be awarded a walkover because of a bye, if not yet done.
fn pending_walkover(m: &Match) -> Option<SlotIndex> {
  if m.is_processed || m.is_skipped || m.is_champion_box {
    return None;
  }
  let (p1, p2) = m.players()?;
  let awarded = match (p1.is_bye, p2.is_bye) {
    (false, false) => return None,
    (false, true) => SlotIndex::P1,
    (true, false) | (true, true) => SlotIndex::P2,
  };
  let winner = m.slot(awarded).player()?;
  let loser = m.slot(awarded.other()).player()?;
  if winner.has_walkover() && loser.score.is_none() {
    None
  } else {
    Some(awarded)
  }
}

fn award_walkover(m: &mut Match, awarded: SlotIndex) {
  if let Some(winner) = m.slot_mut(awarded).player_mut() {
    winner.score = Some(Score::walkover());
  }
  if let Some(loser) = m.slot_mut(awarded.other()).player_mut() {
    loser.score = None;
  }
}

// ── Stabilization ──────────────────────────────────────────────────────

/// Auto-resolve byes and advance every decided match until nothing changes.
pub fn stabilize(structure: &mut BracketStructure) -> BracketResult<StabilizeReport> {
  let locations = structure.locations();
  let index: MatchIndex = locations.iter().copied().collect();
  let layout = structure.grand_final_layout();
  let limit = locations.len() * 2 + 2;
  let mut report = StabilizeReport::default();

  loop {
    if report.passes >= limit {
      warn!(passes = report.passes, "stabilization stopped at pass limit");
      break;
    }
    report.passes += 1;
    let mut progressed = false;

    for (id, location) in &locations {
      let Some(awarded) = structure.get(*location).and_then(pending_walkover) else {
        continue;
      };
      if let Some(m) = structure.get_mut(*location) {
        award_walkover(m, awarded);
        debug!(match_id = id, slot = awarded.as_str(), "walkover assigned");
        report.walkovers.push(*id);
        progressed = true;
      }
    }

    for (id, location) in &locations {
      let Some(m) = structure.get(*location) else {
        continue;
      };
      if m.is_processed || m.is_skipped {
        continue;
      }
      let Some(outcome) = outcome_of(m, layout) else {
        continue;
      };
      apply_outcome(structure, &index, *id, *location, outcome)?;
      report.processed.push(*id);
      progressed = true;
    }

    if !progressed {
      break;
    }
  }

  debug!(
    passes = report.passes,
    walkovers = report.walkovers.len(),
    processed = report.processed.len(),
    "bracket stabilized"
  );
  Ok(report)
}

fn apply_outcome(
  structure: &mut BracketStructure,
  index: &MatchIndex,
  match_id: MatchId,
  location: MatchLocation,
  outcome: Outcome,
) -> BracketResult<()> {
  let Outcome { winner, loser, routes } = outcome;
  let Some(winner_route) = routes.winner else {
    error!(match_id, "decided match has no winner destination");
    return Err(BracketError::AdvancementTargetNotFound {
      from: match_id,
      target: "winner".to_string(),
    });
  };
  deliver(structure, index, match_id, &winner_route.to, &winner)?;
  if let (Some(route), Some(loser)) = (routes.loser, loser) {
    deliver(structure, index, match_id, &route.to, &loser)?;
  }
  if let Some(reset) = routes.skip_reset.and_then(|id| index.get(&id).copied()) {
    if let Some(reset) = structure.get_mut(reset) {
      reset.is_skipped = true;
    }
  }
  if let Some(m) = structure.get_mut(location) {
    m.is_processed = true;
  }
  debug!(match_id, winner = %winner.name, "match processed");
  Ok(())
}

fn deliver(
  structure: &mut BracketStructure,
  index: &MatchIndex,
  from: MatchId,
  to: &Destination,
  player: &Player,
) -> BracketResult<()> {
  match to {
    Destination::Ranking(label) => {
      if player.is_bye {
        return Ok(());
      }
      let bucket = structure.ranking_mut().entry(label.clone()).or_default();
      if !bucket.iter().any(|p| p.name == player.name) {
        bucket.push(player.advancing());
      }
      Ok(())
    }
    Destination::Slot { match_id, slot } => {
      let missing = || {
        error!(from, target = %to, "advancement target not found");
        BracketError::AdvancementTargetNotFound {
          from,
          target: to.to_string(),
        }
      };
      let location = index.get(match_id).copied().ok_or_else(missing)?;
      let target = structure.get(location).ok_or_else(missing)?;
      if target.slot(*slot).player().is_some_and(|p| p.same_entrant(player)) {
        return Ok(());
      }
      let target = structure.get_mut(location).ok_or_else(missing)?;
      *target.slot_mut(*slot) = MatchSlot::Occupied(player.advancing());
      Ok(())
    }
  }
}

// ── Retraction ─────────────────────────────────────────────────────────

/// Take back the routing of a processed match so it can be decided again.
///
/// Downstream matches that were resolved automatically (a bye, or the
/// champion box) are taken back along with it; any other decided match that
/// already used the outcome fails with `OutcomeLocked`. Returns `false` when
/// the match was not processed.
pub fn retract_outcome(structure: &mut BracketStructure, match_id: MatchId) -> BracketResult<bool> {
  let index = structure.index();
  let layout = structure.grand_final_layout();
  retract(structure, &index, layout, match_id)
}

fn retract(
  structure: &mut BracketStructure,
  index: &MatchIndex,
  layout: Option<GrandFinalLayout>,
  match_id: MatchId,
) -> BracketResult<bool> {
  let Some(location) = index.get(&match_id).copied() else {
    return Ok(false);
  };
  let Some(m) = structure.get(location) else {
    return Ok(false);
  };
  if !m.is_processed {
    return Ok(false);
  }

  if let Some(Outcome { winner, loser, routes }) = outcome_of(m, layout) {
    let deliveries = [routes.winner.map(|route| (route, winner)), routes.loser.zip(loser)];
    for (route, player) in deliveries.into_iter().flatten() {
      withdraw(structure, index, layout, match_id, &route, &player)?;
    }
    if let Some(reset) = routes.skip_reset.and_then(|id| index.get(&id).copied()) {
      if let Some(reset) = structure.get_mut(reset) {
        reset.is_skipped = false;
      }
    }
  }

  if let Some(m) = structure.get_mut(location) {
    m.is_processed = false;
  }
  debug!(match_id, "match outcome retracted");
  Ok(true)
}

fn withdraw(
  structure: &mut BracketStructure,
  index: &MatchIndex,
  layout: Option<GrandFinalLayout>,
  from: MatchId,
  route: &Route,
  player: &Player,
) -> BracketResult<()> {
  match &route.to {
    Destination::Ranking(label) => {
      if let Some(bucket) = structure.ranking_mut().get_mut(label) {
        bucket.retain(|p| p.name != player.name);
      }
      Ok(())
    }
    Destination::Slot { match_id, slot } => {
      let Some(location) = index.get(match_id).copied() else {
        return Ok(());
      };
      let Some(target) = structure.get(location) else {
        return Ok(());
      };
      if !target.slot(*slot).player().is_some_and(|p| p.same_entrant(player)) {
        return Ok(());
      }
      if target.is_processed {
        let automatic = target.is_champion_box || target.p1.holds_bye() || target.p2.holds_bye();
        if !automatic {
          return Err(BracketError::OutcomeLocked {
            match_id: from,
            downstream: *match_id,
          });
        }
        retract(structure, index, layout, *match_id)?;
      }
      if let Some(target) = structure.get_mut(location) {
        *target.slot_mut(*slot) = MatchSlot::Placeholder(route.restore);
      }
      Ok(())
    }
  }
}
