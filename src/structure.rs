use std::sync::Arc;
use tracing::debug;

use crate::error::{BracketError, BracketResult};
use crate::seed_math::{
  dropping_winners_round, losers_round_match_count, losers_rounds, next_pow2, winners_round_match_count,
  winners_rounds,
};
use crate::types::{
  BracketKind, BracketStructure, Destination, DoubleBracket, Match, MatchId, MatchSlot, Placeholder, Player,
  Ranking, Round, SingleBracket, SlotIndex, FIRST_PLACE, SECOND_PLACE,
};

// ── Skeleton construction ──────────────────────────────────────────────

/// Build the empty skeleton for `player_count` entrants. Every slot after the
/// first round waits on a placeholder, and every outcome has a destination.
pub fn build_structure(kind: BracketKind, player_count: usize) -> BracketResult<BracketStructure> {
  if player_count < 2 {
    return Err(BracketError::InvalidInput(format!(
      "a bracket needs at least 2 players, got {player_count}"
    )));
  }
  let size = next_pow2(player_count);
  let mut structure = match kind {
    BracketKind::Single => build_single(size),
    BracketKind::Double => build_double(size),
  };
  link_destinations(&mut structure)?;
  debug!(%kind, size, matches = structure.match_count(), "bracket skeleton built");
  Ok(structure)
}

fn waiting(placeholder: Placeholder) -> MatchSlot {
  MatchSlot::Placeholder(placeholder)
}

fn push_match(round: &mut Vec<Match>, next_id: &mut MatchId, p1: MatchSlot, p2: MatchSlot) -> MatchId {
  let id = *next_id;
  *next_id += 1;
  round.push(Match { p1, p2, ..Match::new(id) });
  id
}

fn into_rounds(rounds: Vec<Vec<Match>>) -> Vec<Round> {
  rounds
    .into_iter()
    .map(|round| round.into_iter().map(Arc::new).collect())
    .collect()
}

fn build_winners(size: usize, next_id: &mut MatchId) -> Vec<Vec<Match>> {
  let mut rounds: Vec<Vec<Match>> = Vec::new();
  for round in 1..=winners_rounds(size) {
    let count = winners_round_match_count(round, size);
    let feeders: Vec<MatchId> = rounds
      .last()
      .map(|prev| prev.iter().map(|m| m.id).collect())
      .unwrap_or_default();
    let mut matches = Vec::with_capacity(count);
    for i in 0..count {
      let (p1, p2) = match (feeders.get(i * 2), feeders.get(i * 2 + 1)) {
        (Some(a), Some(b)) => (waiting(Placeholder::WinnerOf(*a)), waiting(Placeholder::WinnerOf(*b))),
        _ => (MatchSlot::Empty, MatchSlot::Empty),
      };
      push_match(&mut matches, next_id, p1, p2);
    }
    rounds.push(matches);
  }
  rounds
}

fn final_match_id(rounds: &[Vec<Match>]) -> MatchId {
  rounds
    .last()
    .and_then(|round| round.first())
    .map(|m| m.id)
    .unwrap_or_default()
}

fn base_ranking() -> Ranking {
  let mut ranking = Ranking::new();
  ranking.insert(FIRST_PLACE.to_string(), Vec::new());
  ranking.insert(SECOND_PLACE.to_string(), Vec::new());
  ranking
}

/// Route the losers of `rounds` into placement buckets, latest round first.
fn assign_loser_rankings(rounds: &mut [Vec<Match>], ranking: &mut Ranking, start: usize) -> usize {
  let mut start = start;
  for round in rounds.iter_mut().rev() {
    let label = placement_label(start, round.len());
    ranking.entry(label.clone()).or_default();
    for m in round.iter_mut() {
      m.loser_destination = Some(Destination::Ranking(label.clone()));
    }
    start += round.len();
  }
  start
}

fn build_single(size: usize) -> BracketStructure {
  let mut next_id: MatchId = 1;
  let mut rounds = build_winners(size, &mut next_id);
  let mut ranking = base_ranking();
  let final_id = final_match_id(&rounds);

  if let Some((final_round, earlier)) = rounds.split_last_mut() {
    for m in final_round.iter_mut() {
      m.loser_destination = Some(Destination::Ranking(SECOND_PLACE.to_string()));
    }
    assign_loser_rankings(earlier, &mut ranking, 3);
  }
  rounds.push(vec![Match::champion_box(next_id, final_id)]);

  BracketStructure::Single(SingleBracket {
    rounds: into_rounds(rounds),
    ranking,
  })
}

fn build_double(size: usize) -> BracketStructure {
  let mut next_id: MatchId = 1;
  let winners = build_winners(size, &mut next_id);
  let mut losers: Vec<Vec<Match>> = Vec::new();

  for round in 1..=losers_rounds(size) {
    let mut matches = Vec::with_capacity(losers_round_match_count(round, size));
    if round == 1 {
      for pair in winners[0].chunks(2) {
        if let [a, b] = pair {
          push_match(
            &mut matches,
            &mut next_id,
            waiting(Placeholder::LoserOf(a.id)),
            waiting(Placeholder::LoserOf(b.id)),
          );
        }
      }
    } else {
      let survivors: Vec<MatchId> = losers[round - 2].iter().map(|m| m.id).collect();
      match dropping_winners_round(round, size) {
        Some(dropping) => {
          // Even winners rounds drop in reverse order: a drop never lands
          // beside a survivor from its own side of the bracket.
          let mut drops: Vec<MatchId> = winners[dropping - 1].iter().map(|m| m.id).collect();
          if dropping % 2 == 0 {
            drops.reverse();
          }
          for (survivor, drop) in survivors.iter().zip(&drops) {
            push_match(
              &mut matches,
              &mut next_id,
              waiting(Placeholder::WinnerOf(*survivor)),
              waiting(Placeholder::LoserOf(*drop)),
            );
          }
        }
        None => {
          for pair in survivors.chunks(2) {
            if let [a, b] = pair {
              push_match(
                &mut matches,
                &mut next_id,
                waiting(Placeholder::WinnerOf(*a)),
                waiting(Placeholder::WinnerOf(*b)),
              );
            }
          }
        }
      }
    }
    losers.push(matches);
  }

  let winners_final = final_match_id(&winners);
  let losers_side = match losers.last().and_then(|round| round.first()) {
    Some(losers_final) => waiting(Placeholder::WinnerOf(losers_final.id)),
    None => waiting(Placeholder::LoserOf(winners_final)),
  };
  let mut opener = Vec::with_capacity(1);
  let opener_id = push_match(
    &mut opener,
    &mut next_id,
    waiting(Placeholder::WinnerOf(winners_final)),
    losers_side,
  );
  let mut reset = Vec::with_capacity(1);
  let reset_id = push_match(
    &mut reset,
    &mut next_id,
    waiting(Placeholder::WinnerOf(opener_id)),
    waiting(Placeholder::LoserOf(opener_id)),
  );
  for m in reset.iter_mut() {
    m.loser_destination = Some(Destination::Ranking(SECOND_PLACE.to_string()));
  }
  let champion = vec![Match::champion_box(next_id, reset_id)];

  let mut ranking = base_ranking();
  assign_loser_rankings(&mut losers, &mut ranking, 3);

  BracketStructure::Double(DoubleBracket {
    winners: into_rounds(winners),
    losers: into_rounds(losers),
    grand_final: into_rounds(vec![opener, reset, champion]),
    ranking,
  })
}

// ── Labels ─────────────────────────────────────────────────────────────

pub fn ordinal(n: usize) -> String {
  let suffix = match (n % 10, n % 100) {
    (_, 11..=13) => "th",
    (1, _) => "st",
    (2, _) => "nd",
    (3, _) => "rd",
    _ => "th",
  };
  format!("{n}{suffix}")
}

/// `3rd` for a single place, `5th-8th` for a shared range.
pub fn placement_label(start: usize, count: usize) -> String {
  if count <= 1 {
    ordinal(start)
  } else {
    format!("{}-{}", ordinal(start), ordinal(start + count - 1))
  }
}

// ── Linking and seating ────────────────────────────────────────────────

/// Resolve every placeholder into a typed destination on its source match.
/// Destinations that are already set are left alone.
pub fn link_destinations(structure: &mut BracketStructure) -> BracketResult<()> {
  let index = structure.index();
  let mut links: Vec<(Placeholder, Destination)> = Vec::new();
  for m in structure.matches() {
    for slot in SlotIndex::BOTH {
      if let Some(placeholder) = m.slot(slot).placeholder() {
        links.push((placeholder, Destination::Slot { match_id: m.id, slot }));
      }
    }
  }

  for (placeholder, destination) in links {
    let unknown = || BracketError::UnknownPlaceholderSource {
      placeholder: placeholder.to_string(),
    };
    let location = index.get(&placeholder.source()).copied().ok_or_else(unknown)?;
    let source = structure.get(location).ok_or_else(unknown)?;
    let already_set = match placeholder {
      Placeholder::WinnerOf(_) => source.winner_destination.is_some(),
      Placeholder::LoserOf(_) => source.loser_destination.is_some(),
    };
    if already_set {
      continue;
    }
    let source = structure.get_mut(location).ok_or_else(unknown)?;
    match placeholder {
      Placeholder::WinnerOf(_) => source.winner_destination = Some(destination),
      Placeholder::LoserOf(_) => source.loser_destination = Some(destination),
    }
  }
  Ok(())
}

/// Put placed players into the first round, two per match in order.
pub fn seat_players(structure: &mut BracketStructure, slots: &[Player]) -> BracketResult<()> {
  let round = structure
    .first_round_mut()
    .ok_or_else(|| BracketError::InvalidInput("bracket has no first round".to_string()))?;
  if slots.len() != round.len() * 2 {
    return Err(BracketError::InvalidInput(format!(
      "{} placed players cannot fill {} first-round matches",
      slots.len(),
      round.len()
    )));
  }
  for (m, pair) in round.iter_mut().zip(slots.chunks(2)) {
    let m = Arc::make_mut(m);
    m.p1 = MatchSlot::Occupied(pair[0].clone());
    m.p2 = MatchSlot::Occupied(pair[1].clone());
  }
  Ok(())
}
