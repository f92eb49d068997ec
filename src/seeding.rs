use rand::seq::SliceRandom;
use rand::Rng;
use std::collections::VecDeque;
use tracing::debug;

use crate::seed_math::next_pow2;
use crate::types::Player;

/// First-round slot contents for a bracket, two slots per match.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Placement {
  pub size: usize,
  pub byes: usize,
  pub slots: Vec<Player>,
}

/// Standard bracket order for `slots` seed positions: 1 and 2 meet only in
/// the final, 1-4 no earlier than the semifinals, and so on.
pub fn seed_order(slots: usize) -> Vec<u32> {
  let target = next_pow2(slots);
  let mut seeds = vec![1u32];
  while seeds.len() < target {
    let n = seeds.len() as u32;
    let mut next = Vec::with_capacity(seeds.len() * 2);
    for seed in seeds.iter().copied() {
      next.push(seed);
      next.push(n * 2 + 1 - seed);
    }
    seeds = next;
  }
  seeds
}

/// Lay out every player plus the byes needed to fill the bracket.
///
/// Seeds take their standard positions (by rank, so duplicated seed numbers
/// still get distinct slots), byes go to the best seeds first, and unseeded
/// players are spread so that each match gets at least one real player
/// whenever there are enough of them.
pub fn place_players<R: Rng + ?Sized>(seeded: &[Player], unseeded: &[Player], rng: &mut R) -> Placement {
  let total = seeded.len() + unseeded.len();
  let size = next_pow2(total);
  let bye_total = size - total;
  let mut slots: Vec<Option<Player>> = vec![None; size];

  let mut ranked = seeded.to_vec();
  ranked.sort_by_key(|p| p.seed.unwrap_or(u32::MAX));

  let mut seed_slots = Vec::with_capacity(ranked.len());
  if !ranked.is_empty() {
    let order = seed_order(ranked.len());
    let stride = size / order.len();
    for (rank, player) in ranked.into_iter().enumerate() {
      let rank = rank as u32 + 1;
      let Some(position) = order.iter().position(|s| *s == rank) else {
        continue;
      };
      let slot = position * stride;
      seed_slots.push(slot);
      slots[slot] = Some(player);
    }
  }

  let mut byes: VecDeque<Player> = (1..=bye_total).map(Player::bye).collect();
  for slot in &seed_slots {
    let opponent = slot ^ 1;
    if opponent < size && slots[opponent].is_none() {
      match byes.pop_front() {
        Some(bye) => slots[opponent] = Some(bye),
        None => break,
      }
    }
  }

  let mut others = unseeded.to_vec();
  others.shuffle(rng);
  let mut others: VecDeque<Player> = others.into();
  for pair in (0..size.saturating_sub(1)).step_by(2) {
    if slots[pair].is_none() && slots[pair + 1].is_none() {
      match others.pop_front() {
        Some(player) => slots[pair] = Some(player),
        None => break,
      }
    }
  }

  let mut pool: Vec<Player> = others.into_iter().chain(byes).collect();
  pool.shuffle(rng);
  let mut pool = pool.into_iter();
  let slots: Vec<Player> = slots
    .into_iter()
    .filter_map(|slot| slot.or_else(|| pool.next()))
    .collect();

  debug!(size, byes = bye_total, seeded = seed_slots.len(), "players placed");
  Placement {
    size,
    byes: bye_total,
    slots,
  }
}
