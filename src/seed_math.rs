// ── Bracket arithmetic ─────────────────────────────────────────────────
//
// Sizes are always rounded up to a power of two. Round numbers are 1-based.

pub fn next_pow2(n: usize) -> usize {
  n.max(1).next_power_of_two()
}

pub fn winners_rounds(size: usize) -> usize {
  next_pow2(size).trailing_zeros() as usize
}

pub fn losers_rounds(size: usize) -> usize {
  let winners = winners_rounds(size);
  if winners < 2 {
    return 0;
  }
  2 * winners - 2
}

pub fn winners_round_match_count(round: usize, size: usize) -> usize {
  let shift = round.max(1) as u32;
  next_pow2(size).checked_shr(shift).unwrap_or(0)
}

/// Losers rounds come in pairs of equal width: size/4, size/4, size/8, size/8, ...
pub fn losers_round_match_count(round: usize, size: usize) -> usize {
  let shift = ((round.max(1) + 1) / 2 + 1) as u32;
  next_pow2(size).checked_shr(shift).unwrap_or(0)
}

/// Losers round receiving the losers of winners round `round`.
pub fn loser_destination_round(round: usize) -> usize {
  if round <= 1 {
    1
  } else {
    2 * round - 2
  }
}

/// Winners round whose losers drop into losers round `round`, if any.
pub fn dropping_winners_round(round: usize, size: usize) -> Option<usize> {
  (1..=winners_rounds(size)).find(|v| loser_destination_round(*v) == round)
}

pub fn bye_count(players: usize) -> usize {
  next_pow2(players) - players.max(1)
}
