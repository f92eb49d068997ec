use serde::Serialize;
use std::collections::HashSet;

use crate::types::Player;

/// Players read from a raw entry list, split by whether they carry a seed.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize)]
pub struct ParsedPlayers {
  /// Sorted ascending by seed; entries sharing a seed keep their input order.
  pub seeded: Vec<Player>,
  pub unseeded: Vec<Player>,
  pub warnings: Vec<String>,
}

impl ParsedPlayers {
  pub fn total(&self) -> usize {
    self.seeded.len() + self.unseeded.len()
  }
}

enum ParsedLine {
  Seeded(u32, String),
  Unseeded(String),
  MissingName(String),
  InvalidSeed(String, String),
}

/// Parse one player per line. A line may start with a seed written as
/// `3. Name`, `3) Name`, `3 - Name` or `3 Name`.
///
/// Names are unique in the result: a repeated name gets a ` (2)`, ` (3)`, ...
/// suffix and a repeated empty name becomes `Player <line>`, each with a warning.
pub fn parse_player_list(input: &str) -> ParsedPlayers {
  let mut parsed = ParsedPlayers::default();
  let mut taken: HashSet<String> = HashSet::new();

  for (idx, raw) in input.lines().enumerate() {
    let line_no = idx + 1;
    let line = raw.trim();
    if line.is_empty() {
      continue;
    }
    match parse_line(line) {
      ParsedLine::Seeded(seed, name) => {
        if parsed.seeded.iter().any(|p| p.seed == Some(seed)) {
          parsed
            .warnings
            .push(format!("line {line_no}: seed {seed} is used more than once"));
        }
        let name = claim_name(name, line_no, &mut taken, &mut parsed.warnings);
        parsed.seeded.push(Player::seeded(name, seed));
      }
      ParsedLine::Unseeded(name) => {
        let name = claim_name(name, line_no, &mut taken, &mut parsed.warnings);
        parsed.unseeded.push(Player::new(name));
      }
      ParsedLine::MissingName(digits) => {
        parsed.warnings.push(format!(
          "line {line_no}: seed {digits} has no player name, added as an unnamed unseeded player"
        ));
        let name = claim_name(String::new(), line_no, &mut taken, &mut parsed.warnings);
        parsed.unseeded.push(Player::new(name));
      }
      ParsedLine::InvalidSeed(digits, name) => {
        parsed.warnings.push(format!(
          "line {line_no}: `{digits}` is not a valid seed, {name:?} added unseeded"
        ));
        let name = claim_name(name, line_no, &mut taken, &mut parsed.warnings);
        parsed.unseeded.push(Player::new(name));
      }
    }
  }

  parsed.seeded.sort_by_key(|p| p.seed);
  parsed
}

/// Reserve `name`, or the first free variant of it when it is already taken.
fn claim_name(name: String, line_no: usize, taken: &mut HashSet<String>, warnings: &mut Vec<String>) -> String {
  if taken.insert(name.clone()) {
    return name;
  }
  let base = if name.is_empty() {
    format!("Player {line_no}")
  } else {
    name.clone()
  };
  let mut candidate = base.clone();
  let mut suffix = 2;
  while !taken.insert(candidate.clone()) {
    candidate = format!("{base} ({suffix})");
    suffix += 1;
  }
  warnings.push(format!("line {line_no}: name {name:?} is already taken, entered as {candidate:?}"));
  candidate
}

fn parse_line(line: &str) -> ParsedLine {
  let Some((digits, name)) = split_seed_prefix(line) else {
    return ParsedLine::Unseeded(line.to_string());
  };
  match digits.parse::<u32>() {
    Ok(seed) if seed > 0 && !name.is_empty() => ParsedLine::Seeded(seed, name.to_string()),
    Ok(seed) if seed > 0 => ParsedLine::MissingName(digits.to_string()),
    _ if name.is_empty() => ParsedLine::MissingName(digits.to_string()),
    _ => ParsedLine::InvalidSeed(digits.to_string(), name.to_string()),
  }
}

/// Split a leading seed number from the name. Digits glued to letters
/// (`2Pac`) are part of the name.
fn split_seed_prefix(line: &str) -> Option<(&str, &str)> {
  let digits_end = line
    .find(|c: char| !c.is_ascii_digit())
    .unwrap_or(line.len());
  if digits_end == 0 {
    return None;
  }
  let (digits, rest) = line.split_at(digits_end);
  if rest.is_empty() {
    return Some((digits, ""));
  }
  let spaced = rest.trim_start();
  if let Some(name) = spaced.strip_prefix(|c: char| matches!(c, '.' | ')' | '-')) {
    return Some((digits, name.trim()));
  }
  if spaced.len() < rest.len() {
    return Some((digits, spaced.trim()));
  }
  None
}

#[cfg(test)]
mod tests {
  use super::*;

  fn names(players: &[Player]) -> Vec<&str> {
    players.iter().map(|p| p.name.as_str()).collect()
  }

  #[test]
  fn test_seed_prefix_styles() {
    let parsed = parse_player_list("3. Cee\n1) Ana\n2 - Bo\n4 Dee\nEve\n");
    assert_eq!(names(&parsed.seeded), vec!["Ana", "Bo", "Cee", "Dee"]);
    assert_eq!(
      parsed.seeded.iter().map(|p| p.seed).collect::<Vec<_>>(),
      vec![Some(1), Some(2), Some(3), Some(4)]
    );
    assert_eq!(names(&parsed.unseeded), vec!["Eve"]);
    assert!(parsed.warnings.is_empty());
    assert_eq!(parsed.total(), 5);
  }

  #[test]
  fn test_blank_lines_and_whitespace_are_ignored() {
    let parsed = parse_player_list("\r\n   \n  Ana  \r\n\n 2.   Bo \n");
    assert_eq!(names(&parsed.unseeded), vec!["Ana"]);
    assert_eq!(names(&parsed.seeded), vec!["Bo"]);
  }

  #[test]
  fn test_digits_glued_to_name_are_not_a_seed() {
    let parsed = parse_player_list("2Pac\n007\n");
    assert_eq!(names(&parsed.unseeded), vec!["2Pac", ""]);
    assert_eq!(parsed.warnings.len(), 1);
  }

  #[test]
  fn test_seed_without_name_becomes_unnamed_unseeded() {
    let parsed = parse_player_list("5.\n6");
    assert!(parsed.seeded.is_empty());
    assert_eq!(names(&parsed.unseeded), vec!["", "Player 2"]);
    assert!(parsed.unseeded.iter().all(|p| p.seed.is_none()));
    assert_eq!(parsed.warnings.len(), 3);
  }

  #[test]
  fn test_repeated_names_are_made_unique() {
    let parsed = parse_player_list("Ana\n1. Ana\nAna (2)\nAna\nBo");
    assert_eq!(names(&parsed.seeded), vec!["Ana (2)"]);
    assert_eq!(names(&parsed.unseeded), vec!["Ana", "Ana (2) (2)", "Ana (3)", "Bo"]);
    assert_eq!(parsed.warnings.len(), 3);
    assert!(parsed.warnings[0].starts_with("line 2:"));
  }

  #[test]
  fn test_zero_and_overflowing_seeds_warn() {
    let parsed = parse_player_list("0. Zed\n99999999999 Big");
    assert!(parsed.seeded.is_empty());
    assert_eq!(names(&parsed.unseeded), vec!["Zed", "Big"]);
    assert_eq!(parsed.warnings.len(), 2);
  }

  #[test]
  fn test_duplicate_seeds_keep_input_order() {
    let parsed = parse_player_list("2. Bo\n1. Ana\n2. Bea");
    assert_eq!(names(&parsed.seeded), vec!["Ana", "Bo", "Bea"]);
    assert_eq!(parsed.warnings.len(), 1);
    assert!(parsed.warnings[0].contains("seed 2"));
  }
}
