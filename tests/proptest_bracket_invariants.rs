//! Property tests for bracket construction, placement and resolution.

use bracket_engine::seed_math::next_pow2;
use bracket_engine::seeding::place_players;
use bracket_engine::{
    build_structure, stabilize, BracketKind, BracketStructure, Player, Score, SessionState, SlotIndex, Tournament,
};
use chrono::NaiveDate;
use proptest::prelude::*;
use rand::{Rng, SeedableRng};
use rand_chacha::ChaCha8Rng;
use std::collections::HashSet;

// ── Helpers ─────────────────────────────────────────────────────────────

fn kind_strategy() -> impl Strategy<Value = BracketKind> {
    prop_oneof![Just(BracketKind::Single), Just(BracketKind::Double)]
}

fn roster(n: usize) -> String {
    (1..=n).map(|i| format!("Player{i}")).collect::<Vec<_>>().join("\n")
}

fn create(kind: BracketKind, n: usize, seed: u64) -> Tournament {
    let mut rng = ChaCha8Rng::seed_from_u64(seed);
    let date = NaiveDate::from_ymd_opt(2024, 6, 1).unwrap();
    Tournament::create("Property", date, kind, &roster(n), &mut rng).unwrap()
}

/// Score the next match two real players still have to play. Returns `false`
/// once nothing is left.
fn play_one(session: &mut SessionState, rng: &mut ChaCha8Rng) -> bool {
    let Some(id) = session
        .current()
        .matches()
        .filter(|m| !m.is_champion_box && !m.is_processed && !m.is_skipped)
        .find(|m| m.players().is_some_and(|(a, b)| !a.is_bye && !b.is_bye))
        .map(|m| m.id)
    else {
        return false;
    };
    let loser_points = rng.gen_range(0..3u32);
    let winner_points = loser_points + rng.gen_range(1..3u32);
    let (p1, p2) = if rng.gen_bool(0.5) {
        (winner_points, loser_points)
    } else {
        (loser_points, winner_points)
    };
    let edits = [
        (SlotIndex::P1, Score::parse(&p1.to_string())),
        (SlotIndex::P2, Score::parse(&p2.to_string())),
    ];
    session.update_scores(id, &edits).unwrap()
}

fn play_out(session: &mut SessionState, rng: &mut ChaCha8Rng) -> usize {
    let mut played = 0;
    while play_one(session, rng) {
        played += 1;
        assert!(played < 1_000, "play-out did not terminate");
    }
    played
}

fn ranked_names(structure: &BracketStructure) -> HashSet<String> {
    structure
        .ranking()
        .values()
        .flatten()
        .map(|p| p.name.clone())
        .collect()
}

// ── Structure ───────────────────────────────────────────────────────────

proptest! {
    #[test]
    fn single_bracket_has_one_match_per_elimination(n in 2usize..=70) {
        let structure = build_structure(BracketKind::Single, n).unwrap();
        let real = structure.matches().filter(|m| !m.is_champion_box).count();
        let boxes = structure.matches().filter(|m| m.is_champion_box).count();
        prop_assert_eq!(real, next_pow2(n) - 1);
        prop_assert_eq!(boxes, 1);
    }

    #[test]
    fn match_ids_are_unique_and_dense(kind in kind_strategy(), n in 2usize..=70) {
        let structure = build_structure(kind, n).unwrap();
        let mut ids: Vec<u32> = structure.matches().map(|m| m.id).collect();
        ids.sort_unstable();
        let expected: Vec<u32> = (1..=ids.len() as u32).collect();
        prop_assert_eq!(ids, expected);
    }

    #[test]
    fn placement_keeps_every_player_once(
        seeded in 0usize..12,
        unseeded in 0usize..20,
        seed in any::<u64>(),
    ) {
        prop_assume!(seeded + unseeded >= 2);
        let seeded_players: Vec<Player> = (1..=seeded)
            .map(|i| Player::seeded(format!("Seed{i}"), i as u32))
            .collect();
        let unseeded_players: Vec<Player> = (1..=unseeded).map(|i| Player::new(format!("Open{i}"))).collect();
        let mut rng = ChaCha8Rng::seed_from_u64(seed);
        let placement = place_players(&seeded_players, &unseeded_players, &mut rng);

        prop_assert_eq!(placement.size, next_pow2(seeded + unseeded));
        prop_assert_eq!(placement.slots.len(), placement.size);
        let real: Vec<&Player> = placement.slots.iter().filter(|p| !p.is_bye).collect();
        let names: HashSet<&str> = real.iter().map(|p| p.name.as_str()).collect();
        prop_assert_eq!(real.len(), seeded + unseeded);
        prop_assert_eq!(names.len(), seeded + unseeded);
        for pair in placement.slots.chunks(2) {
            prop_assert!(!(pair[0].is_bye && pair[1].is_bye), "bye paired with bye");
        }
    }
}

// ── Resolution ──────────────────────────────────────────────────────────

proptest! {
    #[test]
    fn stabilize_is_idempotent(kind in kind_strategy(), n in 2usize..=24, seed in any::<u64>(), plays in 0usize..12) {
        let t = create(kind, n, seed);
        let mut session = t.session;
        let mut rng = ChaCha8Rng::seed_from_u64(seed ^ 0x5eed);
        for _ in 0..plays {
            if !play_one(&mut session, &mut rng) {
                break;
            }
        }
        let mut again = session.current().clone();
        let report = stabilize(&mut again).unwrap();
        prop_assert!(!report.changed());
        prop_assert_eq!(&again, session.current());
    }

    #[test]
    fn played_out_bracket_ranks_every_player(kind in kind_strategy(), n in 2usize..=24, seed in any::<u64>()) {
        let t = create(kind, n, seed);
        let mut session = t.session;
        let mut rng = ChaCha8Rng::seed_from_u64(seed.rotate_left(7));
        play_out(&mut session, &mut rng);

        let structure = session.current();
        prop_assert_eq!(structure.ranked_players(), n);
        prop_assert_eq!(ranked_names(structure).len(), n);
        prop_assert_eq!(structure.ranking()["1st"].len(), 1);
        prop_assert_eq!(structure.ranking()["2nd"].len(), 1);
    }

    #[test]
    fn undo_then_redo_restores_each_state(kind in kind_strategy(), n in 2usize..=16, seed in any::<u64>()) {
        let t = create(kind, n, seed);
        let mut session = t.session;
        let mut rng = ChaCha8Rng::seed_from_u64(seed.wrapping_add(1));
        let mut snapshots = vec![session.current().clone()];
        while play_one(&mut session, &mut rng) {
            snapshots.push(session.current().clone());
        }

        for expected in snapshots.iter().rev().skip(1) {
            prop_assert!(session.undo());
            prop_assert_eq!(session.current(), expected);
        }
        prop_assert!(!session.history_state().can_undo);
        for expected in snapshots.iter().skip(1) {
            prop_assert!(session.redo());
            prop_assert_eq!(session.current(), expected);
        }
        prop_assert!(!session.history_state().can_redo);
    }
}
