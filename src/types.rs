use indexmap::IndexMap;
use rand_chacha::ChaCha8Rng;
use serde::{Deserialize, Serialize};
use std::{
    collections::HashMap,
    fmt,
    str::FromStr,
    sync::{Arc, Mutex},
};

use crate::error::BracketError;
use crate::store::TournamentRecord;

// ── Constants ──────────────────────────────────────────────────────────

pub const WALKOVER: &str = "WO";
pub const CLEARED_SCORE: &str = "--";
pub const RANK_PREFIX: &str = "RANK:";
pub const FIRST_PLACE: &str = "1st";
pub const SECOND_PLACE: &str = "2nd";
pub const BYE_PREFIX: &str = "BYE_";
pub const DEFAULT_HISTORY_LIMIT: usize = 200;
pub const DEFAULT_BIND_ADDR: &str = "127.0.0.1:17890";
pub const DEFAULT_DATA_DIR: &str = "data";
pub const DEFAULT_LOG_DIR: &str = "logs";
pub const PUBLIC_ID_LEN: usize = 8;

// ── Shared state type aliases ──────────────────────────────────────────

pub type SharedTournaments = Arc<Mutex<HashMap<String, TournamentRecord>>>;
pub type SharedRng = Arc<Mutex<ChaCha8Rng>>;

// ── Config types ───────────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct EngineConfig {
    pub bind_addr: String,
    pub data_dir: String,
    pub static_dir: String,
    pub log_dir: String,
    pub history_limit: usize,
    pub shuffle_seed: Option<u64>,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            bind_addr: String::new(),
            data_dir: String::new(),
            static_dir: String::new(),
            log_dir: String::new(),
            history_limit: 0,
            shuffle_seed: None,
        }
    }
}

// ── Bracket domain types ───────────────────────────────────────────────

pub type MatchId = u32;

/// One column of a bracket. Matches are reference counted so that history
/// snapshots share every match an edit did not touch.
pub type Round = Vec<Arc<Match>>;

/// Placement label -> players, in placement order.
pub type Ranking = IndexMap<String, Vec<Player>>;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BracketKind {
    Single,
    Double,
}

impl fmt::Display for BracketKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            BracketKind::Single => f.write_str("single"),
            BracketKind::Double => f.write_str("double"),
        }
    }
}

impl FromStr for BracketKind {
    type Err = BracketError;

    fn from_str(raw: &str) -> Result<Self, Self::Err> {
        match raw.trim().to_ascii_lowercase().as_str() {
            "single" => Ok(BracketKind::Single),
            "double" => Ok(BracketKind::Double),
            other => Err(BracketError::InvalidInput(format!(
                "unknown bracket type `{other}`, expected `single` or `double`"
            ))),
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SlotIndex {
    P1,
    P2,
}

impl SlotIndex {
    pub const BOTH: [SlotIndex; 2] = [SlotIndex::P1, SlotIndex::P2];

    pub fn other(self) -> SlotIndex {
        match self {
            SlotIndex::P1 => SlotIndex::P2,
            SlotIndex::P2 => SlotIndex::P1,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            SlotIndex::P1 => "p1",
            SlotIndex::P2 => "p2",
        }
    }
}

impl FromStr for SlotIndex {
    type Err = BracketError;

    fn from_str(raw: &str) -> Result<Self, Self::Err> {
        match raw.trim().to_ascii_lowercase().as_str() {
            "p1" | "1" => Ok(SlotIndex::P1),
            "p2" | "2" => Ok(SlotIndex::P2),
            other => Err(BracketError::InvalidInput(format!("unknown slot `{other}`"))),
        }
    }
}

/// Symbolic reference to the player a slot is waiting for.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum Placeholder {
    WinnerOf(MatchId),
    LoserOf(MatchId),
}

impl Placeholder {
    pub fn source(self) -> MatchId {
        match self {
            Placeholder::WinnerOf(id) | Placeholder::LoserOf(id) => id,
        }
    }
}

impl fmt::Display for Placeholder {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Placeholder::WinnerOf(id) => write!(f, "Winner of M{id}"),
            Placeholder::LoserOf(id) => write!(f, "Loser of M{id}"),
        }
    }
}

impl FromStr for Placeholder {
    type Err = BracketError;

    fn from_str(raw: &str) -> Result<Self, Self::Err> {
        let trimmed = raw.trim();
        let parse_id = |rest: &str| {
            rest
                .trim()
                .parse::<MatchId>()
                .map_err(|_| BracketError::InvalidPlaceholder(trimmed.to_string()))
        };
        if let Some(rest) = trimmed.strip_prefix("Winner of M") {
            return parse_id(rest).map(Placeholder::WinnerOf);
        }
        if let Some(rest) = trimmed.strip_prefix("Loser of M") {
            return parse_id(rest).map(Placeholder::LoserOf);
        }
        Err(BracketError::InvalidPlaceholder(trimmed.to_string()))
    }
}

/// A score as typed by the operator. `WO` marks the player awarded the walkover.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Score(String);

impl Score {
    pub fn walkover() -> Score {
        Score(WALKOVER.to_string())
    }

    /// Parse operator input. Empty input and `--` mean "no score".
    pub fn parse(raw: &str) -> Option<Score> {
        let trimmed = raw.trim();
        if trimmed.is_empty() || trimmed == CLEARED_SCORE {
            return None;
        }
        if trimmed.eq_ignore_ascii_case(WALKOVER) {
            return Some(Score::walkover());
        }
        Some(Score(trimmed.to_string()))
    }

    pub fn is_walkover(&self) -> bool {
        self.0.trim().eq_ignore_ascii_case(WALKOVER)
    }

    pub fn points(&self) -> Option<i64> {
        self.0.trim().parse::<i64>().ok()
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for Score {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Player {
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub seed: Option<u32>,
    #[serde(default, skip_serializing_if = "is_false")]
    pub is_bye: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub score: Option<Score>,
}

impl Player {
    pub fn new(name: impl Into<String>) -> Self {
        Player {
            name: name.into(),
            seed: None,
            is_bye: false,
            score: None,
        }
    }

    pub fn seeded(name: impl Into<String>, seed: u32) -> Self {
        Player {
            seed: Some(seed),
            ..Player::new(name)
        }
    }

    pub fn bye(number: usize) -> Self {
        Player {
            is_bye: true,
            ..Player::new(format!("{BYE_PREFIX}{number}"))
        }
    }

    /// Copy of this player as it enters its next slot: the per-match score stays behind.
    pub fn advancing(&self) -> Player {
        Player {
            score: None,
            ..self.clone()
        }
    }

    pub fn same_entrant(&self, other: &Player) -> bool {
        self.name == other.name && self.is_bye == other.is_bye
    }

    pub fn has_walkover(&self) -> bool {
        self.score.as_ref().is_some_and(Score::is_walkover)
    }
}

/// Stored shape of a slot; `isPlaceholder` distinguishes symbolic slots.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SlotRecord {
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub seed: Option<u32>,
    #[serde(default, skip_serializing_if = "is_false")]
    pub is_bye: bool,
    #[serde(default, skip_serializing_if = "is_false")]
    pub is_placeholder: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub score: Option<Score>,
}

#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "Option<SlotRecord>", into = "Option<SlotRecord>")]
pub enum MatchSlot {
    #[default]
    Empty,
    Placeholder(Placeholder),
    Occupied(Player),
}

impl MatchSlot {
    pub fn player(&self) -> Option<&Player> {
        match self {
            MatchSlot::Occupied(player) => Some(player),
            _ => None,
        }
    }

    pub fn player_mut(&mut self) -> Option<&mut Player> {
        match self {
            MatchSlot::Occupied(player) => Some(player),
            _ => None,
        }
    }

    pub fn placeholder(&self) -> Option<Placeholder> {
        match self {
            MatchSlot::Placeholder(placeholder) => Some(*placeholder),
            _ => None,
        }
    }

    pub fn is_occupied(&self) -> bool {
        matches!(self, MatchSlot::Occupied(_))
    }

    pub fn holds_bye(&self) -> bool {
        self.player().is_some_and(|player| player.is_bye)
    }
}

impl TryFrom<Option<SlotRecord>> for MatchSlot {
    type Error = BracketError;

    fn try_from(record: Option<SlotRecord>) -> Result<Self, Self::Error> {
        let Some(record) = record else {
            return Ok(MatchSlot::Empty);
        };
        if record.is_placeholder {
            return record.name.parse::<Placeholder>().map(MatchSlot::Placeholder);
        }
        Ok(MatchSlot::Occupied(Player {
            name: record.name,
            seed: record.seed,
            is_bye: record.is_bye,
            score: record.score,
        }))
    }
}

impl From<MatchSlot> for Option<SlotRecord> {
    fn from(slot: MatchSlot) -> Self {
        match slot {
            MatchSlot::Empty => None,
            MatchSlot::Placeholder(placeholder) => Some(SlotRecord {
                name: placeholder.to_string(),
                seed: None,
                is_bye: false,
                is_placeholder: true,
                score: None,
            }),
            MatchSlot::Occupied(player) => Some(SlotRecord {
                name: player.name,
                seed: player.seed,
                is_bye: player.is_bye,
                is_placeholder: false,
                score: player.score,
            }),
        }
    }
}

/// Where an outcome of a match goes. Stored as `M<id>:p1` or `RANK:<label>`.
#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub enum Destination {
    Slot { match_id: MatchId, slot: SlotIndex },
    Ranking(String),
}

impl fmt::Display for Destination {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Destination::Slot { match_id, slot } => write!(f, "M{match_id}:{}", slot.as_str()),
            Destination::Ranking(label) => write!(f, "{RANK_PREFIX}{label}"),
        }
    }
}

impl FromStr for Destination {
    type Err = BracketError;

    fn from_str(raw: &str) -> Result<Self, Self::Err> {
        if let Some(label) = raw.strip_prefix(RANK_PREFIX) {
            return Ok(Destination::Ranking(label.to_string()));
        }
        let invalid = || BracketError::InvalidDestination(raw.to_string());
        let (id, slot) = raw
            .strip_prefix('M')
            .and_then(|rest| rest.split_once(':'))
            .ok_or_else(invalid)?;
        Ok(Destination::Slot {
            match_id: id.parse::<MatchId>().map_err(|_| invalid())?,
            slot: slot.parse::<SlotIndex>().map_err(|_| invalid())?,
        })
    }
}

impl TryFrom<String> for Destination {
    type Error = BracketError;

    fn try_from(raw: String) -> Result<Self, Self::Error> {
        raw.parse()
    }
}

impl From<Destination> for String {
    fn from(destination: Destination) -> Self {
        destination.to_string()
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub enum MatchState {
    Pending,
    Scored,
    Processed,
    Skipped,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Match {
    pub id: MatchId,
    #[serde(default)]
    pub p1: MatchSlot,
    #[serde(default)]
    pub p2: MatchSlot,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub winner_destination: Option<Destination>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub loser_destination: Option<Destination>,
    #[serde(default, skip_serializing_if = "is_false")]
    pub is_champion_box: bool,
    #[serde(default, skip_serializing_if = "is_false")]
    pub is_processed: bool,
    #[serde(default, skip_serializing_if = "is_false")]
    pub is_skipped: bool,
}

impl Match {
    pub fn new(id: MatchId) -> Self {
        Match {
            id,
            p1: MatchSlot::Empty,
            p2: MatchSlot::Empty,
            winner_destination: None,
            loser_destination: None,
            is_champion_box: false,
            is_processed: false,
            is_skipped: false,
        }
    }

    /// Zero-opponent pseudo-match that hands the title to whoever reaches it.
    pub fn champion_box(id: MatchId, final_match: MatchId) -> Self {
        Match {
            p1: MatchSlot::Placeholder(Placeholder::WinnerOf(final_match)),
            winner_destination: Some(Destination::Ranking(FIRST_PLACE.to_string())),
            is_champion_box: true,
            ..Match::new(id)
        }
    }

    pub fn slot(&self, slot: SlotIndex) -> &MatchSlot {
        match slot {
            SlotIndex::P1 => &self.p1,
            SlotIndex::P2 => &self.p2,
        }
    }

    pub fn slot_mut(&mut self, slot: SlotIndex) -> &mut MatchSlot {
        match slot {
            SlotIndex::P1 => &mut self.p1,
            SlotIndex::P2 => &mut self.p2,
        }
    }

    pub fn players(&self) -> Option<(&Player, &Player)> {
        Some((self.p1.player()?, self.p2.player()?))
    }

    pub fn state(&self) -> MatchState {
        if self.is_skipped {
            return MatchState::Skipped;
        }
        if self.is_processed {
            return MatchState::Processed;
        }
        let scored = SlotIndex::BOTH
            .iter()
            .filter_map(|slot| self.slot(*slot).player())
            .any(|player| player.score.is_some());
        if scored {
            MatchState::Scored
        } else {
            MatchState::Pending
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "camelCase")]
pub enum Section {
    Rounds,
    Winners,
    Losers,
    GrandFinal,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct MatchLocation {
    pub section: Section,
    pub round: usize,
    pub position: usize,
}

/// Match ids of the grand-final series of a double elimination bracket.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct GrandFinalLayout {
    pub opener: MatchId,
    pub reset: MatchId,
    pub champion_box: MatchId,
}

#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SingleBracket {
    pub rounds: Vec<Round>,
    #[serde(default)]
    pub ranking: Ranking,
}

#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DoubleBracket {
    #[serde(rename = "winnersBracket")]
    pub winners: Vec<Round>,
    #[serde(rename = "losersBracket")]
    pub losers: Vec<Round>,
    #[serde(rename = "grandFinal")]
    pub grand_final: Vec<Round>,
    #[serde(default)]
    pub ranking: Ranking,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum BracketStructure {
    Single(SingleBracket),
    Double(DoubleBracket),
}

impl BracketStructure {
    pub fn kind(&self) -> BracketKind {
        match self {
            BracketStructure::Single(_) => BracketKind::Single,
            BracketStructure::Double(_) => BracketKind::Double,
        }
    }

    pub fn ranking(&self) -> &Ranking {
        match self {
            BracketStructure::Single(bracket) => &bracket.ranking,
            BracketStructure::Double(bracket) => &bracket.ranking,
        }
    }

    pub fn ranking_mut(&mut self) -> &mut Ranking {
        match self {
            BracketStructure::Single(bracket) => &mut bracket.ranking,
            BracketStructure::Double(bracket) => &mut bracket.ranking,
        }
    }

    /// Sections in layout order; match ids grow along this order.
    pub fn sections(&self) -> Vec<(Section, &[Round])> {
        match self {
            BracketStructure::Single(bracket) => vec![(Section::Rounds, bracket.rounds.as_slice())],
            BracketStructure::Double(bracket) => vec![
                (Section::Winners, bracket.winners.as_slice()),
                (Section::Losers, bracket.losers.as_slice()),
                (Section::GrandFinal, bracket.grand_final.as_slice()),
            ],
        }
    }

    fn section_mut(&mut self, section: Section) -> Option<&mut Vec<Round>> {
        match (self, section) {
            (BracketStructure::Single(bracket), Section::Rounds) => Some(&mut bracket.rounds),
            (BracketStructure::Double(bracket), Section::Winners) => Some(&mut bracket.winners),
            (BracketStructure::Double(bracket), Section::Losers) => Some(&mut bracket.losers),
            (BracketStructure::Double(bracket), Section::GrandFinal) => Some(&mut bracket.grand_final),
            _ => None,
        }
    }

    pub fn matches(&self) -> impl Iterator<Item = &Match> + '_ {
        self
            .sections()
            .into_iter()
            .flat_map(|(_, rounds)| rounds.iter().flatten().map(|m| m.as_ref()))
    }

    /// Every match location in layout order.
    pub fn locations(&self) -> Vec<(MatchId, MatchLocation)> {
        let mut out = Vec::new();
        for (section, rounds) in self.sections() {
            for (round, matches) in rounds.iter().enumerate() {
                for (position, m) in matches.iter().enumerate() {
                    out.push((m.id, MatchLocation { section, round, position }));
                }
            }
        }
        out
    }

    pub fn index(&self) -> HashMap<MatchId, MatchLocation> {
        self.locations().into_iter().collect()
    }

    pub fn get(&self, location: MatchLocation) -> Option<&Match> {
        self
            .sections()
            .into_iter()
            .find(|(section, _)| *section == location.section)
            .and_then(|(_, rounds)| rounds.get(location.round))
            .and_then(|round| round.get(location.position))
            .map(|m| m.as_ref())
    }

    /// Mutable access; a match shared with a history snapshot is copied first.
    pub fn get_mut(&mut self, location: MatchLocation) -> Option<&mut Match> {
        self
            .section_mut(location.section)?
            .get_mut(location.round)?
            .get_mut(location.position)
            .map(Arc::make_mut)
    }

    pub fn find(&self, id: MatchId) -> Option<&Match> {
        self.matches().find(|m| m.id == id)
    }

    pub fn find_mut(&mut self, id: MatchId) -> Option<&mut Match> {
        let location = self.locations().into_iter().find(|(match_id, _)| *match_id == id)?.1;
        self.get_mut(location)
    }

    pub fn first_round(&self) -> Option<&Round> {
        match self {
            BracketStructure::Single(bracket) => bracket.rounds.first(),
            BracketStructure::Double(bracket) => bracket.winners.first(),
        }
    }

    pub fn first_round_mut(&mut self) -> Option<&mut Round> {
        match self {
            BracketStructure::Single(bracket) => bracket.rounds.first_mut(),
            BracketStructure::Double(bracket) => bracket.winners.first_mut(),
        }
    }

    pub fn grand_final_layout(&self) -> Option<GrandFinalLayout> {
        let BracketStructure::Double(bracket) = self else {
            return None;
        };
        let [opener, reset, champion_box] = bracket.grand_final.as_slice() else {
            return None;
        };
        let champion_box = champion_box.first().filter(|m| m.is_champion_box)?;
        Some(GrandFinalLayout {
            opener: opener.first()?.id,
            reset: reset.first()?.id,
            champion_box: champion_box.id,
        })
    }

    /// Real matches, champion box excluded.
    pub fn match_count(&self) -> usize {
        self.matches().filter(|m| !m.is_champion_box).count()
    }

    pub fn ranked_players(&self) -> usize {
        self.ranking().values().map(Vec::len).sum()
    }
}

fn is_false(value: &bool) -> bool {
    !*value
}
