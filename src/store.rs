use chrono::NaiveDate;
use rand::Rng;
use serde::{Deserialize, Serialize};
use std::{
  fs,
  path::{Path, PathBuf},
};
use tracing::{info, warn};

use crate::config::now_ms;
use crate::history::SessionState;
use crate::tournament::Tournament;
use crate::types::{BracketKind, PUBLIC_ID_LEN};

/// One stored tournament; `bracketData` carries the whole session so undo
/// survives a restart.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TournamentRecord {
  pub public_id: String,
  pub name: String,
  pub tournament_date: NaiveDate,
  #[serde(rename = "type")]
  pub kind: BracketKind,
  pub bracket_data: SessionState,
  #[serde(default)]
  pub updated_at_ms: u64,
}

impl TournamentRecord {
  pub fn from_tournament(public_id: String, tournament: Tournament) -> Self {
    TournamentRecord {
      public_id,
      name: tournament.name,
      tournament_date: tournament.date,
      kind: tournament.kind,
      bracket_data: tournament.session,
      updated_at_ms: now_ms(),
    }
  }

  pub fn summary(&self) -> TournamentSummary {
    TournamentSummary {
      public_id: self.public_id.clone(),
      name: self.name.clone(),
      tournament_date: self.tournament_date,
      kind: self.kind,
    }
  }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TournamentSummary {
  pub public_id: String,
  pub name: String,
  pub tournament_date: NaiveDate,
  #[serde(rename = "type")]
  pub kind: BracketKind,
}

pub fn generate_public_id<R: Rng + ?Sized>(rng: &mut R) -> String {
  format!("{:0width$x}", rng.gen::<u32>(), width = PUBLIC_ID_LEN)
}

pub fn is_valid_public_id(id: &str) -> bool {
  id.len() == PUBLIC_ID_LEN && id.chars().all(|c| matches!(c, '0'..='9' | 'a'..='f'))
}

/// JSON file per tournament under `<data dir>/tournaments/`.
#[derive(Debug, Clone)]
pub struct TournamentStore {
  dir: PathBuf,
}

impl TournamentStore {
  pub fn open(data_dir: &Path) -> Result<Self, String> {
    let dir = data_dir.join("tournaments");
    fs::create_dir_all(&dir).map_err(|e| format!("create store dir {}: {e}", dir.display()))?;
    Ok(TournamentStore { dir })
  }

  pub fn dir(&self) -> &Path {
    &self.dir
  }

  fn path_for(&self, id: &str) -> Option<PathBuf> {
    is_valid_public_id(id).then(|| self.dir.join(format!("{id}.json")))
  }

  /// Newest tournament first, then by name. Unreadable files are skipped.
  pub fn list(&self) -> Result<Vec<TournamentSummary>, String> {
    let entries = fs::read_dir(&self.dir).map_err(|e| format!("read store dir {}: {e}", self.dir.display()))?;
    let mut summaries = Vec::new();
    for entry in entries.flatten() {
      let path = entry.path();
      if path.extension().and_then(|ext| ext.to_str()) != Some("json") {
        continue;
      }
      let parsed = fs::read_to_string(&path)
        .map_err(|e| e.to_string())
        .and_then(|data| serde_json::from_str::<TournamentSummary>(&data).map_err(|e| e.to_string()));
      match parsed {
        Ok(summary) => summaries.push(summary),
        Err(err) => warn!("skipping unreadable tournament file {}: {err}", path.display()),
      }
    }
    summaries.sort_by(|a, b| {
      b.tournament_date
        .cmp(&a.tournament_date)
        .then_with(|| a.name.cmp(&b.name))
    });
    Ok(summaries)
  }

  pub fn get(&self, id: &str) -> Result<Option<TournamentRecord>, String> {
    let Some(path) = self.path_for(id) else {
      return Ok(None);
    };
    if !path.is_file() {
      return Ok(None);
    }
    let data = fs::read_to_string(&path).map_err(|e| format!("read tournament {}: {e}", path.display()))?;
    let record = serde_json::from_str::<TournamentRecord>(&data)
      .map_err(|e| format!("parse tournament {}: {e}", path.display()))?;
    Ok(Some(record))
  }

  /// Store a new tournament under a fresh public id.
  pub fn create<R: Rng + ?Sized>(&self, tournament: Tournament, rng: &mut R) -> Result<TournamentRecord, String> {
    let mut public_id = generate_public_id(rng);
    let mut attempts = 1;
    while self.dir.join(format!("{public_id}.json")).exists() {
      if attempts >= 32 {
        return Err("could not allocate a free tournament id".to_string());
      }
      public_id = generate_public_id(rng);
      attempts += 1;
    }
    let record = TournamentRecord::from_tournament(public_id, tournament);
    self.save(&record)?;
    info!(id = %record.public_id, name = %record.name, "tournament stored");
    Ok(record)
  }

  /// Overwrite the stored copy.
  pub fn save(&self, record: &TournamentRecord) -> Result<(), String> {
    let path = self
      .path_for(&record.public_id)
      .ok_or_else(|| format!("invalid tournament id `{}`", record.public_id))?;
    let payload = serde_json::to_string_pretty(record).map_err(|e| e.to_string())?;
    let tmp = path.with_extension("json.tmp");
    fs::write(&tmp, payload).map_err(|e| format!("write tournament {}: {e}", tmp.display()))?;
    fs::rename(&tmp, &path).map_err(|e| format!("replace tournament {}: {e}", path.display()))?;
    Ok(())
  }

  pub fn delete(&self, id: &str) -> Result<bool, String> {
    let Some(path) = self.path_for(id) else {
      return Ok(false);
    };
    if !path.is_file() {
      return Ok(false);
    }
    fs::remove_file(&path).map_err(|e| format!("delete tournament {}: {e}", path.display()))?;
    info!(id, "tournament deleted");
    Ok(true)
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::types::SlotIndex;
  use crate::types::Score;
  use rand::SeedableRng;
  use rand_chacha::ChaCha8Rng;

  fn tournament(name: &str, day: u32, rng: &mut ChaCha8Rng) -> Tournament {
    let date = NaiveDate::from_ymd_opt(2024, 3, day).unwrap();
    Tournament::create(name, date, BracketKind::Double, "1. Ana\n2. Bo\nCy\nDi", rng).unwrap()
  }

  #[test]
  fn test_public_ids() {
    let mut rng = ChaCha8Rng::seed_from_u64(5);
    let id = generate_public_id(&mut rng);
    assert!(is_valid_public_id(&id), "{id}");
    assert!(!is_valid_public_id("../../etc"));
    assert!(!is_valid_public_id("ABCDEF12"));
    assert!(!is_valid_public_id("abc"));
  }

  #[test]
  fn test_create_get_save_delete() {
    let dir = tempfile::tempdir().unwrap();
    let store = TournamentStore::open(dir.path()).unwrap();
    let mut rng = ChaCha8Rng::seed_from_u64(9);

    let mut record = store.create(tournament("Weekly", 1, &mut rng), &mut rng).unwrap();
    let loaded = store.get(&record.public_id).unwrap().unwrap();
    assert_eq!(loaded, record);

    let first = record.bracket_data.current().first_round().unwrap()[0].id;
    assert!(record
      .bracket_data
      .update_score(first, SlotIndex::P1, Score::parse("2"))
      .unwrap());
    store.save(&record).unwrap();
    let reloaded = store.get(&record.public_id).unwrap().unwrap();
    assert!(reloaded.bracket_data.history_state().can_undo);
    assert_eq!(reloaded.bracket_data.current(), record.bracket_data.current());

    assert!(store.delete(&record.public_id).unwrap());
    assert!(!store.delete(&record.public_id).unwrap());
    assert_eq!(store.get(&record.public_id).unwrap(), None);
  }

  #[test]
  fn test_list_sorts_newest_first_and_skips_junk() {
    let dir = tempfile::tempdir().unwrap();
    let store = TournamentStore::open(dir.path()).unwrap();
    let mut rng = ChaCha8Rng::seed_from_u64(1);
    store.create(tournament("Older", 2, &mut rng), &mut rng).unwrap();
    store.create(tournament("Newer B", 9, &mut rng), &mut rng).unwrap();
    store.create(tournament("Newer A", 9, &mut rng), &mut rng).unwrap();
    fs::write(store.dir().join("deadbeef.json"), "not json").unwrap();

    let names: Vec<String> = store.list().unwrap().into_iter().map(|s| s.name).collect();
    assert_eq!(names, vec!["Newer A", "Newer B", "Older"]);
  }

  #[test]
  fn test_stored_record_uses_type_field() {
    let dir = tempfile::tempdir().unwrap();
    let store = TournamentStore::open(dir.path()).unwrap();
    let mut rng = ChaCha8Rng::seed_from_u64(4);
    let record = store.create(tournament("Cup", 3, &mut rng), &mut rng).unwrap();
    let raw = fs::read_to_string(store.dir().join(format!("{}.json", record.public_id))).unwrap();
    let value: serde_json::Value = serde_json::from_str(&raw).unwrap();
    assert_eq!(value["type"], "double");
    assert_eq!(value["tournamentDate"], "2024-03-03");
    assert_eq!(value["bracketData"]["current"]["type"], "double");
  }
}
