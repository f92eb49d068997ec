use crate::types::*;
use std::{
  env,
  fs,
  path::{Path, PathBuf},
  time::{SystemTime, UNIX_EPOCH},
};

pub fn base_dir() -> PathBuf {
  env::current_dir().unwrap_or_else(|_| PathBuf::from("."))
}

pub fn resolve_path(raw: &str) -> PathBuf {
  let path = PathBuf::from(raw.trim());
  if path.is_absolute() {
    path
  } else {
    base_dir().join(path)
  }
}

pub fn config_path() -> PathBuf {
  match env_default("BRACKET_CONFIG_PATH") {
    Some(raw) => resolve_path(&raw),
    None => base_dir().join("config.json"),
  }
}

pub fn env_default(key: &str) -> Option<String> {
  env::var(key)
    .ok()
    .map(|value| value.trim().to_string())
    .filter(|value| !value.is_empty())
}

fn env_parsed<T: std::str::FromStr>(key: &str) -> Option<T> {
  let raw = env_default(key)?;
  match raw.parse::<T>() {
    Ok(value) => Some(value),
    Err(_) => {
      tracing::warn!("{key}={raw} is not a valid value; ignoring");
      None
    }
  }
}

/// Fill empty fields from `BRACKET_*` variables, then from built-in defaults.
pub fn apply_env_defaults(mut config: EngineConfig) -> EngineConfig {
  if config.bind_addr.trim().is_empty() {
    config.bind_addr = env_default("BRACKET_BIND_ADDR").unwrap_or_else(|| DEFAULT_BIND_ADDR.to_string());
  }
  if config.data_dir.trim().is_empty() {
    config.data_dir = env_default("BRACKET_DATA_DIR").unwrap_or_else(|| DEFAULT_DATA_DIR.to_string());
  }
  if config.static_dir.trim().is_empty() {
    if let Some(value) = env_default("BRACKET_STATIC_DIR") {
      config.static_dir = value;
    }
  }
  if config.log_dir.trim().is_empty() {
    config.log_dir = env_default("BRACKET_LOG_DIR").unwrap_or_else(|| DEFAULT_LOG_DIR.to_string());
  }
  if config.history_limit == 0 {
    config.history_limit = env_parsed("BRACKET_HISTORY_LIMIT").unwrap_or(DEFAULT_HISTORY_LIMIT);
  }
  if config.shuffle_seed.is_none() {
    config.shuffle_seed = env_parsed("BRACKET_SHUFFLE_SEED");
  }
  config
}

pub fn load_config_from(path: &Path) -> Result<EngineConfig, String> {
  if !path.is_file() {
    return Ok(apply_env_defaults(EngineConfig::default()));
  }
  let data = fs::read_to_string(path).map_err(|e| format!("read config {}: {e}", path.display()))?;
  let config =
    serde_json::from_str::<EngineConfig>(&data).map_err(|e| format!("parse config {}: {e}", path.display()))?;
  Ok(apply_env_defaults(config))
}

pub fn load_config() -> Result<EngineConfig, String> {
  load_config_from(&config_path())
}

pub fn load_env_file() {
  let env_path = base_dir().join(".env");
  if !env_path.is_file() {
    return;
  }
  let contents = match fs::read_to_string(&env_path) {
    Ok(data) => data,
    Err(_) => return,
  };
  for line in contents.lines() {
    if let Some((key, value)) = parse_env_line(line) {
      if env::var_os(&key).is_none() {
        env::set_var(key, value);
      }
    }
  }
}

pub fn parse_env_line(line: &str) -> Option<(String, String)> {
  let trimmed = line.trim();
  if trimmed.is_empty() || trimmed.starts_with('#') {
    return None;
  }
  let trimmed = trimmed.strip_prefix("export ").unwrap_or(trimmed);
  let (key, raw_value) = trimmed.split_once('=')?;
  let key = key.trim();
  if key.is_empty() {
    return None;
  }
  let mut value = raw_value.trim();
  if value.starts_with('"') && value.ends_with('"') && value.len() >= 2 {
    value = &value[1..value.len() - 1];
  } else if value.starts_with('\'') && value.ends_with('\'') && value.len() >= 2 {
    value = &value[1..value.len() - 1];
  } else if let Some(idx) = value.find('#') {
    value = value[..idx].trim_end();
  }
  Some((key.to_string(), value.to_string()))
}

pub fn static_dir(config: &EngineConfig) -> Option<PathBuf> {
  let trimmed = config.static_dir.trim();
  if trimmed.is_empty() {
    return None;
  }
  Some(resolve_path(trimmed))
}

pub fn now_ms() -> u64 {
  SystemTime::now()
    .duration_since(UNIX_EPOCH)
    .unwrap_or_default()
    .as_millis() as u64
}

pub fn log_config_warnings(config: &EngineConfig) {
  let mut warnings = Vec::new();
  if let Some(dir) = static_dir(config) {
    if !dir.is_dir() {
      warnings.push(format!("static dir {} does not exist; only the API will be served", dir.display()));
    }
  }
  if config.shuffle_seed.is_some() {
    warnings.push("BRACKET_SHUFFLE_SEED is set; player placement is deterministic".to_string());
  }
  for msg in warnings {
    tracing::warn!("{}", msg);
  }
}
