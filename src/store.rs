use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{anyhow, Result};
use serde::de::DeserializeOwned;
use serde::Serialize;

pub const APP_DIR: &str = "lvsync";

/// Per-user config directory, created on demand by `save_json`.
pub fn user_config_dir() -> Option<PathBuf> {
  dirs::config_dir().map(|d| d.join(APP_DIR))
}

/// Machine-wide config directory. Only meaningful on unix; the windows
/// builds simply skip this layer.
pub fn site_config_dir() -> Option<PathBuf> {
  if cfg!(unix) {
    Some(PathBuf::from("/etc/xdg").join(APP_DIR))
  } else {
    None
  }
}

pub fn cache_dir() -> Option<PathBuf> {
  dirs::cache_dir().map(|d| d.join(APP_DIR))
}

pub fn load_json<T: DeserializeOwned>(path: &Path) -> Result<T> {
  let contents = fs::read_to_string(path)
    .map_err(|_| anyhow!("could not read file {}", path.display()))?;
  serde_json::from_str(&contents)
    .map_err(|e| anyhow!("could not parse file {}: {}", path.display(), e))
}

pub fn save_json<T: Serialize>(path: &Path, value: &T) -> Result<()> {
  if let Some(parent) = path.parent() {
    fs::create_dir_all(parent)
      .map_err(|_| anyhow!("could not create directory {}", parent.display()))?;
  }
  let contents = serde_json::to_string_pretty(value)
    .map_err(|_| anyhow!("could not serialize {}", path.display()))?;
  fs::write(path, contents)
    .map_err(|_| anyhow!("could not write to file {}", path.display()))
}

#[cfg(test)]
mod tests {
  use super::*;
  use std::collections::BTreeMap;

  #[test]
  fn test_json_round_trip() {
    let path = std::env::temp_dir().join("lvsync_store_test").join("t.json");
    let mut m = BTreeMap::new();
    m.insert("a".to_string(), 1u32);
    save_json(&path, &m).unwrap();
    let back: BTreeMap<String, u32> = load_json(&path).unwrap();
    assert_eq!(back, m);
    let _ = fs::remove_file(&path);
  }

  #[test]
  fn test_load_missing_file_is_an_error() {
    let path = std::env::temp_dir().join("lvsync_store_test_missing.json");
    let r: Result<BTreeMap<String, u32>> = load_json(&path);
    assert!(r.is_err());
  }
}
