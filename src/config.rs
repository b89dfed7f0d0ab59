use std::env;
use std::path::PathBuf;

use anyhow::{anyhow, Result};
use serde::{Deserialize, Serialize};

use crate::store;

pub const CONFIG_FILE: &str = "lvsync_config.json";

/// On-disk configuration. Every field can also be given on the command
/// line; arguments win over the file.
#[derive(Debug, Default, Clone, Serialize, Deserialize)]
pub struct FileConfig {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub login_url: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub user: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub password: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub cli: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub excluded_rooms: Option<Vec<String>>,
}

impl FileConfig {
    /// Later layers overwrite earlier ones, key by key.
    fn update_from(&mut self, other: FileConfig) {
        if other.login_url.is_some() { self.login_url = other.login_url; }
        if other.user.is_some() { self.user = other.user; }
        if other.password.is_some() { self.password = other.password; }
        if other.cli.is_some() { self.cli = other.cli; }
        if other.excluded_rooms.is_some() { self.excluded_rooms = other.excluded_rooms; }
    }
}

/// Read order: program dir, site config, user config, working dir.
fn config_locations() -> Vec<PathBuf> {
    let mut locations = vec![];
    if let Ok(exe) = env::current_exe() {
        if let Some(dir) = exe.parent() {
            locations.push(dir.to_path_buf());
        }
    }
    if let Some(dir) = store::site_config_dir() {
        locations.push(dir);
    }
    if let Some(dir) = store::user_config_dir() {
        locations.push(dir);
    }
    if let Ok(dir) = env::current_dir() {
        locations.push(dir);
    }
    locations
}

/// Reads every config layer that exists, later layers updating earlier
/// ones. A broken file only warns: a stray config must never block the
/// tools.
pub fn load_layered() -> FileConfig {
    let mut config = FileConfig::default();
    let mut seen: Vec<PathBuf> = vec![];
    for location in config_locations() {
        let path = location.join(CONFIG_FILE);
        if !path.is_file() {
            continue;
        }
        let canonical = path.canonicalize().unwrap_or_else(|_| path.clone());
        if seen.contains(&canonical) {
            continue;
        }
        seen.push(canonical);
        println!("Reading config file {}", path.display());
        match store::load_json::<FileConfig>(&path) {
            Ok(layer) => config.update_from(layer),
            Err(e) => println!("Warning: error reading config file {}:\n  {}", path.display(), e),
        }
    }
    config
}

/// Writes the login url to the user config file, keeping whatever else
/// is already in it.
pub fn remember_login_url(url: &str) -> Result<()> {
    let dir = store::user_config_dir()
        .ok_or_else(|| anyhow!("no user config directory on this system"))?;
    let path = dir.join(CONFIG_FILE);
    let mut config = if path.is_file() {
        store::load_json::<FileConfig>(&path).unwrap_or_default()
    } else {
        FileConfig::default()
    };
    config.login_url = Some(url.to_string());
    store::save_json(&path, &config)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_update_from_overwrites_only_set_keys() {
        let mut base = FileConfig {
            login_url: Some("https://a.example/login".into()),
            user: Some("al".into()),
            ..Default::default()
        };
        base.update_from(FileConfig {
            user: Some("bob".into()),
            cli: Some(true),
            ..Default::default()
        });
        assert_eq!(base.login_url.as_deref(), Some("https://a.example/login"));
        assert_eq!(base.user.as_deref(), Some("bob"));
        assert_eq!(base.cli, Some(true));
    }

    #[test]
    fn test_unknown_keys_are_ignored() {
        let parsed: FileConfig =
            serde_json::from_str(r#"{"login_url":"https://x.example/login","legacy_key":1}"#).unwrap();
        assert_eq!(parsed.login_url.as_deref(), Some("https://x.example/login"));
    }
}
