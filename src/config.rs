//! Persistent configuration
//!
//! Loaded from `<config dir>/dbcell/config.toml`; missing or unreadable files
//! fall back to defaults so a fresh install works without any setup.
use std::path::PathBuf;

use serde::{Deserialize, Serialize};
use tracing::debug;

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Sticky output format a new dispatcher starts with.
    pub default_format: String,
    /// Magic command name the completer answers to (without the percent
    /// prefix).
    pub completion_command: String,
    /// Whether the host should install the completer at all.
    pub autocomplete_enabled: bool,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            default_format: "table".to_string(),
            completion_command: "dql".to_string(),
            autocomplete_enabled: true,
        }
    }
}

impl Config {
    pub fn config_path() -> Option<PathBuf> {
        dirs::config_dir().map(|dir| dir.join("dbcell").join("config.toml"))
    }

    /// Load the config file, falling back to defaults on any failure.
    pub fn load() -> Self {
        let Some(path) = Self::config_path() else {
            return Self::default();
        };
        match std::fs::read_to_string(&path) {
            Ok(contents) => toml::from_str(&contents).unwrap_or_else(|e| {
                debug!(path = %path.display(), error = %e, "invalid config, using defaults");
                Self::default()
            }),
            Err(_) => Self::default(),
        }
    }

    /// Write the config file, creating the directory if needed.
    pub fn save(&self) -> std::io::Result<()> {
        let Some(path) = Self::config_path() else {
            return Err(std::io::Error::new(
                std::io::ErrorKind::NotFound,
                "no config directory on this platform",
            ));
        };
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let contents = toml::to_string_pretty(self)
            .map_err(|e| std::io::Error::new(std::io::ErrorKind::InvalidData, e.to_string()))?;
        std::fs::write(path, contents)
    }
}
