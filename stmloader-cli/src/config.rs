//! Persistent CLI configuration.
//!
//! Configuration is read from `stmloader.toml` in the current directory
//! first, then from the per-user config directory. Saving always writes
//! to the per-user location.

use directories::ProjectDirs;
use log::{debug, warn};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

const LOCAL_CONFIG: &str = "stmloader.toml";

/// Persisted settings.
#[derive(Debug, Default, Clone, Serialize, Deserialize)]
pub(crate) struct Config {
    /// Remembered serial port.
    pub(crate) port: Option<String>,
}

impl Config {
    /// Load configuration, preferring a project-local file over the
    /// per-user one. Missing or unreadable files yield the defaults.
    pub(crate) fn load() -> Self {
        let local = PathBuf::from(LOCAL_CONFIG);
        if local.is_file() {
            if let Some(config) = Self::read_file(&local) {
                debug!("Loaded config from {}", local.display());
                return config;
            }
        }

        if let Some(path) = Self::global_path() {
            if path.is_file() {
                if let Some(config) = Self::read_file(&path) {
                    debug!("Loaded config from {}", path.display());
                    return config;
                }
            }
        }

        Self::default()
    }

    /// Save configuration to the per-user config directory.
    pub(crate) fn save(&self) {
        let Some(path) = Self::global_path() else {
            warn!("No config directory available, settings not saved");
            return;
        };
        if let Some(parent) = path.parent() {
            if let Err(e) = std::fs::create_dir_all(parent) {
                warn!("Could not create {}: {e}", parent.display());
                return;
            }
        }
        match toml::to_string_pretty(self) {
            Ok(text) => {
                if let Err(e) = std::fs::write(&path, text) {
                    warn!("Could not write {}: {e}", path.display());
                } else {
                    debug!("Saved config to {}", path.display());
                }
            }
            Err(e) => warn!("Could not serialize config: {e}"),
        }
    }

    fn read_file(path: &std::path::Path) -> Option<Self> {
        let text = std::fs::read_to_string(path).ok()?;
        match toml::from_str(&text) {
            Ok(config) => Some(config),
            Err(e) => {
                warn!("Ignoring malformed config {}: {e}", path.display());
                None
            }
        }
    }

    fn global_path() -> Option<PathBuf> {
        ProjectDirs::from("", "", "stmloader").map(|dirs| dirs.config_dir().join("config.toml"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_config_toml_round_trip() {
        let config = Config {
            port: Some("/dev/ttyACM0".to_string()),
        };
        let text = toml::to_string_pretty(&config).unwrap();
        let back: Config = toml::from_str(&text).unwrap();
        assert_eq!(back.port.as_deref(), Some("/dev/ttyACM0"));
    }

    #[test]
    fn test_config_defaults_on_empty() {
        let config: Config = toml::from_str("").unwrap();
        assert!(config.port.is_none());
    }

    #[test]
    fn test_read_file_rejects_garbage() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.toml");
        std::fs::write(&path, "port = [not toml").unwrap();
        assert!(Config::read_file(&path).is_none());
    }
}
