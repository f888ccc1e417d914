use std::{
    fs,
    path::{Path, PathBuf},
};

use directories::ProjectDirs;
use log::{debug, error, info};
use serde::{Deserialize, Serialize};

use crate::{NoteError, RepeatPolicy, Result};

/// Application configuration settings.
#[derive(Debug, Serialize, Deserialize, Clone, PartialEq, Eq)]
#[serde(default)]
pub struct Config {
    /// Directory where notes and reminders are stored
    pub data_dir: PathBuf,

    /// Whether reminders scheduled before "now" are refused
    pub reject_past_reminders: bool,

    /// Repeat policy offered when a note has no reminder yet
    pub default_repeat: RepeatPolicy,
}

impl Default for Config {
    fn default() -> Self {
        let data_dir = ProjectDirs::from("com", "android", "notepad")
            .map(|dirs| dirs.data_dir().to_path_buf())
            .unwrap_or_else(|| PathBuf::from(".notepad"));

        Self {
            data_dir,
            reject_past_reminders: true,
            default_repeat: RepeatPolicy::None,
        }
    }
}

impl Config {
    /// Where the configuration file lives when no path is given
    pub fn default_path() -> PathBuf {
        ProjectDirs::from("com", "android", "notepad")
            .map(|dirs| dirs.config_dir().join("config.json"))
            .unwrap_or_else(|| PathBuf::from(".notepad/config.json"))
    }

    /// Reads the configuration, falling back to defaults when the file is missing
    pub fn load(path: &Path) -> Result<Self> {
        if !path.exists() {
            debug!("No config at {}, using defaults", path.display());
            return Ok(Self::default());
        }

        let content = fs::read_to_string(path)?;
        let config: Config = serde_json::from_str(&content).map_err(|e| {
            error!("Failed to parse config {}: {}", path.display(), e);
            NoteError::ConfigError {
                message: format!("{}: {}", path.display(), e),
            }
        })?;

        info!("Loaded configuration from {}", path.display());
        Ok(config)
    }

    pub fn save(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() && !parent.exists() {
                fs::create_dir_all(parent).map_err(|e| {
                    error!("Failed to create config directory {}: {}", parent.display(), e);
                    NoteError::DirectoryError {
                        path: parent.to_path_buf(),
                    }
                })?;
            }
        }

        fs::write(path, serde_json::to_string_pretty(self)?)?;
        info!("Saved configuration to {}", path.display());
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn missing_file_gives_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let config = Config::load(&dir.path().join("absent.json")).unwrap();
        assert_eq!(config, Config::default());
        assert!(config.reject_past_reminders);
    }

    #[test]
    fn save_then_load_keeps_settings() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join("config.json");
        let config = Config {
            data_dir: dir.path().join("data"),
            reject_past_reminders: false,
            default_repeat: RepeatPolicy::Monthly,
        };
        config.save(&path).unwrap();
        assert_eq!(Config::load(&path).unwrap(), config);
    }

    #[test]
    fn partial_file_fills_in_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.json");
        fs::write(&path, r#"{ "default_repeat": "daily" }"#).unwrap();

        let config = Config::load(&path).unwrap();
        assert_eq!(config.default_repeat, RepeatPolicy::Daily);
        assert!(config.reject_past_reminders);
    }

    #[test]
    fn malformed_file_is_a_config_error() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.json");
        fs::write(&path, "not json").unwrap();
        assert!(matches!(
            Config::load(&path),
            Err(NoteError::ConfigError { .. })
        ));
    }
}
