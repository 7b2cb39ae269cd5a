//! Configuration module for utimer defaults
use std::env;
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::checkloop::DEFAULT_QUANTUM;
use crate::context::DEFAULT_REFRESH;
use crate::error::ConfigError;
use crate::timer::{DisplayOptions, Precision};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Milliseconds between two redraws of the status line.
    pub refresh_ms: u64,
    /// Longest single sleep of the check loop, in milliseconds.
    pub quantum_ms: u64,
    pub precision: Precision,
    pub display: DisplayOptions,
    /// Exit with status 0 when the run is ended with the quit key.
    pub quit_with_success: bool,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            refresh_ms: DEFAULT_REFRESH.as_millis() as u64,
            quantum_ms: DEFAULT_QUANTUM.as_millis() as u64,
            precision: Precision::default(),
            display: DisplayOptions::default(),
            quit_with_success: false,
        }
    }
}

impl Config {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn refresh(&self) -> Duration {
        Duration::from_millis(self.refresh_ms.max(1))
    }

    pub fn quantum(&self) -> Duration {
        Duration::from_millis(self.quantum_ms)
    }

    /// `$HOME/.config/utimer/config.json`, or `utimer-config.json` in the
    /// working directory when there is no home.
    pub fn default_path() -> PathBuf {
        match env::var_os("HOME") {
            Some(home) => PathBuf::from(home).join(".config").join("utimer").join("config.json"),
            None => PathBuf::from("utimer-config.json"),
        }
    }

    pub fn load_from(path: &Path) -> Result<Self, ConfigError> {
        let content = fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        serde_json::from_str(&content).map_err(|source| ConfigError::Parse {
            path: path.to_path_buf(),
            source,
        })
    }

    pub fn save_to(&self, path: &Path) -> Result<(), ConfigError> {
        let write_error = |source| ConfigError::Write {
            path: path.to_path_buf(),
            source,
        };
        if let Some(parent) = path.parent()
            && !parent.as_os_str().is_empty()
        {
            fs::create_dir_all(parent).map_err(write_error)?;
        }
        let json = serde_json::to_string_pretty(self).map_err(|source| ConfigError::Parse {
            path: path.to_path_buf(),
            source,
        })?;
        fs::write(path, json).map_err(write_error)
    }

    /// Reads the config at `path`. A missing file yields the defaults and
    /// is created for later editing; an unreadable or invalid one yields
    /// the defaults with a warning and is left alone.
    pub fn load_or_default(path: &Path) -> Self {
        if !path.exists() {
            let config = Self::default();
            match config.save_to(path) {
                Ok(()) => debug!(path = %path.display(), "wrote default config"),
                Err(err) => debug!(%err, "could not write default config"),
            }
            return config;
        }
        Self::load_from(path).unwrap_or_else(|err| {
            warn!("{err}, using defaults");
            Self::default()
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_match_the_engine() {
        let config = Config::new();
        assert_eq!(config.quantum(), Duration::from_millis(500));
        assert_eq!(config.refresh(), Duration::from_millis(50));
        assert_eq!(config.precision, Precision::Millisecond);
        assert!(config.display.show_text);
        assert!(!config.quit_with_success);
    }

    #[test]
    fn partial_json_keeps_other_defaults() {
        let json = r#"{"precision": "second", "display": {"show_bar": true}}"#;
        let config: Config = serde_json::from_str(json).unwrap();
        assert_eq!(config.precision, Precision::Second);
        assert!(config.display.show_bar);
        assert!(config.display.show_text);
        assert_eq!(config.quantum_ms, 500);
    }

    #[test]
    fn zero_refresh_is_bumped() {
        let config = Config {
            refresh_ms: 0,
            ..Config::default()
        };
        assert_eq!(config.refresh(), Duration::from_millis(1));
    }
}
