//! Launcher configuration.
//!
//! Stored as JSON in `$LODESTONE_CONFIG` or `<config dir>/lodestone/config.json`.
//! Missing fields fall back to their defaults.

use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

const CONFIG_ENV: &str = "LODESTONE_CONFIG";

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("config IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("invalid config: {0}")]
    Parse(#[from] serde_json::Error),
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// How often the UI loop drains host events (ms).
    pub poll_interval_ms: u64,
    /// How often the window maximize state is polled while observed (ms).
    pub window_poll_ms: u64,
    /// Default `env_logger` filter; `RUST_LOG` wins when set.
    pub log_filter: String,
    /// Profiles whose run state is checked at startup.
    pub profiles: Vec<String>,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            poll_interval_ms: 50,
            window_poll_ms: 500,
            log_filter: "info".to_string(),
            profiles: vec!["default".to_string()],
        }
    }
}

impl Config {
    /// `$LODESTONE_CONFIG` if set, else the per-user config directory.
    pub fn default_path() -> Option<PathBuf> {
        if let Some(path) = std::env::var_os(CONFIG_ENV) {
            return Some(PathBuf::from(path));
        }
        dirs::config_dir().map(|dir| dir.join("lodestone").join("config.json"))
    }

    /// Read the config at `path`. A missing file is not an error.
    pub fn try_load(path: &Path) -> Result<Self, ConfigError> {
        if !path.exists() {
            return Ok(Self::default());
        }
        let content = fs::read_to_string(path)?;
        Ok(serde_json::from_str(&content)?)
    }

    pub fn save(&self, path: &Path) -> Result<(), ConfigError> {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }
        let json = serde_json::to_string_pretty(self)?;
        fs::write(path, json)?;
        Ok(())
    }

    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms.max(1))
    }

    pub fn window_poll_interval(&self) -> Duration {
        Duration::from_millis(self.window_poll_ms)
    }
}
