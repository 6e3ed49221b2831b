//! Dispatcher configuration

use serde::{Deserialize, Serialize};
use std::path::Path;
use thiserror::Error;

/// Errors loading a configuration file
#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("failed to read {path}: {source}")]
    Io {
        path: String,
        source: std::io::Error,
    },

    #[error("failed to parse {path}: {source}")]
    Parse {
        path: String,
        source: toml::de::Error,
    },
}

/// Cluster dispatch configuration
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct DispatchConfig {
    /// Acting user encoded in every request header
    #[serde(default = "default_user")]
    pub user: String,

    /// Optional protocol extension string sent with every request
    #[serde(default)]
    pub extension: Option<String>,

    /// Ordered instance addresses forming the cluster
    #[serde(default)]
    pub servers: Vec<String>,

    /// Connection timeout in milliseconds
    #[serde(default = "default_connect_timeout")]
    pub connect_timeout_ms: u64,

    /// Maximum number of remembered job locations
    #[serde(default = "default_hint_capacity")]
    pub hint_capacity: usize,
}

fn default_user() -> String {
    std::env::var("USER").unwrap_or_else(|_| "nobody".to_string())
}

fn default_connect_timeout() -> u64 {
    5000
}

fn default_hint_capacity() -> usize {
    4096
}

impl Default for DispatchConfig {
    fn default() -> Self {
        Self {
            user: default_user(),
            extension: None,
            servers: Vec::new(),
            connect_timeout_ms: default_connect_timeout(),
            hint_capacity: default_hint_capacity(),
        }
    }
}

impl DispatchConfig {
    /// Load configuration from a TOML file
    pub fn load(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let text = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.display().to_string(),
            source,
        })?;
        toml::from_str(&text).map_err(|source| ConfigError::Parse {
            path: path.display().to_string(),
            source,
        })
    }

    /// Get connection timeout as Duration
    pub fn connect_timeout(&self) -> std::time::Duration {
        std::time::Duration::from_millis(self.connect_timeout_ms)
    }
}
