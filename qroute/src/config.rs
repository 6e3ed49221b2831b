//! Routing queue and engine configuration

use crate::error::Result;
use chrono::Duration;
use serde::{Deserialize, Serialize};
use std::path::Path;
use thiserror::Error;

/// Retry interval used when a queue does not set one (seconds)
pub const DEFAULT_ROUTE_RETRY_SECS: u64 = 30;

/// Upper bound for retry intervals and route lifetimes (100 years)
pub const MAX_ROUTE_SECS: u64 = 100 * 365 * 24 * 60 * 60;

/// Errors loading or validating a routing configuration
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

    #[error("queue '{queue}': {reason}")]
    Invalid { queue: String, reason: String },
}

/// Attributes of one routing queue
#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
pub struct QueueSettings {
    /// Queue name
    pub name: String,

    /// Destinations in scan order
    #[serde(default)]
    pub destinations: Vec<String>,

    /// Routing only happens in a started queue
    #[serde(default = "default_started")]
    pub started: bool,

    /// Maximum number of jobs in transit at once
    #[serde(default)]
    pub max_running: Option<usize>,

    /// Seconds to wait before retrying a job that failed transiently
    #[serde(default)]
    pub route_retry_secs: Option<u64>,

    /// Seconds a job may stay in the queue; 0 means forever
    #[serde(default)]
    pub route_lifetime_secs: u64,

    /// Route jobs in the held state
    #[serde(default)]
    pub route_held: bool,

    /// Route jobs in the waiting state
    #[serde(default)]
    pub route_waiting: bool,

    /// Use the site-specific alternate router instead of round-robin
    #[serde(default)]
    pub alt_router: bool,
}

fn default_started() -> bool {
    true
}

impl QueueSettings {
    pub fn new(name: impl Into<String>, destinations: Vec<String>) -> Self {
        Self {
            name: name.into(),
            destinations,
            started: default_started(),
            max_running: None,
            route_retry_secs: None,
            route_lifetime_secs: 0,
            route_held: false,
            route_waiting: false,
            alt_router: false,
        }
    }

    /// Saturates at [`Duration::MAX`] for intervals chrono cannot represent
    pub fn retry_interval(&self) -> Duration {
        let secs = self.route_retry_secs.unwrap_or(DEFAULT_ROUTE_RETRY_SECS);
        seconds(secs).unwrap_or(Duration::MAX)
    }

    /// `None` when jobs may stay forever, including lifetimes too large
    /// to represent
    pub fn lifetime(&self) -> Option<Duration> {
        match self.route_lifetime_secs {
            0 => None,
            secs => seconds(secs),
        }
    }

    fn validate(&self) -> std::result::Result<(), ConfigError> {
        let invalid = |reason: String| ConfigError::Invalid {
            queue: self.name.clone(),
            reason,
        };
        if self.name.is_empty() {
            return Err(invalid("queue name must not be empty".to_string()));
        }
        if let Some(secs) = self.route_retry_secs {
            if secs > MAX_ROUTE_SECS {
                return Err(invalid(format!(
                    "route_retry_secs {} exceeds {}",
                    secs, MAX_ROUTE_SECS
                )));
            }
        }
        if self.route_lifetime_secs > MAX_ROUTE_SECS {
            return Err(invalid(format!(
                "route_lifetime_secs {} exceeds {}",
                self.route_lifetime_secs, MAX_ROUTE_SECS
            )));
        }
        Ok(())
    }
}

fn seconds(secs: u64) -> Option<Duration> {
    i64::try_from(secs).ok().and_then(Duration::try_seconds)
}

/// Message texts used when aborting or skipping jobs
#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
pub struct RouteMessages {
    #[serde(default = "default_rejected")]
    pub rejected: String,

    #[serde(default = "default_expired")]
    pub expired: String,

    #[serde(default = "default_bad_state")]
    pub bad_state: String,
}

fn default_rejected() -> String {
    "Job rejected by all possible destinations".to_string()
}

fn default_expired() -> String {
    "Job has been in the routing queue too long".to_string()
}

fn default_bad_state() -> String {
    "Request invalid for state of job".to_string()
}

impl Default for RouteMessages {
    fn default() -> Self {
        Self {
            rejected: default_rejected(),
            expired: default_expired(),
            bad_state: default_bad_state(),
        }
    }
}

/// Top-level routing configuration file
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct RouteConfig {
    #[serde(default)]
    pub messages: RouteMessages,

    #[serde(default)]
    pub queues: Vec<QueueSettings>,
}

impl RouteConfig {
    /// Load configuration from a TOML file
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let text = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.display().to_string(),
            source,
        })?;
        Self::parse(&text, &path.display().to_string())
    }

    pub fn from_toml(text: &str) -> Result<Self> {
        Self::parse(text, "<inline>")
    }

    fn parse(text: &str, path: &str) -> Result<Self> {
        let config: RouteConfig = toml::from_str(text).map_err(|source| ConfigError::Parse {
            path: path.to_string(),
            source,
        })?;
        for queue in &config.queues {
            queue.validate()?;
        }
        Ok(config)
    }
}
