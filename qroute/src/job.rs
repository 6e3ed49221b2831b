//! Jobs as seen by the routing engine

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Job lifecycle state
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum JobState {
    /// A move attempt is in flight
    Transit,
    Queued,
    Held,
    Waiting,
    Running,
    Exiting,
    Suspended,
    /// Moved to another server; terminal for routing
    Moved,
    /// Completed; terminal for routing
    Finished,
}

impl JobState {
    /// Single-letter code used in job listings
    pub fn letter(&self) -> char {
        match self {
            JobState::Transit => 'T',
            JobState::Queued => 'Q',
            JobState::Held => 'H',
            JobState::Waiting => 'W',
            JobState::Running => 'R',
            JobState::Exiting => 'E',
            JobState::Suspended => 'S',
            JobState::Moved => 'M',
            JobState::Finished => 'F',
        }
    }
}

impl fmt::Display for JobState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.letter())
    }
}

/// A job sitting in a routing queue
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Job {
    /// Cluster-unique job identifier
    pub id: String,

    pub state: JobState,

    /// Next destination to try; always within `[0, destination count]`
    pub last_dest_index: usize,

    /// Set when a destination failed only transiently during the current pass
    pub retry_allowed: bool,

    /// No route attempt is made before this time
    pub retry_at: DateTime<Utc>,

    /// When the job entered the routing queue
    pub queued_at: DateTime<Utc>,

    /// Destinations that permanently rejected the job, in rejection order
    rejected: Vec<String>,
}

impl Job {
    /// A freshly queued job, eligible for routing at `now`
    pub fn new(id: impl Into<String>, now: DateTime<Utc>) -> Self {
        Self {
            id: id.into(),
            state: JobState::Queued,
            last_dest_index: 0,
            retry_allowed: false,
            retry_at: now,
            queued_at: now,
            rejected: Vec::new(),
        }
    }

    pub fn with_state(mut self, state: JobState) -> Self {
        self.state = state;
        self
    }

    /// Remember that `destination` rejected this job for good.
    ///
    /// The memory only grows while the job stays in the routing queue.
    pub fn reject(&mut self, destination: &str) {
        if !self.is_rejected(destination) {
            self.rejected.push(destination.to_string());
        }
    }

    pub fn is_rejected(&self, destination: &str) -> bool {
        self.rejected.iter().any(|d| d == destination)
    }

    pub fn rejected_destinations(&self) -> &[String] {
        &self.rejected
    }

    /// Ready for a route attempt at `now`
    pub fn is_due(&self, now: DateTime<Utc>) -> bool {
        self.retry_at <= now
    }
}
