//! Location hints for sharded jobs
//!
//! Remembers which instance most recently answered for a job id. Hints are
//! advisory: a stale or missing entry only changes where the round-robin
//! fan-out starts, never which instances it covers.

use parking_lot::RwLock;
use std::collections::HashMap;

const DEFAULT_CAPACITY: usize = 4096;

/// Best-effort job id -> instance index cache
#[derive(Debug)]
pub struct LocationHint {
    entries: RwLock<HashMap<String, usize>>,
    capacity: usize,
}

impl Default for LocationHint {
    fn default() -> Self {
        Self::new()
    }
}

impl LocationHint {
    pub fn new() -> Self {
        Self::with_capacity(DEFAULT_CAPACITY)
    }

    /// Create a cache holding at most `capacity` entries
    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            entries: RwLock::new(HashMap::new()),
            capacity: capacity.max(1),
        }
    }

    /// Last known instance index for a job
    pub fn get(&self, job_id: &str) -> Option<usize> {
        self.entries.read().get(job_id).copied()
    }

    /// Record where a job was last seen. Last writer wins.
    pub fn set(&self, job_id: &str, index: usize) {
        let mut entries = self.entries.write();
        if entries.len() >= self.capacity && !entries.contains_key(job_id) {
            // Full: start over rather than track recency
            entries.clear();
        }
        entries.insert(job_id.to_string(), index);
    }

    /// Forget a job, e.g. after it left the cluster
    pub fn remove(&self, job_id: &str) {
        self.entries.write().remove(job_id);
    }

    pub fn len(&self) -> usize {
        self.entries.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.read().is_empty()
    }
}
