//! Scripted move attempts for router and engine tests

use super::{MoveAttempt, MoveOutcome};
use crate::job::{Job, JobState};
use async_trait::async_trait;
use parking_lot::Mutex;
use std::collections::HashMap;
use std::sync::Arc;

/// Answers each destination with a fixed outcome and records the attempts.
/// Unscripted destinations fail transiently.
#[derive(Clone, Default)]
pub(crate) struct ScriptedMover {
    outcomes: HashMap<String, MoveOutcome>,
    transit_on_defer: bool,
    attempts: Arc<Mutex<Vec<String>>>,
}

impl ScriptedMover {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    pub(crate) fn on(mut self, destination: &str, outcome: MoveOutcome) -> Self {
        self.outcomes.insert(destination.to_string(), outcome);
        self
    }

    /// Put deferred jobs into transit, as an asynchronous mover would
    pub(crate) fn transit_on_defer(mut self) -> Self {
        self.transit_on_defer = true;
        self
    }

    pub(crate) fn attempts(&self) -> Vec<String> {
        self.attempts.lock().clone()
    }
}

#[async_trait]
impl MoveAttempt for ScriptedMover {
    async fn attempt_move(&self, job: &mut Job, destination: &str) -> MoveOutcome {
        self.attempts.lock().push(destination.to_string());
        let outcome = self
            .outcomes
            .get(destination)
            .copied()
            .unwrap_or(MoveOutcome::TransientFailure);
        match outcome {
            MoveOutcome::Moved => job.state = JobState::Moved,
            MoveOutcome::Deferred if self.transit_on_defer => job.state = JobState::Transit,
            _ => {}
        }
        outcome
    }
}
