//! Move attempts carried out through the cluster dispatcher

use super::{MoveAttempt, MoveOutcome};
use crate::job::{Job, JobState};
use async_trait::async_trait;
use qroute_cluster::{ClusterDispatcher, DispatchError, StatusCode};
use std::sync::Arc;
use tracing::debug;

/// Moves jobs with [`ClusterDispatcher::move_job`], following a job to
/// whichever instance currently holds it.
pub struct DispatchMover {
    dispatcher: Arc<ClusterDispatcher>,
}

impl DispatchMover {
    pub fn new(dispatcher: Arc<ClusterDispatcher>) -> Self {
        Self { dispatcher }
    }
}

#[async_trait]
impl MoveAttempt for DispatchMover {
    async fn attempt_move(&self, job: &mut Job, destination: &str) -> MoveOutcome {
        match self.dispatcher.move_job(&job.id, destination).await {
            Ok(()) => {
                job.state = JobState::Moved;
                MoveOutcome::Moved
            }
            Err(e) => {
                let outcome = classify(&e);
                debug!(
                    job_id = %job.id,
                    destination,
                    error = %e,
                    outcome = outcome.as_str(),
                    "Move attempt failed"
                );
                outcome
            }
        }
    }
}

/// Whether a failed move is worth retrying against the same destination
pub fn classify(err: &DispatchError) -> MoveOutcome {
    match err {
        DispatchError::InvalidRequest(_) => MoveOutcome::PermanentFailure,
        DispatchError::Server { code, .. } => match code {
            StatusCode::UnknownQueue
            | StatusCode::Permission
            | StatusCode::InvalidRequest
            | StatusCode::BadState
            | StatusCode::RouteRejected => MoveOutcome::PermanentFailure,
            _ => MoveOutcome::TransientFailure,
        },
        DispatchError::Protocol(_) | DispatchError::System(_) => MoveOutcome::TransientFailure,
    }
}
