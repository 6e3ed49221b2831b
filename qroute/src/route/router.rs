//! Destination selection
//!
//! The default router walks the queue's destinations round-robin from the
//! job's cursor, skipping destinations that already rejected the job:
//!
//! ```text
//! loop:
//!     cursor past the end -> wrap to 0
//!         no transient failure this pass -> Rejected
//!         otherwise                      -> retry at `retry_at`
//!     take destinations[cursor++]
//!         rejected before   -> skip
//!         permanent failure -> remember, next destination
//!         moved / deferred  -> done
//!         transient failure -> retry allowed, next destination
//! ```

use super::{MoveAttempt, MoveOutcome, RouteOutcome};
use crate::config::QueueSettings;
use crate::error::RouteError;
use crate::job::Job;
use crate::metrics::record_route_attempt;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use tracing::debug;

/// Destination selection policy for a routing queue
#[async_trait]
pub trait Router: Send + Sync {
    /// Try to send `job` on its way. `retry_at` is when a deferred job
    /// should be looked at again.
    async fn route(
        &self,
        job: &mut Job,
        queue: &QueueSettings,
        retry_at: DateTime<Utc>,
        mover: &dyn MoveAttempt,
    ) -> Result<RouteOutcome, RouteError>;
}

/// Round-robin selection with permanent-failure memory
#[derive(Debug, Default, Clone, Copy)]
pub struct DefaultRouter;

#[async_trait]
impl Router for DefaultRouter {
    async fn route(
        &self,
        job: &mut Job,
        queue: &QueueSettings,
        retry_at: DateTime<Utc>,
        mover: &dyn MoveAttempt,
    ) -> Result<RouteOutcome, RouteError> {
        let destinations = &queue.destinations;

        loop {
            if job.last_dest_index >= destinations.len() {
                job.last_dest_index = 0;
                if !job.retry_allowed {
                    debug!(job_id = %job.id, queue = %queue.name, "Rejected by all destinations");
                    return Err(RouteError::Rejected {
                        job_id: job.id.clone(),
                    });
                }
                job.retry_at = retry_at;
                job.retry_allowed = false;
                return Ok(RouteOutcome::RetryScheduled { at: retry_at });
            }

            let destination = &destinations[job.last_dest_index];
            job.last_dest_index += 1;
            if job.is_rejected(destination) {
                continue;
            }

            let outcome = mover.attempt_move(job, destination).await;
            record_route_attempt(outcome.as_str());
            match outcome {
                MoveOutcome::PermanentFailure => {
                    debug!(job_id = %job.id, destination = %destination, "Destination rejected job");
                    job.reject(destination);
                }
                MoveOutcome::Moved | MoveOutcome::Deferred => {
                    return Ok(RouteOutcome::Dispatched {
                        destination: destination.clone(),
                    });
                }
                MoveOutcome::TransientFailure => {
                    debug!(job_id = %job.id, destination = %destination, "Destination temporarily unavailable");
                    job.retry_allowed = true;
                }
            }
        }
    }
}
