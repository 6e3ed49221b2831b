//! Routing engine
//!
//! A periodic sweep walks every routing queue and, for each job that is due,
//! decides whether a move may be attempted at all (job state, queue started,
//! transit limit, lifetime) before handing the job to the queue's router.
//! Jobs that no destination will take, or that outlived the queue's route
//! lifetime, are aborted and handed back to the caller.

mod mover;
mod router;

#[cfg(test)]
pub(crate) mod testing;

pub use mover::DispatchMover;
pub use router::{DefaultRouter, Router};

use crate::config::{QueueSettings, RouteMessages};
use crate::error::{Error, Result, RouteError};
use crate::job::{Job, JobState};
use crate::metrics::{record_route_abort, record_sweep};
use crate::queue::RouteQueue;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::sync::Arc;
use std::time::Instant;
use tracing::{debug, info, warn};

/// Result of one attempt to move a job to one destination
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MoveOutcome {
    /// Destination will never take this job
    PermanentFailure,
    /// Job is on its way or already there
    Moved,
    /// Move accepted and continuing asynchronously
    Deferred,
    /// Destination may take the job later
    TransientFailure,
}

impl MoveOutcome {
    pub fn as_str(&self) -> &'static str {
        match self {
            MoveOutcome::PermanentFailure => "permanent_failure",
            MoveOutcome::Moved => "moved",
            MoveOutcome::Deferred => "deferred",
            MoveOutcome::TransientFailure => "transient_failure",
        }
    }
}

/// The "attempt move" primitive routers call once per destination.
///
/// Implementations may update the job's state (e.g. to transit or moved).
#[async_trait]
pub trait MoveAttempt: Send + Sync {
    async fn attempt_move(&self, job: &mut Job, destination: &str) -> MoveOutcome;
}

/// Why a job was left alone
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SkipReason {
    /// Already moving
    InTransit,
    /// Moved or finished
    Terminal,
    /// State the router never handles (running, exiting, ...)
    UnexpectedState,
    QueueStopped,
    /// Too many jobs of the queue in transit
    TransitLimit,
    /// Held or waiting, and the queue does not route such jobs
    StateNotRouted,
}

/// Non-terminal routing results
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RouteOutcome {
    Skipped(SkipReason),
    /// A destination took the job (possibly asynchronously)
    Dispatched { destination: String },
    /// Every destination was tried; look again at `at`
    RetryScheduled { at: DateTime<Utc> },
}

/// A job removed from its queue because routing gave up on it
#[derive(Debug, Clone)]
pub struct AbortedJob {
    pub job: Job,
    pub error: RouteError,
    /// Message recorded with the abort
    pub message: String,
}

/// Summary of one queue sweep
#[derive(Debug, Clone, Default)]
pub struct SweepReport {
    pub queue: String,
    /// Jobs that were due and handed to `job_route`
    pub examined: usize,
    pub dispatched: usize,
    pub retry_scheduled: usize,
    pub aborted: Vec<AbortedJob>,
    /// Jobs that left the queue because a move completed during the sweep
    pub moved: Vec<Job>,
}

/// Per-queue routing state machine
pub struct RouteEngine {
    mover: Arc<dyn MoveAttempt>,
    default_router: DefaultRouter,
    alternate_router: Option<Arc<dyn Router>>,
    messages: RouteMessages,
}

impl RouteEngine {
    pub fn new(mover: Arc<dyn MoveAttempt>, messages: RouteMessages) -> Self {
        Self {
            mover,
            default_router: DefaultRouter,
            alternate_router: None,
            messages,
        }
    }

    /// Site-specific router used by queues with `alt_router` set
    pub fn with_alternate_router(mut self, router: Arc<dyn Router>) -> Self {
        self.alternate_router = Some(router);
        self
    }

    pub fn messages(&self) -> &RouteMessages {
        &self.messages
    }

    /// Decide whether and where to move one job.
    ///
    /// `in_transit` is the number of the queue's jobs currently in transit.
    /// `Err` means the job must be aborted.
    pub async fn job_route(
        &self,
        queue: &QueueSettings,
        in_transit: usize,
        job: &mut Job,
        now: DateTime<Utc>,
    ) -> std::result::Result<RouteOutcome, RouteError> {
        let state_not_routed = match job.state {
            JobState::Transit => return Ok(RouteOutcome::Skipped(SkipReason::InTransit)),
            JobState::Queued => false,
            JobState::Held => !queue.route_held,
            JobState::Waiting => !queue.route_waiting,
            JobState::Moved | JobState::Finished => {
                return Ok(RouteOutcome::Skipped(SkipReason::Terminal))
            }
            other => {
                debug!(job_id = %job.id, state = %other, "{}", self.messages.bad_state);
                return Ok(RouteOutcome::Skipped(SkipReason::UnexpectedState));
            }
        };

        if !queue.started {
            return Ok(RouteOutcome::Skipped(SkipReason::QueueStopped));
        }
        if let Some(limit) = queue.max_running {
            if in_transit >= limit {
                return Ok(RouteOutcome::Skipped(SkipReason::TransitLimit));
            }
        }

        let retry_at = now
            .checked_add_signed(queue.retry_interval())
            .unwrap_or(DateTime::<Utc>::MAX_UTC);
        // A lifetime reaching past the calendar never expires
        let expires_at = queue
            .lifetime()
            .and_then(|lifetime| job.queued_at.checked_add_signed(lifetime));
        if let Some(expires_at) = expires_at {
            if expires_at < now {
                debug!(job_id = %job.id, queue = %queue.name, "{}", self.messages.expired);
                return Err(RouteError::Expired {
                    job_id: job.id.clone(),
                });
            }
        }

        if state_not_routed {
            return Ok(RouteOutcome::Skipped(SkipReason::StateNotRouted));
        }

        self.router_for(queue)
            .route(job, queue, retry_at, self.mover.as_ref())
            .await
    }

    /// Route one job of `queue` by id; aborts are reported as errors and
    /// leave the job in the queue for the caller to deal with.
    pub async fn route_job(
        &self,
        queue: &mut RouteQueue,
        job_id: &str,
        now: DateTime<Utc>,
    ) -> Result<RouteOutcome> {
        let in_transit = queue.transit_count();
        let queue_name = queue.name().to_string();
        let (settings, jobs) = queue.split_mut();
        let job = jobs
            .iter_mut()
            .find(|j| j.id == job_id)
            .ok_or_else(|| Error::JobNotFound {
                queue: queue_name,
                job_id: job_id.to_string(),
            })?;
        Ok(self.job_route(settings, in_transit, job, now).await?)
    }

    /// Sweep one queue.
    ///
    /// Works from a snapshot of job ids so that jobs leaving the queue during
    /// the sweep cannot disturb the iteration. Rejected and expired jobs are
    /// removed and reported; other results only show up in the counters.
    pub async fn queue_route(&self, queue: &mut RouteQueue, now: DateTime<Utc>) -> SweepReport {
        let started = Instant::now();
        let mut report = SweepReport {
            queue: queue.name().to_string(),
            ..Default::default()
        };

        let snapshot: Vec<String> = queue.jobs().iter().map(|j| j.id.clone()).collect();
        for job_id in snapshot {
            let in_transit = queue.transit_count();
            let (settings, jobs) = queue.split_mut();
            let Some(job) = jobs.iter_mut().find(|j| j.id == job_id) else {
                continue;
            };
            if !job.is_due(now) {
                continue;
            }

            report.examined += 1;
            match self.job_route(settings, in_transit, job, now).await {
                Ok(RouteOutcome::Dispatched { destination }) => {
                    debug!(job_id = %job_id, destination = %destination, "Job dispatched");
                    report.dispatched += 1;
                    if job.state == JobState::Moved {
                        if let Some(job) = queue.remove(&job_id) {
                            report.moved.push(job);
                        }
                    }
                }
                Ok(RouteOutcome::RetryScheduled { .. }) => report.retry_scheduled += 1,
                Ok(RouteOutcome::Skipped(_)) => {}
                Err(error) => {
                    let message = match error {
                        RouteError::Rejected { .. } => self.messages.rejected.clone(),
                        RouteError::Expired { .. } => self.messages.expired.clone(),
                    };
                    info!(job_id = %job_id, queue = %report.queue, "Aborting job: {}", message);
                    record_route_abort(error.reason());
                    if let Some(job) = queue.remove(&job_id) {
                        report.aborted.push(AbortedJob {
                            job,
                            error,
                            message,
                        });
                    }
                }
            }
        }

        record_sweep(&report.queue, report.examined, started.elapsed());
        report
    }

    /// Sweep every queue in turn
    pub async fn sweep<'a>(
        &self,
        queues: impl IntoIterator<Item = &'a mut RouteQueue>,
        now: DateTime<Utc>,
    ) -> Vec<SweepReport> {
        let mut reports = Vec::new();
        for queue in queues {
            reports.push(self.queue_route(queue, now).await);
        }
        reports
    }

    fn router_for(&self, queue: &QueueSettings) -> &dyn Router {
        if queue.alt_router {
            match &self.alternate_router {
                Some(router) => return router.as_ref(),
                None => {
                    warn!(queue = %queue.name, "Alternate router requested but none installed, using default");
                }
            }
        }
        &self.default_router
    }
}
