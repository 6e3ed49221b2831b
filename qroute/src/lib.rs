//! qroute - routing queues for a cluster workload manager
//!
//! Jobs submitted to a routing queue are not run locally; they are forwarded
//! to one of the queue's destinations, possibly on another server of the
//! cluster. This crate holds the routing state machine:
//!
//! - **Job / RouteQueue**: routing state per job (destination cursor,
//!   rejected destinations, retry time) and the queues that own them
//! - **RouteEngine**: per-queue sweep and per-job routing decision
//! - **Router**: destination selection; round-robin by default, pluggable
//! - **MoveAttempt**: the per-destination move primitive, with a
//!   [`DispatchMover`] built on the cluster dispatcher

pub mod config;
pub mod error;
pub mod job;
pub mod metrics;
pub mod queue;
pub mod route;

pub use config::{
    ConfigError, QueueSettings, RouteConfig, RouteMessages, DEFAULT_ROUTE_RETRY_SECS,
    MAX_ROUTE_SECS,
};
pub use error::{Error, Result, RouteError};
pub use job::{Job, JobState};
pub use queue::RouteQueue;
pub use route::{
    AbortedJob, DefaultRouter, DispatchMover, MoveAttempt, MoveOutcome, RouteEngine,
    RouteOutcome, Router, SkipReason, SweepReport,
};
