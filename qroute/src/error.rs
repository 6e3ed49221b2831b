use crate::config::ConfigError;
use qroute_cluster::{DispatchError, StatusCode};
use thiserror::Error;

/// Terminal routing results. The caller aborts the job.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum RouteError {
    #[error("Job {job_id} rejected by all possible destinations")]
    Rejected { job_id: String },

    #[error("Job {job_id} exceeded the routing queue lifetime")]
    Expired { job_id: String },
}

impl RouteError {
    pub fn job_id(&self) -> &str {
        match self {
            RouteError::Rejected { job_id } | RouteError::Expired { job_id } => job_id,
        }
    }

    /// Server status code reported for this result
    pub fn code(&self) -> StatusCode {
        match self {
            RouteError::Rejected { .. } => StatusCode::RouteRejected,
            RouteError::Expired { .. } => StatusCode::RouteExpired,
        }
    }

    /// Label for metrics
    pub fn reason(&self) -> &'static str {
        match self {
            RouteError::Rejected { .. } => "rejected",
            RouteError::Expired { .. } => "expired",
        }
    }
}

#[derive(Error, Debug)]
pub enum Error {
    #[error("Route error: {0}")]
    Route(#[from] RouteError),

    #[error("Job not found in queue {queue}: {job_id}")]
    JobNotFound { queue: String, job_id: String },

    #[error("Dispatch error: {0}")]
    Dispatch(#[from] DispatchError),

    #[error("Config error: {0}")]
    Config(#[from] ConfigError),
}

pub type Result<T> = std::result::Result<T, Error>;
