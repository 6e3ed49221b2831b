//! Dispatch error types and server status codes

use serde::{Deserialize, Serialize};
use std::fmt;
use thiserror::Error;

/// Status code carried in a batch reply.
///
/// Numbering follows the classic batch-system 15000 range so that codes
/// printed by the command line tools stay recognisable to operators.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(from = "u32", into = "u32")]
pub enum StatusCode {
    /// Job id is not known to the contacted instance
    UnknownJobId,
    /// Request is malformed or missing a required argument
    InvalidRequest,
    /// Local or remote resource failure
    System,
    /// Wire-level failure
    Protocol,
    /// Destination queue does not exist
    UnknownQueue,
    /// Request not allowed for the current job state
    BadState,
    /// Caller may not operate on this job or queue
    Permission,
    /// Job rejected by every routing destination
    RouteRejected,
    /// Job stayed in the routing queue longer than its lifetime
    RouteExpired,
    /// Any other server-side code, passed through verbatim
    Other(u32),
}

impl StatusCode {
    pub const NONE: u32 = 0;

    pub fn as_u32(self) -> u32 {
        match self {
            StatusCode::UnknownJobId => 15001,
            StatusCode::InvalidRequest => 15004,
            StatusCode::Permission => 15007,
            StatusCode::System => 15010,
            StatusCode::UnknownQueue => 15018,
            StatusCode::BadState => 15025,
            StatusCode::Protocol => 15031,
            StatusCode::RouteRejected => 15041,
            StatusCode::RouteExpired => 15042,
            StatusCode::Other(code) => code,
        }
    }
}

impl From<u32> for StatusCode {
    fn from(code: u32) -> Self {
        match code {
            15001 => StatusCode::UnknownJobId,
            15004 => StatusCode::InvalidRequest,
            15007 => StatusCode::Permission,
            15010 => StatusCode::System,
            15018 => StatusCode::UnknownQueue,
            15025 => StatusCode::BadState,
            15031 => StatusCode::Protocol,
            15041 => StatusCode::RouteRejected,
            15042 => StatusCode::RouteExpired,
            other => StatusCode::Other(other),
        }
    }
}

impl From<StatusCode> for u32 {
    fn from(code: StatusCode) -> Self {
        code.as_u32()
    }
}

impl fmt::Display for StatusCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let text = match self {
            StatusCode::UnknownJobId => "Unknown Job Id",
            StatusCode::InvalidRequest => "Invalid request",
            StatusCode::Permission => "Unauthorized Request",
            StatusCode::System => "System error",
            StatusCode::UnknownQueue => "Unknown queue",
            StatusCode::BadState => "Request invalid for state of job",
            StatusCode::Protocol => "Protocol error",
            StatusCode::RouteRejected => "Route rejected by all destinations",
            StatusCode::RouteExpired => "Time in Route Queue Expired",
            StatusCode::Other(_) => "Server error",
        };
        write!(f, "{} ({})", text, self.as_u32())
    }
}

/// Errors raised by the cluster dispatch layer
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum DispatchError {
    /// Caller supplied a malformed or missing argument; never retried
    #[error("Invalid request: {0}")]
    InvalidRequest(String),

    /// Encode, flush or read failure; the connection should be dropped
    #[error("Protocol error: {0}")]
    Protocol(String),

    /// Local resource failure
    #[error("System error: {0}")]
    System(String),

    /// Explicit status returned by the server
    #[error("{}", server_message(.code, .message))]
    Server {
        code: StatusCode,
        message: Option<String>,
    },
}

fn server_message(code: &StatusCode, message: &Option<String>) -> String {
    match message.as_deref() {
        Some(text) if !text.is_empty() => text.to_string(),
        _ => code.to_string(),
    }
}

impl DispatchError {
    /// Build a server error from a reply code and optional text
    pub fn server(code: impl Into<StatusCode>, message: Option<String>) -> Self {
        DispatchError::Server {
            code: code.into(),
            message,
        }
    }

    /// Status code equivalent of this error
    pub fn code(&self) -> StatusCode {
        match self {
            DispatchError::InvalidRequest(_) => StatusCode::InvalidRequest,
            DispatchError::Protocol(_) => StatusCode::Protocol,
            DispatchError::System(_) => StatusCode::System,
            DispatchError::Server { code, .. } => *code,
        }
    }

    /// True for the one error that means "ask the next instance"
    pub fn is_unknown_job(&self) -> bool {
        matches!(
            self,
            DispatchError::Server {
                code: StatusCode::UnknownJobId,
                ..
            }
        )
    }

    /// Message supplied by the server, if any
    pub fn server_text(&self) -> Option<&str> {
        match self {
            DispatchError::Server { message, .. } => message.as_deref(),
            _ => None,
        }
    }

    /// Process exit status for command line front ends; never zero
    pub fn exit_code(&self) -> i32 {
        match (self.code().as_u32() % 256) as i32 {
            0 => 1,
            code => code,
        }
    }

    /// Get the error type as a string for metrics labeling
    pub fn error_type(&self) -> &'static str {
        match self {
            DispatchError::InvalidRequest(_) => "invalid_request",
            DispatchError::Protocol(_) => "protocol",
            DispatchError::System(_) => "system",
            DispatchError::Server {
                code: StatusCode::UnknownJobId,
                ..
            } => "unknown_job",
            DispatchError::Server { .. } => "server",
        }
    }
}

impl From<crate::transport::TransportError> for DispatchError {
    fn from(err: crate::transport::TransportError) -> Self {
        if err.is_resource() {
            DispatchError::System(err.to_string())
        } else {
            DispatchError::Protocol(err.to_string())
        }
    }
}

pub type Result<T> = std::result::Result<T, DispatchError>;
