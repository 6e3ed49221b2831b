//! Request and reply types exchanged with a server instance

use crate::error::StatusCode;
use serde::{Deserialize, Serialize};

/// Batch operation carried in a request header
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Operation {
    LocateJob,
    MoveJob,
    OrderJob,
}

impl Operation {
    /// Get operation name for metrics and logs
    pub fn as_str(&self) -> &'static str {
        match self {
            Operation::LocateJob => "locate_job",
            Operation::MoveJob => "move_job",
            Operation::OrderJob => "order_job",
        }
    }
}

/// Request header: what to do and on whose behalf
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RequestHeader {
    pub operation: Operation,
    pub user: String,
}

/// Operation-specific request body
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum RequestBody {
    /// Single job id (locate)
    JobId(String),
    /// Job id plus a destination, or a pair of job ids (move, order)
    MovePair { first: String, second: String },
}

/// A fully encoded batch request
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BatchRequest {
    pub header: RequestHeader,
    pub body: RequestBody,
    /// Optional protocol extension string
    pub extension: Option<String>,
}

/// Shape of a reply payload
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ReplyKind {
    Null,
    Text,
    Locate,
    /// Reply kinds the dispatcher never expects (status listings and the like)
    Status,
}

/// Structured reply read back from an instance
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BatchReply {
    pub kind: ReplyKind,
    /// Zero on success, otherwise a server status code
    pub code: u32,
    /// Server-supplied message text
    pub text: Option<String>,
    /// Location payload for locate replies
    pub locate: Option<String>,
}

impl BatchReply {
    /// Successful reply without payload
    pub fn ok() -> Self {
        Self {
            kind: ReplyKind::Null,
            code: StatusCode::NONE,
            text: None,
            locate: None,
        }
    }

    /// Successful locate reply
    pub fn located(location: impl Into<String>) -> Self {
        Self {
            kind: ReplyKind::Locate,
            code: StatusCode::NONE,
            text: None,
            locate: Some(location.into()),
        }
    }

    /// Error reply carrying a status code and optional message
    pub fn error(code: StatusCode, text: Option<String>) -> Self {
        Self {
            kind: if text.is_some() {
                ReplyKind::Text
            } else {
                ReplyKind::Null
            },
            code: code.as_u32(),
            text,
            locate: None,
        }
    }

    pub fn is_ok(&self) -> bool {
        self.code == StatusCode::NONE
    }
}
