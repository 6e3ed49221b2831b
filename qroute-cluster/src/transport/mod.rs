//! Transport layer for batch requests
//!
//! The dispatcher only sees the [`Transport`] trait: encode a header, the
//! operation's ids and an optional extension, flush, then block on a reply.
//! [`FramedTransport`] is the TCP implementation used by the command line
//! tools; tests plug in scripted transports.

mod framed;

pub use framed::{connect, FramedTransport};

use crate::types::{BatchReply, BatchRequest, Operation, RequestBody, RequestHeader};
use async_trait::async_trait;
use thiserror::Error;

/// Failures raised below the dispatcher
#[derive(Error, Debug)]
pub enum TransportError {
    #[error("encode error: {0}")]
    Encode(String),

    #[error("decode error: {0}")]
    Decode(String),

    #[error("i/o error: {0}")]
    Io(#[from] std::io::Error),

    #[error("connection closed by peer")]
    Closed,

    /// Local resource exhaustion while building or reading a message
    #[error("resource error: {0}")]
    Resource(String),
}

impl TransportError {
    pub fn is_resource(&self) -> bool {
        matches!(self, TransportError::Resource(_))
    }
}

impl From<bincode::Error> for TransportError {
    fn from(err: bincode::Error) -> Self {
        TransportError::Decode(err.to_string())
    }
}

/// Request/reply primitive over one connection.
///
/// Calls arrive in a fixed order per request: `encode_header`, exactly one of
/// `encode_job_id` / `encode_move_pair`, `encode_extension`, `flush`,
/// `read_reply`. Callers hold the instance lock for the whole sequence.
/// `encode_header` always starts a fresh request.
#[async_trait]
pub trait Transport: Send {
    fn encode_header(&mut self, operation: Operation, user: &str) -> Result<(), TransportError>;

    fn encode_job_id(&mut self, job_id: &str) -> Result<(), TransportError>;

    fn encode_move_pair(&mut self, first: &str, second: &str) -> Result<(), TransportError>;

    fn encode_extension(&mut self, extension: Option<&str>) -> Result<(), TransportError>;

    async fn flush(&mut self) -> Result<(), TransportError>;

    async fn read_reply(&mut self) -> Result<BatchReply, TransportError>;
}

/// Placeholder connection for an instance that could not be reached.
/// Every request fails as if the peer had closed the connection.
#[derive(Debug, Default, Clone, Copy)]
pub struct Unreachable;

#[async_trait]
impl Transport for Unreachable {
    fn encode_header(&mut self, _operation: Operation, _user: &str) -> Result<(), TransportError> {
        Err(TransportError::Closed)
    }

    fn encode_job_id(&mut self, _job_id: &str) -> Result<(), TransportError> {
        Err(TransportError::Closed)
    }

    fn encode_move_pair(&mut self, _first: &str, _second: &str) -> Result<(), TransportError> {
        Err(TransportError::Closed)
    }

    fn encode_extension(&mut self, _extension: Option<&str>) -> Result<(), TransportError> {
        Err(TransportError::Closed)
    }

    async fn flush(&mut self) -> Result<(), TransportError> {
        Err(TransportError::Closed)
    }

    async fn read_reply(&mut self) -> Result<BatchReply, TransportError> {
        Err(TransportError::Closed)
    }
}

/// Accumulates encode calls into a [`BatchRequest`].
///
/// Shared by transport implementations so that out-of-order encoding is
/// rejected the same way everywhere.
#[derive(Debug, Default)]
pub struct RequestBuilder {
    header: Option<RequestHeader>,
    body: Option<RequestBody>,
    extension: Option<Option<String>>,
}

impl RequestBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Start a new request, discarding anything left by an earlier request
    /// that failed partway through encoding
    pub fn header(&mut self, operation: Operation, user: &str) -> Result<(), TransportError> {
        *self = Self::default();
        self.header = Some(RequestHeader {
            operation,
            user: user.to_string(),
        });
        Ok(())
    }

    pub fn body(&mut self, body: RequestBody) -> Result<(), TransportError> {
        if self.header.is_none() {
            return Err(TransportError::Encode(
                "request body encoded before header".to_string(),
            ));
        }
        if self.body.is_some() {
            return Err(TransportError::Encode(
                "request body already encoded".to_string(),
            ));
        }
        self.body = Some(body);
        Ok(())
    }

    pub fn extension(&mut self, extension: Option<&str>) -> Result<(), TransportError> {
        if self.body.is_none() {
            return Err(TransportError::Encode(
                "extension encoded before request body".to_string(),
            ));
        }
        self.extension = Some(extension.map(str::to_string));
        Ok(())
    }

    /// Take the finished request, resetting the builder
    pub fn finish(&mut self) -> Result<BatchRequest, TransportError> {
        let header = self.header.take();
        let body = self.body.take();
        let extension = self.extension.take();
        match (header, body, extension) {
            (Some(header), Some(body), Some(extension)) => Ok(BatchRequest {
                header,
                body,
                extension,
            }),
            _ => Err(TransportError::Encode(
                "flush called on an incomplete request".to_string(),
            )),
        }
    }
}
