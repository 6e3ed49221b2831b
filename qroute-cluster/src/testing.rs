//! Scripted in-memory transport for tests
//!
//! Replies are handed out in order; once the script runs dry the transport
//! behaves like a connection closed by the peer.

use crate::transport::{RequestBuilder, Transport, TransportError};
use crate::types::{BatchReply, BatchRequest, Operation, RequestBody};
use async_trait::async_trait;
use parking_lot::Mutex;
use std::collections::VecDeque;
use std::sync::Arc;

/// Requests flushed by one or more scripted transports, in send order
#[derive(Debug, Clone, Default)]
pub struct RequestLog {
    entries: Arc<Mutex<Vec<(String, BatchRequest)>>>,
}

impl RequestLog {
    pub fn new() -> Self {
        Self::default()
    }

    /// All requests, regardless of which transport sent them
    pub fn requests(&self) -> Vec<BatchRequest> {
        self.entries.lock().iter().map(|(_, r)| r.clone()).collect()
    }

    /// Labels of the transports that flushed a request, in order
    pub fn visits(&self) -> Vec<String> {
        self.entries.lock().iter().map(|(l, _)| l.clone()).collect()
    }

    fn push(&self, label: &str, request: BatchRequest) {
        self.entries.lock().push((label.to_string(), request));
    }
}

/// Transport that answers from a fixed script
pub struct ScriptedTransport {
    label: String,
    replies: VecDeque<Result<BatchReply, TransportError>>,
    pending: RequestBuilder,
    log: RequestLog,
}

impl ScriptedTransport {
    pub fn new(replies: Vec<Result<BatchReply, TransportError>>) -> (Self, RequestLog) {
        let log = RequestLog::new();
        (Self::labeled("", replies, log.clone()), log)
    }

    /// Transport sharing `log` with others, recording under `label`
    pub fn labeled(
        label: &str,
        replies: Vec<Result<BatchReply, TransportError>>,
        log: RequestLog,
    ) -> Self {
        Self {
            label: label.to_string(),
            replies: replies.into(),
            pending: RequestBuilder::new(),
            log,
        }
    }
}

#[async_trait]
impl Transport for ScriptedTransport {
    fn encode_header(&mut self, operation: Operation, user: &str) -> Result<(), TransportError> {
        self.pending.header(operation, user)
    }

    fn encode_job_id(&mut self, job_id: &str) -> Result<(), TransportError> {
        self.pending.body(RequestBody::JobId(job_id.to_string()))
    }

    fn encode_move_pair(&mut self, first: &str, second: &str) -> Result<(), TransportError> {
        self.pending.body(RequestBody::MovePair {
            first: first.to_string(),
            second: second.to_string(),
        })
    }

    fn encode_extension(&mut self, extension: Option<&str>) -> Result<(), TransportError> {
        self.pending.extension(extension)
    }

    async fn flush(&mut self) -> Result<(), TransportError> {
        let request = self.pending.finish()?;
        self.log.push(&self.label, request);
        Ok(())
    }

    async fn read_reply(&mut self) -> Result<BatchReply, TransportError> {
        self.replies.pop_front().unwrap_or(Err(TransportError::Closed))
    }
}
