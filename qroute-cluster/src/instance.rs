//! A single server instance and its serialized connection

use crate::error::{DispatchError, Result};
use crate::metrics::RpcTimer;
use crate::transport::{Transport, Unreachable};
use crate::types::{BatchReply, Operation, ReplyKind};
use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering};
use tokio::sync::{Mutex, MutexGuard};
use tracing::{debug, warn};

/// Ids carried by one request
#[derive(Debug, Clone, Copy)]
pub(crate) enum RequestIds<'a> {
    Single(&'a str),
    Pair(&'a str, &'a str),
}

/// One member of a cluster.
///
/// All requests on the instance share one connection; the connection lock is
/// held from header encoding until the reply has been read, and released by
/// the guard on every exit path.
pub struct ServerInstance {
    name: String,
    up: AtomicBool,
    connection: Mutex<Box<dyn Transport>>,
}

impl fmt::Debug for ServerInstance {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ServerInstance")
            .field("name", &self.name)
            .field("up", &self.is_up())
            .finish()
    }
}

impl ServerInstance {
    /// Create an instance over an established, authenticated connection
    pub fn new(name: impl Into<String>, transport: impl Transport + 'static) -> Self {
        Self::from_boxed(name, Box::new(transport))
    }

    pub fn from_boxed(name: impl Into<String>, transport: Box<dyn Transport>) -> Self {
        Self {
            name: name.into(),
            up: AtomicBool::new(true),
            connection: Mutex::new(transport),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn is_up(&self) -> bool {
        self.up.load(Ordering::Acquire)
    }

    pub fn mark_down(&self) {
        self.up.store(false, Ordering::Release);
    }

    pub fn mark_up(&self) {
        self.up.store(true, Ordering::Release);
    }

    /// Ask this instance where a job lives
    pub async fn locate_job(
        &self,
        user: &str,
        job_id: &str,
        extension: Option<&str>,
    ) -> Result<Option<String>> {
        let operation = Operation::LocateJob;
        let timer = RpcTimer::new(operation.as_str(), &self.name);
        let result = self
            .exchange(operation, user, RequestIds::Single(job_id), extension)
            .await
            .and_then(locate_result);
        timer.observe(&result);
        result
    }

    /// Move a job to a destination on this instance
    pub async fn move_job(
        &self,
        user: &str,
        job_id: &str,
        destination: &str,
        extension: Option<&str>,
    ) -> Result<()> {
        let operation = Operation::MoveJob;
        let timer = RpcTimer::new(operation.as_str(), &self.name);
        let result = self
            .exchange(
                operation,
                user,
                RequestIds::Pair(job_id, destination),
                extension,
            )
            .await
            .and_then(status_result);
        timer.observe(&result);
        result
    }

    /// Swap the queue positions of two jobs on this instance
    pub async fn order_job(
        &self,
        user: &str,
        first: &str,
        second: &str,
        extension: Option<&str>,
    ) -> Result<()> {
        let operation = Operation::OrderJob;
        let timer = RpcTimer::new(operation.as_str(), &self.name);
        let result = self
            .exchange(operation, user, RequestIds::Pair(first, second), extension)
            .await
            .and_then(status_result);
        timer.observe(&result);
        result
    }

    async fn exchange(
        &self,
        operation: Operation,
        user: &str,
        ids: RequestIds<'_>,
        extension: Option<&str>,
    ) -> Result<BatchReply> {
        let mut call = InFlight {
            instance: self,
            connection: self.connection.lock().await,
            flushed: false,
        };
        debug!(instance = %self.name, op = operation.as_str(), "Sending request");

        let result = async {
            call.connection.encode_header(operation, user)?;
            match ids {
                RequestIds::Single(id) => call.connection.encode_job_id(id)?,
                RequestIds::Pair(first, second) => {
                    call.connection.encode_move_pair(first, second)?
                }
            }
            call.connection.encode_extension(extension)?;
            call.flushed = true;
            call.connection.flush().await?;
            let reply = call.connection.read_reply().await;
            call.flushed = false;
            reply
        }
        .await;

        result.map_err(|e| {
            let err = DispatchError::from(e);
            if matches!(err, DispatchError::Protocol(_)) {
                warn!(instance = %self.name, error = %err, "Connection unusable, marking instance down");
                self.mark_down();
            }
            err
        })
    }
}

/// Locked connection for one request.
///
/// Dropped while `flushed` is set (the caller was cancelled between sending
/// the request and reading its reply, or the flush failed), the reply can no
/// longer be matched to a request: the connection is replaced by
/// [`Unreachable`] and the instance marked down.
struct InFlight<'a> {
    instance: &'a ServerInstance,
    connection: MutexGuard<'a, Box<dyn Transport>>,
    flushed: bool,
}

impl Drop for InFlight<'_> {
    fn drop(&mut self) {
        if self.flushed {
            warn!(
                instance = %self.instance.name,
                "Request abandoned before its reply was read, dropping connection"
            );
            *self.connection = Box::new(Unreachable);
            self.instance.mark_down();
        }
    }
}

fn locate_result(reply: BatchReply) -> Result<Option<String>> {
    if !matches!(
        reply.kind,
        ReplyKind::Null | ReplyKind::Text | ReplyKind::Locate
    ) {
        return Err(DispatchError::Protocol(format!(
            "unexpected reply choice {:?} for locate",
            reply.kind
        )));
    }
    if !reply.is_ok() {
        return Err(DispatchError::server(reply.code, reply.text));
    }
    Ok(reply.locate.filter(|location| !location.is_empty()))
}

fn status_result(reply: BatchReply) -> Result<()> {
    if reply.is_ok() {
        Ok(())
    } else {
        Err(DispatchError::server(reply.code, reply.text))
    }
}
