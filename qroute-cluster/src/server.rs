//! Instance-side request server
//!
//! Accepts framed TCP connections, decodes batch requests and hands them to a
//! [`BatchHandler`]. Requests on one connection are answered in order, which
//! matches the one-request-in-flight discipline of the client side.

use crate::error::{DispatchError, Result};
use crate::metrics::record_handler_request;
use crate::types::{BatchReply, BatchRequest, Operation, RequestBody};
use async_trait::async_trait;
use bytes::Bytes;
use futures::{SinkExt, StreamExt};
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Instant;
use tokio::net::{TcpListener, TcpStream};
use tokio_util::codec::{Framed, LengthDelimitedCodec};
use tracing::{debug, info, warn};

/// Server-side behavior for the dispatch operations.
///
/// Returning `DispatchError::Server { code: UnknownJobId, .. }` is what makes
/// a multi-instance client try the next instance.
#[async_trait]
pub trait BatchHandler: Send + Sync + 'static {
    /// Where the job lives (e.g. the owning server's name)
    async fn locate_job(&self, user: &str, job_id: &str) -> Result<String>;

    async fn move_job(&self, user: &str, job_id: &str, destination: &str) -> Result<()>;

    async fn order_job(&self, user: &str, first: &str, second: &str) -> Result<()>;
}

/// TCP server for one instance
pub struct InstanceServer {
    listener: TcpListener,
    handler: Arc<dyn BatchHandler>,
}

impl InstanceServer {
    /// Bind the listening socket
    pub async fn bind(addr: &str, handler: Arc<dyn BatchHandler>) -> Result<Self> {
        let listener = TcpListener::bind(addr)
            .await
            .map_err(|e| DispatchError::System(format!("failed to bind {}: {}", addr, e)))?;
        Ok(Self { listener, handler })
    }

    pub fn local_addr(&self) -> Result<SocketAddr> {
        self.listener
            .local_addr()
            .map_err(|e| DispatchError::System(e.to_string()))
    }

    /// Accept connections until the listener fails
    pub async fn serve(self) -> Result<()> {
        info!("Instance server listening on {}", self.local_addr()?);
        loop {
            let (stream, peer) = self
                .listener
                .accept()
                .await
                .map_err(|e| DispatchError::System(format!("accept failed: {}", e)))?;
            let handler = Arc::clone(&self.handler);
            tokio::spawn(async move {
                debug!("Accepted connection from {}", peer);
                if let Err(e) = handle_connection(stream, handler).await {
                    warn!("Connection from {} failed: {}", peer, e);
                }
            });
        }
    }
}

async fn handle_connection(stream: TcpStream, handler: Arc<dyn BatchHandler>) -> Result<()> {
    let mut framed = Framed::new(stream, LengthDelimitedCodec::new());

    while let Some(frame) = framed.next().await {
        let frame = frame.map_err(|e| DispatchError::Protocol(e.to_string()))?;
        let reply = match bincode::deserialize::<BatchRequest>(&frame) {
            Ok(request) => dispatch(handler.as_ref(), request).await,
            Err(e) => BatchReply::error(
                crate::error::StatusCode::Protocol,
                Some(format!("malformed request: {}", e)),
            ),
        };
        let bytes =
            bincode::serialize(&reply).map_err(|e| DispatchError::System(e.to_string()))?;
        framed
            .send(Bytes::from(bytes))
            .await
            .map_err(|e| DispatchError::Protocol(e.to_string()))?;
    }

    debug!("Connection closed");
    Ok(())
}

async fn dispatch(handler: &dyn BatchHandler, request: BatchRequest) -> BatchReply {
    let started = Instant::now();
    let operation = request.header.operation;
    let user = request.header.user.as_str();

    let reply = match (operation, &request.body) {
        (Operation::LocateJob, RequestBody::JobId(job_id)) => {
            match handler.locate_job(user, job_id).await {
                Ok(location) => BatchReply::located(location),
                Err(e) => error_reply(e),
            }
        }
        (Operation::MoveJob, RequestBody::MovePair { first, second }) => {
            status_reply(handler.move_job(user, first, second).await)
        }
        (Operation::OrderJob, RequestBody::MovePair { first, second }) => {
            status_reply(handler.order_job(user, first, second).await)
        }
        _ => error_reply(DispatchError::InvalidRequest(format!(
            "request body does not match {}",
            operation.as_str()
        ))),
    };

    record_handler_request(operation.as_str(), reply.code, started.elapsed());
    reply
}

fn status_reply(result: Result<()>) -> BatchReply {
    match result {
        Ok(()) => BatchReply::ok(),
        Err(e) => error_reply(e),
    }
}

fn error_reply(err: DispatchError) -> BatchReply {
    let text = match &err {
        DispatchError::Server { message, .. } => message.clone(),
        other => Some(other.to_string()),
    };
    BatchReply::error(err.code(), text)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::StatusCode;
    use crate::types::RequestHeader;

    struct Fixed;

    #[async_trait]
    impl BatchHandler for Fixed {
        async fn locate_job(&self, _user: &str, job_id: &str) -> Result<String> {
            if job_id == "1.svr" {
                Ok("svr".to_string())
            } else {
                Err(DispatchError::server(StatusCode::UnknownJobId, None))
            }
        }

        async fn move_job(&self, _user: &str, _job_id: &str, destination: &str) -> Result<()> {
            if destination == "workq" {
                Ok(())
            } else {
                Err(DispatchError::server(
                    StatusCode::UnknownQueue,
                    Some(format!("Unknown queue {}", destination)),
                ))
            }
        }

        async fn order_job(&self, _user: &str, _first: &str, _second: &str) -> Result<()> {
            Ok(())
        }
    }

    fn request(operation: Operation, body: RequestBody) -> BatchRequest {
        BatchRequest {
            header: RequestHeader {
                operation,
                user: "alice".into(),
            },
            body,
            extension: None,
        }
    }

    #[tokio::test]
    async fn test_dispatch_locate() {
        let reply = dispatch(&Fixed, request(Operation::LocateJob, RequestBody::JobId("1.svr".into()))).await;
        assert!(reply.is_ok());
        assert_eq!(reply.locate.as_deref(), Some("svr"));

        let reply = dispatch(&Fixed, request(Operation::LocateJob, RequestBody::JobId("2.svr".into()))).await;
        assert_eq!(reply.code, StatusCode::UnknownJobId.as_u32());
    }

    #[tokio::test]
    async fn test_dispatch_move_error_text() {
        let reply = dispatch(
            &Fixed,
            request(
                Operation::MoveJob,
                RequestBody::MovePair {
                    first: "1.svr".into(),
                    second: "nosuchq".into(),
                },
            ),
        )
        .await;
        assert_eq!(reply.code, StatusCode::UnknownQueue.as_u32());
        assert_eq!(reply.text.as_deref(), Some("Unknown queue nosuchq"));
    }

    #[tokio::test]
    async fn test_dispatch_mismatched_body() {
        let reply = dispatch(&Fixed, request(Operation::MoveJob, RequestBody::JobId("1.svr".into()))).await;
        assert_eq!(reply.code, StatusCode::InvalidRequest.as_u32());
    }
}
