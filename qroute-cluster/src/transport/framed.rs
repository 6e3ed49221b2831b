//! Length-delimited TCP transport
//!
//! Each request and reply is one bincode-encoded frame.

use super::{RequestBuilder, Transport, TransportError};
use crate::types::{BatchReply, Operation, RequestBody};
use async_trait::async_trait;
use bytes::Bytes;
use futures::{SinkExt, StreamExt};
use std::net::SocketAddr;
use std::time::Duration;
use tokio::net::TcpStream;
use tokio_util::codec::{Framed, LengthDelimitedCodec};
use tracing::debug;

/// Transport over a framed TCP stream
pub struct FramedTransport {
    framed: Framed<TcpStream, LengthDelimitedCodec>,
    pending: RequestBuilder,
}

impl FramedTransport {
    /// Wrap an already connected stream
    pub fn new(stream: TcpStream) -> Self {
        Self {
            framed: Framed::new(stream, LengthDelimitedCodec::new()),
            pending: RequestBuilder::new(),
        }
    }

    /// Address of the remote instance
    pub fn peer_addr(&self) -> Option<SocketAddr> {
        self.framed.get_ref().peer_addr().ok()
    }
}

/// Connect to an instance with a timeout
pub async fn connect(addr: &str, timeout: Duration) -> Result<FramedTransport, TransportError> {
    debug!("Connecting to server instance at {}", addr);
    let stream = tokio::time::timeout(timeout, TcpStream::connect(addr))
        .await
        .map_err(|_| {
            TransportError::Io(std::io::Error::new(
                std::io::ErrorKind::TimedOut,
                format!("connection to {} timed out", addr),
            ))
        })??;
    stream.set_nodelay(true)?;
    Ok(FramedTransport::new(stream))
}

#[async_trait]
impl Transport for FramedTransport {
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
        let frame = bincode::serialize(&request)
            .map_err(|e| TransportError::Encode(e.to_string()))?;
        self.framed.send(Bytes::from(frame)).await?;
        Ok(())
    }

    async fn read_reply(&mut self) -> Result<BatchReply, TransportError> {
        match self.framed.next().await {
            Some(frame) => {
                let frame = frame?;
                Ok(bincode::deserialize(&frame)?)
            }
            None => Err(TransportError::Closed),
        }
    }
}
