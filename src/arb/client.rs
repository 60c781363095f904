//! Client side of the command protocol.

use super::dispatch::DYING;
use super::error::ProtocolError;
use super::framing::{MAX_FRAME_LEN, read_frame};
use crate::error::{RackError, Result};
use std::net::SocketAddr;
use std::time::Duration;
use tokio::io::AsyncWriteExt;
use tokio::net::TcpStream;
use tokio::time::timeout;

/// What a peer answered.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Reply {
    /// Text returned by the operation, or an `ERROR: ...` description.
    Payload(String),
    /// The peer is shutting down; not an error.
    Dying,
}

impl Reply {
    pub fn into_text(self) -> String {
        match self {
            Reply::Payload(text) => text,
            Reply::Dying => DYING.to_string(),
        }
    }
}

/// Issues one command per connection to a specific peer.
#[derive(Debug, Clone)]
pub struct CommandClient {
    addr: SocketAddr,
    timeout: Duration,
}

impl CommandClient {
    pub fn new(addr: SocketAddr) -> Self {
        Self {
            addr,
            timeout: Duration::from_secs(30),
        }
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn addr(&self) -> SocketAddr {
        self.addr
    }

    /// Send `request` (e.g. `view_running_tasks()`) and wait for the full reply.
    pub async fn call(&self, request: &str) -> Result<Reply> {
        let mut stream = timeout(self.timeout, TcpStream::connect(self.addr))
            .await
            .map_err(|_| self.timed_out("connect"))?
            .map_err(|e| RackError::NetworkError(format!("failed to connect to {}: {}", self.addr, e)))?;

        stream
            .write_all(request.as_bytes())
            .await
            .map_err(ProtocolError::from)?;
        stream.flush().await.map_err(ProtocolError::from)?;

        let payload = timeout(self.timeout, read_frame(&mut stream, MAX_FRAME_LEN))
            .await
            .map_err(|_| self.timed_out("read reply"))??;

        let text = String::from_utf8(payload).map_err(|e| {
            RackError::ProtocolError(format!("reply from {} is not UTF-8: {}", self.addr, e))
        })?;

        if text == DYING {
            return Ok(Reply::Dying);
        }
        Ok(Reply::Payload(text))
    }

    fn timed_out(&self, operation: &str) -> RackError {
        RackError::NetworkError(format!(
            "{} to {} timed out after {:?}",
            operation, self.addr, self.timeout
        ))
    }
}
