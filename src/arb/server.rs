//! TCP command service: one raw request in, one length-prefixed reply out.

use super::dispatch::{CommandTable, DYING};
use super::error::ProtocolError;
use super::framing::write_frame;
use crate::error::{RackError, Result};
use std::net::SocketAddr;
use std::time::Duration;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::{TcpListener, TcpStream};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

/// How long a connection may take to send its request.
const REQUEST_TIMEOUT: Duration = Duration::from_secs(10);

/// Accept loop serving a [`CommandTable`]. Each connection is handled on its
/// own task, so a slow command never blocks other callers.
#[derive(Debug)]
pub struct CommandServer {
    local_addr: SocketAddr,
    shutdown: CancellationToken,
    task: JoinHandle<()>,
}

impl CommandServer {
    pub async fn bind(addr: SocketAddr, table: CommandTable, max_request_bytes: usize) -> Result<Self> {
        let listener = TcpListener::bind(addr)
            .await
            .map_err(|e| RackError::NetworkError(format!("failed to bind {}: {}", addr, e)))?;
        let local_addr = listener
            .local_addr()
            .map_err(|e| RackError::NetworkError(format!("failed to read bound address: {}", e)))?;

        let shutdown = CancellationToken::new();
        let task = tokio::spawn(accept_loop(
            listener,
            table,
            max_request_bytes,
            shutdown.clone(),
        ));
        info!(%local_addr, "command server listening");

        Ok(Self {
            local_addr,
            shutdown,
            task,
        })
    }

    pub fn local_addr(&self) -> SocketAddr {
        self.local_addr
    }

    /// Token cancelled when the server stops, either via [`stop`](Self::stop)
    /// or because a client invoked `shutdown()`.
    pub fn shutdown_token(&self) -> CancellationToken {
        self.shutdown.clone()
    }

    pub fn is_running(&self) -> bool {
        !self.task.is_finished()
    }

    /// Stop accepting and wait for the accept loop to exit.
    pub async fn stop(self) {
        self.shutdown.cancel();
        self.wait().await;
    }

    /// Wait until the server stops on its own.
    pub async fn wait(self) {
        if let Err(e) = self.task.await {
            warn!(error = %e, "command server task failed");
        }
    }
}

async fn accept_loop(
    listener: TcpListener,
    table: CommandTable,
    max_request_bytes: usize,
    shutdown: CancellationToken,
) {
    loop {
        tokio::select! {
            _ = shutdown.cancelled() => break,
            accepted = listener.accept() => match accepted {
                Ok((stream, peer)) => {
                    let table = table.clone();
                    let shutdown = shutdown.clone();
                    tokio::spawn(async move {
                        if let Err(e) = handle_connection(stream, &table, max_request_bytes, &shutdown).await {
                            debug!(%peer, error = %e, "connection ended with error");
                        }
                    });
                }
                Err(e) => warn!(error = %e, "failed to accept connection"),
            },
        }
    }
    info!("command server stopped");
}

async fn handle_connection(
    mut stream: TcpStream,
    table: &CommandTable,
    max_request_bytes: usize,
    shutdown: &CancellationToken,
) -> std::result::Result<(), ProtocolError> {
    let mut buf = vec![0u8; max_request_bytes];
    let n = match tokio::time::timeout(REQUEST_TIMEOUT, stream.read(&mut buf)).await {
        Ok(read) => read?,
        Err(_) => {
            debug!("client sent no request before timeout");
            return Ok(());
        }
    };
    if n == 0 {
        return Ok(());
    }

    let request = String::from_utf8_lossy(&buf[..n]);
    let request = request.trim();
    let response = table.respond(request);
    debug!(request, response_len = response.len(), "dispatched command");

    write_frame(&mut stream, response.as_bytes()).await?;
    stream.shutdown().await?;

    if response == DYING {
        info!("shutdown requested by client");
        shutdown.cancel();
    }
    Ok(())
}
