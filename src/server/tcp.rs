use std::net::SocketAddr;
use std::sync::Arc;

use anyhow::{Context, Result};
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::{TcpListener, TcpStream};
use tracing::{debug, error, info, warn};

use super::{PeerRegistry, ServerConfig, ShutdownSignal};
use crate::logging::CommLog;
use crate::protocol::{ack_for, ClientId, WireMessage, SERVER_ID, SHUTDOWN_ACK, STOP_PAYLOAD};

/// TCP server dispatcher.
///
/// One accept loop; every accepted connection gets its own handler task.
/// A handler observing the STOP payload acknowledges the sender, then trips
/// the shared shutdown signal so the accept loop stops taking new peers
/// while in-flight handlers finish on their own.
pub struct TcpDispatcher {
    listener: TcpListener,
    registry: Arc<PeerRegistry>,
    shutdown: Arc<ShutdownSignal>,
    log: CommLog,
    config: ServerConfig,
}

impl TcpDispatcher {
    /// Bind the listening socket and truncate the comm log for a fresh run.
    pub async fn bind(config: ServerConfig) -> Result<Self> {
        let listener = TcpListener::bind(config.addr())
            .await
            .with_context(|| format!("failed to bind TCP listener on {}", config.addr()))?;
        let log = CommLog::create(&config.log_path, "TCP Communication Log")
            .await
            .with_context(|| format!("failed to create comm log at {:?}", config.log_path))?;

        info!(
            "TCP server [{}] listening on {}",
            SERVER_ID,
            listener.local_addr()?
        );
        Ok(Self {
            listener,
            registry: Arc::new(PeerRegistry::new()),
            shutdown: Arc::new(ShutdownSignal::new()),
            log,
            config,
        })
    }

    pub fn local_addr(&self) -> std::io::Result<SocketAddr> {
        self.listener.local_addr()
    }

    pub fn registry(&self) -> Arc<PeerRegistry> {
        Arc::clone(&self.registry)
    }

    pub fn shutdown_signal(&self) -> Arc<ShutdownSignal> {
        Arc::clone(&self.shutdown)
    }

    /// Accept loop. Returns once a handler has observed STOP; a failed
    /// accept is logged and never fatal.
    pub async fn run(self) -> Result<()> {
        loop {
            tokio::select! {
                _ = self.shutdown.wait() => break,
                accepted = self.listener.accept() => {
                    match accepted {
                        Ok((stream, addr)) => {
                            let conn_id = self.registry.register(addr).await;
                            debug!("accepted connection from {addr} as {conn_id}");
                            tokio::spawn(handle_client(
                                stream,
                                addr,
                                conn_id,
                                Arc::clone(&self.registry),
                                Arc::clone(&self.shutdown),
                                self.log.clone(),
                                self.config.buffer_size,
                            ));
                        }
                        Err(e) => error!("failed to accept TCP connection: {e}"),
                    }
                }
            }
        }

        info!("TCP server shutting down");
        Ok(())
    }
}

/// Per-connection handler wrapper: serves the message loop, then always
/// removes the peer from the registry on the way out. Handler faults are
/// logged against the connection identity and never reach the accept loop.
async fn handle_client(
    mut stream: TcpStream,
    addr: SocketAddr,
    conn_id: ClientId,
    registry: Arc<PeerRegistry>,
    shutdown: Arc<ShutdownSignal>,
    log: CommLog,
    buffer_size: usize,
) {
    if let Err(e) = serve_connection(&mut stream, addr, &shutdown, &log, buffer_size).await {
        warn!("error handling {conn_id}: {e}");
        if let Err(log_err) = log.line(&format!("Error handling {conn_id}: {e}")).await {
            warn!("failed to log handler error for {conn_id}: {log_err}");
        }
    }
    registry.remove(&addr).await;
    debug!("connection {conn_id} closed");
}

async fn serve_connection(
    stream: &mut TcpStream,
    addr: SocketAddr,
    shutdown: &ShutdownSignal,
    log: &CommLog,
    buffer_size: usize,
) -> Result<()> {
    let mut buf = vec![0u8; buffer_size];
    loop {
        // One read is one logical frame; the peer writes whole messages.
        let n = stream.read(&mut buf).await?;
        if n == 0 {
            // Graceful peer close.
            return Ok(());
        }

        let message = match WireMessage::from_bytes(&buf[..n]) {
            Ok(message) => message,
            Err(e) => {
                // Dropped without a reply; the sender's read will outlast it.
                warn!("dropping frame from {addr}: {e}");
                continue;
            }
        };

        if message.payload == STOP_PAYLOAD {
            log.line(&format!(
                "{} sent STOP. Server shutting down.",
                message.sender
            ))
            .await?;
            stream.write_all(SHUTDOWN_ACK.as_bytes()).await?;
            shutdown.trigger();
            return Ok(());
        }

        let response = ack_for(&message.payload);
        stream.write_all(response.as_bytes()).await?;
        log.exchange(SERVER_ID, &message.sender, &response).await?;
    }
}
