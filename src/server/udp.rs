use std::net::SocketAddr;
use std::sync::Arc;

use anyhow::{ensure, Context, Result};
use tokio::net::UdpSocket;
use tracing::{debug, info, warn};

use super::{PeerRegistry, ServerConfig, ShutdownSignal};
use crate::logging::CommLog;
use crate::protocol::{ack_for, ClientId, WireMessage, SERVER_ID, SHUTDOWN_ACK, STOP_PAYLOAD};

/// UDP server dispatcher.
///
/// One receive loop reading datagrams from any address. The first datagram
/// from an unseen address registers a new identity; the mapping is kept for
/// the whole run since UDP peers keep their source address. Acknowledgment
/// and logging for each datagram run on their own task, with simulated loss
/// drawn per datagram.
pub struct UdpDispatcher {
    socket: Arc<UdpSocket>,
    registry: Arc<PeerRegistry>,
    shutdown: Arc<ShutdownSignal>,
    log: CommLog,
    config: ServerConfig,
}

impl UdpDispatcher {
    /// Bind the datagram socket and truncate the comm log for a fresh run.
    pub async fn bind(config: ServerConfig) -> Result<Self> {
        ensure!(
            (0.0..=1.0).contains(&config.loss_probability),
            "loss probability must be within [0, 1], got {}",
            config.loss_probability
        );

        let socket = UdpSocket::bind(config.addr())
            .await
            .with_context(|| format!("failed to bind UDP socket on {}", config.addr()))?;
        let log = CommLog::create(&config.log_path, "UDP Communication Log")
            .await
            .with_context(|| format!("failed to create comm log at {:?}", config.log_path))?;

        info!(
            "UDP server [{}] listening on {} (loss probability {})",
            SERVER_ID,
            socket.local_addr()?,
            config.loss_probability
        );
        Ok(Self {
            socket: Arc::new(socket),
            registry: Arc::new(PeerRegistry::new()),
            shutdown: Arc::new(ShutdownSignal::new()),
            log,
            config,
        })
    }

    pub fn local_addr(&self) -> std::io::Result<SocketAddr> {
        self.socket.local_addr()
    }

    pub fn registry(&self) -> Arc<PeerRegistry> {
        Arc::clone(&self.registry)
    }

    pub fn shutdown_signal(&self) -> Arc<ShutdownSignal> {
        Arc::clone(&self.shutdown)
    }

    /// Receive loop. Returns once STOP arrives; after that no further
    /// datagrams are processed.
    pub async fn run(self) -> Result<()> {
        let mut buf = vec![0u8; self.config.buffer_size];
        loop {
            let (n, addr) = tokio::select! {
                _ = self.shutdown.wait() => break,
                received = self.socket.recv_from(&mut buf) => match received {
                    Ok(pair) => pair,
                    Err(e) => {
                        // A reply bounced off a vanished client can surface
                        // here as ECONNRESET; keep serving.
                        debug!("recv_from failed: {e}");
                        continue;
                    }
                },
            };

            let text = String::from_utf8_lossy(&buf[..n]);
            let frame = text.trim();
            if frame.is_empty() {
                // Ignored without logging.
                continue;
            }

            // Decode before touching the registry so malformed datagrams
            // never allocate an identity.
            let message = match WireMessage::parse(frame) {
                Ok(message) => message,
                Err(e) => {
                    warn!("dropping datagram from {addr}: {e}");
                    continue;
                }
            };

            if message.payload == STOP_PAYLOAD {
                if let Err(e) = self
                    .log
                    .line(&format!(
                        "{} sent STOP. Server shutting down.",
                        message.sender
                    ))
                    .await
                {
                    warn!("failed to log STOP: {e}");
                }
                if let Err(e) = self.socket.send_to(SHUTDOWN_ACK.as_bytes(), addr).await {
                    warn!("failed to acknowledge STOP from {addr}: {e}");
                }
                self.shutdown.trigger();
                break;
            }

            let client = self.registry.register(addr).await;
            tokio::spawn(handle_datagram(
                Arc::clone(&self.socket),
                self.log.clone(),
                self.config.loss_probability,
                client,
                addr,
                message,
            ));
        }

        info!("UDP server shutting down");
        Ok(())
    }
}

/// Per-datagram handler: draw for simulated loss, acknowledge or stay
/// silent, and log either outcome.
async fn handle_datagram(
    socket: Arc<UdpSocket>,
    log: CommLog,
    loss_probability: f64,
    client: ClientId,
    addr: SocketAddr,
    message: WireMessage,
) {
    // `>=` so probability 0 acknowledges every datagram and 1 none, even
    // when the draw lands on exactly 0.0.
    if rand::random::<f64>() >= loss_probability {
        let response = ack_for(&message.payload);
        match socket.send_to(response.as_bytes(), addr).await {
            Ok(_) => {
                if let Err(e) = log.exchange(SERVER_ID, &message.sender, &response).await {
                    warn!("failed to log exchange with {client}: {e}");
                }
            }
            Err(e) => warn!("failed to acknowledge {client}: {e}"),
        }
    } else if let Err(e) = log.packet_loss(&message.sender, SERVER_ID, addr).await {
        warn!("failed to log simulated loss for {client}: {e}");
    }
}
