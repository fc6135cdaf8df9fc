use std::io::ErrorKind;
use std::time::Instant;

use async_trait::async_trait;
use tokio::net::UdpSocket;
use tokio::time;
use tracing::debug;

use super::{ClientSession, SendOutcome, SessionConfig, SessionError};
use crate::logging::CommLog;
use crate::protocol::{ClientId, WireMessage};

/// UDP client session.
///
/// The socket binds an ephemeral local port; the server assigns the
/// authoritative identity on the first datagram from that address. The id
/// given here only tags outgoing messages and the comm log.
pub struct UdpSession {
    id: ClientId,
    config: SessionConfig,
    socket: Option<UdpSocket>,
    log: CommLog,
}

impl UdpSession {
    pub async fn bind(id: u32, config: SessionConfig, log: CommLog) -> Result<Self, SessionError> {
        let socket = UdpSocket::bind("0.0.0.0:0").await?;
        let addr = config.addr();
        socket
            .connect(&addr)
            .await
            .map_err(|source| SessionError::Connect {
                addr: addr.clone(),
                source,
            })?;

        debug!("C[{id}] bound {} for {}", socket.local_addr()?, addr);
        Ok(Self {
            id: ClientId(id),
            config,
            socket: Some(socket),
            log,
        })
    }
}

#[async_trait]
impl ClientSession for UdpSession {
    fn id(&self) -> ClientId {
        self.id
    }

    fn tracks_loss(&self) -> bool {
        true
    }

    async fn send(&mut self, payload: &str) -> Result<SendOutcome, SessionError> {
        let socket = self.socket.as_ref().ok_or(SessionError::NotConnected)?;
        let frame = WireMessage::new(
            self.id.to_string(),
            self.config.receiver_id.clone(),
            payload,
        )
        .to_bytes();
        let bytes_sent = payload.len();
        let mut reply = vec![0u8; self.config.buffer_size];

        let start = Instant::now();
        socket.send(&frame).await?;
        self.log
            .exchange(self.id, &self.config.receiver_id, payload)
            .await?;

        // Bounded reply wait: an elapsed timeout is the loss sentinel.
        match time::timeout(self.config.reply_timeout, socket.recv(&mut reply)).await {
            Ok(Ok(_)) => Ok(SendOutcome::Acked {
                latency: start.elapsed(),
                bytes_sent,
            }),
            // On a connected UDP socket an earlier datagram to a dead peer
            // can surface as ECONNREFUSED/ECONNRESET on the next receive.
            // The reply is gone either way, so count it as lost.
            Ok(Err(e))
                if matches!(
                    e.kind(),
                    ErrorKind::ConnectionRefused | ErrorKind::ConnectionReset
                ) =>
            {
                Ok(SendOutcome::Lost { bytes_sent })
            }
            Ok(Err(e)) => Err(e.into()),
            Err(_elapsed) => Ok(SendOutcome::Lost { bytes_sent }),
        }
    }

    async fn close(&mut self) {
        self.socket = None;
    }
}
