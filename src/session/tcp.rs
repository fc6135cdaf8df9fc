use std::time::Instant;

use async_trait::async_trait;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpStream;
use tracing::debug;

use super::{ClientSession, SendOutcome, SessionConfig, SessionError};
use crate::logging::CommLog;
use crate::protocol::{ClientId, WireMessage};

/// TCP client session.
///
/// TCP identities are chosen client-side at construction; the server's
/// registry only labels the accepted connections it dispatches.
pub struct TcpSession {
    id: ClientId,
    config: SessionConfig,
    stream: Option<TcpStream>,
    log: CommLog,
}

impl TcpSession {
    pub fn new(id: u32, config: SessionConfig, log: CommLog) -> Self {
        Self {
            id: ClientId(id),
            config,
            stream: None,
            log,
        }
    }

    /// Open the byte-stream connection. Refusal or unreachability is fatal
    /// for this session only.
    pub async fn connect(&mut self) -> Result<(), SessionError> {
        let addr = self.config.addr();
        let stream = TcpStream::connect(&addr)
            .await
            .map_err(|source| SessionError::Connect {
                addr: addr.clone(),
                source,
            })?;

        // Same low-latency socket options the server applies on accept.
        let std_stream = stream.into_std()?;
        let socket = socket2::Socket::from(std_stream.try_clone()?);
        socket.set_nodelay(true)?;
        socket.set_recv_buffer_size(self.config.buffer_size)?;
        socket.set_send_buffer_size(self.config.buffer_size)?;
        self.stream = Some(TcpStream::from_std(std_stream)?);

        debug!("{} connected to {}", self.id, addr);
        Ok(())
    }
}

#[async_trait]
impl ClientSession for TcpSession {
    fn id(&self) -> ClientId {
        self.id
    }

    fn tracks_loss(&self) -> bool {
        false
    }

    async fn send(&mut self, payload: &str) -> Result<SendOutcome, SessionError> {
        let stream = self.stream.as_mut().ok_or(SessionError::NotConnected)?;
        let frame = WireMessage::new(
            self.id.to_string(),
            self.config.receiver_id.clone(),
            payload,
        )
        .to_bytes();
        let bytes_sent = payload.len();
        let mut reply = vec![0u8; self.config.buffer_size];

        let start = Instant::now();
        stream.write_all(&frame).await?;
        // Unbounded read: blocks until the acknowledgment or peer close.
        let n = stream.read(&mut reply).await?;
        if n == 0 {
            return Err(SessionError::ConnectionClosed);
        }
        let latency = start.elapsed();

        self.log
            .exchange(self.id, &self.config.receiver_id, payload)
            .await?;

        Ok(SendOutcome::Acked {
            latency,
            bytes_sent,
        })
    }

    async fn close(&mut self) {
        // Dropping the stream closes the socket exactly once.
        self.stream = None;
    }
}
