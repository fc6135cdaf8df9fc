use std::time::{Duration, Instant};

use async_trait::async_trait;
use thiserror::Error;

use crate::metrics::{SessionRecorder, SessionResult};
use crate::payload::PayloadFn;
use crate::protocol::{ClientId, ProtocolError, SERVER_ID};

pub mod tcp;
pub mod udp;

pub use tcp::TcpSession;
pub use udp::UdpSession;

/// Errors a client session can surface.
///
/// A timed-out UDP reply is deliberately NOT here; it resolves to
/// [`SendOutcome::Lost`] and is counted toward packet loss.
#[derive(Debug, Error)]
pub enum SessionError {
    /// The initial connect was refused or unreachable. Fatal for this
    /// session only; the sweep records a zero result for the slot.
    #[error("failed to connect to {addr}: {source}")]
    Connect {
        addr: String,
        #[source]
        source: std::io::Error,
    },

    /// The TCP peer closed the stream before a reply arrived.
    #[error("connection closed by peer before a reply arrived")]
    ConnectionClosed,

    /// `send` was called before `connect`, or after `close`.
    #[error("session socket is not open")]
    NotConnected,

    #[error("failed to initialize latency histogram: {0}")]
    Metrics(#[from] hdrhistogram::CreationError),

    #[error(transparent)]
    Protocol(#[from] ProtocolError),

    #[error(transparent)]
    Io(#[from] std::io::Error),
}

/// Outcome of a single send/reply exchange.
#[derive(Debug, Clone, Copy)]
pub enum SendOutcome {
    /// The reply arrived within the wait bound.
    Acked {
        latency: Duration,
        bytes_sent: usize,
    },
    /// The bounded reply wait elapsed (UDP only); a countable loss, not an
    /// error.
    Lost { bytes_sent: usize },
}

/// Connection parameters shared by both session flavors.
#[derive(Debug, Clone)]
pub struct SessionConfig {
    pub host: String,
    pub port: u16,
    /// Identity acknowledged exchanges are addressed to.
    pub receiver_id: String,
    /// Receive buffer for replies.
    pub buffer_size: usize,
    /// Bounded reply wait for UDP sessions; TCP reads are unbounded.
    pub reply_timeout: Duration,
}

impl SessionConfig {
    pub fn new(host: impl Into<String>, port: u16) -> Self {
        Self {
            host: host.into(),
            port,
            receiver_id: SERVER_ID.to_string(),
            buffer_size: crate::defaults::RECV_BUFFER,
            reply_timeout: crate::defaults::UDP_REPLY_TIMEOUT,
        }
    }

    pub fn addr(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}

/// One logical client across a configured number of messages against one
/// transport.
///
/// Implementors supply the transport-specific exchange; the provided `run`
/// drives the sequential measurement loop and owns the accounting.
#[async_trait]
pub trait ClientSession: Send {
    fn id(&self) -> ClientId;

    /// Whether timed-out replies are an expected, countable outcome (UDP).
    fn tracks_loss(&self) -> bool;

    /// Encode one message with this session's identity as sender, transmit
    /// it, and block for the reply.
    async fn send(&mut self, payload: &str) -> Result<SendOutcome, SessionError>;

    /// Close the underlying socket. Safe to call more than once.
    async fn close(&mut self);

    /// Send `num_messages` generated payloads in sequence and reduce the
    /// outcomes to a [`SessionResult`].
    ///
    /// The wall-clock span runs from just before the first send to the last
    /// completion. The socket is closed unconditionally, including for
    /// zero-message runs and mid-run errors.
    async fn run(
        &mut self,
        num_messages: usize,
        payload: &PayloadFn,
    ) -> Result<SessionResult, SessionError> {
        let generate = payload.as_ref();
        let mut recorder = SessionRecorder::new(self.tracks_loss())?;

        let start = Instant::now();
        for message_num in 0..num_messages {
            let body = generate(message_num);
            match self.send(&body).await {
                Ok(SendOutcome::Acked {
                    latency,
                    bytes_sent,
                }) => recorder.record_ack(latency, bytes_sent),
                Ok(SendOutcome::Lost { bytes_sent }) => recorder.record_lost(bytes_sent),
                Err(e) => {
                    self.close().await;
                    return Err(e);
                }
            }
        }
        let elapsed = start.elapsed();
        self.close().await;

        Ok(recorder.finish(elapsed))
    }
}
