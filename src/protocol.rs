use std::fmt;

use thiserror::Error;

/// Identity token the server signs its acknowledgments with.
pub const SERVER_ID: &str = "Server";

/// Reserved control payload that triggers the shutdown handshake.
///
/// The match is exact and case-sensitive; `STOP` is never valid ordinary
/// data.
pub const STOP_PAYLOAD: &str = "STOP";

/// Literal acknowledgment sent in response to [`STOP_PAYLOAD`] before the
/// server closes.
pub const SHUTDOWN_ACK: &str = "Server shutting down...";

/// Errors produced while decoding wire frames.
#[derive(Debug, Error)]
pub enum ProtocolError {
    /// The frame did not contain the two colon delimiters separating sender,
    /// receiver, and payload.
    #[error("malformed message, expected sender:receiver:payload: {frame:?}")]
    MalformedMessage { frame: String },
}

/// Token distinguishing one logical client from another within one server
/// run, rendered as `C[<n>]`.
///
/// TCP clients self-assign their identity at construction; UDP identities are
/// authoritative on the server, which assigns one on the first datagram from
/// a previously unseen address.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ClientId(pub u32);

impl fmt::Display for ClientId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "C[{}]", self.0)
    }
}

/// One `sender:receiver:payload` unit exchanged over either transport.
///
/// The encoded form is plain UTF-8 text with no length prefix; TCP relies on
/// one write mapping to one `read` call on the peer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WireMessage {
    pub sender: String,
    pub receiver: String,
    pub payload: String,
}

impl WireMessage {
    pub fn new(
        sender: impl Into<String>,
        receiver: impl Into<String>,
        payload: impl Into<String>,
    ) -> Self {
        Self {
            sender: sender.into(),
            receiver: receiver.into(),
            payload: payload.into(),
        }
    }

    /// Serialize to the colon-joined wire form.
    ///
    /// Sender and receiver must not contain the delimiter; the payload may.
    pub fn to_bytes(&self) -> Vec<u8> {
        format!("{}:{}:{}", self.sender, self.receiver, self.payload).into_bytes()
    }

    /// Decode a received frame, treating everything after the second colon as
    /// the payload.
    pub fn from_bytes(bytes: &[u8]) -> Result<Self, ProtocolError> {
        let text = String::from_utf8_lossy(bytes);
        Self::parse(&text)
    }

    /// Split a textual frame on the first two colons only.
    pub fn parse(frame: &str) -> Result<Self, ProtocolError> {
        let mut parts = frame.splitn(3, ':');
        match (parts.next(), parts.next(), parts.next()) {
            (Some(sender), Some(receiver), Some(payload)) => {
                Ok(Self::new(sender, receiver, payload))
            }
            _ => Err(ProtocolError::MalformedMessage {
                frame: frame.to_string(),
            }),
        }
    }
}

/// Fixed-format acknowledgment the server replies with for an ordinary
/// payload.
pub fn ack_for(payload: &str) -> String {
    format!("Received '{}'", payload)
}
