use thiserror::Error;

use sio_protocol::CodecError;

/// Protocol-level violations above the codec: plaintext/binary framing is the codec's own
/// concern (see `CodecError`), but "incompatible protocol version" is only knowable once
/// the server layer inspects a CONNECT packet's declared version.
#[derive(Debug, Error, PartialEq)]
pub enum ProtocolError {
    #[error(transparent)]
    Codec(#[from] CodecError),
    #[error("unsupported protocol version: {0}")]
    IncompatibleVersion(u8),
}

/// Middleware rejected a connecting socket. Surfaced to the peer as a CONNECT_ERROR
/// packet carrying `message` and optional `data`.
#[derive(Debug, Error, Clone, PartialEq)]
#[error("admission refused: {message}")]
pub struct AdmissionError {
    pub message: String,
    pub data: Option<sio_protocol::Value>,
}

impl AdmissionError {
    pub fn new(message: impl Into<String>) -> Self {
        AdmissionError {
            message: message.into(),
            data: None,
        }
    }

    pub fn with_data(message: impl Into<String>, data: sio_protocol::Value) -> Self {
        AdmissionError {
            message: message.into(),
            data: Some(data),
        }
    }
}

/// An ack, broadcast-with-ack, fetch, or connect operation did not complete in time.
#[derive(Debug, Error, Clone, PartialEq)]
pub enum TimeoutError {
    #[error("ack timed out")]
    Ack,
    #[error("broadcast-with-ack timed out")]
    BroadcastAck,
    #[error("fetch sockets timed out")]
    Fetch,
    #[error("connect timed out")]
    Connect,
}

/// A socket was disconnected while an ack on it was still outstanding.
#[derive(Debug, Error, Clone, PartialEq)]
#[error("socket disconnected while ack was pending: {reason}")]
pub struct DisconnectError {
    pub reason: DisconnectReason,
}

/// Reasons a socket's connection ends.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum DisconnectReason {
    IoServerDisconnect,
    IoClientDisconnect,
    PingTimeout,
    TransportClose,
    TransportError,
    ForcedClose,
    ForcedServerClose,
    ServerShuttingDown,
    ParseError,
    ClientNamespaceDisconnect,
}

impl std::fmt::Display for DisconnectReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            DisconnectReason::IoServerDisconnect => "io server disconnect",
            DisconnectReason::IoClientDisconnect => "io client disconnect",
            DisconnectReason::PingTimeout => "ping timeout",
            DisconnectReason::TransportClose => "transport close",
            DisconnectReason::TransportError => "transport error",
            DisconnectReason::ForcedClose => "forced close",
            DisconnectReason::ForcedServerClose => "forced server close",
            DisconnectReason::ServerShuttingDown => "server shutting down",
            DisconnectReason::ParseError => "parse error",
            DisconnectReason::ClientNamespaceDisconnect => "client namespace disconnect",
        };
        write!(f, "{s}")
    }
}

/// The retry queue's head exceeded its retry bound and was discarded.
#[derive(Debug, Error, Clone, PartialEq)]
#[error("packet discarded after exceeding retry limit")]
pub struct RetryExhausted;

/// Top-level error a `Socket` operation can produce.
#[derive(Debug, Error)]
pub enum SocketError {
    #[error(transparent)]
    Protocol(#[from] ProtocolError),
    #[error(transparent)]
    Admission(#[from] AdmissionError),
    #[error(transparent)]
    Timeout(#[from] TimeoutError),
    #[error(transparent)]
    Disconnected(#[from] DisconnectError),
    #[error(transparent)]
    RetryExhausted(#[from] RetryExhausted),
    #[error("event name '{0}' is reserved")]
    ReservedEvent(String),
    #[error("transport write failed: {0}")]
    Transport(String),
    #[error("unsupported operation: {0}")]
    Unsupported(String),
}
