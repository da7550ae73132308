//! Network error types for the envelope codec, the transport, and the
//! connection handle.

use thiserror::Error;

use super::protocol_version::SchemaVersion;

/// Errors that can occur while encoding or decoding an envelope.
#[derive(Debug, Error)]
pub enum CodecError {
    /// The frame was not valid JSON or did not match the envelope shape.
    #[error("Failed to decode envelope: {0}")]
    Decode(#[source] serde_json::Error),

    /// The payload did not match the shape its message type requires.
    #[error("Failed to decode '{kind}' payload: {source}")]
    Payload {
        kind: String,
        #[source]
        source: serde_json::Error,
    },

    /// Failed to encode an outbound message.
    #[error("Failed to encode message: {0}")]
    Encode(#[source] serde_json::Error),

    /// The envelope's `type` tag is not one this client understands.
    #[error("Unknown message type '{0}'")]
    UnknownType(String),

    /// The envelope was produced with a schema newer than this client.
    #[error("Unsupported schema version {got} (supported up to {supported})")]
    UnsupportedSchema {
        got: SchemaVersion,
        supported: SchemaVersion,
    },

    /// Frame size exceeded maximum allowed.
    #[error("Frame size {actual} exceeds maximum {max}")]
    FrameTooLarge { actual: usize, max: usize },

    /// The payload decoded but violates a structural limit.
    #[error("Invalid payload: {0}")]
    InvalidPayload(String),
}

/// Result type for codec operations
pub type CodecResult<T> = std::result::Result<T, CodecError>;

/// Errors raised by a [`Transport`](super::transport::Transport) or its
/// [`Connector`](super::transport::Connector).
#[derive(Debug, Error)]
pub enum TransportError {
    #[error("Failed to connect to {endpoint}: {reason}")]
    Connect { endpoint: String, reason: String },

    #[error("Timed out connecting to {0}")]
    ConnectTimeout(String),

    #[error("Failed to send frame: {0}")]
    Send(String),

    #[error("Failed to receive frame: {0}")]
    Receive(String),
}

/// Errors surfaced by the [`ConnectionHandle`](super::driver::ConnectionHandle)
/// and the connection manager.
#[derive(Debug, Error)]
pub enum ConnectionError {
    /// The driver task has stopped; no further commands can be delivered.
    #[error("Connection driver is closed")]
    DriverClosed,

    /// Too many messages are waiting for a connection.
    #[error("Outbound queue is full ({limit} messages)")]
    QueueFull { limit: usize },

    #[error(transparent)]
    Codec(#[from] CodecError),
}

/// Result type for connection operations
pub type ConnectionResult<T> = std::result::Result<T, ConnectionError>;
