//! Wire protocol and connection management.

/// Sans-IO connection lifecycle: backoff, heartbeats, outbound queue.
pub mod connection;

/// Async task that owns the socket and drives a connection manager.
pub mod driver;

/// Message envelope with metadata and the text-frame codec.
pub mod envelope;

pub mod errors;

/// Typed server and client messages.
pub mod messages;

/// Schema versioning for envelope compatibility.
pub mod protocol_version;

/// Handler registry for inbound messages.
pub mod registry;

/// WebSocket and in-memory transports.
pub mod transport;
