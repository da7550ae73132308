//! # Table Sync
//!
//! Client-side synchronisation for a server-authoritative card table.
//!
//! The crate keeps one player's view of a live table consistent with the
//! server across unreliable connections, and sequences the visible playback
//! of deals, chip movement, and showdowns independently of when the
//! underlying state changed.
//!
//! ## Core Modules
//!
//! - [`net`]: envelope codec, typed messages, handler registry, and the
//!   reconnecting connection manager with its async driver
//! - [`table`]: wire entities and the versioned state reconciler
//! - [`hand`]: hand lifecycle and showdown presentation
//! - [`presentation`]: dealing sequencer and chip settlement orchestrator
//! - [`session`]: wires the above together for one subscribed table
//!
//! Every timed component is sans-IO: it is driven with millisecond
//! timestamps through a [`scheduler::Scheduler`] and cancelled by
//! generation, so tests run without a clock.
//!
//! ## Example
//!
//! ```
//! use table_sync::{PresentationConfig, TableSession};
//!
//! let (session, _events) = TableSession::new(1, None, PresentationConfig::default());
//! assert!(!session.state().has_snapshot());
//! ```

pub mod config;
pub mod hand;
pub mod net;
pub mod presentation;
pub mod scheduler;
pub mod session;
pub mod table;

pub use config::{ConfigError, ConnectionConfig, PresentationConfig};
pub use net::{
    connection::{ConnectionManager, ConnectionState, SendOutcome},
    driver::{ConnectionDriver, ConnectionHandle},
    envelope::Envelope,
    errors::{CodecError, ConnectionError, TransportError},
    messages::{ClientMessage, MessageKind, ServerMessage},
    transport::{MemoryConnector, WsConnector},
};
pub use session::{ActionError, SessionEvent, TableSession};
pub use table::entities;
