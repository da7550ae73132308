//! Terminal client that watches one live table.
//!
//! The binary wires [`table_sync`] to stdin and stdout: it keeps a
//! [`TableSession`](table_sync::TableSession) fed from a reconnecting
//! WebSocket connection, prints the table and presentation events, and turns
//! typed commands into action requests.

pub mod app;
pub mod commands;
pub mod config;
pub mod logging;
pub mod render;
