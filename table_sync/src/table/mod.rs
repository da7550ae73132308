//! Canonical table state: wire entities, the reconciler that owns them, and
//! table announcements.

pub mod announcements;
pub mod entities;
pub mod reconciler;

pub use announcements::AnnouncementBoard;
pub use reconciler::{PromptOutcome, TableStateReconciler, UpdateOutcome};
