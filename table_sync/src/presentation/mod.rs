//! Presentation sequencing that runs alongside canonical state but never
//! writes to it.

pub mod chips;
pub mod dealing;

pub use chips::{ChipAnimation, ChipEndpoint, ChipSettlementOrchestrator, CollectionComplete};
pub use dealing::{DealEntry, DealingSequencer, compute_sequence};
