//! Envelope schema versioning.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Schema version carried in every envelope's `schemaVersion` field.
#[derive(Clone, Copy, Debug, Deserialize, Eq, Hash, Ord, PartialEq, PartialOrd, Serialize)]
#[serde(transparent)]
pub struct SchemaVersion(pub u32);

impl SchemaVersion {
    /// First schema this client understands.
    pub const MIN_SUPPORTED: SchemaVersion = SchemaVersion(1);

    /// Get the schema version this client produces
    pub fn current() -> Self {
        SchemaVersion(1)
    }

    /// Whether an envelope produced with this schema can be decoded here.
    ///
    /// Older schemas are accepted because payload fields are additive;
    /// anything newer than [`SchemaVersion::current`] is rejected.
    pub fn is_supported(&self) -> bool {
        *self >= Self::MIN_SUPPORTED && *self <= Self::current()
    }
}

impl Default for SchemaVersion {
    fn default() -> Self {
        Self::current()
    }
}

impl fmt::Display for SchemaVersion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}
