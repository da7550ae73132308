//! The JSON envelope wrapped around every frame.
//!
//! ```text
//! { "type": "table-state-update", "sentAt": 1718000000000,
//!   "traceId": "…", "requestId": "…", "payload": { … }, "schemaVersion": 1 }
//! ```

use chrono::Utc;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use uuid::Uuid;

use super::{
    errors::{CodecError, CodecResult},
    messages::{MessageKind, WireMessage},
    protocol_version::SchemaVersion,
};

/// Maximum accepted frame size (1MB). Larger frames are dropped undecoded.
pub const MAX_FRAME_SIZE: usize = 1024 * 1024;

#[derive(Debug, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
struct RawEnvelope {
    #[serde(rename = "type")]
    kind: String,
    sent_at: i64,
    trace_id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    request_id: Option<String>,
    #[serde(default)]
    payload: Value,
    schema_version: SchemaVersion,
}

/// A typed message plus its wire metadata. Immutable once constructed.
#[derive(Clone, Debug, PartialEq)]
pub struct Envelope<M> {
    message: M,
    sent_at: i64,
    trace_id: String,
    request_id: Option<String>,
    schema_version: SchemaVersion,
}

impl<M: WireMessage> Envelope<M> {
    /// Stamp a message with the current time, a fresh trace ID, and the
    /// current schema version.
    pub fn new(message: M) -> Self {
        Self {
            message,
            sent_at: Utc::now().timestamp_millis(),
            trace_id: Uuid::new_v4().to_string(),
            request_id: None,
            schema_version: SchemaVersion::current(),
        }
    }

    /// Like [`Envelope::new`], tagged with a fresh request ID for
    /// correlating the server's reply.
    pub fn request(message: M) -> Self {
        let mut envelope = Self::new(message);
        envelope.request_id = Some(Uuid::new_v4().to_string());
        envelope
    }

    pub fn kind(&self) -> MessageKind {
        self.message.kind()
    }

    pub fn message(&self) -> &M {
        &self.message
    }

    pub fn into_message(self) -> M {
        self.message
    }

    pub fn sent_at(&self) -> i64 {
        self.sent_at
    }

    pub fn trace_id(&self) -> &str {
        &self.trace_id
    }

    pub fn request_id(&self) -> Option<&str> {
        self.request_id.as_deref()
    }

    pub fn schema_version(&self) -> SchemaVersion {
        self.schema_version
    }

    /// Serialize into a text frame.
    ///
    /// # Errors
    ///
    /// Returns an error if the payload cannot be represented as JSON or the
    /// frame would exceed [`MAX_FRAME_SIZE`].
    pub fn encode(&self) -> CodecResult<String> {
        let raw = RawEnvelope {
            kind: self.kind().as_str().to_string(),
            sent_at: self.sent_at,
            trace_id: self.trace_id.clone(),
            request_id: self.request_id.clone(),
            payload: self.message.to_payload()?,
            schema_version: self.schema_version,
        };
        let frame = serde_json::to_string(&raw).map_err(CodecError::Encode)?;
        if frame.len() > MAX_FRAME_SIZE {
            return Err(CodecError::FrameTooLarge {
                actual: frame.len(),
                max: MAX_FRAME_SIZE,
            });
        }
        Ok(frame)
    }

    /// Parse a text frame.
    ///
    /// # Errors
    ///
    /// Returns an error if the frame is oversized, is not a well-formed
    /// envelope, carries an unsupported schema version or an unknown type
    /// tag, or its payload does not match its type.
    pub fn decode(frame: &str) -> CodecResult<Self> {
        if frame.len() > MAX_FRAME_SIZE {
            return Err(CodecError::FrameTooLarge {
                actual: frame.len(),
                max: MAX_FRAME_SIZE,
            });
        }
        let raw: RawEnvelope = serde_json::from_str(frame).map_err(CodecError::Decode)?;
        if !raw.schema_version.is_supported() {
            return Err(CodecError::UnsupportedSchema {
                got: raw.schema_version,
                supported: SchemaVersion::current(),
            });
        }
        let kind: MessageKind = raw.kind.parse()?;
        let message = M::from_parts(kind, raw.payload)?;
        Ok(Self {
            message,
            sent_at: raw.sent_at,
            trace_id: raw.trace_id,
            request_id: raw.request_id,
            schema_version: raw.schema_version,
        })
    }
}
