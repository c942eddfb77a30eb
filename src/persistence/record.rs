//! On-disk envelope for durable store entries.

use serde::{Deserialize, Serialize};

use super::compression::CompressionCodec;
use super::encryption::CipherKind;

/// Version written into every record's metadata.
pub const RECORD_VERSION: &str = "1.0";

/// Metadata describing how a record's value was encoded.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RecordMetadata {
    /// Write time in milliseconds since the Unix epoch.
    pub timestamp: u64,
    /// Envelope format version.
    pub version: String,
    /// JSON type of the logical value (`object`, `array`, `string`, ...).
    #[serde(rename = "type")]
    pub value_type: String,
    /// Whether the value is compressed.
    pub compressed: bool,
    /// Whether the value is encrypted (or insecurely encoded).
    pub encrypted: bool,
    /// Time-to-live in milliseconds, measured from `timestamp`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ttl: Option<u64>,
    /// Compression provider used when `compressed` is set.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub codec: Option<CompressionCodec>,
    /// Encryption provider used when `encrypted` is set.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cipher: Option<CipherKind>,
}

impl RecordMetadata {
    /// Returns true when the TTL has elapsed at `now`.
    #[must_use]
    pub fn is_expired(&self, now: u64) -> bool {
        self.ttl
            .is_some_and(|ttl| now > self.timestamp.saturating_add(ttl))
    }
}

/// A value and its metadata as written to the backend.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StoredRecord {
    /// Serialised JSON, possibly compressed and/or encrypted.
    pub value: String,
    /// How `value` was produced.
    pub metadata: RecordMetadata,
}

/// Names the JSON type of `value` for record metadata.
#[must_use]
pub const fn json_type_name(value: &serde_json::Value) -> &'static str {
    match value {
        serde_json::Value::Null => "null",
        serde_json::Value::Bool(_) => "boolean",
        serde_json::Value::Number(_) => "number",
        serde_json::Value::String(_) => "string",
        serde_json::Value::Array(_) => "array",
        serde_json::Value::Object(_) => "object",
    }
}
