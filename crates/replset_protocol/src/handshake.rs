//! Handshake documents returned by a node's capability probe.

use crate::error::{ProtocolError, ProtocolResult};
use crate::Document;
use serde::{Deserialize, Serialize};

/// Default maximum BSON document size (16 MiB).
pub const DEFAULT_MAX_BSON_OBJECT_SIZE: u32 = 16 * 1024 * 1024;

/// Default maximum wire message size.
pub const DEFAULT_MAX_MESSAGE_SIZE_BYTES: u32 = 48_000_000;

/// Typed view of a handshake response.
///
/// Absent fields stay `None`; defaults are applied by the accessors and by
/// [`CapabilitySet::derive`](crate::CapabilitySet::derive), never at parse time.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct HandshakeDocument {
    /// Lowest wire protocol version the node speaks.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub min_wire_version: Option<i32>,
    /// Highest wire protocol version the node speaks.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_wire_version: Option<i32>,
    /// Maximum number of documents in one write batch.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_write_batch_size: Option<u32>,
    /// Maximum BSON document size.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_bson_object_size: Option<u32>,
    /// Maximum wire message size.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_message_size_bytes: Option<u32>,
    /// Replica set name reported by the node.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub set_name: Option<String>,
    /// Members the node knows about.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub hosts: Vec<String>,
    /// Whether the node is the primary.
    #[serde(rename = "ismaster", default)]
    pub is_primary: bool,
    /// Whether the node is a secondary.
    #[serde(rename = "secondary", default)]
    pub is_secondary: bool,
}

impl HandshakeDocument {
    /// Creates a handshake advertising the given wire version range.
    pub fn with_wire_versions(min: i32, max: i32) -> Self {
        Self {
            min_wire_version: Some(min),
            max_wire_version: Some(max),
            ..Self::default()
        }
    }

    /// Sets the write batch size hint.
    pub fn with_max_write_batch_size(mut self, size: u32) -> Self {
        self.max_write_batch_size = Some(size);
        self
    }

    /// Sets the replica set name.
    pub fn with_set_name(mut self, name: impl Into<String>) -> Self {
        self.set_name = Some(name.into());
        self
    }

    /// Parses a handshake from a raw document.
    pub fn from_document(doc: &Document) -> ProtocolResult<Self> {
        if !doc.is_object() {
            return Err(ProtocolError::MalformedHandshake(
                "expected an object".into(),
            ));
        }
        Self::deserialize(doc).map_err(|e| ProtocolError::MalformedHandshake(e.to_string()))
    }

    /// Parses a handshake from JSON text.
    pub fn from_json(text: &str) -> ProtocolResult<Self> {
        let doc: Document = serde_json::from_str(text)
            .map_err(|e| ProtocolError::MalformedHandshake(e.to_string()))?;
        Self::from_document(&doc)
    }

    /// Converts back into a raw document.
    pub fn to_document(&self) -> Document {
        serde_json::to_value(self).unwrap_or(Document::Null)
    }

    /// Maximum BSON document size, defaulted.
    pub fn max_bson_object_size(&self) -> u32 {
        self.max_bson_object_size
            .unwrap_or(DEFAULT_MAX_BSON_OBJECT_SIZE)
    }

    /// Maximum wire message size, defaulted.
    pub fn max_message_size_bytes(&self) -> u32 {
        self.max_message_size_bytes
            .unwrap_or(DEFAULT_MAX_MESSAGE_SIZE_BYTES)
    }
}
