/// Wire protocol for peer-to-peer message exchange
use crate::error::{Result, StarError};
use base64::{engine::general_purpose, Engine as _};
use bytes::Bytes;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Payload classification carried in every envelope
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum MessageKind {
    Text,
    Image,
}

impl fmt::Display for MessageKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            MessageKind::Text => write!(f, "text"),
            MessageKind::Image => write!(f, "image"),
        }
    }
}

/// The unit exchanged between connected peers.
///
/// On the wire this is JSON with exactly three fields:
/// `{"type":"text"|"image","content":...,"timestamp":<epoch millis>}`.
/// For `Image` the content is base64 of the compressed image bytes.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Envelope {
    #[serde(rename = "type")]
    pub kind: MessageKind,
    pub content: String,
    pub timestamp: i64,
}

impl Envelope {
    /// Build a text envelope stamped with the current time
    pub fn text(content: impl Into<String>) -> Self {
        Self {
            kind: MessageKind::Text,
            content: content.into(),
            timestamp: now_millis(),
        }
    }

    /// Build an image envelope from already-compressed image bytes
    pub fn image(compressed: &[u8]) -> Self {
        Self {
            kind: MessageKind::Image,
            content: general_purpose::STANDARD.encode(compressed),
            timestamp: now_millis(),
        }
    }

    /// Override the send-time stamp (replays, tests)
    pub fn with_timestamp(mut self, timestamp: i64) -> Self {
        self.timestamp = timestamp;
        self
    }

    /// Serialize to JSON bytes
    pub fn to_bytes(&self) -> Result<Bytes> {
        serde_json::to_vec(self)
            .map(Bytes::from)
            .map_err(|e| StarError::Encoding(e.to_string()))
    }

    /// Parse an inbound payload. Unknown extra fields are ignored for
    /// forward compatibility; a missing field or unrecognized `type` is a
    /// decoding error.
    pub fn from_bytes(data: &[u8]) -> Result<Self> {
        serde_json::from_slice(data).map_err(|e| StarError::Decoding(e.to_string()))
    }

    /// Decode image content back to the compressed image bytes
    pub fn image_bytes(&self) -> Result<Vec<u8>> {
        general_purpose::STANDARD
            .decode(&self.content)
            .map_err(|e| StarError::Decoding(format!("Invalid base64 content: {}", e)))
    }
}

fn now_millis() -> i64 {
    chrono::Utc::now().timestamp_millis()
}
