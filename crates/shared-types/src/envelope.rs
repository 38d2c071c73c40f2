//! # Multiplex Envelope
//!
//! The only unit that travels over a relay connection. Many named channels
//! share one WebSocket; each frame carries exactly one JSON envelope:
//!
//! ```text
//! {"from": "<uuid>", "channel": "<name>", "message": "<payload>"}
//! ```
//!
//! `from` identifies the posting channel handle. It exists only so that a
//! message is never delivered back to its sender; it is not an identity.

use crate::errors::DecodeError;
use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

/// Random identifier of one channel handle.
///
/// Generated as a v4 UUID locally, but any string from the wire is accepted.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct InstanceId(String);

impl InstanceId {
    /// Fresh random id.
    #[must_use]
    pub fn new() -> Self {
        Self(Uuid::new_v4().to_string())
    }

    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl Default for InstanceId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for InstanceId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for InstanceId {
    fn from(value: &str) -> Self {
        Self(value.to_string())
    }
}

/// One message on one named channel.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Envelope {
    /// Handle that posted the message.
    pub from: InstanceId,
    /// Channel name the message was posted to.
    pub channel: String,
    /// Payload, opaque to the relay.
    pub message: String,
}

impl Envelope {
    #[must_use]
    pub fn new(from: InstanceId, channel: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            from,
            channel: channel.into(),
            message: message.into(),
        }
    }

    /// Whether this envelope was posted by the handle `id`.
    #[must_use]
    pub fn is_from(&self, id: &InstanceId) -> bool {
        &self.from == id
    }

    /// Serialize to the JSON wire form.
    #[must_use]
    pub fn encode(&self) -> String {
        // Three string fields cannot fail to serialize.
        serde_json::to_string(self).unwrap_or_default()
    }

    /// Parse a text frame.
    ///
    /// Unknown extra fields are ignored. Missing or non-string `from`,
    /// `channel` or `message` is a `DecodeError::Malformed`.
    ///
    /// # Errors
    ///
    /// - `DecodeError::TooLarge` - frame longer than `max_bytes`
    /// - `DecodeError::Malformed` - not an envelope
    pub fn decode(frame: &str, max_bytes: usize) -> Result<Self, DecodeError> {
        if frame.len() > max_bytes {
            return Err(DecodeError::TooLarge {
                size: frame.len(),
                max: max_bytes,
            });
        }
        serde_json::from_str(frame).map_err(|e| DecodeError::Malformed(e.to_string()))
    }

    /// Parse a binary frame, accepting it only if it is UTF-8 text.
    pub fn decode_bytes(frame: &[u8], max_bytes: usize) -> Result<Self, DecodeError> {
        let text = std::str::from_utf8(frame).map_err(|_| DecodeError::NotUtf8)?;
        Self::decode(text, max_bytes)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const MAX: usize = 1024;

    #[test]
    fn test_wire_shape() {
        let envelope = Envelope::new(InstanceId::from("abc"), "chat", "hello from 0");
        let value: serde_json::Value = serde_json::from_str(&envelope.encode()).unwrap();
        assert_eq!(
            value,
            serde_json::json!({"from": "abc", "channel": "chat", "message": "hello from 0"})
        );
    }

    #[test]
    fn test_decode_accepts_extra_fields() {
        let frame = r#"{"from":"x","channel":"c","message":"m","extra":1}"#;
        let envelope = Envelope::decode(frame, MAX).unwrap();
        assert_eq!(envelope.channel, "c");
        assert_eq!(envelope.message, "m");
    }

    #[test]
    fn test_decode_rejects_missing_and_mistyped_fields() {
        for frame in [
            r#"{"channel":"c","message":"m"}"#,
            r#"{"from":"x","message":"m"}"#,
            r#"{"from":"x","channel":"c","message":42}"#,
            r#"["x","c","m"]"#,
            "null",
            "Hello from 1234.",
        ] {
            assert!(
                matches!(Envelope::decode(frame, MAX), Err(DecodeError::Malformed(_))),
                "accepted {frame}"
            );
        }
    }

    #[test]
    fn test_decode_size_limit() {
        let envelope = Envelope::new(InstanceId::new(), "c", "x".repeat(MAX));
        let result = Envelope::decode(&envelope.encode(), MAX);
        assert!(matches!(result, Err(DecodeError::TooLarge { max: MAX, .. })));
    }

    #[test]
    fn test_decode_bytes() {
        let envelope = Envelope::new(InstanceId::new(), "c", "m");
        let decoded = Envelope::decode_bytes(envelope.encode().as_bytes(), MAX).unwrap();
        assert_eq!(decoded, envelope);
        assert_eq!(
            Envelope::decode_bytes(&[0xff, 0xfe], MAX),
            Err(DecodeError::NotUtf8)
        );
    }

    #[test]
    fn test_is_from() {
        let me = InstanceId::new();
        let other = InstanceId::new();
        let envelope = Envelope::new(me.clone(), "c", "m");
        assert!(envelope.is_from(&me));
        assert!(!envelope.is_from(&other));
        assert_ne!(me, other);
    }
}
