//! Error types for the protocol layer.
//!
//! A `ProtocolError` always means the problem is in turning payloads into
//! bytes or back, never in the relay or in room management.

/// Errors that can occur in the protocol layer.
#[derive(Debug, thiserror::Error)]
pub enum ProtocolError {
    /// Serializing a payload failed.
    #[cfg(feature = "json")]
    #[error("encode failed: {0}")]
    Encode(serde_json::Error),

    /// The bytes are not a valid payload for their event code.
    ///
    /// Common causes: malformed JSON, missing fields, or a payload that
    /// belongs to a different code.
    #[cfg(feature = "json")]
    #[error("decode failed: {0}")]
    Decode(serde_json::Error),

    /// The numeric code is not in the event table.
    #[error("unknown event code {0}")]
    UnknownCode(u8),
}
