//! Error types for the protocol layer.

/// Errors raised while encoding or decoding wire messages.
#[derive(Debug, thiserror::Error)]
pub enum ProtocolError {
    /// Serializing a value into a frame failed.
    #[cfg(feature = "json")]
    #[error("encode failed: {0}")]
    Encode(serde_json::Error),

    /// The frame did not parse into the expected type.
    ///
    /// Malformed JSON, an unknown `type` tag, or a missing field all end
    /// up here.
    #[cfg(feature = "json")]
    #[error("decode failed: {0}")]
    Decode(serde_json::Error),

    /// The message parsed but breaks a protocol rule (wrong first
    /// message, version mismatch, ...).
    #[error("invalid message: {0}")]
    InvalidMessage(String),
}
