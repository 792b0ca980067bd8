//! Codec trait and implementations.
//!
//! A codec maps Rust values to transport [`Frame`]s and back. The handler
//! only talks to the [`Codec`] trait, so a binary codec can replace
//! [`JsonCodec`] without touching connection or room code.

use serde::{de::DeserializeOwned, Serialize};
use skirmish_transport::Frame;

use crate::ProtocolError;

/// Encodes values into frames and decodes frames into values.
///
/// `Send + Sync + 'static` because one codec instance is shared by every
/// connection task for the lifetime of the server.
pub trait Codec: Send + Sync + 'static {
    /// Serializes a value into a frame ready for the transport.
    ///
    /// # Errors
    /// Returns [`ProtocolError::Encode`] if the value can't be represented.
    fn encode<T: Serialize>(&self, value: &T) -> Result<Frame, ProtocolError>;

    /// Deserializes a frame received from the transport.
    ///
    /// # Errors
    /// Returns [`ProtocolError::Decode`] for malformed or mismatched input.
    fn decode<T: DeserializeOwned>(
        &self,
        frame: &Frame,
    ) -> Result<T, ProtocolError>;
}

// ---------------------------------------------------------------------------
// JsonCodec
// ---------------------------------------------------------------------------

/// A [`Codec`] that speaks JSON over text frames.
///
/// Browser clients read text frames directly, and the payloads stay
/// readable in DevTools. Binary frames are still accepted on decode since
/// some client libraries send everything as binary.
///
/// ```rust
/// use skirmish_protocol::{Codec, Envelope, JsonCodec, Payload, SystemMessage};
///
/// let codec = JsonCodec;
/// let envelope: Envelope<Payload<()>> = Envelope {
///     seq: 1,
///     timestamp: 5000,
///     payload: Payload::System(SystemMessage::Heartbeat { client_time: 5000 }),
/// };
///
/// let frame = codec.encode(&envelope).unwrap();
/// let decoded: Envelope<Payload<()>> = codec.decode(&frame).unwrap();
/// assert_eq!(envelope, decoded);
/// ```
#[cfg(feature = "json")]
#[derive(Debug, Clone, Copy, Default)]
pub struct JsonCodec;

#[cfg(feature = "json")]
impl Codec for JsonCodec {
    fn encode<T: Serialize>(&self, value: &T) -> Result<Frame, ProtocolError> {
        serde_json::to_string(value)
            .map(Frame::Text)
            .map_err(ProtocolError::Encode)
    }

    fn decode<T: DeserializeOwned>(
        &self,
        frame: &Frame,
    ) -> Result<T, ProtocolError> {
        match frame {
            Frame::Text(text) => serde_json::from_str(text),
            Frame::Binary(bytes) => serde_json::from_slice(bytes),
        }
        .map_err(ProtocolError::Decode)
    }
}
