//! Codec trait and implementations for payload bytes.
//!
//! The relay only moves opaque byte buffers. A codec decides how a payload
//! struct becomes those bytes. [`JsonCodec`] keeps the payloads readable
//! from the browser client and in relay dashboards; a binary codec can be
//! swapped in later without touching the router or the dispatcher, which
//! are generic over [`Codec`].

use serde::{Serialize, de::DeserializeOwned};

use crate::ProtocolError;

/// Encodes payloads to bytes and decodes them back.
///
/// `Clone` is required because the router hands a copy of the codec to
/// each of its per-code handlers.
pub trait Codec: Clone + Send + Sync + 'static {
    /// Serializes a value into bytes.
    ///
    /// # Errors
    /// Returns `ProtocolError::Encode` if serialization fails.
    fn encode<T: Serialize>(&self, value: &T) -> Result<Vec<u8>, ProtocolError>;

    /// Deserializes bytes back into a value.
    ///
    /// # Errors
    /// Returns `ProtocolError::Decode` if the bytes are malformed or don't
    /// match the expected payload shape.
    fn decode<T: DeserializeOwned>(&self, data: &[u8]) -> Result<T, ProtocolError>;
}

// ---------------------------------------------------------------------------
// JsonCodec
// ---------------------------------------------------------------------------

/// A [`Codec`] backed by `serde_json`.
///
/// ```rust
/// use hostlink_protocol::{Codec, JsonCodec, ReloadRequest};
///
/// let codec = JsonCodec;
/// let bytes = codec
///     .encode(&ReloadRequest { weapon_id: "Pistol".into() })
///     .unwrap();
/// assert_eq!(bytes, br#"{"weaponId":"Pistol"}"#);
///
/// let decoded: ReloadRequest = codec.decode(&bytes).unwrap();
/// assert_eq!(decoded.weapon_id, "Pistol");
/// ```
#[cfg(feature = "json")]
#[derive(Debug, Clone, Copy, Default)]
pub struct JsonCodec;

#[cfg(feature = "json")]
impl Codec for JsonCodec {
    fn encode<T: Serialize>(&self, value: &T) -> Result<Vec<u8>, ProtocolError> {
        serde_json::to_vec(value).map_err(ProtocolError::Encode)
    }

    fn decode<T: DeserializeOwned>(&self, data: &[u8]) -> Result<T, ProtocolError> {
        serde_json::from_slice(data).map_err(ProtocolError::Decode)
    }
}
