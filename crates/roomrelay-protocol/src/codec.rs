//! Codec trait and implementations for serializing/deserializing messages.
//!
//! A codec converts between serde types and raw bytes. Callers hold a
//! [`Codec`] rather than a concrete format so the document encoding can be
//! swapped without touching the registry.
//!
//! Relay traffic itself uses the fixed-width binary layout in
//! [`crate::PacketWriter`]; the codec is for the structured documents that
//! ride inside it or beside it: the room list carried by a `RoomList`
//! event and the stats snapshot.

use serde::{de::DeserializeOwned, Serialize};

use crate::ProtocolError;

/// A codec that can encode Rust types to bytes and decode bytes back.
///
/// `Send + Sync + 'static` so a codec can live inside the shared registry.
pub trait Codec: Send + Sync + 'static {
    /// Serializes a value into bytes.
    ///
    /// # Errors
    /// Returns `ProtocolError::Encode` if serialization fails
    /// (e.g., the type contains values that can't be represented
    /// in this format).
    fn encode<T: Serialize>(
        &self,
        value: &T,
    ) -> Result<Vec<u8>, ProtocolError>;

    /// Deserializes bytes back into a value.
    ///
    /// # Errors
    /// Returns `ProtocolError::Decode` if the bytes are malformed,
    /// incomplete, or don't match the expected type.
    fn decode<T: DeserializeOwned>(
        &self,
        data: &[u8],
    ) -> Result<T, ProtocolError>;
}

// ---------------------------------------------------------------------------
// JsonCodec
// ---------------------------------------------------------------------------

/// A [`Codec`] that uses JSON (via `serde_json`).
///
/// Room lists and stats are read by browser clients and dashboards, so
/// they stay JSON. Behind the `json` feature flag (enabled by default).
///
/// ## Example
///
/// ```rust
/// use roomrelay_protocol::{Codec, JsonCodec, RoomList, RoomListing};
///
/// let codec = JsonCodec;
/// let list = RoomList {
///     list: vec![RoomListing {
///         id: "lobby1".into(),
///         has_password: false,
///         player_count: 1,
///         max_players: 4,
///     }],
/// };
///
/// let bytes = codec.encode(&list).unwrap();
/// let decoded: RoomList = codec.decode(&bytes).unwrap();
/// assert_eq!(list, decoded);
/// ```
#[cfg(feature = "json")]
#[derive(Debug, Clone, Copy, Default)]
pub struct JsonCodec;

#[cfg(feature = "json")]
impl Codec for JsonCodec {
    fn encode<T: Serialize>(
        &self,
        value: &T,
    ) -> Result<Vec<u8>, ProtocolError> {
        serde_json::to_vec(value).map_err(ProtocolError::Encode)
    }

    fn decode<T: DeserializeOwned>(
        &self,
        data: &[u8],
    ) -> Result<T, ProtocolError> {
        serde_json::from_slice(data).map_err(ProtocolError::Decode)
    }
}
