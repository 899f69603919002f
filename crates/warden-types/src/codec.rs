//! Codec trait and implementations for persisting profiles as bytes.
//!
//! Storage backends don't care HOW a profile is serialized; they only
//! need something that implements [`Codec`]. [`JsonCodec`] is the default:
//! stored records stay human-readable, which helps when inspecting a
//! backend by hand.
//!
//! Only the *values* of tracked aggregates are encoded. Lifecycle tags and
//! revisions are in-memory bookkeeping, so a decoded profile always comes
//! back with every tag set to [`Lifecycle::Unchanged`](crate::Lifecycle).

use serde::{de::DeserializeOwned, Serialize};

use crate::CodecError;

/// A codec that can encode Rust types to bytes and decode bytes back.
///
/// - `Send + Sync` → backends share one codec across worker threads.
/// - `'static` → the codec owns everything it needs.
pub trait Codec: Send + Sync + 'static {
    /// Serializes a value into bytes.
    ///
    /// # Errors
    /// Returns `CodecError::Encode` if serialization fails.
    fn encode<T: Serialize>(&self, value: &T) -> Result<Vec<u8>, CodecError>;

    /// Deserializes bytes back into a value.
    ///
    /// # Errors
    /// Returns `CodecError::Decode` if the bytes are malformed or don't
    /// match the expected type.
    fn decode<T: DeserializeOwned>(&self, data: &[u8]) -> Result<T, CodecError>;
}

// ---------------------------------------------------------------------------
// JsonCodec
// ---------------------------------------------------------------------------

/// A [`Codec`] that uses JSON (via `serde_json`).
///
/// This is behind the `json` feature flag (enabled by default).
///
/// ## Example
///
/// ```rust
/// use warden_types::{Codec, JsonCodec, Lifecycle, PlayerProfile, UserId};
///
/// let codec = JsonCodec;
/// let profile = PlayerProfile::blank(UserId::from_u128(7), "Steve");
///
/// let bytes = codec.encode(&profile).unwrap();
/// let decoded: PlayerProfile = codec.decode(&bytes).unwrap();
///
/// assert_eq!(decoded.last_name(), "Steve");
/// // Freshly loaded records carry no dirty state.
/// assert_eq!(decoded.lifecycle(), Lifecycle::Unchanged);
/// ```
#[cfg(feature = "json")]
#[derive(Debug, Clone, Copy, Default)]
pub struct JsonCodec;

#[cfg(feature = "json")]
impl Codec for JsonCodec {
    fn encode<T: Serialize>(&self, value: &T) -> Result<Vec<u8>, CodecError> {
        serde_json::to_vec(value).map_err(CodecError::Encode)
    }

    fn decode<T: DeserializeOwned>(&self, data: &[u8]) -> Result<T, CodecError> {
        serde_json::from_slice(data).map_err(CodecError::Decode)
    }
}
