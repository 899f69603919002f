//! Error types for the data-model layer.

/// Errors that can occur while encoding or decoding profiles.
///
/// Storage backends use a [`Codec`](crate::Codec) to turn a
/// [`PlayerProfile`](crate::PlayerProfile) into bytes and back. When that
/// fails, the backend wraps this error in its own error type.
#[derive(Debug, thiserror::Error)]
pub enum CodecError {
    /// Serialization failed (turning a profile into bytes).
    #[cfg(feature = "json")]
    #[error("encode failed: {0}")]
    Encode(serde_json::Error),

    /// Deserialization failed (turning bytes into a profile).
    ///
    /// Common causes: a stored record written by an incompatible version,
    /// truncated data, or a corrupted user id.
    #[cfg(feature = "json")]
    #[error("decode failed: {0}")]
    Decode(serde_json::Error),
}
