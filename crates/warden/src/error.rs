//! Unified error type for Warden.

use warden_session::{GatewayError, SessionError};
use warden_types::CodecError;

/// Failures while loading a [`WardenConfig`](crate::WardenConfig).
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("failed to read config file: {0}")]
    Io(#[from] std::io::Error),

    #[error("invalid config: {0}")]
    Parse(#[from] serde_json::Error),
}

/// Top-level error that wraps all crate-specific errors.
///
/// When using the `warden` crate you deal with this single error type
/// instead of importing errors from each sub-crate. The `#[from]`
/// attribute on each variant lets `?` convert sub-crate errors.
#[derive(Debug, thiserror::Error)]
pub enum WardenError {
    /// A session-level error (not registered, refresh mismatch, detached).
    #[error(transparent)]
    Session(#[from] SessionError),

    /// A storage backend error.
    #[error(transparent)]
    Gateway(#[from] GatewayError),

    /// A record could not be encoded or decoded.
    #[error(transparent)]
    Codec(#[from] CodecError),

    /// Configuration could not be loaded.
    #[error(transparent)]
    Config(#[from] ConfigError),
}
