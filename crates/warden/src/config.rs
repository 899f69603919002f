//! Top-level configuration.

use std::path::Path;

use serde::{Deserialize, Serialize};
use warden_session::SessionConfig;

use crate::ConfigError;

/// Everything a host needs to start Warden.
///
/// Every field has a default, so a config file only lists what it
/// changes:
///
/// ```rust
/// use warden::WardenConfig;
///
/// let config = WardenConfig::from_json_str(r#"{ "session": { "worker_slots": 4 } }"#).unwrap();
/// assert_eq!(config.session.worker_slots, 4);
/// assert_eq!(config.session.command_buffer, 64);
/// assert_eq!(config.log_filter, "info");
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct WardenConfig {
    pub session: SessionConfig,

    /// `tracing` filter used when `RUST_LOG` is not set.
    ///
    /// Default: `"info"`.
    pub log_filter: String,
}

impl Default for WardenConfig {
    fn default() -> Self {
        Self {
            session: SessionConfig::default(),
            log_filter: "info".to_string(),
        }
    }
}

impl WardenConfig {
    /// Parses a JSON config.
    ///
    /// # Errors
    /// [`ConfigError::Parse`] on malformed JSON or mistyped fields.
    pub fn from_json_str(json: &str) -> Result<Self, ConfigError> {
        Ok(serde_json::from_str(json)?)
    }

    /// Reads and parses a JSON config file.
    pub fn load(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let json = std::fs::read_to_string(path)?;
        Self::from_json_str(&json)
    }

    /// Fixes out-of-range values so the config is safe to use.
    pub fn validated(mut self) -> Self {
        self.session = self.session.validated();
        if self.log_filter.trim().is_empty() {
            tracing::warn!("empty log_filter, using \"info\"");
            self.log_filter = "info".to_string();
        }
        self
    }
}
