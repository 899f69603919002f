//! Session coordinator configuration.

use serde::{Deserialize, Serialize};

/// Tuning for the coordinator and its worker pool.
///
/// Sensible defaults are provided; override only what you need:
///
/// ```rust
/// use warden_session::SessionConfig;
///
/// let config = SessionConfig {
///     worker_slots: 4,
///     ..SessionConfig::default()
/// };
/// assert_eq!(config.command_buffer, 64);
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SessionConfig {
    /// Capacity of the coordinator's command channel. When it fills up,
    /// callers of [`CoordinatorHandle`](crate::CoordinatorHandle) wait.
    ///
    /// Default: 64. Must be at least 1.
    pub command_buffer: usize,

    /// How many worker jobs may run at once. 0 means no limit beyond the
    /// runtime's own blocking pool.
    ///
    /// Default: 0.
    pub worker_slots: usize,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            command_buffer: 64,
            worker_slots: 0,
        }
    }
}

impl SessionConfig {
    /// Fixes out-of-range values so the config is safe to use.
    ///
    /// Called by [`spawn_coordinator`](crate::spawn_coordinator).
    pub fn validated(mut self) -> Self {
        if self.command_buffer == 0 {
            tracing::warn!("command_buffer must be at least 1, using 1");
            self.command_buffer = 1;
        }
        self
    }
}
