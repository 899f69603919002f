//! Log output for binaries embedding Warden.

use tracing_subscriber::EnvFilter;

/// Installs a `fmt` subscriber as the global default.
///
/// `RUST_LOG` wins over `default_filter` when it is set and valid. If a
/// global subscriber already exists it is kept, so calling this twice
/// (or from tests) is harmless.
pub fn init_logging(default_filter: &str) {
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_filter));
    if tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .try_init()
        .is_err()
    {
        tracing::debug!("global subscriber already installed, keeping it");
    }
}
