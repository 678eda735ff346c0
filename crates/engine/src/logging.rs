//! Logging setup
//!
//! Installs a `tracing-subscriber` fmt subscriber. `RUST_LOG` wins when set;
//! otherwise the filter comes from `keel.toml`.

use crate::config::KeelConfig;
use keel_core::{KeelError, KeelResult};
use tracing_subscriber::EnvFilter;

/// Install the global subscriber for `config`
///
/// # Errors
///
/// Returns an error if the configured filter is invalid or a global
/// subscriber is already installed.
pub fn init_logging(config: &KeelConfig) -> KeelResult<()> {
    let filter = match EnvFilter::try_from_default_env() {
        Ok(filter) => filter,
        Err(_) => config.env_filter()?,
    };

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(true)
        .try_init()
        .map_err(|e| KeelError::internal(format!("Failed to install log subscriber: {}", e)))
}
