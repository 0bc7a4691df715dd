//! Tracing subscriber setup

use tracing_subscriber::EnvFilter;

use scenesync_core::{SyncError, SyncResult};

use crate::LogConfig;

/// Install the global `tracing` subscriber.
///
/// `RUST_LOG` takes precedence over `config.level`. Fails if a global
/// subscriber is already installed.
pub fn init_logging(config: &LogConfig) -> SyncResult<()> {
    let filter = build_filter(config)?;
    let builder = tracing_subscriber::fmt().with_env_filter(filter);

    let installed = if config.json {
        builder.json().with_current_span(false).try_init()
    } else {
        builder.with_target(true).try_init()
    };

    installed.map_err(|e| SyncError::InvalidConfig(format!("logging: {e}")))
}

fn build_filter(config: &LogConfig) -> SyncResult<EnvFilter> {
    if let Ok(filter) = EnvFilter::try_from_default_env() {
        return Ok(filter);
    }
    EnvFilter::try_new(&config.level)
        .map_err(|e| SyncError::InvalidConfig(format!("log level {:?}: {e}", config.level)))
}
