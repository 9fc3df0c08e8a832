//! Logging bootstrap

use crate::error::{ForecastError, Result};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

/// Install a fmt subscriber filtered at `level`; `RUST_LOG` takes precedence.
///
/// Returns `Ok(false)` when a global subscriber is already installed.
pub fn init_logging(level: &str) -> Result<bool> {
    let env_filter = match EnvFilter::try_from_default_env() {
        Ok(filter) => filter,
        Err(_) => EnvFilter::try_new(level)
            .map_err(|e| ForecastError::ConfigError(format!("Invalid log level {:?}: {}", level, e)))?,
    };

    let installed = tracing_subscriber::registry()
        .with(env_filter)
        .with(tracing_subscriber::fmt::layer().with_target(true))
        .try_init()
        .is_ok();

    if installed {
        tracing::debug!(level, "Logging initialised");
    }
    Ok(installed)
}
