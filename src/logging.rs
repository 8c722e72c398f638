//! Tracing initialisation.
//!
//! `RUST_LOG` wins when set; otherwise the configured level applies to the
//! whole process. Output is human-readable by default, JSON on request.

use crate::config::ApplicationConfig;
use crate::error::{AppResult, RigError};
use tracing_subscriber::{fmt, EnvFilter};

/// Builds the filter used by [`init_from_config`].
pub fn env_filter(config: &ApplicationConfig) -> AppResult<EnvFilter> {
    match EnvFilter::try_from_default_env() {
        Ok(filter) => Ok(filter),
        Err(_) => EnvFilter::try_new(&config.log_level).map_err(|err| {
            RigError::Configuration(format!(
                "invalid application.log_level '{}': {err}",
                config.log_level
            ))
        }),
    }
}

/// Installs the global subscriber.
///
/// Fails if the level string is invalid or a subscriber is already installed.
pub fn init_from_config(config: &ApplicationConfig) -> AppResult<()> {
    let filter = env_filter(config)?;
    let builder = fmt().with_env_filter(filter).with_target(true);

    let result = if config.log_format == "json" {
        builder.json().try_init()
    } else {
        builder.try_init()
    };
    result.map_err(|err| RigError::Configuration(format!("failed to initialise tracing: {err}")))
}
