//! Structured logging setup.

use tracing_subscriber::EnvFilter;

use crate::config::LoggingConfig;
use crate::error::{BridgeError, Result};

/// Install the global tracing subscriber.
///
/// `RUST_LOG` wins over the configured level when set.
pub fn init_logging(config: &LoggingConfig) -> Result<()> {
    let level = config.log_level.as_str().to_ascii_lowercase();
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(format!("{level},gate_bridge={level}")));

    let builder = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_ansi(config.ansi);

    let result = if config.json_format {
        builder.json().try_init()
    } else {
        builder.try_init()
    };

    result.map_err(|e| BridgeError::ConfigError(format!("Failed to initialise logging: {e}")))?;
    tracing::info!(app = %config.app_name, level = %level, "Logging initialised");
    Ok(())
}
