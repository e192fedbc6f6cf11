//! Tracing subscriber setup.

use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::EnvFilter;

use crate::config::LoggingConfig;
use crate::{Error, Result};

/// Install the global tracing subscriber.
///
/// Logs go to stderr so command output on stdout stays clean. `RUST_LOG`
/// wins over the configured filter. Fails if a global subscriber
/// is already installed.
pub fn configure_tracing(logging: &LoggingConfig) -> Result<()> {
    let env_filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(&logging.filter))
        .map_err(|e| Error::internal(format!("Invalid log filter '{}': {}", logging.filter, e)))?;

    let registry = tracing_subscriber::registry().with(env_filter);

    let result = if logging.json {
        registry
            .with(
                tracing_subscriber::fmt::layer()
                    .json()
                    .with_target(true)
                    .with_writer(std::io::stderr),
            )
            .try_init()
    } else {
        registry
            .with(
                tracing_subscriber::fmt::layer()
                    .with_target(false)
                    .with_writer(std::io::stderr),
            )
            .try_init()
    };

    result.map_err(|e| Error::internal(format!("Failed to install tracing subscriber: {}", e)))
}
