//! Structured logging setup.

use tracing_subscriber::util::{SubscriberInitExt, TryInitError};
use tracing_subscriber::{layer::SubscriberExt, EnvFilter};

use crate::config::ObservabilityConfig;

/// Build the default filter directive for `log_level`.
pub fn default_directive(log_level: &str) -> String {
    format!("connpool={},tower_http={}", log_level, log_level)
}

/// Install the global tracing subscriber.
///
/// `RUST_LOG` wins over the configured level when set.
pub fn init_logging(config: &ObservabilityConfig) -> Result<(), TryInitError> {
    tracing_subscriber::registry()
        .with(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new(default_directive(&config.log_level))),
        )
        .with(tracing_subscriber::fmt::layer())
        .try_init()
}
