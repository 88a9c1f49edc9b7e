//! Bootstrap utilities for the rtsync binary.

use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use crate::config::LOG_ENV_VAR;

/// Initialize tracing with the RTSYNC_LOG environment variable.
///
/// Defaults to "info" level if RTSYNC_LOG is not set. Logs go to stderr so
/// participant output on stdout stays clean.
pub fn init_tracing() {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_env(LOG_ENV_VAR)
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();
}

/// First positional argument, used as the configuration file path.
pub fn config_path_arg() -> Option<String> {
    std::env::args().nth(1)
}
