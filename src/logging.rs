//! Diagnostic logging setup.
//!
//! Library code only emits `tracing` events; binaries call [`init_logging`]
//! once to route them to stderr so stdout stays free for chat output.

use tracing_subscriber::EnvFilter;

use crate::config::DEFAULT_LOG_FILTER;

/// Installs the global fmt subscriber. Returns `false` when a subscriber was
/// already installed, in which case nothing changes.
///
/// Invalid filter directives fall back to [`DEFAULT_LOG_FILTER`].
pub fn init_logging(filter: &str) -> bool {
    tracing_subscriber::fmt()
        .with_env_filter(build_filter(filter))
        .with_writer(std::io::stderr)
        .with_target(true)
        .try_init()
        .is_ok()
}

fn build_filter(filter: &str) -> EnvFilter {
    EnvFilter::try_new(filter)
        .or_else(|_| EnvFilter::try_new(DEFAULT_LOG_FILTER))
        .unwrap_or_else(|_| EnvFilter::new(DEFAULT_LOG_FILTER))
}
