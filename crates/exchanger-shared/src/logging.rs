//! Tracing bootstrap shared by all three service binaries.

use tracing_subscriber::{fmt, EnvFilter};

use crate::config::LogConfig;

/// Initializes the global `tracing` subscriber. Call once per process.
pub fn init(log: &LogConfig) {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(log.level.clone()));

    let subscriber = fmt().with_env_filter(filter).with_target(true);

    if log.json {
        subscriber.json().init();
    } else {
        subscriber.init();
    }
}
