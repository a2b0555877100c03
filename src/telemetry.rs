//! Tracing subscriber setup.

use tracing_subscriber::EnvFilter;

/// Install the global tracing subscriber: env-filter (`RUST_LOG`) over a
/// compact fmt layer.
///
/// Safe to call more than once; later calls are no-ops, which keeps tests
/// that each want logging from fighting over the global.
pub fn init() {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("reviewops=info"));
    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .try_init();
}
