//! Helpers for tests.

use tracing_subscriber::EnvFilter;

/// Initializes logging for a test, capturing output per test.
///
/// Safe to call repeatedly; only the first call installs the subscriber.
pub(crate) fn setup() {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::new("pixcache=trace"))
        .with_target(false)
        .pretty()
        .with_test_writer()
        .try_init()
        .ok();
}

pub(crate) fn tempdir() -> tempfile::TempDir {
    tempfile::tempdir().unwrap()
}
