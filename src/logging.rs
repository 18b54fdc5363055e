//! Tracing setup for test binaries

use tracing_subscriber::EnvFilter;

/// Install a `fmt` subscriber that writes through the test harness's
/// captured output. Honors `RUST_LOG`, defaulting to `warn`.
///
/// Safe to call from every test; only the first call installs anything.
pub fn init_test_logging() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn")),
        )
        .with_test_writer()
        .with_target(false)
        .try_init();
}
