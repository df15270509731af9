//! Logging setup.
//!
//! Structured logging via `tracing`. The embedding application usually
//! installs its own subscriber; this helper exists for binaries and
//! integration tests that want a sensible default.

use tracing_subscriber::{fmt, EnvFilter};

/// Initialize a global subscriber with an env-filter.
///
/// `RUST_LOG` wins over `default_directives`. Calling this twice is a
/// no-op rather than an error.
pub fn init_logging(default_directives: &str) {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(default_directives));

    let _ = fmt()
        .with_env_filter(filter)
        .with_target(true)
        .try_init();
}
