//! Development-time tracing.
//!
//! Diagnostics go to stderr and are controlled by `RUST_LOG`. They are not
//! the task event stream: sinks in [`crate::io::events`] receive events
//! regardless of the filter.

use tracing_subscriber::{EnvFilter, fmt, layer::SubscriberExt, util::SubscriberInitExt};

/// Initialize tracing with a `warn` default.
///
/// ```bash
/// RUST_LOG=agent=debug agent run "add a health check"
/// ```
pub fn init() {
    init_with_default("warn");
}

/// Initialize tracing, falling back to `directive` when `RUST_LOG` is unset.
pub fn init_with_default(directive: &str) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(directive));

    tracing_subscriber::registry()
        .with(filter)
        .with(fmt::layer().with_writer(std::io::stderr).compact())
        .init();
}
