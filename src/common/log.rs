//! Logging setup emitting JSON lines on stderr.
//!
//! Events carry an `ev` field naming what happened, plus `code` and `dur_ms`
//! where they apply. Stdout stays free for command output.
//!
//! TODO: Fall back to the compact text formatter when stderr is a terminal.

use tracing_subscriber::EnvFilter;

/// Install the global subscriber. Later calls are no-ops.
pub fn init(filter: &str) {
    let filter = EnvFilter::try_new(filter).unwrap_or_else(|_| EnvFilter::new("info"));
    let _ = tracing_subscriber::fmt()
        .json()
        .with_current_span(false)
        .with_target(true)
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .try_init();
}
