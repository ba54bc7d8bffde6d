//! Development-time tracing for debugging pipeline runs.
//!
//! Tracing goes to stderr and is controlled by `RUST_LOG`. Run results live in
//! the artifact directory (`run.json` and per-stage files) and are unaffected
//! by the log level.

use tracing_subscriber::{EnvFilter, fmt, layer::SubscriberExt, util::SubscriberInitExt};

/// Initialize the tracing subscriber.
///
/// Reads `RUST_LOG`, defaulting to `warn`. Output: stderr, compact format.
///
/// # Example
/// ```bash
/// RUST_LOG=opsflow=info opsflow run --catalog catalog.csv --orders orders.csv
/// ```
pub fn init() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn"));

    // A second init (e.g. from tests) keeps the first subscriber.
    let _ = tracing_subscriber::registry()
        .with(filter)
        .with(fmt::layer().with_writer(std::io::stderr).compact())
        .try_init();
}
