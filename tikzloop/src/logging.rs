//! Diagnostic tracing for debugging sessions.
//!
//! Tracing goes to stderr and is controlled by `RUST_LOG`. The transcript of
//! instructions, code and critiques (`io::transcript`) goes to stdout and is
//! always printed.

use tracing_subscriber::{EnvFilter, fmt, layer::SubscriberExt, util::SubscriberInitExt};

/// Initialize the tracing subscriber.
///
/// Reads `RUST_LOG`, defaulting to `warn` so refusals, retries and compile
/// failures are visible. Output: stderr, compact format.
///
/// # Example
/// ```bash
/// RUST_LOG=tikzloop=debug tikzloop sketch.png --hint "a cache hierarchy"
/// ```
pub fn init() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn"));

    tracing_subscriber::registry()
        .with(filter)
        .with(fmt::layer().with_writer(std::io::stderr).compact())
        .init();
}
