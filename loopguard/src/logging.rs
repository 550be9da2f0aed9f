//! Diagnostic tracing for loopguard.
//!
//! - **Tracing (this module)**: diagnostics via `RUST_LOG`, written to stderr.
//!   Never part of the command's product output.
//! - **Run artifacts**: agent logs under `.loop/runs/<run-ref>/`, always written,
//!   unaffected by `RUST_LOG`.

use tracing_subscriber::{EnvFilter, fmt, layer::SubscriberExt, util::SubscriberInitExt};

/// Initialize the tracing subscriber.
///
/// Reads `RUST_LOG`, defaulting to `warn`. `--verbose` on the guard command
/// relies on `warn` being visible by default.
///
/// # Example
/// ```bash
/// RUST_LOG=loopguard=debug loopguard run --run-ref ci-42
/// ```
pub fn init() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn"));

    tracing_subscriber::registry()
        .with(filter)
        .with(fmt::layer().with_writer(std::io::stderr).compact())
        .init();
}
