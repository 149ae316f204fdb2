//! Tracing/logging initialization.

use tracing_subscriber::EnvFilter;

/// Initialize tracing for the process, writing to stderr.
///
/// `RUST_LOG` wins when set; otherwise `info`, or `debug` for relay itself
/// when `verbose`. Safe to call more than once.
pub fn init(verbose: bool) {
    let fallback = if verbose { "info,relay=debug" } else { "info" };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(fallback));

    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(verbose)
        .try_init();
}
