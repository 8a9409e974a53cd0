//! Logging configuration for db-ask.
//!
//! Logs go to stderr so that stdout carries only the JSON response.

use tracing_subscriber::EnvFilter;

/// Default filter when `RUST_LOG` is unset.
fn default_directive(verbose: bool) -> &'static str {
    if verbose {
        "db_ask=debug,info"
    } else {
        "info"
    }
}

/// Initializes logging to stderr.
///
/// `RUST_LOG` takes precedence; otherwise `verbose` adds debug output for
/// this crate on top of the `info` default.
pub fn init_stderr_logging(verbose: bool) {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new(default_directive(verbose))),
        )
        .with_writer(std::io::stderr)
        .init();
}
