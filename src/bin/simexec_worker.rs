//! simexec worker
//!
//! Serves one partition job on stdin/stdout using the built-in handlers.
//! Logs go to stderr and are filtered with `RUST_LOG`.

use std::process::ExitCode;

use tracing_subscriber::EnvFilter;

use simexec::{reference, worker};

fn main() -> ExitCode {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn")))
        .with_writer(std::io::stderr)
        .with_target(false)
        .init();

    let registry = reference::registry();
    match worker::serve_stdio(&registry) {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            tracing::error!(error = %e, "Worker failed");
            ExitCode::FAILURE
        }
    }
}
