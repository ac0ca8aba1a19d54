//! Worker side of the process backend.
//!
//! A worker serves exactly one partition: it reads the job, runs every unit
//! through its own handler registry, replies, and exits. Any binary can act as
//! its own worker by calling [`maybe_serve_stdio`] first thing in `main`.

pub mod protocol;

pub use protocol::WorkerReply;

use std::io::{self, Read, Write};
use std::time::Duration;

use crate::error::{DispatchError, DispatchResult};
use crate::handler::{CancelToken, HandlerRegistry};

/// Command-line flag that switches a binary into worker mode.
pub const WORKER_FLAG: &str = "--simexec-worker";

/// Environment variable set on every spawned worker process.
///
/// A worker that never reaches [`maybe_serve_stdio`] and builds its own
/// executor instead is refused by [`crate::ProcessBackend::current_exe`].
pub const WORKER_ENV: &str = "SIMEXEC_WORKER";

/// Serves one job read from `input`, writing the reply to `output`.
///
/// Handler failures are reported inside the reply; only I/O and protocol
/// failures are returned as errors.
///
/// # Errors
///
/// Returns `DispatchError::Internal` if the job cannot be read or decoded, or
/// the reply cannot be written.
pub fn serve<R: Read, W: Write>(registry: &HandlerRegistry, mut input: R, mut output: W) -> DispatchResult<()> {
    let mut raw = Vec::new();
    input
        .read_to_end(&mut raw)
        .map_err(|e| DispatchError::internal(format!("read job: {e}")))?;
    let job = protocol::decode_job(&raw)?;

    tracing::debug!(
        partition = job.index,
        lo = job.lo,
        units = job.units.len(),
        "Worker running partition"
    );

    let cancel = CancelToken::with_timeout(job.deadline_ms.map(Duration::from_millis));
    let reply = WorkerReply::from_outcome(job.index, registry.run_job(&job, &cancel));
    if let WorkerReply::Failed { position, ref message, .. } = reply {
        tracing::debug!(partition = job.index, position, %message, "Worker partition failed");
    }

    let bytes = protocol::encode_reply(&reply)?;
    output
        .write_all(&bytes)
        .and_then(|()| output.flush())
        .map_err(|e| DispatchError::internal(format!("write reply: {e}")))
}

/// Serves one job over the process's stdin and stdout.
///
/// # Errors
///
/// See [`serve`].
pub fn serve_stdio(registry: &HandlerRegistry) -> DispatchResult<()> {
    serve(registry, io::stdin().lock(), io::stdout().lock())
}

/// Serves one job if the process was launched with [`WORKER_FLAG`].
///
/// Returns `None` when the flag is absent so the caller continues with its
/// normal entry point.
#[must_use]
pub fn maybe_serve_stdio(registry: &HandlerRegistry) -> Option<DispatchResult<()>> {
    if std::env::args().skip(1).any(|arg| arg == WORKER_FLAG) {
        Some(serve_stdio(registry))
    } else {
        None
    }
}
