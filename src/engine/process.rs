//! One OS process per partition.
//!
//! The job is piped to the worker's stdin as JSON and the reply is read from
//! its stdout; stderr is inherited so worker logs reach the parent's terminal.

use std::ffi::OsStr;
use std::io::{Read, Write};
use std::path::{Path, PathBuf};
use std::process::{Child, Command, Stdio};
use std::thread;

use crossbeam_channel::Sender;

use crate::error::{DispatchError, DispatchResult, ExecutionError};
use crate::partition::PartitionJob;
use crate::worker::{protocol, WORKER_ENV, WORKER_FLAG};

use super::backend::{PartitionBackend, PartitionOutcome, RunningPartition};

/// Launches a worker program per partition.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProcessBackend {
    program: PathBuf,
    args: Vec<String>,
}

impl ProcessBackend {
    /// Uses `program` as the worker, launched without arguments.
    #[must_use]
    pub fn new(program: impl Into<PathBuf>) -> Self {
        Self {
            program: program.into(),
            args: Vec::new(),
        }
    }

    /// Re-executes the current binary in worker mode.
    ///
    /// The binary must call [`crate::worker::maybe_serve_stdio`] on startup.
    ///
    /// # Errors
    ///
    /// Returns `DispatchError::InvalidConfig` if the current executable cannot
    /// be located, or if this process is itself a spawned worker.
    pub fn current_exe() -> DispatchResult<Self> {
        refuse_inside_worker(std::env::var_os(WORKER_ENV).as_deref())?;
        let program = std::env::current_exe()
            .map_err(|e| DispatchError::invalid_config(format!("locate current executable: {e}")))?;
        Ok(Self::new(program).arg(WORKER_FLAG))
    }

    /// Appends an argument passed to every worker.
    #[must_use]
    pub fn arg(mut self, arg: impl Into<String>) -> Self {
        self.args.push(arg.into());
        self
    }

    /// The worker program.
    #[must_use]
    pub fn program(&self) -> &Path {
        &self.program
    }

    fn spawn_error(&self, message: impl Into<String>) -> ExecutionError {
        ExecutionError::Spawn {
            program: self.program.display().to_string(),
            message: message.into(),
        }
    }
}

// A worker that re-executes itself would otherwise spawn workers forever.
fn refuse_inside_worker(marker: Option<&OsStr>) -> DispatchResult<()> {
    match marker {
        Some(_) => Err(DispatchError::invalid_config(format!(
            "{WORKER_ENV} is set: this process is a simexec worker and must call \
             worker::maybe_serve_stdio before building an executor"
        ))),
        None => Ok(()),
    }
}

struct ChildPartition {
    index: usize,
    child: Child,
    finished: bool,
}

impl ChildPartition {
    fn kill(&mut self) {
        if self.finished {
            return;
        }
        let _ = self.child.kill();
        let _ = self.child.wait();
        self.finished = true;
    }
}

impl RunningPartition for ChildPartition {
    fn abort(&mut self) {
        tracing::debug!(partition = self.index, pid = self.child.id(), "Killing worker");
        self.kill();
    }

    fn reap(&mut self) {
        if self.finished {
            return;
        }
        match self.child.wait() {
            Ok(status) if !status.success() => {
                tracing::warn!(partition = self.index, %status, "Worker exited abnormally");
            }
            Ok(_) => {}
            Err(e) => {
                tracing::warn!(partition = self.index, error = %e, "Failed to wait for worker");
            }
        }
        self.finished = true;
    }
}

impl Drop for ChildPartition {
    fn drop(&mut self) {
        self.kill();
    }
}

impl PartitionBackend for ProcessBackend {
    fn label(&self) -> &'static str {
        "processes"
    }

    fn launch(
        &self,
        job: PartitionJob,
        done: Sender<PartitionOutcome>,
    ) -> Result<Box<dyn RunningPartition>, ExecutionError> {
        let index = job.index;
        let lo = job.lo;
        let first_handler = job.units.first().map(|u| u.handler.to_string()).unwrap_or_default();
        let payload = protocol::encode_job(&job)?;

        let mut child = Command::new(&self.program)
            .args(&self.args)
            .env(WORKER_ENV, "1")
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::inherit())
            .spawn()
            .map_err(|e| self.spawn_error(e.to_string()))?;

        tracing::debug!(partition = index, pid = child.id(), units = job.units.len(), "Spawned worker");

        let stdin = child.stdin.take();
        let stdout = child.stdout.take();
        let mut running = ChildPartition {
            index,
            child,
            finished: false,
        };
        let (Some(mut stdin), Some(mut stdout)) = (stdin, stdout) else {
            running.kill();
            return Err(self.spawn_error("worker pipes were not captured"));
        };

        // Feed on a separate thread so a worker that writes before it has
        // read everything cannot deadlock against us.
        thread::Builder::new()
            .name(format!("simexec-feed-{index}"))
            .spawn(move || {
                if let Err(e) = stdin.write_all(&payload) {
                    tracing::debug!(partition = index, error = %e, "Worker closed stdin early");
                }
            })
            .map_err(|e| {
                running.kill();
                self.spawn_error(e.to_string())
            })?;

        thread::Builder::new()
            .name(format!("simexec-collect-{index}"))
            .spawn(move || {
                let mut raw = Vec::new();
                let result = match stdout.read_to_end(&mut raw) {
                    Ok(_) if raw.iter().all(u8::is_ascii_whitespace) => Err(ExecutionError::WorkerFailure {
                        partition: index,
                        position: lo,
                        handler: first_handler,
                        message: "worker exited without a reply".to_string(),
                    }),
                    Ok(_) => protocol::decode_reply(index, &raw).and_then(protocol::WorkerReply::into_result),
                    Err(e) => {
                        tracing::warn!(partition = index, error = %e, "Lost worker output");
                        Err(ExecutionError::Disconnected { partition: index })
                    }
                };
                let _ = done.send(PartitionOutcome { index, result });
            })
            .map_err(|e| {
                running.kill();
                self.spawn_error(e.to_string())
            })?;

        Ok(Box::new(running))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    use crossbeam_channel::bounded;

    use crate::batch::WorkUnit;

    fn job() -> PartitionJob {
        PartitionJob {
            index: 0,
            lo: 0,
            configured_n: 1,
            deadline_ms: None,
            units: vec![WorkUnit::new("counter")],
        }
    }

    #[test]
    fn current_exe_passes_worker_flag() {
        let backend = ProcessBackend::current_exe().unwrap();
        assert_eq!(backend.args, vec![WORKER_FLAG.to_string()]);
    }

    #[test]
    fn missing_program_is_a_spawn_error() {
        let backend = ProcessBackend::new("/nonexistent/simexec-worker");
        let (tx, _rx) = bounded(1);
        let Err(err) = backend.launch(job(), tx) else {
            panic!("launch should fail");
        };
        assert!(matches!(err, ExecutionError::Spawn { .. }));
    }

    #[cfg(unix)]
    #[test]
    fn silent_worker_is_a_worker_failure() {
        let backend = ProcessBackend::new("true");
        let (tx, rx) = bounded(1);
        let mut running = backend.launch(job(), tx).unwrap();
        let outcome = rx.recv_timeout(Duration::from_secs(10)).unwrap();
        running.reap();
        let Err(ExecutionError::WorkerFailure { partition, position, handler, .. }) = outcome.result else {
            panic!("expected WorkerFailure");
        };
        assert_eq!((partition, position, handler.as_str()), (0, 0, "counter"));
    }

    #[test]
    fn nested_worker_refuses_to_spawn() {
        let err = refuse_inside_worker(Some(OsStr::new("1"))).unwrap_err();
        assert!(matches!(err, DispatchError::InvalidConfig { .. }));
        assert!(err.to_string().contains(WORKER_ENV));
        assert!(refuse_inside_worker(None).is_ok());
    }

    #[cfg(unix)]
    #[test]
    fn workers_are_marked() {
        // Prints garbage only when the marker is present.
        let backend = ProcessBackend::new("sh")
            .arg("-c")
            .arg(format!("test \"${WORKER_ENV}\" = 1 && echo marked"));
        let (tx, rx) = bounded(1);
        let mut running = backend.launch(job(), tx).unwrap();
        let outcome = rx.recv_timeout(Duration::from_secs(10)).unwrap();
        running.reap();
        assert!(matches!(outcome.result, Err(ExecutionError::Protocol { partition: 0, .. })));
    }

    #[cfg(unix)]
    #[test]
    fn garbage_output_is_a_protocol_error() {
        let backend = ProcessBackend::new("echo").arg("not json");
        let (tx, rx) = bounded(1);
        let mut running = backend.launch(job(), tx).unwrap();
        let outcome = rx.recv_timeout(Duration::from_secs(10)).unwrap();
        running.reap();
        assert!(matches!(outcome.result, Err(ExecutionError::Protocol { partition: 0, .. })));
    }
}
