//! Partition backends.
//!
//! A backend starts one partition at a time and reports its outcome on a
//! channel; the dispatcher decides how many run at once and in which order
//! results are returned.

use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::Duration;

use crossbeam_channel::Sender;

use crate::error::ExecutionError;
use crate::handler::{CancelToken, HandlerRegistry};
use crate::partition::PartitionJob;
use crate::result::ResultTree;

/// The outcome of one partition, tagged with its submission index.
#[derive(Debug)]
pub struct PartitionOutcome {
    /// Partition index.
    pub index: usize,
    /// One tree per unit, or the first failure.
    pub result: Result<Vec<ResultTree>, ExecutionError>,
}

/// A launched partition.
pub trait RunningPartition: Send {
    /// Stops the partition without waiting for it to make progress.
    fn abort(&mut self);

    /// Releases the partition's resources once its outcome was received.
    fn reap(&mut self);
}

/// Starts partitions on some execution substrate.
pub trait PartitionBackend: Send + Sync {
    /// Short name used in logs and reports.
    fn label(&self) -> &'static str;

    /// Starts `job`. Exactly one [`PartitionOutcome`] must eventually be sent
    /// on `done` unless the partition is aborted first.
    ///
    /// # Errors
    ///
    /// Returns `ExecutionError::Spawn` if the partition could not be started.
    fn launch(
        &self,
        job: PartitionJob,
        done: Sender<PartitionOutcome>,
    ) -> Result<Box<dyn RunningPartition>, ExecutionError>;
}

/// Runs each partition on its own OS thread within this process.
///
/// Handlers are resolved in the shared registry, so closures work without
/// being registered in a separate worker binary. Handler panics are reported
/// as failures by the registry. Aborting signals the
/// partition's cancel token; handlers that ignore it run to completion in the
/// background.
#[derive(Debug, Clone)]
pub struct ThreadBackend {
    registry: Arc<HandlerRegistry>,
}

impl ThreadBackend {
    /// Creates a backend over `registry`.
    #[must_use]
    pub fn new(registry: Arc<HandlerRegistry>) -> Self {
        Self { registry }
    }
}

struct ThreadPartition {
    cancel: CancelToken,
    handle: Option<JoinHandle<()>>,
}

impl RunningPartition for ThreadPartition {
    fn abort(&mut self) {
        self.cancel.cancel();
        // Detach: a handler that ignores cancellation must not block the caller.
        self.handle.take();
    }

    fn reap(&mut self) {
        if let Some(handle) = self.handle.take() {
            let _ = handle.join();
        }
    }
}

impl PartitionBackend for ThreadBackend {
    fn label(&self) -> &'static str {
        "threads"
    }

    fn launch(
        &self,
        job: PartitionJob,
        done: Sender<PartitionOutcome>,
    ) -> Result<Box<dyn RunningPartition>, ExecutionError> {
        let index = job.index;
        let cancel = CancelToken::with_timeout(job.deadline_ms.map(Duration::from_millis));
        let worker_cancel = cancel.clone();
        let registry = Arc::clone(&self.registry);
        let thread_name = format!("simexec-partition-{index}");

        let handle = thread::Builder::new()
            .name(thread_name.clone())
            .spawn(move || {
                let result = registry.run_job(&job, &worker_cancel);
                let _ = done.send(PartitionOutcome { index, result });
            })
            .map_err(|e| ExecutionError::Spawn {
                program: thread_name,
                message: e.to_string(),
            })?;

        Ok(Box::new(ThreadPartition {
            cancel,
            handle: Some(handle),
        }))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crossbeam_channel::bounded;

    use crate::batch::WorkUnit;
    use crate::error::RunError;
    use crate::handler::RunRequest;

    fn panicking(_: &RunRequest<'_>) -> Result<ResultTree, RunError> {
        panic!("step diverged");
    }

    fn job(handler: &str) -> PartitionJob {
        PartitionJob {
            index: 2,
            lo: 4,
            configured_n: 1,
            deadline_ms: None,
            units: vec![WorkUnit::new("empty"), WorkUnit::new(handler)],
        }
    }

    #[test]
    fn thread_backend_reports_outcome() {
        let registry = HandlerRegistry::new().with("empty", |_: &RunRequest<'_>| -> Result<ResultTree, RunError> {
            Ok(ResultTree::empty())
        });
        let backend = ThreadBackend::new(Arc::new(registry));
        let (tx, rx) = bounded(1);
        let mut running = backend.launch(job("empty"), tx).unwrap();
        let outcome = rx.recv_timeout(Duration::from_secs(5)).unwrap();
        running.reap();
        assert_eq!(outcome.index, 2);
        assert_eq!(outcome.result.unwrap(), vec![ResultTree::empty(), ResultTree::empty()]);
    }

    #[test]
    fn thread_backend_converts_panics() {
        let registry = HandlerRegistry::new()
            .with("empty", |_: &RunRequest<'_>| -> Result<ResultTree, RunError> { Ok(ResultTree::empty()) })
            .with("panics", panicking);
        let backend = ThreadBackend::new(Arc::new(registry));
        let (tx, rx) = bounded(1);
        let mut running = backend.launch(job("panics"), tx).unwrap();
        let outcome = rx.recv_timeout(Duration::from_secs(5)).unwrap();
        running.reap();
        let Err(ExecutionError::WorkerFailure { partition, position, handler, message }) = outcome.result else {
            panic!("expected WorkerFailure");
        };
        assert_eq!((partition, position, handler.as_str()), (2, 5, "panics"));
        assert!(message.contains("step diverged"));
    }
}
