//! Batch execution.
//!
//! [`Executor`] is the entry point: it validates a batch, routes it to the
//! sequential path (one unit) or the parallel path (several units), and returns
//! the flattened rows in input order.

pub mod backend;
pub mod dispatcher;
pub mod process;
pub mod report;
pub mod sequential;

pub use backend::{PartitionBackend, PartitionOutcome, RunningPartition, ThreadBackend};
pub use dispatcher::{Dispatched, ParallelDispatcher};
pub use process::ProcessBackend;
pub use report::{BatchOutput, ExecutionPath, ExecutionReport, SessionId};
pub use sequential::run_sequential;

use std::sync::Arc;
use std::time::Instant;

use chrono::Utc;

use crate::batch::Batch;
use crate::config::ExecutorConfig;
use crate::error::{BatchError, DispatchError, DispatchResult};
use crate::flatten::flatten_all;
use crate::handler::{CancelToken, HandlerRegistry};
use crate::result::ResultRow;

/// Routes batches to the sequential or parallel path.
///
/// The default backend runs partitions in worker processes, which must build
/// the same [`HandlerRegistry`] as the parent. Use [`Executor::threaded`] to run
/// partitions on threads of the current process instead.
#[derive(Debug)]
pub struct Executor<B: PartitionBackend = ProcessBackend> {
    registry: Arc<HandlerRegistry>,
    dispatcher: ParallelDispatcher<B>,
}

impl Executor<ProcessBackend> {
    /// Creates an executor that re-executes the current binary as its worker.
    ///
    /// # Errors
    ///
    /// Returns `DispatchError::InvalidConfig` if `config` is invalid or the
    /// current executable cannot be located.
    pub fn new(registry: HandlerRegistry, config: ExecutorConfig) -> DispatchResult<Self> {
        Self::with_backend(Arc::new(registry), ProcessBackend::current_exe()?, config)
    }
}

impl Executor<ThreadBackend> {
    /// Creates an executor running partitions on threads.
    ///
    /// # Errors
    ///
    /// Returns `DispatchError::InvalidConfig` if `config` is invalid.
    pub fn threaded(registry: HandlerRegistry, config: ExecutorConfig) -> DispatchResult<Self> {
        let registry = Arc::new(registry);
        Self::with_backend(Arc::clone(&registry), ThreadBackend::new(registry), config)
    }
}

impl<B: PartitionBackend> Executor<B> {
    /// Creates an executor over an explicit backend.
    ///
    /// # Errors
    ///
    /// Returns `DispatchError::InvalidConfig` if `config` is invalid.
    pub fn with_backend(registry: Arc<HandlerRegistry>, backend: B, config: ExecutorConfig) -> DispatchResult<Self> {
        config.validate()?;
        Ok(Self {
            dispatcher: ParallelDispatcher::new(Arc::clone(&registry), backend, config),
            registry,
        })
    }

    /// The handlers known to this executor.
    #[must_use]
    pub fn registry(&self) -> &HandlerRegistry {
        &self.registry
    }

    /// The active configuration.
    #[must_use]
    pub fn config(&self) -> &ExecutorConfig {
        self.dispatcher.config()
    }

    /// The path a batch of this size takes.
    #[must_use]
    pub fn route(&self, batch: &Batch) -> ExecutionPath {
        if batch.len() > 1 {
            ExecutionPath::Parallel
        } else {
            ExecutionPath::Sequential
        }
    }

    /// Rejects batches that cannot be dispatched.
    ///
    /// # Errors
    ///
    /// - `BatchError::Empty` for a batch without units.
    /// - `BatchError::UnknownHandler` for the first unit whose handler is not
    ///   registered.
    pub fn check(&self, batch: &Batch) -> DispatchResult<()> {
        batch.validate()?;
        if let Some((position, unit)) = batch
            .units()
            .iter()
            .enumerate()
            .find(|(_, unit)| !self.registry.contains(&unit.handler))
        {
            return Err(BatchError::UnknownHandler {
                position,
                handler: unit.handler.to_string(),
            }
            .into());
        }
        Ok(())
    }

    /// Executes `batch` and returns its rows in input order.
    ///
    /// # Errors
    ///
    /// Returns the first failure; no rows are returned in that case.
    pub fn execute_batch(&self, batch: &Batch) -> DispatchResult<Vec<ResultRow>> {
        Ok(self.execute(batch)?.rows)
    }

    /// Executes `batch` and reports how it was executed.
    ///
    /// # Errors
    ///
    /// See [`check`](Self::check), [`Partitioner::plan`](crate::partition::Partitioner::plan)
    /// and [`ParallelDispatcher::dispatch`].
    pub fn execute(&self, batch: &Batch) -> DispatchResult<BatchOutput> {
        self.check(batch)?;

        let session_id = SessionId::new();
        let started_at = Utc::now();
        let started = Instant::now();
        let path = self.route(batch);
        tracing::info!(
            session = %session_id,
            mode = %path,
            units = batch.len(),
            "Execution mode selected"
        );

        let mut report = ExecutionReport {
            session_id,
            path,
            backend: "inline".to_string(),
            partitions: 1,
            pool_size: 0,
            sim_count: 1,
            chunk_size: batch.len(),
            rows: 0,
            started_at,
            elapsed_ms: 0,
        };

        let rows = match path {
            ExecutionPath::Sequential => {
                let cancel = CancelToken::with_timeout(self.config().deadline());
                run_sequential(&self.registry, batch, &cancel).map_err(|e| match e {
                    DispatchError::Execution(inner) => self.dispatcher.expired_or(inner, started).into(),
                    other => other,
                })?
            }
            ExecutionPath::Parallel => {
                let plan = self.config().partitioner().plan(batch.units())?;
                tracing::debug!(
                    session = %session_id,
                    total_configs = plan.total_configs,
                    sim_count = plan.sim_count,
                    chunk_size = plan.chunk_size,
                    partitions = plan.partitions.len(),
                    "Partition plan"
                );
                let dispatched = self.dispatcher.dispatch(&plan, batch.configured_n())?;
                report.backend = self.dispatcher.backend().label().to_string();
                report.partitions = plan.partitions.len();
                report.pool_size = dispatched.pool_size;
                report.sim_count = plan.sim_count;
                report.chunk_size = plan.chunk_size;
                flatten_all(dispatched.into_trees())
            }
        };

        report.rows = rows.len();
        report.elapsed_ms = u64::try_from(started.elapsed().as_millis()).unwrap_or(u64::MAX);
        tracing::debug!(session = %session_id, rows = report.rows, elapsed_ms = report.elapsed_ms, "Execution finished");
        Ok(BatchOutput { rows, report })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::batch::{RunConfig, WorkUnit};
    use crate::error::RunError;
    use crate::handler::RunRequest;
    use crate::reference;
    use crate::result::ResultTree;
    use crate::time::TimeRange;
    use crate::value::{StateMap, Value};

    fn counter(sim_id: u32) -> WorkUnit {
        WorkUnit::new(reference::COUNTER)
            .initial_state(StateMap::from([("x".to_string(), Value::Int(0))]))
            .run_config(RunConfig::uniform(2, &["x"]))
            .time_range(TimeRange::steps(3))
            .sim_id(sim_id)
            .run_count(1)
    }

    fn executor() -> Executor<ThreadBackend> {
        Executor::threaded(reference::registry(), ExecutorConfig::default()).unwrap()
    }

    #[test]
    fn routes_by_batch_size() {
        let exec = executor();
        assert_eq!(exec.route(&Batch::new(vec![counter(0)], 1)), ExecutionPath::Sequential);
        assert_eq!(exec.route(&Batch::new(vec![counter(0), counter(0)], 1)), ExecutionPath::Parallel);
    }

    #[test]
    fn empty_batch_is_rejected_before_dispatch() {
        let err = executor().execute_batch(&Batch::new(Vec::new(), 1)).unwrap_err();
        assert_eq!(err, DispatchError::Batch(BatchError::Empty));
    }

    #[test]
    fn unknown_handler_is_rejected_before_dispatch() {
        let batch = Batch::new(vec![counter(0), WorkUnit::new("missing")], 1);
        let err = executor().execute_batch(&batch).unwrap_err();
        assert_eq!(
            err,
            DispatchError::Batch(BatchError::UnknownHandler {
                position: 1,
                handler: "missing".to_string(),
            })
        );
    }

    #[test]
    fn parallel_report_describes_plan() {
        let batch = Batch::new(vec![counter(0), counter(0), counter(1), counter(1)], 1);
        let out = executor().execute(&batch).unwrap();
        assert_eq!(out.report.path, ExecutionPath::Parallel);
        assert_eq!(out.report.backend, "threads");
        assert_eq!(out.report.sim_count, 2);
        assert_eq!(out.report.chunk_size, 2);
        assert_eq!(out.report.partitions, 2);
        assert_eq!(out.report.rows, out.rows.len());
        assert_eq!(u64::try_from(out.rows.len()).unwrap(), batch.expected_rows());
    }

    #[test]
    fn sequential_deadline_is_a_timeout() {
        let registry = reference::registry();
        let config = ExecutorConfig {
            deadline_ms: Some(30),
            ..ExecutorConfig::default()
        };
        let exec = Executor::threaded(registry, config).unwrap();
        let mut unit = counter(0).param("sleep_ms", 5_000);
        unit.handler = reference::SLEEPY.into();
        let batch = Batch::new(vec![unit], 1);
        let err = exec.execute_batch(&batch).unwrap_err();
        assert!(err.is_timeout());
    }

    #[test]
    fn configured_n_reaches_handlers() {
        let registry = HandlerRegistry::new().with("n", |request: &RunRequest<'_>| -> Result<ResultTree, RunError> {
            Ok(ResultTree::from(ResultRow {
                subset: request.configured_n,
                ..ResultRow::default()
            }))
        });
        let exec = Executor::threaded(registry, ExecutorConfig::default()).unwrap();
        let batch = Batch::new(vec![WorkUnit::new("n").run_count(1); 2], 9);
        let rows = exec.execute_batch(&batch).unwrap();
        assert!(rows.iter().all(|row| row.subset == 9));
    }

    #[test]
    fn invalid_config_is_rejected() {
        let config = ExecutorConfig {
            max_workers: Some(0),
            ..ExecutorConfig::default()
        };
        let err = Executor::threaded(reference::registry(), config).unwrap_err();
        assert!(matches!(err, DispatchError::InvalidConfig { .. }));
    }
}
