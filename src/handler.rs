//! Run handlers and their registry.
//!
//! A run handler advances one work unit through its step pipeline and returns
//! the nested rows it produced. The dispatcher only invokes handlers; it never
//! looks inside the rows.

use std::any::Any;
use std::collections::HashMap;
use std::fmt;
use std::panic::{self, AssertUnwindSafe};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use crate::batch::{EnvProcesses, HandlerId, RunConfig, WorkUnit};
use crate::error::{ExecutionError, RunError};
use crate::partition::PartitionJob;
use crate::result::ResultTree;
use crate::time::TimeRange;
use crate::value::{ParamSet, StateMap};

/// Best-effort cancellation signal shared with running handlers.
///
/// A token is cancelled explicitly or once its deadline passes. Handlers are
/// expected to poll it between timesteps.
#[derive(Debug, Clone, Default)]
pub struct CancelToken {
    flag: Arc<AtomicBool>,
    deadline: Option<Instant>,
}

impl CancelToken {
    /// Creates a token without a deadline.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates a token that reports cancellation once `timeout` has elapsed.
    #[must_use]
    pub fn with_timeout(timeout: Option<Duration>) -> Self {
        Self {
            flag: Arc::new(AtomicBool::new(false)),
            deadline: timeout.and_then(|t| Instant::now().checked_add(t)),
        }
    }

    /// Signals cancellation to every clone of this token.
    pub fn cancel(&self) {
        self.flag.store(true, Ordering::Release);
    }

    /// Returns true once cancelled or past the deadline.
    #[must_use]
    pub fn is_cancelled(&self) -> bool {
        self.flag.load(Ordering::Acquire) || self.deadline.is_some_and(|d| Instant::now() >= d)
    }

    /// Returns `Err(RunError::Cancelled)` once cancelled.
    ///
    /// # Errors
    ///
    /// Returns `RunError::Cancelled` if the token is cancelled.
    pub fn check(&self) -> Result<(), RunError> {
        if self.is_cancelled() {
            return Err(RunError::Cancelled);
        }
        Ok(())
    }
}

/// Everything a run handler receives for one work unit.
#[derive(Debug, Clone, Copy)]
pub struct RunRequest<'a> {
    /// Sweep values for this run.
    pub params: &'a ParamSet,
    /// Initial states; the last one seeds the run.
    pub initial_states: &'a [StateMap],
    /// Substep schedule.
    pub run_config: &'a RunConfig,
    /// Environmental processes keyed by state variable.
    pub env_processes: &'a EnvProcesses,
    /// Timesteps to simulate.
    pub time_range: TimeRange,
    /// Simulation identifier.
    pub sim_id: u32,
    /// Run index within the simulation.
    pub run_count: u32,
    /// Parameter subset identifier.
    pub subset_id: u32,
    /// Parameter subset window.
    pub subset_window: usize,
    /// Batch-wide run count.
    pub configured_n: u32,
    /// Experiment identifier.
    pub experiment_id: u32,
    /// Checked between steps to stop early.
    pub cancel: &'a CancelToken,
}

impl<'a> RunRequest<'a> {
    /// Binds a work unit and the batch-wide scalar into a request.
    #[must_use]
    pub fn for_unit(unit: &'a WorkUnit, configured_n: u32, cancel: &'a CancelToken) -> Self {
        Self {
            params: &unit.params,
            initial_states: &unit.initial_states,
            run_config: &unit.run_config,
            env_processes: &unit.env_processes,
            time_range: unit.time_range,
            sim_id: unit.sim_id,
            run_count: unit.run_count,
            subset_id: unit.subset_id,
            subset_window: unit.subset_window,
            configured_n,
            experiment_id: unit.experiment_id,
            cancel,
        }
    }
}

/// The run-callable contract.
pub trait RunHandler: Send + Sync {
    /// Executes one work unit.
    fn run(&self, request: &RunRequest<'_>) -> Result<ResultTree, RunError>;
}

impl<F> RunHandler for F
where
    F: Fn(&RunRequest<'_>) -> Result<ResultTree, RunError> + Send + Sync,
{
    fn run(&self, request: &RunRequest<'_>) -> Result<ResultTree, RunError> {
        self(request)
    }
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        format!("handler panicked: {s}")
    } else if let Some(s) = payload.downcast_ref::<String>() {
        format!("handler panicked: {s}")
    } else {
        "handler panicked".to_string()
    }
}

/// Handlers addressable by id.
///
/// The parent process and every worker process build the same registry, so a
/// work unit only carries its handler's id across the process boundary.
#[derive(Clone, Default)]
pub struct HandlerRegistry {
    handlers: HashMap<HandlerId, Arc<dyn RunHandler>>,
}

impl fmt::Debug for HandlerRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut ids: Vec<&str> = self.handlers.keys().map(HandlerId::as_str).collect();
        ids.sort_unstable();
        f.debug_struct("HandlerRegistry").field("handlers", &ids).finish()
    }
}

impl HandlerRegistry {
    /// Creates an empty registry.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers `handler` under `id`, replacing any previous handler.
    pub fn register(&mut self, id: impl Into<HandlerId>, handler: impl RunHandler + 'static) -> &mut Self {
        self.handlers.insert(id.into(), Arc::new(handler));
        self
    }

    /// Builder-style [`register`](Self::register).
    #[must_use]
    pub fn with(mut self, id: impl Into<HandlerId>, handler: impl RunHandler + 'static) -> Self {
        self.register(id, handler);
        self
    }

    /// Looks up a handler.
    #[must_use]
    pub fn get(&self, id: &HandlerId) -> Option<Arc<dyn RunHandler>> {
        self.handlers.get(id).cloned()
    }

    /// Returns true if `id` is registered.
    #[must_use]
    pub fn contains(&self, id: &HandlerId) -> bool {
        self.handlers.contains_key(id)
    }

    /// Number of registered handlers.
    #[must_use]
    pub fn len(&self) -> usize {
        self.handlers.len()
    }

    /// Returns true if nothing is registered.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.handlers.is_empty()
    }

    /// Runs one unit located at `position` of partition `partition`.
    ///
    /// # Errors
    ///
    /// Returns `ExecutionError::WorkerFailure` if the handler is unknown,
    /// reports an error, or panics.
    pub fn invoke(
        &self,
        unit: &WorkUnit,
        configured_n: u32,
        cancel: &CancelToken,
        partition: usize,
        position: usize,
    ) -> Result<ResultTree, ExecutionError> {
        let failure = |message: String| ExecutionError::WorkerFailure {
            partition,
            position,
            handler: unit.handler.to_string(),
            message,
        };

        let handler = self
            .get(&unit.handler)
            .ok_or_else(|| failure("handler is not registered".to_string()))?;

        let request = RunRequest::for_unit(unit, configured_n, cancel);
        match panic::catch_unwind(AssertUnwindSafe(|| handler.run(&request))) {
            Ok(outcome) => outcome.map_err(|e| failure(e.to_string())),
            Err(payload) => Err(failure(panic_message(payload.as_ref()))),
        }
    }

    /// Runs every unit of a job in order, stopping at the first failure.
    ///
    /// Returns one tree per unit.
    ///
    /// # Errors
    ///
    /// Returns the first unit's `ExecutionError::WorkerFailure`.
    pub fn run_job(&self, job: &PartitionJob, cancel: &CancelToken) -> Result<Vec<ResultTree>, ExecutionError> {
        self.run_units(job.index, job.lo, &job.units, job.configured_n, cancel)
    }

    /// Runs `units`, which start at batch position `lo`, as partition `partition`.
    ///
    /// # Errors
    ///
    /// Returns the first unit's `ExecutionError::WorkerFailure`.
    pub fn run_units(
        &self,
        partition: usize,
        lo: usize,
        units: &[WorkUnit],
        configured_n: u32,
        cancel: &CancelToken,
    ) -> Result<Vec<ResultTree>, ExecutionError> {
        units
            .iter()
            .enumerate()
            .map(|(offset, unit)| self.invoke(unit, configured_n, cancel, partition, lo + offset))
            .collect()
    }
}
