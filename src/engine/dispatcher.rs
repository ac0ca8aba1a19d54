//! Parallel dispatch of a partition plan.
//!
//! Partitions are launched on a [`PartitionBackend`] while pool slots are free.
//! Outcomes arrive in completion order and are stored by partition index, so
//! results always come back in submission order.

use std::sync::Arc;
use std::time::{Duration, Instant};

use crossbeam_channel::{bounded, RecvTimeoutError};

use crate::config::ExecutorConfig;
use crate::error::{DispatchError, DispatchResult, ExecutionError};
use crate::handler::{CancelToken, HandlerRegistry};
use crate::partition::PartitionPlan;
use crate::result::ResultTree;

use super::backend::{PartitionBackend, RunningPartition};

/// Results of a dispatch, one entry per partition in submission order.
#[derive(Debug, Clone, PartialEq)]
pub struct Dispatched {
    /// Per partition, one tree per unit in batch order.
    pub results: Vec<Vec<ResultTree>>,
    /// Worker slots used; 0 when the plan ran inline.
    pub pool_size: usize,
}

impl Dispatched {
    /// All trees in batch order.
    pub fn into_trees(self) -> impl Iterator<Item = ResultTree> {
        self.results.into_iter().flatten()
    }
}

/// Runs partition plans on a backend.
#[derive(Debug)]
pub struct ParallelDispatcher<B> {
    registry: Arc<HandlerRegistry>,
    backend: B,
    config: ExecutorConfig,
}

impl<B: PartitionBackend> ParallelDispatcher<B> {
    /// Creates a dispatcher. `registry` serves plans that run inline.
    #[must_use]
    pub fn new(registry: Arc<HandlerRegistry>, backend: B, config: ExecutorConfig) -> Self {
        Self {
            registry,
            backend,
            config,
        }
    }

    /// The backend partitions are launched on.
    #[must_use]
    pub fn backend(&self) -> &B {
        &self.backend
    }

    /// The active configuration.
    #[must_use]
    pub fn config(&self) -> &ExecutorConfig {
        &self.config
    }

    /// Executes every partition of `plan`.
    ///
    /// A plan over a single work unit runs inline without a pool.
    ///
    /// # Errors
    ///
    /// - `ExecutionError::WorkerFailure` (or another execution error) for the
    ///   first failed partition; all others are aborted.
    /// - `ExecutionError::Timeout` if the configured deadline expires.
    pub fn dispatch(&self, plan: &PartitionPlan<'_>, configured_n: u32) -> DispatchResult<Dispatched> {
        let started = Instant::now();
        let deadline = self.config.deadline().and_then(|d| started.checked_add(d));

        if plan.total_configs == 1 {
            return self.dispatch_inline(plan, configured_n, started);
        }

        let count = plan.partitions.len();
        let pool_size = self.config.pool_size(count, plan.total_configs);
        tracing::debug!(
            backend = self.backend.label(),
            partitions = count,
            pool_size,
            chunk_size = plan.chunk_size,
            "Dispatching partitions"
        );

        let (tx, rx) = bounded(count.max(1));
        let mut done = Some(tx);
        let mut running: Vec<Option<Box<dyn RunningPartition>>> = (0..count).map(|_| None).collect();
        let mut slots: Vec<Option<Vec<ResultTree>>> = (0..count).map(|_| None).collect();
        let mut pending = plan.partitions.iter();
        let mut in_flight = 0usize;
        let mut completed = 0usize;

        while completed < count {
            while in_flight < pool_size {
                let Some(tx) = done.as_ref() else { break };
                let Some(partition) = pending.next() else {
                    // Everything is launched: let the channel close once
                    // every backend sender is gone.
                    done = None;
                    break;
                };
                let remaining = deadline.map(|d| d.saturating_duration_since(Instant::now()));
                match self.backend.launch(partition.to_job(configured_n, remaining), tx.clone()) {
                    Ok(handle) => {
                        tracing::debug!(
                            partition = partition.index,
                            lo = partition.lo,
                            units = partition.len(),
                            "Launched partition"
                        );
                        running[partition.index] = Some(handle);
                        in_flight += 1;
                    }
                    Err(e) => {
                        abort_all(&mut running);
                        return Err(e.into());
                    }
                }
            }

            let received = match deadline {
                Some(d) => rx.recv_deadline(d),
                None => rx.recv().map_err(|_| RecvTimeoutError::Disconnected),
            };

            let outcome = match received {
                Ok(outcome) => outcome,
                Err(RecvTimeoutError::Timeout) => {
                    abort_all(&mut running);
                    tracing::warn!(completed, partitions = count, "Dispatch deadline expired");
                    return Err(self.timeout().into());
                }
                Err(RecvTimeoutError::Disconnected) => {
                    abort_all(&mut running);
                    return Err(DispatchError::internal(format!(
                        "outcome channel closed with {completed} of {count} partitions reported"
                    )));
                }
            };

            let index = outcome.index;
            let Some(mut handle) = running.get_mut(index).and_then(Option::take) else {
                abort_all(&mut running);
                return Err(DispatchError::internal(format!(
                    "outcome for unknown or finished partition {index}"
                )));
            };
            handle.reap();
            in_flight -= 1;

            match outcome.result {
                Ok(trees) => {
                    slots[index] = Some(trees);
                    completed += 1;
                }
                Err(e) => {
                    abort_all(&mut running);
                    if deadline.is_some_and(|d| Instant::now() >= d) {
                        return Err(self.timeout().into());
                    }
                    tracing::debug!(partition = index, error = %e, "Partition failed, aborting dispatch");
                    return Err(e.into());
                }
            }
        }

        let results = slots
            .into_iter()
            .enumerate()
            .map(|(index, slot)| {
                slot.ok_or_else(|| DispatchError::internal(format!("partition {index} produced no outcome")))
            })
            .collect::<DispatchResult<Vec<_>>>()?;

        Ok(Dispatched { results, pool_size })
    }

    fn dispatch_inline(&self, plan: &PartitionPlan<'_>, configured_n: u32, started: Instant) -> DispatchResult<Dispatched> {
        let cancel = CancelToken::with_timeout(self.config.deadline());
        let mut results = Vec::with_capacity(plan.partitions.len());
        for partition in &plan.partitions {
            let trees = self
                .registry
                .run_units(partition.index, partition.lo, partition.units, configured_n, &cancel)
                .map_err(|e| self.expired_or(e, started))?;
            results.push(trees);
        }
        Ok(Dispatched { results, pool_size: 0 })
    }

    /// Maps a failure to `Timeout` once the configured deadline has passed.
    pub(crate) fn expired_or(&self, error: ExecutionError, started: Instant) -> ExecutionError {
        match self.config.deadline() {
            Some(limit) if started.elapsed() >= limit => self.timeout(),
            _ => error,
        }
    }

    fn timeout(&self) -> ExecutionError {
        let limit = self.config.deadline().unwrap_or(Duration::ZERO);
        ExecutionError::Timeout {
            duration_ms: u64::try_from(limit.as_millis()).unwrap_or(u64::MAX),
        }
    }
}

fn abort_all(running: &mut [Option<Box<dyn RunningPartition>>]) {
    for mut handle in running.iter_mut().filter_map(Option::take) {
        handle.abort();
    }
}
