//! Parallel-column input from the configuration layer.

use crate::error::BatchError;
use crate::time::TimeRange;
use crate::value::{ParamSet, StateMap};

use super::unit::{EnvProcesses, HandlerId, RunConfig, WorkUnit};
use super::Batch;

/// Per-run metadata laid out as parallel columns.
///
/// Position `i` of every column describes the same run. Columns are only ever
/// consumed together by [`BatchColumns::into_batch`].
#[derive(Debug, Clone, Default)]
pub struct BatchColumns {
    /// Run handler per run.
    pub handlers: Vec<HandlerId>,
    /// Parameter set per run.
    pub params: Vec<ParamSet>,
    /// Initial state list per run.
    pub initial_states: Vec<Vec<StateMap>>,
    /// Substep schedule per run.
    pub run_configs: Vec<RunConfig>,
    /// Environmental processes per run.
    pub env_processes: Vec<EnvProcesses>,
    /// Timestep window per run.
    pub time_ranges: Vec<TimeRange>,
    /// Simulation identifier per run.
    pub sim_ids: Vec<u32>,
    /// Run index within its simulation.
    pub run_counts: Vec<u32>,
    /// Experiment identifier per run.
    pub experiment_ids: Vec<u32>,
    /// Parameter subset identifier per run.
    pub subset_ids: Vec<u32>,
    /// Subset window per run.
    pub subset_windows: Vec<usize>,
    /// Batch-wide run count passed to every handler.
    pub configured_n: u32,
}

impl BatchColumns {
    /// Appends one unit across every column.
    pub fn push(&mut self, unit: WorkUnit) {
        self.handlers.push(unit.handler);
        self.params.push(unit.params);
        self.initial_states.push(unit.initial_states);
        self.run_configs.push(unit.run_config);
        self.env_processes.push(unit.env_processes);
        self.time_ranges.push(unit.time_range);
        self.sim_ids.push(unit.sim_id);
        self.run_counts.push(unit.run_count);
        self.experiment_ids.push(unit.experiment_id);
        self.subset_ids.push(unit.subset_id);
        self.subset_windows.push(unit.subset_window);
    }

    fn check_lengths(&self) -> Result<usize, BatchError> {
        let expected = self.handlers.len();
        let lengths = [
            ("params", self.params.len()),
            ("initial_states", self.initial_states.len()),
            ("run_configs", self.run_configs.len()),
            ("env_processes", self.env_processes.len()),
            ("time_ranges", self.time_ranges.len()),
            ("sim_ids", self.sim_ids.len()),
            ("run_counts", self.run_counts.len()),
            ("experiment_ids", self.experiment_ids.len()),
            ("subset_ids", self.subset_ids.len()),
            ("subset_windows", self.subset_windows.len()),
        ];
        for (column, actual) in lengths {
            if actual != expected {
                return Err(BatchError::ColumnLengthMismatch {
                    column,
                    expected,
                    actual,
                });
            }
        }
        Ok(expected)
    }

    /// Zips the columns into work units, preserving positions.
    ///
    /// # Errors
    ///
    /// Returns `BatchError::ColumnLengthMismatch` if any column's length
    /// differs from the handler column.
    pub fn into_batch(self) -> Result<Batch, BatchError> {
        let len = self.check_lengths()?;

        let mut params = self.params.into_iter();
        let mut initial_states = self.initial_states.into_iter();
        let mut run_configs = self.run_configs.into_iter();
        let mut env_processes = self.env_processes.into_iter();

        let mut units = Vec::with_capacity(len);
        for (i, handler) in self.handlers.into_iter().enumerate() {
            // Lengths were checked above, so every column yields an entry here.
            let (Some(params), Some(initial_states), Some(run_config), Some(env_processes)) = (
                params.next(),
                initial_states.next(),
                run_configs.next(),
                env_processes.next(),
            ) else {
                return Err(BatchError::ColumnLengthMismatch {
                    column: "params",
                    expected: len,
                    actual: i,
                });
            };
            units.push(WorkUnit {
                handler,
                params,
                initial_states,
                run_config,
                env_processes,
                time_range: self.time_ranges[i],
                sim_id: self.sim_ids[i],
                run_count: self.run_counts[i],
                experiment_id: self.experiment_ids[i],
                subset_id: self.subset_ids[i],
                subset_window: self.subset_windows[i],
            });
        }

        Ok(Batch::new(units, self.configured_n))
    }
}

impl FromIterator<WorkUnit> for BatchColumns {
    fn from_iter<I: IntoIterator<Item = WorkUnit>>(iter: I) -> Self {
        let mut columns = Self::default();
        for unit in iter {
            columns.push(unit);
        }
        columns
    }
}
