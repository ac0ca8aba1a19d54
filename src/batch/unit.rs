//! The work-unit record and its pipeline descriptors.

use std::collections::BTreeMap;
use std::fmt;

use serde::{Deserialize, Serialize};

use crate::time::TimeRange;
use crate::value::{ParamSet, StateMap, Value};

/// Identifier of a registered run handler.
///
/// Run handlers cannot cross a process boundary as closures; a work unit names
/// its handler and each side of the boundary resolves it in its own registry.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct HandlerId(String);

impl HandlerId {
    /// Creates a handler id.
    #[must_use]
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    /// The id as a string slice.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for HandlerId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for HandlerId {
    fn from(id: &str) -> Self {
        Self::new(id)
    }
}

impl From<String> for HandlerId {
    fn from(id: String) -> Self {
        Self(id)
    }
}

/// One stage of a step pipeline: policy descriptors and state-update descriptors.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SubstepBlock {
    /// Policy function descriptors, in aggregation order.
    pub policies: Vec<String>,
    /// State variables updated by this block, in update order.
    pub state_updates: Vec<String>,
}

impl SubstepBlock {
    /// Creates a block.
    #[must_use]
    pub fn new(policies: Vec<String>, state_updates: Vec<String>) -> Self {
        Self {
            policies,
            state_updates,
        }
    }
}

/// Ordered substep blocks of a run.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct RunConfig {
    blocks: Vec<SubstepBlock>,
}

impl RunConfig {
    /// Creates a run configuration from blocks.
    #[must_use]
    pub fn new(blocks: Vec<SubstepBlock>) -> Self {
        Self { blocks }
    }

    /// `substeps` identical blocks, each updating `variables` with no policies.
    #[must_use]
    pub fn uniform(substeps: usize, variables: &[&str]) -> Self {
        let block = SubstepBlock::new(
            Vec::new(),
            variables.iter().map(|v| (*v).to_string()).collect(),
        );
        Self {
            blocks: vec![block; substeps],
        }
    }

    /// The substep blocks in order.
    #[must_use]
    pub fn blocks(&self) -> &[SubstepBlock] {
        &self.blocks
    }

    /// Number of substep blocks per timestep.
    #[must_use]
    pub fn substeps(&self) -> usize {
        self.blocks.len()
    }
}

/// Environment-process table: state variable to process descriptor.
pub type EnvProcesses = BTreeMap<String, String>;

/// One fully specified simulation run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WorkUnit {
    /// Run handler executing this unit.
    pub handler: HandlerId,
    /// Parameter-sweep values.
    #[serde(default)]
    pub params: ParamSet,
    /// Initial-states sequence; handlers start from the last entry.
    #[serde(default)]
    pub initial_states: Vec<StateMap>,
    /// Substep blocks executed every timestep.
    #[serde(default)]
    pub run_config: RunConfig,
    /// Environment processes.
    #[serde(default)]
    pub env_processes: EnvProcesses,
    /// Iteration bound.
    #[serde(default)]
    pub time_range: TimeRange,
    /// Simulation identifier.
    #[serde(default)]
    pub sim_id: u32,
    /// Monte Carlo run count N.
    pub run_count: u32,
    /// Experiment identifier.
    #[serde(default)]
    pub experiment_id: u32,
    /// Subset identifier.
    #[serde(default)]
    pub subset_id: u32,
    /// Subset-window bound.
    #[serde(default)]
    pub subset_window: usize,
}

impl WorkUnit {
    /// Creates a unit with one run over one timestep and no pipeline.
    #[must_use]
    pub fn new(handler: impl Into<HandlerId>) -> Self {
        Self {
            handler: handler.into(),
            params: ParamSet::new(),
            initial_states: Vec::new(),
            run_config: RunConfig::default(),
            env_processes: EnvProcesses::new(),
            time_range: TimeRange::default(),
            sim_id: 0,
            run_count: 1,
            experiment_id: 0,
            subset_id: 0,
            subset_window: 0,
        }
    }

    /// Sets one sweep value.
    #[must_use]
    pub fn param(mut self, name: impl Into<String>, value: impl Into<Value>) -> Self {
        self.params.insert(name.into(), value.into());
        self
    }

    /// Replaces the whole parameter set.
    #[must_use]
    pub fn params(mut self, params: ParamSet) -> Self {
        self.params = params;
        self
    }

    /// Appends an initial state; the last one seeds the run.
    #[must_use]
    pub fn initial_state(mut self, state: StateMap) -> Self {
        self.initial_states.push(state);
        self
    }

    /// Sets the substep schedule.
    #[must_use]
    pub fn run_config(mut self, run_config: RunConfig) -> Self {
        self.run_config = run_config;
        self
    }

    /// Attaches an environmental process to a state variable.
    #[must_use]
    pub fn env_process(mut self, variable: impl Into<String>, process: impl Into<String>) -> Self {
        self.env_processes.insert(variable.into(), process.into());
        self
    }

    /// Sets the timesteps to simulate.
    #[must_use]
    pub fn time_range(mut self, time_range: TimeRange) -> Self {
        self.time_range = time_range;
        self
    }

    /// Sets the simulation identifier.
    #[must_use]
    pub fn sim_id(mut self, sim_id: u32) -> Self {
        self.sim_id = sim_id;
        self
    }

    /// Sets the run index within the simulation.
    #[must_use]
    pub fn run_count(mut self, run_count: u32) -> Self {
        self.run_count = run_count;
        self
    }

    /// Sets the experiment identifier.
    #[must_use]
    pub fn experiment_id(mut self, experiment_id: u32) -> Self {
        self.experiment_id = experiment_id;
        self
    }

    /// Sets the parameter subset and its window.
    #[must_use]
    pub fn subset(mut self, subset_id: u32, subset_window: usize) -> Self {
        self.subset_id = subset_id;
        self.subset_window = subset_window;
        self
    }

    /// Rows this unit yields under the substep-counting convention:
    /// `N + N * T * B`, saturating at `u64::MAX`.
    #[must_use]
    pub fn expected_rows(&self) -> u64 {
        let runs = u64::from(self.run_count);
        let substeps = u64::try_from(self.run_config.substeps()).unwrap_or(u64::MAX);
        runs.saturating_add(runs.saturating_mul(self.time_range.len()).saturating_mul(substeps))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn builder_sets_every_field() {
        let unit = WorkUnit::new("counter")
            .param("increment", 2)
            .initial_state(StateMap::from([("x".to_string(), Value::Int(0))]))
            .run_config(RunConfig::uniform(3, &["x"]))
            .env_process("x", "noise")
            .time_range(TimeRange::new(1, 4))
            .sim_id(7)
            .run_count(5)
            .experiment_id(2)
            .subset(1, 3);

        assert_eq!(unit.handler.as_str(), "counter");
        assert_eq!(unit.params.get("increment"), Some(&Value::Int(2)));
        assert_eq!(unit.initial_states.len(), 1);
        assert_eq!(unit.run_config.substeps(), 3);
        assert_eq!(unit.env_processes.get("x").map(String::as_str), Some("noise"));
        assert_eq!(unit.time_range, TimeRange::new(1, 4));
        assert_eq!((unit.sim_id, unit.run_count, unit.experiment_id), (7, 5, 2));
        assert_eq!((unit.subset_id, unit.subset_window), (1, 3));
    }

    #[test]
    fn expected_rows_saturates() {
        let unit = WorkUnit::new("counter")
            .run_count(u32::MAX)
            .time_range(TimeRange::steps(u64::MAX))
            .run_config(RunConfig::uniform(2, &["x"]));
        assert_eq!(unit.expected_rows(), u64::MAX);
    }

    #[test]
    fn unit_deserializes_with_defaults() {
        let unit: WorkUnit =
            serde_json::from_str(r#"{"handler":"counter","run_count":3}"#).unwrap();
        assert_eq!(unit.handler, HandlerId::from("counter"));
        assert_eq!(unit.run_count, 3);
        assert!(unit.params.is_empty());
        assert_eq!(unit.time_range, TimeRange::default());
    }

    #[test]
    fn run_config_serializes_as_block_list() {
        let config = RunConfig::uniform(1, &["a", "b"]);
        let json = serde_json::to_value(&config).unwrap();
        assert_eq!(
            json,
            serde_json::json!([{ "policies": [], "state_updates": ["a", "b"] }])
        );
    }
}
