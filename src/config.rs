//! Executor configuration.

use std::path::Path;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::{DispatchError, DispatchResult};
use crate::partition::{Partitioner, RemainderPolicy, SimCountPolicy};

/// How many worker slots the pool opens.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PoolSizing {
    /// One slot per partition.
    #[default]
    Partitions,
    /// One slot per work unit in the batch, even if fewer partitions exist.
    TotalConfigs,
}

/// Executor configuration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct ExecutorConfig {
    /// Formula for the number of run groups.
    pub sim_count_policy: SimCountPolicy,
    /// Handling of batches `sim_count` does not divide.
    pub remainder: RemainderPolicy,
    /// Pool sizing rule.
    pub pool_sizing: PoolSizing,
    /// Upper bound on concurrently running partitions.
    pub max_workers: Option<usize>,
    /// Upper bound on the wall-clock time of one dispatch.
    pub deadline_ms: Option<u64>,
}

impl Default for ExecutorConfig {
    fn default() -> Self {
        Self {
            sim_count_policy: SimCountPolicy::MaxFrequency,
            remainder: RemainderPolicy::Reject,
            pool_sizing: PoolSizing::Partitions,
            max_workers: None,
            deadline_ms: None,
        }
    }
}

impl ExecutorConfig {
    /// Validate the configuration.
    ///
    /// # Errors
    ///
    /// Returns `DispatchError::InvalidConfig` for zero worker or deadline bounds.
    pub fn validate(&self) -> DispatchResult<()> {
        if self.max_workers == Some(0) {
            return Err(DispatchError::invalid_config("max_workers must be > 0"));
        }
        if self.deadline_ms == Some(0) {
            return Err(DispatchError::invalid_config("deadline_ms must be > 0"));
        }
        Ok(())
    }

    /// Parses and validates a JSON configuration.
    ///
    /// Missing fields take their defaults.
    ///
    /// # Errors
    ///
    /// Returns `DispatchError::InvalidConfig` for malformed JSON, unknown
    /// fields, or values rejected by [`validate`](Self::validate).
    pub fn from_json(s: &str) -> DispatchResult<Self> {
        let config: Self = serde_json::from_str(s)
            .map_err(|e| DispatchError::invalid_config(format!("parse executor config: {e}")))?;
        config.validate()?;
        Ok(config)
    }

    /// Reads, parses and validates a JSON configuration file.
    ///
    /// # Errors
    ///
    /// Returns `DispatchError::InvalidConfig` if the file cannot be read or
    /// parsed.
    pub fn from_path(path: impl AsRef<Path>) -> DispatchResult<Self> {
        let path = path.as_ref();
        let raw = std::fs::read_to_string(path)
            .map_err(|e| DispatchError::invalid_config(format!("read {}: {e}", path.display())))?;
        Self::from_json(&raw)
    }

    /// Serializes the configuration as pretty JSON.
    ///
    /// # Errors
    ///
    /// Returns `DispatchError::Internal` if serialization fails.
    pub fn to_json_pretty(&self) -> DispatchResult<String> {
        serde_json::to_string_pretty(self)
            .map_err(|e| DispatchError::internal(format!("serialize executor config: {e}")))
    }

    /// The dispatch deadline, if any.
    #[must_use]
    pub fn deadline(&self) -> Option<Duration> {
        self.deadline_ms.map(Duration::from_millis)
    }

    /// The partitioner described by this configuration.
    #[must_use]
    pub const fn partitioner(&self) -> Partitioner {
        Partitioner::new(self.sim_count_policy, self.remainder)
    }

    /// Worker slots for a dispatch of `partitions` partitions over a batch of
    /// `total_configs` units.
    #[must_use]
    pub fn pool_size(&self, partitions: usize, total_configs: usize) -> usize {
        let wanted = match self.pool_sizing {
            PoolSizing::Partitions => partitions,
            PoolSizing::TotalConfigs => total_configs,
        };
        self.max_workers.map_or(wanted, |cap| wanted.min(cap)).max(1)
    }
}
