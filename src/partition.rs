//! Partitioning a batch into contiguous, equal-size execution slices.
//!
//! The number of partitions is derived from the simulation-identifier
//! frequencies alone. Two formulas exist for the number of run groups
//! (`sim_count`), so the choice is an explicit [`SimCountPolicy`].

use std::collections::BTreeMap;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::batch::WorkUnit;
use crate::error::{BatchError, DispatchResult, PartitionError};

/// How `sim_count` is computed from the simulation-identifier frequencies.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SimCountPolicy {
    /// The largest number of units sharing one simulation identifier.
    #[default]
    MaxFrequency,
    /// The number of distinct simulation identifiers.
    DistinctIds,
}

/// What happens when `sim_count` does not divide the batch length.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RemainderPolicy {
    /// Fail with `PartitionError::NonExactSplit`.
    #[default]
    Reject,
    /// Round the chunk size up; the final partition is shorter.
    ShortTail,
}

/// A contiguous slice `[lo, hi)` of the batch.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Partition<'a> {
    /// Position of this partition in submission order.
    pub index: usize,
    /// First unit position (inclusive).
    pub lo: usize,
    /// Last unit position (exclusive).
    pub hi: usize,
    /// The units at positions `lo..hi`.
    pub units: &'a [WorkUnit],
}

impl Partition<'_> {
    /// Number of units in the partition.
    #[must_use]
    pub fn len(&self) -> usize {
        self.hi - self.lo
    }

    /// Returns true if the partition holds no units.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.lo == self.hi
    }

    /// Builds the owned job sent to a worker.
    #[must_use]
    pub fn to_job(&self, configured_n: u32, deadline: Option<Duration>) -> PartitionJob {
        PartitionJob {
            index: self.index,
            lo: self.lo,
            configured_n,
            deadline_ms: deadline.map(|d| u64::try_from(d.as_millis()).unwrap_or(u64::MAX)),
            units: self.units.to_vec(),
        }
    }
}

/// An owned, serializable partition handed to a backend.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PartitionJob {
    /// Partition index in submission order.
    pub index: usize,
    /// Batch position of the first unit.
    pub lo: usize,
    /// Batch-wide configured N.
    pub configured_n: u32,
    /// Remaining wall-clock budget, if the dispatch has a deadline.
    #[serde(default)]
    pub deadline_ms: Option<u64>,
    /// Units in batch order.
    pub units: Vec<WorkUnit>,
}

/// The partitions of one batch plus the figures that produced them.
#[derive(Debug, Clone, PartialEq)]
pub struct PartitionPlan<'a> {
    /// Number of units in the batch.
    pub total_configs: usize,
    /// Number of run groups per the sim-count policy.
    pub sim_count: usize,
    /// Units per partition (the final one may be shorter under `ShortTail`).
    pub chunk_size: usize,
    /// Partitions in submission order.
    pub partitions: Vec<Partition<'a>>,
}

/// Splits batches into partitions.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Partitioner {
    sim_count_policy: SimCountPolicy,
    remainder: RemainderPolicy,
}

impl Partitioner {
    /// Creates a partitioner.
    #[must_use]
    pub const fn new(sim_count_policy: SimCountPolicy, remainder: RemainderPolicy) -> Self {
        Self {
            sim_count_policy,
            remainder,
        }
    }

    /// Frequency of each simulation identifier.
    #[must_use]
    pub fn frequencies(units: &[WorkUnit]) -> BTreeMap<u32, usize> {
        let mut table = BTreeMap::new();
        for unit in units {
            *table.entry(unit.sim_id).or_insert(0) += 1;
        }
        table
    }

    /// Number of run groups under this partitioner's policy.
    #[must_use]
    pub fn sim_count(&self, units: &[WorkUnit]) -> usize {
        let table = Self::frequencies(units);
        match self.sim_count_policy {
            SimCountPolicy::MaxFrequency => table.values().copied().max().unwrap_or(0),
            SimCountPolicy::DistinctIds => table.len(),
        }
    }

    /// Slices `units` into consecutive partitions.
    ///
    /// # Errors
    ///
    /// - `BatchError::Empty` if there are no units.
    /// - `PartitionError::NonExactSplit` if `sim_count` does not divide the
    ///   batch length and the remainder policy is `Reject`.
    pub fn plan<'a>(&self, units: &'a [WorkUnit]) -> DispatchResult<PartitionPlan<'a>> {
        let total_configs = units.len();
        let sim_count = self.sim_count(units);
        if sim_count == 0 {
            return Err(BatchError::Empty.into());
        }

        let chunk_size = match self.remainder {
            RemainderPolicy::Reject => {
                if total_configs % sim_count != 0 {
                    return Err(PartitionError::NonExactSplit {
                        total: total_configs,
                        sim_count,
                    }
                    .into());
                }
                total_configs / sim_count
            }
            RemainderPolicy::ShortTail => total_configs.div_ceil(sim_count),
        };

        let partitions = units
            .chunks(chunk_size)
            .enumerate()
            .map(|(index, chunk)| {
                let lo = index * chunk_size;
                Partition {
                    index,
                    lo,
                    hi: lo + chunk.len(),
                    units: chunk,
                }
            })
            .collect();

        Ok(PartitionPlan {
            total_configs,
            sim_count,
            chunk_size,
            partitions,
        })
    }
}
