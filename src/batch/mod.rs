//! Batches of work units.
//!
//! A work unit is one fully specified simulation run. The configuration layer
//! may hand over its parallel columns as [`BatchColumns`]; they are zipped into
//! [`WorkUnit`] records once, so slicing and partitioning operate on a single
//! array.

pub mod columns;
pub mod unit;

pub use columns::BatchColumns;
pub use unit::{EnvProcesses, HandlerId, RunConfig, SubstepBlock, WorkUnit};

use serde::{Deserialize, Serialize};

use crate::error::BatchError;

/// An immutable batch of work units plus the batch-wide configured N.
///
/// Execution reads a batch but never drains it, so the same batch can be
/// inspected or dispatched again afterwards.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Batch {
    units: Vec<WorkUnit>,
    configured_n: u32,
}

impl Batch {
    /// Creates a batch from work units.
    #[must_use]
    pub fn new(units: Vec<WorkUnit>, configured_n: u32) -> Self {
        Self { units, configured_n }
    }

    /// Zips parallel columns into a batch.
    ///
    /// # Errors
    ///
    /// Returns `BatchError::ColumnLengthMismatch` naming the first column whose
    /// length differs from the handler column.
    pub fn from_columns(columns: BatchColumns) -> Result<Self, BatchError> {
        columns.into_batch()
    }

    /// The work units in input order.
    #[must_use]
    pub fn units(&self) -> &[WorkUnit] {
        &self.units
    }

    /// The batch-wide scalar passed to every run handler.
    #[must_use]
    pub const fn configured_n(&self) -> u32 {
        self.configured_n
    }

    /// Number of run configurations in the batch.
    #[must_use]
    pub fn len(&self) -> usize {
        self.units.len()
    }

    /// Returns true if the batch holds no work units.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.units.is_empty()
    }

    /// The final work unit, selected by index.
    #[must_use]
    pub fn last_unit(&self) -> Option<&WorkUnit> {
        self.units.last()
    }

    /// Checks the batch can be dispatched.
    ///
    /// # Errors
    ///
    /// Returns `BatchError::Empty` for a batch without work units.
    pub fn validate(&self) -> Result<(), BatchError> {
        if self.units.is_empty() {
            return Err(BatchError::Empty);
        }
        Ok(())
    }

    /// Total rows the batch produces when every handler follows the
    /// substep-counting convention: one initial row per run plus one row per
    /// run, timestep and substep block. Saturates at `u64::MAX`.
    #[must_use]
    pub fn expected_rows(&self) -> u64 {
        self.units
            .iter()
            .map(WorkUnit::expected_rows)
            .fold(0, u64::saturating_add)
    }
}
