//! Execution metadata returned alongside rows.

use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::result::ResultRow;

/// Identifies one execution.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct SessionId(uuid::Uuid);

impl SessionId {
    /// Creates a new random session ID.
    #[must_use]
    pub fn new() -> Self {
        Self(uuid::Uuid::new_v4())
    }

    /// The underlying UUID.
    #[must_use]
    pub const fn as_uuid(&self) -> &uuid::Uuid {
        &self.0
    }
}

impl Default for SessionId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for SessionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Execution path selected by the router.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ExecutionPath {
    /// One unit, run in the calling thread.
    Sequential,
    /// Several units, partitioned and dispatched to a pool.
    Parallel,
}

impl ExecutionPath {
    /// Mode name used in logs.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Sequential => "single_proc",
            Self::Parallel => "multi_proc",
        }
    }
}

impl fmt::Display for ExecutionPath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// What happened during one execution.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExecutionReport {
    /// Identifier of this execution.
    pub session_id: SessionId,
    /// Route the batch took.
    pub path: ExecutionPath,
    /// Backend label, or `inline` when no pool was used.
    pub backend: String,
    /// Number of partitions dispatched; 1 on the sequential path.
    pub partitions: usize,
    /// Concurrent workers used.
    pub pool_size: usize,
    /// Distinct simulations in the batch.
    pub sim_count: usize,
    /// Work units per partition.
    pub chunk_size: usize,
    /// Flattened rows returned.
    pub rows: usize,
    /// Wall-clock start.
    pub started_at: DateTime<Utc>,
    /// Wall-clock duration in milliseconds.
    pub elapsed_ms: u64,
}

/// Flattened rows plus the report describing how they were produced.
#[derive(Debug, Clone, PartialEq)]
pub struct BatchOutput {
    /// Flattened rows in input order.
    pub rows: Vec<ResultRow>,
    /// How the rows were produced.
    pub report: ExecutionReport,
}
