//! Worker wire protocol.
//!
//! A worker process reads one JSON [`PartitionJob`] from stdin and writes one
//! JSON [`WorkerReply`] to stdout. This module centralizes the encoding so both
//! sides agree on it.

use serde::{Deserialize, Serialize};

use crate::error::{DispatchError, DispatchResult, ExecutionError};
use crate::partition::PartitionJob;
use crate::result::ResultTree;

/// The single message a worker sends back.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum WorkerReply {
    /// Every unit succeeded; one tree per unit in order.
    Ok {
        /// Partition index.
        partition: usize,
        /// One tree per unit.
        results: Vec<ResultTree>,
    },
    /// A unit failed; no results are returned.
    Failed {
        /// Partition index.
        partition: usize,
        /// Batch position of the failing unit.
        position: usize,
        /// Handler of the failing unit.
        handler: String,
        /// Failure description.
        message: String,
    },
}

impl WorkerReply {
    /// Wraps the outcome of running partition `partition`.
    #[must_use]
    pub fn from_outcome(partition: usize, outcome: Result<Vec<ResultTree>, ExecutionError>) -> Self {
        match outcome {
            Ok(results) => Self::Ok { partition, results },
            Err(ExecutionError::WorkerFailure {
                position,
                handler,
                message,
                ..
            }) => Self::Failed {
                partition,
                position,
                handler,
                message,
            },
            Err(other) => Self::Failed {
                partition,
                position: 0,
                handler: String::new(),
                message: other.to_string(),
            },
        }
    }

    /// Partition index the reply belongs to.
    #[must_use]
    pub const fn partition(&self) -> usize {
        match self {
            Self::Ok { partition, .. } | Self::Failed { partition, .. } => *partition,
        }
    }

    /// Converts the reply back into the outcome it carries.
    ///
    /// # Errors
    ///
    /// Returns `ExecutionError::WorkerFailure` for a failed reply.
    pub fn into_result(self) -> Result<Vec<ResultTree>, ExecutionError> {
        match self {
            Self::Ok { results, .. } => Ok(results),
            Self::Failed {
                partition,
                position,
                handler,
                message,
            } => Err(ExecutionError::WorkerFailure {
                partition,
                position,
                handler,
                message,
            }),
        }
    }
}

/// Serialize a job for a worker's stdin.
///
/// # Errors
///
/// Returns `ExecutionError::Protocol` if serialization fails.
pub fn encode_job(job: &PartitionJob) -> Result<Vec<u8>, ExecutionError> {
    serde_json::to_vec(job).map_err(|e| ExecutionError::Protocol {
        partition: job.index,
        message: format!("serialize job: {e}"),
    })
}

/// Deserialize a job read by a worker.
///
/// # Errors
///
/// Returns `DispatchError::Internal` if the bytes are not a job.
pub fn decode_job(bytes: &[u8]) -> DispatchResult<PartitionJob> {
    serde_json::from_slice(bytes).map_err(|e| DispatchError::internal(format!("deserialize job: {e}")))
}

/// Serialize a reply for a worker's stdout.
///
/// # Errors
///
/// Returns `DispatchError::Internal` if serialization fails.
pub fn encode_reply(reply: &WorkerReply) -> DispatchResult<Vec<u8>> {
    serde_json::to_vec(reply).map_err(|e| DispatchError::internal(format!("serialize reply: {e}")))
}

/// Deserialize the reply of the worker running `partition`.
///
/// # Errors
///
/// Returns `ExecutionError::Protocol` if the bytes are empty, malformed, or
/// answer a different partition.
pub fn decode_reply(partition: usize, bytes: &[u8]) -> Result<WorkerReply, ExecutionError> {
    if bytes.iter().all(u8::is_ascii_whitespace) {
        return Err(ExecutionError::Protocol {
            partition,
            message: "worker exited without a reply".to_string(),
        });
    }
    let reply: WorkerReply = serde_json::from_slice(bytes).map_err(|e| ExecutionError::Protocol {
        partition,
        message: format!("deserialize reply: {e}"),
    })?;
    if reply.partition() != partition {
        return Err(ExecutionError::Protocol {
            partition,
            message: format!("reply is for partition {}", reply.partition()),
        });
    }
    Ok(reply)
}
