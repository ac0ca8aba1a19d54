//! Error types for simexec.
//!
//! All errors are strongly typed using thiserror. A dispatch either returns the
//! complete flattened output or exactly one of these errors describing the
//! first failure encountered.

use thiserror::Error;

/// Errors raised while validating a batch before any work is dispatched.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum BatchError {
    /// The batch has no work units.
    #[error("Batch contains no work units")]
    Empty,

    /// A metadata column disagrees with the handler column in length.
    #[error("Column '{column}' has {actual} entries, expected {expected}")]
    ColumnLengthMismatch {
        /// Name of the offending column.
        column: &'static str,
        /// Length of the handler column.
        expected: usize,
        /// Length of the offending column.
        actual: usize,
    },

    /// A work unit names a handler the registry does not know.
    #[error("Work unit {position} references unregistered handler '{handler}'")]
    UnknownHandler {
        /// Batch position of the unit.
        position: usize,
        /// Handler it names.
        handler: String,
    },
}

/// Errors raised while forming equal-size partitions.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum PartitionError {
    /// The unit count is not a multiple of the simulation count.
    #[error("Cannot split {total} work units into {sim_count} equal partitions")]
    NonExactSplit {
        /// Work units in the batch.
        total: usize,
        /// Distinct simulations in the batch.
        sim_count: usize,
    },
}

/// Errors raised while executing partitions.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ExecutionError {
    /// A run handler failed or panicked.
    #[error("Worker failed in partition {partition} at unit {position} (handler '{handler}'): {message}")]
    WorkerFailure {
        /// Partition index; 0 on the sequential path.
        partition: usize,
        /// Batch position of the failing unit.
        position: usize,
        /// Handler of the failing unit.
        handler: String,
        /// Failure description.
        message: String,
    },

    /// The dispatch deadline expired.
    #[error("Dispatch timed out after {duration_ms}ms")]
    Timeout {
        /// Configured deadline.
        duration_ms: u64,
    },

    /// A worker thread or process could not be started.
    #[error("Failed to spawn worker '{program}': {message}")]
    Spawn {
        /// Program or thread name.
        program: String,
        /// OS error.
        message: String,
    },

    /// A worker reply could not be decoded.
    #[error("Worker protocol error in partition {partition}: {message}")]
    Protocol {
        /// Partition index.
        partition: usize,
        /// Decode error.
        message: String,
    },

    /// A worker's output stream broke before its reply arrived.
    #[error("Worker for partition {partition} disconnected")]
    Disconnected {
        /// Partition index.
        partition: usize,
    },
}

/// Errors returned by run handlers.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum RunError {
    /// Handler-specific failure.
    #[error("{message}")]
    Failed {
        /// Failure description.
        message: String,
    },

    /// The cancel token fired.
    #[error("Run cancelled")]
    Cancelled,

    /// The unit carries no initial state.
    #[error("Initial states are empty")]
    MissingInitialState,
}

impl RunError {
    /// Creates a generic handler failure.
    #[must_use]
    pub fn failed(message: impl Into<String>) -> Self {
        Self::Failed {
            message: message.into(),
        }
    }
}

/// Top-level error type for simexec.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum DispatchError {
    /// The batch was rejected before dispatch.
    #[error("Invalid batch: {0}")]
    Batch(#[from] BatchError),

    /// The batch could not be partitioned.
    #[error("Partition error: {0}")]
    Partition(#[from] PartitionError),

    /// A partition failed during execution.
    #[error("Execution error: {0}")]
    Execution(#[from] ExecutionError),

    /// Executor configuration is unusable.
    #[error("Invalid configuration: {reason}")]
    InvalidConfig {
        /// What is wrong.
        reason: String,
    },

    /// An invariant of the dispatcher was broken.
    #[error("Internal error: {message}")]
    Internal {
        /// What went wrong.
        message: String,
    },
}

impl DispatchError {
    /// Creates an internal error.
    #[must_use]
    pub fn internal(message: impl Into<String>) -> Self {
        Self::Internal {
            message: message.into(),
        }
    }

    /// Creates a configuration error.
    #[must_use]
    pub fn invalid_config(reason: impl Into<String>) -> Self {
        Self::InvalidConfig {
            reason: reason.into(),
        }
    }

    /// Returns true if the batch was rejected before dispatch.
    #[must_use]
    pub const fn is_invalid_batch(&self) -> bool {
        matches!(self, Self::Batch(_))
    }

    /// Returns true if partitioning failed.
    #[must_use]
    pub const fn is_partition(&self) -> bool {
        matches!(self, Self::Partition(_))
    }

    /// Returns true if a run handler reported a failure.
    #[must_use]
    pub const fn is_worker_failure(&self) -> bool {
        matches!(self, Self::Execution(ExecutionError::WorkerFailure { .. }))
    }

    /// Returns true if the dispatch deadline expired.
    #[must_use]
    pub const fn is_timeout(&self) -> bool {
        matches!(self, Self::Execution(ExecutionError::Timeout { .. }))
    }

    /// Returns true if re-running the same batch may succeed.
    ///
    /// The dispatcher itself never retries.
    #[must_use]
    pub const fn is_retryable(&self) -> bool {
        match self {
            Self::Execution(e) => matches!(
                e,
                ExecutionError::Timeout { .. }
                    | ExecutionError::Spawn { .. }
                    | ExecutionError::Disconnected { .. }
            ),
            Self::Batch(_) | Self::Partition(_) | Self::InvalidConfig { .. } | Self::Internal { .. } => false,
        }
    }
}

/// Result type alias for dispatch operations.
pub type DispatchResult<T> = Result<T, DispatchError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_column_mismatch_message() {
        let err = BatchError::ColumnLengthMismatch {
            column: "sim_ids",
            expected: 3,
            actual: 2,
        };
        let msg = format!("{err}");
        assert!(msg.contains("sim_ids"));
        assert!(msg.contains('3'));
        assert!(msg.contains('2'));
    }

    #[test]
    fn test_non_exact_split_message() {
        let err = PartitionError::NonExactSplit { total: 5, sim_count: 2 };
        let msg = format!("{err}");
        assert!(msg.contains("5 work units"));
        assert!(msg.contains("2 equal"));
    }

    #[test]
    fn test_worker_failure_is_not_retryable() {
        let err: DispatchError = ExecutionError::WorkerFailure {
            partition: 1,
            position: 4,
            handler: "counter".to_string(),
            message: "boom".to_string(),
        }
        .into();
        assert!(err.is_worker_failure());
        assert!(!err.is_retryable());
        assert!(format!("{err}").contains("boom"));
    }

    #[test]
    fn test_timeout_is_retryable() {
        let err: DispatchError = ExecutionError::Timeout { duration_ms: 250 }.into();
        assert!(err.is_timeout());
        assert!(err.is_retryable());
        assert!(format!("{err}").contains("250ms"));
    }

    #[test]
    fn test_batch_errors_classify() {
        let err: DispatchError = BatchError::Empty.into();
        assert!(err.is_invalid_batch());
        assert!(!err.is_partition());
        assert!(!err.is_retryable());
    }

    #[test]
    fn test_internal_error() {
        let err = DispatchError::internal("slot left empty");
        assert!(!err.is_retryable());
        assert!(format!("{err}").contains("slot left empty"));
    }
}
