//! # simexec - Execution dispatch for batched simulation runs
//!
//! simexec takes a batch of fully specified simulation runs and executes them,
//! either directly (one run) or partitioned across a pool of workers (several
//! runs), returning one flat, ordered list of result rows.
//!
//! ## Core Concepts
//!
//! - **WorkUnit**: One simulation run: handler id, parameters, initial states,
//!   substep blocks, time range and identifiers
//! - **Batch**: The ordered work units of one execution plus the configured N
//! - **Partitioner**: Splits a batch into equal, contiguous partitions
//! - **Executor**: Routes a batch to the sequential or parallel path
//! - **RunHandler**: The opaque callable that executes one work unit
//!
//! ## Usage
//!
//! ```rust
//! use simexec::batch::{Batch, RunConfig, WorkUnit};
//! use simexec::{reference, Executor, ExecutorConfig, StateMap, TimeRange, Value};
//!
//! let unit = WorkUnit::new(reference::COUNTER)
//!     .initial_state(StateMap::from([("x".to_string(), Value::Int(0))]))
//!     .run_config(RunConfig::uniform(2, &["x"]))
//!     .time_range(TimeRange::steps(3))
//!     .run_count(2);
//!
//! let executor = Executor::threaded(reference::registry(), ExecutorConfig::default())?;
//! let rows = executor.execute_batch(&Batch::new(vec![unit], 1))?;
//! assert_eq!(rows.len(), 14);
//! # Ok::<(), simexec::DispatchError>(())
//! ```
//!
//! Flattening is available on its own:
//!
//! ```rust
//! use simexec::{flatten, ResultRow, ResultTree};
//!
//! let tree = ResultTree::Group(vec![
//!     ResultTree::Row(ResultRow::default()),
//!     ResultTree::Group(vec![ResultTree::Row(ResultRow::default())]),
//! ]);
//! assert_eq!(flatten(tree).len(), 2);
//! ```

#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]
#![allow(clippy::module_name_repetitions)]

// Core types
pub mod batch;
pub mod error;
pub mod result;
pub mod time;
pub mod value;

// Dispatch
pub mod config;
pub mod engine;
pub mod flatten;
pub mod handler;
pub mod partition;
pub mod worker;

// Built-in handlers
pub mod reference;

// Re-export primary types at crate root for convenience
pub use batch::{Batch, BatchColumns, HandlerId, RunConfig, WorkUnit};
pub use config::{ExecutorConfig, PoolSizing};
pub use engine::{
    BatchOutput, ExecutionPath, ExecutionReport, Executor, ParallelDispatcher, PartitionBackend, ProcessBackend,
    SessionId, ThreadBackend,
};
pub use error::{BatchError, DispatchError, DispatchResult, ExecutionError, PartitionError, RunError};
pub use flatten::{flatten, flatten_all};
pub use handler::{CancelToken, HandlerRegistry, RunHandler, RunRequest};
pub use partition::{Partition, PartitionPlan, Partitioner, RemainderPolicy, SimCountPolicy};
pub use result::{ResultRow, ResultTree};
pub use time::TimeRange;
pub use value::{ParamSet, StateMap, Value};
