//! Single-unit execution without a pool.

use crate::batch::Batch;
use crate::error::{BatchError, DispatchResult};
use crate::flatten::flatten;
use crate::handler::{CancelToken, HandlerRegistry};
use crate::result::ResultRow;

/// Runs the final work unit of `batch` in the calling thread.
///
/// The batch is only read; the unit is selected by index.
///
/// # Errors
///
/// - `BatchError::Empty` if the batch has no units.
/// - `ExecutionError::WorkerFailure` at partition 0 if the handler is unknown
///   or fails.
pub fn run_sequential(registry: &HandlerRegistry, batch: &Batch, cancel: &CancelToken) -> DispatchResult<Vec<ResultRow>> {
    let unit = batch.last_unit().ok_or(BatchError::Empty)?;
    let position = batch.len() - 1;
    tracing::debug!(position, handler = %unit.handler, "Running unit sequentially");
    let tree = registry.invoke(unit, batch.configured_n(), cancel, 0, position)?;
    Ok(flatten(tree))
}
