//! Deterministic reference run handlers.
//!
//! These handlers stand in for real step pipelines in the bundled worker
//! binary, the integration tests and the benchmarks. They follow the
//! substep-counting convention: each run yields its initial state, then one
//! row per timestep and substep block.

use std::thread;
use std::time::{Duration, Instant};

use crate::error::RunError;
use crate::handler::{HandlerRegistry, RunRequest};
use crate::result::{ResultRow, ResultTree};
use crate::value::{StateMap, Value};

/// Handler id of [`counter`].
pub const COUNTER: &str = "counter";
/// Handler id of [`sleepy`].
pub const SLEEPY: &str = "sleepy";
/// Handler id of [`failing`].
pub const FAILING: &str = "failing";

const SLEEP_SLICE: Duration = Duration::from_millis(5);

// Upper bound on eager allocation; longer runs grow on demand.
const PREALLOC_LIMIT: usize = 1024;

fn capacity(n: u64) -> usize {
    usize::try_from(n).map_or(PREALLOC_LIMIT, |n| n.min(PREALLOC_LIMIT))
}

/// A registry holding every reference handler.
#[must_use]
pub fn registry() -> HandlerRegistry {
    let mut registry = HandlerRegistry::new();
    register(&mut registry);
    registry
}

/// Adds the reference handlers to `registry`.
pub fn register(registry: &mut HandlerRegistry) {
    registry
        .register(COUNTER, counter)
        .register(SLEEPY, sleepy)
        .register(FAILING, failing);
}

fn row(request: &RunRequest<'_>, run: u32, substep: u32, timestep: u64, state: &StateMap) -> ResultTree {
    ResultTree::Row(ResultRow {
        experiment: request.experiment_id,
        simulation: request.sim_id,
        subset: request.subset_id,
        run,
        substep,
        timestep,
        state: state.clone(),
    })
}

/// Adds the `increment` parameter (default 1) to every state variable a
/// substep block updates.
///
/// Output nesting: one group per run holding the initial row followed by one
/// group per timestep of substep rows. Policies and environment processes are
/// not interpreted.
///
/// # Errors
///
/// - `RunError::MissingInitialState` if the unit has no initial state.
/// - `RunError::Cancelled` if the cancel token fires between timesteps.
pub fn counter(request: &RunRequest<'_>) -> Result<ResultTree, RunError> {
    let genesis = request
        .initial_states
        .last()
        .ok_or(RunError::MissingInitialState)?;
    let increment = request
        .params
        .get("increment")
        .cloned()
        .unwrap_or(Value::Int(1));
    let blocks = request.run_config.blocks();

    let mut runs = Vec::with_capacity(capacity(u64::from(request.run_count)));
    for run in 1..=request.run_count {
        let mut state = genesis.clone();
        let mut rows = Vec::with_capacity(capacity(request.time_range.len().saturating_add(1)));
        rows.push(row(request, run, 0, request.time_range.start, &state));

        for timestep in request.time_range.iter() {
            request.cancel.check()?;
            let mut substeps = Vec::with_capacity(blocks.len());
            for (i, block) in blocks.iter().enumerate() {
                for variable in &block.state_updates {
                    let current = state.get(variable).cloned().unwrap_or(Value::Int(0));
                    state.insert(variable.clone(), current.add(&increment));
                }
                let substep = u32::try_from(i + 1).unwrap_or(u32::MAX);
                substeps.push(row(request, run, substep, timestep.saturating_add(1), &state));
            }
            rows.push(ResultTree::Group(substeps));
        }
        runs.push(ResultTree::Group(rows));
    }
    Ok(ResultTree::Group(runs))
}

/// Sleeps for the `sleep_ms` parameter, then behaves like [`counter`].
///
/// The sleep is sliced so cancellation is observed within a few milliseconds.
///
/// # Errors
///
/// Returns `RunError::Cancelled` if cancelled while sleeping, otherwise the
/// errors of [`counter`].
pub fn sleepy(request: &RunRequest<'_>) -> Result<ResultTree, RunError> {
    let millis = request
        .params
        .get("sleep_ms")
        .and_then(Value::as_int)
        .and_then(|v| u64::try_from(v).ok())
        .unwrap_or(0);
    let until = Instant::now() + Duration::from_millis(millis);
    loop {
        request.cancel.check()?;
        let now = Instant::now();
        if now >= until {
            break;
        }
        thread::sleep(SLEEP_SLICE.min(until - now));
    }
    counter(request)
}

/// Always fails, with the `reason` parameter as message when present.
///
/// # Errors
///
/// Always returns `RunError::Failed`.
pub fn failing(request: &RunRequest<'_>) -> Result<ResultTree, RunError> {
    let reason = request
        .params
        .get("reason")
        .and_then(Value::as_string)
        .unwrap_or("failure requested");
    Err(RunError::failed(reason))
}
