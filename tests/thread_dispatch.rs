use std::time::{Duration, Instant};

use simexec::batch::{Batch, BatchColumns, RunConfig, WorkUnit};
use simexec::{
    reference, BatchError, DispatchError, ExecutionError, Executor, ExecutorConfig, HandlerRegistry, ResultRow,
    ResultTree, RunError, RunRequest, StateMap, TimeRange, Value,
};

fn sleepy(genesis: i64, sleep_ms: i64) -> WorkUnit {
    WorkUnit::new(reference::SLEEPY)
        .param("sleep_ms", sleep_ms)
        .initial_state(StateMap::from([("x".to_string(), Value::Int(genesis))]))
        .run_config(RunConfig::uniform(1, &["x"]))
        .time_range(TimeRange::steps(2))
        .run_count(1)
}

fn threaded(config: ExecutorConfig) -> Executor<simexec::ThreadBackend> {
    Executor::threaded(reference::registry(), config).unwrap()
}

#[test]
fn completion_order_does_not_change_output_order() {
    // Earlier units sleep longer, so partitions complete in reverse.
    let units: Vec<WorkUnit> = (0..4).map(|i| sleepy(i * 100, 120 - i * 40)).collect();
    let batch = Batch::new(units, 1);
    let out = threaded(ExecutorConfig::default()).execute(&batch).unwrap();
    assert_eq!(out.report.partitions, 4);

    let genesis: Vec<&Value> = out
        .rows
        .iter()
        .filter(|row| row.substep == 0)
        .filter_map(|row| row.state.get("x"))
        .collect();
    assert_eq!(
        genesis,
        vec![&Value::Int(0), &Value::Int(100), &Value::Int(200), &Value::Int(300)]
    );
}

#[test]
fn failing_partition_aborts_everything() {
    let units = vec![
        sleepy(0, 3_000),
        sleepy(0, 3_000),
        WorkUnit::new(reference::FAILING).param("reason", "diverged"),
        sleepy(0, 3_000),
    ];
    let started = Instant::now();
    let err = threaded(ExecutorConfig::default())
        .execute_batch(&Batch::new(units, 1))
        .unwrap_err();
    assert!(started.elapsed() < Duration::from_secs(3));

    let DispatchError::Execution(ExecutionError::WorkerFailure { partition, position, handler, message }) = err else {
        panic!("expected WorkerFailure, got {err:?}");
    };
    assert_eq!((partition, position), (2, 2));
    assert_eq!(handler, reference::FAILING);
    assert!(message.contains("diverged"));
}

#[test]
fn deadline_expiry_returns_timeout() {
    let config = ExecutorConfig {
        deadline_ms: Some(100),
        ..ExecutorConfig::default()
    };
    let units = vec![sleepy(0, 10_000), sleepy(0, 10_000)];
    let err = threaded(config).execute_batch(&Batch::new(units, 1)).unwrap_err();
    assert_eq!(err, DispatchError::Execution(ExecutionError::Timeout { duration_ms: 100 }));
    assert!(err.is_retryable());
}

#[test]
fn fast_batch_finishes_within_deadline() {
    let config = ExecutorConfig {
        deadline_ms: Some(10_000),
        ..ExecutorConfig::default()
    };
    let units = vec![sleepy(0, 0), sleepy(1, 0)];
    let rows = threaded(config).execute_batch(&Batch::new(units, 1)).unwrap();
    assert_eq!(rows.len(), 2 * 3);
}

#[test]
fn panicking_handler_is_a_worker_failure() {
    let registry = reference::registry().with("panics", |_: &RunRequest<'_>| -> Result<ResultTree, RunError> {
        panic!("bad state update")
    });
    let executor = Executor::threaded(registry, ExecutorConfig::default()).unwrap();
    let units = vec![WorkUnit::new(reference::COUNTER).initial_state(StateMap::new()), WorkUnit::new("panics")];
    let err = executor.execute_batch(&Batch::new(units, 1)).unwrap_err();
    assert!(err.is_worker_failure());
    assert!(err.to_string().contains("bad state update"));
}

#[test]
fn panicking_single_unit_is_a_worker_failure() {
    let registry = reference::registry().with("panics", |_: &RunRequest<'_>| -> Result<ResultTree, RunError> {
        panic!("bad state update")
    });
    let executor = Executor::threaded(registry, ExecutorConfig::default()).unwrap();
    let batch = Batch::new(vec![WorkUnit::new("panics")], 1);
    assert_eq!(executor.route(&batch), simexec::ExecutionPath::Sequential);

    let err = executor.execute_batch(&batch).unwrap_err();
    let DispatchError::Execution(ExecutionError::WorkerFailure { partition, position, handler, message }) = err else {
        panic!("expected WorkerFailure, got {err:?}");
    };
    assert_eq!((partition, position, handler.as_str()), (0, 0, "panics"));
    assert!(message.contains("bad state update"));
}

#[test]
fn column_length_mismatch_is_an_invalid_batch() {
    let mut columns: BatchColumns = vec![sleepy(0, 0), sleepy(1, 0)].into_iter().collect();
    columns.sim_ids.pop();
    let err = Batch::from_columns(columns).unwrap_err();
    assert_eq!(
        err,
        BatchError::ColumnLengthMismatch {
            column: "sim_ids",
            expected: 2,
            actual: 1,
        }
    );
    assert!(DispatchError::from(err).is_invalid_batch());
}

#[test]
fn handler_sees_unit_fields() {
    let registry = HandlerRegistry::new().with("echo_fields", |request: &RunRequest<'_>| -> Result<ResultTree, RunError> {
        Ok(ResultTree::from(ResultRow {
            experiment: request.experiment_id,
            simulation: request.sim_id,
            subset: request.subset_id,
            run: request.run_count,
            substep: u32::try_from(request.subset_window).unwrap_or(u32::MAX),
            timestep: request.time_range.start,
            state: StateMap::from([(
                "env".to_string(),
                Value::from(request.env_processes.get("x").cloned().unwrap_or_default()),
            )]),
        }))
    });
    let unit = |sim: u32| {
        WorkUnit::new("echo_fields")
            .sim_id(sim)
            .run_count(3)
            .experiment_id(4)
            .subset(5, 6)
            .time_range(TimeRange::new(7, 1))
            .env_process("x", "shock")
    };
    let executor = Executor::threaded(registry, ExecutorConfig::default()).unwrap();
    let rows = executor.execute_batch(&Batch::new(vec![unit(0), unit(1)], 1)).unwrap();
    assert_eq!(rows.len(), 2);
    assert_eq!(rows[1].simulation, 1);
    assert_eq!(
        (rows[0].experiment, rows[0].subset, rows[0].run, rows[0].substep, rows[0].timestep),
        (4, 5, 3, 6, 7)
    );
    assert_eq!(rows[0].state.get("env"), Some(&Value::from("shock")));
}
