use criterion::{black_box, criterion_group, criterion_main, BatchSize, Criterion, Throughput};

use simexec::batch::{Batch, RunConfig, WorkUnit};
use simexec::{
    flatten, reference, Executor, ExecutorConfig, Partitioner, ResultRow, ResultTree, StateMap, TimeRange, Value,
};

fn counter_units(count: u32, runs_per_sim: u32) -> Vec<WorkUnit> {
    (0..count)
        .map(|i| {
            WorkUnit::new(reference::COUNTER)
                .initial_state(StateMap::from([("x".to_string(), Value::Int(0))]))
                .run_config(RunConfig::uniform(4, &["x"]))
                .time_range(TimeRange::steps(10))
                .sim_id(i / runs_per_sim)
                .run_count(2)
        })
        .collect()
}

// One group per run, one group per timestep, `width` rows per timestep.
fn nested_tree(runs: usize, timesteps: usize, width: usize) -> ResultTree {
    ResultTree::Group(
        (0..runs)
            .map(|_| {
                ResultTree::Group(
                    (0..timesteps)
                        .map(|_| ResultTree::Group(vec![ResultTree::Row(ResultRow::default()); width]))
                        .collect(),
                )
            })
            .collect(),
    )
}

fn bench_partition(c: &mut Criterion) {
    let units = counter_units(4_096, 64);
    let partitioner = Partitioner::default();

    let mut group = c.benchmark_group("partition");
    group.throughput(Throughput::Elements(units.len() as u64));
    group.bench_function("plan_4096_units", |b| {
        b.iter(|| {
            let plan = partitioner.plan(black_box(&units)).unwrap();
            black_box(plan.partitions.len())
        });
    });
    group.finish();
}

fn bench_flatten(c: &mut Criterion) {
    let tree = nested_tree(16, 256, 4);
    let rows = tree.row_count();

    let mut group = c.benchmark_group("flatten");
    group.throughput(Throughput::Elements(rows as u64));
    group.bench_function("nested_16x256x4", |b| {
        b.iter_batched(|| tree.clone(), |tree| black_box(flatten(tree)), BatchSize::LargeInput);
    });
    group.finish();
}

fn bench_threaded_dispatch(c: &mut Criterion) {
    let executor = Executor::threaded(reference::registry(), ExecutorConfig::default()).unwrap();
    let batch = Batch::new(counter_units(32, 8), 2);
    let expected = batch.expected_rows();

    let mut group = c.benchmark_group("dispatch");
    group.throughput(Throughput::Elements(expected));
    group.sample_size(20);
    group.bench_function("threads_32_units", |b| {
        b.iter(|| {
            let rows = executor.execute_batch(black_box(&batch)).unwrap();
            assert_eq!(rows.len() as u64, expected);
        });
    });
    group.finish();
}

criterion_group!(benches, bench_partition, bench_flatten, bench_threaded_dispatch);
criterion_main!(benches);
