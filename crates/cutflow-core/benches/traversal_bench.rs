//! # Traversal Benchmarks
//!
//! Performance benchmarks for cutflow-core construction, traversal and the
//! event loop.
//!
//! Run with: `cargo bench -p cutflow-core`

use criterion::{BenchmarkId, Criterion, criterion_group, criterion_main};
use cutflow_core::{
    Analysis, Cut, Cutflow, CutflowError, Edge, Looper, LooperConfig, MemorySink, RecordStore,
    VariableStore,
};
use std::hint::black_box;

/// Create a pass-chain of N cuts; cut `i` passes when `x > i`.
fn create_chain(size: usize) -> Cutflow {
    let mut cutflow = Cutflow::new();
    cutflow.set_root(Cut::always("c0")).expect("root");
    for i in 1..size {
        let threshold = i as f64;
        cutflow
            .insert(
                &format!("c{}", i - 1),
                Cut::new(format!("c{i}"), move |vars, _| {
                    Ok(vars.get::<f64>("x")? > threshold)
                })
                .with_weight(|_, _| Ok(0.999)),
                Edge::Pass,
            )
            .expect("insert");
    }
    cutflow
}

fn stores() -> (VariableStore, RecordStore) {
    let mut vars = VariableStore::new();
    vars.register("x", 0.0).expect("register");
    let mut records = RecordStore::new();
    records.register("x", -1.0).expect("register");
    (vars, records)
}

// =============================================================================
// BENCHMARKS
// =============================================================================

fn bench_construction(c: &mut Criterion) {
    let mut group = c.benchmark_group("construction");

    for size in [10, 100, 1000].iter() {
        group.bench_with_input(BenchmarkId::from_parameter(size), size, |b, &size| {
            b.iter(|| black_box(create_chain(size)));
        });
    }

    group.finish();
}

fn bench_run(c: &mut Criterion) {
    let mut group = c.benchmark_group("run");

    for size in [10, 100, 1000].iter() {
        let mut cutflow = create_chain(*size);
        let (mut vars, mut records) = stores();

        group.bench_with_input(BenchmarkId::new("full_path", size), size, |b, &size| {
            vars.set("x", size as f64).expect("set");
            b.iter(|| black_box(cutflow.run("c0", &mut vars, &mut records)));
        });
    }

    group.finish();
}

fn bench_looper(c: &mut Criterion) {
    let mut group = c.benchmark_group("looper");

    for events in [1_000u32, 10_000].iter() {
        group.bench_with_input(
            BenchmarkId::from_parameter(events),
            events,
            |b, &events| {
                b.iter(|| {
                    let (variables, records) = stores();
                    let mut analysis = Analysis::new(create_chain(20), variables, records);
                    let input = (0..events).map(|i| Ok::<f64, CutflowError>(f64::from(i % 40)));
                    let mut sink = MemorySink::new();
                    black_box(Looper::new(LooperConfig::new("c0")).run(
                        &mut analysis,
                        input,
                        |x, vars, _| vars.set("x", *x),
                        &mut sink,
                    ))
                });
            },
        );
    }

    group.finish();
}

criterion_group!(benches, bench_construction, bench_run, bench_looper);
criterion_main!(benches);
