//! Criterion benchmarks for sweepsim_core
//!
//! Run with: cargo bench -p sweepsim_core

use criterion::{BenchmarkId, Criterion, black_box, criterion_group, criterion_main};
use serde_json::json;
use sweepsim_core::{
    BoxError, ExecutionOptions, ExecutionScheduler, NoopObserver, ParameterSet, SweepConfig,
    compute_hash, expand_parameter_sets, generate_grid,
};

fn create_config(steps: usize) -> SweepConfig {
    SweepConfig::from_value(json!({
        "system": {"name": "bench", "damping": 0.1},
        "parameters": {
            "temperature": {"start": 0.1, "end": 10.0, "steps": steps},
            "field": {"start": 1e-3, "end": 1e3, "steps": steps, "log_scale": true},
        }
    }))
    .expect("valid bench config")
}

fn oscillator(params: &ParameterSet) -> Result<f64, BoxError> {
    let t = params.get_f64("temperature").unwrap_or_default();
    let h = params.get_f64("field").unwrap_or_default();
    let mut x = 1.0_f64;
    for _ in 0..200 {
        x = (x * t + h).sin();
    }
    Ok(x)
}

fn bench_grid_expansion(c: &mut Criterion) {
    let mut group = c.benchmark_group("grid_expansion");

    for steps in [10, 50, 100].iter() {
        let config = create_config(*steps);
        group.bench_with_input(BenchmarkId::new("steps", steps), steps, |b, _| {
            b.iter(|| {
                let grid = generate_grid(black_box(&config.parameters), 10.0).expect("grid");
                expand_parameter_sets(black_box(&config.system), &grid)
            })
        });
    }

    group.finish();
}

fn bench_config_hash(c: &mut Criterion) {
    let value = create_config(10).to_value();
    c.bench_function("config_hash", |b| {
        b.iter(|| compute_hash(black_box(&value), black_box("bench")))
    });
}

fn bench_scheduler(c: &mut Criterion) {
    let mut group = c.benchmark_group("scheduler");
    let config = create_config(40);
    let grid = generate_grid(&config.parameters, 10.0).expect("grid");
    let sets = expand_parameter_sets(&config.system, &grid);

    let sequential = ExecutionScheduler::new(&ExecutionOptions {
        batch_size: None,
        workers: Some(1),
    });
    group.bench_function("sequential", |b| {
        b.iter(|| sequential.run(black_box(&sets), &oscillator, &NoopObserver))
    });

    let parallel = ExecutionScheduler::default();
    group.bench_function("parallel", |b| {
        b.iter(|| parallel.run(black_box(&sets), &oscillator, &NoopObserver))
    });

    group.finish();
}

criterion_group!(
    benches,
    bench_grid_expansion,
    bench_config_hash,
    bench_scheduler,
);
criterion_main!(benches);
