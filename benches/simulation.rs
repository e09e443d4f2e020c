//! Criterion benchmarks for the brains simulation.
//!
//! Run with:
//!   cargo bench
//!   cargo bench --features parallel
//!
//! Results are saved to target/criterion/

use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion, Throughput};

use brains::prelude::*;

fn make_sim(input_width: usize, hidden: usize, tier: ExecutionTier, warp: bool) -> Simulation {
    let layers = [
        LayerDefinition::new("a", input_width * input_width, CellType::Excitatory).as_input(),
        LayerDefinition::new("b", hidden, CellType::Excitatory)
            .with_layout(Layout::Line)
            .with_target_fire_rate(1.0)
            .with_output_balance(true),
        LayerDefinition::new("c", 2, CellType::Excitatory)
            .with_layout(Layout::Line)
            .as_output()
            .with_target_fire_rate(0.5),
    ];
    let connections = [
        LayerConnection::new("a", "b", 0.2, 0.02),
        LayerConnection::new("b", "c", 1.0, 0.1),
    ];
    let mut params = ModelParameters::handwriting(100, 0).with_seed(42).with_warp(warp);
    params.execution_tier = tier;
    Simulation::new(params, NetworkDefinition::from_layers(&layers, &connections, 42)).unwrap()
}

fn pulse(width: usize) -> Vec<Stimulus> {
    (0..width as i32).map(|x| Stimulus::new(x, x, 0.3)).collect()
}

/// Benchmark step() with varying network sizes.
fn bench_step_sizes(c: &mut Criterion) {
    let mut group = c.benchmark_group("step_size");

    for width in [8usize, 16, 28].iter() {
        let cells = width * width + 32 + 2;
        group.throughput(Throughput::Elements(cells as u64));

        group.bench_with_input(BenchmarkId::new("scalar", width), width, |b, &width| {
            let mut sim = make_sim(width, 32, ExecutionTier::Scalar, false);
            let stimuli = pulse(width);
            let mut step = 0u64;

            b.iter(|| {
                let input: &[Stimulus] = if step % 100 == 0 { &stimuli } else { &[] };
                let fired = sim.step(step, input, step % 100 == 50, true);
                step += 1;
                black_box(fired.len())
            });
        });
    }

    group.finish();
}

/// Benchmark step() comparing execution tiers at a fixed size.
fn bench_step_tiers(c: &mut Criterion) {
    let mut group = c.benchmark_group("step_tier");

    let width = 28;
    group.throughput(Throughput::Elements((width * width + 34) as u64));

    for (name, tier) in [("scalar_784", ExecutionTier::Scalar), ("parallel_784", ExecutionTier::Parallel)] {
        // Parallel falls back to scalar if the feature is not enabled.
        group.bench_function(name, |b| {
            let mut sim = make_sim(width, 32, tier, false);
            let stimuli = pulse(width);
            let mut step = 0u64;

            b.iter(|| {
                let input: &[Stimulus] = if step % 100 == 0 { &stimuli } else { &[] };
                let fired = sim.step(step, input, false, true);
                step += 1;
                black_box(fired.len())
            });
        });
    }

    group.finish();
}

/// Benchmark a mostly idle epoch with and without warp.
fn bench_warp(c: &mut Criterion) {
    let mut group = c.benchmark_group("warp");

    for warp in [false, true] {
        let name = if warp { "warp" } else { "naive" };
        group.bench_function(name, |b| {
            let mut sim = make_sim(16, 32, ExecutionTier::Scalar, warp);
            let stimuli = pulse(16);
            let mut step = 0u64;

            b.iter(|| {
                for _ in 0..100 {
                    let pulse_now = step % 100 == 0;
                    let input: &[Stimulus] = if pulse_now { &stimuli } else { &[] };
                    sim.step(step, input, false, pulse_now);
                    step += 1;
                }
                black_box(sim.dopamine())
            });
        });
    }

    group.finish();
}

/// Benchmark serialization round-trip.
fn bench_serialization(c: &mut Criterion) {
    let mut group = c.benchmark_group("serialization");

    for width in [8usize, 16, 28].iter() {
        group.bench_with_input(BenchmarkId::new("save", width), width, |b, &width| {
            let sim = make_sim(width, 32, ExecutionTier::Scalar, false);
            let mut buf = Vec::with_capacity(64 * 1024);

            b.iter(|| {
                buf.clear();
                sim.save_image_to(&mut buf).unwrap();
                black_box(buf.len())
            });
        });

        group.bench_with_input(BenchmarkId::new("load", width), width, |b, &width| {
            let sim = make_sim(width, 32, ExecutionTier::Scalar, false);
            let mut buf = Vec::new();
            sim.save_image_to(&mut buf).unwrap();

            b.iter(|| {
                let mut cursor = std::io::Cursor::new(&buf);
                let loaded = Simulation::load_image_from(&mut cursor).unwrap();
                black_box(loaded.cells().len())
            });
        });
    }

    group.finish();
}

criterion_group!(benches, bench_step_sizes, bench_step_tiers, bench_warp, bench_serialization);

criterion_main!(benches);
