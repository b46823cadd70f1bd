//! Benchmark: CG vector kernels and a full solve per execution space
//!
//! Run with:
//!   cargo bench -p math-cg --bench cg_kernels
//!
//! Thread scaling of the threaded space:
//!   RAYON_NUM_THREADS=1 cargo bench -p math-cg --bench cg_kernels -- threaded
//!   RAYON_NUM_THREADS=4 cargo bench -p math-cg --bench cg_kernels -- threaded

use criterion::{BenchmarkId, Criterion, Throughput, black_box, criterion_group, criterion_main};
use math_cg::problem::{Grid, poisson_3d, poisson_rhs};
use math_cg::{
    CgConfig, DistVector, ExecContext, ExecutionSpace, Serial, SingleProcess, WorkGroup, cg, dot,
    waxpby,
};
use std::time::Duration;

fn vector(n: usize, seed: usize) -> DistVector<f64> {
    let coefs = (0..n)
        .map(|i| ((i * 7919 + seed) % 1000) as f64 / 1000.0 - 0.5)
        .collect();
    DistVector::from_vec(0, coefs)
}

fn bench_space<E: ExecutionSpace>(c: &mut Criterion, name: &str, space: E) {
    let ctx = ExecContext::new(space, SingleProcess);

    let mut group = c.benchmark_group(format!("kernels_{name}"));
    group.warm_up_time(Duration::from_secs(1));
    group.measurement_time(Duration::from_secs(3));

    for &n in &[1_000, 100_000, 1_000_000] {
        let x = vector(n, 1);
        let y = vector(n, 2);
        let mut w = DistVector::new(0, n);
        group.throughput(Throughput::Elements(n as u64));

        group.bench_with_input(BenchmarkId::new("dot", n), &n, |b, _| {
            b.iter(|| black_box(dot(&ctx, &x, &y)))
        });
        group.bench_with_input(BenchmarkId::new("waxpby", n), &n, |b, _| {
            b.iter(|| {
                let _ = waxpby(&ctx, 2.0, &x, -0.5, &y, &mut w);
                black_box(w.coefs[0])
            })
        });
    }
    group.finish();

    let mut group = c.benchmark_group(format!("cg_{name}"));
    group.sample_size(10);
    for &n in &[10, 20] {
        let grid = Grid::new(n, n, n);
        let Ok(mut a) = poisson_3d(&grid, 0, grid.len()) else {
            continue;
        };
        if a.make_local_matrix(&SingleProcess).is_err() {
            continue;
        }
        let Ok(b) = poisson_rhs(&grid, 0, grid.len()) else {
            continue;
        };
        let config = CgConfig {
            max_iterations: 50,
            print_interval: Some(0),
            ..CgConfig::default()
        };
        group.throughput(Throughput::Elements(grid.len() as u64));

        group.bench_with_input(BenchmarkId::new("poisson_50_iters", n), &n, |bench, _| {
            bench.iter(|| {
                let mut x = DistVector::new(0, grid.len());
                black_box(cg(&ctx, &a, &b, &mut x, &config).map(|r| r.residual))
            })
        });
    }
    group.finish();
}

fn bench_serial(c: &mut Criterion) {
    bench_space(c, "serial", Serial);
}

fn bench_work_group(c: &mut Criterion) {
    bench_space(c, "work_group", WorkGroup::default());
}

#[cfg(feature = "rayon")]
fn bench_threaded(c: &mut Criterion) {
    bench_space(c, "threaded", math_cg::Threaded::new());
}

#[cfg(not(feature = "rayon"))]
fn bench_threaded(_c: &mut Criterion) {}

criterion_group!(benches, bench_serial, bench_threaded, bench_work_group);
criterion_main!(benches);
