//! Benchmarks for the Matrix Pencil Method
//!
//! Tests performance of 1D estimation with fixed and MDL-selected model
//! orders, and of 2D estimation.

use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion};
use ndarray::{array, Array2, ArrayD};
use num_complex::Complex64;
use rand::rngs::StdRng;
use rand::SeedableRng;

use espy_core::signal::{make_fid, make_noisy_fid};
use espy_core::{ExpInfo, MatrixPencil};

fn three_oscillators() -> Array2<f64> {
    array![
        [1.0, 0.0, -250.0, 5.0],
        [2.0, 0.5, 40.0, 5.0],
        [1.0, -0.5, 300.0, 5.0],
    ]
}

/// Noisy 1D signal with three oscillators (30 dB)
fn create_signal(pts: usize) -> (ExpInfo, ArrayD<Complex64>) {
    let expinfo = ExpInfo::new(vec![1000.0], vec![0.0]).unwrap();
    let mut rng = StdRng::seed_from_u64(0);
    let (fid, _) = make_noisy_fid(&three_oscillators(), &expinfo, &[pts], 30.0, true, &mut rng).unwrap();
    (expinfo, fid)
}

fn bench_mpm_fixed_order(c: &mut Criterion) {
    let mut group = c.benchmark_group("mpm_fixed_order");

    for pts in [64, 128, 256, 512].iter() {
        let (expinfo, fid) = create_signal(*pts);
        let id = BenchmarkId::from_parameter(pts);

        group.bench_with_input(id, pts, |b, _| {
            b.iter(|| black_box(MatrixPencil::new(&expinfo, &fid, Some(3))))
        });
    }

    group.finish();
}

fn bench_mpm_mdl(c: &mut Criterion) {
    let mut group = c.benchmark_group("mpm_mdl");

    for pts in [64, 128, 256, 512].iter() {
        let (expinfo, fid) = create_signal(*pts);
        let id = BenchmarkId::from_parameter(pts);

        group.bench_with_input(id, pts, |b, _| {
            b.iter(|| black_box(MatrixPencil::new(&expinfo, &fid, None)))
        });
    }

    group.finish();
}

fn bench_mpm_2d(c: &mut Criterion) {
    let mut group = c.benchmark_group("mpm_2d");
    let expinfo = ExpInfo::new(vec![40.0, 500.0], vec![0.0, 0.0]).unwrap();
    let params = array![
        [1.0, 0.0, 5.0, 100.0, 2.0, 6.0],
        [2.0, 0.5, -8.0, -60.0, 3.0, 4.0],
    ];

    for pts in [8, 16, 24].iter() {
        let (fid, _) = make_fid(&params, &expinfo, &[*pts, 2 * *pts]).unwrap();
        let id = BenchmarkId::from_parameter(pts);

        group.bench_with_input(id, pts, |b, _| {
            b.iter(|| black_box(MatrixPencil::new(&expinfo, &fid, Some(2))))
        });
    }

    group.finish();
}

criterion_group!(benches, bench_mpm_fixed_order, bench_mpm_mdl, bench_mpm_2d);
criterion_main!(benches);
