//! Benchmarks for nonlinear programming
//!
//! Tests performance of each optimiser refining a perturbed initial guess.

use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion};
use ndarray::{array, Array2, ArrayD};
use num_complex::Complex64;
use rand::rngs::StdRng;
use rand::SeedableRng;

use espy_core::signal::make_noisy_fid;
use espy_core::{ExpInfo, NlpMethod, NlpOptions, NonlinearProgramming};

fn truth() -> Array2<f64> {
    array![
        [1.0, 0.0, -180.0, 4.0],
        [2.0, 0.0, 40.0, 6.0],
        [1.5, 0.0, 220.0, 5.0],
    ]
}

fn create_problem(pts: usize) -> (ExpInfo, ArrayD<Complex64>, Array2<f64>) {
    let expinfo = ExpInfo::new(vec![1000.0], vec![0.0]).unwrap();
    let mut rng = StdRng::seed_from_u64(0);
    let (fid, _) = make_noisy_fid(&truth(), &expinfo, &[pts], 30.0, true, &mut rng).unwrap();
    let mut x0 = truth();
    x0.column_mut(2).mapv_inplace(|f| f + 0.5);
    x0.column_mut(0).mapv_inplace(|a| a * 1.1);
    (expinfo, fid, x0)
}

fn bench_method(c: &mut Criterion, name: &str, method: NlpMethod) {
    let mut group = c.benchmark_group(name);
    let options = NlpOptions {
        method,
        ..NlpOptions::default()
    };

    for pts in [128, 256, 512, 1024].iter() {
        let (expinfo, fid, x0) = create_problem(*pts);
        let id = BenchmarkId::from_parameter(pts);

        group.bench_with_input(id, pts, |b, _| {
            b.iter(|| black_box(NonlinearProgramming::new(&expinfo, &fid, &x0, &options)))
        });
    }

    group.finish();
}

fn bench_gauss_newton(c: &mut Criterion) {
    bench_method(c, "nlp_gauss_newton", NlpMethod::GaussNewton);
}

fn bench_exact(c: &mut Criterion) {
    bench_method(c, "nlp_exact", NlpMethod::Exact);
}

fn bench_lbfgs(c: &mut Criterion) {
    bench_method(c, "nlp_lbfgs", NlpMethod::Lbfgs);
}

criterion_group!(benches, bench_gauss_newton, bench_exact, bench_lbfgs);
criterion_main!(benches);
