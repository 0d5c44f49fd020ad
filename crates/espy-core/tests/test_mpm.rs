//! Integration tests for the Matrix Pencil Method

use approx::assert_relative_eq;
use ndarray::{array, ArrayD, IxDyn};
use num_complex::Complex64;
use rand::rngs::StdRng;
use rand::SeedableRng;

use espy_core::mpm::sort_by_frequency;
use espy_core::signal::{make_fid, make_noisy_fid};
use espy_core::{ExpInfo, MatrixPencil};

#[test]
fn test_three_oscillators_noiseless() {
    let expinfo = ExpInfo::new(vec![1000.0], vec![50.0]).unwrap();
    let truth = array![
        [1.0, 0.0, -200.0, 4.0],
        [2.5, 0.8, 75.0, 6.0],
        [0.7, -1.4, 310.0, 3.0],
    ];
    let (fid, _) = make_fid(&truth, &expinfo, &[200]).unwrap();
    let mpm = MatrixPencil::new(&expinfo, &fid, Some(3)).unwrap();
    let est = mpm.get_params().unwrap();
    assert_eq!(est.dim(), (3, 4));
    for (e, t) in est.iter().zip(truth.iter()) {
        assert_relative_eq!(*e, *t, epsilon = 1e-6, max_relative = 1e-3);
    }
}

#[test]
fn test_mdl_selects_oscillator_count_in_noise() {
    let expinfo = ExpInfo::new(vec![1000.0], vec![0.0]).unwrap();
    let truth = array![
        [1.0, 0.0, -250.0, 5.0],
        [1.0, 0.5, 20.0, 5.0],
        [1.0, -0.5, 300.0, 5.0],
    ];
    let mut rng = StdRng::seed_from_u64(7);
    let (fid, _) = make_noisy_fid(&truth, &expinfo, &[256], 35.0, true, &mut rng).unwrap();
    let mpm = MatrixPencil::new(&expinfo, &fid, None).unwrap();
    assert_eq!(mpm.oscillators(), 3);

    let est = mpm.get_params().unwrap();
    for (row, expected) in est.rows().into_iter().zip([-250.0, 20.0, 300.0]) {
        assert_relative_eq!(row[2], expected, epsilon = 0.5);
        assert_relative_eq!(row[0], 1.0, max_relative = 0.1);
    }
}

#[test]
fn test_mdl_on_pure_noise_finds_nothing() {
    let expinfo = ExpInfo::new(vec![1000.0], vec![0.0]).unwrap();
    let mut rng = StdRng::seed_from_u64(3);
    let normal = rand_distr::Normal::new(0.0, 1.0).unwrap();
    let noise = ArrayD::from_shape_fn(IxDyn(&[256]), |_| {
        use rand_distr::Distribution;
        Complex64::new(normal.sample(&mut rng), normal.sample(&mut rng))
    });
    let mpm = MatrixPencil::new(&expinfo, &noise, None).unwrap();
    assert!(mpm.get_params().is_none());
}

#[test]
fn test_two_dimensional_recovery() {
    let expinfo = ExpInfo::new(vec![40.0, 500.0], vec![0.0, 10.0]).unwrap();
    let truth = array![
        [1.0, 0.0, 5.0, 100.0, 2.0, 6.0],
        [2.0, 0.5, -8.0, -60.0, 3.0, 4.0],
    ];
    let (fid, _) = make_fid(&truth, &expinfo, &[16, 32]).unwrap();
    let mpm = MatrixPencil::new(&expinfo, &fid, Some(2)).unwrap();
    assert_eq!(mpm.dim(), 2);
    let est = mpm.into_params().unwrap();
    let truth = sort_by_frequency(truth, 2);
    for (e, t) in est.iter().zip(truth.iter()) {
        assert_relative_eq!(*e, *t, epsilon = 1e-4, max_relative = 1e-3);
    }
}

#[test]
fn test_dimension_mismatch_is_rejected() {
    let expinfo = ExpInfo::new(vec![40.0, 500.0], vec![0.0, 0.0]).unwrap();
    let data = ArrayD::<Complex64>::zeros(IxDyn(&[64]));
    assert!(MatrixPencil::new(&expinfo, &data, Some(1)).is_err());

    let expinfo = ExpInfo::new(vec![500.0], vec![0.0]).unwrap();
    let mut data = ArrayD::<Complex64>::zeros(IxDyn(&[64]));
    data[[5]] = Complex64::new(f64::NAN, 0.0);
    assert!(MatrixPencil::new(&expinfo, &data, Some(1)).is_err());
}
