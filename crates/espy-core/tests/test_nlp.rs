//! Integration tests for nonlinear programming refinement

use approx::assert_relative_eq;
use ndarray::{array, Array2};
use rand::rngs::StdRng;
use rand::SeedableRng;

use espy_core::nlp::evaluate_cost;
use espy_core::signal::{make_fid, make_noisy_fid};
use espy_core::{ExpInfo, MatrixPencil, NegativeAmps, NlpMethod, NlpOptions, NonlinearProgramming};

fn three_oscillators() -> Array2<f64> {
    array![
        [1.0, 0.0, -180.0, 4.0],
        [2.0, 0.0, 40.0, 6.0],
        [1.5, 0.0, 220.0, 5.0],
    ]
}

#[test]
fn test_refinement_lowers_cost_of_mpm_estimate() {
    let expinfo = ExpInfo::new(vec![1000.0], vec![0.0]).unwrap();
    let truth = three_oscillators();
    let mut rng = StdRng::seed_from_u64(21);
    let (fid, _) = make_noisy_fid(&truth, &expinfo, &[512], 25.0, true, &mut rng).unwrap();

    let x0 = MatrixPencil::new(&expinfo, &fid, Some(3)).unwrap().into_params().unwrap();
    let options = NlpOptions::default();
    let initial = evaluate_cost(&expinfo, &fid, &x0, options.phase_variance).unwrap();
    let nlp = NonlinearProgramming::new(&expinfo, &fid, &x0, &options).unwrap();

    assert_relative_eq!(nlp.initial_cost(), initial, max_relative = 1e-9);
    assert!(nlp.cost() <= initial + 1e-15);
    assert!(nlp.iterations() > 0);

    let params = nlp.params();
    let errors = nlp.errors();
    assert_eq!(params.dim(), (3, 4));
    assert_eq!(errors.dim(), params.dim());
    assert!(errors.iter().all(|e| e.is_finite() && *e >= 0.0));
    for (row, expected) in params.rows().into_iter().zip(truth.rows()) {
        assert_relative_eq!(row[2], expected[2], epsilon = 1.0);
        assert_relative_eq!(row[0], expected[0], max_relative = 0.1);
    }
}

#[test]
fn test_each_method_recovers_noiseless_parameters() {
    let expinfo = ExpInfo::new(vec![1000.0], vec![20.0]).unwrap();
    let truth = three_oscillators();
    let (fid, _) = make_fid(&truth, &expinfo, &[256]).unwrap();
    let mut x0 = truth.clone();
    for mut row in x0.rows_mut() {
        row[0] *= 1.1;
        row[2] += 0.4;
        row[3] *= 0.9;
    }

    for method in [NlpMethod::Exact, NlpMethod::GaussNewton, NlpMethod::Lbfgs] {
        let options = NlpOptions {
            method,
            phase_variance: false,
            max_iterations: Some(2000),
            ..NlpOptions::default()
        };
        let nlp = NonlinearProgramming::new(&expinfo, &fid, &x0, &options).unwrap();
        for (row, expected) in nlp.params().rows().into_iter().zip(truth.rows()) {
            assert_relative_eq!(row[2], expected[2], epsilon = 5e-2);
            assert_relative_eq!(row[0], expected[0], max_relative = 5e-2);
        }
    }
}

#[test]
fn test_iteration_cap_is_respected() {
    let expinfo = ExpInfo::new(vec![1000.0], vec![0.0]).unwrap();
    let truth = three_oscillators();
    let (fid, _) = make_fid(&truth, &expinfo, &[256]).unwrap();
    let mut x0 = truth.clone();
    x0.column_mut(2).mapv_inplace(|f| f + 2.0);

    let options = NlpOptions {
        method: NlpMethod::Lbfgs,
        max_iterations: Some(3),
        ..NlpOptions::default()
    };
    let nlp = NonlinearProgramming::new(&expinfo, &fid, &x0, &options).unwrap();
    assert!(nlp.iterations() <= 3);
    assert!(nlp.cost() <= nlp.initial_cost());
}

#[test]
fn test_negative_amplitudes_are_removed() {
    let expinfo = ExpInfo::new(vec![1000.0], vec![0.0]).unwrap();
    let truth = three_oscillators();
    let (fid, _) = make_fid(&truth, &expinfo, &[256]).unwrap();
    let mut x0 = Array2::zeros((4, 4));
    x0.slice_mut(ndarray::s![..3, ..]).assign(&truth);
    x0.row_mut(3).assign(&array![-0.2, 0.0, 400.0, 5.0]);

    let remove = NlpOptions {
        negative_amps: NegativeAmps::Remove,
        phase_variance: false,
        ..NlpOptions::default()
    };
    let nlp = NonlinearProgramming::new(&expinfo, &fid, &x0, &remove).unwrap();
    assert_eq!(nlp.params().nrows(), 3);

    let flip = NlpOptions {
        phase_variance: false,
        ..NlpOptions::default()
    };
    let nlp = NonlinearProgramming::new(&expinfo, &fid, &x0, &flip).unwrap();
    assert_eq!(nlp.params().nrows(), 4);
    assert!(nlp.params().column(0).iter().all(|a| *a >= 0.0));
}

#[test]
fn test_removal_reruns_share_the_iteration_budget() {
    let expinfo = ExpInfo::new(vec![1000.0], vec![0.0]).unwrap();
    let truth = three_oscillators();
    let (fid, _) = make_fid(&truth, &expinfo, &[256]).unwrap();
    let mut x0 = Array2::zeros((5, 4));
    x0.slice_mut(ndarray::s![..3, ..]).assign(&truth);
    x0.row_mut(3).assign(&array![-0.3, 0.0, 400.0, 5.0]);
    x0.row_mut(4).assign(&array![-0.1, 0.0, -350.0, 5.0]);

    let options = NlpOptions {
        method: NlpMethod::Lbfgs,
        negative_amps: NegativeAmps::Remove,
        phase_variance: false,
        max_iterations: Some(5),
        ..NlpOptions::default()
    };
    let nlp = NonlinearProgramming::new(&expinfo, &fid, &x0, &options).unwrap();
    assert!(nlp.iterations() <= 5);
    assert!(nlp.params().column(0).iter().all(|a| *a > 0.0));
    assert_eq!(nlp.errors().nrows(), nlp.params().nrows());
}

#[test]
fn test_two_dimensional_refinement() {
    let expinfo = ExpInfo::new(vec![40.0, 500.0], vec![0.0, 10.0]).unwrap();
    let truth = array![
        [2.0, 0.5, -8.0, -60.0, 3.0, 4.0],
        [1.0, 0.0, 5.0, 100.0, 2.0, 6.0],
    ];
    let (fid, _) = make_fid(&truth, &expinfo, &[12, 24]).unwrap();
    let mut x0 = truth.clone();
    x0.column_mut(3).mapv_inplace(|f| f + 1.0);
    x0.column_mut(0).mapv_inplace(|a| a * 0.9);

    let options = NlpOptions {
        phase_variance: false,
        max_iterations: Some(500),
        ..NlpOptions::default()
    };
    let nlp = NonlinearProgramming::new(&expinfo, &fid, &x0, &options).unwrap();
    assert_eq!(nlp.params().dim(), (2, 6));
    assert_eq!(nlp.errors().dim(), (2, 6));
    for (row, expected) in nlp.params().rows().into_iter().zip(truth.rows()) {
        assert_relative_eq!(row[2], expected[2], epsilon = 1e-2);
        assert_relative_eq!(row[3], expected[3], epsilon = 1e-2);
        assert_relative_eq!(row[0], expected[0], max_relative = 1e-2);
    }

    let restricted = NlpOptions {
        mode: espy_core::ParamMode::from_str("f").unwrap(),
        ..options
    };
    assert!(NonlinearProgramming::new(&expinfo, &fid, &x0, &restricted).is_err());
}
