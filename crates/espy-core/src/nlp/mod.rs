//! Nonlinear programming
//!
//! Refines an initial oscillator estimate by minimising the squared residual
//! between the signal and the model, optionally penalised by the variance of
//! the oscillator phases.
//!
//! ## Methods
//!
//! - `Exact`: trust region with the exact Hessian
//! - `GaussNewton`: trust region with the Gauss-Newton Hessian (default)
//! - `Lbfgs`: limited-memory BFGS
//!
//! All three are driven through `argmin` (see [`optimizer`]).
//!
//! Amplitudes are bounded below by zero, damping factors by a small positive
//! value and frequencies by the spectral window. Errors are estimated from
//! the inverse Hessian at the optimum, scaled by the residual variance.

mod cost;
mod optimizer;

use std::f64::consts::PI;

use ndarray::{Array1, Array2, ArrayD, Axis};
use num_complex::Complex64;

use crate::constants::{LBFGS_MAX_ITERATIONS, NEAR_ZERO, TRUST_REGION_MAX_ITERATIONS};
use crate::error::{EspyError, Result};
use crate::expinfo::ExpInfo;
use crate::math::linalg::inv_real;
use crate::math::wrap_phase;
use crate::mpm::sort_by_frequency;
use crate::signal::{check_params, empty_params};

use self::cost::{Class, CostModel};

/// Optimisation method
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub enum NlpMethod {
    Exact,
    #[default]
    GaussNewton,
    Lbfgs,
}

impl NlpMethod {
    /// Default iteration cap for the method
    pub fn default_max_iterations(&self) -> usize {
        match self {
            NlpMethod::Exact | NlpMethod::GaussNewton => TRUST_REGION_MAX_ITERATIONS,
            NlpMethod::Lbfgs => LBFGS_MAX_ITERATIONS,
        }
    }

    pub fn from_str(s: &str) -> Option<Self> {
        match s.to_lowercase().as_str() {
            "exact" => Some(NlpMethod::Exact),
            "gauss-newton" | "gauss_newton" => Some(NlpMethod::GaussNewton),
            "lbfgs" => Some(NlpMethod::Lbfgs),
            _ => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            NlpMethod::Exact => "exact",
            NlpMethod::GaussNewton => "gauss-newton",
            NlpMethod::Lbfgs => "lbfgs",
        }
    }
}

/// Treatment of oscillators with negative (or vanishing) amplitudes
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub enum NegativeAmps {
    /// Make the amplitude positive and shift the phase by π
    #[default]
    FlipPhase,
    /// Remove the oscillator and re-optimise
    Remove,
}

/// Parameter classes free to vary (1D only)
#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub struct ParamMode {
    pub amplitude: bool,
    pub phase: bool,
    pub frequency: bool,
    pub damping: bool,
}

impl Default for ParamMode {
    fn default() -> Self {
        Self {
            amplitude: true,
            phase: true,
            frequency: true,
            damping: true,
        }
    }
}

impl ParamMode {
    /// Parse a subset of `"apfd"`, e.g. `"f"` for frequency-only fitting.
    pub fn from_str(mode: &str) -> Result<Self> {
        if mode.is_empty() {
            return Err(EspyError::invalid("mode", "at least one of a, p, f, d is required"));
        }
        let mut out = Self {
            amplitude: false,
            phase: false,
            frequency: false,
            damping: false,
        };
        for c in mode.chars() {
            let flag = match c {
                'a' => &mut out.amplitude,
                'p' => &mut out.phase,
                'f' => &mut out.frequency,
                'd' => &mut out.damping,
                _ => {
                    return Err(EspyError::invalid(
                        "mode",
                        format!("unexpected character '{}', expected a subset of \"apfd\"", c),
                    ))
                }
            };
            if *flag {
                return Err(EspyError::invalid("mode", format!("'{}' given more than once", c)));
            }
            *flag = true;
        }
        Ok(out)
    }

    pub fn is_full(&self) -> bool {
        self.amplitude && self.phase && self.frequency && self.damping
    }

    fn allows(&self, class: Class) -> bool {
        match class {
            Class::Amplitude => self.amplitude,
            Class::Phase => self.phase,
            Class::Frequency(_) => self.frequency,
            Class::Damping(_) => self.damping,
        }
    }
}

/// Options for [`NonlinearProgramming`]
#[derive(Debug, Clone, PartialEq)]
pub struct NlpOptions {
    pub method: NlpMethod,
    pub phase_variance: bool,
    /// Iteration cap; `None` uses the method's default
    pub max_iterations: Option<usize>,
    pub mode: ParamMode,
    pub negative_amps: NegativeAmps,
}

impl Default for NlpOptions {
    fn default() -> Self {
        Self {
            method: NlpMethod::GaussNewton,
            phase_variance: true,
            max_iterations: None,
            mode: ParamMode::default(),
            negative_amps: NegativeAmps::FlipPhase,
        }
    }
}

/// Outcome of a single optimiser run
#[derive(Debug, Clone)]
pub(crate) struct Optimum {
    pub x: Array1<f64>,
    pub cost: f64,
    pub initial_cost: f64,
    pub iterations: usize,
    pub converged: bool,
}

/// Fitted parameters and their errors
#[derive(Debug, Clone)]
pub struct NonlinearProgramming {
    params: Array2<f64>,
    errors: Array2<f64>,
    iterations: usize,
    converged: bool,
    cost: f64,
    initial_cost: f64,
}

impl NonlinearProgramming {
    /// Fit `x0` to `data`.
    ///
    /// # Arguments
    /// * `expinfo` - Experiment information for `data`
    /// * `data` - 1D or 2D time-domain signal
    /// * `x0` - Initial parameter array, shape `(M, 2 + 2D)`
    /// * `options` - Method, penalty and iteration settings
    pub fn new(expinfo: &ExpInfo, data: &ArrayD<Complex64>, x0: &Array2<f64>, options: &NlpOptions) -> Result<Self> {
        let dim = expinfo.dim();
        if data.ndim() != dim {
            return Err(EspyError::shape(
                format!("{}D signal", dim),
                format!("{}D signal", data.ndim()),
            ));
        }
        check_params(x0, dim)?;
        if dim == 2 && !options.mode.is_full() {
            return Err(EspyError::invalid("mode", "restricting parameters is only supported for 1D data"));
        }
        if options.max_iterations == Some(0) {
            return Err(EspyError::invalid("max_iterations", "must be positive"));
        }
        if data.is_empty() {
            return Err(EspyError::invalid("data", "signal is empty"));
        }
        let max_iterations = options
            .max_iterations
            .unwrap_or_else(|| options.method.default_max_iterations());

        let shape = data.shape().to_vec();
        let norm = data.iter().map(|v| v.norm_sqr()).sum::<f64>().sqrt();
        if !(norm > 0.0) || !norm.is_finite() {
            return Err(EspyError::invalid("data", "signal norm must be positive and finite"));
        }
        let flat: Array1<Complex64> = data.iter().map(|v| v / norm).collect();

        let mut x0 = x0.clone();
        if options.negative_amps == NegativeAmps::FlipPhase {
            flip_negative(&mut x0);
        } else {
            x0 = drop_non_positive(x0);
        }

        log::info!(
            "NLP started: {} oscillators, method {}, max iterations {}",
            x0.nrows(),
            options.method.as_str(),
            max_iterations
        );

        let mut total_iterations = 0;
        let mut initial_cost = None;
        loop {
            if x0.nrows() == 0 {
                log::warn!("NLP has no oscillators left to fit");
                let cost: f64 = flat.iter().map(|v| v.norm_sqr()).sum();
                return Ok(Self {
                    params: empty_params(dim),
                    errors: empty_params(dim),
                    iterations: total_iterations,
                    converged: true,
                    cost,
                    initial_cost: initial_cost.unwrap_or(cost),
                });
            }

            let model = CostModel::new(flat.clone(), shape.clone(), x0.nrows(), options.phase_variance);
            let theta0 = to_internal(&x0, expinfo, &shape, norm);
            let active: Vec<bool> = (0..model.n_params())
                .map(|k| options.mode.allows(model.class(k)))
                .collect();

            // Re-runs after removing oscillators share the one iteration budget
            let budget = max_iterations.saturating_sub(total_iterations);
            let optimum = match options.method {
                NlpMethod::Exact => optimizer::minimize_trust_region(&model, &theta0, &active, true, budget)?,
                NlpMethod::GaussNewton => optimizer::minimize_trust_region(&model, &theta0, &active, false, budget)?,
                NlpMethod::Lbfgs => optimizer::minimize_lbfgs(&model, &theta0, &active, budget)?,
            };
            total_iterations += optimum.iterations;
            let initial_cost = *initial_cost.get_or_insert(optimum.initial_cost);

            let mut params = from_internal(&optimum.x, x0.nrows(), expinfo, &shape, norm);
            if options.negative_amps == NegativeAmps::Remove {
                let before = params.nrows();
                let kept = drop_non_positive(params.clone());
                if kept.nrows() < before && total_iterations < max_iterations {
                    log::warn!(
                        "removing {} oscillators with vanishing amplitude and re-optimising",
                        before - kept.nrows()
                    );
                    x0 = kept;
                    continue;
                }
            }

            if !optimum.converged {
                log::warn!(
                    "NLP reached the iteration limit ({}) without converging; returning the best iterate",
                    max_iterations
                );
            }

            let mut errors = estimate_errors(&model, &optimum, &active, options.method, expinfo, &shape, norm);
            if options.negative_amps == NegativeAmps::Remove {
                // Budget exhausted: drop vanishing oscillators without re-optimising
                let keep: Vec<usize> = (0..params.nrows()).filter(|&m| params[[m, 0]] > NEAR_ZERO).collect();
                params = params.select(Axis(0), &keep);
                errors = errors.select(Axis(0), &keep);
            }
            flip_negative(&mut params);
            for v in params.column_mut(1) {
                *v = wrap_phase(*v);
            }
            let (params, errors) = sort_with_errors(params, errors, dim);

            log::info!(
                "NLP complete after {} iterations: cost {:.6e} -> {:.6e}",
                total_iterations,
                initial_cost,
                optimum.cost
            );
            return Ok(Self {
                params,
                errors,
                iterations: total_iterations,
                converged: optimum.converged,
                cost: optimum.cost,
                initial_cost,
            });
        }
    }

    /// Fitted parameters
    pub fn params(&self) -> &Array2<f64> {
        &self.params
    }

    /// Standard errors, same shape as [`params`](Self::params)
    pub fn errors(&self) -> &Array2<f64> {
        &self.errors
    }

    /// Total number of optimiser iterations
    pub fn iterations(&self) -> usize {
        self.iterations
    }

    /// Whether the final optimiser run met its tolerances
    pub fn converged(&self) -> bool {
        self.converged
    }

    /// Cost at the optimum (normalised data)
    pub fn cost(&self) -> f64 {
        self.cost
    }

    /// Cost at the initial guess (normalised data)
    pub fn initial_cost(&self) -> f64 {
        self.initial_cost
    }

    /// Consume the result, returning `(params, errors)`
    pub fn into_parts(self) -> (Array2<f64>, Array2<f64>) {
        (self.params, self.errors)
    }
}

/// Cost of `params` against `data`, with the data normalised as in the fit.
///
/// Useful for comparing initial and refined estimates on the same footing.
pub fn evaluate_cost(
    expinfo: &ExpInfo,
    data: &ArrayD<Complex64>,
    params: &Array2<f64>,
    phase_variance: bool,
) -> Result<f64> {
    let dim = expinfo.dim();
    check_params(params, dim)?;
    if data.ndim() != dim {
        return Err(EspyError::shape(format!("{}D signal", dim), format!("{}D signal", data.ndim())));
    }
    let shape = data.shape().to_vec();
    let norm = data.iter().map(|v| v.norm_sqr()).sum::<f64>().sqrt();
    if !(norm > 0.0) {
        return Err(EspyError::invalid("data", "signal norm must be positive"));
    }
    let flat: Array1<Complex64> = data.iter().map(|v| v / norm).collect();
    let model = CostModel::new(flat, shape.clone(), params.nrows(), phase_variance);
    Ok(model.cost(&to_internal(params, expinfo, &shape, norm)))
}

/// Scale factor from internal to physical units for each column class.
fn column_scales(expinfo: &ExpInfo, shape: &[usize], norm: f64) -> Vec<f64> {
    let dim = shape.len();
    let sw = expinfo.sw_hz();
    let mut scales = vec![norm, 1.0];
    for d in 0..dim {
        scales.push(sw[d] / (2.0 * PI * shape[d] as f64));
    }
    for d in 0..dim {
        scales.push(sw[d] / shape[d] as f64);
    }
    scales
}

fn to_internal(params: &Array2<f64>, expinfo: &ExpInfo, shape: &[usize], norm: f64) -> Array1<f64> {
    let m_count = params.nrows();
    let dim = shape.len();
    let offset = expinfo.offset_hz();
    let scales = column_scales(expinfo, shape, norm);
    let mut theta = Array1::zeros(m_count * (2 + 2 * dim));
    for c in 0..2 + 2 * dim {
        for m in 0..m_count {
            let mut v = params[[m, c]];
            if (2..2 + dim).contains(&c) {
                v -= offset[c - 2];
            }
            theta[c * m_count + m] = v / scales[c];
        }
    }
    theta
}

fn from_internal(theta: &Array1<f64>, m_count: usize, expinfo: &ExpInfo, shape: &[usize], norm: f64) -> Array2<f64> {
    let dim = shape.len();
    let offset = expinfo.offset_hz();
    let scales = column_scales(expinfo, shape, norm);
    Array2::from_shape_fn((m_count, 2 + 2 * dim), |(m, c)| {
        let v = theta[c * m_count + m] * scales[c];
        if (2..2 + dim).contains(&c) {
            v + offset[c - 2]
        } else {
            v
        }
    })
}

/// Make negative amplitudes positive, shifting their phases by π.
fn flip_negative(params: &mut Array2<f64>) {
    for mut row in params.rows_mut() {
        if row[0] < 0.0 {
            row[0] = -row[0];
            row[1] = wrap_phase(row[1] + PI);
        }
    }
}

/// Drop oscillators whose amplitude is not positive.
fn drop_non_positive(params: Array2<f64>) -> Array2<f64> {
    let keep: Vec<usize> = (0..params.nrows())
        .filter(|&m| params[[m, 0]] > NEAR_ZERO)
        .collect();
    params.select(Axis(0), &keep)
}

/// Standard errors from `2σ² H⁻¹`, with `σ² = ‖r‖² / (2N - P)`.
fn estimate_errors(
    model: &CostModel,
    optimum: &Optimum,
    active: &[bool],
    method: NlpMethod,
    expinfo: &ExpInfo,
    shape: &[usize],
    norm: f64,
) -> Array2<f64> {
    let m_count = model.oscillators();
    let dim = model.dim();
    let idx: Vec<usize> = (0..active.len()).filter(|&i| active[i]).collect();
    let dof = 2 * model.n_samples() as isize - idx.len() as isize;
    let mut errors_int = Array1::<f64>::zeros(model.n_params());

    if dof > 0 && !idx.is_empty() {
        let residual = model.residual_norm_sq(&optimum.x);
        let variance = residual / dof as f64;
        let (_, _, hess) = model.cost_grad_hess(&optimum.x, method == NlpMethod::Exact);
        let h_free = Array2::from_shape_fn((idx.len(), idx.len()), |(i, j)| hess[[idx[i], idx[j]]]);
        match inv_real(&h_free) {
            Some(inv) => {
                for (i, &k) in idx.iter().enumerate() {
                    errors_int[k] = (2.0 * variance * inv[[i, i]]).abs().sqrt();
                }
            }
            None => {
                log::warn!("Hessian at the optimum is singular; errors are unavailable");
                for &k in &idx {
                    errors_int[k] = f64::NAN;
                }
            }
        }
    }

    let scales = column_scales(expinfo, shape, norm);
    Array2::from_shape_fn((m_count, 2 + 2 * dim), |(m, c)| errors_int[c * m_count + m] * scales[c])
}

fn sort_with_errors(params: Array2<f64>, errors: Array2<f64>, dim: usize) -> (Array2<f64>, Array2<f64>) {
    let column = 2 + dim - 1;
    let mut order: Vec<usize> = (0..params.nrows()).collect();
    order.sort_by(|&a, &b| params[[a, column]].total_cmp(&params[[b, column]]));
    let errors = errors.select(Axis(0), &order);
    (sort_by_frequency(params, dim), errors)
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;
    use ndarray::array;

    use crate::signal::make_fid;

    #[test]
    fn test_internal_round_trip() {
        let expinfo = ExpInfo::new(vec![500.0], vec![50.0]).unwrap();
        let params = array![[2.0, 0.1, 80.0, 3.0], [1.0, -1.0, -20.0, 6.0]];
        let theta = to_internal(&params, &expinfo, &[128], 4.0);
        assert_relative_eq!(theta[0], 0.5);
        // 2π (80 - 50) 128 / 500
        assert_relative_eq!(theta[4], 2.0 * PI * 30.0 * 128.0 / 500.0, epsilon = 1e-10);
        let back = from_internal(&theta, 2, &expinfo, &[128], 4.0);
        for (a, b) in back.iter().zip(params.iter()) {
            assert_relative_eq!(a, b, epsilon = 1e-10);
        }
    }

    #[test]
    fn test_param_mode_parsing() {
        let mode = ParamMode::from_str("fd").unwrap();
        assert!(!mode.amplitude && !mode.phase && mode.frequency && mode.damping);
        assert!(ParamMode::from_str("").is_err());
        assert!(ParamMode::from_str("ax").is_err());
        assert!(ParamMode::from_str("aa").is_err());
        assert!(ParamMode::from_str("apfd").unwrap().is_full());
    }

    #[test]
    fn test_flip_negative() {
        let mut params = array![[-1.0, 0.5, 10.0, 1.0]];
        flip_negative(&mut params);
        assert_relative_eq!(params[[0, 0]], 1.0);
        assert_relative_eq!(params[[0, 1]], 0.5 - PI, epsilon = 1e-12);
    }

    #[test]
    fn test_refines_perturbed_guess() {
        let expinfo = ExpInfo::new(vec![100.0], vec![0.0]).unwrap();
        let truth = array![[1.0, 0.0, -20.0, 2.0], [2.0, 0.0, 15.0, 3.0]];
        let (fid, _) = make_fid(&truth, &expinfo, &[128]).unwrap();
        let x0 = array![[0.8, 0.1, -19.5, 2.5], [2.2, -0.1, 15.4, 2.5]];
        for method in [NlpMethod::GaussNewton, NlpMethod::Exact, NlpMethod::Lbfgs] {
            let options = NlpOptions { method, phase_variance: false, ..NlpOptions::default() };
            let nlp = NonlinearProgramming::new(&expinfo, &fid, &x0, &options).unwrap();
            let p = nlp.params();
            assert!(nlp.cost() <= nlp.initial_cost());
            for (a, b) in p.iter().zip(truth.iter()) {
                assert_relative_eq!(a, b, epsilon = 1e-3);
            }
        }
    }

    #[test]
    fn test_mode_restriction_keeps_fixed_parameters() {
        let expinfo = ExpInfo::new(vec![100.0], vec![0.0]).unwrap();
        let truth = array![[1.0, 0.0, 10.0, 2.0]];
        let (fid, _) = make_fid(&truth, &expinfo, &[64]).unwrap();
        let x0 = array![[1.0, 0.0, 10.5, 2.0]];
        let options = NlpOptions {
            phase_variance: false,
            mode: ParamMode::from_str("f").unwrap(),
            ..NlpOptions::default()
        };
        let nlp = NonlinearProgramming::new(&expinfo, &fid, &x0, &options).unwrap();
        assert_relative_eq!(nlp.params()[[0, 2]], 10.0, epsilon = 1e-6);
        assert_relative_eq!(nlp.params()[[0, 0]], 1.0, epsilon = 1e-12);
        assert_relative_eq!(nlp.params()[[0, 3]], 2.0, epsilon = 1e-12);
        assert_eq!(nlp.errors()[[0, 0]], 0.0);
    }
}
