//! Residual cost, gradient and Hessian
//!
//! The optimizers work on a flat parameter vector in "internal" units:
//!
//! ```text
//! θ = [a_1..a_M, φ_1..φ_M, f1_1..f1_M, (f2_1..f2_M), η1_1..η1_M, (η2_1..η2_M)]
//! ```
//!
//! with amplitudes relative to the data norm, frequencies as
//! `2π (f - offset) N / sw` and damping as `η N / sw`, where `N` is the
//! number of points in that dimension. The model sampled at `τ = n / N` is
//!
//! ```text
//! y(τ) = Σ_m a_m e^{iφ_m} Π_d e^{(i f_{m,d} - η_{m,d}) τ_d}
//! ```
//!
//! The cost is `‖y_data - y(θ)‖²` plus, optionally, the variance of the
//! phases.

use std::f64::consts::PI;

use ndarray::{Array1, Array2};
use num_complex::Complex64;

use crate::constants::MIN_DAMPING;

/// Parameter classes, in the order they appear in `θ`
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Class {
    Amplitude,
    Phase,
    Frequency(usize),
    Damping(usize),
}

/// Cost of fitting a sum of oscillators to a (normalised) signal
#[derive(Debug, Clone)]
pub(crate) struct CostModel {
    /// Flattened data, row-major over the signal's dimensions
    data: Array1<Complex64>,
    /// `τ_d` of every flattened sample, one array per dimension
    tau: Vec<Array1<f64>>,
    /// Points per dimension
    shape: Vec<usize>,
    oscillators: usize,
    phase_variance: bool,
}

/// Model quantities at a given `θ`
struct ModelState {
    /// `z[n, m] = e^{iφ_m} Π_d e^{(i f - η) τ_d[n]}`
    z: Array2<Complex64>,
    residual: Array1<Complex64>,
}

impl CostModel {
    pub fn new(data: Array1<Complex64>, shape: Vec<usize>, oscillators: usize, phase_variance: bool) -> Self {
        let total: usize = shape.iter().product();
        let dim = shape.len();
        let tau = (0..dim)
            .map(|d| {
                let stride: usize = shape[d + 1..].iter().product();
                let n_d = shape[d] as f64;
                Array1::from_shape_fn(total, |flat| ((flat / stride) % shape[d]) as f64 / n_d)
            })
            .collect();
        Self {
            data,
            tau,
            shape,
            oscillators,
            phase_variance,
        }
    }

    #[inline]
    pub fn dim(&self) -> usize {
        self.shape.len()
    }

    #[inline]
    pub fn oscillators(&self) -> usize {
        self.oscillators
    }

    /// Length of `θ`
    #[inline]
    pub fn n_params(&self) -> usize {
        self.oscillators * (2 + 2 * self.dim())
    }

    /// Number of complex samples
    #[inline]
    pub fn n_samples(&self) -> usize {
        self.data.len()
    }

    pub fn shape(&self) -> &[usize] {
        &self.shape
    }

    /// Class of parameter `k`
    pub fn class(&self, k: usize) -> Class {
        let dim = self.dim();
        match k / self.oscillators {
            0 => Class::Amplitude,
            1 => Class::Phase,
            c if c < 2 + dim => Class::Frequency(c - 2),
            c => Class::Damping(c - 2 - dim),
        }
    }

    /// Lower and upper bound of each parameter
    pub fn bounds(&self) -> Vec<(f64, f64)> {
        (0..self.n_params())
            .map(|k| match self.class(k) {
                Class::Amplitude => (0.0, f64::INFINITY),
                Class::Phase => (f64::NEG_INFINITY, f64::INFINITY),
                Class::Frequency(d) => {
                    let half = PI * self.shape[d] as f64;
                    (-half, half)
                }
                Class::Damping(_) => (MIN_DAMPING, f64::INFINITY),
            })
            .collect()
    }

    fn state(&self, theta: &Array1<f64>) -> ModelState {
        let m_count = self.oscillators;
        let dim = self.dim();
        let n = self.n_samples();
        let mut z = Array2::<Complex64>::zeros((n, m_count));
        for m in 0..m_count {
            let phase = theta[m_count + m];
            for s in 0..n {
                let mut exponent = Complex64::new(0.0, phase);
                for d in 0..dim {
                    let f = theta[(2 + d) * m_count + m];
                    let eta = theta[(2 + dim + d) * m_count + m];
                    exponent += Complex64::new(-eta, f) * self.tau[d][s];
                }
                z[[s, m]] = exponent.exp();
            }
        }
        let amps: Array1<Complex64> = (0..m_count)
            .map(|m| Complex64::new(theta[m], 0.0))
            .collect();
        let model = z.dot(&amps);
        let residual = &self.data - &model;
        ModelState { z, residual }
    }

    /// `∂y/∂θ_k` coefficient relative to `z` at sample `s` (without the amplitude)
    #[inline]
    fn coefficient(&self, class: Class, s: usize) -> Complex64 {
        match class {
            Class::Amplitude => Complex64::new(1.0, 0.0),
            Class::Phase => Complex64::new(0.0, 1.0),
            Class::Frequency(d) => Complex64::new(0.0, self.tau[d][s]),
            Class::Damping(d) => Complex64::new(-self.tau[d][s], 0.0),
        }
    }

    /// Jacobian of the model, `(n_samples, n_params)`
    fn jacobian(&self, theta: &Array1<f64>, state: &ModelState) -> Array2<Complex64> {
        let m_count = self.oscillators;
        let p = self.n_params();
        Array2::from_shape_fn((self.n_samples(), p), |(s, k)| {
            let m = k % m_count;
            let class = self.class(k);
            let weight = if class == Class::Amplitude { 1.0 } else { theta[m] };
            self.coefficient(class, s) * state.z[[s, m]] * weight
        })
    }

    fn phase_penalty(&self, theta: &Array1<f64>) -> f64 {
        if !self.phase_variance || self.oscillators == 0 {
            return 0.0;
        }
        let m_count = self.oscillators;
        let phases = theta.slice(ndarray::s![m_count..2 * m_count]);
        let mean = phases.sum() / m_count as f64;
        phases.iter().map(|p| (p - mean).powi(2)).sum::<f64>() / m_count as f64
    }

    /// Sum of squared residuals, without the phase penalty
    pub fn residual_norm_sq(&self, theta: &Array1<f64>) -> f64 {
        self.state(theta).residual.iter().map(|r| r.norm_sqr()).sum()
    }

    /// Cost at `θ`
    pub fn cost(&self, theta: &Array1<f64>) -> f64 {
        self.residual_norm_sq(theta) + self.phase_penalty(theta)
    }

    /// Cost and gradient at `θ`
    pub fn cost_grad(&self, theta: &Array1<f64>) -> (f64, Array1<f64>) {
        let state = self.state(theta);
        let jac = self.jacobian(theta, &state);
        let cost = state.residual.iter().map(|r| r.norm_sqr()).sum::<f64>() + self.phase_penalty(theta);
        let mut grad = self.residual_gradient(&jac, &state);
        self.add_phase_gradient(theta, &mut grad);
        (cost, grad)
    }

    fn residual_gradient(&self, jac: &Array2<Complex64>, state: &ModelState) -> Array1<f64> {
        // -2 Re(J^H r)
        let p = jac.ncols();
        Array1::from_shape_fn(p, |k| {
            let dot: Complex64 = jac
                .column(k)
                .iter()
                .zip(state.residual.iter())
                .map(|(j, r)| j.conj() * r)
                .sum();
            -2.0 * dot.re
        })
    }

    fn add_phase_gradient(&self, theta: &Array1<f64>, grad: &mut Array1<f64>) {
        if !self.phase_variance || self.oscillators == 0 {
            return;
        }
        let m_count = self.oscillators;
        let mean = (0..m_count).map(|m| theta[m_count + m]).sum::<f64>() / m_count as f64;
        for m in 0..m_count {
            grad[m_count + m] += 2.0 * (theta[m_count + m] - mean) / m_count as f64;
        }
    }

    fn add_phase_hessian(&self, hess: &mut Array2<f64>) {
        if !self.phase_variance || self.oscillators == 0 {
            return;
        }
        let m_count = self.oscillators;
        let inv = 1.0 / m_count as f64;
        for i in 0..m_count {
            for j in 0..m_count {
                let delta = if i == j { 1.0 } else { 0.0 };
                hess[[m_count + i, m_count + j]] += 2.0 * inv * (delta - inv);
            }
        }
    }

    /// Cost, gradient and Hessian at `θ`.
    ///
    /// With `exact` unset the Gauss-Newton approximation `2 Re(J^H J)` is
    /// used; otherwise the second-derivative term of the residual is added.
    pub fn cost_grad_hess(&self, theta: &Array1<f64>, exact: bool) -> (f64, Array1<f64>, Array2<f64>) {
        let state = self.state(theta);
        let jac = self.jacobian(theta, &state);
        let cost = state.residual.iter().map(|r| r.norm_sqr()).sum::<f64>() + self.phase_penalty(theta);
        let mut grad = self.residual_gradient(&jac, &state);
        self.add_phase_gradient(theta, &mut grad);

        let jh = jac.t().mapv(|v| v.conj());
        let mut hess = jh.dot(&jac).mapv(|v| 2.0 * v.re);
        if exact {
            self.add_second_order(theta, &state, &mut hess);
        }
        self.add_phase_hessian(&mut hess);
        (cost, grad, hess)
    }

    /// Add `-2 Re Σ conj(r) ∂²y/∂θ_k∂θ_l`, non-zero only within an oscillator.
    fn add_second_order(&self, theta: &Array1<f64>, state: &ModelState, hess: &mut Array2<f64>) {
        let m_count = self.oscillators;
        let classes = 2 + 2 * self.dim();
        for m in 0..m_count {
            let amp = theta[m];
            for ci in 0..classes {
                for cj in ci..classes {
                    let (k, l) = (ci * m_count + m, cj * m_count + m);
                    let (class_k, class_l) = (self.class(k), self.class(l));
                    let weight = match (class_k, class_l) {
                        (Class::Amplitude, Class::Amplitude) => continue,
                        (Class::Amplitude, _) | (_, Class::Amplitude) => 1.0,
                        _ => amp,
                    };
                    let sum: Complex64 = (0..self.n_samples())
                        .map(|s| {
                            state.residual[s].conj()
                                * self.coefficient(class_k, s)
                                * self.coefficient(class_l, s)
                                * state.z[[s, m]]
                        })
                        .sum();
                    let term = -2.0 * weight * sum.re;
                    hess[[k, l]] += term;
                    if k != l {
                        hess[[l, k]] += term;
                    }
                }
            }
        }
    }
}
