//! Optimizer drivers
//!
//! Wraps [`CostModel`] for `argmin`. The trust-region methods run argmin's
//! `TrustRegion` with a Steihaug subproblem solver; L-BFGS runs argmin's
//! `LBFGS` with a More-Thuente line search.
//!
//! Only the free parameters are handed to argmin. Bounds are enforced by
//! clamping, and gradient components that would push a clamped parameter
//! further out are zeroed.

use argmin::core::{
    CostFunction, Error as ArgminError, Executor, Gradient, Hessian, IterState, Problem, Solver,
    State, TerminationReason, TerminationStatus, KV,
};
use argmin::solver::linesearch::MoreThuenteLineSearch;
use argmin::solver::quasinewton::LBFGS;
use argmin::solver::trustregion::{Steihaug, TrustRegion};
use ndarray::{Array1, Array2};

use super::cost::CostModel;
use super::Optimum;
use crate::constants::{GRADIENT_TOLERANCE, LBFGS_HISTORY, OBJECTIVE_TOLERANCE, STALL_ITERATIONS};
use crate::error::{EspyError, Result};

/// Margin within which a parameter counts as sitting on its bound
const BOUND_EPS: f64 = 1e-12;

fn clamp_params(params: &[f64], bounds: &[(f64, f64)]) -> Vec<f64> {
    params.iter().zip(bounds).map(|(&v, &(lo, hi))| v.clamp(lo, hi)).collect()
}

/// Cost model restricted to its free parameters
#[derive(Clone)]
pub(crate) struct Objective<'a> {
    model: &'a CostModel,
    /// Indices of the free parameters in `θ`
    free: Vec<usize>,
    /// Bounds of the free parameters
    bounds: Vec<(f64, f64)>,
    /// Full `θ`, supplying the values of the fixed parameters
    base: Array1<f64>,
    exact: bool,
}

impl<'a> Objective<'a> {
    /// # Arguments
    /// * `model` - Cost to minimise
    /// * `theta0` - Initial full parameter vector
    /// * `active` - Parameters allowed to vary
    /// * `exact` - Use the exact Hessian rather than Gauss-Newton
    pub fn new(model: &'a CostModel, theta0: &Array1<f64>, active: &[bool], exact: bool) -> Self {
        let all_bounds = model.bounds();
        let base = Array1::from(clamp_params(&theta0.to_vec(), &all_bounds));
        let free: Vec<usize> = (0..base.len()).filter(|&k| active[k]).collect();
        let bounds = free.iter().map(|&k| all_bounds[k]).collect();
        Self {
            model,
            free,
            bounds,
            base,
            exact,
        }
    }

    /// Starting point in the reduced space
    pub fn initial(&self) -> Vec<f64> {
        self.free.iter().map(|&k| self.base[k]).collect()
    }

    /// Full, clamped `θ` for a reduced parameter vector
    pub fn expand(&self, params: &[f64]) -> Array1<f64> {
        let mut theta = self.base.clone();
        for (&k, v) in self.free.iter().zip(clamp_params(params, &self.bounds)) {
            theta[k] = v;
        }
        theta
    }

    /// Free parameters on a bound whose gradient points outwards
    fn pinned(&self, params: &[f64], grad: &[f64]) -> Vec<bool> {
        clamp_params(params, &self.bounds)
            .iter()
            .zip(&self.bounds)
            .zip(grad)
            .map(|((&x, &(lo, hi)), &g)| (x <= lo + BOUND_EPS && g > 0.0) || (x >= hi - BOUND_EPS && g < 0.0))
            .collect()
    }

    fn reduce_grad(&self, grad: &Array1<f64>) -> Vec<f64> {
        self.free.iter().map(|&k| grad[k]).collect()
    }

    fn reduce_hess(&self, hess: &Array2<f64>) -> Vec<Vec<f64>> {
        self.free
            .iter()
            .map(|&i| self.free.iter().map(|&j| hess[[i, j]]).collect())
            .collect()
    }
}

impl<'a> CostFunction for Objective<'a> {
    type Param = Vec<f64>;
    type Output = f64;

    fn cost(&self, params: &Self::Param) -> std::result::Result<Self::Output, ArgminError> {
        Ok(self.model.cost(&self.expand(params)))
    }
}

impl<'a> Gradient for Objective<'a> {
    type Param = Vec<f64>;
    type Gradient = Vec<f64>;

    fn gradient(&self, params: &Self::Param) -> std::result::Result<Self::Gradient, ArgminError> {
        let (_, grad) = self.model.cost_grad(&self.expand(params));
        let mut g = self.reduce_grad(&grad);
        let pinned = self.pinned(params, &g);
        for (gi, pin) in g.iter_mut().zip(pinned) {
            if pin {
                *gi = 0.0;
            }
        }
        Ok(g)
    }
}

impl<'a> Hessian for Objective<'a> {
    type Param = Vec<f64>;
    type Hessian = Vec<Vec<f64>>;

    fn hessian(&self, params: &Self::Param) -> std::result::Result<Self::Hessian, ArgminError> {
        let (_, grad, hess) = self.model.cost_grad_hess(&self.expand(params), self.exact);
        let pinned = self.pinned(params, &self.reduce_grad(&grad));
        let mut h = self.reduce_hess(&hess);
        // Decouple pinned parameters so the subproblem leaves them in place
        for (i, &pin) in pinned.iter().enumerate() {
            if pin {
                for j in 0..h.len() {
                    h[i][j] = 0.0;
                    h[j][i] = 0.0;
                }
                h[i][i] = 1.0;
            }
        }
        Ok(h)
    }
}

// ============================================================================
// Trust region
// ============================================================================

type TrustRegionState = IterState<Vec<f64>, Vec<f64>, (), Vec<Vec<f64>>, (), f64>;

/// argmin's trust region, stopped once the projected gradient vanishes or
/// the cost stalls.
struct StoppingTrustRegion {
    inner: TrustRegion<Steihaug<Vec<f64>, f64>, f64>,
    last_cost: f64,
    stalled: usize,
}

impl StoppingTrustRegion {
    fn new() -> Self {
        Self {
            inner: TrustRegion::new(Steihaug::new()),
            last_cost: f64::INFINITY,
            stalled: 0,
        }
    }
}

impl<'a> Solver<Objective<'a>, TrustRegionState> for StoppingTrustRegion {
    const NAME: &'static str = "Trust region (Steihaug)";

    fn init(
        &mut self,
        problem: &mut Problem<Objective<'a>>,
        state: TrustRegionState,
    ) -> std::result::Result<(TrustRegionState, Option<KV>), ArgminError> {
        self.inner.init(problem, state)
    }

    fn next_iter(
        &mut self,
        problem: &mut Problem<Objective<'a>>,
        state: TrustRegionState,
    ) -> std::result::Result<(TrustRegionState, Option<KV>), ArgminError> {
        self.inner.next_iter(problem, state)
    }

    fn terminate(&mut self, state: &TrustRegionState) -> TerminationStatus {
        let cost = state.get_cost();
        log::debug!("trust region iteration {}: cost {:.6e}", state.get_iter(), cost);

        let g_inf = state
            .get_gradient()
            .map(|g| g.iter().fold(0.0_f64, |acc, v| acc.max(v.abs())))
            .unwrap_or(f64::INFINITY);
        if g_inf < GRADIENT_TOLERANCE {
            return TerminationStatus::Terminated(TerminationReason::SolverConverged);
        }

        if self.last_cost - cost <= OBJECTIVE_TOLERANCE * (1.0 + cost.abs()) {
            self.stalled += 1;
        } else {
            self.stalled = 0;
        }
        self.last_cost = cost;
        if self.stalled >= STALL_ITERATIONS {
            return TerminationStatus::Terminated(TerminationReason::SolverConverged);
        }
        <TrustRegion<Steihaug<Vec<f64>, f64>, f64> as Solver<Objective<'a>, TrustRegionState>>::terminate(&mut self.inner, state)
    }
}

fn is_converged(status: &TerminationStatus) -> bool {
    matches!(
        status,
        TerminationStatus::Terminated(TerminationReason::SolverConverged)
            | TerminationStatus::Terminated(TerminationReason::TargetCostReached)
    )
}

fn optimum(objective: &Objective, best: Option<&Vec<f64>>, iterations: u64, status: &TerminationStatus) -> Optimum {
    let initial = objective.expand(&objective.initial());
    let x = best.map(|p| objective.expand(p)).unwrap_or_else(|| initial.clone());
    Optimum {
        cost: objective.model.cost(&x),
        initial_cost: objective.model.cost(&initial),
        x,
        iterations: iterations as usize,
        converged: is_converged(status),
    }
}

/// Minimise with the trust-region method.
///
/// # Arguments
/// * `model` - Cost to minimise
/// * `theta0` - Initial parameter vector
/// * `active` - Parameters allowed to vary
/// * `exact` - Use the exact Hessian rather than Gauss-Newton
/// * `max_iterations` - Iteration cap
pub(crate) fn minimize_trust_region(
    model: &CostModel,
    theta0: &Array1<f64>,
    active: &[bool],
    exact: bool,
    max_iterations: usize,
) -> Result<Optimum> {
    let objective = Objective::new(model, theta0, active, exact);
    let init = objective.initial();
    if init.is_empty() {
        return Ok(optimum(&objective, None, 0, &TerminationStatus::Terminated(TerminationReason::SolverConverged)));
    }

    let res = Executor::new(objective.clone(), StoppingTrustRegion::new())
        .configure(|state| state.param(init).max_iters(max_iterations as u64))
        .run()
        .map_err(|e| EspyError::Optimizer(format!("trust region failed: {}", e)))?;

    let state = res.state();
    Ok(optimum(&objective, state.get_best_param(), state.get_iter(), state.get_termination_status()))
}

/// Minimise with L-BFGS.
///
/// # Arguments
/// * `model` - Cost to minimise
/// * `theta0` - Initial parameter vector
/// * `active` - Parameters allowed to vary
/// * `max_iterations` - Iteration cap
pub(crate) fn minimize_lbfgs(
    model: &CostModel,
    theta0: &Array1<f64>,
    active: &[bool],
    max_iterations: usize,
) -> Result<Optimum> {
    let objective = Objective::new(model, theta0, active, false);
    let init = objective.initial();
    if init.is_empty() {
        return Ok(optimum(&objective, None, 0, &TerminationStatus::Terminated(TerminationReason::SolverConverged)));
    }

    let solver = LBFGS::new(MoreThuenteLineSearch::new(), LBFGS_HISTORY)
        .with_tolerance_grad(GRADIENT_TOLERANCE)
        .map_err(|e| EspyError::Optimizer(format!("invalid gradient tolerance: {}", e)))?
        .with_tolerance_cost(OBJECTIVE_TOLERANCE)
        .map_err(|e| EspyError::Optimizer(format!("invalid cost tolerance: {}", e)))?;

    let res = Executor::new(objective.clone(), solver)
        .configure(|state| state.param(init).max_iters(max_iterations as u64))
        .run()
        .map_err(|e| EspyError::Optimizer(format!("L-BFGS failed: {}", e)))?;

    let state = res.state();
    Ok(optimum(&objective, state.get_best_param(), state.get_iter(), state.get_termination_status()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;
    use ndarray::array;
    use num_complex::Complex64;

    /// Single noiseless oscillator on 32 points, `θ = [a, φ, f, η]`
    fn model() -> CostModel {
        let truth = [1.0, 0.3, 4.0, 2.0];
        let data: Array1<Complex64> = (0..32)
            .map(|n| {
                let tau = n as f64 / 32.0;
                Complex64::from_polar(truth[0], truth[1]) * Complex64::new(-truth[3] * tau, truth[2] * tau).exp()
            })
            .collect();
        CostModel::new(data, vec![32], 1, false)
    }

    #[test]
    fn test_objective_expand_clamps_and_keeps_fixed() {
        let model = model();
        let theta0 = array![-0.5, 0.3, 4.0, 2.0];
        let objective = Objective::new(&model, &theta0, &[true, false, true, true], false);
        // Amplitude is clamped to its lower bound
        assert_eq!(objective.initial(), vec![0.0, 4.0, 2.0]);
        let theta = objective.expand(&[-1.0, 5.0, 3.0]);
        assert_eq!(theta, array![0.0, 0.3, 5.0, 3.0]);
    }

    #[test]
    fn test_gradient_zeroed_at_bound() {
        let model = model();
        // Zero amplitude: increasing it lowers the cost, so the gradient is kept
        let objective = Objective::new(&model, &array![0.0, 0.3, 4.0, 2.0], &[true; 4], false);
        let g = objective.gradient(&vec![0.0, 0.3, 4.0, 2.0]).unwrap();
        assert!(g[0] < 0.0);

        // Fitting the conjugate-phase data pushes the amplitude below zero
        let objective = Objective::new(&model, &array![0.0, 0.3 + std::f64::consts::PI, 4.0, 2.0], &[true; 4], false);
        let g = objective.gradient(&vec![0.0, 0.3 + std::f64::consts::PI, 4.0, 2.0]).unwrap();
        assert_eq!(g[0], 0.0);
        let h = objective.hessian(&vec![0.0, 0.3 + std::f64::consts::PI, 4.0, 2.0]).unwrap();
        assert_eq!(h[0][0], 1.0);
        assert_eq!(h[0][2], 0.0);
        assert_eq!(h[2][0], 0.0);
    }

    #[test]
    fn test_both_drivers_reach_the_minimum() {
        let model = model();
        let theta0 = array![0.8, 0.1, 4.3, 2.5];
        let active = [true; 4];
        for opt in [
            minimize_trust_region(&model, &theta0, &active, false, 100).unwrap(),
            minimize_trust_region(&model, &theta0, &active, true, 100).unwrap(),
            minimize_lbfgs(&model, &theta0, &active, 500).unwrap(),
        ] {
            assert!(opt.cost < opt.initial_cost);
            assert_relative_eq!(opt.x[0], 1.0, epsilon = 1e-4);
            assert_relative_eq!(opt.x[2], 4.0, epsilon = 1e-4);
            assert_relative_eq!(opt.x[3], 2.0, epsilon = 1e-4);
        }
    }

    #[test]
    fn test_trust_region_stops_before_the_cap() {
        let model = model();
        let opt = minimize_trust_region(&model, &array![0.9, 0.2, 4.1, 2.2], &[true; 4], false, 1000).unwrap();
        assert!(opt.converged);
        assert!(opt.iterations < 1000);
    }

    #[test]
    fn test_nothing_free() {
        let model = model();
        let theta0 = array![0.9, 0.2, 4.1, 2.2];
        let opt = minimize_lbfgs(&model, &theta0, &[false; 4], 10).unwrap();
        assert_eq!(opt.iterations, 0);
        assert_eq!(opt.x, theta0);
        assert_relative_eq!(opt.cost, opt.initial_cost);
    }
}
