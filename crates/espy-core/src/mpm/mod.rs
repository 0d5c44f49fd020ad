//! Matrix Pencil Method
//!
//! Closed-form estimation of oscillator parameters from the signal subspace of
//! a Hankel data matrix. The model order is either supplied or selected with
//! the Minimum Description Length criterion.
//!
//! # References
//!
//! - Y. Hua, T. K. Sarkar, "Matrix pencil method for estimating parameters
//!   of exponentially damped/undamped sinusoids in noise", IEEE Trans.
//!   Acoust., Speech, Signal Process., vol. 38, no. 5, 1990
//! - F. Chen, C. Chen, J. Wang, "Two-dimensional frequency estimation using
//!   the modified matrix enhancement and matrix pencil method", 2007
//! - M. Wax, T. Kailath, "Detection of signals by information theoretic
//!   criteria", IEEE Trans. Acoust., Speech, Signal Process., vol. 33, 1985

pub mod mdl;
mod onedim;
mod twodim;

use ndarray::{Array2, ArrayD, Axis};
use num_complex::Complex64;

use crate::error::{EspyError, Result};
use crate::expinfo::ExpInfo;
use crate::signal::{as_1d, as_2d};

pub use mdl::{mdl_costs, mdl_order};
pub use onedim::hankel;
pub use twodim::enhanced_matrix;

/// Smallest number of points per dimension the pencil can work with.
const MIN_POINTS: usize = 4;

/// Initial parameter estimate produced by the Matrix Pencil Method
#[derive(Debug, Clone)]
pub struct MatrixPencil {
    params: Option<Array2<f64>>,
    dim: usize,
}

impl MatrixPencil {
    /// Estimate oscillator parameters of `data`.
    ///
    /// # Arguments
    /// * `expinfo` - Experiment information (sweep width and offset are used)
    /// * `data` - 1D or 2D time-domain signal
    /// * `oscillators` - Model order. `None` (or zero) selects it with MDL.
    ///
    /// # Returns
    /// The estimate. If no oscillators are found, [`MatrixPencil::get_params`]
    /// returns `None`; this is not an error.
    pub fn new(expinfo: &ExpInfo, data: &ArrayD<Complex64>, oscillators: Option<usize>) -> Result<Self> {
        let dim = expinfo.dim();
        if data.ndim() != dim {
            return Err(EspyError::shape(
                format!("{}D signal", dim),
                format!("{}D signal", data.ndim()),
            ));
        }
        if data.shape().iter().any(|&n| n < MIN_POINTS) {
            return Err(EspyError::invalid(
                "data",
                format!("at least {} points per dimension are required", MIN_POINTS),
            ));
        }
        if data.iter().any(|v| !v.re.is_finite() || !v.im.is_finite()) {
            return Err(EspyError::invalid("data", "signal contains non-finite values"));
        }

        log::info!(
            "MPM started: {}D signal of shape {:?}",
            dim,
            data.shape()
        );
        let params = match dim {
            1 => Self::estimate_1d(expinfo, data, oscillators)?,
            _ => Self::estimate_2d(expinfo, data, oscillators)?,
        };
        match &params {
            Some(p) => log::info!("MPM complete: {} oscillators", p.nrows()),
            None => log::warn!("MPM found no oscillators"),
        }
        Ok(Self { params, dim })
    }

    fn estimate_1d(
        expinfo: &ExpInfo,
        data: &ArrayD<Complex64>,
        oscillators: Option<usize>,
    ) -> Result<Option<Array2<f64>>> {
        let data = as_1d(data)?;
        let mut poles = onedim::signal_poles(&data, oscillators)?;
        let sw = expinfo.sw_hz()[0];
        let before = poles.len();
        poles.retain(|z| decays(*z, sw));
        if poles.len() < before {
            log::warn!(
                "removed {} oscillators with negative damping",
                before - poles.len()
            );
        }
        if poles.is_empty() {
            return Ok(None);
        }
        let alpha = onedim::amplitudes_1d(&data, &poles)?;
        Ok(Some(sort_by_frequency(onedim::to_params(&poles, &alpha, expinfo), 1)))
    }

    fn estimate_2d(
        expinfo: &ExpInfo,
        data: &ArrayD<Complex64>,
        oscillators: Option<usize>,
    ) -> Result<Option<Array2<f64>>> {
        let data = as_2d(data)?;
        let mut poles = twodim::signal_poles(&data, oscillators)?;
        let sw = expinfo.sw_hz();
        let before = poles.len();
        poles.retain(|(z1, z2)| decays(*z1, sw[0]) && decays(*z2, sw[1]));
        if poles.len() < before {
            log::warn!(
                "removed {} oscillators with negative damping",
                before - poles.len()
            );
        }
        if poles.is_empty() {
            return Ok(None);
        }
        let alpha = twodim::amplitudes_2d(&data, &poles)?;
        Ok(Some(sort_by_frequency(twodim::to_params(&poles, &alpha, expinfo), 2)))
    }

    /// Estimated parameters, or `None` when no oscillators were found
    pub fn get_params(&self) -> Option<&Array2<f64>> {
        self.params.as_ref()
    }

    /// Consume the estimate, returning its parameters
    pub fn into_params(self) -> Option<Array2<f64>> {
        self.params
    }

    /// Number of oscillators in the estimate
    pub fn oscillators(&self) -> usize {
        self.params.as_ref().map_or(0, |p| p.nrows())
    }

    #[inline]
    pub fn dim(&self) -> usize {
        self.dim
    }
}

/// Whether the pole `z` has a strictly positive damping factor.
///
/// Undamped poles on the unit circle are rejected along with growing ones.
#[inline]
fn decays(z: Complex64, sw: f64) -> bool {
    -sw * z.norm().ln() > 0.0
}

/// Sort parameter rows by the frequency of the direct dimension (ascending).
pub fn sort_by_frequency(params: Array2<f64>, dim: usize) -> Array2<f64> {
    let column = 2 + dim - 1;
    let mut order: Vec<usize> = (0..params.nrows()).collect();
    order.sort_by(|&a, &b| params[[a, column]].total_cmp(&params[[b, column]]));
    params.select(Axis(0), &order)
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;
    use ndarray::array;

    use crate::signal::make_fid;

    #[test]
    fn test_noiseless_two_oscillators() {
        let expinfo = ExpInfo::new(vec![200.0], vec![20.0]).unwrap();
        let params = array![[1.0, 0.2, 70.0, 3.0], [2.0, -0.5, -30.0, 5.0]];
        let (fid, _) = make_fid(&params, &expinfo, &[64]).unwrap();
        let mpm = MatrixPencil::new(&expinfo, &fid, Some(2)).unwrap();
        let est = mpm.get_params().unwrap();
        assert_eq!(est.nrows(), 2);
        // Sorted by frequency
        assert_relative_eq!(est[[0, 2]], -30.0, epsilon = 1e-6);
        assert_relative_eq!(est[[0, 0]], 2.0, epsilon = 1e-6);
        assert_relative_eq!(est[[0, 1]], -0.5, epsilon = 1e-6);
        assert_relative_eq!(est[[0, 3]], 5.0, epsilon = 1e-6);
        assert_relative_eq!(est[[1, 2]], 70.0, epsilon = 1e-6);
    }

    #[test]
    fn test_zero_signal_gives_none() {
        let expinfo = ExpInfo::new(vec![200.0], vec![0.0]).unwrap();
        let data = ArrayD::<Complex64>::zeros(ndarray::IxDyn(&[32]));
        let mpm = MatrixPencil::new(&expinfo, &data, None).unwrap();
        assert!(mpm.get_params().is_none());
        assert_eq!(mpm.oscillators(), 0);
    }

    #[test]
    fn test_rejects_short_signal() {
        let expinfo = ExpInfo::new(vec![200.0], vec![0.0]).unwrap();
        let data = ArrayD::<Complex64>::zeros(ndarray::IxDyn(&[2]));
        assert!(MatrixPencil::new(&expinfo, &data, None).is_err());
    }

    #[test]
    fn test_undamped_and_growing_poles_are_rejected() {
        assert!(decays(Complex64::from_polar(0.99, 0.3), 1000.0));
        assert!(!decays(Complex64::new(1.0, 0.0), 1000.0));
        assert!(!decays(Complex64::from_polar(1.01, -0.3), 1000.0));
    }

    #[test]
    fn test_sort_by_frequency_2d_uses_direct_dimension() {
        let params = array![[1.0, 0.0, 5.0, 30.0, 1.0, 1.0], [1.0, 0.0, -5.0, 10.0, 1.0, 1.0]];
        let sorted = sort_by_frequency(params, 2);
        assert_eq!(sorted[[0, 3]], 10.0);
    }
}
