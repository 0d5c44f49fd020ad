//! Synthetic signal construction
//!
//! A signal is a sum of damped complex sinusoids:
//!
//! ```text
//! y[n_1, ..., n_D] = Σ_m a_m e^{iφ_m} Π_d e^{(2πi (f_{m,d} - offset_d) - η_{m,d}) n_d / sw_d}
//! ```

use std::f64::consts::PI;

use ndarray::{Array1, Array2, ArrayD, Axis};
use num_complex::Complex64;
use rand::Rng;

use super::noise::add_noise;
use crate::error::{EspyError, Result};
use crate::expinfo::ExpInfo;

/// Indirect-dimension modulation used when building 2D signals
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum Modulation {
    /// A single complex signal
    #[default]
    None,
    /// Cosine / sine modulated pair (real and imaginary parts of the t1 pole)
    Amp,
    /// P-type / N-type pair (± frequency sign in t1)
    Phase,
}

/// Check that `params` is a parameter array for a `dim`-dimensional signal.
pub(crate) fn check_params(params: &Array2<f64>, dim: usize) -> Result<()> {
    let width = 2 + 2 * dim;
    if params.ncols() != width {
        return Err(EspyError::invalid(
            "params",
            format!("expected {} columns for {}D data, found {}", width, dim, params.ncols()),
        ));
    }
    if params.iter().any(|v| !v.is_finite()) {
        return Err(EspyError::invalid("params", "all values must be finite"));
    }
    Ok(())
}

/// Check that `pts` gives a positive number of points for each dimension.
pub(crate) fn check_pts(pts: &[usize], dim: usize) -> Result<()> {
    if pts.len() != dim {
        return Err(EspyError::invalid(
            "pts",
            format!("expected {} values, found {}", dim, pts.len()),
        ));
    }
    if pts.iter().any(|&p| p == 0) {
        return Err(EspyError::invalid("pts", "every dimension needs at least one point"));
    }
    Ok(())
}

/// Time points at which a signal of `pts` points was sampled.
///
/// # Returns
/// One array per dimension, `[0, 1/sw, ..., (pts-1)/sw]`.
pub fn get_timepoints(expinfo: &ExpInfo, pts: &[usize]) -> Result<Vec<Array1<f64>>> {
    check_pts(pts, expinfo.dim())?;
    Ok(pts
        .iter()
        .zip(expinfo.sw_hz())
        .map(|(&n, &sw)| Array1::from_shape_fn(n, |i| i as f64 / sw))
        .collect())
}

/// Poles `exp((2πi f' - η) t)` for each oscillator, shape `(pts, M)`.
///
/// `sign` flips the frequency, used for N-type signals.
fn vandermonde(tp: &Array1<f64>, freq: &[f64], damp: &[f64], sign: f64) -> Array2<Complex64> {
    Array2::from_shape_fn((tp.len(), freq.len()), |(n, m)| {
        (Complex64::new(-damp[m], sign * 2.0 * PI * freq[m]) * tp[n]).exp()
    })
}

/// Centred frequencies and damping factors of dimension `axis`.
fn dimension_columns(params: &Array2<f64>, expinfo: &ExpInfo, axis: usize) -> (Vec<f64>, Vec<f64>) {
    let dim = expinfo.dim();
    let offset = expinfo.offset_hz()[axis];
    let freq = params.column(2 + axis).iter().map(|f| f - offset).collect();
    let damp = params.column(2 + dim + axis).to_vec();
    (freq, damp)
}

fn complex_amplitudes(params: &Array2<f64>) -> Array1<Complex64> {
    params
        .rows()
        .into_iter()
        .map(|row| Complex64::from_polar(row[0], row[1]))
        .collect()
}

/// Build a noiseless signal from a parameter array.
///
/// # Arguments
/// * `params` - Parameter array, shape `(M, 2 + 2D)`
/// * `expinfo` - Experiment information
/// * `pts` - Number of points in each dimension
///
/// # Returns
/// The signal and the time points it was sampled at
pub fn make_fid(
    params: &Array2<f64>,
    expinfo: &ExpInfo,
    pts: &[usize],
) -> Result<(ArrayD<Complex64>, Vec<Array1<f64>>)> {
    let (mut fids, tp) = make_modulated_fid(params, expinfo, pts, Modulation::None)?;
    let fid = fids.remove(0);
    Ok((fid, tp))
}

/// Build a noiseless signal, returning one array per modulation component.
///
/// 1D signals and 2D signals with [`Modulation::None`] produce a single
/// array; [`Modulation::Amp`] and [`Modulation::Phase`] produce a pair.
pub fn make_modulated_fid(
    params: &Array2<f64>,
    expinfo: &ExpInfo,
    pts: &[usize],
    modulation: Modulation,
) -> Result<(Vec<ArrayD<Complex64>>, Vec<Array1<f64>>)> {
    let dim = expinfo.dim();
    check_params(params, dim)?;
    let tp = get_timepoints(expinfo, pts)?;
    let alpha = complex_amplitudes(params);

    if dim == 1 {
        if modulation != Modulation::None {
            return Err(EspyError::invalid("modulation", "only applies to 2D signals"));
        }
        let (freq, damp) = dimension_columns(params, expinfo, 0);
        let z = vandermonde(&tp[0], &freq, &damp, 1.0);
        let fid = z.dot(&alpha).into_dyn();
        return Ok((vec![fid], tp));
    }

    let (f1, d1) = dimension_columns(params, expinfo, 0);
    let (f2, d2) = dimension_columns(params, expinfo, 1);
    let z1 = vandermonde(&tp[0], &f1, &d1, 1.0);
    let z1_components: Vec<Array2<Complex64>> = match modulation {
        Modulation::None => vec![z1],
        Modulation::Amp => vec![
            z1.mapv(|v| Complex64::new(v.re, 0.0)),
            z1.mapv(|v| Complex64::new(v.im, 0.0)),
        ],
        Modulation::Phase => vec![z1, vandermonde(&tp[0], &f1, &d1, -1.0)],
    };
    // Z2 with oscillators along rows, scaled by the complex amplitudes
    let mut a_z2t = vandermonde(&tp[1], &f2, &d2, 1.0).reversed_axes();
    for (mut row, a) in a_z2t.axis_iter_mut(Axis(0)).zip(alpha.iter()) {
        row.mapv_inplace(|v| v * a);
    }

    let fids = z1_components
        .iter()
        .map(|z| z.dot(&a_z2t).into_dyn())
        .collect();
    Ok((fids, tp))
}

/// Build a signal and add Gaussian noise at the requested SNR.
///
/// # Arguments
/// * `snr` - Signal-to-noise ratio
/// * `decibels` - Whether `snr` is given in dB
/// * `rng` - Random source used for the noise
pub fn make_noisy_fid<R: Rng + ?Sized>(
    params: &Array2<f64>,
    expinfo: &ExpInfo,
    pts: &[usize],
    snr: f64,
    decibels: bool,
    rng: &mut R,
) -> Result<(ArrayD<Complex64>, Vec<Array1<f64>>)> {
    let (mut fid, tp) = make_fid(params, expinfo, pts)?;
    add_noise(&mut fid, snr, decibels, rng)?;
    Ok((fid, tp))
}

/// Draw a random parameter array of `oscillators` oscillators.
///
/// Amplitudes are uniform in `[0, 1)`, phases in `[-π, π)`, frequencies span
/// the sweep width about the offset and damping factors lie in `[0.1, 0.3)`.
pub fn random_parameters<R: Rng + ?Sized>(
    oscillators: usize,
    expinfo: &ExpInfo,
    rng: &mut R,
) -> Result<Array2<f64>> {
    if oscillators == 0 {
        return Err(EspyError::invalid("oscillators", "must be positive"));
    }
    let dim = expinfo.dim();
    let sw = expinfo.sw_hz().to_vec();
    let offset = expinfo.offset_hz().to_vec();
    let mut params = Array2::zeros((oscillators, 2 + 2 * dim));
    for mut row in params.rows_mut() {
        row[0] = rng.gen_range(0.0..1.0);
        row[1] = rng.gen_range(-PI..PI);
        for d in 0..dim {
            row[2 + d] = rng.gen_range(offset[d] - sw[d] / 2.0..offset[d] + sw[d] / 2.0);
            row[2 + dim + d] = rng.gen_range(0.1..0.3);
        }
    }
    Ok(params)
}

/// Reshape helper used when callers need a flat view of a 1D signal.
pub(crate) fn as_1d(data: &ArrayD<Complex64>) -> Result<Array1<Complex64>> {
    data.view()
        .into_dimensionality::<ndarray::Ix1>()
        .map(|v| v.to_owned())
        .map_err(|_| EspyError::shape("1D signal", format!("{:?}", data.shape())))
}

/// Reshape helper used when callers need a 2D signal.
pub(crate) fn as_2d(data: &ArrayD<Complex64>) -> Result<Array2<Complex64>> {
    data.view()
        .into_dimensionality::<ndarray::Ix2>()
        .map(|v| v.to_owned())
        .map_err(|_| EspyError::shape("2D signal", format!("{:?}", data.shape())))
}

/// An empty parameter array for a `dim`-dimensional signal.
pub(crate) fn empty_params(dim: usize) -> Array2<f64> {
    Array2::zeros((0, 2 + 2 * dim))
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;
    use ndarray::array;

    fn expinfo_1d() -> ExpInfo {
        ExpInfo::new(vec![100.0], vec![10.0]).unwrap()
    }

    #[test]
    fn test_timepoints() {
        let tp = get_timepoints(&expinfo_1d(), &[5]).unwrap();
        assert_eq!(tp.len(), 1);
        assert_relative_eq!(tp[0][0], 0.0);
        assert_relative_eq!(tp[0][4], 0.04, epsilon = 1e-15);
    }

    #[test]
    fn test_single_oscillator_1d() {
        let params = array![[2.0, 0.5, 30.0, 4.0]];
        let (fid, _) = make_fid(&params, &expinfo_1d(), &[8]).unwrap();
        assert_eq!(fid.shape(), &[8]);
        let first = fid[[0]];
        assert_relative_eq!(first.norm(), 2.0, epsilon = 1e-12);
        assert_relative_eq!(first.arg(), 0.5, epsilon = 1e-12);

        // Successive points differ by the pole exp((2πi (f - off) - η) / sw)
        let pole = (Complex64::new(-4.0, 2.0 * PI * 20.0) / 100.0).exp();
        let ratio = fid[[3]] / fid[[2]];
        assert_relative_eq!(ratio.re, pole.re, epsilon = 1e-12);
        assert_relative_eq!(ratio.im, pole.im, epsilon = 1e-12);
    }

    #[test]
    fn test_2d_separable() {
        let expinfo = ExpInfo::new(vec![50.0, 200.0], vec![0.0, 20.0]).unwrap();
        let params = array![[1.0, 0.0, 5.0, 40.0, 1.0, 3.0]];
        let (fid, _) = make_fid(&params, &expinfo, &[4, 6]).unwrap();
        assert_eq!(fid.shape(), &[4, 6]);
        // Rank one: y[i, j] y[0, 0] == y[i, 0] y[0, j]
        let lhs = fid[[2, 3]] * fid[[0, 0]];
        let rhs = fid[[2, 0]] * fid[[0, 3]];
        assert_relative_eq!(lhs.re, rhs.re, epsilon = 1e-12);
        assert_relative_eq!(lhs.im, rhs.im, epsilon = 1e-12);
    }

    #[test]
    fn test_amp_modulation_pair() {
        let expinfo = ExpInfo::new(vec![50.0, 200.0], vec![0.0, 20.0]).unwrap();
        let params = array![[1.0, 0.3, 5.0, 40.0, 1.0, 3.0]];
        let (plain, _) = make_fid(&params, &expinfo, &[4, 6]).unwrap();
        let (pair, _) = make_modulated_fid(&params, &expinfo, &[4, 6], Modulation::Amp).unwrap();
        assert_eq!(pair.len(), 2);
        // cos + i sin reconstructs the complex t1 modulation
        let sum = &pair[0] + &pair[1].mapv(|v| v * Complex64::i());
        for (a, b) in sum.iter().zip(plain.iter()) {
            assert_relative_eq!(a.re, b.re, epsilon = 1e-12);
            assert_relative_eq!(a.im, b.im, epsilon = 1e-12);
        }
    }

    #[test]
    fn test_bad_params_width() {
        let params = array![[1.0, 0.0, 5.0]];
        assert!(make_fid(&params, &expinfo_1d(), &[8]).is_err());
        assert!(make_fid(&array![[1.0, 0.0, 5.0, 1.0]], &expinfo_1d(), &[0]).is_err());
    }
}
