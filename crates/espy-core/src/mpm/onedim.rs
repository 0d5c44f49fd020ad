//! One-dimensional matrix pencil

use std::f64::consts::PI;

use ndarray::{s, Array1, Array2};
use num_complex::Complex64;

use super::mdl::mdl_order;
use crate::constants::PENCIL_FRACTION;
use crate::error::Result;
use crate::expinfo::ExpInfo;
use crate::math::linalg::{eigenvalues_complex, lstsq_complex, pinv_complex, svd_complex};

/// Hankel matrix `Y[i, j] = x[i + j]` of shape `(N - L, L + 1)`.
pub fn hankel(data: &Array1<Complex64>, pencil: usize) -> Array2<Complex64> {
    let n = data.len();
    Array2::from_shape_fn((n - pencil, pencil + 1), |(i, j)| data[i + j])
}

/// Pencil parameter for `n` samples.
pub(crate) fn pencil_parameter(n: usize) -> usize {
    ((n as f64 * PENCIL_FRACTION).floor() as usize).clamp(1, n.saturating_sub(1).max(1))
}

/// Least squares complex amplitudes for poles `z` over `n` samples.
pub(crate) fn amplitudes_1d(data: &Array1<Complex64>, poles: &[Complex64]) -> Result<Array1<Complex64>> {
    let vandermonde = Array2::from_shape_fn((data.len(), poles.len()), |(n, m)| poles[m].powu(n as u32));
    Ok(lstsq_complex(&vandermonde, data)?)
}

/// Signal poles of a 1D signal.
///
/// # Returns
/// The poles, or an empty vector if the selected model order is zero
pub(crate) fn signal_poles(data: &Array1<Complex64>, oscillators: Option<usize>) -> Result<Vec<Complex64>> {
    let n = data.len();
    let pencil = pencil_parameter(n);
    let y = hankel(data, pencil);
    let svd = svd_complex(&y)?;

    let order = match oscillators {
        Some(m) if m > 0 => m,
        _ => {
            let m = mdl_order(&svd.singular_values, n);
            log::info!("number of oscillators estimated with MDL: {}", m);
            m
        }
    };
    let order = order.min(svd.singular_values.len()).min(y.nrows() - 1);
    if order == 0 {
        return Ok(Vec::new());
    }

    let u_m = svd.u.slice(s![.., ..order]);
    let rows = u_m.nrows();
    let u1 = u_m.slice(s![..rows - 1, ..]).to_owned();
    let u2 = u_m.slice(s![1.., ..]).to_owned();
    let pencil_matrix = pinv_complex(&u1)?.dot(&u2);
    Ok(eigenvalues_complex(&pencil_matrix)?)
}

/// Convert poles and complex amplitudes to a parameter array.
pub(crate) fn to_params(
    poles: &[Complex64],
    alpha: &Array1<Complex64>,
    expinfo: &ExpInfo,
) -> Array2<f64> {
    let sw = expinfo.sw_hz()[0];
    let offset = expinfo.offset_hz()[0];
    let mut params = Array2::zeros((poles.len(), 4));
    for (m, (z, a)) in poles.iter().zip(alpha.iter()).enumerate() {
        params[[m, 0]] = a.norm();
        params[[m, 1]] = a.arg();
        params[[m, 2]] = offset + sw * z.arg() / (2.0 * PI);
        params[[m, 3]] = -sw * z.norm().ln();
    }
    params
}
