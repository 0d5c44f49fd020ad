//! Two-dimensional matrix pencil (modified matrix enhancement)
//!
//! The signal `x[n1, n2]` is arranged in a block Hankel matrix with `K` by
//! `N1 - K + 1` blocks, each block an `L` by `N2 - L + 1` Hankel matrix of a
//! row of the signal. Its signal subspace is shift invariant along both
//! dimensions:
//!
//! - dimension 1: dropping the last block row vs the first block row
//! - dimension 2: dropping the last row of each block vs the first
//!
//! The two pencil matrices share eigenvectors, which pairs the poles of the
//! two dimensions.

use std::f64::consts::PI;

use ndarray::{Array1, Array2, Axis};
use num_complex::Complex64;

use super::mdl::mdl_order;
use super::onedim::pencil_parameter;
use crate::error::{EspyError, Result};
use crate::expinfo::ExpInfo;
use crate::math::linalg::{lstsq_complex, pinv_complex, schur_complex, svd_complex};

/// Weight of the dimension-2 pencil in the matrix used for pairing.
const PAIRING_WEIGHT: f64 = 0.731;

/// Enhanced (block Hankel) matrix with `k` block rows of `l` rows each.
pub fn enhanced_matrix(data: &Array2<Complex64>, k: usize, l: usize) -> Array2<Complex64> {
    let (n1, n2) = data.dim();
    let block_cols = n2 - l + 1;
    Array2::from_shape_fn((k * l, (n1 - k + 1) * block_cols), |(row, col)| {
        let (p, i) = (row / l, row % l);
        let (q, j) = (col / block_cols, col % block_cols);
        data[[p + q, i + j]]
    })
}

/// Rows of `u` selected by `keep(block, row_in_block)`.
fn select_rows<F: Fn(usize, usize) -> bool>(u: &Array2<Complex64>, l: usize, keep: F) -> Array2<Complex64> {
    let rows: Vec<usize> = (0..u.nrows()).filter(|r| keep(r / l, r % l)).collect();
    u.select(Axis(0), &rows)
}

/// Paired signal poles `(z1, z2)` of a 2D signal.
pub(crate) fn signal_poles(
    data: &Array2<Complex64>,
    oscillators: Option<usize>,
) -> Result<Vec<(Complex64, Complex64)>> {
    let (n1, n2) = data.dim();
    let k = pencil_parameter(n1);
    let l = pencil_parameter(n2);
    let enhanced = enhanced_matrix(data, k, l);
    let svd = svd_complex(&enhanced)?;

    let order = match oscillators {
        Some(m) if m > 0 => m,
        _ => {
            let m = mdl_order(&svd.singular_values, n1 * n2);
            log::info!("number of oscillators estimated with MDL: {}", m);
            m
        }
    };
    let max_order = ((k - 1) * l).min(k * (l - 1)).min(svd.singular_values.len());
    let order = order.min(max_order);
    if order == 0 {
        return Ok(Vec::new());
    }

    let u_m = svd.u.slice(ndarray::s![.., ..order]).to_owned();
    let u1a = select_rows(&u_m, l, |p, _| p + 1 < k);
    let u1b = select_rows(&u_m, l, |p, _| p > 0);
    let u2a = select_rows(&u_m, l, |_, i| i + 1 < l);
    let u2b = select_rows(&u_m, l, |_, i| i > 0);

    let f1 = pinv_complex(&u1a)?.dot(&u1b);
    let f2 = pinv_complex(&u2a)?.dot(&u2b);

    let combined = &f1 + &f2.mapv(|v| v * PAIRING_WEIGHT);
    let (q, _) = schur_complex(&combined)?;
    let qh = q.t().mapv(|v| v.conj());
    let t1 = qh.dot(&f1).dot(&q);
    let t2 = qh.dot(&f2).dot(&q);

    Ok((0..order).map(|m| (t1[[m, m]], t2[[m, m]])).collect())
}

/// Least squares complex amplitudes for paired poles.
pub(crate) fn amplitudes_2d(
    data: &Array2<Complex64>,
    poles: &[(Complex64, Complex64)],
) -> Result<Array1<Complex64>> {
    let (n1, n2) = data.dim();
    let basis = Array2::from_shape_fn((n1 * n2, poles.len()), |(row, m)| {
        let (i, j) = (row / n2, row % n2);
        poles[m].0.powu(i as u32) * poles[m].1.powu(j as u32)
    });
    let flat: Array1<Complex64> = data.iter().cloned().collect();
    if flat.len() != n1 * n2 {
        return Err(EspyError::shape(format!("{} points", n1 * n2), format!("{}", flat.len())));
    }
    Ok(lstsq_complex(&basis, &flat)?)
}

/// Convert paired poles and amplitudes to `[a, φ, f1, f2, η1, η2]` rows.
pub(crate) fn to_params(
    poles: &[(Complex64, Complex64)],
    alpha: &Array1<Complex64>,
    expinfo: &ExpInfo,
) -> Array2<f64> {
    let sw = expinfo.sw_hz();
    let offset = expinfo.offset_hz();
    let mut params = Array2::zeros((poles.len(), 6));
    for (m, ((z1, z2), a)) in poles.iter().zip(alpha.iter()).enumerate() {
        params[[m, 0]] = a.norm();
        params[[m, 1]] = a.arg();
        params[[m, 2]] = offset[0] + sw[0] * z1.arg() / (2.0 * PI);
        params[[m, 3]] = offset[1] + sw[1] * z2.arg() / (2.0 * PI);
        params[[m, 4]] = -sw[0] * z1.norm().ln();
        params[[m, 5]] = -sw[1] * z2.norm().ln();
    }
    params
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    #[test]
    fn test_enhanced_matrix_layout() {
        let data = Array2::from_shape_fn((4, 5), |(i, j)| Complex64::new((10 * i + j) as f64, 0.0));
        let e = enhanced_matrix(&data, 2, 3);
        // 2 block rows of 3 rows, 3 block columns of 3 columns
        assert_eq!(e.dim(), (6, 9));
        // Block (p=1, q=2), entry (i=2, j=1) is x[3, 3]
        assert_eq!(e[[3 + 2, 2 * 3 + 1]].re, 33.0);
        assert_eq!(e[[0, 0]].re, 0.0);
    }

    #[test]
    fn test_two_paired_poles() {
        let za = (Complex64::from_polar(0.98, 0.5), Complex64::from_polar(0.97, -1.1));
        let zb = (Complex64::from_polar(0.95, -0.8), Complex64::from_polar(0.99, 0.3));
        let data = Array2::from_shape_fn((12, 14), |(i, j)| {
            za.0.powu(i as u32) * za.1.powu(j as u32)
                + Complex64::new(0.5, 0.5) * zb.0.powu(i as u32) * zb.1.powu(j as u32)
        });
        let mut poles = signal_poles(&data, Some(2)).unwrap();
        poles.sort_by(|a, b| a.0.arg().total_cmp(&b.0.arg()));
        assert_relative_eq!(poles[0].0.arg(), -0.8, epsilon = 1e-6);
        assert_relative_eq!(poles[0].1.arg(), 0.3, epsilon = 1e-6);
        assert_relative_eq!(poles[1].0.arg(), 0.5, epsilon = 1e-6);
        assert_relative_eq!(poles[1].1.arg(), -1.1, epsilon = 1e-6);
        assert_relative_eq!(poles[1].1.norm(), 0.97, epsilon = 1e-6);

        let alpha = amplitudes_2d(&data, &poles).unwrap();
        assert_relative_eq!(alpha[0].re, 0.5, epsilon = 1e-6);
        assert_relative_eq!(alpha[1].re, 1.0, epsilon = 1e-6);
    }
}
