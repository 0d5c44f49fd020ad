//! Linear algebra operations
//!
//! This module provides a unified interface for matrix operations.
//! nalgebra is the backend; all ndarray<->nalgebra conversions are contained
//! here so the estimation code only ever sees ndarray types.

use nalgebra::{DMatrix, DVector};
use ndarray::{Array1, Array2};
use num_complex::Complex64;

use crate::constants::{NEAR_ZERO, PINV_TOLERANCE, SVD_TOLERANCE};

/// Thin singular value decomposition of a complex matrix
pub struct ComplexSvd {
    /// Left singular vectors, m x k
    pub u: Array2<Complex64>,
    /// Singular values, descending, length k
    pub singular_values: Vec<f64>,
    /// Conjugate-transposed right singular vectors, k x n
    pub vh: Array2<Complex64>,
}

// ============================================================================
// Conversion helpers (internal)
// ============================================================================

/// Convert ndarray Array2<Complex64> to nalgebra DMatrix<Complex<f64>>
#[inline]
fn to_na_complex(a: &Array2<Complex64>) -> DMatrix<nalgebra::Complex<f64>> {
    let (m, n) = a.dim();
    DMatrix::from_fn(m, n, |i, j| nalgebra::Complex::new(a[[i, j]].re, a[[i, j]].im))
}

/// Convert nalgebra DMatrix<Complex<f64>> to ndarray Array2<Complex64>
#[inline]
fn from_na_complex(m: &DMatrix<nalgebra::Complex<f64>>) -> Array2<Complex64> {
    Array2::from_shape_fn((m.nrows(), m.ncols()), |(i, j)| {
        Complex64::new(m[(i, j)].re, m[(i, j)].im)
    })
}

/// Convert ndarray Array2<f64> to nalgebra DMatrix<f64>
#[inline]
fn to_na_real(a: &Array2<f64>) -> DMatrix<f64> {
    let (m, n) = a.dim();
    DMatrix::from_fn(m, n, |i, j| a[[i, j]])
}

/// Convert nalgebra DMatrix<f64> to ndarray Array2<f64>
#[inline]
fn from_na_real(m: &DMatrix<f64>) -> Array2<f64> {
    Array2::from_shape_fn((m.nrows(), m.ncols()), |(i, j)| m[(i, j)])
}

// ============================================================================
// Matrix inversion
// ============================================================================

/// Invert a real matrix
///
/// Returns None if matrix is singular or non-square.
pub fn inv_real(a: &Array2<f64>) -> Option<Array2<f64>> {
    let (m, n) = a.dim();
    if m != n || m == 0 {
        return None;
    }

    let mat = to_na_real(a);
    mat.try_inverse().map(|inv| from_na_real(&inv))
}

/// Moore-Penrose pseudo-inverse of a complex matrix
pub fn pinv_complex(a: &Array2<Complex64>) -> Result<Array2<Complex64>, &'static str> {
    let (m, n) = a.dim();
    if m == 0 || n == 0 {
        return Err("Empty matrix");
    }
    let mat = to_na_complex(a);
    let max_sv = mat.norm();
    let pinv = mat.pseudo_inverse(PINV_TOLERANCE * max_sv.max(NEAR_ZERO))?;
    Ok(from_na_complex(&pinv))
}

// ============================================================================
// Eigenvalue decomposition
// ============================================================================

/// Compute the eigenvalues of a complex square matrix
///
/// The complex Schur form is upper triangular, so the eigenvalues are read
/// off its diagonal.
pub fn eigenvalues_complex(a: &Array2<Complex64>) -> Result<Vec<Complex64>, &'static str> {
    let (_, t) = schur_complex(a)?;
    Ok((0..t.nrows()).map(|i| t[[i, i]]).collect())
}

/// Complex Schur decomposition `A = Q T Q^H`, returning `(Q, T)`
pub fn schur_complex(
    a: &Array2<Complex64>,
) -> Result<(Array2<Complex64>, Array2<Complex64>), &'static str> {
    let (m, n) = a.dim();
    if m != n {
        return Err("Matrix must be square");
    }
    if m == 0 {
        return Ok((Array2::zeros((0, 0)), Array2::zeros((0, 0))));
    }
    let mat = to_na_complex(a);
    let schur = mat
        .try_schur(f64::EPSILON, 0)
        .ok_or("Schur decomposition did not converge")?;
    let (q, t) = schur.unpack();
    Ok((from_na_complex(&q), from_na_complex(&t)))
}

// ============================================================================
// Singular Value Decomposition
// ============================================================================

/// Thin SVD of a complex matrix with singular values sorted descending
pub fn svd_complex(a: &Array2<Complex64>) -> Result<ComplexSvd, &'static str> {
    let (m, n) = a.dim();
    if m == 0 || n == 0 {
        return Err("Empty matrix");
    }

    let mat = to_na_complex(a);
    let svd = mat.svd(true, true);

    let u = svd.u.as_ref().ok_or("SVD failed: no U matrix")?;
    let vh = svd.v_t.as_ref().ok_or("SVD failed: no Vh matrix")?;
    let sigma: Vec<f64> = svd.singular_values.iter().cloned().collect();

    let mut order: Vec<usize> = (0..sigma.len()).collect();
    order.sort_by(|&i, &j| sigma[j].total_cmp(&sigma[i]));

    let k = order.len();
    let u_arr = Array2::from_shape_fn((m, k), |(i, c)| {
        let v = u[(i, order[c])];
        Complex64::new(v.re, v.im)
    });
    let vh_arr = Array2::from_shape_fn((k, n), |(r, j)| {
        let v = vh[(order[r], j)];
        Complex64::new(v.re, v.im)
    });
    let singular_values = order.iter().map(|&i| sigma[i]).collect();

    Ok(ComplexSvd {
        u: u_arr,
        singular_values,
        vh: vh_arr,
    })
}

// ============================================================================
// Least Squares
// ============================================================================

/// Solve the complex least squares problem `A x = b` using SVD
///
/// Singular values below `SVD_TOLERANCE` are treated as zero.
pub fn lstsq_complex(
    a: &Array2<Complex64>,
    b: &Array1<Complex64>,
) -> Result<Array1<Complex64>, &'static str> {
    let (m, n) = a.dim();
    if m == 0 || n == 0 {
        return Err("Empty matrix");
    }
    if b.len() != m {
        return Err("Dimension mismatch");
    }

    let a_na = to_na_complex(a);
    let b_na = DVector::from_fn(m, |i, _| nalgebra::Complex::new(b[i].re, b[i].im));

    let svd = a_na.svd(true, true);
    let solution = svd
        .solve(&b_na, SVD_TOLERANCE)
        .map_err(|_| "SVD solve failed")?;

    Ok(Array1::from_iter(solution.iter().map(|v| Complex64::new(v.re, v.im))))
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    fn c(re: f64, im: f64) -> Complex64 {
        Complex64::new(re, im)
    }

    #[test]
    fn test_inv_real_identity() {
        let eye = Array2::<f64>::eye(3);
        let inv = inv_real(&eye).unwrap();
        for i in 0..3 {
            for j in 0..3 {
                let expected = if i == j { 1.0 } else { 0.0 };
                assert_relative_eq!(inv[[i, j]], expected, epsilon = 1e-10);
            }
        }
    }

    #[test]
    fn test_svd_reconstruction() {
        let a = Array2::from_shape_vec(
            (3, 2),
            vec![c(1.0, 1.0), c(2.0, 0.0), c(0.0, -1.0), c(1.0, 0.5), c(3.0, 0.0), c(0.0, 2.0)],
        )
        .unwrap();
        let svd = svd_complex(&a).unwrap();
        assert_eq!(svd.u.dim(), (3, 2));
        assert_eq!(svd.vh.dim(), (2, 2));
        assert!(svd.singular_values[0] >= svd.singular_values[1]);

        let mut us = svd.u.clone();
        for (j, s) in svd.singular_values.iter().enumerate() {
            us.column_mut(j).mapv_inplace(|v| v * *s);
        }
        let recon = us.dot(&svd.vh);
        for (x, y) in recon.iter().zip(a.iter()) {
            assert_relative_eq!(x.re, y.re, epsilon = 1e-10);
            assert_relative_eq!(x.im, y.im, epsilon = 1e-10);
        }
    }

    #[test]
    fn test_eigenvalues_complex_triangular() {
        let a = Array2::from_shape_vec(
            (2, 2),
            vec![c(1.0, 1.0), c(5.0, 0.0), c(0.0, 0.0), c(-2.0, 0.5)],
        )
        .unwrap();
        let mut eigs = eigenvalues_complex(&a).unwrap();
        eigs.sort_by(|x, y| x.re.total_cmp(&y.re));
        assert_relative_eq!(eigs[0].re, -2.0, epsilon = 1e-10);
        assert_relative_eq!(eigs[0].im, 0.5, epsilon = 1e-10);
        assert_relative_eq!(eigs[1].re, 1.0, epsilon = 1e-10);
        assert_relative_eq!(eigs[1].im, 1.0, epsilon = 1e-10);
    }

    #[test]
    fn test_pinv_left_inverse() {
        let a = Array2::from_shape_vec(
            (3, 2),
            vec![c(1.0, 0.0), c(0.0, 1.0), c(2.0, 0.0), c(1.0, 0.0), c(0.0, 0.0), c(1.0, -1.0)],
        )
        .unwrap();
        let p = pinv_complex(&a).unwrap();
        let prod = p.dot(&a);
        assert_relative_eq!(prod[[0, 0]].re, 1.0, epsilon = 1e-10);
        assert_relative_eq!(prod[[1, 1]].re, 1.0, epsilon = 1e-10);
        assert_relative_eq!(prod[[0, 1]].norm(), 0.0, epsilon = 1e-10);
    }

    #[test]
    fn test_lstsq_complex_exact() {
        let a = Array2::from_shape_vec(
            (3, 2),
            vec![c(1.0, 0.0), c(1.0, 0.0), c(1.0, 0.0), c(2.0, 0.0), c(1.0, 0.0), c(3.0, 0.0)],
        )
        .unwrap();
        let x_true = Array1::from_vec(vec![c(0.5, -1.0), c(2.0, 0.25)]);
        let b = a.dot(&x_true);
        let solution = lstsq_complex(&a, &b).unwrap();
        for (x, y) in solution.iter().zip(x_true.iter()) {
            assert_relative_eq!(x.re, y.re, epsilon = 1e-10);
            assert_relative_eq!(x.im, y.im, epsilon = 1e-10);
        }
    }
}
