//! Axis-wise discrete Fourier transforms
//!
//! Thin layer over rustfft that applies 1D transforms along a chosen axis of
//! an n-dimensional ndarray, together with the `fftshift` family.

use ndarray::{Array, ArrayViewMut1, Axis, Dimension};
use num_complex::Complex64;
use rustfft::FftPlanner;

/// Direction of a transform
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FftDirection {
    Forward,
    /// Inverse transform, normalised by `1/n`
    Inverse,
}

/// Apply a 1D FFT along `axis`, in place.
///
/// Every lane along `axis` is transformed with the same plan.
pub fn fft_axis<D: Dimension>(data: &mut Array<Complex64, D>, axis: usize, direction: FftDirection) {
    let n = data.len_of(Axis(axis));
    if n == 0 {
        return;
    }

    let mut planner = FftPlanner::new();
    let plan = match direction {
        FftDirection::Forward => planner.plan_fft_forward(n),
        FftDirection::Inverse => planner.plan_fft_inverse(n),
    };
    let scale = match direction {
        FftDirection::Forward => 1.0,
        FftDirection::Inverse => 1.0 / n as f64,
    };

    let mut buffer: Vec<Complex64> = Vec::with_capacity(n);
    for mut lane in data.lanes_mut(Axis(axis)) {
        buffer.clear();
        buffer.extend(lane.iter().cloned());
        plan.process(&mut buffer);
        for (dst, src) in lane.iter_mut().zip(buffer.iter()) {
            *dst = *src * scale;
        }
    }
}

/// Cyclically shift a single lane so that element `i` moves to `(i + shift) % n`
fn roll_lane(mut lane: ArrayViewMut1<Complex64>, shift: usize) {
    let n = lane.len();
    if n == 0 || shift % n == 0 {
        return;
    }
    let original: Vec<Complex64> = lane.iter().cloned().collect();
    for (i, v) in original.into_iter().enumerate() {
        lane[(i + shift) % n] = v;
    }
}

/// Move the zero-frequency bin to the centre of `axis` (numpy convention)
pub fn fftshift_axis<D: Dimension>(data: &mut Array<Complex64, D>, axis: usize) {
    let n = data.len_of(Axis(axis));
    for lane in data.lanes_mut(Axis(axis)) {
        roll_lane(lane, n / 2);
    }
}

/// Inverse of [`fftshift_axis`]
pub fn ifftshift_axis<D: Dimension>(data: &mut Array<Complex64, D>, axis: usize) {
    let n = data.len_of(Axis(axis));
    for lane in data.lanes_mut(Axis(axis)) {
        roll_lane(lane, n - n / 2);
    }
}

/// Reverse the order of elements along `axis`
pub fn flip_axis<D: Dimension>(data: &Array<Complex64, D>, axis: usize) -> Array<Complex64, D> {
    let mut view = data.view();
    view.invert_axis(Axis(axis));
    view.to_owned()
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;
    use ndarray::{array, Array1, Array2};

    fn c(re: f64) -> Complex64 {
        Complex64::new(re, 0.0)
    }

    #[test]
    fn test_fft_impulse() {
        let mut x = Array1::from_vec(vec![c(1.0), c(0.0), c(0.0), c(0.0)]);
        fft_axis(&mut x, 0, FftDirection::Forward);
        for v in x.iter() {
            assert_relative_eq!(v.re, 1.0, epsilon = 1e-12);
            assert_relative_eq!(v.im, 0.0, epsilon = 1e-12);
        }
    }

    #[test]
    fn test_inverse_is_normalised() {
        let original = array![c(1.0), c(-2.0), Complex64::new(0.5, 3.0), c(4.0), c(0.0)];
        let mut x = original.clone();
        fft_axis(&mut x, 0, FftDirection::Forward);
        fft_axis(&mut x, 0, FftDirection::Inverse);
        for (a, b) in x.iter().zip(original.iter()) {
            assert_relative_eq!(a.re, b.re, epsilon = 1e-12);
            assert_relative_eq!(a.im, b.im, epsilon = 1e-12);
        }
    }

    #[test]
    fn test_fftshift_even_and_odd() {
        let mut even = array![c(0.0), c(1.0), c(2.0), c(3.0)];
        fftshift_axis(&mut even, 0);
        let got: Vec<f64> = even.iter().map(|v| v.re).collect();
        assert_eq!(got, vec![2.0, 3.0, 0.0, 1.0]);

        let mut odd = array![c(0.0), c(1.0), c(2.0), c(3.0), c(4.0)];
        fftshift_axis(&mut odd, 0);
        let got: Vec<f64> = odd.iter().map(|v| v.re).collect();
        assert_eq!(got, vec![3.0, 4.0, 0.0, 1.0, 2.0]);

        ifftshift_axis(&mut odd, 0);
        let got: Vec<f64> = odd.iter().map(|v| v.re).collect();
        assert_eq!(got, vec![0.0, 1.0, 2.0, 3.0, 4.0]);
    }

    #[test]
    fn test_axis_wise_2d() {
        let mut x = Array2::from_shape_fn((2, 4), |(i, j)| c((i * 4 + j) as f64));
        let copy = x.clone();
        fft_axis(&mut x, 1, FftDirection::Forward);
        // DC bin of each row is the row sum
        assert_relative_eq!(x[[0, 0]].re, 6.0, epsilon = 1e-12);
        assert_relative_eq!(x[[1, 0]].re, 22.0, epsilon = 1e-12);
        fft_axis(&mut x, 1, FftDirection::Inverse);
        for (a, b) in x.iter().zip(copy.iter()) {
            assert_relative_eq!(a.re, b.re, epsilon = 1e-12);
        }
    }

    #[test]
    fn test_flip_axis() {
        let x = Array2::from_shape_fn((2, 3), |(i, j)| c((i * 3 + j) as f64));
        let flipped = flip_axis(&x, 1);
        assert_eq!(flipped[[0, 0]].re, 2.0);
        assert_eq!(flipped[[1, 2]].re, 3.0);
    }
}
