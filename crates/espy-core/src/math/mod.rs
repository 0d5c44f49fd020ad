//! Mathematical functions module
//!
//! Provides scalar conversions, axis-wise FFTs and the linear algebra
//! backend used by the estimators.

pub mod conversions;
pub mod fft;
pub mod linalg;

pub use conversions::*;
pub use fft::{fft_axis, fftshift_axis, flip_axis, ifftshift_axis, FftDirection};
