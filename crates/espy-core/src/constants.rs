//! Numerical constants for estimation routines
//!
//! Provides standardized tolerance values and algorithm defaults
//! used throughout the library.

/// Tolerance for detecting near-zero values in division and singularity checks.
pub const NEAR_ZERO: f64 = 1e-15;

/// Relative tolerance used when forming pseudo-inverses from an SVD.
pub const PINV_TOLERANCE: f64 = 1e-12;

/// Tolerance for SVD solve in least squares problems.
pub const SVD_TOLERANCE: f64 = 1e-14;

// ============================================================================
// Matrix Pencil
// ============================================================================

/// Pencil parameter as a fraction of the signal length.
pub const PENCIL_FRACTION: f64 = 0.5;

/// Default maximum number of direct-dimension points handed to the MPM (1D).
pub const DEFAULT_MPM_TRIM: usize = 4096;

// ============================================================================
// Nonlinear programming
// ============================================================================

/// Default iteration cap for the trust-region methods.
pub const TRUST_REGION_MAX_ITERATIONS: usize = 100;

/// Default iteration cap for L-BFGS.
pub const LBFGS_MAX_ITERATIONS: usize = 500;

/// Gradient tolerance (infinity norm of the projected gradient).
pub const GRADIENT_TOLERANCE: f64 = 1e-10;

/// Objective decrease below which an iteration counts as stalled.
pub const OBJECTIVE_TOLERANCE: f64 = 1e-14;

/// Consecutive stalled trust-region iterations before stopping.
pub const STALL_ITERATIONS: usize = 10;

/// Number of (s, y) pairs kept by L-BFGS.
pub const LBFGS_HISTORY: usize = 10;

/// Lower bound applied to scaled damping factors.
pub const MIN_DAMPING: f64 = 1e-8;

// ============================================================================
// Filtering & noise
// ============================================================================

/// Power of the super-Gaussian used as the band-pass filter.
pub const SUPER_GAUSSIAN_POWER: f64 = 40.0;

/// Default cut ratio applied to signals handed to the MPM.
pub const DEFAULT_CUT_RATIO: f64 = 1.1;

/// Number of noise realisations drawn when matching a target SNR.
pub const NOISE_INSTANCES: usize = 100;

/// Points per subband used when the subband count is not given.
pub const POINTS_PER_SUBBAND: usize = 500;
