//! Scalar conversion functions
//!
//! Decibel ratios and phase angles, as used by the noise generator and by
//! post-processing of fitted oscillator phases.

use std::f64::consts::PI;

/// Convert an amplitude ratio in dB to a linear ratio (10^(dB/20))
pub fn db_2_magnitude(db: f64) -> f64 {
    10.0_f64.powf(db / 20.0)
}

/// Convert a linear amplitude ratio to dB (20*log10(mag))
pub fn magnitude_2_db(mag: f64) -> f64 {
    20.0 * mag.log10()
}

/// Convert radians to degrees
pub fn radian_2_degree(rad: f64) -> f64 {
    rad * 180.0 / PI
}

/// Convert degrees to radians
pub fn degree_2_radian(deg: f64) -> f64 {
    deg * PI / 180.0
}

/// Wrap a phase into the interval (-π, π]
pub fn wrap_phase(phi: f64) -> f64 {
    let wrapped = (phi + PI).rem_euclid(2.0 * PI) - PI;
    if wrapped <= -PI {
        wrapped + 2.0 * PI
    } else {
        wrapped
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    #[test]
    fn test_magnitude_2_db() {
        assert_relative_eq!(magnitude_2_db(10.0), 20.0, epsilon = 1e-10);
    }

    #[test]
    fn test_db_2_magnitude() {
        assert_relative_eq!(db_2_magnitude(20.0), 10.0, epsilon = 1e-10);
        assert_relative_eq!(db_2_magnitude(magnitude_2_db(3.7)), 3.7, epsilon = 1e-10);
    }

    #[test]
    fn test_radian_2_degree() {
        assert_relative_eq!(radian_2_degree(PI), 180.0, epsilon = 1e-10);
        assert_relative_eq!(degree_2_radian(90.0), PI / 2.0, epsilon = 1e-10);
    }

    #[test]
    fn test_wrap_phase() {
        assert_relative_eq!(wrap_phase(0.5), 0.5, epsilon = 1e-12);
        assert_relative_eq!(wrap_phase(PI), PI, epsilon = 1e-12);
        assert_relative_eq!(wrap_phase(-PI), PI, epsilon = 1e-12);
        assert_relative_eq!(wrap_phase(3.0 * PI / 2.0), -PI / 2.0, epsilon = 1e-12);
        assert_relative_eq!(wrap_phase(-5.0 * PI / 2.0), -PI / 2.0, epsilon = 1e-12);
    }
}
