//! Spin-dynamics simulation backends
//!
//! Simulated pulse-acquire signals are produced by an injected
//! [`SpinSimulator`]. No backend ships with the crate;
//! [`UnavailableSimulator`] reports that simulation is not possible.

use ndarray::Array1;
use num_complex::Complex64;

use crate::error::{EspyError, Result};

/// A spin system: chemical shifts and scalar couplings.
#[derive(Debug, Clone, PartialEq)]
pub struct SpinSystem {
    /// Chemical shift of each spin (ppm)
    pub shifts: Vec<f64>,
    /// `(i, j, J)` with 0-based spin indices and the coupling in Hz
    pub couplings: Vec<(usize, usize, f64)>,
}

impl SpinSystem {
    pub fn new(shifts: Vec<f64>, couplings: Vec<(usize, usize, f64)>) -> Result<Self> {
        if shifts.is_empty() {
            return Err(EspyError::invalid("shifts", "at least one spin is required"));
        }
        let n = shifts.len();
        for &(i, j, coupling) in &couplings {
            if i >= n || j >= n || i == j {
                return Err(EspyError::invalid(
                    "couplings",
                    format!("pair ({}, {}) must reference two distinct spins below {}", i, j, n),
                ));
            }
            if !coupling.is_finite() {
                return Err(EspyError::invalid("couplings", "coupling constants must be finite"));
            }
        }
        Ok(Self { shifts, couplings })
    }
}

/// Acquisition settings for a simulated pulse-acquire experiment
#[derive(Debug, Clone, PartialEq)]
pub struct PulseAcquire {
    pub pts: usize,
    /// Sweep width (Hz)
    pub sw: f64,
    /// Transmitter offset (Hz)
    pub offset: f64,
    /// Transmitter frequency (MHz)
    pub sfo: f64,
    pub nucleus: String,
    /// SNR in dB; `None` gives a noiseless signal
    pub snr: Option<f64>,
    /// Exponential line broadening; the final point is scaled by `e^{-lb}`
    pub lb: f64,
}

impl Default for PulseAcquire {
    fn default() -> Self {
        Self {
            pts: 4096,
            sw: 5000.0,
            offset: 0.0,
            sfo: 500.0,
            nucleus: "1H".to_string(),
            snr: Some(20.0),
            lb: 6.91,
        }
    }
}

/// Produces the noiseless, unapodised FID of a spin system.
pub trait SpinSimulator {
    fn simulate(&self, system: &SpinSystem, acquisition: &PulseAcquire) -> Result<Array1<Complex64>>;
}

/// Backend used when no simulator is available
#[derive(Debug, Clone, Copy, Default)]
pub struct UnavailableSimulator;

impl SpinSimulator for UnavailableSimulator {
    fn simulate(&self, _system: &SpinSystem, _acquisition: &PulseAcquire) -> Result<Array1<Complex64>> {
        Err(EspyError::SimulatorUnavailable(
            "no spin-dynamics backend is configured".to_string(),
        ))
    }
}
