//! Subband estimation
//!
//! The direct dimension is split into equally wide subbands which are
//! estimated one after another and combined into a single result.

use ndarray::{concatenate, Array2, Axis};

use super::result::argsort;
use super::{EstimateOptions, EstimationResult, Estimator, InitialGuess};
use crate::constants::POINTS_PER_SUBBAND;
use crate::error::{EspyError, Result};
use crate::expinfo::{Bounds, FrequencyUnit, Region};
use crate::signal::empty_params;

/// Options for [`Estimator::subband_estimate`]
#[derive(Debug, Clone, PartialEq)]
pub struct SubbandOptions {
    /// Number of subbands; `None` uses one per 500 direct-dimension points
    pub nsubbands: Option<usize>,
    /// Unit of the noise region
    pub noise_region_unit: FrequencyUnit,
    /// Settings for each subband. The initial guess is always MPM with MDL
    /// and the region unit is Hz.
    pub estimate: EstimateOptions,
}

impl Default for SubbandOptions {
    fn default() -> Self {
        Self {
            nsubbands: None,
            noise_region_unit: FrequencyUnit::Hz,
            estimate: EstimateOptions {
                mpm_trim: Some(128),
                nlp_trim: Some(256),
                ..EstimateOptions::default()
            },
        }
    }
}

/// Default number of subbands for `pts` direct-dimension points.
pub(crate) fn default_subbands(pts: usize) -> usize {
    ((pts as f64 / POINTS_PER_SUBBAND as f64).round() as usize).max(1)
}

/// Split `[high, low]` (Hz, high first) into `n` equal bands.
pub(crate) fn subband_bounds(high: f64, low: f64, n: usize) -> Vec<Bounds> {
    let width = (high - low) / n as f64;
    (0..n)
        .map(|k| (high - k as f64 * width, high - (k + 1) as f64 * width))
        .collect()
}

impl Estimator {
    /// Estimate the whole signal as a series of frequency-filtered subbands.
    ///
    /// Subbands in which no oscillators are found contribute nothing; the
    /// loop carries on. The combined parameters are appended as one result
    /// covering the full spectral window.
    ///
    /// # Arguments
    /// * `noise_region` - Direct-dimension bounds of a signal-free region
    /// * `options` - Subband count and per-subband estimation settings
    pub fn subband_estimate(&mut self, noise_region: Bounds, options: &SubbandOptions) -> Result<()> {
        let dim = self.dim();
        let axis = dim - 1;
        let pts = self.data.shape()[axis];
        let nsubbands = options.nsubbands.unwrap_or_else(|| default_subbands(pts));
        if nsubbands == 0 {
            return Err(EspyError::invalid("nsubbands", "must be positive"));
        }
        if nsubbands > pts / 2 {
            return Err(EspyError::invalid(
                "nsubbands",
                format!("at most {} subbands fit in {} points", pts / 2, pts),
            ));
        }
        self.expinfo.check_unit("noise_region_unit", options.noise_region_unit)?;
        let to_hz = |v: f64| {
            self.expinfo
                .convert_value(v, axis, options.noise_region_unit, FrequencyUnit::Hz, pts)
        };
        let noise_hz = (to_hz(noise_region.0)?, to_hz(noise_region.1)?);

        let full = self.full_region()?;
        let (high, low) = full[axis].ok_or_else(|| EspyError::invalid("data", "empty direct dimension"))?;
        let bands = subband_bounds(high, low, nsubbands);
        let band_options = EstimateOptions {
            region_unit: FrequencyUnit::Hz,
            initial_guess: InitialGuess::Auto,
            ..options.estimate.clone()
        };

        log::info!("subband estimation: {} subbands of {:.3} Hz", nsubbands, (high - low) / nsubbands as f64);
        let mut params = vec![empty_params(dim)];
        let mut errors = vec![empty_params(dim)];
        for (k, band) in bands.iter().enumerate() {
            log::info!("subband {}/{}: {:?} Hz", k + 1, nsubbands, band);
            match self.run_estimate(Some(*band), Some(noise_hz), &band_options) {
                Ok(result) => {
                    if result.is_empty() {
                        log::info!("subband {} contains no oscillators", k + 1);
                    }
                    params.push(result.params);
                    errors.push(result.errors);
                }
                Err(EspyError::Linalg(msg)) => {
                    log::warn!("subband {} skipped after a decomposition failure: {}", k + 1, msg);
                }
                Err(e) => return Err(e),
            }
        }

        let stack = |arrays: &[Array2<f64>]| -> Result<Array2<f64>> {
            let views: Vec<_> = arrays.iter().map(|a| a.view()).collect();
            concatenate(Axis(0), &views).map_err(|e| EspyError::shape("parameter arrays", e.to_string()))
        };
        let params = stack(&params)?;
        let errors = stack(&errors)?;
        let order = argsort(&params, 2 + axis);

        let mut region: Region = vec![None; dim];
        region[axis] = Some((high, low));
        let mut noise: Region = vec![None; dim];
        noise[axis] = Some(noise_hz);
        let result = EstimationResult::new(
            params.select(Axis(0), &order),
            errors.select(Axis(0), &order),
            region,
            Some(noise),
            self.expinfo.sfo().map(|s| s.to_vec()),
            true,
        );
        log::info!("subband estimation complete: {} oscillators", result.oscillators());

        self.log.record(
            "subband_estimate",
            vec![
                ("noise_region", format!("{:?}", noise_region)),
                ("options", format!("{:?}", options)),
            ],
        );
        self.results.push(result);
        Ok(())
    }
}
