//! Editing of estimation results
//!
//! Each edit builds a new parameter array from an existing result and re-runs
//! the fit over the result's region with that array as the initial guess. The
//! stored result is only replaced once the new fit has succeeded.

use std::collections::BTreeSet;

use ndarray::{concatenate, Array2, Axis};

use super::{EstimateOptions, Estimator, InitialGuess};
use crate::error::{EspyError, Result};
use crate::expinfo::FrequencyUnit;
use crate::math::wrap_phase;
use crate::signal::check_params;

/// Validate oscillator indices, returning them sorted and deduplicated.
fn oscillator_set(name: &'static str, indices: &[usize], count: usize) -> Result<Vec<usize>> {
    if indices.is_empty() {
        return Err(EspyError::invalid(name, "at least one oscillator is required"));
    }
    let set: BTreeSet<usize> = indices.iter().copied().collect();
    if set.len() != indices.len() {
        return Err(EspyError::invalid(name, "indices must be unique"));
    }
    if let Some(&bad) = set.iter().find(|&&i| i >= count) {
        return Err(EspyError::invalid(
            name,
            format!("index {} out of range for {} oscillators", bad, count),
        ));
    }
    Ok(set.into_iter().collect())
}

fn keep_except(params: &Array2<f64>, drop: &[usize]) -> Array2<f64> {
    let keep: Vec<usize> = (0..params.nrows()).filter(|i| !drop.contains(i)).collect();
    params.select(Axis(0), &keep)
}

fn stack(a: &Array2<f64>, b: &Array2<f64>) -> Result<Array2<f64>> {
    concatenate(Axis(0), &[a.view(), b.view()]).map_err(|e| EspyError::shape("parameter arrays", e.to_string()))
}

/// Replace `oscillators` with a single oscillator.
///
/// The new amplitude is the sum of the merged amplitudes, the phase their
/// circular mean and the frequencies and damping factors their arithmetic
/// means. The new oscillator is appended after the remaining ones.
pub fn merge_params(params: &Array2<f64>, oscillators: &[usize]) -> Result<Array2<f64>> {
    let indices = oscillator_set("oscillators", oscillators, params.nrows())?;
    let merged = params.select(Axis(0), &indices);
    let j = indices.len() as f64;

    let mut new = merged.mean_axis(Axis(0)).ok_or_else(|| EspyError::invalid("oscillators", "nothing to merge"))?;
    new[0] = merged.column(0).sum();
    let (sin, cos) = merged
        .column(1)
        .iter()
        .fold((0.0, 0.0), |(s, c), &phi| (s + phi.sin(), c + phi.cos()));
    new[1] = wrap_phase((sin / j).atan2(cos / j));

    let new = new.insert_axis(Axis(0));
    stack(&keep_except(params, &indices), &new)
}

/// Replace `oscillator` with `split_number` oscillators.
///
/// # Arguments
/// * `separation` - Frequency spacing between adjacent new oscillators in
///   each dimension (Hz)
/// * `split_number` - Number of oscillators to create (at least 2)
/// * `amp_ratio` - Relative amplitudes, highest frequency first. `None`
///   splits the amplitude equally.
///
/// The new oscillators share the original phase and damping, are centred on
/// the original frequency and have amplitudes summing to the original one.
pub fn split_params(
    params: &Array2<f64>,
    oscillator: usize,
    separation: &[f64],
    split_number: usize,
    amp_ratio: Option<&[f64]>,
) -> Result<Array2<f64>> {
    let dim = (params.ncols().saturating_sub(2)) / 2;
    check_params(params, dim)?;
    if oscillator >= params.nrows() {
        return Err(EspyError::invalid(
            "oscillator",
            format!("index {} out of range for {} oscillators", oscillator, params.nrows()),
        ));
    }
    if split_number < 2 {
        return Err(EspyError::invalid("split_number", "must be at least 2"));
    }
    if separation.len() != dim || separation.iter().any(|s| !s.is_finite()) {
        return Err(EspyError::invalid(
            "separation_frequency",
            format!("expected {} finite values", dim),
        ));
    }
    let ratio: Vec<f64> = match amp_ratio {
        Some(r) => {
            if r.len() != split_number || r.iter().any(|&v| !(v > 0.0) || !v.is_finite()) {
                return Err(EspyError::invalid(
                    "amp_ratio",
                    format!("expected {} positive values", split_number),
                ));
            }
            r.to_vec()
        }
        None => vec![1.0; split_number],
    };
    let total: f64 = ratio.iter().sum();

    let osc = params.row(oscillator);
    let mut new = Array2::zeros((split_number, params.ncols()));
    for (i, mut row) in new.rows_mut().into_iter().enumerate() {
        row[0] = osc[0] * ratio[i] / total;
        row[1] = osc[1];
        for d in 0..dim {
            let highest = osc[2 + d] + (split_number - 1) as f64 * separation[d] / 2.0;
            row[2 + d] = highest - i as f64 * separation[d];
            row[2 + dim + d] = osc[2 + dim + d];
        }
    }
    stack(&keep_except(params, &[oscillator]), &new)
}

/// Append `new` oscillators to `params`.
pub fn add_params(params: &Array2<f64>, new: &Array2<f64>) -> Result<Array2<f64>> {
    let dim = (params.ncols().saturating_sub(2)) / 2;
    check_params(new, dim)?;
    if new.nrows() == 0 {
        return Err(EspyError::invalid("params", "at least one oscillator is required"));
    }
    stack(params, new)
}

/// Remove `oscillators` from `params`. At least one oscillator must remain.
pub fn remove_params(params: &Array2<f64>, oscillators: &[usize]) -> Result<Array2<f64>> {
    let indices = oscillator_set("oscillators", oscillators, params.nrows())?;
    if indices.len() == params.nrows() {
        return Err(EspyError::invalid("oscillators", "cannot remove every oscillator"));
    }
    Ok(keep_except(params, &indices))
}

impl Estimator {
    /// Merge oscillators of the result at `index` and re-fit.
    ///
    /// See [`merge_params`] for how the merged oscillator is formed.
    /// `options.initial_guess` and `options.region_unit` are ignored.
    pub fn merge_oscillators(&mut self, oscillators: &[usize], index: isize, options: &EstimateOptions) -> Result<()> {
        let i = self.resolve_index(index)?;
        let x0 = merge_params(&self.results[i].params, oscillators)?;
        self.refit(i, x0, options)?;
        self.log.record(
            "merge_oscillators",
            vec![("oscillators", format!("{:?}", oscillators)), ("index", index.to_string())],
        );
        Ok(())
    }

    /// Split an oscillator of the result at `index` and re-fit.
    ///
    /// `separation` is given in `unit` and defaults to one spectral point
    /// (`sw / pts`) in each dimension.
    pub fn split_oscillator(
        &mut self,
        oscillator: usize,
        index: isize,
        separation: Option<&[f64]>,
        unit: FrequencyUnit,
        split_number: usize,
        amp_ratio: Option<&[f64]>,
        options: &EstimateOptions,
    ) -> Result<()> {
        let i = self.resolve_index(index)?;
        self.expinfo.check_unit("unit", unit)?;
        let separation_hz: Vec<f64> = match separation {
            Some(s) => {
                if s.len() != self.dim() {
                    return Err(EspyError::invalid(
                        "separation_frequency",
                        format!("expected {} values", self.dim()),
                    ));
                }
                match unit {
                    FrequencyUnit::Hz => s.to_vec(),
                    FrequencyUnit::Ppm => {
                        let sfo = self.expinfo.sfo().unwrap_or(&[]);
                        s.iter().zip(sfo).map(|(v, f)| v * f).collect()
                    }
                    FrequencyUnit::Idx => {
                        return Err(EspyError::invalid("unit", "separation must be given in hz or ppm"))
                    }
                }
            }
            None => self
                .expinfo
                .sw_hz()
                .iter()
                .zip(self.data.shape())
                .map(|(sw, &n)| sw / n as f64)
                .collect(),
        };
        let x0 = split_params(&self.results[i].params, oscillator, &separation_hz, split_number, amp_ratio)?;
        self.refit(i, x0, options)?;
        self.log.record(
            "split_oscillator",
            vec![
                ("oscillator", oscillator.to_string()),
                ("index", index.to_string()),
                ("separation_frequency", format!("{:?}", separation_hz)),
                ("split_number", split_number.to_string()),
                ("amp_ratio", format!("{:?}", amp_ratio)),
            ],
        );
        Ok(())
    }

    /// Add oscillators to the result at `index` and re-fit.
    pub fn add_oscillators(&mut self, params: &Array2<f64>, index: isize, options: &EstimateOptions) -> Result<()> {
        let i = self.resolve_index(index)?;
        let current = &self.results[i].params;
        let x0 = if current.nrows() == 0 {
            check_params(params, self.dim())?;
            params.clone()
        } else {
            add_params(current, params)?
        };
        self.refit(i, x0, options)?;
        self.log.record(
            "add_oscillators",
            vec![("params", format!("{:?}", params.as_slice())), ("index", index.to_string())],
        );
        Ok(())
    }

    /// Remove oscillators from the result at `index` and re-fit.
    pub fn remove_oscillators(&mut self, oscillators: &[usize], index: isize, options: &EstimateOptions) -> Result<()> {
        let i = self.resolve_index(index)?;
        let x0 = remove_params(&self.results[i].params, oscillators)?;
        self.refit(i, x0, options)?;
        self.log.record(
            "remove_oscillators",
            vec![("oscillators", format!("{:?}", oscillators)), ("index", index.to_string())],
        );
        Ok(())
    }

    /// Fit `x0` over the region of result `i` and replace that result.
    fn refit(&mut self, i: usize, x0: Array2<f64>, options: &EstimateOptions) -> Result<()> {
        let previous = &self.results[i];
        let axis = self.dim() - 1;
        let (region, noise_region) = if previous.filtered {
            (
                previous.region[axis],
                previous.noise_region.as_ref().and_then(|r| r[axis]),
            )
        } else {
            (None, None)
        };
        let options = EstimateOptions {
            region_unit: FrequencyUnit::Hz,
            initial_guess: InitialGuess::Params(x0),
            ..options.clone()
        };
        let result = self.run_estimate(region, noise_region, &options)?;
        self.results[i] = result;
        Ok(())
    }
}
