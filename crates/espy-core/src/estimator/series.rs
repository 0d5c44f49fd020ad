//! Series of 1D signals
//!
//! A [`SeriesEstimator`] holds a stack of 1D signals recorded with the same
//! experiment information, one per increment of a varied quantity such as
//! a relaxation delay or a gradient strength. Each call to
//! [`SeriesEstimator::estimate`] runs the 1D estimation pipeline on every
//! increment over the same region. Increments after the first start
//! from the parameters fitted to the previous increment.

use ndarray::{Array1, Array2, ArrayD};
use num_complex::Complex64;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

use super::oplog::OperationLog;
use super::{EstimateOptions, EstimationResult, Estimator, ExperimentKind, InitialGuess, SortBy};
use crate::error::{EspyError, Result};
use crate::expinfo::{Bounds, ExpInfo, FrequencyUnit};

/// Estimator for a series of 1D signals sharing one [`ExpInfo`]
#[derive(Debug, Clone)]
pub struct SeriesEstimator {
    /// One 1D estimator per increment
    pub(crate) members: Vec<Estimator>,
    pub(crate) increments: Vec<f64>,
    pub(crate) increment_label: Option<String>,
    pub(crate) log: OperationLog,
}

impl SeriesEstimator {
    /// Create a series from a stack of signals.
    ///
    /// # Arguments
    /// * `data` - Signals, shape `(increments, points)`
    /// * `expinfo` - 1D experiment information shared by every signal
    /// * `increments` - Value of the varied quantity for each row of `data`
    pub fn new(data: Array2<Complex64>, expinfo: ExpInfo, increments: Vec<f64>) -> Result<Self> {
        check_series_expinfo(&expinfo)?;
        if data.nrows() != increments.len() {
            return Err(EspyError::shape(
                format!("{} signals", increments.len()),
                format!("{} signals", data.nrows()),
            ));
        }
        let members = data
            .rows()
            .into_iter()
            .map(|row| Estimator::new(row.to_owned().into_dyn(), expinfo.clone()))
            .collect::<Result<Vec<_>>>()?;
        let mut log = OperationLog::new();
        log.record(
            "new",
            vec![
                ("shape", format!("{:?}", data.shape())),
                ("increments", format!("{:?}", increments)),
            ],
        );
        Self::from_members(members, increments, None, log)
    }

    /// Create a series of synthetic signals, one parameter array per
    /// increment.
    ///
    /// # Arguments
    /// * `params` - Parameter arrays, each of shape `(M, 4)`
    /// * `increments` - Value of the varied quantity for each array
    /// * `expinfo` - 1D experiment information of every signal
    /// * `pts` - Number of points in each signal
    /// * `snr` - SNR in dB; `None` gives noiseless signals
    /// * `rng` - Random source for the noise
    pub fn new_synthetic_from_parameters<R: Rng + ?Sized>(
        params: &[Array2<f64>],
        increments: Vec<f64>,
        expinfo: ExpInfo,
        pts: usize,
        snr: Option<f64>,
        rng: &mut R,
    ) -> Result<Self> {
        check_series_expinfo(&expinfo)?;
        if params.len() != increments.len() {
            return Err(EspyError::shape(
                format!("{} parameter arrays", increments.len()),
                format!("{} parameter arrays", params.len()),
            ));
        }
        let members = params
            .iter()
            .map(|p| Estimator::new_synthetic_from_parameters(p, expinfo.clone(), &[pts], snr, &mut *rng))
            .collect::<Result<Vec<_>>>()?;
        let mut log = OperationLog::new();
        log.record(
            "new_synthetic_from_parameters",
            vec![
                ("increments", format!("{:?}", increments)),
                ("pts", pts.to_string()),
                ("snr", format!("{:?}", snr)),
            ],
        );
        Self::from_members(members, increments, None, log)
    }

    pub(crate) fn from_members(
        members: Vec<Estimator>,
        increments: Vec<f64>,
        increment_label: Option<String>,
        log: OperationLog,
    ) -> Result<Self> {
        if members.is_empty() {
            return Err(EspyError::invalid("increments", "a series needs at least one increment"));
        }
        if members.len() != increments.len() {
            return Err(EspyError::shape(
                format!("{} signals", increments.len()),
                format!("{} signals", members.len()),
            ));
        }
        if increments.iter().any(|v| !v.is_finite()) {
            return Err(EspyError::invalid("increments", "values must be finite"));
        }
        let first = &members[0];
        check_series_expinfo(first.expinfo())?;
        for member in &members[1..] {
            if member.kind() != ExperimentKind::OneDim || member.data().shape() != first.data().shape() {
                return Err(EspyError::shape(
                    format!("1D signals of shape {:?}", first.data().shape()),
                    format!("{}D signal of shape {:?}", member.dim(), member.data().shape()),
                ));
            }
            if member.expinfo() != first.expinfo() {
                return Err(EspyError::invalid("expinfo", "every increment must share the same experiment information"));
            }
            if member.results().len() != first.results().len() {
                return Err(EspyError::invalid("results", "every increment must hold the same number of results"));
            }
        }
        Ok(Self {
            members,
            increments,
            increment_label,
            log,
        })
    }

    /// Name of the varied quantity, e.g. `"delay (s)"`.
    pub fn with_increment_label(mut self, label: impl Into<String>) -> Self {
        self.increment_label = Some(label.into());
        self
    }

    /// Seed the random sources used for noise filling when filtering.
    ///
    /// Increment `i` is seeded with `seed + i`.
    pub fn with_seed(mut self, seed: u64) -> Self {
        for (i, member) in self.members.iter_mut().enumerate() {
            member.rng = StdRng::seed_from_u64(seed.wrapping_add(i as u64));
        }
        self
    }

    // ========================================================================
    // Accessors
    // ========================================================================

    #[inline]
    pub fn kind(&self) -> ExperimentKind {
        ExperimentKind::Series
    }

    /// Number of increments
    #[inline]
    pub fn n_increments(&self) -> usize {
        self.members.len()
    }

    pub fn increments(&self) -> &[f64] {
        &self.increments
    }

    pub fn increment_label(&self) -> Option<&str> {
        self.increment_label.as_deref()
    }

    pub fn expinfo(&self) -> &ExpInfo {
        self.members[0].expinfo()
    }

    /// Signal of increment `i`
    pub fn fid(&self, i: usize) -> Result<&ArrayD<Complex64>> {
        self.member(i).map(|m| m.data())
    }

    /// Estimator of increment `i`
    pub fn member(&self, i: usize) -> Result<&Estimator> {
        self.members.get(i).ok_or_else(|| {
            EspyError::invalid("increment", format!("{} is out of range for {} increments", i, self.members.len()))
        })
    }

    pub fn members(&self) -> &[Estimator] {
        &self.members
    }

    /// Number of estimations run over the series
    pub fn result_count(&self) -> usize {
        self.members[0].results().len()
    }

    pub fn log(&self) -> &OperationLog {
        &self.log
    }

    /// Parameters of the selected results, one merged array per increment.
    pub fn get_params(&self, indices: Option<&[isize]>, funit: FrequencyUnit, sort_by: SortBy) -> Result<Vec<Array2<f64>>> {
        self.members
            .iter()
            .map(|m| m.get_params(indices, funit, sort_by))
            .collect()
    }

    /// Errors of the selected results, one merged array per increment.
    pub fn get_errors(&self, indices: Option<&[isize]>, funit: FrequencyUnit, sort_by: SortBy) -> Result<Vec<Array2<f64>>> {
        self.members
            .iter()
            .map(|m| m.get_errors(indices, funit, sort_by))
            .collect()
    }

    /// One parameter of one oscillator across the increments.
    ///
    /// # Arguments
    /// * `index` - Result index (negative values count from the end)
    /// * `oscillator` - Row of the result, with oscillators sorted by frequency
    /// * `column` - Parameter column: 0 amplitude, 1 phase, 2 frequency, 3 damping
    /// * `funit` - Unit of the frequency column
    pub fn trajectory(&self, index: isize, oscillator: usize, column: usize, funit: FrequencyUnit) -> Result<Array1<f64>> {
        if column >= 4 {
            return Err(EspyError::invalid("column", "must be less than 4 for 1D parameters"));
        }
        let values = self
            .members
            .iter()
            .enumerate()
            .map(|(i, m)| {
                let params = m.get_params(Some(&[index]), funit, SortBy::default())?;
                if oscillator >= params.nrows() {
                    return Err(EspyError::invalid(
                        "oscillator",
                        format!("increment {} has {} oscillators", i, params.nrows()),
                    ));
                }
                Ok(params[[oscillator, column]])
            })
            .collect::<Result<Vec<_>>>()?;
        Ok(Array1::from_vec(values))
    }

    // ========================================================================
    // Estimation
    // ========================================================================

    /// Estimate the same region of every increment and append one result to
    /// each.
    ///
    /// `options.initial_guess` applies to the first increment. Every later
    /// increment starts from the parameters fitted to the one before it,
    /// falling back to `options.initial_guess` after an empty result.
    /// Nothing is appended unless every increment succeeds.
    pub fn estimate(
        &mut self,
        region: Option<Bounds>,
        noise_region: Option<Bounds>,
        options: &EstimateOptions,
    ) -> Result<()> {
        let n = self.members.len();
        let mut current = options.clone();
        let mut fitted: Vec<EstimationResult> = Vec::with_capacity(n);
        for (i, member) in self.members.iter_mut().enumerate() {
            log::info!("estimating increment {} of {}", i + 1, n);
            let result = member.run_estimate(region, noise_region, &current)?;
            current.initial_guess = if result.is_empty() {
                options.initial_guess.clone()
            } else {
                InitialGuess::Params(result.params().clone())
            };
            fitted.push(result);
        }

        for (member, result) in self.members.iter_mut().zip(fitted) {
            member.results.push(result);
        }
        self.log.record(
            "estimate",
            vec![
                ("region", format!("{:?}", region)),
                ("noise_region", format!("{:?}", noise_region)),
                ("options", format!("{:?}", options)),
            ],
        );
        Ok(())
    }
}

fn check_series_expinfo(expinfo: &ExpInfo) -> Result<()> {
    if expinfo.dim() != 1 {
        return Err(EspyError::invalid("expinfo", "a series holds 1D signals"));
    }
    Ok(())
}
