//! Estimators
//!
//! An [`Estimator`] owns a time-domain signal with its experiment information
//! and accumulates [`EstimationResult`]s. Each call to
//! [`Estimator::estimate`] runs the pipeline
//!
//! 1. frequency filtering of a region of interest (optional),
//! 2. an initial guess from the Matrix Pencil Method (unless one is given),
//! 3. nonlinear programming,
//!
//! and appends one result. Results can then be edited (oscillators merged,
//! split, added or removed), which re-runs the fit over the same region and
//! replaces the result in place.
//!
//! ## Experiment kinds
//!
//! - [`ExperimentKind::OneDim`]: 1D signals, filtered in their only dimension
//! - [`ExperimentKind::JRes`]: 2D J-resolved signals, filtered in the direct
//!   dimension only
//! - [`ExperimentKind::Series`]: a stack of 1D signals sharing experiment
//!   information, estimated increment by increment by a [`SeriesEstimator`]

mod edit;
mod io;
mod oplog;
mod result;
mod series;
mod simulator;
mod subband;

use std::f64::consts::PI;

use ndarray::{concatenate, Array1, Array2, ArrayD, Axis, Slice};
use num_complex::Complex64;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use serde::{Deserialize, Serialize};

use crate::constants::{DEFAULT_CUT_RATIO, DEFAULT_MPM_TRIM};
use crate::error::{EspyError, Result};
use crate::expinfo::{Bounds, ExpInfo, FrequencyUnit, Region};
use crate::filter::{Filter, FilterOptions};
use crate::mpm::MatrixPencil;
use crate::nlp::{NegativeAmps, NlpMethod, NlpOptions, NonlinearProgramming, ParamMode};
use crate::signal::{
    add_noise, check_params, check_pts, empty_params, exp_apodisation, ft, make_fid, make_modulated_fid,
    Modulation,
};

pub use edit::{add_params, merge_params, remove_params, split_params};
pub use io::FORMAT_VERSION;
pub use oplog::{LogEntry, OperationLog};
pub use result::{EstimationResult, SortBy};
pub use series::SeriesEstimator;
pub use simulator::{PulseAcquire, SpinSimulator, SpinSystem, UnavailableSimulator};
pub use subband::SubbandOptions;

use result::argsort;

/// Kind of experiment an estimator handles
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ExperimentKind {
    OneDim,
    JRes,
    /// Several 1D signals, one per increment
    Series,
}

impl ExperimentKind {
    /// Dimension of the fitted signals
    pub fn dim(&self) -> usize {
        match self {
            ExperimentKind::OneDim | ExperimentKind::Series => 1,
            ExperimentKind::JRes => 2,
        }
    }

    fn from_dim(dim: usize) -> Result<Self> {
        match dim {
            1 => Ok(ExperimentKind::OneDim),
            2 => Ok(ExperimentKind::JRes),
            _ => Err(EspyError::invalid("expinfo", format!("unsupported dimension {}", dim))),
        }
    }
}

/// Source of the initial guess handed to nonlinear programming
#[derive(Debug, Clone, PartialEq, Default)]
pub enum InitialGuess {
    /// MPM with the model order chosen by MDL
    #[default]
    Auto,
    /// MPM with a fixed number of oscillators
    Oscillators(usize),
    /// Explicit parameter array; the MPM is skipped
    Params(Array2<f64>),
}

/// Options for [`Estimator::estimate`]
#[derive(Debug, Clone, PartialEq)]
pub struct EstimateOptions {
    /// Unit of `region` and `noise_region`
    pub region_unit: FrequencyUnit,
    pub initial_guess: InitialGuess,
    pub method: NlpMethod,
    pub phase_variance: bool,
    /// `None` uses the method's default cap
    pub max_iterations: Option<usize>,
    pub mode: ParamMode,
    pub negative_amps: NegativeAmps,
    /// Cut ratio for the signal handed to the MPM; `None` disables cutting
    pub cut_ratio: Option<f64>,
    /// Largest number of direct-dimension points handed to the MPM
    pub mpm_trim: Option<usize>,
    /// Largest number of direct-dimension points handed to the NLP
    pub nlp_trim: Option<usize>,
}

impl Default for EstimateOptions {
    fn default() -> Self {
        Self {
            region_unit: FrequencyUnit::Hz,
            initial_guess: InitialGuess::Auto,
            method: NlpMethod::GaussNewton,
            phase_variance: true,
            max_iterations: None,
            mode: ParamMode::default(),
            negative_amps: NegativeAmps::FlipPhase,
            cut_ratio: Some(DEFAULT_CUT_RATIO),
            mpm_trim: Some(DEFAULT_MPM_TRIM),
            nlp_trim: None,
        }
    }
}

impl EstimateOptions {
    fn validate(&self, dim: usize) -> Result<()> {
        match &self.initial_guess {
            InitialGuess::Auto => {}
            InitialGuess::Oscillators(0) => {
                return Err(EspyError::invalid("initial_guess", "number of oscillators must be positive"))
            }
            InitialGuess::Oscillators(_) => {}
            InitialGuess::Params(p) => {
                check_params(p, dim)?;
                if p.nrows() == 0 {
                    return Err(EspyError::invalid("initial_guess", "parameter array has no oscillators"));
                }
            }
        }
        if self.max_iterations == Some(0) {
            return Err(EspyError::invalid("max_iterations", "must be positive"));
        }
        if let Some(ratio) = self.cut_ratio {
            if !ratio.is_finite() || ratio < 1.0 {
                return Err(EspyError::invalid("cut_ratio", "must be at least 1"));
            }
        }
        if self.mpm_trim == Some(0) {
            return Err(EspyError::invalid("mpm_trim", "must be positive"));
        }
        if self.nlp_trim == Some(0) {
            return Err(EspyError::invalid("nlp_trim", "must be positive"));
        }
        Ok(())
    }

    fn nlp_options(&self) -> NlpOptions {
        NlpOptions {
            method: self.method,
            phase_variance: self.phase_variance,
            max_iterations: self.max_iterations,
            mode: self.mode,
            negative_amps: self.negative_amps,
        }
    }
}

/// Signals and metadata handed to the MPM and the NLP.
struct Prepared {
    mpm_signal: ArrayD<Complex64>,
    mpm_expinfo: ExpInfo,
    nlp_signal: ArrayD<Complex64>,
    nlp_expinfo: ExpInfo,
    region: Region,
    noise_region: Option<Region>,
    filtered: bool,
}

/// Estimator for a single signal
#[derive(Debug, Clone)]
pub struct Estimator {
    kind: ExperimentKind,
    data: ArrayD<Complex64>,
    expinfo: ExpInfo,
    results: Vec<EstimationResult>,
    log: OperationLog,
    rng: StdRng,
}

impl Estimator {
    /// Create an estimator for `data`.
    ///
    /// The experiment kind follows from the dimension of `expinfo`, and the
    /// default number of points is set to the shape of `data`.
    pub fn new(data: ArrayD<Complex64>, expinfo: ExpInfo) -> Result<Self> {
        let shape = format!("{:?}", data.shape());
        Self::build(data, expinfo, "new", vec![("shape", shape)])
    }

    fn build(
        data: ArrayD<Complex64>,
        expinfo: ExpInfo,
        operation: &str,
        arguments: Vec<(&str, String)>,
    ) -> Result<Self> {
        let kind = ExperimentKind::from_dim(expinfo.dim())?;
        if data.ndim() != kind.dim() {
            return Err(EspyError::shape(
                format!("{}D signal", kind.dim()),
                format!("{}D signal", data.ndim()),
            ));
        }
        check_pts(data.shape(), kind.dim())?;
        if data.iter().any(|v| !v.re.is_finite() || !v.im.is_finite()) {
            return Err(EspyError::invalid("data", "signal contains non-finite values"));
        }
        let expinfo = expinfo.with_default_pts(data.shape().to_vec())?;
        let mut log = OperationLog::new();
        log.record(operation, arguments);
        Ok(Self {
            kind,
            data,
            expinfo,
            results: Vec::new(),
            log,
            rng: StdRng::from_entropy(),
        })
    }

    /// Seed the random source used for noise filling when filtering.
    pub fn with_seed(mut self, seed: u64) -> Self {
        self.rng = StdRng::seed_from_u64(seed);
        self
    }

    /// Create an estimator for a synthetic signal built from `params`.
    ///
    /// # Arguments
    /// * `params` - Parameter array, shape `(M, 2 + 2D)`
    /// * `expinfo` - Experiment information of the synthetic signal
    /// * `pts` - Number of points per dimension
    /// * `snr` - SNR in dB; `None` gives a noiseless signal
    /// * `rng` - Random source for the noise
    pub fn new_synthetic_from_parameters<R: Rng + ?Sized>(
        params: &Array2<f64>,
        expinfo: ExpInfo,
        pts: &[usize],
        snr: Option<f64>,
        rng: &mut R,
    ) -> Result<Self> {
        let (mut fid, _) = make_fid(params, &expinfo, pts)?;
        if let Some(snr) = snr {
            add_noise(&mut fid, snr, true, rng)?;
        }
        Self::build(
            fid,
            expinfo,
            "new_synthetic_from_parameters",
            vec![
                ("params", format!("{:?}", params.as_slice())),
                ("pts", format!("{:?}", pts)),
                ("snr", format!("{:?}", snr)),
            ],
        )
    }

    /// Create an estimator from a simulated pulse-acquire signal.
    ///
    /// The simulated signal has noise added (if requested) and is then
    /// apodised with `acquisition.lb`.
    pub fn new_spinach<S: SpinSimulator + ?Sized, R: Rng + ?Sized>(
        simulator: &S,
        system: &SpinSystem,
        acquisition: &PulseAcquire,
        rng: &mut R,
    ) -> Result<Self> {
        if acquisition.pts == 0 {
            return Err(EspyError::invalid("pts", "must be positive"));
        }
        if !(acquisition.sfo > 0.0) {
            return Err(EspyError::invalid("sfo", "must be positive"));
        }
        if !(acquisition.lb > 0.0) {
            return Err(EspyError::invalid("lb", "must be positive"));
        }
        let expinfo = ExpInfo::new(vec![acquisition.sw], vec![acquisition.offset])?
            .with_sfo(vec![acquisition.sfo])?
            .with_nuclei(vec![acquisition.nucleus.clone()])?;

        let fid = simulator.simulate(system, acquisition)?;
        if fid.len() != acquisition.pts {
            return Err(EspyError::shape(
                format!("{} simulated points", acquisition.pts),
                fid.len().to_string(),
            ));
        }
        let mut fid = fid.into_dyn();
        if let Some(snr) = acquisition.snr {
            add_noise(&mut fid, snr, true, rng)?;
        }
        let fid = exp_apodisation(&fid, &[acquisition.lb])?;
        Self::build(
            fid,
            expinfo,
            "new_spinach",
            vec![
                ("shifts", format!("{:?}", system.shifts)),
                ("couplings", format!("{:?}", system.couplings)),
                ("acquisition", format!("{:?}", acquisition)),
            ],
        )
    }

    // ========================================================================
    // Accessors
    // ========================================================================

    #[inline]
    pub fn kind(&self) -> ExperimentKind {
        self.kind
    }

    #[inline]
    pub fn dim(&self) -> usize {
        self.kind.dim()
    }

    pub fn data(&self) -> &ArrayD<Complex64> {
        &self.data
    }

    pub fn expinfo(&self) -> &ExpInfo {
        &self.expinfo
    }

    /// All results, in the order they were obtained
    pub fn results(&self) -> &[EstimationResult] {
        &self.results
    }

    pub fn log(&self) -> &OperationLog {
        &self.log
    }

    /// The operation log rendered one entry per line
    pub fn log_text(&self) -> String {
        self.log.to_text()
    }

    /// Spectrum of the data, with the first direct-dimension point halved.
    pub fn spectrum(&self) -> ArrayD<Complex64> {
        let mut data = self.data.clone();
        let axis = Axis(self.dim() - 1);
        data.index_axis_mut(axis, 0).mapv_inplace(|v| v * 0.5);
        ft(&data)
    }

    /// Map a possibly negative result index onto the result list.
    pub(crate) fn resolve_index(&self, index: isize) -> Result<usize> {
        let len = self.results.len();
        if len == 0 {
            return Err(EspyError::NoResults);
        }
        let resolved = if index < 0 { len as isize + index } else { index };
        if resolved < 0 || resolved >= len as isize {
            return Err(EspyError::ResultIndex { index, len });
        }
        Ok(resolved as usize)
    }

    /// Results at `indices` (negative values count from the end), or all
    /// results for `None`.
    pub fn get_results(&self, indices: Option<&[isize]>) -> Result<Vec<&EstimationResult>> {
        if self.results.is_empty() {
            return Err(EspyError::NoResults);
        }
        match indices {
            None => Ok(self.results.iter().collect()),
            Some(indices) => indices
                .iter()
                .map(|&i| self.resolve_index(i).map(|i| &self.results[i]))
                .collect(),
        }
    }

    /// Parameters of the selected results, merged into one array ordered by
    /// `sort_by`.
    pub fn get_params(&self, indices: Option<&[isize]>, funit: FrequencyUnit, sort_by: SortBy) -> Result<Array2<f64>> {
        let (params, _) = self.merged(indices, funit, sort_by)?;
        Ok(params)
    }

    /// Errors of the selected results, merged and ordered as
    /// [`get_params`](Self::get_params).
    pub fn get_errors(&self, indices: Option<&[isize]>, funit: FrequencyUnit, sort_by: SortBy) -> Result<Array2<f64>> {
        let (_, errors) = self.merged(indices, funit, sort_by)?;
        Ok(errors)
    }

    /// Parameters of each selected result separately.
    pub fn get_params_separate(
        &self,
        indices: Option<&[isize]>,
        funit: FrequencyUnit,
        sort_by: SortBy,
    ) -> Result<Vec<Array2<f64>>> {
        self.get_results(indices)?
            .into_iter()
            .map(|r| r.get_params(funit, sort_by))
            .collect()
    }

    /// Errors of each selected result separately.
    pub fn get_errors_separate(
        &self,
        indices: Option<&[isize]>,
        funit: FrequencyUnit,
        sort_by: SortBy,
    ) -> Result<Vec<Array2<f64>>> {
        self.get_results(indices)?
            .into_iter()
            .map(|r| r.get_errors(funit, sort_by))
            .collect()
    }

    fn merged(&self, indices: Option<&[isize]>, funit: FrequencyUnit, sort_by: SortBy) -> Result<(Array2<f64>, Array2<f64>)> {
        self.expinfo.check_unit("funit", funit)?;
        let results = self.get_results(indices)?;
        let column = sort_by.column(self.dim())?;
        let params = results
            .iter()
            .map(|r| r.get_params(funit, sort_by))
            .collect::<Result<Vec<_>>>()?;
        let errors = results
            .iter()
            .map(|r| r.get_errors(funit, sort_by))
            .collect::<Result<Vec<_>>>()?;
        let stack = |arrays: &[Array2<f64>]| -> Result<Array2<f64>> {
            let views: Vec<_> = arrays.iter().map(|a| a.view()).collect();
            concatenate(Axis(0), &views).map_err(|e| EspyError::shape("parameter arrays", e.to_string()))
        };
        let params = stack(&params)?;
        let errors = stack(&errors)?;
        let order = argsort(&params, column);
        Ok((params.select(Axis(0), &order), errors.select(Axis(0), &order)))
    }

    fn pts_or_default(&self, pts: Option<&[usize]>) -> Vec<usize> {
        match pts {
            Some(p) => p.to_vec(),
            None => self
                .expinfo
                .default_pts()
                .map(|p| p.to_vec())
                .unwrap_or_else(|| self.data.shape().to_vec()),
        }
    }

    /// Noiseless signal built from the parameters of the selected results.
    ///
    /// `pts` defaults to the shape of the data.
    pub fn make_fid(&self, indices: Option<&[isize]>, pts: Option<&[usize]>) -> Result<ArrayD<Complex64>> {
        let params = self.get_params(indices, FrequencyUnit::Hz, SortBy::default())?;
        let pts = self.pts_or_default(pts);
        let (fid, _) = make_fid(&params, &self.expinfo, &pts)?;
        Ok(fid)
    }

    // ========================================================================
    // Estimation
    // ========================================================================

    /// Estimate a region of the signal and append the result.
    ///
    /// # Arguments
    /// * `region` - Direct-dimension bounds of the region of interest. `None`
    ///   estimates the whole signal without filtering.
    /// * `noise_region` - Direct-dimension bounds of a signal-free region,
    ///   used to fill the filtered spectrum with noise
    /// * `options` - Initial guess, optimiser and trimming settings
    ///
    /// If the MPM finds no oscillators an empty result is appended.
    pub fn estimate(
        &mut self,
        region: Option<Bounds>,
        noise_region: Option<Bounds>,
        options: &EstimateOptions,
    ) -> Result<()> {
        let result = self.run_estimate(region, noise_region, options)?;
        self.log.record(
            "estimate",
            vec![
                ("region", format!("{:?}", region)),
                ("noise_region", format!("{:?}", noise_region)),
                ("options", format!("{:?}", options)),
            ],
        );
        self.results.push(result);
        Ok(())
    }

    /// Run the estimation pipeline without touching the result list.
    pub(crate) fn run_estimate(
        &mut self,
        region: Option<Bounds>,
        noise_region: Option<Bounds>,
        options: &EstimateOptions,
    ) -> Result<EstimationResult> {
        let dim = self.dim();
        options.validate(dim)?;
        self.expinfo.check_unit("region_unit", options.region_unit)?;
        if region.is_none() && noise_region.is_some() {
            return Err(EspyError::invalid("noise_region", "can only be given together with a region"));
        }

        let prepared = self.prepare(region, noise_region, options)?;
        let axis = Axis(dim - 1);
        let sfo = self.expinfo.sfo().map(|s| s.to_vec());

        let x0 = match &options.initial_guess {
            InitialGuess::Params(p) => p.clone(),
            guess => {
                let oscillators = match guess {
                    InitialGuess::Oscillators(n) => Some(*n),
                    _ => None,
                };
                let signal = trim(&prepared.mpm_signal, axis, options.mpm_trim);
                match MatrixPencil::new(&prepared.mpm_expinfo, &signal, oscillators)?.into_params() {
                    Some(p) => p,
                    None => {
                        log::warn!("no oscillators found in region {:?}; storing an empty result", prepared.region);
                        return Ok(EstimationResult::new(
                            empty_params(dim),
                            empty_params(dim),
                            prepared.region,
                            prepared.noise_region,
                            sfo,
                            prepared.filtered,
                        ));
                    }
                }
            }
        };

        let signal = trim(&prepared.nlp_signal, axis, options.nlp_trim);
        let nlp = NonlinearProgramming::new(&prepared.nlp_expinfo, &signal, &x0, &options.nlp_options())?;
        let (params, errors) = nlp.into_parts();
        Ok(EstimationResult::new(
            params,
            errors,
            prepared.region,
            prepared.noise_region,
            sfo,
            prepared.filtered,
        ))
    }

    fn prepare(&mut self, region: Option<Bounds>, noise_region: Option<Bounds>, options: &EstimateOptions) -> Result<Prepared> {
        let dim = self.dim();
        let axis = dim - 1;
        let Some(bounds) = region else {
            return Ok(Prepared {
                mpm_signal: self.data.clone(),
                mpm_expinfo: self.expinfo.clone(),
                nlp_signal: self.data.clone(),
                nlp_expinfo: self.expinfo.clone(),
                region: self.full_region()?,
                noise_region: None,
                filtered: false,
            });
        };

        let direct_only = |b: Bounds| -> Region {
            let mut r: Region = vec![None; dim];
            r[axis] = Some(b);
            r
        };
        let region = direct_only(bounds);
        let noise_region = noise_region.map(direct_only);
        log::info!("filtering region {:?} ({})", bounds, options.region_unit.as_str());
        let filter = Filter::new(
            &self.data,
            &self.expinfo,
            &region,
            noise_region.as_ref(),
            options.region_unit,
            FilterOptions {
                cut_ratio: options.cut_ratio,
                ..FilterOptions::default()
            },
            &mut self.rng,
        )?;
        let (mpm_signal, mpm_expinfo) = filter.filtered_fid()?;
        let (nlp_signal, nlp_expinfo) = filter.get_filtered_fid(None)?;
        Ok(Prepared {
            mpm_signal,
            mpm_expinfo,
            nlp_signal,
            nlp_expinfo,
            region: filter.get_region(FrequencyUnit::Hz)?,
            noise_region: filter.get_noise_region(FrequencyUnit::Hz)?,
            filtered: true,
        })
    }

    /// The whole spectral window in Hz, every dimension bounded.
    fn full_region(&self) -> Result<Region> {
        self.data
            .shape()
            .iter()
            .enumerate()
            .map(|(d, &n)| {
                if n < 2 {
                    let off = self.expinfo.offset_hz()[d];
                    return Ok(Some((off, off)));
                }
                let left = self.expinfo.convert_value(0.0, d, FrequencyUnit::Idx, FrequencyUnit::Hz, n)?;
                let right = self
                    .expinfo
                    .convert_value((n - 1) as f64, d, FrequencyUnit::Idx, FrequencyUnit::Hz, n)?;
                Ok(Some((left, right)))
            })
            .collect()
    }

    // ========================================================================
    // J-resolved signals
    // ========================================================================

    fn require_jres(&self, operation: &'static str) -> Result<()> {
        if self.kind != ExperimentKind::JRes {
            return Err(EspyError::invalid(operation, "only available for J-resolved estimators"));
        }
        Ok(())
    }

    /// 1D signal `Σ a e^{iφ} e^{(2πi (f2 - f1 - off2) - η2) t}`.
    ///
    /// Its spectrum is a homodecoupled version of the direct dimension.
    /// `pts` defaults to the number of direct-dimension points.
    pub fn negative_45_signal(&self, indices: Option<&[isize]>, pts: Option<usize>) -> Result<Array1<Complex64>> {
        self.require_jres("negative_45_signal")?;
        let params = self.get_params(indices, FrequencyUnit::Hz, SortBy::default())?;
        let pts = pts.unwrap_or(self.data.shape()[1]);
        if pts == 0 {
            return Err(EspyError::invalid("pts", "must be positive"));
        }
        let sw = self.expinfo.sw_hz()[1];
        let offset = self.expinfo.offset_hz()[1];
        let poles: Vec<(Complex64, Complex64)> = params
            .rows()
            .into_iter()
            .map(|p| {
                (
                    Complex64::from_polar(p[0], p[1]),
                    Complex64::new(-p[5], 2.0 * PI * (p[3] - p[2] - offset)),
                )
            })
            .collect();
        Ok(Array1::from_shape_fn(pts, |n| {
            let t = n as f64 / sw;
            poles.iter().map(|(alpha, s)| alpha * (s * t).exp()).sum()
        }))
    }

    /// Signal with every direct-dimension frequency shifted by minus its
    /// indirect-dimension frequency, centring multiplets on their shift.
    ///
    /// Returns one array per modulation component.
    pub fn sheared_signal(
        &self,
        indices: Option<&[isize]>,
        pts: Option<&[usize]>,
        modulation: Modulation,
    ) -> Result<Vec<ArrayD<Complex64>>> {
        self.require_jres("sheared_signal")?;
        let mut params = self.get_params(indices, FrequencyUnit::Hz, SortBy::default())?;
        for mut row in params.rows_mut() {
            row[3] -= row[2];
        }
        let pts = self.pts_or_default(pts);
        let (fids, _) = make_modulated_fid(&params, &self.expinfo, &pts, modulation)?;
        Ok(fids)
    }
}

/// First `trim` points of `signal` along `axis`.
fn trim(signal: &ArrayD<Complex64>, axis: Axis, trim: Option<usize>) -> ArrayD<Complex64> {
    let n = signal.len_of(axis);
    let keep = trim.map_or(n, |t| t.min(n));
    signal.slice_axis(axis, Slice::from(0..keep)).to_owned()
}
