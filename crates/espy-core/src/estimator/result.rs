//! Estimation results

use ndarray::{Array2, Axis};
use serde::{Deserialize, Serialize};

use crate::error::{EspyError, Result};
use crate::expinfo::{FrequencyUnit, Region};

/// Parameter by which oscillators are ordered
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SortBy {
    Amplitude,
    Phase,
    /// Frequency in a dimension; negative values count from the last
    /// (direct) dimension
    Frequency(isize),
    /// Damping factor in a dimension, indexed as for `Frequency`
    Damping(isize),
}

impl Default for SortBy {
    fn default() -> Self {
        SortBy::Frequency(-1)
    }
}

impl SortBy {
    /// Parse `"a"`, `"p"`, `"f"`, `"d"` or a dimension-qualified `"f<n>"` /
    /// `"d<n>"`, where `n` is 1-based and `-1` means the direct dimension.
    pub fn from_str(s: &str) -> Result<Self> {
        let err = || EspyError::invalid("sort_by", format!("cannot interpret \"{}\"", s));
        let (head, tail) = s.split_at(s.chars().next().map_or(0, |c| c.len_utf8()));
        let dim = if tail.is_empty() {
            -1
        } else {
            let n: isize = tail.parse().map_err(|_| err())?;
            match n {
                n if n > 0 => n - 1,
                n if n < 0 => n,
                _ => return Err(err()),
            }
        };
        match head {
            "a" if tail.is_empty() => Ok(SortBy::Amplitude),
            "p" if tail.is_empty() => Ok(SortBy::Phase),
            "f" => Ok(SortBy::Frequency(dim)),
            "d" => Ok(SortBy::Damping(dim)),
            _ => Err(err()),
        }
    }

    /// Column of a `dim`-dimensional parameter array.
    pub fn column(&self, dim: usize) -> Result<usize> {
        let resolve = |d: isize| -> Result<usize> {
            let idx = if d < 0 { dim as isize + d } else { d };
            if idx < 0 || idx >= dim as isize {
                return Err(EspyError::invalid(
                    "sort_by",
                    format!("dimension {} does not exist for {}D data", d, dim),
                ));
            }
            Ok(idx as usize)
        };
        match *self {
            SortBy::Amplitude => Ok(0),
            SortBy::Phase => Ok(1),
            SortBy::Frequency(d) => Ok(2 + resolve(d)?),
            SortBy::Damping(d) => Ok(2 + dim + resolve(d)?),
        }
    }
}

/// Outcome of a single estimation: parameters and errors for one region.
///
/// Regions are stored in Hz. An empty result (no oscillators found) has
/// parameter and error arrays with zero rows.
#[derive(Debug, Clone, PartialEq)]
pub struct EstimationResult {
    pub(crate) params: Array2<f64>,
    pub(crate) errors: Array2<f64>,
    pub(crate) region: Region,
    pub(crate) noise_region: Option<Region>,
    pub(crate) sfo: Option<Vec<f64>>,
    /// Whether the signal was frequency-filtered before estimation
    pub(crate) filtered: bool,
}

impl EstimationResult {
    pub(crate) fn new(
        params: Array2<f64>,
        errors: Array2<f64>,
        region: Region,
        noise_region: Option<Region>,
        sfo: Option<Vec<f64>>,
        filtered: bool,
    ) -> Self {
        Self {
            params,
            errors,
            region,
            noise_region,
            sfo,
            filtered,
        }
    }

    /// Number of dimensions of the estimated signal
    pub fn dim(&self) -> usize {
        (self.params.ncols() - 2) / 2
    }

    /// Number of oscillators
    pub fn oscillators(&self) -> usize {
        self.params.nrows()
    }

    pub fn is_empty(&self) -> bool {
        self.params.nrows() == 0
    }

    pub fn filtered(&self) -> bool {
        self.filtered
    }

    /// Parameters in Hz, in the order produced by the fit
    pub fn params(&self) -> &Array2<f64> {
        &self.params
    }

    /// Errors in Hz, matching [`params`](Self::params)
    pub fn errors(&self) -> &Array2<f64> {
        &self.errors
    }

    /// Parameters with frequencies in `funit`, ordered by `sort_by`
    pub fn get_params(&self, funit: FrequencyUnit, sort_by: SortBy) -> Result<Array2<f64>> {
        let order = self.order(sort_by)?;
        self.scaled(&self.params, funit).map(|p| p.select(Axis(0), &order))
    }

    /// Errors with frequencies in `funit`, ordered by `sort_by` applied to
    /// the parameters
    pub fn get_errors(&self, funit: FrequencyUnit, sort_by: SortBy) -> Result<Array2<f64>> {
        let order = self.order(sort_by)?;
        self.scaled(&self.errors, funit).map(|e| e.select(Axis(0), &order))
    }

    /// Region the result was estimated over
    pub fn get_region(&self, unit: FrequencyUnit) -> Result<Region> {
        self.convert_region(&self.region, unit)
    }

    /// Noise region used by the filter, if any
    pub fn get_noise_region(&self, unit: FrequencyUnit) -> Result<Option<Region>> {
        self.noise_region
            .as_ref()
            .map(|r| self.convert_region(r, unit))
            .transpose()
    }

    fn order(&self, sort_by: SortBy) -> Result<Vec<usize>> {
        let column = sort_by.column(self.dim())?;
        Ok(argsort(&self.params, column))
    }

    fn sfo_for(&self, unit: FrequencyUnit) -> Result<Option<&[f64]>> {
        match unit {
            FrequencyUnit::Hz => Ok(None),
            FrequencyUnit::Ppm => self
                .sfo
                .as_deref()
                .map(Some)
                .ok_or_else(|| EspyError::invalid("funit", "ppm requires a transmitter frequency (sfo) to be set")),
            FrequencyUnit::Idx => Err(EspyError::invalid("funit", "must be hz or ppm")),
        }
    }

    fn scaled(&self, array: &Array2<f64>, funit: FrequencyUnit) -> Result<Array2<f64>> {
        let mut out = array.clone();
        if let Some(sfo) = self.sfo_for(funit)? {
            for (d, s) in sfo.iter().enumerate() {
                out.column_mut(2 + d).mapv_inplace(|v| v / s);
            }
        }
        Ok(out)
    }

    fn convert_region(&self, region: &Region, unit: FrequencyUnit) -> Result<Region> {
        let sfo = self.sfo_for(unit)?;
        Ok(region
            .iter()
            .enumerate()
            .map(|(d, bounds)| {
                bounds.map(|(l, r)| match sfo {
                    Some(sfo) => (l / sfo[d], r / sfo[d]),
                    None => (l, r),
                })
            })
            .collect())
    }
}

/// Row order sorting `column` ascending.
pub(crate) fn argsort(array: &Array2<f64>, column: usize) -> Vec<usize> {
    let mut order: Vec<usize> = (0..array.nrows()).collect();
    order.sort_by(|&a, &b| array[[a, column]].total_cmp(&array[[b, column]]));
    order
}

// ============================================================================
// Serialization
// ============================================================================

/// Plain representation of an [`EstimationResult`] used for persistence.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub(crate) struct ResultRecord {
    params: Vec<Vec<f64>>,
    errors: Vec<Vec<f64>>,
    columns: usize,
    region: Region,
    noise_region: Option<Region>,
    sfo: Option<Vec<f64>>,
    #[serde(default)]
    filtered: bool,
}

fn rows(array: &Array2<f64>) -> Vec<Vec<f64>> {
    array.rows().into_iter().map(|r| r.to_vec()).collect()
}

fn from_rows(rows: &[Vec<f64>], columns: usize) -> Result<Array2<f64>> {
    if rows.iter().any(|r| r.len() != columns) {
        return Err(EspyError::shape(
            format!("rows of {} values", columns),
            "ragged parameter rows",
        ));
    }
    let flat: Vec<f64> = rows.iter().flatten().copied().collect();
    Array2::from_shape_vec((rows.len(), columns), flat).map_err(|e| EspyError::shape("parameter array", e.to_string()))
}

impl From<&EstimationResult> for ResultRecord {
    fn from(result: &EstimationResult) -> Self {
        Self {
            params: rows(&result.params),
            errors: rows(&result.errors),
            columns: result.params.ncols(),
            region: result.region.clone(),
            noise_region: result.noise_region.clone(),
            sfo: result.sfo.clone(),
            filtered: result.filtered,
        }
    }
}

impl TryFrom<ResultRecord> for EstimationResult {
    type Error = EspyError;

    fn try_from(record: ResultRecord) -> Result<Self> {
        if record.columns != 4 && record.columns != 6 {
            return Err(EspyError::shape("4 or 6 parameter columns", record.columns.to_string()));
        }
        let params = from_rows(&record.params, record.columns)?;
        let errors = from_rows(&record.errors, record.columns)?;
        if params.nrows() != errors.nrows() {
            return Err(EspyError::shape(
                format!("{} error rows", params.nrows()),
                errors.nrows().to_string(),
            ));
        }
        Ok(Self::new(
            params,
            errors,
            record.region,
            record.noise_region,
            record.sfo,
            record.filtered,
        ))
    }
}
