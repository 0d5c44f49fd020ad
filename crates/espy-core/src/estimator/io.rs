//! Estimator persistence
//!
//! Estimators are stored as a versioned JSON document holding the signal,
//! its experiment information, the results and the operation log. A series
//! document nests one such document per increment.

use std::fs;
use std::path::Path;

use ndarray::{ArrayD, IxDyn};
use num_complex::Complex64;
use rand::rngs::StdRng;
use rand::SeedableRng;
use serde::{Deserialize, Serialize};

use super::oplog::{LogEntry, OperationLog};
use super::result::ResultRecord;
use super::series::SeriesEstimator;
use super::{EstimationResult, Estimator, ExperimentKind};
use crate::error::{EspyError, Result};
use crate::expinfo::ExpInfo;

/// Version written to, and required of, persisted estimators.
pub const FORMAT_VERSION: u32 = 1;

#[derive(Debug, Serialize, Deserialize)]
pub(crate) struct EstimatorDocument {
    version: u32,
    kind: ExperimentKind,
    expinfo: ExpInfo,
    shape: Vec<usize>,
    /// Real parts, row-major
    data_re: Vec<f64>,
    /// Imaginary parts, row-major
    data_im: Vec<f64>,
    results: Vec<ResultRecord>,
    log: Vec<LogEntry>,
}

#[derive(Debug, Serialize, Deserialize)]
struct SeriesDocument {
    version: u32,
    kind: ExperimentKind,
    increments: Vec<f64>,
    increment_label: Option<String>,
    members: Vec<EstimatorDocument>,
    log: Vec<LogEntry>,
}

fn check_version(found: u32) -> Result<()> {
    if found != FORMAT_VERSION {
        return Err(EspyError::Version {
            found,
            expected: FORMAT_VERSION,
        });
    }
    Ok(())
}

impl Estimator {
    pub(crate) fn to_document(&self) -> EstimatorDocument {
        EstimatorDocument {
            version: FORMAT_VERSION,
            kind: self.kind,
            expinfo: self.expinfo.clone(),
            shape: self.data.shape().to_vec(),
            data_re: self.data.iter().map(|v| v.re).collect(),
            data_im: self.data.iter().map(|v| v.im).collect(),
            results: self.results.iter().map(ResultRecord::from).collect(),
            log: self.log.entries().to_vec(),
        }
    }

    pub(crate) fn from_document(document: EstimatorDocument) -> Result<Self> {
        check_version(document.version)?;
        if document.kind == ExperimentKind::Series {
            return Err(EspyError::invalid("kind", "series documents are loaded with SeriesEstimator"));
        }
        if document.kind.dim() != document.expinfo.dim() || document.shape.len() != document.kind.dim() {
            return Err(EspyError::shape(
                format!("{}D document", document.kind.dim()),
                format!("expinfo {}D, data shape {:?}", document.expinfo.dim(), document.shape),
            ));
        }
        let size: usize = document.shape.iter().product();
        if document.data_re.len() != size || document.data_im.len() != size {
            return Err(EspyError::shape(
                format!("{} data points", size),
                format!("{} real, {} imaginary", document.data_re.len(), document.data_im.len()),
            ));
        }
        let values: Vec<Complex64> = document
            .data_re
            .iter()
            .zip(&document.data_im)
            .map(|(&re, &im)| Complex64::new(re, im))
            .collect();
        let data = ArrayD::from_shape_vec(IxDyn(&document.shape), values)
            .map_err(|e| EspyError::shape(format!("{:?}", document.shape), e.to_string()))?;
        let results = document
            .results
            .into_iter()
            .map(EstimationResult::try_from)
            .collect::<Result<Vec<_>>>()?;
        if let Some(bad) = results.iter().find(|r| r.dim() != document.kind.dim()) {
            return Err(EspyError::shape(
                format!("{}D results", document.kind.dim()),
                format!("{}D result", bad.dim()),
            ));
        }

        Ok(Self {
            kind: document.kind,
            data,
            expinfo: document.expinfo,
            results,
            log: OperationLog::from_entries(document.log),
            rng: StdRng::from_entropy(),
        })
    }

    /// Serialize the estimator to a JSON string.
    pub fn to_json(&self) -> Result<String> {
        Ok(serde_json::to_string(&self.to_document())?)
    }

    /// Restore an estimator from [`to_json`](Self::to_json) output.
    ///
    /// The random source used for filtering is freshly seeded from entropy.
    pub fn from_json(json: &str) -> Result<Self> {
        let document: EstimatorDocument = serde_json::from_str(json)?;
        let estimator = Self::from_document(document)?;
        log::info!("loaded estimator with {} results", estimator.results.len());
        Ok(estimator)
    }

    /// Write the estimator to `path` as JSON.
    pub fn save<P: AsRef<Path>>(&self, path: P) -> Result<()> {
        fs::write(path.as_ref(), self.to_json()?)?;
        log::info!("saved estimator to {}", path.as_ref().display());
        Ok(())
    }

    /// Read an estimator written by [`save`](Self::save).
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        let json = fs::read_to_string(path.as_ref())?;
        Self::from_json(&json)
    }
}

impl SeriesEstimator {
    /// Serialize the series to a JSON string.
    pub fn to_json(&self) -> Result<String> {
        let document = SeriesDocument {
            version: FORMAT_VERSION,
            kind: ExperimentKind::Series,
            increments: self.increments.clone(),
            increment_label: self.increment_label.clone(),
            members: self.members.iter().map(Estimator::to_document).collect(),
            log: self.log.entries().to_vec(),
        };
        Ok(serde_json::to_string(&document)?)
    }

    /// Restore a series from [`to_json`](Self::to_json) output.
    pub fn from_json(json: &str) -> Result<Self> {
        let document: SeriesDocument = serde_json::from_str(json)?;
        check_version(document.version)?;
        if document.kind != ExperimentKind::Series {
            return Err(EspyError::invalid("kind", "not a series document"));
        }
        let members = document
            .members
            .into_iter()
            .map(Estimator::from_document)
            .collect::<Result<Vec<_>>>()?;
        let series = Self::from_members(members, document.increments, document.increment_label, OperationLog::from_entries(document.log))?;
        log::info!("loaded series of {} increments", series.increments.len());
        Ok(series)
    }

    /// Write the series to `path` as JSON.
    pub fn save<P: AsRef<Path>>(&self, path: P) -> Result<()> {
        fs::write(path.as_ref(), self.to_json()?)?;
        log::info!("saved series to {}", path.as_ref().display());
        Ok(())
    }

    /// Read a series written by [`save`](Self::save).
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        let json = fs::read_to_string(path.as_ref())?;
        Self::from_json(&json)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ndarray::array;

    fn estimator() -> Estimator {
        let expinfo = ExpInfo::new(vec![100.0], vec![5.0]).unwrap().with_sfo(vec![400.0]).unwrap();
        let data = array![Complex64::new(1.0, -1.0), Complex64::new(0.5, 0.25), Complex64::new(0.0, 2.0)].into_dyn();
        Estimator::new(data, expinfo).unwrap()
    }

    #[test]
    fn test_json_round_trip() {
        let est = estimator();
        let back = Estimator::from_json(&est.to_json().unwrap()).unwrap();
        assert_eq!(back.data(), est.data());
        assert_eq!(back.expinfo(), est.expinfo());
        assert_eq!(back.log(), est.log());
        assert_eq!(back.kind(), ExperimentKind::OneDim);
    }

    #[test]
    fn test_version_mismatch() {
        let json = estimator().to_json().unwrap().replacen("\"version\":1", "\"version\":99", 1);
        assert!(matches!(
            Estimator::from_json(&json),
            Err(EspyError::Version { found: 99, expected: 1 })
        ));
    }

    #[test]
    fn test_malformed_json() {
        assert!(matches!(Estimator::from_json("{"), Err(EspyError::Serde(_))));
    }

    #[test]
    fn test_series_documents_are_not_single_estimators() {
        let expinfo = ExpInfo::new(vec![100.0], vec![5.0]).unwrap();
        let data = array![[Complex64::new(1.0, 0.0), Complex64::new(0.5, 0.0)], [Complex64::new(0.8, 0.0), Complex64::new(0.4, 0.0)]];
        let series = SeriesEstimator::new(data, expinfo, vec![0.1, 0.2]).unwrap();
        let json = series.to_json().unwrap();
        assert!(Estimator::from_json(&json).is_err());
        assert!(SeriesEstimator::from_json(&estimator().to_json().unwrap()).is_err());

        let back = SeriesEstimator::from_json(&json).unwrap();
        assert_eq!(back.increments(), series.increments());
        assert_eq!(back.fid(1).unwrap(), series.fid(1).unwrap());
    }
}
