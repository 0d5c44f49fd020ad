//! Experiment information
//!
//! [`ExpInfo`] holds the spectrometer parameters of an experiment (sweep
//! width, transmitter offset, transmitter frequency, nuclei) and provides the
//! conversions between array indices, Hz and ppm used when specifying spectral
//! regions.

use serde::{Deserialize, Serialize};

use crate::error::{EspyError, Result};

/// Unit in which frequencies and region bounds are expressed
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum FrequencyUnit {
    /// Array index in the (flipped) spectrum
    Idx,
    #[default]
    Hz,
    Ppm,
}

impl FrequencyUnit {
    /// Parse from string (case-insensitive)
    pub fn from_str(s: &str) -> Option<Self> {
        match s.to_lowercase().as_str() {
            "idx" => Some(FrequencyUnit::Idx),
            "hz" => Some(FrequencyUnit::Hz),
            "ppm" => Some(FrequencyUnit::Ppm),
            _ => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            FrequencyUnit::Idx => "idx",
            FrequencyUnit::Hz => "hz",
            FrequencyUnit::Ppm => "ppm",
        }
    }
}

/// Acquisition mode of the indirect dimension of multidimensional experiments
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum FnMode {
    Qf,
    Qsed,
    Tppi,
    States,
    StatesTppi,
    EchoAntiecho,
}

/// Lower and upper bound of a region in one dimension.
pub type Bounds = (f64, f64);

/// Region specification, one entry per dimension.
///
/// `None` leaves the corresponding dimension unfiltered.
pub type Region = Vec<Option<Bounds>>;

/// Experiment metadata
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExpInfo {
    dim: usize,
    /// Sweep width per dimension (Hz)
    sw: Vec<f64>,
    /// Transmitter offset per dimension (Hz)
    offset: Vec<f64>,
    /// Transmitter frequency per dimension (MHz)
    sfo: Option<Vec<f64>>,
    nuclei: Option<Vec<String>>,
    default_pts: Option<Vec<usize>>,
    fn_mode: Option<FnMode>,
}

impl ExpInfo {
    /// Create experiment information from sweep widths and offsets (Hz).
    ///
    /// The dimensionality is given by the number of sweep widths, and must be
    /// 1 or 2.
    ///
    /// # Example
    /// ```
    /// use espy_core::ExpInfo;
    /// let expinfo = ExpInfo::new(vec![5000.0], vec![1000.0]).unwrap().with_sfo(vec![500.0]).unwrap();
    /// assert_eq!(expinfo.dim(), 1);
    /// ```
    pub fn new(sw: Vec<f64>, offset: Vec<f64>) -> Result<Self> {
        let dim = sw.len();
        if !(1..=2).contains(&dim) {
            return Err(EspyError::invalid("sw", format!("expected 1 or 2 values, got {}", dim)));
        }
        if offset.len() != dim {
            return Err(EspyError::invalid(
                "offset",
                format!("expected {} values, got {}", dim, offset.len()),
            ));
        }
        if sw.iter().any(|&s| !(s > 0.0) || !s.is_finite()) {
            return Err(EspyError::invalid("sw", "sweep widths must be positive"));
        }
        if offset.iter().any(|o| !o.is_finite()) {
            return Err(EspyError::invalid("offset", "offsets must be finite"));
        }
        Ok(Self {
            dim,
            sw,
            offset,
            sfo: None,
            nuclei: None,
            default_pts: None,
            fn_mode: None,
        })
    }

    /// Set the transmitter frequency in each dimension (MHz)
    pub fn with_sfo(mut self, sfo: Vec<f64>) -> Result<Self> {
        if sfo.len() != self.dim || sfo.iter().any(|&s| !(s > 0.0)) {
            return Err(EspyError::invalid(
                "sfo",
                format!("expected {} positive values", self.dim),
            ));
        }
        self.sfo = Some(sfo);
        Ok(self)
    }

    /// Set the nucleus identity in each dimension (e.g. `"1H"`, `"13C"`)
    pub fn with_nuclei(mut self, nuclei: Vec<String>) -> Result<Self> {
        if nuclei.len() != self.dim {
            return Err(EspyError::invalid(
                "nuclei",
                format!("expected {} values, got {}", self.dim, nuclei.len()),
            ));
        }
        let valid = nuclei.iter().all(|n| {
            let digits = n.chars().take_while(|c| c.is_ascii_digit()).count();
            digits > 0 && n.len() > digits && n[digits..].chars().all(|c| c.is_ascii_alphabetic())
        });
        if !valid {
            return Err(EspyError::invalid("nuclei", format!("invalid nuclei: {:?}", nuclei)));
        }
        self.nuclei = Some(nuclei);
        Ok(self)
    }

    /// Set the default number of points in each dimension
    pub fn with_default_pts(mut self, pts: Vec<usize>) -> Result<Self> {
        if pts.len() != self.dim || pts.iter().any(|&p| p == 0) {
            return Err(EspyError::invalid(
                "default_pts",
                format!("expected {} values, all at least 1", self.dim),
            ));
        }
        self.default_pts = Some(pts);
        Ok(self)
    }

    /// Set the acquisition mode of the indirect dimension
    pub fn with_fn_mode(mut self, fn_mode: FnMode) -> Self {
        self.fn_mode = Some(fn_mode);
        self
    }

    #[inline]
    pub fn dim(&self) -> usize {
        self.dim
    }

    /// Sweep width in the requested unit
    pub fn sw(&self, unit: FrequencyUnit) -> Result<Vec<f64>> {
        self.scale_hz(&self.sw, unit)
    }

    /// Transmitter offset in the requested unit
    pub fn offset(&self, unit: FrequencyUnit) -> Result<Vec<f64>> {
        self.scale_hz(&self.offset, unit)
    }

    /// Sweep width in Hz
    #[inline]
    pub fn sw_hz(&self) -> &[f64] {
        &self.sw
    }

    /// Transmitter offset in Hz
    #[inline]
    pub fn offset_hz(&self) -> &[f64] {
        &self.offset
    }

    #[inline]
    pub fn sfo(&self) -> Option<&[f64]> {
        self.sfo.as_deref()
    }

    /// Basic frequency (MHz): `sfo - offset * 1e-6`
    pub fn bf(&self) -> Option<Vec<f64>> {
        self.sfo.as_ref().map(|sfo| {
            sfo.iter()
                .zip(self.offset.iter())
                .map(|(s, o)| s - o * 1e-6)
                .collect()
        })
    }

    #[inline]
    pub fn nuclei(&self) -> Option<&[String]> {
        self.nuclei.as_deref()
    }

    #[inline]
    pub fn default_pts(&self) -> Option<&[usize]> {
        self.default_pts.as_deref()
    }

    #[inline]
    pub fn fn_mode(&self) -> Option<FnMode> {
        self.fn_mode
    }

    /// Whether conversion between Hz and ppm is possible
    #[inline]
    pub fn hz_ppm_valid(&self) -> bool {
        self.sfo.is_some()
    }

    /// Copy with a new sweep width and offset, keeping all other fields.
    pub(crate) fn with_sw_offset(&self, sw: Vec<f64>, offset: Vec<f64>) -> Self {
        let mut new = self.clone();
        new.sw = sw;
        new.offset = offset;
        new
    }

    /// Fail if `unit` cannot be used with this experiment.
    pub fn check_unit(&self, name: &'static str, unit: FrequencyUnit) -> Result<()> {
        if unit == FrequencyUnit::Ppm && !self.hz_ppm_valid() {
            return Err(EspyError::invalid(
                name,
                "ppm requires a transmitter frequency (sfo) to be set",
            ));
        }
        Ok(())
    }

    fn scale_hz(&self, values: &[f64], unit: FrequencyUnit) -> Result<Vec<f64>> {
        match unit {
            FrequencyUnit::Hz => Ok(values.to_vec()),
            FrequencyUnit::Ppm => {
                self.check_unit("unit", unit)?;
                let sfo = self.sfo.as_ref().ok_or_else(|| EspyError::invalid("unit", "sfo unset"))?;
                Ok(values.iter().zip(sfo.iter()).map(|(v, s)| v / s).collect())
            }
            FrequencyUnit::Idx => Err(EspyError::invalid(
                "unit",
                "sweep width and offset cannot be expressed as indices",
            )),
        }
    }

    /// Convert a single value in dimension `axis` between units.
    ///
    /// `pts` is the number of points in that dimension, required for
    /// conversions involving indices. Index 0 corresponds to the highest
    /// frequency (spectra are displayed high to low).
    pub fn convert_value(
        &self,
        value: f64,
        axis: usize,
        from: FrequencyUnit,
        to: FrequencyUnit,
        pts: usize,
    ) -> Result<f64> {
        if axis >= self.dim {
            return Err(EspyError::invalid(
                "axis",
                format!("must be less than {}", self.dim),
            ));
        }
        self.check_unit("from", from)?;
        self.check_unit("to", to)?;
        if from == to {
            return Ok(value);
        }
        let sw = self.sw[axis];
        let off = self.offset[axis];
        let hz = match from {
            FrequencyUnit::Hz => value,
            FrequencyUnit::Ppm => value * self.sfo_at(axis)?,
            FrequencyUnit::Idx => {
                if pts < 2 {
                    return Err(EspyError::invalid("pts", "at least 2 points are required"));
                }
                off + sw / 2.0 - value * sw / (pts - 1) as f64
            }
        };
        match to {
            FrequencyUnit::Hz => Ok(hz),
            FrequencyUnit::Ppm => Ok(hz / self.sfo_at(axis)?),
            FrequencyUnit::Idx => {
                if pts < 2 {
                    return Err(EspyError::invalid("pts", "at least 2 points are required"));
                }
                Ok(((off + sw / 2.0 - hz) * (pts - 1) as f64 / sw).round())
            }
        }
    }

    /// Convert every bound of a region between units.
    pub fn convert_region(
        &self,
        region: &Region,
        from: FrequencyUnit,
        to: FrequencyUnit,
        pts: &[usize],
    ) -> Result<Region> {
        if region.len() != self.dim || pts.len() != self.dim {
            return Err(EspyError::shape(
                format!("{} dimensions", self.dim),
                format!("region: {}, pts: {}", region.len(), pts.len()),
            ));
        }
        region
            .iter()
            .enumerate()
            .map(|(axis, bounds)| {
                bounds
                    .map(|(l, r)| {
                        Ok::<_, EspyError>((
                            self.convert_value(l, axis, from, to, pts[axis])?,
                            self.convert_value(r, axis, from, to, pts[axis])?,
                        ))
                    })
                    .transpose()
            })
            .collect()
    }

    fn sfo_at(&self, axis: usize) -> Result<f64> {
        self.sfo
            .as_ref()
            .map(|s| s[axis])
            .ok_or_else(|| EspyError::invalid("unit", "ppm requires sfo to be set"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    fn expinfo() -> ExpInfo {
        ExpInfo::new(vec![5000.0], vec![2000.0])
            .unwrap()
            .with_sfo(vec![500.0])
            .unwrap()
    }

    #[test]
    fn test_units() {
        let e = expinfo();
        assert_relative_eq!(e.sw(FrequencyUnit::Ppm).unwrap()[0], 10.0);
        assert_relative_eq!(e.offset(FrequencyUnit::Ppm).unwrap()[0], 4.0);
        assert_relative_eq!(e.bf().unwrap()[0], 500.0 - 2000.0e-6);
        assert!(e.hz_ppm_valid());
    }

    #[test]
    fn test_ppm_without_sfo() {
        let e = ExpInfo::new(vec![5000.0], vec![0.0]).unwrap();
        assert!(e.sw(FrequencyUnit::Ppm).is_err());
        assert!(e.check_unit("region_unit", FrequencyUnit::Ppm).is_err());
    }

    #[test]
    fn test_idx_hz_round_trip() {
        let e = expinfo();
        // Index 0 is the highest frequency
        let hz = e.convert_value(0.0, 0, FrequencyUnit::Idx, FrequencyUnit::Hz, 1025).unwrap();
        assert_relative_eq!(hz, 4500.0);
        let last = e.convert_value(1024.0, 0, FrequencyUnit::Idx, FrequencyUnit::Hz, 1025).unwrap();
        assert_relative_eq!(last, -500.0);
        let idx = e.convert_value(2000.0, 0, FrequencyUnit::Hz, FrequencyUnit::Idx, 1025).unwrap();
        assert_relative_eq!(idx, 512.0);
        let ppm = e.convert_value(512.0, 0, FrequencyUnit::Idx, FrequencyUnit::Ppm, 1025).unwrap();
        assert_relative_eq!(ppm, 4.0);
    }

    #[test]
    fn test_invalid_construction() {
        assert!(ExpInfo::new(vec![], vec![]).is_err());
        assert!(ExpInfo::new(vec![-1.0], vec![0.0]).is_err());
        assert!(ExpInfo::new(vec![1.0, 1.0], vec![0.0]).is_err());
        let e = ExpInfo::new(vec![1.0], vec![0.0]).unwrap();
        assert!(e.clone().with_nuclei(vec!["1H".to_string()]).is_ok());
        assert!(e.with_nuclei(vec!["H1".to_string()]).is_err());
    }

    #[test]
    fn test_frequency_unit_from_str() {
        assert_eq!(FrequencyUnit::from_str("PPM"), Some(FrequencyUnit::Ppm));
        assert_eq!(FrequencyUnit::from_str("hz"), Some(FrequencyUnit::Hz));
        assert_eq!(FrequencyUnit::from_str("invalid"), None);
    }
}
