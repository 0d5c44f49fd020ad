//! Frequency filtering
//!
//! Isolates a spectral region of a signal so it can be estimated on its own.
//!
//! ## Procedure
//!
//! 1. The signal is extended to a virtual echo, whose spectrum is real.
//! 2. The spectrum is multiplied by a super-Gaussian centred on the region.
//!    Points the filter suppresses are filled with Gaussian noise whose
//!    deviation matches a signal-free noise region, so the filtered signal
//!    keeps a noise floor comparable to the original.
//! 3. The result is transformed back to the time domain. Optionally the
//!    spectrum is first cut down to the region (scaled by `cut_ratio`),
//!    yielding a shorter signal with a narrower sweep width.
//!
//! For 2D J-resolved data only the direct dimension (axis 1) is filtered.

use ndarray::{Array1, ArrayD, Axis, Slice};
use num_complex::Complex64;
use rand::Rng;
use rand_distr::{Distribution, Normal};

use crate::constants::{DEFAULT_CUT_RATIO, SUPER_GAUSSIAN_POWER};
use crate::error::{EspyError, Result};
use crate::expinfo::{ExpInfo, FrequencyUnit, Region};
use crate::signal::{ft_axes, ift_axes, make_virtual_echo, std_dev};

/// Filter configuration
#[derive(Debug, Clone, PartialEq)]
pub struct FilterOptions {
    /// Power of the super-Gaussian
    pub sg_power: f64,
    /// Ratio between the cut spectrum and the region width. `None` keeps the
    /// full sweep width.
    pub cut_ratio: Option<f64>,
}

impl Default for FilterOptions {
    fn default() -> Self {
        Self {
            sg_power: SUPER_GAUSSIAN_POWER,
            cut_ratio: Some(DEFAULT_CUT_RATIO),
        }
    }
}

/// Super-Gaussian `exp(-2^(p+2) ((k - c) / b)^p)` on `n` points.
///
/// `c` is the centre and `b` the width of `[left, right]`, in points.
pub fn super_gaussian(n: usize, left: usize, right: usize, power: f64) -> Array1<f64> {
    let centre = (left + right) as f64 / 2.0;
    let width = (right - left) as f64;
    let scale = 2f64.powf(power + 2.0);
    Array1::from_shape_fn(n, |k| {
        let x = ((k as f64 - centre) / width).abs();
        (-scale * x.powf(power)).exp()
    })
}

/// A filtered signal, from which time-domain signals of different lengths
/// can be extracted.
#[derive(Debug, Clone)]
pub struct Filter {
    /// Filtered spectrum of the virtual echo (real valued)
    spectrum: ArrayD<Complex64>,
    expinfo: ExpInfo,
    /// Shape of the signal before filtering
    fid_pts: Vec<usize>,
    /// Filtered axis
    axis: usize,
    /// Region bounds, in points of the virtual echo spectrum
    region: (usize, usize),
    noise_region: Option<(usize, usize)>,
    noise_std: f64,
    options: FilterOptions,
}

impl Filter {
    /// Filter `fid` about `region`.
    ///
    /// # Arguments
    /// * `fid` - Time-domain signal (1D, or 2D J-resolved)
    /// * `expinfo` - Experiment information for `fid`
    /// * `region` - Region bounds per dimension. For 2D data the indirect
    ///   dimension must be `None`.
    /// * `noise_region` - Signal-free region used to estimate the noise floor.
    ///   Without one, suppressed points are simply zeroed.
    /// * `region_unit` - Unit of the bounds in `region` and `noise_region`
    /// * `rng` - Random source for the noise fill
    pub fn new<R: Rng + ?Sized>(
        fid: &ArrayD<Complex64>,
        expinfo: &ExpInfo,
        region: &Region,
        noise_region: Option<&Region>,
        region_unit: FrequencyUnit,
        options: FilterOptions,
        rng: &mut R,
    ) -> Result<Self> {
        let dim = expinfo.dim();
        if fid.ndim() != dim {
            return Err(EspyError::shape(
                format!("{}D signal", dim),
                format!("{}D signal", fid.ndim()),
            ));
        }
        if !(options.sg_power > 0.0) {
            return Err(EspyError::invalid("sg_power", "must be positive"));
        }
        expinfo.check_unit("region_unit", region_unit)?;

        let axis = dim - 1;
        let fid_pts = fid.shape().to_vec();
        if fid_pts[axis] < 2 {
            return Err(EspyError::invalid("fid", "at least 2 points are needed to filter"));
        }
        let n = 2 * fid_pts[axis] - 1;

        let region = Self::filtered_bounds("region", region, dim, axis)?;
        let region = Self::to_index(expinfo, "region", region, region_unit, axis, n)?;
        let noise_region = noise_region
            .map(|nr| {
                let bounds = Self::filtered_bounds("noise_region", nr, dim, axis)?;
                Self::to_index(expinfo, "noise_region", bounds, region_unit, axis, n)
            })
            .transpose()?;

        log::debug!(
            "filtering axis {} between points {} and {} of {}",
            axis,
            region.0,
            region.1,
            n
        );

        let ve = make_virtual_echo(fid)?;
        let mut spectrum = ft_axes(&ve, &[axis], true)?.mapv(|v| Complex64::new(v.re, 0.0));

        let noise_std = match noise_region {
            Some((l, r)) => {
                let values: Vec<f64> = spectrum
                    .slice_axis(Axis(axis), Slice::from(l..=r))
                    .iter()
                    .map(|v| v.re)
                    .collect();
                std_dev(&values)
            }
            None => 0.0,
        };
        let normal = Normal::new(0.0, noise_std)
            .map_err(|e| EspyError::invalid("noise_region", e.to_string()))?;

        let sg = super_gaussian(n, region.0, region.1, options.sg_power);
        for (k, mut sub) in spectrum.axis_iter_mut(Axis(axis)).enumerate() {
            let g = sg[k];
            sub.mapv_inplace(|v| {
                let fill = if noise_std > 0.0 { normal.sample(rng) } else { 0.0 };
                Complex64::new(g * v.re + (1.0 - g) * fill, 0.0)
            });
        }

        Ok(Self {
            spectrum,
            expinfo: expinfo.clone(),
            fid_pts,
            axis,
            region,
            noise_region,
            noise_std,
            options,
        })
    }

    fn filtered_bounds(
        name: &'static str,
        region: &Region,
        dim: usize,
        axis: usize,
    ) -> Result<(f64, f64)> {
        if region.len() != dim {
            return Err(EspyError::invalid(
                name,
                format!("expected bounds for {} dimensions, found {}", dim, region.len()),
            ));
        }
        if region[..axis].iter().any(|b| b.is_some()) {
            return Err(EspyError::invalid(
                name,
                "only the direct dimension of 2D data can be filtered",
            ));
        }
        region[axis].ok_or_else(|| EspyError::invalid(name, "bounds for the direct dimension are required"))
    }

    fn to_index(
        expinfo: &ExpInfo,
        name: &'static str,
        (left, right): (f64, f64),
        unit: FrequencyUnit,
        axis: usize,
        n: usize,
    ) -> Result<(usize, usize)> {
        let l = expinfo.convert_value(left, axis, unit, FrequencyUnit::Idx, n)?;
        let r = expinfo.convert_value(right, axis, unit, FrequencyUnit::Idx, n)?;
        let (lo, hi) = if l <= r { (l, r) } else { (r, l) };
        if lo < 0.0 || hi > (n - 1) as f64 {
            return Err(EspyError::invalid(name, "bounds lie outside the spectral window"));
        }
        if lo == hi {
            return Err(EspyError::invalid(name, "bounds must enclose a non-zero width"));
        }
        Ok((lo as usize, hi as usize))
    }

    /// Points of the spectrum kept for a given `cut_ratio`.
    fn cut_bounds(&self, cut_ratio: Option<f64>) -> Result<(usize, usize)> {
        let n = self.spectrum.len_of(Axis(self.axis));
        match cut_ratio {
            None => Ok((0, n - 1)),
            Some(ratio) => {
                if !ratio.is_finite() || ratio < 1.0 {
                    return Err(EspyError::invalid("cut_ratio", "must be at least 1"));
                }
                let (left, right) = self.region;
                let centre = (left + right) as f64 / 2.0;
                let half = ratio * (right - left) as f64 / 2.0;
                let mut lo = (centre - half).floor().max(0.0) as usize;
                let mut hi = ((centre + half).ceil() as usize).min(n - 1);
                // Odd number of points, so the cut is itself a virtual echo
                if (hi - lo) % 2 == 1 {
                    if hi < n - 1 {
                        hi += 1;
                    } else {
                        lo -= 1;
                    }
                }
                Ok((lo, hi))
            }
        }
    }

    /// Filtered spectrum, optionally cut, with matching experiment info.
    ///
    /// The returned spectrum is that of the virtual echo, so it has about
    /// twice as many points as the corresponding time-domain signal.
    pub fn get_filtered_spectrum(&self, cut_ratio: Option<f64>) -> Result<(ArrayD<Complex64>, ExpInfo)> {
        let (lo, hi) = self.cut_bounds(cut_ratio)?;
        let spectrum = self
            .spectrum
            .slice_axis(Axis(self.axis), Slice::from(lo..=hi))
            .to_owned();
        let expinfo = self.cut_expinfo(lo, hi)?;
        Ok((spectrum, expinfo))
    }

    /// Filtered time-domain signal, optionally cut.
    ///
    /// # Arguments
    /// * `cut_ratio` - `None` returns a signal of the original length and
    ///   sweep width. `Some(r)` keeps `r` times the region width of the
    ///   spectrum, producing a shorter signal.
    ///
    /// # Returns
    /// The signal and its experiment information
    pub fn get_filtered_fid(&self, cut_ratio: Option<f64>) -> Result<(ArrayD<Complex64>, ExpInfo)> {
        let n = self.spectrum.len_of(Axis(self.axis));
        let (lo, hi) = self.cut_bounds(cut_ratio)?;
        let m = hi - lo + 1;
        let spectrum = self
            .spectrum
            .slice_axis(Axis(self.axis), Slice::from(lo..=hi))
            .to_owned();
        let echo = ift_axes(&spectrum, &[self.axis], true)?;
        let pts = (m + 1) / 2;
        let scale = m as f64 / n as f64;
        let fid = echo
            .slice_axis(Axis(self.axis), Slice::from(0..pts))
            .mapv(|v| v * scale);

        let mut fid_pts = self.fid_pts.clone();
        fid_pts[self.axis] = pts;
        let expinfo = self.cut_expinfo(lo, hi)?.with_default_pts(fid_pts)?;
        Ok((fid, expinfo))
    }

    /// Filtered signal using the cut ratio given at construction.
    pub fn filtered_fid(&self) -> Result<(ArrayD<Complex64>, ExpInfo)> {
        self.get_filtered_fid(self.options.cut_ratio)
    }

    /// Sweep width and offset of the spectrum points `lo..=hi`.
    ///
    /// Uses the same point spacing as [`ExpInfo::convert_value`], `sw / (n - 1)`,
    /// so an index of the cut spectrum maps to the same shift as the
    /// corresponding index of the full spectrum.
    fn cut_expinfo(&self, lo: usize, hi: usize) -> Result<ExpInfo> {
        let n = self.spectrum.len_of(Axis(self.axis));
        let mut sw = self.expinfo.sw_hz().to_vec();
        let mut offset = self.expinfo.offset_hz().to_vec();
        let spacing = sw[self.axis] / (n - 1) as f64;
        offset[self.axis] += sw[self.axis] / 2.0 - (lo + hi) as f64 * spacing / 2.0;
        sw[self.axis] = (hi - lo) as f64 * spacing;
        Ok(self.expinfo.with_sw_offset(sw, offset))
    }

    fn bounds_in_unit(&self, bounds: (usize, usize), unit: FrequencyUnit) -> Result<Region> {
        let n = self.spectrum.len_of(Axis(self.axis));
        let mut region: Region = vec![None; self.expinfo.dim()];
        let l = self.expinfo.convert_value(bounds.0 as f64, self.axis, FrequencyUnit::Idx, unit, n)?;
        let r = self.expinfo.convert_value(bounds.1 as f64, self.axis, FrequencyUnit::Idx, unit, n)?;
        region[self.axis] = Some((l, r));
        Ok(region)
    }

    /// Region used by the filter, in `unit`
    pub fn get_region(&self, unit: FrequencyUnit) -> Result<Region> {
        self.bounds_in_unit(self.region, unit)
    }

    /// Noise region used by the filter, in `unit`
    pub fn get_noise_region(&self, unit: FrequencyUnit) -> Result<Option<Region>> {
        self.noise_region
            .map(|b| self.bounds_in_unit(b, unit))
            .transpose()
    }

    /// Standard deviation of the noise fill
    pub fn noise_std(&self) -> f64 {
        self.noise_std
    }

    /// Experiment information of the unfiltered signal
    pub fn expinfo(&self) -> &ExpInfo {
        &self.expinfo
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;
    use ndarray::array;
    use rand::rngs::StdRng;
    use rand::SeedableRng;

    use crate::signal::make_fid;

    fn setup() -> (ArrayD<Complex64>, ExpInfo) {
        let expinfo = ExpInfo::new(vec![1000.0], vec![0.0]).unwrap();
        let params = array![[1.0, 0.0, 250.0, 5.0], [1.0, 0.0, -250.0, 5.0]];
        let (fid, _) = make_fid(&params, &expinfo, &[256]).unwrap();
        (fid, expinfo)
    }

    #[test]
    fn test_super_gaussian_shape() {
        let sg = super_gaussian(101, 40, 60, 40.0);
        assert_relative_eq!(sg[50], 1.0, epsilon = 1e-12);
        assert!(sg[45] > 0.99);
        assert!(sg[5] < 1e-12);
        assert!(sg[95] < 1e-12);
    }

    #[test]
    fn test_uncut_keeps_shape_and_expinfo() {
        let (fid, expinfo) = setup();
        let mut rng = StdRng::seed_from_u64(1);
        let region = vec![Some((400.0, 100.0))];
        let filter = Filter::new(&fid, &expinfo, &region, None, FrequencyUnit::Hz, FilterOptions::default(), &mut rng).unwrap();
        let (out, info) = filter.get_filtered_fid(None).unwrap();
        assert_eq!(out.shape(), &[256]);
        assert_relative_eq!(info.sw_hz()[0], 1000.0, epsilon = 1e-9);
        assert_relative_eq!(info.offset_hz()[0], 0.0, epsilon = 1e-9);
    }

    #[test]
    fn test_cut_narrows_sweep_width() {
        let (fid, expinfo) = setup();
        let mut rng = StdRng::seed_from_u64(1);
        let region = vec![Some((400.0, 100.0))];
        let filter = Filter::new(&fid, &expinfo, &region, None, FrequencyUnit::Hz, FilterOptions::default(), &mut rng).unwrap();
        let (out, info) = filter.get_filtered_fid(Some(1.1)).unwrap();
        assert!(out.len() < 256);
        assert!(info.sw_hz()[0] < 400.0);
        // The cut window is centred on the region
        assert_relative_eq!(info.offset_hz()[0], 250.0, epsilon = 10.0);
    }

    #[test]
    fn test_region_round_trip() {
        let (fid, expinfo) = setup();
        let mut rng = StdRng::seed_from_u64(1);
        let region = vec![Some((400.0, 100.0))];
        let noise = vec![Some((-400.0, -450.0))];
        let filter = Filter::new(&fid, &expinfo, &region, Some(&noise), FrequencyUnit::Hz, FilterOptions::default(), &mut rng).unwrap();
        let got = filter.get_region(FrequencyUnit::Hz).unwrap();
        let (l, r) = got[0].unwrap();
        // Bounds snap to the nearest point (spacing ~1.96 Hz)
        assert_relative_eq!(l, 400.0, epsilon = 2.0);
        assert_relative_eq!(r, 100.0, epsilon = 2.0);
        assert!(filter.get_noise_region(FrequencyUnit::Hz).unwrap().is_some());
    }

    #[test]
    fn test_cut_indices_map_to_the_same_shifts() {
        let (fid, expinfo) = setup();
        let mut rng = StdRng::seed_from_u64(1);
        let region = vec![Some((400.0, 100.0))];
        let filter = Filter::new(&fid, &expinfo, &region, None, FrequencyUnit::Hz, FilterOptions::default(), &mut rng).unwrap();
        let n = filter.spectrum.len();
        let (lo, hi) = filter.cut_bounds(Some(1.5)).unwrap();
        let (cut, info) = filter.get_filtered_spectrum(Some(1.5)).unwrap();
        let m = cut.len();
        assert_eq!(m, hi - lo + 1);
        assert_eq!(m % 2, 1);

        for j in [0, m / 3, m - 1] {
            let full = expinfo.convert_value((lo + j) as f64, 0, FrequencyUnit::Idx, FrequencyUnit::Hz, n).unwrap();
            let part = info.convert_value(j as f64, 0, FrequencyUnit::Idx, FrequencyUnit::Hz, m).unwrap();
            assert_relative_eq!(part, full, epsilon = 1e-9);
        }

        // The realised region lands on the same cut points it was taken from
        let (l, r) = filter.get_region(FrequencyUnit::Hz).unwrap()[0].unwrap();
        let l_idx = info.convert_value(l, 0, FrequencyUnit::Hz, FrequencyUnit::Idx, m).unwrap();
        let r_idx = info.convert_value(r, 0, FrequencyUnit::Hz, FrequencyUnit::Idx, m).unwrap();
        assert_relative_eq!(l_idx, (filter.region.0 - lo) as f64, epsilon = 1e-9);
        assert_relative_eq!(r_idx, (filter.region.1 - lo) as f64, epsilon = 1e-9);
    }

    #[test]
    fn test_invalid_regions() {
        let (fid, expinfo) = setup();
        let mut rng = StdRng::seed_from_u64(1);
        let degenerate = vec![Some((100.0, 100.0))];
        assert!(Filter::new(&fid, &expinfo, &degenerate, None, FrequencyUnit::Hz, FilterOptions::default(), &mut rng).is_err());
        let outside = vec![Some((900.0, 100.0))];
        assert!(Filter::new(&fid, &expinfo, &outside, None, FrequencyUnit::Hz, FilterOptions::default(), &mut rng).is_err());
        let ppm = vec![Some((1.0, 0.5))];
        assert!(Filter::new(&fid, &expinfo, &ppm, None, FrequencyUnit::Ppm, FilterOptions::default(), &mut rng).is_err());
    }
}
