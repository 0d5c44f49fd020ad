//! White Gaussian noise matched to a target signal-to-noise ratio

use ndarray::{Array, ArrayD, Dimension, IxDyn};
use num_complex::Complex64;
use rand::Rng;
use rand_distr::{Distribution, Normal};

use crate::constants::NOISE_INSTANCES;
use crate::error::{EspyError, Result};
use crate::math::db_2_magnitude;

/// Population standard deviation of a set of real values
pub(crate) fn std_dev<'a, I: IntoIterator<Item = &'a f64>>(values: I) -> f64 {
    let values: Vec<f64> = values.into_iter().cloned().collect();
    if values.is_empty() {
        return 0.0;
    }
    let n = values.len() as f64;
    let mean = values.iter().sum::<f64>() / n;
    (values.iter().map(|v| (v - mean).powi(2)).sum::<f64>() / n).sqrt()
}

/// Generate complex white noise for `fid` at the requested SNR.
///
/// The per-component deviation is `std(|fid|) / snr`. Several real
/// realisations are drawn and the two whose sample deviation is closest to
/// the target become the real and imaginary parts.
///
/// # Arguments
/// * `fid` - Noiseless signal the noise is scaled against
/// * `snr` - Signal-to-noise ratio
/// * `decibels` - Whether `snr` is in dB (amplitude ratio, 20 log10)
pub fn make_noise<D: Dimension, R: Rng + ?Sized>(
    fid: &Array<Complex64, D>,
    snr: f64,
    decibels: bool,
    rng: &mut R,
) -> Result<ArrayD<Complex64>> {
    if !snr.is_finite() || (!decibels && snr <= 0.0) {
        return Err(EspyError::invalid("snr", "must be finite and positive"));
    }
    let ratio = if decibels { db_2_magnitude(snr) } else { snr };
    let magnitudes: Vec<f64> = fid.iter().map(|v| v.norm()).collect();
    let target = std_dev(&magnitudes) / ratio;
    let shape = IxDyn(fid.shape());

    if target == 0.0 {
        return Ok(ArrayD::zeros(shape));
    }
    let normal = Normal::new(0.0, target)
        .map_err(|e| EspyError::invalid("snr", format!("noise deviation rejected: {}", e)))?;

    let size = fid.len();
    let mut instances: Vec<(f64, Vec<f64>)> = (0..NOISE_INSTANCES)
        .map(|_| {
            let draw: Vec<f64> = (0..size).map(|_| normal.sample(rng)).collect();
            ((std_dev(&draw) - target).abs(), draw)
        })
        .collect();
    instances.sort_by(|a, b| a.0.total_cmp(&b.0));

    let real = &instances[0].1;
    let imag = &instances[1].1;
    let noise: Vec<Complex64> = real
        .iter()
        .zip(imag)
        .map(|(&re, &im)| Complex64::new(re, im))
        .collect();
    ArrayD::from_shape_vec(shape, noise)
        .map_err(|e| EspyError::shape(format!("{:?}", fid.shape()), e.to_string()))
}

/// Add SNR-matched Gaussian noise to `data` in place.
pub fn add_noise<R: Rng + ?Sized>(
    data: &mut ArrayD<Complex64>,
    snr: f64,
    decibels: bool,
    rng: &mut R,
) -> Result<()> {
    let noise = make_noise(data, snr, decibels, rng)?;
    *data += &noise;
    Ok(())
}
