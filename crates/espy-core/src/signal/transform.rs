//! Fourier transforms and spectral processing
//!
//! Spectra follow the NMR display convention: after the transform each axis
//! is fftshifted and flipped so that index 0 holds the highest frequency.

use ndarray::{s, Array, Array1, Array2, ArrayD, Axis, Dimension, RemoveAxis, Slice};
use num_complex::Complex64;

use super::model::{check_pts, make_fid};
use crate::error::{EspyError, Result};
use crate::expinfo::{ExpInfo, FrequencyUnit};
use crate::math::{fft_axis, fftshift_axis, flip_axis, ifftshift_axis, FftDirection};

fn check_axes(axes: &[usize], ndim: usize) -> Result<()> {
    if let Some(bad) = axes.iter().find(|&&a| a >= ndim) {
        return Err(EspyError::invalid(
            "axes",
            format!("axis {} out of range for {}D data", bad, ndim),
        ));
    }
    Ok(())
}

/// Fourier transform of every axis, flipped into display order.
pub fn ft<D: Dimension>(fid: &Array<Complex64, D>) -> Array<Complex64, D> {
    let axes: Vec<usize> = (0..fid.ndim()).collect();
    transform_axes(fid, &axes, true)
}

/// Inverse of [`ft`].
pub fn ift<D: Dimension>(spectrum: &Array<Complex64, D>) -> Array<Complex64, D> {
    let axes: Vec<usize> = (0..spectrum.ndim()).collect();
    inverse_axes(spectrum, &axes, true)
}

/// Fourier transform over a subset of axes.
///
/// # Arguments
/// * `fid` - Time-domain data
/// * `axes` - Axes to transform
/// * `flip` - Whether to flip each transformed axis
pub fn ft_axes<D: Dimension>(
    fid: &Array<Complex64, D>,
    axes: &[usize],
    flip: bool,
) -> Result<Array<Complex64, D>> {
    check_axes(axes, fid.ndim())?;
    Ok(transform_axes(fid, axes, flip))
}

/// Inverse Fourier transform over a subset of axes.
pub fn ift_axes<D: Dimension>(
    spectrum: &Array<Complex64, D>,
    axes: &[usize],
    flip: bool,
) -> Result<Array<Complex64, D>> {
    check_axes(axes, spectrum.ndim())?;
    Ok(inverse_axes(spectrum, axes, flip))
}

fn transform_axes<D: Dimension>(
    fid: &Array<Complex64, D>,
    axes: &[usize],
    flip: bool,
) -> Array<Complex64, D> {
    let mut spectrum = fid.to_owned();
    for &axis in axes {
        fft_axis(&mut spectrum, axis, FftDirection::Forward);
        fftshift_axis(&mut spectrum, axis);
        if flip {
            spectrum = flip_axis(&spectrum, axis);
        }
    }
    spectrum
}

fn inverse_axes<D: Dimension>(
    spectrum: &Array<Complex64, D>,
    axes: &[usize],
    flip: bool,
) -> Array<Complex64, D> {
    let mut fid = spectrum.to_owned();
    for &axis in axes {
        if flip {
            fid = flip_axis(&fid, axis);
        }
        ifftshift_axis(&mut fid, axis);
        fft_axis(&mut fid, axis, FftDirection::Inverse);
    }
    fid
}

/// Apply zero- and first-order phase correction.
///
/// Each axis `d` is multiplied by `exp(i (p0_d + p1_d (n - pivot_d) / N_d))`.
pub fn phase<D: Dimension + RemoveAxis>(
    data: &Array<Complex64, D>,
    p0: &[f64],
    p1: &[f64],
    pivot: Option<&[f64]>,
) -> Result<Array<Complex64, D>> {
    let ndim = data.ndim();
    if p0.len() != ndim || p1.len() != ndim {
        return Err(EspyError::invalid(
            "p0/p1",
            format!("expected {} values each", ndim),
        ));
    }
    if let Some(pv) = pivot {
        if pv.len() != ndim {
            return Err(EspyError::invalid("pivot", format!("expected {} values", ndim)));
        }
    }

    let mut phased = data.to_owned();
    for axis in 0..ndim {
        let n = phased.len_of(Axis(axis));
        let piv = pivot.map_or(0.0, |p| p[axis]);
        for (i, mut sub) in phased.axis_iter_mut(Axis(axis)).enumerate() {
            let factor = Complex64::from_polar(1.0, p0[axis] + p1[axis] * (i as f64 - piv) / n as f64);
            sub.mapv_inplace(|v| v * factor);
        }
    }
    Ok(phased)
}

/// Chemical shifts at which a spectrum of `pts` points is sampled.
///
/// # Arguments
/// * `unit` - [`FrequencyUnit::Hz`] or [`FrequencyUnit::Ppm`]
/// * `flip` - Return shifts high-to-low (display order)
pub fn get_shifts(
    expinfo: &ExpInfo,
    pts: &[usize],
    unit: FrequencyUnit,
    flip: bool,
) -> Result<Vec<Array1<f64>>> {
    check_pts(pts, expinfo.dim())?;
    if unit == FrequencyUnit::Idx {
        return Err(EspyError::invalid("unit", "shifts are given in hz or ppm"));
    }
    let sw = expinfo.sw(unit)?;
    let offset = expinfo.offset(unit)?;
    Ok(pts
        .iter()
        .zip(sw.iter().zip(offset.iter()))
        .map(|(&n, (&sw, &off))| {
            let shifts = Array1::linspace(off - sw / 2.0, off + sw / 2.0, n);
            if flip {
                shifts.slice(s![..;-1]).to_owned()
            } else {
                shifts
            }
        })
        .collect())
}

/// Virtual echo of a 1D signal, or of each row of a J-resolved signal.
///
/// The last axis of length `N` is extended to `2N - 1` points so that its
/// Fourier transform is real for a phased signal: the first point keeps
/// only its real part and the conjugated, reversed tail is appended.
pub fn make_virtual_echo<D: Dimension>(data: &Array<Complex64, D>) -> Result<Array<Complex64, D>> {
    let ndim = data.ndim();
    if ndim == 0 || ndim > 2 {
        return Err(EspyError::invalid("data", "virtual echoes need 1D or 2D data"));
    }
    let last = ndim - 1;
    let n = data.len_of(Axis(last));
    if n == 0 {
        return Err(EspyError::invalid("data", "signal is empty"));
    }
    let mut shape = data.raw_dim();
    shape[last] = 2 * n - 1;
    let mut ve = Array::zeros(shape);

    for (mut out, lane) in ve.lanes_mut(Axis(last)).into_iter().zip(data.lanes(Axis(last))) {
        out[0] = Complex64::new(lane[0].re, 0.0);
        for k in 1..n {
            out[k] = lane[k];
            out[2 * n - 1 - k] = lane[k].conj();
        }
    }
    Ok(ve)
}

/// Zero-fill each axis up to the next power of two.
pub fn zf<D: Dimension>(data: &Array<Complex64, D>) -> Array<Complex64, D> {
    let mut shape = data.raw_dim();
    for axis in 0..data.ndim() {
        shape[axis] = data.len_of(Axis(axis)).next_power_of_two();
    }
    let mut out = Array::zeros(shape);
    out.slice_each_axis_mut(|ax| Slice::from(0..data.len_of(ax.axis)))
        .assign(data);
    out
}

/// Exponential apodisation along every axis.
///
/// The point `n` of an axis with `N` points is scaled by
/// `exp(-lb n / (N - 1))`.
pub fn exp_apodisation<D: Dimension + RemoveAxis>(data: &Array<Complex64, D>, lb: &[f64]) -> Result<Array<Complex64, D>> {
    if lb.len() != data.ndim() {
        return Err(EspyError::invalid("lb", format!("expected {} values", data.ndim())));
    }
    let mut out = data.to_owned();
    for (axis, &lb) in lb.iter().enumerate() {
        let n = out.len_of(Axis(axis));
        let denom = n.saturating_sub(1).max(1) as f64;
        for (i, mut sub) in out.axis_iter_mut(Axis(axis)).enumerate() {
            let factor = (-lb * i as f64 / denom).exp();
            sub.mapv_inplace(|v| v * factor);
        }
    }
    Ok(out)
}

/// Frequency-discriminated spectrum from an amplitude-modulated pair.
pub fn proc_amp_modulated(cos: &Array2<Complex64>, sin: &Array2<Complex64>) -> Result<Array2<Complex64>> {
    if cos.dim() != sin.dim() {
        return Err(EspyError::shape(
            format!("{:?}", cos.dim()),
            format!("{:?}", sin.dim()),
        ));
    }
    let cos_f2 = transform_axes(cos, &[1], true).mapv(|v| v.re);
    let sin_f2 = transform_axes(sin, &[1], true).mapv(|v| v.re);
    let combined = Array2::from_shape_fn(cos.dim(), |idx| Complex64::new(cos_f2[idx], sin_f2[idx]));
    Ok(transform_axes(&combined, &[0], true))
}

/// Real spectra from a P-type / N-type pair.
///
/// # Returns
/// `[RR, RI, IR, II]`
pub fn proc_phase_modulated(
    p: &Array2<Complex64>,
    n: &Array2<Complex64>,
) -> Result<[Array2<f64>; 4]> {
    if p.dim() != n.dim() {
        return Err(EspyError::shape(format!("{:?}", p.dim()), format!("{:?}", n.dim())));
    }
    let p_f2 = transform_axes(p, &[1], true);
    let n_f2 = transform_axes(n, &[1], true).mapv(|v| v.conj());

    let plus = transform_axes(&((&p_f2 + &n_f2) * 0.5), &[0], true);
    let minus = transform_axes(
        &((&p_f2 - &n_f2) * Complex64::new(0.0, -0.5)),
        &[0],
        true,
    );
    Ok([
        plus.mapv(|v| v.re),
        minus.mapv(|v| v.re),
        plus.mapv(|v| v.im),
        minus.mapv(|v| v.im),
    ])
}

/// Composite Simpson integral of uniformly spaced samples (unit spacing).
///
/// For an even number of samples the result averages the two ways of
/// placing the single trapezoid at either end.
pub fn simpson(y: &[f64]) -> f64 {
    fn odd(y: &[f64]) -> f64 {
        let n = y.len();
        let mut total = y[0] + y[n - 1];
        for (i, v) in y.iter().enumerate().take(n - 1).skip(1) {
            total += if i % 2 == 1 { 4.0 * v } else { 2.0 * v };
        }
        total / 3.0
    }

    match y.len() {
        0 | 1 => 0.0,
        2 => 0.5 * (y[0] + y[1]),
        n if n % 2 == 1 => odd(y),
        n => {
            let first = odd(&y[..n - 1]) + 0.5 * (y[n - 2] + y[n - 1]);
            let last = 0.5 * (y[0] + y[1]) + odd(&y[1..]);
            0.5 * (first + last)
        }
    }
}

/// Integral of the spectrum of a single oscillator.
///
/// The real part of the spectrum (or its absolute value when `abs` is set)
/// is integrated over every axis with [`simpson`].
pub fn oscillator_integral(params: &Array1<f64>, expinfo: &ExpInfo, pts: &[usize], abs: bool) -> Result<f64> {
    let row = params.clone().insert_axis(Axis(0));
    let (fid, _) = make_fid(&row, expinfo, pts)?;
    let spectrum = ft(&fid);
    let mut values: ArrayD<f64> = spectrum.mapv(|v| if abs { v.re.abs() } else { v.re });
    for axis in (0..values.ndim()).rev() {
        values = values.map_axis(Axis(axis), |lane| {
            let lane: Vec<f64> = lane.iter().cloned().collect();
            simpson(&lane)
        });
    }
    values
        .iter()
        .next()
        .cloned()
        .ok_or_else(|| EspyError::invalid("pts", "cannot integrate an empty spectrum"))
}
