//! Signal model
//!
//! Construction of synthetic signals from oscillator parameters, Fourier
//! transforms in NMR display order, phase correction and noise.
//!
//! ## Parameter arrays
//!
//! A parameter array has one row per oscillator:
//!
//! - 1D: `[a, φ, f, η]`
//! - 2D: `[a, φ, f1, f2, η1, η2]`
//!
//! Frequencies are in Hz (absolute, i.e. including the transmitter offset),
//! damping factors in s⁻¹.

pub mod model;
pub mod noise;
pub mod transform;

pub use model::{
    get_timepoints, make_fid, make_modulated_fid, make_noisy_fid, random_parameters, Modulation,
};
pub use noise::{add_noise, make_noise};
pub use transform::{
    exp_apodisation, ft, ft_axes, get_shifts, ift, ift_axes, make_virtual_echo,
    oscillator_integral, phase, proc_amp_modulated, proc_phase_modulated, simpson, zf,
};

pub(crate) use model::{as_1d, as_2d, check_params, check_pts, empty_params};
pub(crate) use noise::std_dev;
