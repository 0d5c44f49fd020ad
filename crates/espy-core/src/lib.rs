//! espy-core: estimation of NMR signal parameters
//!
//! Rust implementation of the NMR-EsPy estimation pipeline. Time-domain
//! signals are modelled as sums of exponentially damped complex sinusoids,
//! whose parameters are found by frequency filtering, the Matrix Pencil
//! Method and nonlinear programming.
//!
//! ## Modules
//!
//! - `expinfo` - Experiment information and unit conversion
//! - `signal` - Synthetic signals, Fourier transforms, phasing and noise
//! - `filter` - Frequency filtering of spectral regions
//! - `mpm` - Matrix Pencil Method with MDL model order selection
//! - `nlp` - Nonlinear programming refinement with error estimates
//! - `estimator` - The estimation pipeline, result editing and persistence
//! - `math` - Linear algebra and FFT helpers

pub mod constants;
pub mod error;
pub mod estimator;
pub mod expinfo;
pub mod filter;
pub mod math;
pub mod mpm;
pub mod nlp;
pub mod signal;

pub use error::{EspyError, Result};
pub use estimator::{
    EstimateOptions, EstimationResult, Estimator, ExperimentKind, InitialGuess, SeriesEstimator, SortBy,
    SubbandOptions,
};
pub use expinfo::{Bounds, ExpInfo, FrequencyUnit, Region};
pub use filter::{Filter, FilterOptions};
pub use mpm::MatrixPencil;
pub use nlp::{NegativeAmps, NlpMethod, NlpOptions, NonlinearProgramming, ParamMode};
