//! Error types
//!
//! Invalid input is reported as [`EspyError::InvalidArgument`] before any
//! numerical work starts. Failures of the decompositions themselves surface as
//! [`EspyError::Linalg`].

use thiserror::Error;

/// Errors produced by the estimation pipeline.
#[derive(Error, Debug)]
pub enum EspyError {
    #[error("invalid value for `{name}`: {reason}")]
    InvalidArgument { name: &'static str, reason: String },

    #[error("shape mismatch: expected {expected}, found {found}")]
    Shape { expected: String, found: String },

    #[error("linear algebra failure: {0}")]
    Linalg(String),

    #[error("optimizer failure: {0}")]
    Optimizer(String),

    #[error("no estimation results are stored")]
    NoResults,

    #[error("result index {index} out of range for {len} results")]
    ResultIndex { index: isize, len: usize },

    #[error("simulation backend unavailable: {0}")]
    SimulatorUnavailable(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("serialization error: {0}")]
    Serde(#[from] serde_json::Error),

    #[error("unsupported file version {found} (expected {expected})")]
    Version { found: u32, expected: u32 },
}

impl EspyError {
    pub(crate) fn invalid(name: &'static str, reason: impl Into<String>) -> Self {
        EspyError::InvalidArgument {
            name,
            reason: reason.into(),
        }
    }

    pub(crate) fn shape(expected: impl Into<String>, found: impl Into<String>) -> Self {
        EspyError::Shape {
            expected: expected.into(),
            found: found.into(),
        }
    }
}

impl From<&'static str> for EspyError {
    fn from(msg: &'static str) -> Self {
        EspyError::Linalg(msg.to_string())
    }
}

pub type Result<T> = std::result::Result<T, EspyError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_invalid_argument_message() {
        let err = EspyError::invalid("region", "left bound must be less than right bound");
        assert_eq!(
            err.to_string(),
            "invalid value for `region`: left bound must be less than right bound"
        );
    }

    #[test]
    fn test_linalg_from_str() {
        let err: EspyError = "SVD failed".into();
        assert!(matches!(err, EspyError::Linalg(_)));
    }
}
