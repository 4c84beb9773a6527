//! Error types.
//!
//! Only configuration problems reach the caller. Numeric degeneracy inside an
//! estimation is handled by skip policies, and broken internal bookkeeping
//! panics.

use thiserror::Error;

/// Invalid estimator configuration, reported before any sampling.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum ConfigError {
    #[error("unknown option: {0}")]
    UnknownOption(String),
    #[error("invalid value {value:?} for option {option}")]
    InvalidValue { option: String, value: String },
    #[error("{0} must be positive")]
    NonPositive(&'static str),
    #[error("perturbation standard deviation must be finite and non-negative, got {0}")]
    InvalidStddev(f64),
    #[error("perturbation dimension {dim} out of range for {num_inputs} inputs")]
    DimensionOutOfRange { dim: usize, num_inputs: usize },
    #[error("min_carriers ({min}) must lie in 1..={capacity} (carrier capacity)")]
    CarrierBounds { min: usize, capacity: usize },
}

/// Reasons a kernel density estimate cannot be fitted.
#[derive(Error, Debug, Clone, Copy, PartialEq, Eq)]
pub enum KdeError {
    #[error("kernel density estimation needs at least two points, got {0}")]
    TooFewPoints(usize),
    #[error("all data points are equal")]
    AllEqual,
    #[error("bandwidth is zero or not finite")]
    ZeroBandwidth,
}
