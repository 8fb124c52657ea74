//! Error types for the thermodynamic optimizer.
//!
//! Fail-fast policy: malformed problems and configurations are rejected
//! before any sampling starts. Non-convergence is NOT an error and is
//! surfaced through `SamplerResult::converged` instead.

use thiserror::Error;

/// Main error type for the thermogen pipeline
#[derive(Debug, Error)]
pub enum ThermoError {
    /// Malformed problem or configuration (missing size fields,
    /// non-positive step counts, dimension mismatches)
    #[error("invalid input: {0}")]
    InvalidInput(String),

    /// Sampling could not produce any usable trajectory
    #[error("sampling failed: {0}")]
    SamplingFailed(String),

    /// A parallel trajectory produced a non-finite value and its retry
    /// failed as well. Recorded per-trajectory, never aborts siblings.
    #[error("worker failure on trajectory {index}: {reason}")]
    WorkerFailure { index: usize, reason: String },

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Other error: {0}")]
    Other(#[from] anyhow::Error),
}

pub type Result<T> = std::result::Result<T, ThermoError>;
