//! Error types for the benchmark

use thiserror::Error;

/// Main error type for benchmark setup, solve and validation failures
#[derive(Error, Debug)]
pub enum HpcgError {
    #[error("invalid grid dimensions: {0}")]
    InvalidDimensions(String),

    #[error("participant count {requested} does not factor into a process grid within the configured aspect-ratio bound")]
    BadProcessGrid { requested: usize },

    #[error("participant count mismatch: geometry expects {expected} participants, transport reports {actual}")]
    ParticipantCountMismatch { expected: usize, actual: usize },

    #[error("options file '{0}' could not be read: {1}")]
    OptionsFile(String, String),

    #[error("communication failure with participant {rank}: {reason}")]
    Communication { rank: usize, reason: String },

    #[error("lost positive-definiteness: p . Ap = {value} <= 0 at CG iteration {iteration}")]
    NonPositiveDefinite { iteration: usize, value: f64 },

    #[error("zero pivot encountered in {0}")]
    ZeroPivot(&'static str),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("report serialization error: {0}")]
    ReportSerialization(#[from] serde_yaml::Error),
}

/// Result type used throughout the benchmark
pub type HpcgResult<T> = Result<T, HpcgError>;
