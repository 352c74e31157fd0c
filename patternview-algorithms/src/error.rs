//! Error types for transforms and analyses.

use patternview_core::{PatternError, ValidationError};
use thiserror::Error;

/// Failure reported by a [`crate::PatternAlgebra`] implementation.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum AlgebraError {
    /// An iterative or least-squares computation did not converge.
    #[error("numerical non-convergence: {0}")]
    NonConvergence(String),

    /// The input cannot be processed (degenerate grid, zero power, ...).
    #[error("malformed input: {0}")]
    MalformedInput(String),

    /// The implementation does not provide this operation.
    #[error("operation not supported: {0}")]
    Unsupported(&'static str),

    /// The computation observed a cancellation request and stopped.
    #[error("computation cancelled")]
    Cancelled,
}

impl From<PatternError> for AlgebraError {
    fn from(err: PatternError) -> Self {
        AlgebraError::MalformedInput(err.to_string())
    }
}

/// Failure of [`crate::TransformPipeline::apply`].
#[derive(Error, Debug, Clone, PartialEq)]
pub enum TransformError {
    /// Parameters were rejected before the algebra was invoked.
    #[error(transparent)]
    Validation(#[from] ValidationError),

    /// The algebra failed.
    #[error("transform failed: {0}")]
    Algebra(#[from] AlgebraError),
}

/// Failure of an analysis job.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum AnalysisError {
    /// Request parameters do not fit the input pattern.
    #[error(transparent)]
    Validation(#[from] ValidationError),

    /// The computation failed.
    #[error("analysis failed: {0}")]
    Algebra(AlgebraError),

    /// The job was cancelled before producing a result.
    #[error("analysis cancelled")]
    Cancelled,

    /// The worker panicked.
    #[error("analysis worker panicked: {0}")]
    Panicked(String),
}

impl From<AlgebraError> for AnalysisError {
    fn from(err: AlgebraError) -> Self {
        match err {
            AlgebraError::Cancelled => AnalysisError::Cancelled,
            other => AnalysisError::Algebra(other),
        }
    }
}
