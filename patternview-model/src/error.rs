//! Model error types.

use patternview_algorithms::TransformError;
use patternview_core::ValidationError;
use thiserror::Error;

/// Result type for model operations.
pub type Result<T> = std::result::Result<T, ModelError>;

/// Failure of a model operation. The model is unchanged whenever one is
/// returned.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum ModelError {
    /// The operation needs a pattern and none is loaded.
    #[error("no pattern loaded")]
    NoPattern,

    /// A selection, transform or analysis parameter was rejected.
    #[error(transparent)]
    Validation(#[from] ValidationError),

    /// The numerical transform failed.
    #[error(transparent)]
    Transform(TransformError),

    /// The analysis thread pool could not be created.
    #[error("failed to start analysis workers: {0}")]
    WorkerPool(String),

    /// Deferred commands kept producing more commands.
    #[error("deferred command limit of {limit} reached; remaining commands dropped")]
    CascadeLimit {
        /// Configured limit.
        limit: usize,
    },
}

impl From<TransformError> for ModelError {
    fn from(err: TransformError) -> Self {
        match err {
            TransformError::Validation(e) => ModelError::Validation(e),
            other => ModelError::Transform(other),
        }
    }
}
