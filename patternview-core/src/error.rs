//! Error types for patternview-core.

use thiserror::Error;

/// Result type alias for pattern construction.
pub type Result<T> = std::result::Result<T, PatternError>;

/// Structural problems detected while building a [`crate::Pattern`].
#[derive(Error, Debug, Clone, PartialEq)]
pub enum PatternError {
    /// An axis has no samples.
    #[error("{axis} axis is empty")]
    EmptyAxis { axis: &'static str },

    /// An axis value is NaN or infinite.
    #[error("{axis} axis contains a non-finite value at index {index}")]
    NonFiniteAxis { axis: &'static str, index: usize },

    /// Axis values must be strictly increasing (and therefore unique).
    #[error("{axis} axis is not strictly increasing at index {index}")]
    NonMonotonicAxis { axis: &'static str, index: usize },

    /// Frequencies must be positive.
    #[error("frequency {0} Hz is not positive")]
    NonPositiveFrequency(f64),

    /// A component array does not match the axis lengths.
    #[error("{component} samples have shape {found:?}, expected {expected:?}")]
    ShapeMismatch {
        component: &'static str,
        expected: (usize, usize, usize),
        found: (usize, usize, usize),
    },

    /// A field sample is NaN or infinite.
    #[error("{component} samples contain a non-finite value")]
    NonFiniteSample { component: &'static str },
}

/// A request referenced an axis value or parameter that is not valid for the
/// current pattern.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum ValidationError {
    /// No pattern is loaded, so the request has nothing to validate against.
    #[error("no pattern is loaded")]
    NoPattern,

    /// A frequency is not on the current pattern's frequency axis.
    #[error("frequency {0} Hz is not present in the pattern")]
    UnknownFrequency(f64),

    /// A cut angle is not on the current pattern's cut axis.
    #[error("cut {0} deg is not present in the pattern")]
    UnknownCut(f64),

    /// At least one frequency must stay selected while a pattern is loaded.
    #[error("frequency selection must not be empty")]
    EmptyFrequencySelection,

    /// A named parameter is outside its allowed range.
    #[error("invalid parameter `{parameter}`: {reason}")]
    Parameter {
        parameter: &'static str,
        reason: String,
    },
}

impl ValidationError {
    /// Shorthand for [`ValidationError::Parameter`].
    pub fn parameter(parameter: &'static str, reason: impl Into<String>) -> Self {
        Self::Parameter {
            parameter,
            reason: reason.into(),
        }
    }
}
