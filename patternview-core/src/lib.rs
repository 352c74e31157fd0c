//! patternview-core: Pattern values, selection state and view queries.
//!
//! This crate provides the immutable pattern representation shared by every
//! other patternview crate, the user's selection/view state and the pure
//! queries that turn the two into plottable slices.
//!

pub mod error;
pub mod pattern;
pub mod polarization;
pub mod selection;
pub mod synthetic;
pub mod transform;
pub mod view;

pub use error::{PatternError, Result, ValidationError};
pub use pattern::{CoordinateFormat, FieldUnit, Pattern, PatternValue, Provenance};
pub use polarization::{Component, Polarization};
pub use selection::{PlotKind, SelectionState, SelectionUpdate, Statistic};
pub use transform::{NormalizationReference, Transform, TransformKind};
pub use view::{StatisticsTrace, Trace, ViewData};

/// Complex field sample type used throughout patternview.
pub use num_complex::Complex64;
