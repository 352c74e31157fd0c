//! patternview-algorithms: Numerical processing for antenna patterns.
//!
//! This crate provides:
//! - **`PatternAlgebra`** - the trait every numerical back end implements
//! - **`ReferenceAlgebra`** - the built-in back end
//! - **`TransformPipeline`** - validation, dispatch and provenance for transforms
//! - **Analyses** - phase center, directivity, axial ratio, spherical modes
//!   and the near field synthesized from them
//!
#![warn(missing_docs)]

mod algebra;
mod analysis;
mod cancel;
mod coordinates;
mod error;
mod nearfield;
mod reference;
mod spherical;
mod transform;

pub use algebra::PatternAlgebra;
pub use analysis::{
    run_analysis, AnalysisKind, AnalysisOutput, AnalysisRequest, AxialRatioSummary,
    DirectivitySummary, ModeCoefficient, NearField, NearFieldSurface, PhaseCenterEstimate,
    SphericalWaveExpansion, SweParams, MAX_MODE_DEGREE, MAX_SURFACE_POINTS,
};
pub use cancel::CancellationToken;
pub use error::{AlgebraError, AnalysisError, TransformError};
pub use reference::{ReferenceAlgebra, ReferenceConfig};
pub use transform::TransformPipeline;
