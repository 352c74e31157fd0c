//! The numerical seam between the state core and the signal-processing code.
//!
//! Everything that computes on sample arrays goes through
//! [`PatternAlgebra`]. The model only orchestrates; it never touches the
//! numbers itself, so tests can swap in instrumented or deliberately slow
//! implementations.

use patternview_core::{CoordinateFormat, NormalizationReference, Pattern, Polarization};

use crate::analysis::{
    AxialRatioSummary, DirectivitySummary, NearField, NearFieldSurface, PhaseCenterEstimate,
    SphericalWaveExpansion, SweParams,
};
use crate::cancel::CancellationToken;
use crate::error::AlgebraError;

/// Numerical operations on patterns.
///
/// Transform methods return a new [`Pattern`] whose provenance is left for
/// the caller to fill in. Every method has a default that reports
/// [`AlgebraError::Unsupported`], so partial implementations only override
/// what they provide.
///
/// Implementations are shared between the UI thread and analysis workers,
/// hence the `Send + Sync` bound.
pub trait PatternAlgebra: Send + Sync {
    /// Moves the phase reference point by `offset` meters.
    ///
    /// # Errors
    ///
    /// Implementation-specific.
    fn translate_phase_center(
        &self,
        _pattern: &Pattern,
        _offset: [f64; 3],
    ) -> Result<Pattern, AlgebraError> {
        Err(AlgebraError::Unsupported("translate phase center"))
    }

    /// Re-expresses the samples in `polarization`.
    ///
    /// # Errors
    ///
    /// Implementation-specific.
    fn convert_polarization(
        &self,
        _pattern: &Pattern,
        _polarization: Polarization,
    ) -> Result<Pattern, AlgebraError> {
        Err(AlgebraError::Unsupported("convert polarization"))
    }

    /// Shifts the theta and phi origins by the given angles in degrees.
    ///
    /// # Errors
    ///
    /// Implementation-specific.
    fn rotate(
        &self,
        _pattern: &Pattern,
        _theta_offset_deg: f64,
        _phi_offset_deg: f64,
    ) -> Result<Pattern, AlgebraError> {
        Err(AlgebraError::Unsupported("rotate"))
    }

    /// Multiplies every sample by `factor`.
    ///
    /// # Errors
    ///
    /// Implementation-specific.
    fn scale_amplitude(&self, _pattern: &Pattern, _factor: f64) -> Result<Pattern, AlgebraError> {
        Err(AlgebraError::Unsupported("scale amplitude"))
    }

    /// Scales each frequency so its reference level becomes unity.
    ///
    /// # Errors
    ///
    /// Implementation-specific.
    fn normalize(
        &self,
        _pattern: &Pattern,
        _reference: NormalizationReference,
    ) -> Result<Pattern, AlgebraError> {
        Err(AlgebraError::Unsupported("normalize"))
    }

    /// Re-samples the pattern in the `target` cut layout.
    ///
    /// # Errors
    ///
    /// Implementation-specific.
    fn convert_coordinate_format(
        &self,
        _pattern: &Pattern,
        _target: CoordinateFormat,
    ) -> Result<Pattern, AlgebraError> {
        Err(AlgebraError::Unsupported("convert coordinate format"))
    }

    /// Drops the spherical modes a source inside `max_radial_extent` meters
    /// cannot radiate (mathematical absorber reflection suppression).
    ///
    /// # Errors
    ///
    /// Implementation-specific.
    fn apply_mars(
        &self,
        _pattern: &Pattern,
        _max_radial_extent: f64,
    ) -> Result<Pattern, AlgebraError> {
        Err(AlgebraError::Unsupported("MARS"))
    }

    /// Estimates the phase center at `frequency`.
    ///
    /// # Errors
    ///
    /// Implementation-specific.
    fn compute_phase_center(
        &self,
        _pattern: &Pattern,
        _frequency: f64,
        _theta_limit_deg: f64,
    ) -> Result<PhaseCenterEstimate, AlgebraError> {
        Err(AlgebraError::Unsupported("phase center"))
    }

    /// Peak directivity per frequency.
    ///
    /// # Errors
    ///
    /// Implementation-specific.
    fn compute_directivity(
        &self,
        _pattern: &Pattern,
    ) -> Result<Vec<DirectivitySummary>, AlgebraError> {
        Err(AlgebraError::Unsupported("directivity"))
    }

    /// Axial ratio summary per frequency.
    ///
    /// # Errors
    ///
    /// Implementation-specific.
    fn compute_axial_ratio(
        &self,
        _pattern: &Pattern,
    ) -> Result<Vec<AxialRatioSummary>, AlgebraError> {
        Err(AlgebraError::Unsupported("axial ratio"))
    }

    /// Spherical mode expansion. Long-running: implementations should call
    /// `progress` with fractions in `[0, 1]` and return
    /// [`AlgebraError::Cancelled`] soon after `cancel` is triggered.
    ///
    /// # Errors
    ///
    /// Implementation-specific.
    fn compute_spherical_wave_expansion(
        &self,
        _pattern: &Pattern,
        _params: &SweParams,
        _progress: &dyn Fn(f32),
        _cancel: &CancellationToken,
    ) -> Result<SphericalWaveExpansion, AlgebraError> {
        Err(AlgebraError::Unsupported("spherical wave expansion"))
    }

    /// Field on `surface` synthesized from the expansion selected by
    /// `params`. Long-running, with the same progress and cancellation
    /// contract as [`PatternAlgebra::compute_spherical_wave_expansion`].
    ///
    /// # Errors
    ///
    /// Implementation-specific.
    fn compute_near_field(
        &self,
        _pattern: &Pattern,
        _params: &SweParams,
        _surface: &NearFieldSurface,
        _progress: &dyn Fn(f32),
        _cancel: &CancellationToken,
    ) -> Result<NearField, AlgebraError> {
        Err(AlgebraError::Unsupported("near field"))
    }
}
