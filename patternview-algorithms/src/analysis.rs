//! Analysis requests, results and the single entry point that runs them.
//!
//! Analyses never modify a pattern. They may be expensive, so
//! [`run_analysis`] takes a progress callback and a
//! [`CancellationToken`] and is meant to be called from a worker thread.

use std::fmt;

use num_complex::Complex64;
use patternview_core::{Component, Pattern, ValidationError};

use crate::algebra::PatternAlgebra;
use crate::cancel::CancellationToken;
use crate::error::AnalysisError;

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

/// Highest spherical mode degree accepted.
pub const MAX_MODE_DEGREE: usize = 120;

/// Largest number of samples accepted along either near-field surface axis.
pub const MAX_SURFACE_POINTS: usize = 1001;

/// Parameters of a spherical wave expansion.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct SweParams {
    /// Frequency to expand (Hz); the first frequency when unset.
    pub frequency: Option<f64>,
    /// Highest degree `n`; derived from the theta sampling when unset.
    pub nmax: Option<usize>,
    /// Highest order `|m|`; derived from the cut count when unset.
    pub mmax: Option<usize>,
}

/// Surface a near field is evaluated on.
#[derive(Debug, Clone, Copy, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
#[cfg_attr(feature = "serde", serde(tag = "shape", rename_all = "snake_case"))]
pub enum NearFieldSurface {
    /// Sphere of `radius` meters, sampled on theta `0..=180` deg and phi
    /// `0..=360` deg.
    Sphere {
        /// Radius in meters.
        radius: f64,
        /// Number of theta samples.
        theta_points: usize,
        /// Number of phi samples.
        phi_points: usize,
    },
    /// Plane `z = distance`, sampled on `x` in `[-x_extent, x_extent]` and
    /// `y` in `[-y_extent, y_extent]`.
    Plane {
        /// Distance from the origin along z, in meters.
        distance: f64,
        /// Half width along x, in meters.
        x_extent: f64,
        /// Half width along y, in meters.
        y_extent: f64,
        /// Number of x samples.
        x_points: usize,
        /// Number of y samples.
        y_points: usize,
    },
}

impl NearFieldSurface {
    /// Sample positions along the two grid axes: theta and phi in degrees
    /// on a sphere, x and y in meters on a plane.
    #[must_use]
    pub fn axes(&self) -> (Vec<f64>, Vec<f64>) {
        match *self {
            NearFieldSurface::Sphere {
                theta_points,
                phi_points,
                ..
            } => (
                linspace(0.0, 180.0, theta_points),
                linspace(0.0, 360.0, phi_points),
            ),
            NearFieldSurface::Plane {
                x_extent,
                y_extent,
                x_points,
                y_points,
                ..
            } => (
                linspace(-x_extent, x_extent, x_points),
                linspace(-y_extent, y_extent, y_points),
            ),
        }
    }

    /// Checks lengths and sample counts.
    ///
    /// # Errors
    ///
    /// Returns a [`ValidationError`] naming the offending parameter.
    pub fn validate(&self) -> Result<(), ValidationError> {
        match *self {
            NearFieldSurface::Sphere {
                radius,
                theta_points,
                phi_points,
            } => {
                check_length("radius", radius)?;
                check_points("theta_points", theta_points)?;
                check_points("phi_points", phi_points)
            }
            NearFieldSurface::Plane {
                distance,
                x_extent,
                y_extent,
                x_points,
                y_points,
            } => {
                check_length("distance", distance)?;
                check_length("x_extent", x_extent)?;
                check_length("y_extent", y_extent)?;
                check_points("x_points", x_points)?;
                check_points("y_points", y_points)
            }
        }
    }
}

fn check_length(parameter: &'static str, value: f64) -> Result<(), ValidationError> {
    if value.is_finite() && value > 0.0 {
        Ok(())
    } else {
        Err(ValidationError::parameter(
            parameter,
            format!("{value} m must be finite and positive"),
        ))
    }
}

fn check_points(parameter: &'static str, value: usize) -> Result<(), ValidationError> {
    if (2..=MAX_SURFACE_POINTS).contains(&value) {
        Ok(())
    } else {
        Err(ValidationError::parameter(
            parameter,
            format!("{value} is outside [2, {MAX_SURFACE_POINTS}]"),
        ))
    }
}

#[allow(clippy::cast_precision_loss)]
fn linspace(start: f64, stop: f64, count: usize) -> Vec<f64> {
    match count {
        0 => Vec::new(),
        1 => vec![start],
        _ => {
            let step = (stop - start) / (count - 1) as f64;
            (0..count).map(|i| start + step * i as f64).collect()
        }
    }
}

/// An analysis to run on the current pattern.
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
#[cfg_attr(feature = "serde", serde(tag = "kind", rename_all = "snake_case"))]
pub enum AnalysisRequest {
    /// Least-squares phase center at one frequency, using samples with
    /// `|theta| <= theta_limit_deg`.
    PhaseCenter {
        /// Frequency in Hz; must be on the pattern's axis.
        frequency: f64,
        /// Angular limit of the fit in degrees, in (0, 90].
        theta_limit_deg: f64,
    },
    /// Peak directivity per frequency.
    Directivity,
    /// Axial ratio summary per frequency.
    AxialRatio,
    /// Spherical mode expansion.
    SphericalWaveExpansion(SweParams),
    /// Field on a surface at finite distance, synthesized from the
    /// spherical mode expansion selected by `params`.
    NearField {
        /// Where to evaluate the field.
        surface: NearFieldSurface,
        /// Expansion the field is synthesized from.
        params: SweParams,
    },
}

/// Discriminant of [`AnalysisRequest`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum AnalysisKind {
    /// See [`AnalysisRequest::PhaseCenter`].
    PhaseCenter,
    /// See [`AnalysisRequest::Directivity`].
    Directivity,
    /// See [`AnalysisRequest::AxialRatio`].
    AxialRatio,
    /// See [`AnalysisRequest::SphericalWaveExpansion`].
    SphericalWaveExpansion,
    /// See [`AnalysisRequest::NearField`].
    NearField,
}

impl AnalysisKind {
    /// Parses the names printed by [`fmt::Display`].
    #[must_use]
    pub fn from_name(name: &str) -> Option<Self> {
        match name.trim().to_ascii_lowercase().as_str() {
            "phase-center" => Some(Self::PhaseCenter),
            "directivity" => Some(Self::Directivity),
            "axial-ratio" => Some(Self::AxialRatio),
            "spherical-wave-expansion" | "swe" => Some(Self::SphericalWaveExpansion),
            "near-field" | "nf" => Some(Self::NearField),
            _ => None,
        }
    }
}

impl fmt::Display for AnalysisKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            AnalysisKind::PhaseCenter => "phase-center",
            AnalysisKind::Directivity => "directivity",
            AnalysisKind::AxialRatio => "axial-ratio",
            AnalysisKind::SphericalWaveExpansion => "spherical-wave-expansion",
            AnalysisKind::NearField => "near-field",
        })
    }
}

impl AnalysisRequest {
    /// Returns the analysis kind.
    #[must_use]
    pub fn kind(&self) -> AnalysisKind {
        match self {
            AnalysisRequest::PhaseCenter { .. } => AnalysisKind::PhaseCenter,
            AnalysisRequest::Directivity => AnalysisKind::Directivity,
            AnalysisRequest::AxialRatio => AnalysisKind::AxialRatio,
            AnalysisRequest::SphericalWaveExpansion(_) => AnalysisKind::SphericalWaveExpansion,
            AnalysisRequest::NearField { .. } => AnalysisKind::NearField,
        }
    }

    /// Checks the request against the pattern it will run on.
    ///
    /// # Errors
    ///
    /// Returns a [`ValidationError`] naming the offending parameter.
    pub fn validate(&self, pattern: &Pattern) -> Result<(), ValidationError> {
        match *self {
            AnalysisRequest::PhaseCenter {
                frequency,
                theta_limit_deg,
            } => {
                if pattern.frequency_index(frequency).is_none() {
                    return Err(ValidationError::UnknownFrequency(frequency));
                }
                if !(theta_limit_deg.is_finite()
                    && theta_limit_deg > 0.0
                    && theta_limit_deg <= 90.0)
                {
                    return Err(ValidationError::parameter(
                        "theta_limit_deg",
                        format!("{theta_limit_deg} deg is outside (0, 90]"),
                    ));
                }
                Ok(())
            }
            AnalysisRequest::Directivity | AnalysisRequest::AxialRatio => Ok(()),
            AnalysisRequest::SphericalWaveExpansion(params) => params.validate(pattern),
            AnalysisRequest::NearField { surface, params } => {
                params.validate(pattern)?;
                surface.validate()
            }
        }
    }
}

impl SweParams {
    fn validate(&self, pattern: &Pattern) -> Result<(), ValidationError> {
        if let Some(f) = self.frequency {
            if pattern.frequency_index(f).is_none() {
                return Err(ValidationError::UnknownFrequency(f));
            }
        }
        if let Some(nmax) = self.nmax {
            if nmax == 0 || nmax > MAX_MODE_DEGREE {
                return Err(ValidationError::parameter(
                    "nmax",
                    format!("{nmax} is outside [1, {MAX_MODE_DEGREE}]"),
                ));
            }
        }
        if let (Some(mmax), Some(nmax)) = (self.mmax, self.nmax) {
            if mmax > nmax {
                return Err(ValidationError::parameter(
                    "mmax",
                    format!("{mmax} exceeds nmax {nmax}"),
                ));
            }
        }
        Ok(())
    }
}

/// Result of [`AnalysisRequest::PhaseCenter`].
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct PhaseCenterEstimate {
    /// Frequency the fit was made at (Hz).
    pub frequency: f64,
    /// Estimated position (x, y, z) in meters.
    pub position: [f64; 3],
    /// RMS phase residual of the fit, in degrees.
    pub rms_residual_deg: f64,
    /// Number of samples used.
    pub samples: usize,
}

/// Directivity at one frequency.
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct DirectivitySummary {
    /// Frequency (Hz).
    pub frequency: f64,
    /// Peak directivity in dBi.
    pub directivity_dbi: f64,
    /// Theta of the peak (deg).
    pub peak_theta_deg: f64,
    /// Phi of the peak (deg).
    pub peak_phi_deg: f64,
}

/// Axial ratio statistics at one frequency.
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct AxialRatioSummary {
    /// Frequency (Hz).
    pub frequency: f64,
    /// Axial ratio at boresight of the first cut (dB).
    pub boresight_db: f64,
    /// Smallest axial ratio on the grid (dB).
    pub min_db: f64,
    /// Largest axial ratio on the grid (dB).
    pub max_db: f64,
}

/// One spherical mode coefficient.
#[derive(Debug, Clone, Copy, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct ModeCoefficient {
    /// Component the coefficient belongs to.
    pub component: Component,
    /// Degree.
    pub n: usize,
    /// Order, `-n..=n`.
    pub m: i64,
    /// Coefficient value.
    pub value: Complex64,
}

/// Result of [`AnalysisRequest::SphericalWaveExpansion`].
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct SphericalWaveExpansion {
    /// Frequency expanded (Hz).
    pub frequency: f64,
    /// Highest degree used.
    pub nmax: usize,
    /// Highest order used.
    pub mmax: usize,
    /// All coefficients, ordered by degree, then order, then component.
    pub coefficients: Vec<ModeCoefficient>,
    /// Sum of `|a|^2` per degree, index `n - 1`.
    pub power_by_degree: Vec<f64>,
}

impl SphericalWaveExpansion {
    /// Total modal power.
    #[must_use]
    pub fn total_power(&self) -> f64 {
        self.power_by_degree.iter().sum()
    }
}

/// Result of [`AnalysisRequest::NearField`].
///
/// Components are expressed in the pattern's polarization basis at each
/// point's direction from the origin. Samples are stored `u`-major: the
/// value at `(u[i], v[j])` is at index `i * v.len() + j`.
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct NearField {
    /// Frequency (Hz).
    pub frequency: f64,
    /// Surface the field was evaluated on.
    pub surface: NearFieldSurface,
    /// Highest mode degree used.
    pub nmax: usize,
    /// Theta (deg) on a sphere, x (m) on a plane.
    pub u: Vec<f64>,
    /// Phi (deg) on a sphere, y (m) on a plane.
    pub v: Vec<f64>,
    /// Co-polar component.
    pub co: Vec<Complex64>,
    /// Cross-polar component.
    pub cross: Vec<Complex64>,
}

impl NearField {
    /// Sample of `component` at grid position `(iu, iv)`.
    #[must_use]
    pub fn value(&self, component: Component, iu: usize, iv: usize) -> Option<Complex64> {
        if iu >= self.u.len() || iv >= self.v.len() {
            return None;
        }
        let data = match component {
            Component::Co => &self.co,
            Component::Cross => &self.cross,
        };
        data.get(iu * self.v.len() + iv).copied()
    }

    /// Largest magnitude over both components.
    #[must_use]
    pub fn peak_magnitude(&self) -> f64 {
        self.co
            .iter()
            .chain(&self.cross)
            .map(|v| v.norm())
            .fold(0.0, f64::max)
    }
}

/// Output of a completed analysis.
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
#[cfg_attr(feature = "serde", serde(tag = "kind", content = "result", rename_all = "snake_case"))]
pub enum AnalysisOutput {
    /// See [`PhaseCenterEstimate`].
    PhaseCenter(PhaseCenterEstimate),
    /// One entry per frequency.
    Directivity(Vec<DirectivitySummary>),
    /// One entry per frequency.
    AxialRatio(Vec<AxialRatioSummary>),
    /// See [`SphericalWaveExpansion`].
    SphericalWaves(SphericalWaveExpansion),
    /// See [`NearField`].
    NearField(NearField),
}

impl AnalysisOutput {
    /// Returns the analysis kind that produced this output.
    #[must_use]
    pub fn kind(&self) -> AnalysisKind {
        match self {
            AnalysisOutput::PhaseCenter(_) => AnalysisKind::PhaseCenter,
            AnalysisOutput::Directivity(_) => AnalysisKind::Directivity,
            AnalysisOutput::AxialRatio(_) => AnalysisKind::AxialRatio,
            AnalysisOutput::SphericalWaves(_) => AnalysisKind::SphericalWaveExpansion,
            AnalysisOutput::NearField(_) => AnalysisKind::NearField,
        }
    }
}

/// Validates and runs `request` on `pattern`.
///
/// Progress values passed to `progress` are fractions in `[0, 1]`. The
/// cheap analyses report only completion; the spherical expansion reports
/// once per degree and stops at the next degree boundary after `cancel`
/// is triggered. The near field reports through its expansion and then
/// once per azimuthal order.
///
/// # Errors
///
/// Returns [`AnalysisError::Validation`] for bad parameters,
/// [`AnalysisError::Cancelled`] if cancellation was observed, and
/// [`AnalysisError::Algebra`] for numerical failures.
pub fn run_analysis(
    algebra: &dyn PatternAlgebra,
    request: &AnalysisRequest,
    pattern: &Pattern,
    progress: &dyn Fn(f32),
    cancel: &CancellationToken,
) -> Result<AnalysisOutput, AnalysisError> {
    request.validate(pattern)?;
    if cancel.is_cancelled() {
        return Err(AnalysisError::Cancelled);
    }

    let output = match *request {
        AnalysisRequest::PhaseCenter {
            frequency,
            theta_limit_deg,
        } => AnalysisOutput::PhaseCenter(algebra.compute_phase_center(
            pattern,
            frequency,
            theta_limit_deg,
        )?),
        AnalysisRequest::Directivity => {
            AnalysisOutput::Directivity(algebra.compute_directivity(pattern)?)
        }
        AnalysisRequest::AxialRatio => {
            AnalysisOutput::AxialRatio(algebra.compute_axial_ratio(pattern)?)
        }
        AnalysisRequest::SphericalWaveExpansion(params) => AnalysisOutput::SphericalWaves(
            algebra.compute_spherical_wave_expansion(pattern, &params, progress, cancel)?,
        ),
        AnalysisRequest::NearField { surface, params } => AnalysisOutput::NearField(
            algebra.compute_near_field(pattern, &params, &surface, progress, cancel)?,
        ),
    };

    if cancel.is_cancelled() {
        return Err(AnalysisError::Cancelled);
    }
    progress(1.0);
    Ok(output)
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;
    use patternview_core::synthetic::SyntheticPattern;

    fn sphere(radius: f64) -> NearFieldSurface {
        NearFieldSurface::Sphere {
            radius,
            theta_points: 19,
            phi_points: 37,
        }
    }

    #[test]
    fn test_surface_axes() {
        let (theta, phi) = sphere(1.0).axes();
        assert_eq!(theta.len(), 19);
        assert_relative_eq!(theta[1], 10.0);
        assert_relative_eq!(phi[36], 360.0);

        let plane = NearFieldSurface::Plane {
            distance: 0.5,
            x_extent: 0.2,
            y_extent: 0.1,
            x_points: 5,
            y_points: 3,
        };
        let (x, y) = plane.axes();
        assert_eq!(x, vec![-0.2, -0.1, 0.0, 0.1, 0.2]);
        assert_relative_eq!(y[0], -0.1);
        assert_relative_eq!(y[2], 0.1);
    }

    #[test]
    fn test_near_field_request_validation() {
        let pattern = SyntheticPattern::new(vec![1e9], vec![0.0, 90.0]).build();
        let request = |surface| AnalysisRequest::NearField {
            surface,
            params: SweParams::default(),
        };
        assert!(request(sphere(2.0)).validate(&pattern).is_ok());
        assert_eq!(request(sphere(2.0)).kind(), AnalysisKind::NearField);

        match request(sphere(0.0)).validate(&pattern) {
            Err(ValidationError::Parameter { parameter, .. }) => assert_eq!(parameter, "radius"),
            other => panic!("unexpected result: {other:?}"),
        }
        let sparse = NearFieldSurface::Sphere {
            radius: 1.0,
            theta_points: 1,
            phi_points: 10,
        };
        match request(sparse).validate(&pattern) {
            Err(ValidationError::Parameter { parameter, .. }) => {
                assert_eq!(parameter, "theta_points");
            }
            other => panic!("unexpected result: {other:?}"),
        }
        let unknown = AnalysisRequest::NearField {
            surface: sphere(1.0),
            params: SweParams {
                frequency: Some(7e9),
                ..SweParams::default()
            },
        };
        assert_eq!(
            unknown.validate(&pattern),
            Err(ValidationError::UnknownFrequency(7e9))
        );
    }

    #[test]
    fn test_near_field_lookup() {
        let field = NearField {
            frequency: 1e9,
            surface: sphere(1.0),
            nmax: 1,
            u: vec![0.0, 90.0],
            v: vec![0.0, 180.0, 360.0],
            co: (0..6).map(|i| Complex64::new(f64::from(i), 0.0)).collect(),
            cross: vec![Complex64::new(0.0, -9.0); 6],
        };
        assert_eq!(
            field.value(Component::Co, 1, 2),
            Some(Complex64::new(5.0, 0.0))
        );
        assert_eq!(field.value(Component::Co, 2, 0), None);
        assert_relative_eq!(field.peak_magnitude(), 9.0);
        assert_eq!(AnalysisKind::from_name("near-field"), Some(AnalysisKind::NearField));
    }
}
