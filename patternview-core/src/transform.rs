//! Processing operations that turn one pattern into another.
//!
//! A [`Transform`] is pure data: the operation and its parameters. It is
//! recorded in the provenance of every derived pattern, and validated here
//! before any numerical code sees it.

use std::fmt;

use crate::error::ValidationError;
use crate::pattern::CoordinateFormat;
use crate::polarization::Polarization;

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

/// Largest phase-center offset accepted on any axis, in meters.
pub const MAX_TRANSLATION_M: f64 = 1000.0;

/// Largest rotation accepted on either angle, in degrees.
pub const MAX_ROTATION_DEG: f64 = 180.0;

/// Largest antenna radius accepted by [`Transform::Mars`], in meters.
pub const MAX_RADIAL_EXTENT_M: f64 = 100.0;

/// Reference level used by [`Transform::Normalize`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
#[cfg_attr(feature = "serde", serde(rename_all = "lowercase"))]
pub enum NormalizationReference {
    /// Largest co-polar magnitude at each frequency.
    Peak,
    /// Co-polar magnitude at boresight (theta closest to 0) of the first cut.
    Boresight,
    /// Mean co-polar magnitude at each frequency.
    Mean,
}

impl NormalizationReference {
    /// Parses `peak`, `boresight` or `mean` (case-insensitive).
    #[must_use]
    pub fn from_name(name: &str) -> Option<Self> {
        match name.trim().to_ascii_lowercase().as_str() {
            "peak" => Some(Self::Peak),
            "boresight" => Some(Self::Boresight),
            "mean" => Some(Self::Mean),
            _ => None,
        }
    }
}

/// A processing operation with its parameters.
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
#[cfg_attr(feature = "serde", serde(tag = "kind", rename_all = "snake_case"))]
pub enum Transform {
    /// Move the phase reference point by `offset` meters (x, y, z).
    TranslatePhaseCenter { offset: [f64; 3] },
    /// Re-express the samples in another polarization basis.
    ConvertPolarization { polarization: Polarization },
    /// Shift the theta and phi origins.
    Rotate {
        theta_offset_deg: f64,
        phi_offset_deg: f64,
    },
    /// Multiply every sample by a real factor.
    ScaleAmplitude { factor: f64 },
    /// Scale so the chosen reference level becomes unity.
    Normalize { reference: NormalizationReference },
    /// Re-grid between the central (signed theta, half-turn phi) and
    /// sided (non-negative theta, full-turn phi) layouts.
    ConvertCoordinateFormat { target: CoordinateFormat },
    /// Suppress scattering from outside a sphere of `max_radial_extent`
    /// meters around the origin by truncating the spherical mode spectrum.
    Mars { max_radial_extent: f64 },
}

/// Discriminant of [`Transform`], for logging and dispatch tables.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TransformKind {
    TranslatePhaseCenter,
    ConvertPolarization,
    Rotate,
    ScaleAmplitude,
    Normalize,
    ConvertCoordinateFormat,
    Mars,
}

impl fmt::Display for TransformKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            TransformKind::TranslatePhaseCenter => "translatePhaseCenter",
            TransformKind::ConvertPolarization => "convertPolarization",
            TransformKind::Rotate => "rotate",
            TransformKind::ScaleAmplitude => "scaleAmplitude",
            TransformKind::Normalize => "normalize",
            TransformKind::ConvertCoordinateFormat => "convertCoordinateFormat",
            TransformKind::Mars => "mars",
        };
        f.write_str(name)
    }
}

impl Transform {
    /// Returns the operation kind.
    #[must_use]
    pub fn kind(&self) -> TransformKind {
        match self {
            Transform::TranslatePhaseCenter { .. } => TransformKind::TranslatePhaseCenter,
            Transform::ConvertPolarization { .. } => TransformKind::ConvertPolarization,
            Transform::Rotate { .. } => TransformKind::Rotate,
            Transform::ScaleAmplitude { .. } => TransformKind::ScaleAmplitude,
            Transform::Normalize { .. } => TransformKind::Normalize,
            Transform::ConvertCoordinateFormat { .. } => TransformKind::ConvertCoordinateFormat,
            Transform::Mars { .. } => TransformKind::Mars,
        }
    }

    /// Checks the parameters for physical and structural sanity.
    ///
    /// # Errors
    ///
    /// Returns [`ValidationError::Parameter`] naming the first offending
    /// parameter.
    pub fn validate(&self) -> Result<(), ValidationError> {
        match *self {
            Transform::TranslatePhaseCenter { offset } => {
                for (value, name) in offset.iter().zip(["offset.x", "offset.y", "offset.z"]) {
                    if !value.is_finite() {
                        return Err(ValidationError::parameter(name, "must be finite"));
                    }
                    if value.abs() > MAX_TRANSLATION_M {
                        return Err(ValidationError::parameter(
                            name,
                            format!("{value} m exceeds +/-{MAX_TRANSLATION_M} m"),
                        ));
                    }
                }
                Ok(())
            }
            Transform::ConvertPolarization { .. }
            | Transform::Normalize { .. }
            | Transform::ConvertCoordinateFormat { .. } => Ok(()),
            Transform::Rotate {
                theta_offset_deg,
                phi_offset_deg,
            } => {
                check_angle("theta_offset_deg", theta_offset_deg)?;
                check_angle("phi_offset_deg", phi_offset_deg)
            }
            Transform::ScaleAmplitude { factor } => {
                if !factor.is_finite() {
                    Err(ValidationError::parameter("factor", "must be finite"))
                } else if factor == 0.0 {
                    Err(ValidationError::parameter("factor", "must be non-zero"))
                } else {
                    Ok(())
                }
            }
            Transform::Mars { max_radial_extent } => {
                if !max_radial_extent.is_finite() {
                    Err(ValidationError::parameter(
                        "max_radial_extent",
                        "must be finite",
                    ))
                } else if max_radial_extent <= 0.0 || max_radial_extent > MAX_RADIAL_EXTENT_M {
                    Err(ValidationError::parameter(
                        "max_radial_extent",
                        format!("{max_radial_extent} m is outside (0, {MAX_RADIAL_EXTENT_M}] m"),
                    ))
                } else {
                    Ok(())
                }
            }
        }
    }

    /// Returns the transform that undoes this one, where one exists.
    ///
    /// Normalization, polarization and coordinate-format conversion depend
    /// on the input value, so they have no parameter-only inverse. MARS
    /// discards information and has none at all.
    #[must_use]
    pub fn inverse(&self) -> Option<Transform> {
        match *self {
            Transform::TranslatePhaseCenter { offset } => Some(Transform::TranslatePhaseCenter {
                offset: [-offset[0], -offset[1], -offset[2]],
            }),
            Transform::Rotate {
                theta_offset_deg,
                phi_offset_deg,
            } => Some(Transform::Rotate {
                theta_offset_deg: -theta_offset_deg,
                phi_offset_deg: -phi_offset_deg,
            }),
            Transform::ScaleAmplitude { factor } => {
                Some(Transform::ScaleAmplitude { factor: 1.0 / factor })
            }
            Transform::ConvertPolarization { .. }
            | Transform::Normalize { .. }
            | Transform::ConvertCoordinateFormat { .. }
            | Transform::Mars { .. } => None,
        }
    }
}

impl fmt::Display for Transform {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Transform::TranslatePhaseCenter { offset } => write!(
                f,
                "translate phase center by ({}, {}, {}) m",
                offset[0], offset[1], offset[2]
            ),
            Transform::ConvertPolarization { polarization } => {
                write!(f, "convert polarization to {polarization}")
            }
            Transform::Rotate {
                theta_offset_deg,
                phi_offset_deg,
            } => write!(
                f,
                "rotate by theta {theta_offset_deg} deg, phi {phi_offset_deg} deg"
            ),
            Transform::ScaleAmplitude { factor } => write!(f, "scale amplitude by {factor}"),
            Transform::Normalize { reference } => write!(f, "normalize to {reference:?}"),
            Transform::ConvertCoordinateFormat { target } => {
                write!(f, "convert coordinates to {target} format")
            }
            Transform::Mars { max_radial_extent } => {
                write!(f, "MARS with max radial extent {max_radial_extent} m")
            }
        }
    }
}

fn check_angle(parameter: &'static str, value: f64) -> Result<(), ValidationError> {
    if !value.is_finite() {
        return Err(ValidationError::parameter(parameter, "must be finite"));
    }
    if value.abs() > MAX_ROTATION_DEG {
        return Err(ValidationError::parameter(
            parameter,
            format!("{value} deg is outside [-{MAX_ROTATION_DEG}, {MAX_ROTATION_DEG}]"),
        ));
    }
    Ok(())
}
