//! Immutable pattern values.
//!
//! A [`Pattern`] holds complex far-field samples on a
//! frequency × cut (phi) × angle (theta) grid for two polarization
//! components. It is validated once at construction and never mutated;
//! processing always builds a new value. [`PatternValue`] is the shared,
//! cheaply clonable handle the rest of the system passes around.

use std::fmt;
use std::ops::Deref;
use std::sync::Arc;

use ndarray::Array3;
use num_complex::Complex64;

use crate::error::{PatternError, Result};
use crate::polarization::{Component, Polarization};
use crate::transform::Transform;

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

/// Relative tolerance used when matching a requested value to an axis value.
pub const AXIS_TOLERANCE: f64 = 1e-9;

/// Speed of light in vacuum, m/s.
pub const SPEED_OF_LIGHT: f64 = 299_792_458.0;

/// Free-space wavenumber (rad/m) at `frequency` Hz.
#[must_use]
pub fn wavenumber(frequency: f64) -> f64 {
    2.0 * std::f64::consts::PI * frequency / SPEED_OF_LIGHT
}

/// Unit direction vector for a (theta, phi) pair in degrees.
///
/// Negative theta (central format) is handled naturally: it points to the
/// mirrored direction across the z axis.
#[must_use]
pub fn direction(theta_deg: f64, phi_deg: f64) -> [f64; 3] {
    let (st, ct) = theta_deg.to_radians().sin_cos();
    let (sp, cp) = phi_deg.to_radians().sin_cos();
    [st * cp, st * sp, ct]
}

/// Unit of the stored field samples.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
#[cfg_attr(feature = "serde", serde(rename_all = "snake_case"))]
pub enum FieldUnit {
    /// Absolute field strength in V/m.
    #[default]
    VoltsPerMeter,
    /// Dimensionless, scaled relative to some reference.
    Normalized,
}

/// Layout of the angle grid.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
#[cfg_attr(feature = "serde", serde(rename_all = "lowercase"))]
pub enum CoordinateFormat {
    /// Theta spans negative values, phi covers half a turn.
    Central,
    /// Theta is non-negative, phi covers a full turn.
    Sided,
}

impl CoordinateFormat {
    /// Parses `central` or `sided` (case-insensitive).
    #[must_use]
    pub fn from_name(name: &str) -> Option<Self> {
        match name.trim().to_ascii_lowercase().as_str() {
            "central" => Some(Self::Central),
            "sided" => Some(Self::Sided),
            _ => None,
        }
    }
}

impl fmt::Display for CoordinateFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            CoordinateFormat::Central => "central",
            CoordinateFormat::Sided => "sided",
        })
    }
}

/// Where a pattern value came from.
#[derive(Clone, Default)]
pub enum Provenance {
    /// Built in memory (tests, synthetic data).
    #[default]
    Memory,
    /// Loaded from a file or other named source.
    Source { label: String },
    /// Loaded from a file that recorded the transforms applied before it
    /// was saved, oldest first.
    Restored {
        label: String,
        history: Vec<Transform>,
    },
    /// Produced by applying `transform` to `parent`.
    Derived {
        transform: Transform,
        parent: PatternValue,
    },
}

impl fmt::Debug for Provenance {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Provenance::Memory => write!(f, "Memory"),
            Provenance::Source { label } => {
                f.debug_struct("Source").field("label", label).finish()
            }
            Provenance::Restored { label, history } => f
                .debug_struct("Restored")
                .field("label", label)
                .field("history", history)
                .finish(),
            Provenance::Derived { transform, parent } => f
                .debug_struct("Derived")
                .field("transform", transform)
                .field("parent", &Arc::as_ptr(&parent.0))
                .finish(),
        }
    }
}

/// A validated, immutable radiation pattern.
#[derive(Debug, Clone)]
pub struct Pattern {
    frequencies: Vec<f64>,
    cuts: Vec<f64>,
    angles: Vec<f64>,
    polarization: Polarization,
    unit: FieldUnit,
    co: Array3<Complex64>,
    cross: Array3<Complex64>,
    provenance: Provenance,
}

impl Pattern {
    /// Builds a pattern after checking every structural invariant.
    ///
    /// `frequencies` are in Hz, `cuts` (phi) and `angles` (theta) in degrees.
    /// Both component arrays must have shape
    /// `(frequencies.len(), cuts.len(), angles.len())`.
    ///
    /// # Errors
    ///
    /// Returns a [`PatternError`] if an axis is empty, not finite, not
    /// strictly increasing, a frequency is not positive, an array has the
    /// wrong shape, or a sample is not finite.
    pub fn new(
        frequencies: Vec<f64>,
        cuts: Vec<f64>,
        angles: Vec<f64>,
        polarization: Polarization,
        co: Array3<Complex64>,
        cross: Array3<Complex64>,
    ) -> Result<Self> {
        check_axis("frequency", &frequencies)?;
        check_axis("cut", &cuts)?;
        check_axis("angle", &angles)?;
        if let Some(&f) = frequencies.iter().find(|&&f| f <= 0.0) {
            return Err(PatternError::NonPositiveFrequency(f));
        }

        let expected = (frequencies.len(), cuts.len(), angles.len());
        for (name, data) in [("co", &co), ("cross", &cross)] {
            let found = data.dim();
            if found != expected {
                return Err(PatternError::ShapeMismatch {
                    component: name,
                    expected,
                    found,
                });
            }
            if data.iter().any(|v| !v.re.is_finite() || !v.im.is_finite()) {
                return Err(PatternError::NonFiniteSample { component: name });
            }
        }

        Ok(Self {
            frequencies,
            cuts,
            angles,
            polarization,
            unit: FieldUnit::default(),
            co,
            cross,
            provenance: Provenance::Memory,
        })
    }

    /// Sets the sample unit.
    #[must_use]
    pub fn with_unit(mut self, unit: FieldUnit) -> Self {
        self.unit = unit;
        self
    }

    /// Sets the provenance record.
    #[must_use]
    pub fn with_provenance(mut self, provenance: Provenance) -> Self {
        self.provenance = provenance;
        self
    }

    /// Frequencies in Hz, strictly increasing.
    #[must_use]
    pub fn frequencies(&self) -> &[f64] {
        &self.frequencies
    }

    /// Cut (phi) angles in degrees, strictly increasing.
    #[must_use]
    pub fn cuts(&self) -> &[f64] {
        &self.cuts
    }

    /// Sample (theta) angles in degrees, strictly increasing.
    #[must_use]
    pub fn angles(&self) -> &[f64] {
        &self.angles
    }

    /// Co-polar definition of the stored components.
    #[must_use]
    pub fn polarization(&self) -> Polarization {
        self.polarization
    }

    /// Unit of the stored samples.
    #[must_use]
    pub fn unit(&self) -> FieldUnit {
        self.unit
    }

    /// Provenance record.
    #[must_use]
    pub fn provenance(&self) -> &Provenance {
        &self.provenance
    }

    /// Grid shape as `(frequencies, cuts, angles)`.
    #[must_use]
    pub fn shape(&self) -> (usize, usize, usize) {
        (self.frequencies.len(), self.cuts.len(), self.angles.len())
    }

    /// Co-polar samples.
    #[must_use]
    pub fn co(&self) -> &Array3<Complex64> {
        &self.co
    }

    /// Cross-polar samples.
    #[must_use]
    pub fn cross(&self) -> &Array3<Complex64> {
        &self.cross
    }

    /// Samples of one component.
    #[must_use]
    pub fn component(&self, component: Component) -> &Array3<Complex64> {
        match component {
            Component::Co => &self.co,
            Component::Cross => &self.cross,
        }
    }

    /// Single sample, or `None` if any index is out of range.
    #[must_use]
    pub fn sample(
        &self,
        component: Component,
        frequency: usize,
        cut: usize,
        angle: usize,
    ) -> Option<Complex64> {
        self.component(component)
            .get((frequency, cut, angle))
            .copied()
    }

    /// Amplitude and phase (radians) of one sample.
    #[must_use]
    pub fn amplitude_phase(
        &self,
        component: Component,
        frequency: usize,
        cut: usize,
        angle: usize,
    ) -> Option<(f64, f64)> {
        self.sample(component, frequency, cut, angle)
            .map(Complex64::to_polar)
    }

    /// Index of `frequency` on the frequency axis.
    #[must_use]
    pub fn frequency_index(&self, frequency: f64) -> Option<usize> {
        axis_index(&self.frequencies, frequency)
    }

    /// Index of `cut` on the cut axis.
    #[must_use]
    pub fn cut_index(&self, cut: f64) -> Option<usize> {
        axis_index(&self.cuts, cut)
    }

    /// Index of the angle sample closest to boresight (theta = 0).
    #[must_use]
    pub fn boresight_index(&self) -> usize {
        self.angles
            .iter()
            .enumerate()
            .min_by(|a, b| a.1.abs().total_cmp(&b.1.abs()))
            .map_or(0, |(i, _)| i)
    }

    /// Classifies the angle grid layout.
    #[must_use]
    pub fn coordinate_format(&self) -> CoordinateFormat {
        if self.angles.first().is_some_and(|&a| a < 0.0) {
            CoordinateFormat::Central
        } else {
            CoordinateFormat::Sided
        }
    }

    /// Iterates over the transforms that produced this value, newest first.
    ///
    /// Includes transforms recorded by the file a [`Provenance::Restored`]
    /// ancestor was loaded from.
    pub fn history(&self) -> impl Iterator<Item = &Transform> + '_ {
        let mut current = &self.provenance;
        let derived = std::iter::from_fn(move || match current {
            Provenance::Derived { transform, parent } => {
                current = &parent.0.provenance;
                Some(transform)
            }
            _ => None,
        });
        let recorded: &[Transform] = match self.root_provenance() {
            Provenance::Restored { history, .. } => history,
            _ => &[],
        };
        derived.chain(recorded.iter().rev())
    }

    /// Label of the source this value (or its oldest ancestor) came from.
    #[must_use]
    pub fn source_label(&self) -> Option<&str> {
        match self.root_provenance() {
            Provenance::Source { label } | Provenance::Restored { label, .. } => {
                Some(label.as_str())
            }
            _ => None,
        }
    }

    fn root_provenance(&self) -> &Provenance {
        let mut current = &self.provenance;
        while let Provenance::Derived { parent, .. } = current {
            current = &parent.0.provenance;
        }
        current
    }

    /// Largest absolute sample difference to `other`, or `None` when the two
    /// values do not share axes and polarization.
    #[must_use]
    pub fn max_abs_difference(&self, other: &Pattern) -> Option<f64> {
        let same_axes = axes_match(&self.frequencies, &other.frequencies)
            && axes_match(&self.cuts, &other.cuts)
            && axes_match(&self.angles, &other.angles);
        if !same_axes || self.polarization != other.polarization {
            return None;
        }
        let diff = |a: &Array3<Complex64>, b: &Array3<Complex64>| {
            a.iter()
                .zip(b.iter())
                .map(|(x, y)| (x - y).norm())
                .fold(0.0_f64, f64::max)
        };
        Some(diff(&self.co, &other.co).max(diff(&self.cross, &other.cross)))
    }
}

/// Shared handle to an immutable [`Pattern`].
///
/// Cloning is cheap; [`PatternValue::ptr_eq`] tells whether two handles refer
/// to the very same value.
#[derive(Debug, Clone)]
pub struct PatternValue(Arc<Pattern>);

impl PatternValue {
    /// Wraps a pattern.
    #[must_use]
    pub fn new(pattern: Pattern) -> Self {
        Self(Arc::new(pattern))
    }

    /// Returns true if both handles point to the same value.
    #[must_use]
    pub fn ptr_eq(a: &Self, b: &Self) -> bool {
        Arc::ptr_eq(&a.0, &b.0)
    }
}

impl From<Pattern> for PatternValue {
    fn from(pattern: Pattern) -> Self {
        Self::new(pattern)
    }
}

impl Deref for PatternValue {
    type Target = Pattern;

    fn deref(&self) -> &Pattern {
        &self.0
    }
}

/// Returns true if `a` and `b` are equal within [`AXIS_TOLERANCE`].
#[must_use]
pub fn axis_value_eq(a: f64, b: f64) -> bool {
    (a - b).abs() <= AXIS_TOLERANCE * a.abs().max(b.abs()).max(1.0)
}

fn axis_index(axis: &[f64], value: f64) -> Option<usize> {
    if !value.is_finite() {
        return None;
    }
    axis.iter().position(|&v| axis_value_eq(v, value))
}

fn axes_match(a: &[f64], b: &[f64]) -> bool {
    a.len() == b.len() && a.iter().zip(b).all(|(&x, &y)| axis_value_eq(x, y))
}

fn check_axis(axis: &'static str, values: &[f64]) -> Result<()> {
    if values.is_empty() {
        return Err(PatternError::EmptyAxis { axis });
    }
    if let Some(index) = values.iter().position(|v| !v.is_finite()) {
        return Err(PatternError::NonFiniteAxis { axis, index });
    }
    if let Some(index) = values.windows(2).position(|w| w[1] <= w[0]) {
        return Err(PatternError::NonMonotonicAxis {
            axis,
            index: index + 1,
        });
    }
    Ok(())
}
