//! Synthetic patterns for demos and tests.
//!
//! Produces a Gaussian-beam pattern with a configurable polarization,
//! cross-polar level and phase center. The shape is not physically
//! rigorous; it is smooth, non-zero everywhere and has a known phase
//! center, which is what tests need.

use ndarray::Array3;
use num_complex::Complex64;

use crate::pattern::{direction, wavenumber, Pattern};
use crate::polarization::Polarization;

/// Lowest relative level generated, in dB.
const FLOOR_DB: f64 = -60.0;

/// Builder for synthetic patterns.
#[derive(Debug, Clone)]
pub struct SyntheticPattern {
    frequencies: Vec<f64>,
    cuts: Vec<f64>,
    angles: Vec<f64>,
    excitation: Polarization,
    basis: Polarization,
    beamwidth_deg: f64,
    cross_polar_db: f64,
    peak: f64,
    phase_center: [f64; 3],
}

impl SyntheticPattern {
    /// Creates a builder for the given frequencies (Hz) and cuts (deg) with a
    /// central-format theta grid from -180 to 180 deg in 5 deg steps.
    #[must_use]
    pub fn new(frequencies: Vec<f64>, cuts: Vec<f64>) -> Self {
        Self {
            frequencies,
            cuts,
            angles: theta_grid(-180.0, 180.0, 5.0),
            excitation: Polarization::X,
            basis: Polarization::Theta,
            beamwidth_deg: 40.0,
            cross_polar_db: -30.0,
            peak: 1.0,
            phase_center: [0.0; 3],
        }
    }

    /// Replaces the theta grid with `start..=stop` in `step` increments.
    #[must_use]
    pub fn with_theta_grid(mut self, start: f64, stop: f64, step: f64) -> Self {
        self.angles = theta_grid(start, stop, step);
        self
    }

    /// Replaces the theta grid.
    #[must_use]
    pub fn with_angles(mut self, angles: Vec<f64>) -> Self {
        self.angles = angles;
        self
    }

    /// Polarization of the radiated field's co-polar component.
    #[must_use]
    pub fn with_excitation(mut self, excitation: Polarization) -> Self {
        self.excitation = excitation;
        self
    }

    /// Basis the samples are stored in.
    #[must_use]
    pub fn with_basis(mut self, basis: Polarization) -> Self {
        self.basis = basis;
        self
    }

    /// Half-power beamwidth in degrees.
    #[must_use]
    pub fn with_beamwidth(mut self, beamwidth_deg: f64) -> Self {
        self.beamwidth_deg = beamwidth_deg;
        self
    }

    /// Cross-polar level relative to co-polar, in dB.
    #[must_use]
    pub fn with_cross_polar_db(mut self, level_db: f64) -> Self {
        self.cross_polar_db = level_db;
        self
    }

    /// Peak co-polar amplitude.
    #[must_use]
    pub fn with_peak(mut self, peak: f64) -> Self {
        self.peak = peak;
        self
    }

    /// Phase center position in meters.
    #[must_use]
    pub fn with_phase_center(mut self, position: [f64; 3]) -> Self {
        self.phase_center = position;
        self
    }

    /// Builds the pattern.
    ///
    /// # Panics
    ///
    /// Panics if the configured axes violate the [`Pattern`] invariants;
    /// use [`SyntheticPattern::try_build`] for fallible construction.
    #[must_use]
    pub fn build(self) -> Pattern {
        match self.try_build() {
            Ok(p) => p,
            Err(e) => panic!("invalid synthetic pattern: {e}"),
        }
    }

    /// Builds the pattern, reporting invalid axes as an error.
    ///
    /// # Errors
    ///
    /// Returns the [`crate::PatternError`] raised by [`Pattern::new`].
    pub fn try_build(self) -> crate::Result<Pattern> {
        let shape = (self.frequencies.len(), self.cuts.len(), self.angles.len());
        let mut co = Array3::zeros(shape);
        let mut cross = Array3::zeros(shape);
        let cross_level = 10f64.powf(self.cross_polar_db / 20.0);

        for (fi, &freq) in self.frequencies.iter().enumerate() {
            let k = wavenumber(freq);
            for (ci, &phi) in self.cuts.iter().enumerate() {
                let phi_rad = phi.to_radians();
                for (ai, &theta) in self.angles.iter().enumerate() {
                    let level_db = (-12.0 * (theta / self.beamwidth_deg).powi(2)).max(FLOOR_DB);
                    let amplitude = self.peak * 10f64.powf(level_db / 20.0);
                    let r = direction(theta, phi);
                    let path: f64 = r.iter().zip(&self.phase_center).map(|(a, b)| a * b).sum();
                    let phase = Complex64::from_polar(1.0, k * path);

                    let field_co = phase * amplitude;
                    let field_cross = phase * amplitude * cross_level * Complex64::i();
                    let (e_theta, e_phi) =
                        self.excitation.to_theta_phi(field_co, field_cross, phi_rad);
                    let (a, b) = self.basis.from_theta_phi(e_theta, e_phi, phi_rad);
                    co[(fi, ci, ai)] = a;
                    cross[(fi, ci, ai)] = b;
                }
            }
        }

        Pattern::new(self.frequencies, self.cuts, self.angles, self.basis, co, cross)
    }
}

#[allow(
    clippy::cast_possible_truncation,
    clippy::cast_sign_loss,
    clippy::cast_precision_loss
)]
fn theta_grid(start: f64, stop: f64, step: f64) -> Vec<f64> {
    if step <= 0.0 || stop < start {
        return vec![start];
    }
    let n = ((stop - start) / step).round() as usize;
    (0..=n).map(|i| start + step * i as f64).collect()
}
