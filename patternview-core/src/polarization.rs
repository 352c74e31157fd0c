//! Polarization bases and component conversions.
//!
//! Samples are stored as a co-polar / cross-polar pair. Which physical
//! directions those are is given by [`Polarization`]: `Theta` stores
//! (E_theta, E_phi), `X` stores Ludwig-3 (E_x, E_y), `Rhcp` stores (E_R, E_L)
//! and so on. All conversions go through the spherical (E_theta, E_phi) pair.

use std::f64::consts::FRAC_1_SQRT_2;
use std::fmt;

use num_complex::Complex64;

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

/// Axial ratios above this value are reported as this value (linear
/// polarization has an unbounded ratio).
pub const MAX_AXIAL_RATIO_DB: f64 = 100.0;

/// Co-polar definition of a pattern.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
#[cfg_attr(feature = "serde", serde(rename_all = "lowercase"))]
pub enum Polarization {
    /// Co = E_theta, cross = E_phi.
    Theta,
    /// Co = E_phi, cross = E_theta.
    Phi,
    /// Ludwig-3 with co along X.
    X,
    /// Ludwig-3 with co along Y.
    Y,
    /// Right-hand circular co-polar.
    Rhcp,
    /// Left-hand circular co-polar.
    Lhcp,
}

impl Polarization {
    /// All supported polarizations, in menu order.
    pub const ALL: [Polarization; 6] = [
        Polarization::Theta,
        Polarization::Phi,
        Polarization::X,
        Polarization::Y,
        Polarization::Rhcp,
        Polarization::Lhcp,
    ];

    /// Short lowercase name, also used by the CLI and the JSON codec.
    #[must_use]
    pub fn name(self) -> &'static str {
        match self {
            Polarization::Theta => "theta",
            Polarization::Phi => "phi",
            Polarization::X => "x",
            Polarization::Y => "y",
            Polarization::Rhcp => "rhcp",
            Polarization::Lhcp => "lhcp",
        }
    }

    /// Parses a short name (case-insensitive).
    #[must_use]
    pub fn from_name(name: &str) -> Option<Self> {
        Self::ALL
            .into_iter()
            .find(|p| p.name().eq_ignore_ascii_case(name.trim()))
    }

    /// Converts a stored (co, cross) pair to (E_theta, E_phi).
    #[must_use]
    pub fn to_theta_phi(
        self,
        co: Complex64,
        cross: Complex64,
        phi_rad: f64,
    ) -> (Complex64, Complex64) {
        match self {
            Polarization::Theta => (co, cross),
            Polarization::Phi => (cross, co),
            Polarization::X => ludwig3_to_theta_phi(co, cross, phi_rad),
            Polarization::Y => ludwig3_to_theta_phi(cross, co, phi_rad),
            Polarization::Rhcp => circular_to_theta_phi(co, cross),
            Polarization::Lhcp => circular_to_theta_phi(cross, co),
        }
    }

    /// Converts (E_theta, E_phi) into this polarization's (co, cross) pair.
    #[must_use]
    pub fn from_theta_phi(
        self,
        e_theta: Complex64,
        e_phi: Complex64,
        phi_rad: f64,
    ) -> (Complex64, Complex64) {
        match self {
            Polarization::Theta => (e_theta, e_phi),
            Polarization::Phi => (e_phi, e_theta),
            Polarization::X => theta_phi_to_ludwig3(e_theta, e_phi, phi_rad),
            Polarization::Y => {
                let (x, y) = theta_phi_to_ludwig3(e_theta, e_phi, phi_rad);
                (y, x)
            }
            Polarization::Rhcp => theta_phi_to_circular(e_theta, e_phi),
            Polarization::Lhcp => {
                let (r, l) = theta_phi_to_circular(e_theta, e_phi);
                (l, r)
            }
        }
    }

    /// Returns the (right, left) circular decomposition of a stored pair.
    #[must_use]
    pub fn circular_components(
        self,
        co: Complex64,
        cross: Complex64,
        phi_rad: f64,
    ) -> (Complex64, Complex64) {
        match self {
            Polarization::Rhcp => (co, cross),
            Polarization::Lhcp => (cross, co),
            _ => {
                let (e_theta, e_phi) = self.to_theta_phi(co, cross, phi_rad);
                theta_phi_to_circular(e_theta, e_phi)
            }
        }
    }
}

impl fmt::Display for Polarization {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Polarization::Theta => write!(f, "Theta"),
            Polarization::Phi => write!(f, "Phi"),
            Polarization::X => write!(f, "X (Ludwig-3)"),
            Polarization::Y => write!(f, "Y (Ludwig-3)"),
            Polarization::Rhcp => write!(f, "RHCP"),
            Polarization::Lhcp => write!(f, "LHCP"),
        }
    }
}

/// Which of the two stored components a view reads.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
#[cfg_attr(feature = "serde", serde(rename_all = "lowercase"))]
pub enum Component {
    /// Co-polar component.
    #[default]
    Co,
    /// Cross-polar component.
    Cross,
}

/// Axial ratio in dB from a circular decomposition, capped at
/// [`MAX_AXIAL_RATIO_DB`].
#[must_use]
pub fn axial_ratio_db(right: Complex64, left: Complex64) -> f64 {
    let r = right.norm();
    let l = left.norm();
    let minor = (r - l).abs();
    if minor <= f64::EPSILON * (r + l).max(f64::MIN_POSITIVE) {
        return MAX_AXIAL_RATIO_DB;
    }
    (20.0 * ((r + l) / minor).log10()).min(MAX_AXIAL_RATIO_DB)
}

fn ludwig3_to_theta_phi(x: Complex64, y: Complex64, phi_rad: f64) -> (Complex64, Complex64) {
    let (s, c) = phi_rad.sin_cos();
    (x * c + y * s, -x * s + y * c)
}

fn theta_phi_to_ludwig3(
    e_theta: Complex64,
    e_phi: Complex64,
    phi_rad: f64,
) -> (Complex64, Complex64) {
    let (s, c) = phi_rad.sin_cos();
    (e_theta * c - e_phi * s, e_theta * s + e_phi * c)
}

fn circular_to_theta_phi(right: Complex64, left: Complex64) -> (Complex64, Complex64) {
    let j = Complex64::i();
    (
        (right + left) * FRAC_1_SQRT_2,
        j * (right - left) * FRAC_1_SQRT_2,
    )
}

fn theta_phi_to_circular(e_theta: Complex64, e_phi: Complex64) -> (Complex64, Complex64) {
    let j = Complex64::i();
    (
        (e_theta - j * e_phi) * FRAC_1_SQRT_2,
        (e_theta + j * e_phi) * FRAC_1_SQRT_2,
    )
}
