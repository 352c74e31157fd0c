//! Spherical mode expansion of one frequency of a pattern.
//!
//! Each stored component is projected onto orthonormal spherical harmonics
//! `Y_nm(theta, phi) = Pbar_n^m(cos theta) e^{i m phi} / sqrt(2 pi)` by
//! quadrature over the measurement grid. Degrees are produced one at a
//! time; the orders of a degree are evaluated in parallel with rayon, and
//! cancellation is checked between degrees.
//!
//! MARS reuses the projection: modes above the degree a source of the given
//! radius can excite are dropped and the samples are rebuilt from the rest.

use std::f64::consts::{FRAC_1_SQRT_2, TAU};

use ndarray::Array3;
use num_complex::Complex64;
use patternview_core::pattern::wavenumber;
use patternview_core::{Component, CoordinateFormat, Pattern};
use rayon::prelude::*;

use crate::analysis::{ModeCoefficient, SphericalWaveExpansion, SweParams, MAX_MODE_DEGREE};
use crate::cancel::CancellationToken;
use crate::error::AlgebraError;
use crate::reference::trapezoid_weights;

/// Degrees kept by MARS beyond `k * max_radial_extent`.
pub(crate) const MARS_MODE_MARGIN: usize = 10;

/// A direction on the unit sphere.
#[derive(Debug, Clone, Copy)]
pub(crate) struct Node {
    pub(crate) cos: f64,
    pub(crate) sin: f64,
    pub(crate) phi: f64,
}

impl Node {
    pub(crate) fn new(theta_rad: f64, phi_rad: f64) -> Self {
        let (sin, cos) = theta_rad.sin_cos();
        Self {
            cos,
            sin,
            phi: phi_rad,
        }
    }

    /// Azimuthal factor `e^{i m phi} / sqrt(2 pi)` of `Y_nm`.
    #[allow(clippy::cast_precision_loss)]
    pub(crate) fn azimuth(&self, order: i64) -> Complex64 {
        Complex64::from_polar(1.0 / TAU.sqrt(), order as f64 * self.phi)
    }
}

/// Samples of one frequency laid out for quadrature, cut-major.
struct Quadrature {
    nodes: Vec<Node>,
    weights: Vec<f64>,
    co: Vec<Complex64>,
    cross: Vec<Complex64>,
    /// Highest degree the theta spacing resolves.
    nmax: usize,
    /// Highest order the cut spacing resolves.
    mmax: usize,
}

impl Quadrature {
    #[allow(
        clippy::cast_precision_loss,
        clippy::cast_possible_truncation,
        clippy::cast_sign_loss
    )]
    fn new(pattern: &Pattern, fi: usize) -> Result<Self, AlgebraError> {
        let angles = pattern.angles();
        if angles.len() < 2 {
            return Err(AlgebraError::MalformedInput(
                "spherical expansion needs at least two theta samples".into(),
            ));
        }
        let half_planes = match pattern.coordinate_format() {
            CoordinateFormat::Central => 2 * pattern.cuts().len(),
            CoordinateFormat::Sided => pattern.cuts().len(),
        };
        let step = (angles[angles.len() - 1] - angles[0]) / (angles.len() - 1) as f64;
        let dphi = TAU / half_planes as f64;
        let theta_w = trapezoid_weights(angles);

        let len = pattern.cuts().len() * angles.len();
        let mut q = Self {
            nodes: Vec::with_capacity(len),
            weights: Vec::with_capacity(len),
            co: Vec::with_capacity(len),
            cross: Vec::with_capacity(len),
            nmax: ((180.0 / step).floor() as usize).clamp(1, MAX_MODE_DEGREE),
            mmax: half_planes / 2,
        };
        for (ci, &cut) in pattern.cuts().iter().enumerate() {
            for (ai, &theta) in angles.iter().enumerate() {
                // Negative theta is the same direction seen from the opposite half-plane.
                let (theta, phi) = if theta < 0.0 {
                    (-theta, cut + 180.0)
                } else {
                    (theta, cut)
                };
                let node = Node::new(theta.to_radians(), phi.to_radians() % TAU);
                q.weights.push(node.sin.abs() * theta_w[ai] * dphi);
                q.nodes.push(node);
                q.co.push(pattern.co()[(fi, ci, ai)]);
                q.cross.push(pattern.cross()[(fi, ci, ai)]);
            }
        }
        Ok(q)
    }

    /// Projects both components onto `Y_n^order`, given `Pbar_n^|order|`
    /// at every node.
    fn project(&self, legendre: &[f64], order: i64) -> (Complex64, Complex64) {
        let mut co = Complex64::new(0.0, 0.0);
        let mut cross = Complex64::new(0.0, 0.0);
        for (i, (node, &p)) in self.nodes.iter().zip(legendre).enumerate() {
            let basis = node.azimuth(order).conj() * (p * self.weights[i]);
            co += self.co[i] * basis;
            cross += self.cross[i] * basis;
        }
        (co, cross)
    }
}

/// Legendre recurrence state for a single order `m`.
pub(crate) struct OrderState {
    pub(crate) m: usize,
    sectoral: f64,
    prev: Vec<f64>,
    prev2: Vec<f64>,
}

impl OrderState {
    pub(crate) fn new(m: usize) -> Self {
        // Pbar_m^m = sectoral * sin^m(theta)
        let sectoral = (1..=m).fold(FRAC_1_SQRT_2, |acc, k| {
            #[allow(clippy::cast_precision_loss)]
            let k = k as f64;
            acc * ((2.0 * k + 1.0) / (2.0 * k)).sqrt()
        });
        Self {
            m,
            sectoral,
            prev: Vec::new(),
            prev2: Vec::new(),
        }
    }

    /// Advances the recurrence to degree `n` and returns `Pbar_n^m` at
    /// every node. Degrees must be visited in order, starting at `m`.
    #[allow(
        clippy::cast_precision_loss,
        clippy::cast_possible_truncation,
        clippy::cast_possible_wrap
    )]
    pub(crate) fn legendre(&mut self, n: usize, nodes: &[Node]) -> &[f64] {
        let m = self.m;
        let current: Vec<f64> = if n == m {
            nodes
                .iter()
                .map(|s| self.sectoral * s.sin.powi(m as i32))
                .collect()
        } else if n == m + 1 {
            let f = ((2 * m + 3) as f64).sqrt();
            nodes
                .iter()
                .zip(&self.prev)
                .map(|(s, p)| f * s.cos * p)
                .collect()
        } else {
            let nf = n as f64;
            let mf = m as f64;
            let a = ((4.0 * nf * nf - 1.0) / (nf * nf - mf * mf)).sqrt();
            let b = (((nf - 1.0).powi(2) - mf * mf) / (4.0 * (nf - 1.0).powi(2) - 1.0)).sqrt();
            nodes
                .iter()
                .zip(self.prev.iter().zip(&self.prev2))
                .map(|(s, (p1, p2))| a * (s.cos * p1 - b * p2))
                .collect()
        };
        self.prev2 = std::mem::replace(&mut self.prev, current);
        &self.prev
    }
}

/// The signed orders sharing `|m|`.
#[allow(clippy::cast_possible_wrap)]
pub(crate) fn signed_orders(m: usize) -> Vec<i64> {
    let m = m as i64;
    if m == 0 {
        vec![0]
    } else {
        vec![m, -m]
    }
}

/// Index of `frequency` on the pattern's axis, or the first frequency.
pub(crate) fn frequency_slot(
    pattern: &Pattern,
    frequency: Option<f64>,
) -> Result<usize, AlgebraError> {
    match frequency {
        Some(f) => pattern.frequency_index(f).ok_or_else(|| {
            AlgebraError::MalformedInput(format!("{f} Hz is not on the frequency axis"))
        }),
        None => Ok(0),
    }
}

/// Runs the expansion. See [`crate::PatternAlgebra::compute_spherical_wave_expansion`].
#[allow(clippy::cast_precision_loss)]
pub(crate) fn expand(
    pattern: &Pattern,
    params: &SweParams,
    progress: &dyn Fn(f32),
    cancel: &CancellationToken,
) -> Result<SphericalWaveExpansion, AlgebraError> {
    let fi = frequency_slot(pattern, params.frequency)?;
    let q = Quadrature::new(pattern, fi)?;
    let nmax = params.nmax.unwrap_or(q.nmax);
    let mmax = params.mmax.unwrap_or(q.mmax).min(nmax);

    let mut states: Vec<OrderState> = (0..=mmax).map(OrderState::new).collect();
    let mut coefficients = Vec::new();
    let mut power_by_degree = Vec::with_capacity(nmax);

    // Degree 0 only seeds the m = 0 recurrence.
    if let Some(state) = states.first_mut() {
        state.legendre(0, &q.nodes);
    }

    for n in 1..=nmax {
        if cancel.is_cancelled() {
            return Err(AlgebraError::Cancelled);
        }
        let mut degree: Vec<ModeCoefficient> = states
            .par_iter_mut()
            .filter(|state| state.m <= n)
            .flat_map_iter(|state| {
                let orders = signed_orders(state.m);
                let legendre = state.legendre(n, &q.nodes);
                let mut out = Vec::with_capacity(2 * orders.len());
                for order in orders {
                    let (co, cross) = q.project(legendre, order);
                    for (component, value) in [(Component::Co, co), (Component::Cross, cross)] {
                        out.push(ModeCoefficient {
                            component,
                            n,
                            m: order,
                            value,
                        });
                    }
                }
                out
            })
            .collect();
        degree.sort_by_key(|c| (c.m, c.component == Component::Cross));
        power_by_degree.push(degree.iter().map(|c| c.value.norm_sqr()).sum());
        coefficients.extend(degree);
        progress(n as f32 / nmax as f32);
    }

    Ok(SphericalWaveExpansion {
        frequency: pattern.frequencies()[fi],
        nmax,
        mmax,
        coefficients,
        power_by_degree,
    })
}

/// Highest degree a source inside a sphere of `radius` meters excites at
/// `frequency`, plus [`MARS_MODE_MARGIN`].
#[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
pub(crate) fn mars_degree(frequency: f64, radius: f64) -> usize {
    let kr = (wavenumber(frequency) * radius).ceil().max(0.0);
    (kr as usize).saturating_add(MARS_MODE_MARGIN)
}

/// Rebuilds every frequency from its modes up to [`mars_degree`].
/// Frequencies whose sampling resolves no higher degree are copied as is.
pub(crate) fn mars_filter(
    pattern: &Pattern,
    max_radial_extent: f64,
) -> Result<(Array3<Complex64>, Array3<Complex64>), AlgebraError> {
    let mut co = pattern.co().clone();
    let mut cross = pattern.cross().clone();
    let angles = pattern.angles().len();

    for (fi, &frequency) in pattern.frequencies().iter().enumerate() {
        let q = Quadrature::new(pattern, fi)?;
        let keep = mars_degree(frequency, max_radial_extent);
        if keep >= q.nmax {
            continue;
        }
        let zero = || vec![Complex64::new(0.0, 0.0); q.nodes.len()];
        let (new_co, new_cross) = (0..=q.mmax.min(keep))
            .into_par_iter()
            .map(|m| {
                let mut state = OrderState::new(m);
                let (mut co, mut cross) = (zero(), zero());
                for n in m..=keep {
                    let legendre = state.legendre(n, &q.nodes);
                    for order in signed_orders(m) {
                        let (a, b) = q.project(legendre, order);
                        for (i, (node, &p)) in q.nodes.iter().zip(legendre).enumerate() {
                            let y = node.azimuth(order) * p;
                            co[i] += a * y;
                            cross[i] += b * y;
                        }
                    }
                }
                (co, cross)
            })
            .reduce(
                || (zero(), zero()),
                |(mut co, mut cross), (more_co, more_cross)| {
                    co.iter_mut().zip(more_co).for_each(|(a, b)| *a += b);
                    cross.iter_mut().zip(more_cross).for_each(|(a, b)| *a += b);
                    (co, cross)
                },
            );

        for (i, (a, b)) in new_co.into_iter().zip(new_cross).enumerate() {
            co[(fi, i / angles, i % angles)] = a;
            cross[(fi, i / angles, i % angles)] = b;
        }
    }
    Ok((co, cross))
}

/// Total power `integral |F|^2 dOmega` of both components, for comparison
/// with [`SphericalWaveExpansion::total_power`].
#[cfg(test)]
fn integrated_power(pattern: &Pattern, fi: usize) -> f64 {
    let theta_w = trapezoid_weights(pattern.angles());
    #[allow(clippy::cast_precision_loss)]
    let dphi = TAU / pattern.cuts().len() as f64;
    let mut total = 0.0;
    for ci in 0..pattern.cuts().len() {
        for (ai, &theta) in pattern.angles().iter().enumerate() {
            let p = pattern.co()[(fi, ci, ai)].norm_sqr()
                + pattern.cross()[(fi, ci, ai)].norm_sqr();
            total += p * theta.to_radians().sin().abs() * theta_w[ai] * dphi;
        }
    }
    total
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;
    use patternview_core::Polarization;
    use std::f64::consts::PI;

    /// Sided grid: theta 0..180 step 2, phi 0..350 step 10.
    fn sided(field: impl Fn(f64, f64) -> Complex64) -> Pattern {
        let cuts: Vec<f64> = (0..36).map(|i| f64::from(i) * 10.0).collect();
        let angles: Vec<f64> = (0..=90).map(|i| f64::from(i) * 2.0).collect();
        let co = Array3::from_shape_fn((1, cuts.len(), angles.len()), |(_, c, a)| {
            field(angles[a].to_radians(), cuts[c].to_radians())
        });
        let shape = co.dim();
        Pattern::new(
            vec![1e9],
            cuts,
            angles,
            Polarization::Theta,
            co,
            Array3::zeros(shape),
        )
        .unwrap()
    }

    fn coefficient(swe: &SphericalWaveExpansion, n: usize, m: i64) -> Complex64 {
        swe.coefficients
            .iter()
            .find(|c| c.n == n && c.m == m && c.component == Component::Co)
            .map(|c| c.value)
            .unwrap()
    }

    #[test]
    fn test_dipole_lands_in_first_degree() {
        let p = sided(|theta, _| Complex64::new(theta.cos(), 0.0));
        let params = SweParams {
            nmax: Some(4),
            ..SweParams::default()
        };
        let swe = expand(&p, &params, &|_| {}, &CancellationToken::new()).unwrap();
        assert_eq!(swe.nmax, 4);
        assert_eq!(swe.power_by_degree.len(), 4);

        let expected = (4.0 * PI / 3.0).sqrt();
        assert_relative_eq!(coefficient(&swe, 1, 0).re, expected, max_relative = 1e-2);
        assert!(swe.power_by_degree[0] > 0.99 * swe.total_power());
        assert_relative_eq!(
            swe.total_power(),
            integrated_power(&p, 0),
            max_relative = 1e-2
        );
    }

    #[test]
    fn test_azimuthal_order_is_resolved() {
        // sin(theta) e^{i phi} is proportional to Y_1^1.
        let p = sided(|theta, phi| Complex64::from_polar(theta.sin(), phi));
        let params = SweParams {
            nmax: Some(3),
            mmax: Some(3),
            ..SweParams::default()
        };
        let swe = expand(&p, &params, &|_| {}, &CancellationToken::new()).unwrap();
        let plus = coefficient(&swe, 1, 1).norm();
        let minus = coefficient(&swe, 1, -1).norm();
        assert!(plus > 1.0);
        assert!(minus < 1e-6 * plus);
    }

    #[test]
    fn test_defaults_follow_sampling() {
        let p = sided(|_, _| Complex64::new(1.0, 0.0));
        let swe = expand(&p, &SweParams::default(), &|_| {}, &CancellationToken::new()).unwrap();
        assert_eq!(swe.nmax, 90);
        assert_eq!(swe.mmax, 18);
        assert_relative_eq!(swe.frequency, 1e9);
    }

    #[test]
    fn test_progress_is_monotonic_and_complete() {
        let p = sided(|theta, _| Complex64::new(theta.cos(), 0.0));
        let seen = std::cell::RefCell::new(Vec::new());
        let params = SweParams {
            nmax: Some(5),
            ..SweParams::default()
        };
        expand(
            &p,
            &params,
            &|f| seen.borrow_mut().push(f),
            &CancellationToken::new(),
        )
        .unwrap();
        let seen = seen.into_inner();
        assert_eq!(seen.len(), 5);
        assert!(seen.windows(2).all(|w| w[0] <= w[1]));
        assert_relative_eq!(*seen.last().unwrap(), 1.0);
    }

    /// Fully normalized `Pbar_n^0(x)`.
    #[allow(clippy::cast_precision_loss)]
    fn zonal(n: usize, x: f64) -> f64 {
        let (mut p0, mut p1) = (1.0, x);
        for k in 1..n {
            let k = k as f64;
            let p2 = ((2.0 * k + 1.0) * x * p1 - k * p0) / (k + 1.0);
            p0 = p1;
            p1 = p2;
        }
        p1 * ((2.0 * n as f64 + 1.0) / 2.0).sqrt()
    }

    #[test]
    fn test_mars_removes_high_order_ripple() {
        let smooth = |theta: f64| 0.5 + theta.cos();
        let p = sided(|theta, _| {
            Complex64::new(smooth(theta) + 0.2 * zonal(40, theta.cos()), 0.0)
        });
        // 1 GHz, 0.1 m: modes up to degree 13 survive.
        assert_eq!(mars_degree(1e9, 0.1), 13);

        let (co, cross) = mars_filter(&p, 0.1).unwrap();
        let mut before = 0.0_f64;
        let mut after = 0.0_f64;
        for ci in 0..p.cuts().len() {
            for (ai, &theta) in p.angles().iter().enumerate() {
                let expected = Complex64::new(smooth(theta.to_radians()), 0.0);
                before = before.max((p.co()[(0, ci, ai)] - expected).norm());
                after = after.max((co[(0, ci, ai)] - expected).norm());
            }
        }
        assert!(before > 1.0, "ripple before filtering: {before}");
        assert!(after < 0.05, "ripple after filtering: {after}");
        assert!(cross.iter().all(|v| v.norm() < 1e-9));
    }

    #[test]
    fn test_mars_with_large_extent_keeps_samples() {
        let p = sided(|theta, phi| Complex64::from_polar(theta.sin(), phi));
        // k * 10 m at 1 GHz is far beyond the 90 degrees the grid resolves.
        let (co, cross) = mars_filter(&p, 10.0).unwrap();
        assert_eq!(&co, p.co());
        assert_eq!(&cross, p.cross());
    }

    #[test]
    fn test_cancelled_token_stops_expansion() {
        let p = sided(|_, _| Complex64::new(1.0, 0.0));
        let cancel = CancellationToken::new();
        cancel.cancel();
        assert_eq!(
            expand(&p, &SweParams::default(), &|_| {}, &cancel),
            Err(AlgebraError::Cancelled)
        );
    }
}
