//! Near field synthesis from a spherical mode expansion.
//!
//! Each degree `n` of the far-field expansion is carried to radius `r` by
//! `k h_n^(2)(kr) (-j)^(n+1)`, which tends to `e^{-jkr} / r` far away, so
//! the synthesized field times `r e^{jkr}` approaches the pattern.
//!
//! The surface is processed one row of `u` at a time. Orders of a row are
//! evaluated in parallel and cancellation is checked between rows.

use num_complex::Complex64;
use patternview_core::pattern::wavenumber;
use patternview_core::{Component, Pattern};
use rayon::prelude::*;

use crate::analysis::{NearField, NearFieldSurface, SphericalWaveExpansion, SweParams};
use crate::cancel::CancellationToken;
use crate::error::AlgebraError;
use crate::spherical::{self, signed_orders, Node, OrderState};

/// Coefficients of one component, indexed `n * n + n + m`.
struct ModeTable(Vec<Complex64>);

impl ModeTable {
    fn new(swe: &SphericalWaveExpansion, component: Component) -> Self {
        let mut table = vec![Complex64::new(0.0, 0.0); (swe.nmax + 1) * (swe.nmax + 1)];
        for c in swe.coefficients.iter().filter(|c| c.component == component) {
            if let Some(slot) = table.get_mut(Self::index(c.n, c.m)) {
                *slot = c.value;
            }
        }
        Self(table)
    }

    #[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
    fn index(n: usize, m: i64) -> usize {
        (n * n + n).wrapping_add_signed(m as isize)
    }

    fn get(&self, n: usize, m: i64) -> Complex64 {
        self.0[Self::index(n, m)]
    }
}

/// `k h_n^(2)(kr) (-j)^(n+1)` for `n = 0..=nmax`.
#[allow(clippy::cast_precision_loss)]
fn radial_factors(k: f64, r: f64, nmax: usize) -> Result<Vec<Complex64>, AlgebraError> {
    let x = k * r;
    let too_close = || {
        AlgebraError::MalformedInput(format!(
            "point at {r} m is too close to the origin for degree {nmax}"
        ))
    };
    if !(x.is_finite() && x > 0.0) {
        return Err(too_close());
    }

    // Upward recurrence from h_{-1} = e^{-jx}/x and h_0 = j e^{-jx}/x.
    let outgoing = Complex64::from_polar(1.0 / x, -x);
    let mut prev = outgoing;
    let mut current = Complex64::i() * outgoing;
    let mut rotation = -Complex64::i();
    let mut factors = Vec::with_capacity(nmax + 1);
    for n in 0..=nmax {
        let factor = current * rotation * k;
        if !(factor.re.is_finite() && factor.im.is_finite()) {
            return Err(too_close());
        }
        factors.push(factor);
        let next = current * ((2 * n + 1) as f64 / x) - prev;
        prev = current;
        current = next;
        rotation *= -Complex64::i();
    }
    Ok(factors)
}

/// A surface sample: its direction and distance from the origin.
fn surface_point(surface: &NearFieldSurface, u: f64, v: f64) -> (Node, f64) {
    match *surface {
        NearFieldSurface::Sphere { radius, .. } => {
            (Node::new(u.to_radians(), v.to_radians()), radius)
        }
        NearFieldSurface::Plane { distance, .. } => {
            let rho = u.hypot(v);
            let r = rho.hypot(distance);
            let node = Node {
                cos: distance / r,
                sin: rho / r,
                phi: v.atan2(u),
            };
            (node, r)
        }
    }
}

/// Runs the synthesis. See [`crate::PatternAlgebra::compute_near_field`].
#[allow(clippy::cast_precision_loss)]
pub(crate) fn synthesize(
    pattern: &Pattern,
    params: &SweParams,
    surface: &NearFieldSurface,
    progress: &dyn Fn(f32),
    cancel: &CancellationToken,
) -> Result<NearField, AlgebraError> {
    let swe = spherical::expand(pattern, params, &|f| progress(0.5 * f), cancel)?;
    let k = wavenumber(swe.frequency);
    let co_modes = ModeTable::new(&swe, Component::Co);
    let cross_modes = ModeTable::new(&swe, Component::Cross);

    let (u, v) = surface.axes();
    let mut co = Vec::with_capacity(u.len() * v.len());
    let mut cross = Vec::with_capacity(u.len() * v.len());

    for (row, &ui) in u.iter().enumerate() {
        if cancel.is_cancelled() {
            return Err(AlgebraError::Cancelled);
        }
        let mut nodes = Vec::with_capacity(v.len());
        let mut radial = Vec::with_capacity(v.len());
        for &vj in &v {
            let (node, r) = surface_point(surface, ui, vj);
            nodes.push(node);
            radial.push(radial_factors(k, r, swe.nmax)?);
        }

        let zero = || vec![Complex64::new(0.0, 0.0); nodes.len()];
        let (row_co, row_cross) = (0..=swe.mmax)
            .into_par_iter()
            .map(|m| {
                let mut state = OrderState::new(m);
                let (mut co, mut cross) = (zero(), zero());
                for n in m..=swe.nmax {
                    let legendre = state.legendre(n, &nodes);
                    // Degree 0 is not part of the expansion.
                    if n == 0 {
                        continue;
                    }
                    for order in signed_orders(m) {
                        let (a, b) = (co_modes.get(n, order), cross_modes.get(n, order));
                        for (j, (node, &p)) in nodes.iter().zip(legendre).enumerate() {
                            let y = node.azimuth(order) * p * radial[j][n];
                            co[j] += a * y;
                            cross[j] += b * y;
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
        co.extend(row_co);
        cross.extend(row_cross);
        progress(0.5 + 0.5 * (row + 1) as f32 / u.len() as f32);
    }

    Ok(NearField {
        frequency: swe.frequency,
        surface: *surface,
        nmax: swe.nmax,
        u,
        v,
        co,
        cross,
    })
}
