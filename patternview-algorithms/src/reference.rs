//! Built-in implementation of [`PatternAlgebra`].

use ndarray::{Array3, Axis};
use num_complex::Complex64;
use patternview_core::pattern::{axis_value_eq, direction, wavenumber};
use patternview_core::polarization::axial_ratio_db;
use patternview_core::view::unwrap;
use patternview_core::{CoordinateFormat, FieldUnit, NormalizationReference, Pattern, Polarization};

use crate::algebra::PatternAlgebra;
use crate::analysis::{
    AxialRatioSummary, DirectivitySummary, NearField, NearFieldSurface, PhaseCenterEstimate,
    SphericalWaveExpansion, SweParams,
};
use crate::cancel::CancellationToken;
use crate::error::AlgebraError;
use crate::{coordinates, nearfield, spherical};

/// Configuration for [`ReferenceAlgebra`].
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ReferenceConfig {
    /// Samples weaker than this (dB relative to the cut's strongest sample)
    /// are left out of the phase center fit.
    pub phase_fit_floor_db: f64,
    /// Relative pivot size below which the phase center system is treated
    /// as singular.
    pub pivot_tolerance: f64,
}

impl Default for ReferenceConfig {
    fn default() -> Self {
        Self {
            phase_fit_floor_db: -60.0,
            pivot_tolerance: 1e-12,
        }
    }
}

impl ReferenceConfig {
    /// Sets the phase fit floor.
    #[must_use]
    pub fn with_phase_fit_floor_db(mut self, floor_db: f64) -> Self {
        self.phase_fit_floor_db = floor_db;
        self
    }

    /// Sets the pivot tolerance.
    #[must_use]
    pub fn with_pivot_tolerance(mut self, tolerance: f64) -> Self {
        self.pivot_tolerance = tolerance;
        self
    }
}

/// The default numerical back end.
#[derive(Debug, Clone, Copy, Default)]
pub struct ReferenceAlgebra {
    config: ReferenceConfig,
}

impl ReferenceAlgebra {
    /// Creates an algebra with default settings.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates an algebra with explicit settings.
    #[must_use]
    pub fn with_config(config: ReferenceConfig) -> Self {
        Self { config }
    }

    /// Current settings.
    #[must_use]
    pub fn config(&self) -> &ReferenceConfig {
        &self.config
    }
}

/// Rebuilds `pattern` with new samples, keeping axes, basis and unit.
pub(crate) fn with_samples(
    pattern: &Pattern,
    co: Array3<Complex64>,
    cross: Array3<Complex64>,
) -> Result<Pattern, AlgebraError> {
    Ok(Pattern::new(
        pattern.frequencies().to_vec(),
        pattern.cuts().to_vec(),
        pattern.angles().to_vec(),
        pattern.polarization(),
        co,
        cross,
    )?
    .with_unit(pattern.unit()))
}

/// Trapezoid integration weights (radians) for a sorted angle axis.
pub(crate) fn trapezoid_weights(angles_deg: &[f64]) -> Vec<f64> {
    let n = angles_deg.len();
    if n < 2 {
        return vec![0.0; n];
    }
    (0..n)
        .map(|i| {
            let lo = angles_deg[i.saturating_sub(1)];
            let hi = angles_deg[(i + 1).min(n - 1)];
            (hi - lo).to_radians() / 2.0
        })
        .collect()
}

/// Wraps `phi` into `(-180, 180]` when `signed`, else into `[0, 360)`.
pub(crate) fn wrap_phi(phi: f64, signed: bool) -> f64 {
    if signed {
        let wrapped = (phi + 180.0).rem_euclid(360.0) - 180.0;
        if wrapped <= -180.0 {
            wrapped + 360.0
        } else {
            wrapped
        }
    } else {
        let wrapped = phi.rem_euclid(360.0);
        if wrapped >= 360.0 {
            0.0
        } else {
            wrapped
        }
    }
}

impl PatternAlgebra for ReferenceAlgebra {
    fn translate_phase_center(
        &self,
        pattern: &Pattern,
        offset: [f64; 3],
    ) -> Result<Pattern, AlgebraError> {
        let mut co = pattern.co().clone();
        let mut cross = pattern.cross().clone();
        for (fi, &freq) in pattern.frequencies().iter().enumerate() {
            let k = wavenumber(freq);
            for (ci, &phi) in pattern.cuts().iter().enumerate() {
                for (ai, &theta) in pattern.angles().iter().enumerate() {
                    let r = direction(theta, phi);
                    let path: f64 = r.iter().zip(&offset).map(|(a, b)| a * b).sum();
                    let shift = Complex64::from_polar(1.0, -k * path);
                    co[(fi, ci, ai)] *= shift;
                    cross[(fi, ci, ai)] *= shift;
                }
            }
        }
        with_samples(pattern, co, cross)
    }

    fn convert_polarization(
        &self,
        pattern: &Pattern,
        polarization: Polarization,
    ) -> Result<Pattern, AlgebraError> {
        let source = pattern.polarization();
        let mut co = Array3::zeros(pattern.shape());
        let mut cross = Array3::zeros(pattern.shape());
        for ((fi, ci, ai), &a) in pattern.co().indexed_iter() {
            let phi = pattern.cuts()[ci].to_radians();
            let b = pattern.cross()[(fi, ci, ai)];
            let (e_theta, e_phi) = source.to_theta_phi(a, b, phi);
            let (new_co, new_cross) = polarization.from_theta_phi(e_theta, e_phi, phi);
            co[(fi, ci, ai)] = new_co;
            cross[(fi, ci, ai)] = new_cross;
        }
        Ok(Pattern::new(
            pattern.frequencies().to_vec(),
            pattern.cuts().to_vec(),
            pattern.angles().to_vec(),
            polarization,
            co,
            cross,
        )?
        .with_unit(pattern.unit()))
    }

    fn rotate(
        &self,
        pattern: &Pattern,
        theta_offset_deg: f64,
        phi_offset_deg: f64,
    ) -> Result<Pattern, AlgebraError> {
        let signed = pattern.cuts().iter().any(|&c| c < 0.0);
        let mut order: Vec<(f64, usize)> = pattern
            .cuts()
            .iter()
            .enumerate()
            .map(|(i, &c)| (wrap_phi(c + phi_offset_deg, signed), i))
            .collect();
        order.sort_by(|a, b| a.0.total_cmp(&b.0));
        if let Some(w) = order.windows(2).find(|w| axis_value_eq(w[0].0, w[1].0)) {
            return Err(AlgebraError::MalformedInput(format!(
                "rotation maps two cuts onto phi = {} deg",
                w[0].0
            )));
        }

        let pol = pattern.polarization();
        let mut co = Array3::zeros(pattern.shape());
        let mut cross = Array3::zeros(pattern.shape());
        for fi in 0..pattern.frequencies().len() {
            for (new_ci, &(new_phi, old_ci)) in order.iter().enumerate() {
                let old_rad = pattern.cuts()[old_ci].to_radians();
                let new_rad = new_phi.to_radians();
                for ai in 0..pattern.angles().len() {
                    let (e_theta, e_phi) = pol.to_theta_phi(
                        pattern.co()[(fi, old_ci, ai)],
                        pattern.cross()[(fi, old_ci, ai)],
                        old_rad,
                    );
                    let (a, b) = pol.from_theta_phi(e_theta, e_phi, new_rad);
                    co[(fi, new_ci, ai)] = a;
                    cross[(fi, new_ci, ai)] = b;
                }
            }
        }

        Ok(Pattern::new(
            pattern.frequencies().to_vec(),
            order.iter().map(|&(phi, _)| phi).collect(),
            pattern
                .angles()
                .iter()
                .map(|a| a + theta_offset_deg)
                .collect(),
            pol,
            co,
            cross,
        )?
        .with_unit(pattern.unit()))
    }

    fn scale_amplitude(&self, pattern: &Pattern, factor: f64) -> Result<Pattern, AlgebraError> {
        with_samples(
            pattern,
            pattern.co().mapv(|v| v * factor),
            pattern.cross().mapv(|v| v * factor),
        )
    }

    #[allow(clippy::cast_precision_loss)]
    fn normalize(
        &self,
        pattern: &Pattern,
        reference: NormalizationReference,
    ) -> Result<Pattern, AlgebraError> {
        let mut co = pattern.co().clone();
        let mut cross = pattern.cross().clone();
        let boresight = pattern.boresight_index();
        for (fi, &freq) in pattern.frequencies().iter().enumerate() {
            let plane = pattern.co().index_axis(Axis(0), fi);
            let level = match reference {
                NormalizationReference::Peak => plane.iter().map(|v| v.norm()).fold(0.0, f64::max),
                NormalizationReference::Boresight => plane[(0, boresight)].norm(),
                NormalizationReference::Mean => {
                    plane.iter().map(|v| v.norm()).sum::<f64>() / plane.len() as f64
                }
            };
            if !(level.is_finite() && level > 0.0) {
                return Err(AlgebraError::MalformedInput(format!(
                    "{reference:?} reference level is zero at {freq} Hz"
                )));
            }
            co.index_axis_mut(Axis(0), fi).mapv_inplace(|v| v / level);
            cross.index_axis_mut(Axis(0), fi).mapv_inplace(|v| v / level);
        }
        Ok(with_samples(pattern, co, cross)?.with_unit(FieldUnit::Normalized))
    }

    fn convert_coordinate_format(
        &self,
        pattern: &Pattern,
        target: CoordinateFormat,
    ) -> Result<Pattern, AlgebraError> {
        coordinates::convert(pattern, target)
    }

    fn apply_mars(
        &self,
        pattern: &Pattern,
        max_radial_extent: f64,
    ) -> Result<Pattern, AlgebraError> {
        let (co, cross) = spherical::mars_filter(pattern, max_radial_extent)?;
        with_samples(pattern, co, cross)
    }

    fn compute_phase_center(
        &self,
        pattern: &Pattern,
        frequency: f64,
        theta_limit_deg: f64,
    ) -> Result<PhaseCenterEstimate, AlgebraError> {
        let fi = pattern.frequency_index(frequency).ok_or_else(|| {
            AlgebraError::MalformedInput(format!("{frequency} Hz is not on the frequency axis"))
        })?;
        fit_phase_center(pattern, fi, theta_limit_deg, &self.config)
    }

    #[allow(clippy::cast_precision_loss)]
    fn compute_directivity(
        &self,
        pattern: &Pattern,
    ) -> Result<Vec<DirectivitySummary>, AlgebraError> {
        let theta_w = trapezoid_weights(pattern.angles());
        let weights: Vec<f64> = pattern
            .angles()
            .iter()
            .zip(&theta_w)
            .map(|(t, w)| t.to_radians().sin().abs() * w)
            .collect();
        let total_weight = weights.iter().sum::<f64>() * pattern.cuts().len() as f64;

        pattern
            .frequencies()
            .iter()
            .enumerate()
            .map(|(fi, &frequency)| {
                let mut weighted = 0.0;
                let mut peak = (0.0, 0, 0);
                for ci in 0..pattern.cuts().len() {
                    for (ai, w) in weights.iter().enumerate() {
                        let p = pattern.co()[(fi, ci, ai)].norm_sqr()
                            + pattern.cross()[(fi, ci, ai)].norm_sqr();
                        weighted += p * w;
                        if p > peak.0 {
                            peak = (p, ci, ai);
                        }
                    }
                }
                if !(weighted > 0.0 && total_weight > 0.0) {
                    return Err(AlgebraError::MalformedInput(format!(
                        "no radiated power to integrate at {frequency} Hz"
                    )));
                }
                let directivity = peak.0 * total_weight / weighted;
                Ok(DirectivitySummary {
                    frequency,
                    directivity_dbi: 10.0 * directivity.log10(),
                    peak_theta_deg: pattern.angles()[peak.2],
                    peak_phi_deg: pattern.cuts()[peak.1],
                })
            })
            .collect()
    }

    fn compute_axial_ratio(
        &self,
        pattern: &Pattern,
    ) -> Result<Vec<AxialRatioSummary>, AlgebraError> {
        let pol = pattern.polarization();
        let boresight = pattern.boresight_index();
        let summaries = pattern
            .frequencies()
            .iter()
            .enumerate()
            .map(|(fi, &frequency)| {
                let mut min_db = f64::INFINITY;
                let mut max_db = f64::NEG_INFINITY;
                let mut boresight_db = 0.0;
                for (ci, &phi) in pattern.cuts().iter().enumerate() {
                    for ai in 0..pattern.angles().len() {
                        let (r, l) = pol.circular_components(
                            pattern.co()[(fi, ci, ai)],
                            pattern.cross()[(fi, ci, ai)],
                            phi.to_radians(),
                        );
                        let ar = axial_ratio_db(r, l);
                        min_db = min_db.min(ar);
                        max_db = max_db.max(ar);
                        if ci == 0 && ai == boresight {
                            boresight_db = ar;
                        }
                    }
                }
                AxialRatioSummary {
                    frequency,
                    boresight_db,
                    min_db,
                    max_db,
                }
            })
            .collect();
        Ok(summaries)
    }

    fn compute_spherical_wave_expansion(
        &self,
        pattern: &Pattern,
        params: &SweParams,
        progress: &dyn Fn(f32),
        cancel: &CancellationToken,
    ) -> Result<SphericalWaveExpansion, AlgebraError> {
        spherical::expand(pattern, params, progress, cancel)
    }

    fn compute_near_field(
        &self,
        pattern: &Pattern,
        params: &SweParams,
        surface: &NearFieldSurface,
        progress: &dyn Fn(f32),
        cancel: &CancellationToken,
    ) -> Result<NearField, AlgebraError> {
        nearfield::synthesize(pattern, params, surface, progress, cancel)
    }
}

/// Least-squares fit of `phase = k * r.p + c_cut` over every selected cut.
///
/// Unknowns are the three position components plus one phase constant per
/// cut, which absorbs the arbitrary 2*pi offset left by unwrapping.
#[allow(clippy::cast_precision_loss)]
fn fit_phase_center(
    pattern: &Pattern,
    fi: usize,
    theta_limit_deg: f64,
    config: &ReferenceConfig,
) -> Result<PhaseCenterEstimate, AlgebraError> {
    let frequency = pattern.frequencies()[fi];
    let k = wavenumber(frequency);
    let floor = 10f64.powf(config.phase_fit_floor_db / 20.0);

    // (cut slot, direction, unwrapped phase)
    let mut rows: Vec<(usize, [f64; 3], f64)> = Vec::new();
    let mut slots = 0;
    for (ci, &phi) in pattern.cuts().iter().enumerate() {
        let window: Vec<usize> = pattern
            .angles()
            .iter()
            .enumerate()
            .filter(|(_, t)| t.abs() <= theta_limit_deg)
            .map(|(ai, _)| ai)
            .collect();
        let power = |data: &Array3<Complex64>| -> f64 {
            window.iter().map(|&ai| data[(fi, ci, ai)].norm_sqr()).sum()
        };
        let data = if power(pattern.co()) >= power(pattern.cross()) {
            pattern.co()
        } else {
            pattern.cross()
        };
        let peak = window
            .iter()
            .map(|&ai| data[(fi, ci, ai)].norm())
            .fold(0.0, f64::max);
        let used: Vec<usize> = window
            .into_iter()
            .filter(|&ai| peak > 0.0 && data[(fi, ci, ai)].norm() >= peak * floor)
            .collect();
        if used.len() < 2 {
            continue;
        }
        let raw: Vec<f64> = used.iter().map(|&ai| data[(fi, ci, ai)].arg()).collect();
        for (&ai, phase) in used.iter().zip(unwrap(&raw)) {
            rows.push((slots, direction(pattern.angles()[ai], phi), phase));
        }
        slots += 1;
    }

    // Position components with no angular variation cannot be observed.
    let observable: Vec<usize> = (0..3)
        .filter(|&axis| {
            let energy: f64 = rows.iter().map(|(_, r, _)| r[axis] * r[axis]).sum();
            energy > 1e-9 * rows.len() as f64
        })
        .collect();

    let unknowns = observable.len() + slots;
    if slots == 0 || rows.len() <= unknowns {
        return Err(AlgebraError::MalformedInput(format!(
            "{} usable samples within {theta_limit_deg} deg are too few for a phase center fit",
            rows.len()
        )));
    }

    let design_row = |slot: usize, r: &[f64; 3]| -> Vec<f64> {
        let mut row = vec![0.0; unknowns];
        for (j, &axis) in observable.iter().enumerate() {
            row[j] = k * r[axis];
        }
        row[observable.len() + slot] = 1.0;
        row
    };

    let mut normal = vec![vec![0.0; unknowns]; unknowns];
    let mut rhs = vec![0.0; unknowns];
    for (slot, r, phase) in &rows {
        let row = design_row(*slot, r);
        for i in 0..unknowns {
            rhs[i] += row[i] * phase;
            for j in 0..unknowns {
                normal[i][j] += row[i] * row[j];
            }
        }
    }
    let solution = solve(normal, rhs, config.pivot_tolerance)?;

    let mut position = [0.0; 3];
    for (j, &axis) in observable.iter().enumerate() {
        position[axis] = solution[j];
    }

    let sum_sq: f64 = rows
        .iter()
        .map(|(slot, r, phase)| {
            let model: f64 = design_row(*slot, r)
                .iter()
                .zip(&solution)
                .map(|(a, x)| a * x)
                .sum();
            (phase - model).powi(2)
        })
        .sum();

    Ok(PhaseCenterEstimate {
        frequency,
        position,
        rms_residual_deg: (sum_sq / rows.len() as f64).sqrt().to_degrees(),
        samples: rows.len(),
    })
}

/// Gaussian elimination with partial pivoting.
fn solve(mut a: Vec<Vec<f64>>, mut b: Vec<f64>, tolerance: f64) -> Result<Vec<f64>, AlgebraError> {
    let n = b.len();
    let scale = a
        .iter()
        .enumerate()
        .map(|(i, row)| row[i].abs())
        .fold(0.0, f64::max)
        .max(f64::MIN_POSITIVE);

    for col in 0..n {
        let pivot = (col..n)
            .max_by(|&i, &j| a[i][col].abs().total_cmp(&a[j][col].abs()))
            .unwrap_or(col);
        if a[pivot][col].abs() <= tolerance * scale {
            return Err(AlgebraError::NonConvergence(
                "phase center system is singular".into(),
            ));
        }
        a.swap(col, pivot);
        b.swap(col, pivot);
        for row in col + 1..n {
            let factor = a[row][col] / a[col][col];
            if factor == 0.0 {
                continue;
            }
            for c in col..n {
                a[row][c] -= factor * a[col][c];
            }
            b[row] -= factor * b[col];
        }
    }

    let mut x = vec![0.0; n];
    for row in (0..n).rev() {
        let tail: f64 = (row + 1..n).map(|c| a[row][c] * x[c]).sum();
        x[row] = (b[row] - tail) / a[row][row];
    }
    Ok(x)
}
