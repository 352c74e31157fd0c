//! Conversion between the central and sided cut layouts.
//!
//! A central sample at `(-theta, phi)` looks in the same direction as a
//! sided sample at `(theta, phi + 180)`, where both spherical unit vectors
//! point the other way. Moving a sample between the two therefore negates
//! `E_theta` and `E_phi` before it is re-expressed in the pattern's basis.

use ndarray::Array3;
use patternview_core::pattern::axis_value_eq;
use patternview_core::{CoordinateFormat, Pattern};

use crate::error::AlgebraError;
use crate::reference::{with_samples, wrap_phi};

/// Where an output sample is read from.
#[derive(Debug, Clone, Copy)]
struct Source {
    cut: usize,
    angle: usize,
    /// Sample seen from the opposite half-plane.
    flip: bool,
}

/// Output axes with one source per output sample, cut-major.
struct Layout {
    cuts: Vec<f64>,
    angles: Vec<f64>,
    sources: Vec<Vec<Source>>,
}

/// Re-samples `pattern` in the `target` layout. A pattern already in that
/// layout is returned unchanged.
pub(crate) fn convert(
    pattern: &Pattern,
    target: CoordinateFormat,
) -> Result<Pattern, AlgebraError> {
    let layout = match (pattern.coordinate_format(), target) {
        (CoordinateFormat::Central, CoordinateFormat::Sided) => central_to_sided(pattern)?,
        (CoordinateFormat::Sided, CoordinateFormat::Central) => sided_to_central(pattern)?,
        _ => return with_samples(pattern, pattern.co().clone(), pattern.cross().clone()),
    };
    resample(pattern, layout)
}

fn central_to_sided(pattern: &Pattern) -> Result<Layout, AlgebraError> {
    let angles = pattern.angles();
    let positive: Vec<usize> = (0..angles.len()).filter(|&i| angles[i] >= 0.0).collect();
    let negatives = angles.len() - positive.len();

    // Index of -theta for every theta >= 0; boresight mirrors onto itself.
    let mut mirror = Vec::with_capacity(positive.len());
    let mut mirrored = 0;
    for &ai in &positive {
        let theta = angles[ai];
        if axis_value_eq(theta, 0.0) {
            mirror.push(ai);
            continue;
        }
        let opposite = angles
            .iter()
            .position(|&a| axis_value_eq(a, -theta))
            .ok_or_else(|| asymmetric(theta))?;
        mirror.push(opposite);
        mirrored += 1;
    }
    if mirrored != negatives {
        return Err(AlgebraError::MalformedInput(
            "theta axis has negative samples without a positive mirror".into(),
        ));
    }

    let mut cuts: Vec<(f64, usize, bool)> = pattern
        .cuts()
        .iter()
        .enumerate()
        .flat_map(|(ci, &phi)| {
            [
                (wrap_phi(phi, false), ci, false),
                (wrap_phi(phi + 180.0, false), ci, true),
            ]
        })
        .collect();
    cuts.sort_by(|a, b| a.0.total_cmp(&b.0));
    if let Some(w) = cuts.windows(2).find(|w| axis_value_eq(w[0].0, w[1].0)) {
        return Err(AlgebraError::MalformedInput(format!(
            "two half-planes land on phi = {} deg",
            w[0].0
        )));
    }

    let sources = cuts
        .iter()
        .map(|&(_, cut, flip)| {
            positive
                .iter()
                .zip(&mirror)
                .map(|(&ai, &mi)| Source {
                    cut,
                    angle: if flip { mi } else { ai },
                    flip,
                })
                .collect()
        })
        .collect();

    Ok(Layout {
        cuts: cuts.iter().map(|&(phi, _, _)| phi).collect(),
        angles: positive.iter().map(|&ai| angles[ai]).collect(),
        sources,
    })
}

fn sided_to_central(pattern: &Pattern) -> Result<Layout, AlgebraError> {
    let wrapped: Vec<f64> = pattern.cuts().iter().map(|&c| wrap_phi(c, false)).collect();
    let mut lower: Vec<(f64, usize, usize)> = Vec::new();
    for (ci, &phi) in wrapped.iter().enumerate() {
        if phi >= 180.0 || axis_value_eq(phi, 180.0) {
            continue;
        }
        let partner = wrapped
            .iter()
            .position(|&other| axis_value_eq(other, phi + 180.0))
            .ok_or_else(|| {
                AlgebraError::MalformedInput(format!(
                    "cut {phi} deg has no opposite cut at {} deg",
                    phi + 180.0
                ))
            })?;
        lower.push((phi, ci, partner));
    }
    if 2 * lower.len() != wrapped.len() {
        return Err(AlgebraError::MalformedInput(
            "cuts at or above 180 deg need an opposite cut below 180 deg".into(),
        ));
    }
    lower.sort_by(|a, b| a.0.total_cmp(&b.0));

    let angles = pattern.angles();
    let mirrored: Vec<usize> = (0..angles.len())
        .rev()
        .filter(|&ai| !axis_value_eq(angles[ai], 0.0))
        .collect();
    let new_angles = mirrored
        .iter()
        .map(|&ai| -angles[ai])
        .chain(angles.iter().copied())
        .collect();

    let sources = lower
        .iter()
        .map(|&(_, cut, partner)| {
            let negative = mirrored.iter().map(|&angle| Source {
                cut: partner,
                angle,
                flip: true,
            });
            let positive = (0..angles.len()).map(|angle| Source {
                cut,
                angle,
                flip: false,
            });
            negative.chain(positive).collect()
        })
        .collect();

    Ok(Layout {
        cuts: lower.iter().map(|&(phi, _, _)| phi).collect(),
        angles: new_angles,
        sources,
    })
}

fn asymmetric(theta: f64) -> AlgebraError {
    AlgebraError::MalformedInput(format!(
        "theta axis is not symmetric: {theta} deg has no sample at {} deg",
        -theta
    ))
}

fn resample(pattern: &Pattern, layout: Layout) -> Result<Pattern, AlgebraError> {
    let pol = pattern.polarization();
    let shape = (
        pattern.frequencies().len(),
        layout.cuts.len(),
        layout.angles.len(),
    );
    let mut co = Array3::zeros(shape);
    let mut cross = Array3::zeros(shape);
    for fi in 0..shape.0 {
        for (ci, (&phi, row)) in layout.cuts.iter().zip(&layout.sources).enumerate() {
            for (ai, src) in row.iter().enumerate() {
                let a = pattern.co()[(fi, src.cut, src.angle)];
                let b = pattern.cross()[(fi, src.cut, src.angle)];
                let (a, b) = if src.flip {
                    let source_phi = pattern.cuts()[src.cut].to_radians();
                    let (e_theta, e_phi) = pol.to_theta_phi(a, b, source_phi);
                    pol.from_theta_phi(-e_theta, -e_phi, phi.to_radians())
                } else {
                    (a, b)
                };
                co[(fi, ci, ai)] = a;
                cross[(fi, ci, ai)] = b;
            }
        }
    }
    Ok(Pattern::new(
        pattern.frequencies().to_vec(),
        layout.cuts,
        layout.angles,
        pol,
        co,
        cross,
    )?
    .with_unit(pattern.unit()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use patternview_core::synthetic::SyntheticPattern;
    use patternview_core::Polarization;

    fn cuts(step: f64, stop: f64) -> Vec<f64> {
        (0..)
            .map(|i| f64::from(i) * step)
            .take_while(|&c| c < stop)
            .collect()
    }

    fn beam(cuts: Vec<f64>) -> SyntheticPattern {
        SyntheticPattern::new(vec![1e9, 2e9], cuts)
            .with_basis(Polarization::X)
            .with_phase_center([0.02, -0.01, 0.05])
    }

    #[test]
    fn test_central_to_sided_matches_direct_build() {
        let central = beam(cuts(10.0, 180.0)).build();
        assert_eq!(central.coordinate_format(), CoordinateFormat::Central);

        let sided = convert(&central, CoordinateFormat::Sided).unwrap();
        let direct = beam(cuts(10.0, 360.0))
            .with_theta_grid(0.0, 180.0, 5.0)
            .build();
        assert_eq!(sided.coordinate_format(), CoordinateFormat::Sided);
        assert_eq!(sided.cuts(), direct.cuts());
        let diff = sided.max_abs_difference(&direct).unwrap();
        assert!(diff < 1e-12, "difference {diff}");
    }

    #[test]
    fn test_theta_basis_flips_sign_across_boresight() {
        let central = beam(vec![0.0])
            .with_basis(Polarization::Theta)
            .with_angles(vec![-10.0, 0.0, 10.0])
            .build();
        let sided = convert(&central, CoordinateFormat::Sided).unwrap();
        assert_eq!(sided.cuts(), &[0.0, 180.0]);
        assert_eq!(sided.angles(), &[0.0, 10.0]);
        // (10, 180) is read from (-10, 0).
        assert_eq!(sided.co()[(0, 1, 1)], -central.co()[(0, 0, 0)]);
        assert_eq!(sided.co()[(0, 0, 1)], central.co()[(0, 0, 2)]);
    }

    #[test]
    fn test_round_trip_restores_central_layout() {
        let central = beam(cuts(30.0, 180.0)).build();
        let sided = convert(&central, CoordinateFormat::Sided).unwrap();
        let back = convert(&sided, CoordinateFormat::Central).unwrap();
        assert_eq!(back.cuts(), central.cuts());
        assert_eq!(back.angles(), central.angles());
        let diff = back.max_abs_difference(&central).unwrap();
        assert!(diff < 1e-12, "difference {diff}");
    }

    #[test]
    fn test_same_layout_is_unchanged() {
        let central = beam(vec![0.0, 90.0]).build();
        let same = convert(&central, CoordinateFormat::Central).unwrap();
        assert_eq!(same.max_abs_difference(&central), Some(0.0));
    }

    #[test]
    fn test_asymmetric_theta_axis_rejected() {
        let central = beam(vec![0.0])
            .with_angles(vec![-10.0, 0.0, 5.0, 10.0])
            .build();
        assert!(matches!(
            convert(&central, CoordinateFormat::Sided),
            Err(AlgebraError::MalformedInput(_))
        ));

        let lopsided = beam(vec![0.0])
            .with_angles(vec![-20.0, -10.0, 0.0, 10.0])
            .build();
        assert!(matches!(
            convert(&lopsided, CoordinateFormat::Sided),
            Err(AlgebraError::MalformedInput(_))
        ));
    }

    #[test]
    fn test_sided_cut_without_opposite_rejected() {
        let sided = beam(vec![0.0, 90.0, 180.0])
            .with_theta_grid(0.0, 180.0, 10.0)
            .build();
        assert!(matches!(
            convert(&sided, CoordinateFormat::Central),
            Err(AlgebraError::MalformedInput(_))
        ));
    }

    #[test]
    fn test_central_cuts_colliding_after_wrap_rejected() {
        let central = beam(vec![0.0, 180.0]).build();
        assert!(matches!(
            convert(&central, CoordinateFormat::Sided),
            Err(AlgebraError::MalformedInput(_))
        ));
    }
}
