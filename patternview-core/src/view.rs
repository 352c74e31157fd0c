//! Derived view queries.
//!
//! Pure functions from (pattern, selection) to the slices plots and tables
//! draw. Nothing here is cached: callers re-run [`query`] whenever they are
//! told the model changed.

use crate::pattern::Pattern;
use crate::polarization::{axial_ratio_db, Component};
use crate::selection::{PlotKind, SelectionState, Statistic};

#[cfg(feature = "serde")]
use serde::Serialize;

/// Smallest magnitude converted to dB; avoids `-inf` for exact zeros.
const MIN_MAGNITUDE: f64 = 1e-15;

/// One curve: values over theta for a single (frequency, cut).
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize))]
pub struct Trace {
    pub frequency: f64,
    pub cut: f64,
    pub angles: Vec<f64>,
    pub values: Vec<f64>,
}

/// A statistic over the selected cuts for one frequency.
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize))]
pub struct StatisticsTrace {
    pub frequency: f64,
    pub statistic: Statistic,
    pub angles: Vec<f64>,
    /// Central value (the median for percentile bands).
    pub values: Vec<f64>,
    /// Lower and upper curves for [`Statistic::Percentile`].
    pub band: Option<(Vec<f64>, Vec<f64>)>,
}

/// Result of a view query.
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize))]
pub enum ViewData {
    /// Nothing to show: no pattern, or no frequency or cut selected.
    Empty,
    /// Per-cut curves for gain, phase or axial ratio.
    Traces { kind: PlotKind, traces: Vec<Trace> },
    /// Statistics across cuts.
    Statistics(Vec<StatisticsTrace>),
}

impl ViewData {
    /// Returns true for [`ViewData::Empty`].
    #[must_use]
    pub fn is_empty(&self) -> bool {
        matches!(self, ViewData::Empty)
    }
}

/// Field magnitude in dB.
#[must_use]
pub fn magnitude_db(magnitude: f64) -> f64 {
    20.0 * magnitude.max(MIN_MAGNITUDE).log10()
}

/// Computes the view for `selection` over `pattern`.
///
/// Selected values that are not on the pattern's axes are skipped, so a
/// stale selection yields fewer curves rather than a failure.
#[must_use]
pub fn query(pattern: Option<&Pattern>, selection: &SelectionState) -> ViewData {
    let Some(pattern) = pattern else {
        return ViewData::Empty;
    };
    let freqs: Vec<usize> = selection
        .frequencies()
        .iter()
        .filter_map(|&f| pattern.frequency_index(f))
        .collect();
    let cuts: Vec<usize> = selection
        .cuts()
        .iter()
        .filter_map(|&c| pattern.cut_index(c))
        .collect();
    if freqs.is_empty() || cuts.is_empty() {
        return ViewData::Empty;
    }

    match selection.plot_kind() {
        PlotKind::Statistics => ViewData::Statistics(
            freqs
                .iter()
                .map(|&fi| statistics_trace(pattern, selection, fi, &cuts))
                .collect(),
        ),
        kind => {
            let mut traces = Vec::with_capacity(freqs.len() * cuts.len());
            for &fi in &freqs {
                for &ci in &cuts {
                    let values = match kind {
                        PlotKind::Phase => phase_values(pattern, selection, fi, ci),
                        PlotKind::AxialRatio => axial_ratio_values(pattern, fi, ci),
                        _ => gain_values(pattern, selection, fi, ci),
                    };
                    traces.push(Trace {
                        frequency: pattern.frequencies()[fi],
                        cut: pattern.cuts()[ci],
                        angles: pattern.angles().to_vec(),
                        values,
                    });
                }
            }
            ViewData::Traces { kind, traces }
        }
    }
}

/// Peak co-polar magnitude over every cut and angle of one frequency.
fn peak_co(pattern: &Pattern, fi: usize) -> f64 {
    pattern
        .co()
        .index_axis(ndarray::Axis(0), fi)
        .iter()
        .map(|v| v.norm())
        .fold(0.0, f64::max)
}

fn gain_values(pattern: &Pattern, selection: &SelectionState, fi: usize, ci: usize) -> Vec<f64> {
    let reference = if selection.normalize() {
        magnitude_db(peak_co(pattern, fi))
    } else {
        0.0
    };
    let data = pattern.component(selection.component());
    (0..pattern.angles().len())
        .map(|ai| magnitude_db(data[(fi, ci, ai)].norm()) - reference)
        .collect()
}

fn phase_values(pattern: &Pattern, selection: &SelectionState, fi: usize, ci: usize) -> Vec<f64> {
    let data = pattern.component(selection.component());
    let raw: Vec<f64> = (0..pattern.angles().len())
        .map(|ai| data[(fi, ci, ai)].arg())
        .collect();
    let radians = if selection.unwrap_phase() {
        unwrap(&raw)
    } else {
        raw
    };
    radians.into_iter().map(f64::to_degrees).collect()
}

fn axial_ratio_values(pattern: &Pattern, fi: usize, ci: usize) -> Vec<f64> {
    let phi = pattern.cuts()[ci].to_radians();
    let pol = pattern.polarization();
    (0..pattern.angles().len())
        .map(|ai| {
            let (r, l) = pol.circular_components(
                pattern.co()[(fi, ci, ai)],
                pattern.cross()[(fi, ci, ai)],
                phi,
            );
            axial_ratio_db(r, l)
        })
        .collect()
}

fn statistics_trace(
    pattern: &Pattern,
    selection: &SelectionState,
    fi: usize,
    cuts: &[usize],
) -> StatisticsTrace {
    let per_cut: Vec<Vec<f64>> = cuts
        .iter()
        .map(|&ci| gain_values(pattern, selection, fi, ci))
        .collect();
    let n_angles = pattern.angles().len();
    let statistic = selection.statistic();

    let mut values = Vec::with_capacity(n_angles);
    let mut lower = Vec::new();
    let mut upper = Vec::new();
    let mut column = Vec::with_capacity(cuts.len());
    for ai in 0..n_angles {
        column.clear();
        column.extend(per_cut.iter().map(|v| v[ai]));
        match statistic {
            Statistic::Mean => values.push(mean(&column)),
            Statistic::Median => values.push(percentile(&mut column, 50.0)),
            Statistic::Rms => values.push(mean_square(&column).sqrt()),
            Statistic::Std => {
                let m = mean(&column);
                values.push((mean_square(&column) - m * m).max(0.0).sqrt());
            }
            Statistic::Percentile { lower: lo, upper: hi } => {
                values.push(percentile(&mut column, 50.0));
                lower.push(percentile(&mut column, lo));
                upper.push(percentile(&mut column, hi));
            }
        }
    }

    StatisticsTrace {
        frequency: pattern.frequencies()[fi],
        statistic,
        angles: pattern.angles().to_vec(),
        values,
        band: matches!(statistic, Statistic::Percentile { .. }).then_some((lower, upper)),
    }
}

#[allow(clippy::cast_precision_loss)]
fn mean(values: &[f64]) -> f64 {
    values.iter().sum::<f64>() / values.len() as f64
}

#[allow(clippy::cast_precision_loss)]
fn mean_square(values: &[f64]) -> f64 {
    values.iter().map(|v| v * v).sum::<f64>() / values.len() as f64
}

/// Linear-interpolated percentile (0–100); sorts `values` in place.
#[allow(
    clippy::cast_precision_loss,
    clippy::cast_possible_truncation,
    clippy::cast_sign_loss
)]
fn percentile(values: &mut [f64], p: f64) -> f64 {
    values.sort_by(f64::total_cmp);
    let rank = p / 100.0 * (values.len() - 1) as f64;
    let lo = rank.floor() as usize;
    let hi = rank.ceil() as usize;
    let frac = rank - lo as f64;
    values[lo] + (values[hi] - values[lo]) * frac
}

/// Removes 2π jumps between consecutive phase samples.
#[must_use]
pub fn unwrap(phases: &[f64]) -> Vec<f64> {
    use std::f64::consts::{PI, TAU};
    let mut out = Vec::with_capacity(phases.len());
    let mut offset = 0.0;
    let mut prev: Option<f64> = None;
    for &p in phases {
        if let Some(last) = prev {
            let delta = p - last;
            if delta > PI {
                offset -= TAU * ((delta + PI) / TAU).floor();
            } else if delta < -PI {
                offset += TAU * ((-delta + PI) / TAU).floor();
            }
        }
        out.push(p + offset);
        prev = Some(p);
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::selection::SelectionUpdate;
    use crate::synthetic::SyntheticPattern;
    use approx::assert_relative_eq;

    fn pattern() -> Pattern {
        SyntheticPattern::new(vec![1e9, 2e9], vec![0.0, 45.0, 90.0])
            .with_theta_grid(-90.0, 90.0, 10.0)
            .with_peak(2.0)
            .build()
    }

    #[test]
    fn test_no_pattern_is_empty() {
        assert!(query(None, &SelectionState::default()).is_empty());
    }

    #[test]
    fn test_empty_cut_selection_is_empty() {
        let p = pattern();
        let s = SelectionState::default_for(&p)
            .apply(&SelectionUpdate::new().with_cuts(Vec::new()), Some(&p))
            .unwrap();
        assert_eq!(query(Some(&p), &s), ViewData::Empty);
    }

    #[test]
    fn test_gain_traces_for_selection() {
        let p = pattern();
        let s = SelectionState::default_for(&p);
        let ViewData::Traces { kind, traces } = query(Some(&p), &s) else {
            panic!("expected traces");
        };
        assert_eq!(kind, PlotKind::Gain);
        // Two frequencies x first cut.
        assert_eq!(traces.len(), 2);
        let b = p.boresight_index();
        assert_relative_eq!(traces[0].values[b], magnitude_db(2.0), epsilon = 1e-9);
    }

    #[test]
    fn test_normalized_gain_peaks_at_zero_db() {
        let p = pattern();
        let s = SelectionState::default_for(&p)
            .apply(&SelectionUpdate::new().with_normalize(true), Some(&p))
            .unwrap();
        let ViewData::Traces { traces, .. } = query(Some(&p), &s) else {
            panic!("expected traces");
        };
        let max = traces[0].values.iter().copied().fold(f64::MIN, f64::max);
        assert_relative_eq!(max, 0.0, epsilon = 1e-9);
    }

    #[test]
    fn test_percentile_band() {
        let p = pattern();
        let s = SelectionState::default_for(&p)
            .apply(
                &SelectionUpdate::new()
                    .with_cuts(vec![0.0, 45.0, 90.0])
                    .with_plot_kind(PlotKind::Statistics)
                    .with_statistic(Statistic::Percentile {
                        lower: 0.0,
                        upper: 100.0,
                    }),
                Some(&p),
            )
            .unwrap();
        let ViewData::Statistics(stats) = query(Some(&p), &s) else {
            panic!("expected statistics");
        };
        assert_eq!(stats.len(), 2);
        let (lower, upper) = stats[0].band.as_ref().unwrap();
        for ((lo, mid), hi) in lower.iter().zip(&stats[0].values).zip(upper) {
            assert!(lo <= mid && mid <= hi);
        }
    }

    #[test]
    fn test_unwrap_removes_jumps() {
        let wrapped = [3.0, -3.0, -2.9];
        let unwrapped = unwrap(&wrapped);
        assert_relative_eq!(unwrapped[1], -3.0 + std::f64::consts::TAU, epsilon = 1e-12);
        assert!((unwrapped[2] - unwrapped[1] - 0.1).abs() < 1e-12);
    }

    #[test]
    fn test_percentile_interpolates() {
        let mut v = vec![4.0, 1.0, 3.0, 2.0];
        assert_relative_eq!(percentile(&mut v, 50.0), 2.5);
        assert_relative_eq!(percentile(&mut v, 0.0), 1.0);
        assert_relative_eq!(percentile(&mut v, 100.0), 4.0);
    }
}
