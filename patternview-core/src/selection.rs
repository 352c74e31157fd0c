//! Selection and view state.
//!
//! [`SelectionState`] is the user's current view of a pattern: which
//! frequencies and cuts are shown, how, and with which statistic. A state
//! is only ever built through validation against a pattern's axes, so its
//! members always exist on the pattern it was validated against.

use std::fmt;

use crate::error::ValidationError;
use crate::pattern::Pattern;
use crate::polarization::Component;

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

/// What subscribers should plot.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
#[cfg_attr(feature = "serde", serde(rename_all = "snake_case"))]
pub enum PlotKind {
    /// Field magnitude in dB.
    #[default]
    Gain,
    /// Field phase in degrees.
    Phase,
    /// Axial ratio in dB.
    AxialRatio,
    /// A statistic of gain across the selected cuts.
    Statistics,
}

impl fmt::Display for PlotKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PlotKind::Gain => write!(f, "gain"),
            PlotKind::Phase => write!(f, "phase"),
            PlotKind::AxialRatio => write!(f, "axial-ratio"),
            PlotKind::Statistics => write!(f, "statistics"),
        }
    }
}

/// Statistic computed across cuts for [`PlotKind::Statistics`].
#[derive(Debug, Clone, Copy, PartialEq, Default)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
#[cfg_attr(feature = "serde", serde(rename_all = "snake_case"))]
pub enum Statistic {
    #[default]
    Mean,
    Median,
    Rms,
    Std,
    /// Band between two percentiles (0–100).
    Percentile { lower: f64, upper: f64 },
}

impl Statistic {
    fn validate(self) -> Result<(), ValidationError> {
        if let Statistic::Percentile { lower, upper } = self {
            let in_range = |v: f64| v.is_finite() && (0.0..=100.0).contains(&v);
            if !in_range(lower) {
                return Err(ValidationError::parameter(
                    "statistic.lower",
                    format!("{lower} is outside [0, 100]"),
                ));
            }
            if !in_range(upper) {
                return Err(ValidationError::parameter(
                    "statistic.upper",
                    format!("{upper} is outside [0, 100]"),
                ));
            }
            if lower > upper {
                return Err(ValidationError::parameter(
                    "statistic.lower",
                    format!("{lower} is above upper percentile {upper}"),
                ));
            }
        }
        Ok(())
    }
}

/// The current selection. Build it with [`SelectionState::default_for`] or
/// [`SelectionState::apply`].
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize))]
pub struct SelectionState {
    frequencies: Vec<f64>,
    cuts: Vec<f64>,
    plot_kind: PlotKind,
    normalize: bool,
    component: Component,
    unwrap_phase: bool,
    statistic: Statistic,
}

impl Default for SelectionState {
    fn default() -> Self {
        Self {
            frequencies: Vec::new(),
            cuts: Vec::new(),
            plot_kind: PlotKind::Gain,
            normalize: false,
            component: Component::Co,
            unwrap_phase: true,
            statistic: Statistic::Mean,
        }
    }
}

impl SelectionState {
    /// Default selection for a freshly loaded pattern: every frequency and
    /// the first cut.
    #[must_use]
    pub fn default_for(pattern: &Pattern) -> Self {
        Self::default().reset_for(pattern)
    }

    /// Keeps the display settings but re-derives the axis selection for a
    /// new pattern.
    #[must_use]
    pub fn reset_for(&self, pattern: &Pattern) -> Self {
        Self {
            frequencies: pattern.frequencies().to_vec(),
            cuts: pattern.cuts().first().copied().into_iter().collect(),
            ..self.clone()
        }
    }

    /// Keeps the display settings and clears the axis selection.
    #[must_use]
    pub fn cleared(&self) -> Self {
        Self {
            frequencies: Vec::new(),
            cuts: Vec::new(),
            ..self.clone()
        }
    }

    /// Selected frequencies (Hz), in axis order.
    #[must_use]
    pub fn frequencies(&self) -> &[f64] {
        &self.frequencies
    }

    /// Selected cuts (deg), in axis order.
    #[must_use]
    pub fn cuts(&self) -> &[f64] {
        &self.cuts
    }

    /// Active plot kind.
    #[must_use]
    pub fn plot_kind(&self) -> PlotKind {
        self.plot_kind
    }

    /// Whether gain is normalized to the per-frequency peak.
    #[must_use]
    pub fn normalize(&self) -> bool {
        self.normalize
    }

    /// Component shown by gain, phase and statistics plots.
    #[must_use]
    pub fn component(&self) -> Component {
        self.component
    }

    /// Whether phase plots are unwrapped along theta.
    #[must_use]
    pub fn unwrap_phase(&self) -> bool {
        self.unwrap_phase
    }

    /// Statistic used by statistics plots.
    #[must_use]
    pub fn statistic(&self) -> Statistic {
        self.statistic
    }

    /// Returns true when nothing can be plotted.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.frequencies.is_empty() || self.cuts.is_empty()
    }

    /// Returns true if every selected value exists on `pattern`'s axes.
    #[must_use]
    pub fn is_valid_for(&self, pattern: &Pattern) -> bool {
        self.frequencies
            .iter()
            .all(|&f| pattern.frequency_index(f).is_some())
            && self.cuts.iter().all(|&c| pattern.cut_index(c).is_some())
    }

    /// Validates `update` and returns the state it produces. `self` is left
    /// untouched, so a rejected update changes nothing.
    ///
    /// # Errors
    ///
    /// Returns a [`ValidationError`] if a requested frequency or cut is not
    /// on the pattern's axes, the frequency list is empty while a pattern is
    /// loaded, axis values are requested without a pattern, or the statistic
    /// parameters are out of range.
    pub fn apply(
        &self,
        update: &SelectionUpdate,
        pattern: Option<&Pattern>,
    ) -> Result<Self, ValidationError> {
        let mut next = self.clone();

        if let Some(requested) = &update.frequencies {
            let pattern = pattern.ok_or(ValidationError::NoPattern)?;
            if requested.is_empty() {
                return Err(ValidationError::EmptyFrequencySelection);
            }
            next.frequencies = resolve(requested, pattern.frequencies(), |f| {
                pattern
                    .frequency_index(f)
                    .ok_or(ValidationError::UnknownFrequency(f))
            })?;
        }

        if let Some(requested) = &update.cuts {
            let pattern = pattern.ok_or(ValidationError::NoPattern)?;
            next.cuts = resolve(requested, pattern.cuts(), |c| {
                pattern.cut_index(c).ok_or(ValidationError::UnknownCut(c))
            })?;
        }

        if let Some(statistic) = update.statistic {
            statistic.validate()?;
            next.statistic = statistic;
        }
        if let Some(kind) = update.plot_kind {
            next.plot_kind = kind;
        }
        if let Some(normalize) = update.normalize {
            next.normalize = normalize;
        }
        if let Some(component) = update.component {
            next.component = component;
        }
        if let Some(unwrap) = update.unwrap_phase {
            next.unwrap_phase = unwrap;
        }

        Ok(next)
    }
}

/// Maps requested values to canonical axis values, deduplicated and in axis
/// order.
fn resolve(
    requested: &[f64],
    axis: &[f64],
    index_of: impl Fn(f64) -> Result<usize, ValidationError>,
) -> Result<Vec<f64>, ValidationError> {
    let mut indices = requested
        .iter()
        .map(|&v| index_of(v))
        .collect::<Result<Vec<_>, _>>()?;
    indices.sort_unstable();
    indices.dedup();
    Ok(indices.into_iter().map(|i| axis[i]).collect())
}

/// A partial selection change. Unset fields keep their current value.
#[derive(Debug, Clone, Default, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
#[cfg_attr(feature = "serde", serde(default))]
pub struct SelectionUpdate {
    pub frequencies: Option<Vec<f64>>,
    pub cuts: Option<Vec<f64>>,
    pub plot_kind: Option<PlotKind>,
    pub normalize: Option<bool>,
    pub component: Option<Component>,
    pub unwrap_phase: Option<bool>,
    pub statistic: Option<Statistic>,
}

impl SelectionUpdate {
    /// Creates an empty update.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Selects these frequencies (Hz).
    #[must_use]
    pub fn with_frequencies(mut self, frequencies: impl Into<Vec<f64>>) -> Self {
        self.frequencies = Some(frequencies.into());
        self
    }

    /// Selects these cuts (deg).
    #[must_use]
    pub fn with_cuts(mut self, cuts: impl Into<Vec<f64>>) -> Self {
        self.cuts = Some(cuts.into());
        self
    }

    /// Sets the plot kind.
    #[must_use]
    pub fn with_plot_kind(mut self, kind: PlotKind) -> Self {
        self.plot_kind = Some(kind);
        self
    }

    /// Sets the normalization flag.
    #[must_use]
    pub fn with_normalize(mut self, normalize: bool) -> Self {
        self.normalize = Some(normalize);
        self
    }

    /// Sets the displayed component.
    #[must_use]
    pub fn with_component(mut self, component: Component) -> Self {
        self.component = Some(component);
        self
    }

    /// Sets phase unwrapping.
    #[must_use]
    pub fn with_unwrap_phase(mut self, unwrap: bool) -> Self {
        self.unwrap_phase = Some(unwrap);
        self
    }

    /// Sets the statistic.
    #[must_use]
    pub fn with_statistic(mut self, statistic: Statistic) -> Self {
        self.statistic = Some(statistic);
        self
    }
}
