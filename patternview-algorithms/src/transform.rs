//! Applying transforms with provenance.

use std::sync::Arc;

use patternview_core::{PatternValue, Provenance, Transform};

use crate::algebra::PatternAlgebra;
use crate::error::TransformError;
use crate::reference::ReferenceAlgebra;

/// Validates a [`Transform`], dispatches it to a [`PatternAlgebra`] and
/// records where the result came from.
#[derive(Clone)]
pub struct TransformPipeline {
    algebra: Arc<dyn PatternAlgebra>,
}

impl std::fmt::Debug for TransformPipeline {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TransformPipeline").finish_non_exhaustive()
    }
}

impl Default for TransformPipeline {
    fn default() -> Self {
        Self::reference()
    }
}

impl TransformPipeline {
    /// Creates a pipeline over `algebra`.
    #[must_use]
    pub fn new(algebra: Arc<dyn PatternAlgebra>) -> Self {
        Self { algebra }
    }

    /// Creates a pipeline over [`ReferenceAlgebra`].
    #[must_use]
    pub fn reference() -> Self {
        Self::new(Arc::new(ReferenceAlgebra::new()))
    }

    /// The algebra transforms are dispatched to.
    #[must_use]
    pub fn algebra(&self) -> &Arc<dyn PatternAlgebra> {
        &self.algebra
    }

    /// Applies `transform` to `input`, producing a new value whose
    /// provenance points back at `input`.
    ///
    /// The algebra is not invoked when validation fails. `input` is never
    /// modified.
    ///
    /// # Errors
    ///
    /// [`TransformError::Validation`] for rejected parameters,
    /// [`TransformError::Algebra`] when the computation fails.
    pub fn apply(
        &self,
        transform: &Transform,
        input: &PatternValue,
    ) -> Result<PatternValue, TransformError> {
        transform.validate()?;
        let algebra = self.algebra.as_ref();
        let output = match *transform {
            Transform::TranslatePhaseCenter { offset } => {
                algebra.translate_phase_center(input, offset)?
            }
            Transform::ConvertPolarization { polarization } => {
                algebra.convert_polarization(input, polarization)?
            }
            Transform::Rotate {
                theta_offset_deg,
                phi_offset_deg,
            } => algebra.rotate(input, theta_offset_deg, phi_offset_deg)?,
            Transform::ScaleAmplitude { factor } => algebra.scale_amplitude(input, factor)?,
            Transform::Normalize { reference } => algebra.normalize(input, reference)?,
            Transform::ConvertCoordinateFormat { target } => {
                algebra.convert_coordinate_format(input, target)?
            }
            Transform::Mars { max_radial_extent } => algebra.apply_mars(input, max_radial_extent)?,
        };
        Ok(PatternValue::new(output.with_provenance(
            Provenance::Derived {
                transform: transform.clone(),
                parent: input.clone(),
            },
        )))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use patternview_core::synthetic::SyntheticPattern;

    #[test]
    fn test_provenance_records_parent() {
        let input = PatternValue::new(SyntheticPattern::new(vec![1e9], vec![0.0]).build());
        let t = Transform::ScaleAmplitude { factor: 3.0 };
        let out = TransformPipeline::reference().apply(&t, &input).unwrap();
        match out.provenance() {
            Provenance::Derived { transform, parent } => {
                assert_eq!(transform, &t);
                assert!(PatternValue::ptr_eq(parent, &input));
            }
            other => panic!("unexpected provenance {other:?}"),
        }
        assert!(!PatternValue::ptr_eq(&out, &input));
    }

    #[test]
    fn test_invalid_parameters_rejected() {
        let input = PatternValue::new(SyntheticPattern::new(vec![1e9], vec![0.0]).build());
        let err = TransformPipeline::reference()
            .apply(&Transform::ScaleAmplitude { factor: 0.0 }, &input)
            .unwrap_err();
        assert!(matches!(err, TransformError::Validation(_)));
    }
}
