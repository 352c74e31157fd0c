#![allow(clippy::uninlined_format_args)]
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use approx::assert_relative_eq;
use patternview_algorithms::{
    run_analysis, AlgebraError, AnalysisError, AnalysisOutput, AnalysisRequest, CancellationToken,
    NearFieldSurface, PatternAlgebra, ReferenceAlgebra, SweParams, TransformError,
    TransformPipeline,
};
use patternview_core::synthetic::SyntheticPattern;
use patternview_core::{
    CoordinateFormat, NormalizationReference, Pattern, PatternValue, Polarization, Transform,
    ValidationError,
};

/// Counts calls and otherwise behaves like the reference algebra.
#[derive(Default)]
struct CountingAlgebra {
    calls: AtomicUsize,
    inner: ReferenceAlgebra,
}

impl PatternAlgebra for CountingAlgebra {
    fn scale_amplitude(&self, pattern: &Pattern, factor: f64) -> Result<Pattern, AlgebraError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.inner.scale_amplitude(pattern, factor)
    }

    fn translate_phase_center(
        &self,
        pattern: &Pattern,
        offset: [f64; 3],
    ) -> Result<Pattern, AlgebraError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.inner.translate_phase_center(pattern, offset)
    }
}

fn value() -> PatternValue {
    PatternValue::new(
        SyntheticPattern::new(vec![1e9, 1.5e9], vec![0.0, 45.0, 90.0, 135.0])
            .with_theta_grid(-90.0, 90.0, 3.0)
            .with_phase_center([0.0, 0.0, 0.04])
            .build(),
    )
}

#[test]
fn test_validation_happens_before_algebra() {
    let algebra = Arc::new(CountingAlgebra::default());
    let pipeline = TransformPipeline::new(algebra.clone());
    let input = value();

    let err = pipeline
        .apply(&Transform::ScaleAmplitude { factor: 0.0 }, &input)
        .unwrap_err();
    assert!(matches!(
        err,
        TransformError::Validation(ValidationError::Parameter {
            parameter: "factor",
            ..
        })
    ));
    assert_eq!(algebra.calls.load(Ordering::SeqCst), 0);

    pipeline
        .apply(&Transform::ScaleAmplitude { factor: 2.0 }, &input)
        .unwrap();
    assert_eq!(algebra.calls.load(Ordering::SeqCst), 1);
}

#[test]
fn test_unsupported_operation_is_reported() {
    let pipeline = TransformPipeline::new(Arc::new(CountingAlgebra::default()));
    let err = pipeline
        .apply(
            &Transform::ConvertPolarization {
                polarization: Polarization::Lhcp,
            },
            &value(),
        )
        .unwrap_err();
    assert!(matches!(
        err,
        TransformError::Algebra(AlgebraError::Unsupported(_))
    ));

    let err = pipeline
        .apply(
            &Transform::Mars {
                max_radial_extent: 0.5,
            },
            &value(),
        )
        .unwrap_err();
    assert!(matches!(
        err,
        TransformError::Algebra(AlgebraError::Unsupported("MARS"))
    ));
}

#[test]
fn test_coordinate_format_round_trip() {
    let pipeline = TransformPipeline::reference();
    let input = value();
    assert_eq!(input.coordinate_format(), CoordinateFormat::Central);

    let sided = pipeline
        .apply(
            &Transform::ConvertCoordinateFormat {
                target: CoordinateFormat::Sided,
            },
            &input,
        )
        .unwrap();
    assert_eq!(sided.coordinate_format(), CoordinateFormat::Sided);
    assert_eq!(sided.cuts().len(), 8);
    assert_eq!(sided.angles().len(), 31);

    let back = pipeline
        .apply(
            &Transform::ConvertCoordinateFormat {
                target: CoordinateFormat::Central,
            },
            &sided,
        )
        .unwrap();
    let diff = back.max_abs_difference(&input).unwrap();
    assert!(diff < 1e-12, "round trip error {}", diff);
    assert_eq!(back.history().count(), 2);
}

#[test]
fn test_mars_keeps_modes_a_small_antenna_radiates() {
    let pipeline = TransformPipeline::reference();
    let input = value();
    // At 1 GHz a 10 m sphere excites more degrees than a 3 deg grid resolves.
    let filtered = pipeline
        .apply(
            &Transform::Mars {
                max_radial_extent: 10.0,
            },
            &input,
        )
        .unwrap();
    assert_eq!(filtered.max_abs_difference(&input), Some(0.0));
    assert_eq!(
        filtered.history().next(),
        Some(&Transform::Mars {
            max_radial_extent: 10.0
        })
    );

    let err = pipeline
        .apply(
            &Transform::Mars {
                max_radial_extent: f64::NAN,
            },
            &input,
        )
        .unwrap_err();
    assert!(matches!(err, TransformError::Validation(_)));
}

#[test]
fn test_translation_round_trip() {
    let pipeline = TransformPipeline::reference();
    let input = value();
    let there = Transform::TranslatePhaseCenter {
        offset: [0.03, -0.01, 0.2],
    };
    let moved = pipeline.apply(&there, &input).unwrap();
    let back = pipeline
        .apply(&there.inverse().unwrap(), &moved)
        .unwrap();

    let diff = back.max_abs_difference(&input).unwrap();
    assert!(diff < 1e-12, "round trip error {}", diff);
    assert_eq!(back.history().count(), 2);
    // The input value is untouched.
    assert!(moved.max_abs_difference(&input).unwrap() > 1e-3);
}

#[test]
fn test_translation_moves_phase_center() {
    let pipeline = TransformPipeline::reference();
    let algebra = ReferenceAlgebra::new();
    let moved = pipeline
        .apply(
            &Transform::TranslatePhaseCenter {
                offset: [0.0, 0.0, 0.04],
            },
            &value(),
        )
        .unwrap();
    let estimate = algebra.compute_phase_center(&moved, 1e9, 45.0).unwrap();
    for component in estimate.position {
        assert!(component.abs() < 1e-9, "residual offset {}", component);
    }
}

#[test]
fn test_chained_transforms_record_history() {
    let pipeline = TransformPipeline::reference();
    let steps = [
        Transform::Normalize {
            reference: NormalizationReference::Peak,
        },
        Transform::ConvertPolarization {
            polarization: Polarization::Rhcp,
        },
        Transform::Rotate {
            theta_offset_deg: 0.0,
            phi_offset_deg: 45.0,
        },
    ];
    let mut current = value();
    for step in &steps {
        current = pipeline.apply(step, &current).unwrap();
    }
    let history: Vec<Transform> = current.history().cloned().collect();
    let expected: Vec<Transform> = steps.iter().rev().cloned().collect();
    assert_eq!(history, expected);
    assert_eq!(current.polarization(), Polarization::Rhcp);
    assert_eq!(current.cuts(), &[45.0, 90.0, 135.0, 180.0]);
}

#[test]
fn test_phase_center_analysis_end_to_end() {
    let input = value();
    let output = run_analysis(
        &ReferenceAlgebra::new(),
        &AnalysisRequest::PhaseCenter {
            frequency: 1.5e9,
            theta_limit_deg: 30.0,
        },
        &input,
        &|_| {},
        &CancellationToken::new(),
    )
    .unwrap();
    let AnalysisOutput::PhaseCenter(estimate) = output else {
        panic!("unexpected output");
    };
    assert_relative_eq!(estimate.frequency, 1.5e9);
    assert_relative_eq!(estimate.position[2], 0.04, epsilon = 1e-9);
}

#[test]
fn test_analysis_validation() {
    let input = value();
    let algebra = ReferenceAlgebra::new();
    let cancel = CancellationToken::new();
    let unknown = run_analysis(
        &algebra,
        &AnalysisRequest::PhaseCenter {
            frequency: 3e9,
            theta_limit_deg: 30.0,
        },
        &input,
        &|_| {},
        &cancel,
    );
    assert_eq!(
        unknown,
        Err(AnalysisError::Validation(ValidationError::UnknownFrequency(3e9)))
    );

    let bad_modes = run_analysis(
        &algebra,
        &AnalysisRequest::SphericalWaveExpansion(SweParams {
            frequency: None,
            nmax: Some(4),
            mmax: Some(5),
        }),
        &input,
        &|_| {},
        &cancel,
    );
    assert!(matches!(
        bad_modes,
        Err(AnalysisError::Validation(ValidationError::Parameter {
            parameter: "mmax",
            ..
        }))
    ));
}

#[test]
fn test_cancelled_analysis_reports_cancelled() {
    let cancel = CancellationToken::new();
    cancel.cancel();
    let result = run_analysis(
        &ReferenceAlgebra::new(),
        &AnalysisRequest::Directivity,
        &value(),
        &|_| {},
        &cancel,
    );
    assert_eq!(result, Err(AnalysisError::Cancelled));
}

#[test]
fn test_directivity_per_frequency() {
    let output = run_analysis(
        &ReferenceAlgebra::new(),
        &AnalysisRequest::Directivity,
        &value(),
        &|_| {},
        &CancellationToken::new(),
    )
    .unwrap();
    let AnalysisOutput::Directivity(rows) = output else {
        panic!("unexpected output");
    };
    assert_eq!(rows.len(), 2);
    assert!(rows.iter().all(|r| r.directivity_dbi > 0.0));
}

#[test]
fn test_near_field_analysis_end_to_end() {
    let surface = NearFieldSurface::Sphere {
        radius: 50.0,
        theta_points: 5,
        phi_points: 4,
    };
    let seen = std::sync::Mutex::new(Vec::new());
    let output = run_analysis(
        &ReferenceAlgebra::new(),
        &AnalysisRequest::NearField {
            surface,
            params: SweParams {
                frequency: Some(1.5e9),
                nmax: Some(8),
                mmax: None,
            },
        },
        &value(),
        &|f| seen.lock().unwrap().push(f),
        &CancellationToken::new(),
    )
    .unwrap();
    let AnalysisOutput::NearField(field) = output else {
        panic!("unexpected output");
    };
    assert_relative_eq!(field.frequency, 1.5e9);
    assert_eq!(field.surface, surface);
    assert_eq!(field.nmax, 8);
    assert_eq!(field.co.len(), 20);
    assert_eq!(field.cross.len(), 20);
    assert!(field.peak_magnitude() > 0.0);

    let seen = seen.into_inner().unwrap();
    assert!(seen.windows(2).all(|w| w[0] <= w[1]));
    assert_relative_eq!(*seen.last().unwrap(), 1.0);
}
