#![allow(clippy::uninlined_format_args)]
mod common;

use std::cell::{Cell, RefCell};
use std::rc::Rc;
use std::sync::Arc;

use common::{config, pattern, GatedAlgebra, Recorder, GHZ};
use patternview_core::{
    PatternValue, PlotKind, Provenance, SelectionUpdate, Transform, ValidationError, ViewData,
};
use patternview_model::{
    Changes, Deferred, ModelCommand, ModelConfig, ModelError, Notification, PatternDataModel,
    Subscriber, SubscriberId,
};

fn model() -> PatternDataModel {
    PatternDataModel::new(config()).unwrap()
}

#[test]
fn test_default_selection_is_on_axes() {
    let mut model = model();
    for (freqs, cuts) in [
        (vec![1.0, 2.0, 3.0], vec![0.0, 90.0]),
        (vec![5.0], vec![45.0]),
        (vec![8.0, 12.0], vec![-90.0, 0.0, 90.0, 180.0]),
    ] {
        let value = pattern(&freqs, &cuts);
        model.set_pattern(value.clone(), Some("test"));

        let selection = model.selection();
        assert!(!selection.frequencies().is_empty());
        assert!(!selection.cuts().is_empty());
        assert!(selection.is_valid_for(&value));
        assert_eq!(selection.frequencies(), value.frequencies());
        assert_eq!(selection.cuts(), &value.cuts()[..1]);
    }
}

#[test]
fn test_set_pattern_notifies_once() {
    let mut model = model();
    let recorder = Rc::new(RefCell::new(Recorder::default()));
    model.subscribe(&recorder);

    model.set_pattern(pattern(&[1.0], &[0.0]), Some("a.json"));

    let recorder = recorder.borrow();
    assert_eq!(recorder.notifications.len(), 1);
    assert_eq!(recorder.notifications[0].changes, Changes {
        pattern: true,
        selection: true,
        analysis: false,
    });
    assert!(recorder.notifications[0].analysis.is_none());
    assert_eq!(model.source_label(), Some("a.json"));
}

#[test]
fn test_subscribe_is_not_retroactive() {
    let mut model = model();
    model.set_pattern(pattern(&[1.0], &[0.0]), None);

    let recorder = Rc::new(RefCell::new(Recorder::default()));
    model.subscribe(&recorder);
    assert!(recorder.borrow().notifications.is_empty());

    model
        .update_selection(&SelectionUpdate::new().with_plot_kind(PlotKind::Phase))
        .unwrap();
    assert_eq!(recorder.borrow().notifications.len(), 1);
    assert!(recorder.borrow().notifications[0].changes.selection);
}

#[test]
fn test_unknown_frequency_is_rejected() {
    let mut model = model();
    model.set_pattern(pattern(&[1.0, 2.0, 3.0], &[0.0, 90.0]), None);
    let recorder = Rc::new(RefCell::new(Recorder::default()));
    model.subscribe(&recorder);
    let before = model.selection().clone();

    let err = model
        .update_selection(&SelectionUpdate::new().with_frequencies(vec![4.0 * GHZ]))
        .unwrap_err();

    assert_eq!(
        err,
        ModelError::Validation(ValidationError::UnknownFrequency(4.0 * GHZ))
    );
    assert_eq!(model.selection(), &before);
    assert!(recorder.borrow().notifications.is_empty());
}

#[test]
fn test_selection_update_is_atomic() {
    let mut model = model();
    model.set_pattern(pattern(&[1.0, 2.0], &[0.0, 90.0]), None);
    let before = model.selection().clone();

    // Valid frequencies, invalid cut: nothing applies.
    let update = SelectionUpdate::new()
        .with_frequencies(vec![2.0 * GHZ])
        .with_cuts(vec![45.0])
        .with_normalize(true);
    assert!(model.update_selection(&update).is_err());
    assert_eq!(model.selection(), &before);

    let update = SelectionUpdate::new()
        .with_frequencies(vec![2.0 * GHZ])
        .with_cuts(vec![90.0, 0.0])
        .with_normalize(true);
    model.update_selection(&update).unwrap();
    assert_eq!(model.selection().frequencies(), &[2.0 * GHZ]);
    assert_eq!(model.selection().cuts(), &[0.0, 90.0]);
    assert!(model.selection().normalize());
}

#[test]
fn test_selection_without_pattern() {
    let mut model = model();
    let err = model
        .update_selection(&SelectionUpdate::new().with_frequencies(vec![GHZ]))
        .unwrap_err();
    assert_eq!(err, ModelError::Validation(ValidationError::NoPattern));

    // Display settings are accepted without a pattern.
    model
        .update_selection(&SelectionUpdate::new().with_plot_kind(PlotKind::AxialRatio))
        .unwrap();
    assert_eq!(model.selection().plot_kind(), PlotKind::AxialRatio);
    assert!(model.view().is_empty());
}

#[test]
fn test_translate_round_trip() {
    let mut model = model();
    let original = pattern(&[1.0, 2.0], &[0.0, 45.0, 90.0]);
    model.set_pattern(original.clone(), Some("horn"));

    let offset = [0.01, -0.02, 0.05];
    model
        .apply_transform(&Transform::TranslatePhaseCenter { offset })
        .unwrap();
    let back = model
        .apply_transform(&Transform::TranslatePhaseCenter {
            offset: offset.map(|v| -v),
        })
        .unwrap();

    assert!(!PatternValue::ptr_eq(&back, &original));
    assert!(back.max_abs_difference(&original).unwrap() < 1e-9);
    assert_eq!(back.history().count(), 2);
    assert_eq!(model.source_label(), Some("horn"));
}

#[test]
fn test_transform_links_provenance_and_keeps_selection() {
    let mut model = model();
    let original = pattern(&[1.0, 2.0], &[0.0, 90.0]);
    model.set_pattern(original.clone(), None);
    model
        .update_selection(
            &SelectionUpdate::new()
                .with_cuts(vec![90.0])
                .with_plot_kind(PlotKind::Phase),
        )
        .unwrap();
    let selection = model.selection().clone();

    let recorder = Rc::new(RefCell::new(Recorder::default()));
    model.subscribe(&recorder);
    let scaled = model
        .apply_transform(&Transform::ScaleAmplitude { factor: 2.0 })
        .unwrap();

    match scaled.provenance() {
        Provenance::Derived { transform, parent } => {
            assert_eq!(transform, &Transform::ScaleAmplitude { factor: 2.0 });
            assert!(PatternValue::ptr_eq(parent, &original));
        }
        other => panic!("unexpected provenance {:?}", other),
    }
    assert!(PatternValue::ptr_eq(model.pattern().unwrap(), &scaled));
    assert_eq!(model.selection(), &selection);
    assert_eq!(recorder.borrow().notifications.len(), 1);
    assert!(recorder.borrow().notifications[0].changes.pattern);
}

#[test]
fn test_zero_scale_leaves_pattern_identical() {
    let algebra = Arc::new(GatedAlgebra::new(true));
    let mut model = PatternDataModel::with_algebra(config(), algebra).unwrap();
    let original = pattern(&[1.0], &[0.0, 90.0]);
    model.set_pattern(original.clone(), None);
    let recorder = Rc::new(RefCell::new(Recorder::default()));
    model.subscribe(&recorder);

    let err = model
        .apply_transform(&Transform::ScaleAmplitude { factor: 0.0 })
        .unwrap_err();

    assert!(matches!(
        err,
        ModelError::Validation(ValidationError::Parameter {
            parameter: "factor",
            ..
        })
    ));
    assert!(PatternValue::ptr_eq(model.pattern().unwrap(), &original));
    assert!(recorder.borrow().notifications.is_empty());
}

#[test]
fn test_transform_without_pattern() {
    let mut model = model();
    let err = model
        .apply_transform(&Transform::ScaleAmplitude { factor: 2.0 })
        .unwrap_err();
    assert_eq!(err, ModelError::NoPattern);
}

#[test]
fn test_algebra_failure_is_reported() {
    // Rotation is not implemented by the gated algebra.
    let mut model =
        PatternDataModel::with_algebra(config(), Arc::new(GatedAlgebra::new(true))).unwrap();
    let original = pattern(&[1.0], &[0.0]);
    model.set_pattern(original.clone(), None);

    let err = model
        .apply_transform(&Transform::Rotate {
            theta_offset_deg: 10.0,
            phi_offset_deg: 0.0,
        })
        .unwrap_err();
    assert!(matches!(err, ModelError::Transform(_)));
    assert!(PatternValue::ptr_eq(model.pattern().unwrap(), &original));
}

#[test]
fn test_clear_pattern() {
    let mut model = model();
    model.set_pattern(pattern(&[1.0], &[0.0]), Some("a"));
    model
        .update_selection(&SelectionUpdate::new().with_normalize(true))
        .unwrap();
    assert!(!model.view().is_empty());

    model.clear_pattern();
    assert!(model.pattern().is_none());
    assert!(model.source_label().is_none());
    assert!(model.selection().frequencies().is_empty());
    assert!(model.selection().normalize());
    assert_eq!(model.view(), ViewData::Empty);
}

#[test]
fn test_view_follows_selection() {
    let mut model = model();
    model.set_pattern(pattern(&[1.0, 2.0], &[0.0, 90.0]), None);
    match model.view() {
        ViewData::Traces { kind, traces } => {
            assert_eq!(kind, PlotKind::Gain);
            assert_eq!(traces.len(), 2);
        }
        other => panic!("expected gain traces, got {:?}", other),
    }
    model
        .update_selection(&SelectionUpdate::new().with_cuts(Vec::<f64>::new()))
        .unwrap();
    assert!(model.view().is_empty());
}

#[test]
fn test_dropped_subscriber_is_pruned() {
    let mut model = model();
    let kept = Rc::new(RefCell::new(Recorder::default()));
    let dropped = Rc::new(RefCell::new(Recorder::default()));
    model.subscribe(&kept);
    model.subscribe(&dropped);
    assert_eq!(model.subscriber_count(), 2);

    drop(dropped);
    model.set_pattern(pattern(&[1.0], &[0.0]), None);

    assert_eq!(model.subscriber_count(), 1);
    assert_eq!(kept.borrow().notifications.len(), 1);
}

#[test]
fn test_unsubscribe() {
    let mut model = model();
    let recorder = Rc::new(RefCell::new(Recorder::default()));
    let id = model.subscribe(&recorder);

    assert!(model.unsubscribe(id));
    assert!(!model.unsubscribe(id));
    model.set_pattern(pattern(&[1.0], &[0.0]), None);
    assert!(recorder.borrow().notifications.is_empty());
}

#[test]
fn test_deferred_commands_run_after_dispatch_in_order() {
    let mut model = model();
    model.subscribe_fn(|_, notification, deferred| {
        if notification.changes.pattern {
            deferred.push(ModelCommand::UpdateSelection(
                SelectionUpdate::new().with_plot_kind(PlotKind::Phase),
            ));
        }
    });
    model.subscribe_fn(|_, notification, deferred| {
        if notification.changes.pattern {
            deferred.push(ModelCommand::UpdateSelection(
                SelectionUpdate::new().with_normalize(true),
            ));
        }
    });
    let recorder = Rc::new(RefCell::new(Recorder::default()));
    model.subscribe(&recorder);

    model.set_pattern(pattern(&[1.0], &[0.0]), None);

    let recorder = recorder.borrow();
    assert_eq!(recorder.notifications.len(), 3);
    assert!(recorder.notifications[0].changes.pattern);
    // The last subscriber saw the pattern change before any command ran.
    assert_eq!(recorder.selections[0].plot_kind(), PlotKind::Gain);
    assert!(!recorder.selections[0].normalize());
    assert_eq!(recorder.selections[1].plot_kind(), PlotKind::Phase);
    assert!(!recorder.selections[1].normalize());
    assert!(recorder.selections[2].normalize());
    assert!(model.take_deferred_errors().is_empty());
}

#[test]
fn test_deferred_failure_is_kept() {
    let mut model = model();
    model.subscribe_fn(|_, notification, deferred| {
        if notification.changes.pattern {
            deferred.push(ModelCommand::UpdateSelection(
                SelectionUpdate::new().with_frequencies(vec![99.0 * GHZ]),
            ));
        }
    });

    model.set_pattern(pattern(&[1.0], &[0.0]), None);

    let errors = model.take_deferred_errors();
    assert_eq!(
        errors,
        vec![ModelError::Validation(ValidationError::UnknownFrequency(
            99.0 * GHZ
        ))]
    );
    assert!(model.take_deferred_errors().is_empty());
    assert_eq!(model.selection().frequencies(), &[GHZ]);
}

#[test]
fn test_cascade_is_bounded() {
    let mut model = PatternDataModel::new(config().with_max_cascade(4)).unwrap();
    let count = Rc::new(Cell::new(0usize));
    let seen = Rc::clone(&count);
    model.subscribe_fn(move |model, _, deferred| {
        seen.set(seen.get() + 1);
        let flipped = !model.selection().normalize();
        deferred.push(ModelCommand::UpdateSelection(
            SelectionUpdate::new().with_normalize(flipped),
        ));
    });

    model.set_pattern(pattern(&[1.0], &[0.0]), None);

    assert_eq!(count.get(), 5);
    assert_eq!(
        model.take_deferred_errors(),
        vec![ModelError::CascadeLimit { limit: 4 }]
    );

    // The model keeps working afterwards.
    model
        .update_selection(&SelectionUpdate::new().with_plot_kind(PlotKind::Phase))
        .unwrap();
    assert_eq!(model.selection().plot_kind(), PlotKind::Phase);
}

#[test]
fn test_subscriber_can_unsubscribe_itself() {
    let mut model = model();
    let own_id: Rc<Cell<Option<SubscriberId>>> = Rc::new(Cell::new(None));
    let calls = Rc::new(Cell::new(0usize));

    let id_slot = Rc::clone(&own_id);
    let counter = Rc::clone(&calls);
    let id = model.subscribe_fn(move |_, _, deferred| {
        counter.set(counter.get() + 1);
        if let Some(id) = id_slot.get() {
            deferred.push(ModelCommand::Unsubscribe(id));
        }
    });
    own_id.set(Some(id));

    model.set_pattern(pattern(&[1.0], &[0.0]), None);
    model.clear_pattern();

    assert_eq!(calls.get(), 1);
    assert_eq!(model.subscriber_count(), 0);
}

#[test]
fn test_busy_subscriber_is_notified_once_released() {
    let mut model = model();
    let recorder = Rc::new(RefCell::new(Recorder::default()));
    model.subscribe(&recorder);

    {
        let _held = recorder.borrow_mut();
        model.set_pattern(pattern(&[1.0], &[0.0]), None);
    }
    assert!(recorder.borrow().notifications.is_empty());
    assert_eq!(model.subscriber_count(), 1);

    model.clear_pattern();
    let recorder = recorder.borrow();
    assert_eq!(recorder.notifications.len(), 2);
    assert!(recorder.notifications[0].changes.pattern);
    assert!(recorder.notifications[1].changes.pattern);
}

/// A control panel that edits the selection while holding a mutable
/// borrow of itself.
#[derive(Default)]
struct Panel {
    seen: Vec<Changes>,
    cuts: Vec<f64>,
}

impl Subscriber for Panel {
    fn on_change(
        &mut self,
        model: &PatternDataModel,
        notification: &Notification,
        _deferred: &mut Deferred,
    ) {
        self.seen.push(notification.changes);
        self.cuts = model.selection().cuts().to_vec();
    }
}

#[test]
fn test_panel_sees_its_own_selection_change() {
    let mut model = model();
    model.set_pattern(pattern(&[1.0], &[0.0, 90.0]), None);
    let panel = Rc::new(RefCell::new(Panel::default()));
    model.subscribe(&panel);

    {
        let mut held = panel.borrow_mut();
        model
            .update_selection(&SelectionUpdate::new().with_cuts(vec![90.0]))
            .unwrap();
        model
            .update_selection(&SelectionUpdate::new().with_plot_kind(PlotKind::Phase))
            .unwrap();
        held.cuts.clear();
    }
    assert!(panel.borrow().seen.is_empty());

    assert_eq!(model.handle_messages(), 0);
    let panel = panel.borrow();
    assert_eq!(panel.seen.len(), 1, "postponed selection changes are merged");
    assert!(panel.seen[0].selection);
    assert!(!panel.seen[0].pattern);
    assert_eq!(panel.cuts, vec![90.0]);
}

#[test]
fn test_models_are_independent() {
    let mut a = model();
    let mut b = PatternDataModel::new(ModelConfig::default().with_worker_threads(1)).unwrap();
    a.set_pattern(pattern(&[1.0, 2.0], &[0.0]), Some("a"));
    b.set_pattern(pattern(&[5.0], &[0.0]), Some("b"));

    assert_eq!(a.selection().frequencies(), &[GHZ, 2.0 * GHZ]);
    assert_eq!(b.selection().frequencies(), &[5.0 * GHZ]);
    assert_eq!(a.source_label(), Some("a"));
    assert_eq!(b.source_label(), Some("b"));
}
