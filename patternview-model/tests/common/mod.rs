#![allow(dead_code)]

use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Condvar, Mutex};
use std::time::{Duration, Instant};

use patternview_algorithms::{
    AlgebraError, AxialRatioSummary, CancellationToken, DirectivitySummary, PatternAlgebra,
    ReferenceAlgebra, SphericalWaveExpansion, SweParams,
};
use patternview_core::synthetic::SyntheticPattern;
use patternview_core::{Pattern, PatternValue, Polarization, SelectionState};
use patternview_model::{
    AnalysisEvent, Deferred, ModelConfig, Notification, PatternDataModel, Subscriber,
};

pub const GHZ: f64 = 1e9;

pub fn config() -> ModelConfig {
    ModelConfig::default()
        .with_worker_threads(2)
        .with_progress_interval(Duration::ZERO)
}

pub fn pattern(frequencies_ghz: &[f64], cuts: &[f64]) -> PatternValue {
    PatternValue::new(
        SyntheticPattern::new(
            frequencies_ghz.iter().map(|f| f * GHZ).collect(),
            cuts.to_vec(),
        )
        .with_theta_grid(-90.0, 90.0, 5.0)
        .with_basis(Polarization::X)
        .build(),
    )
}

/// Records every notification together with the selection seen at the
/// time.
#[derive(Default)]
pub struct Recorder {
    pub notifications: Vec<Notification>,
    pub selections: Vec<SelectionState>,
}

impl Recorder {
    pub fn events(&self) -> Vec<AnalysisEvent> {
        self.notifications
            .iter()
            .filter_map(|n| n.analysis.clone())
            .collect()
    }
}

impl Subscriber for Recorder {
    fn on_change(
        &mut self,
        model: &PatternDataModel,
        notification: &Notification,
        _deferred: &mut Deferred,
    ) {
        self.notifications.push(notification.clone());
        self.selections.push(model.selection().clone());
    }
}

/// Algebra whose spherical expansion blocks until released. Tracks how
/// many expansions run at once.
pub struct GatedAlgebra {
    honor_cancel: bool,
    open: Mutex<bool>,
    changed: Condvar,
    pub started: AtomicUsize,
    pub running: AtomicUsize,
    pub max_running: AtomicUsize,
    pub saw_cancel: AtomicBool,
    inner: ReferenceAlgebra,
}

impl GatedAlgebra {
    pub fn new(honor_cancel: bool) -> Self {
        Self {
            honor_cancel,
            open: Mutex::new(false),
            changed: Condvar::new(),
            started: AtomicUsize::new(0),
            running: AtomicUsize::new(0),
            max_running: AtomicUsize::new(0),
            saw_cancel: AtomicBool::new(false),
            inner: ReferenceAlgebra::new(),
        }
    }

    pub fn release(&self) {
        *self.open.lock().unwrap() = true;
        self.changed.notify_all();
    }

    /// Waits until `count` expansions have started.
    pub fn wait_started(&self, count: usize) {
        let deadline = Instant::now() + Duration::from_secs(10);
        while self.started.load(Ordering::SeqCst) < count {
            assert!(Instant::now() < deadline, "expansion never started");
            std::thread::sleep(Duration::from_millis(1));
        }
    }

    /// Waits until no expansion is executing.
    pub fn wait_stopped(&self) {
        let deadline = Instant::now() + Duration::from_secs(10);
        while self.running.load(Ordering::SeqCst) > 0 {
            assert!(Instant::now() < deadline, "expansion never stopped");
            std::thread::sleep(Duration::from_millis(1));
        }
    }
}

impl PatternAlgebra for GatedAlgebra {
    fn translate_phase_center(
        &self,
        pattern: &Pattern,
        offset: [f64; 3],
    ) -> Result<Pattern, AlgebraError> {
        self.inner.translate_phase_center(pattern, offset)
    }

    fn scale_amplitude(&self, pattern: &Pattern, factor: f64) -> Result<Pattern, AlgebraError> {
        self.inner.scale_amplitude(pattern, factor)
    }

    fn compute_spherical_wave_expansion(
        &self,
        pattern: &Pattern,
        params: &SweParams,
        progress: &dyn Fn(f32),
        cancel: &CancellationToken,
    ) -> Result<SphericalWaveExpansion, AlgebraError> {
        self.started.fetch_add(1, Ordering::SeqCst);
        let now = self.running.fetch_add(1, Ordering::SeqCst) + 1;
        self.max_running.fetch_max(now, Ordering::SeqCst);
        progress(0.5);

        let mut open = self.open.lock().unwrap();
        let outcome = loop {
            if cancel.is_cancelled() {
                self.saw_cancel.store(true, Ordering::SeqCst);
                if self.honor_cancel {
                    break Err(AlgebraError::Cancelled);
                }
            }
            if *open {
                break Ok(SphericalWaveExpansion {
                    frequency: params.frequency.unwrap_or(pattern.frequencies()[0]),
                    nmax: params.nmax.unwrap_or(1),
                    mmax: params.mmax.unwrap_or(0),
                    coefficients: Vec::new(),
                    power_by_degree: vec![1.0],
                });
            }
            open = self
                .changed
                .wait_timeout(open, Duration::from_millis(5))
                .unwrap()
                .0;
        };
        drop(open);

        self.running.fetch_sub(1, Ordering::SeqCst);
        outcome
    }
}

/// Algebra whose analyses fail: directivity panics, axial ratio does not
/// converge.
pub struct FailingAlgebra;

impl PatternAlgebra for FailingAlgebra {
    fn compute_directivity(
        &self,
        _pattern: &Pattern,
    ) -> Result<Vec<DirectivitySummary>, AlgebraError> {
        panic!("directivity exploded");
    }

    fn compute_axial_ratio(
        &self,
        _pattern: &Pattern,
    ) -> Result<Vec<AxialRatioSummary>, AlgebraError> {
        Err(AlgebraError::NonConvergence(
            "axial ratio iteration diverged".to_string(),
        ))
    }
}
