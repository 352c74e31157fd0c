//! The pattern data model.

use std::cell::RefCell;
use std::collections::VecDeque;
use std::rc::Rc;
use std::sync::Arc;
use std::time::{Duration, Instant};

use log::{debug, info, warn};
use patternview_algorithms::{
    AnalysisRequest, PatternAlgebra, ReferenceAlgebra, TransformPipeline,
};
use patternview_core::{
    view, Pattern, PatternValue, SelectionState, SelectionUpdate, Transform, ViewData,
};

use crate::config::ModelConfig;
use crate::error::{ModelError, Result};
use crate::job::{AnalysisJob, JobId};
use crate::message::WorkerMessage;
use crate::notify::{
    Changes, Deferred, ModelCommand, Notification, Registration, Subscriber, SubscriberId,
};
use crate::supervisor::AnalysisSupervisor;

/// Slice of an unbounded wait spent blocked on the worker channel.
const UNBOUNDED_WAIT: Duration = Duration::from_secs(3600);

/// Owns the current pattern, its selection and the current analysis job,
/// and notifies subscribers whenever any of them changes.
///
/// Every mutation happens on the thread that owns the model. Analysis
/// results are applied only when that thread calls
/// [`handle_messages`](Self::handle_messages) or
/// [`wait_for_analysis`](Self::wait_for_analysis).
pub struct PatternDataModel {
    config: ModelConfig,
    pipeline: TransformPipeline,
    supervisor: AnalysisSupervisor,
    pattern: Option<PatternValue>,
    source_label: Option<String>,
    selection: SelectionState,
    subscribers: Vec<Registration>,
    next_subscriber: u64,
    pending: VecDeque<ModelCommand>,
    draining: bool,
    deferred_errors: Vec<ModelError>,
}

impl std::fmt::Debug for PatternDataModel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PatternDataModel")
            .field("source_label", &self.source_label)
            .field("selection", &self.selection)
            .field("analysis_job", &self.analysis_job().map(AnalysisJob::id))
            .field("subscribers", &self.subscribers.len())
            .finish_non_exhaustive()
    }
}

impl PatternDataModel {
    /// Creates an empty model using the built-in algebra.
    ///
    /// # Errors
    ///
    /// [`ModelError::WorkerPool`] if the analysis threads cannot be started.
    pub fn new(config: ModelConfig) -> Result<Self> {
        Self::with_algebra(config, Arc::new(ReferenceAlgebra::new()))
    }

    /// Creates an empty model whose transforms and analyses run on
    /// `algebra`.
    ///
    /// # Errors
    ///
    /// [`ModelError::WorkerPool`] if the analysis threads cannot be started.
    pub fn with_algebra(config: ModelConfig, algebra: Arc<dyn PatternAlgebra>) -> Result<Self> {
        let supervisor = AnalysisSupervisor::new(&config, Arc::clone(&algebra))?;
        Ok(Self {
            pipeline: TransformPipeline::new(algebra),
            supervisor,
            config,
            pattern: None,
            source_label: None,
            selection: SelectionState::default(),
            subscribers: Vec::new(),
            next_subscriber: 1,
            pending: VecDeque::new(),
            draining: false,
            deferred_errors: Vec::new(),
        })
    }

    /// Current pattern, if one is loaded.
    #[must_use]
    pub fn pattern(&self) -> Option<&PatternValue> {
        self.pattern.as_ref()
    }

    /// Label of the loaded source, kept across transforms.
    #[must_use]
    pub fn source_label(&self) -> Option<&str> {
        self.source_label.as_deref()
    }

    /// Current selection. Always valid for [`pattern`](Self::pattern).
    #[must_use]
    pub fn selection(&self) -> &SelectionState {
        &self.selection
    }

    /// The current analysis job, including its polled progress.
    #[must_use]
    pub fn analysis_job(&self) -> Option<&AnalysisJob> {
        self.supervisor.current()
    }

    /// Configuration the model was built with.
    #[must_use]
    pub fn config(&self) -> &ModelConfig {
        &self.config
    }

    /// Number of registered subscribers, including dropped shared ones not
    /// yet pruned.
    #[must_use]
    pub fn subscriber_count(&self) -> usize {
        self.subscribers.len()
    }

    /// Computes the plottable slice for the current state.
    #[must_use]
    pub fn view(&self) -> ViewData {
        view::query(self.pattern.as_deref(), &self.selection)
    }

    /// Errors from deferred commands since the last call.
    pub fn take_deferred_errors(&mut self) -> Vec<ModelError> {
        std::mem::take(&mut self.deferred_errors)
    }

    /// Replaces the current pattern.
    ///
    /// The selection is reset to every frequency and the first cut. Any
    /// analysis job is dropped; its result will never be reported.
    /// `source_label` falls back to the pattern's own source label.
    pub fn set_pattern(&mut self, value: PatternValue, source_label: Option<&str>) {
        let label = source_label
            .map(str::to_owned)
            .or_else(|| value.source_label().map(str::to_owned));
        let selection = SelectionState::default_for(&value);
        self.install(value, label, selection);
    }

    /// Unloads the pattern. Display settings of the selection survive.
    pub fn clear_pattern(&mut self) {
        self.discard_analysis();
        self.pattern = None;
        self.source_label = None;
        self.selection = self.selection.cleared();
        info!("pattern cleared");
        self.emit(Notification::new(Changes::PATTERN));
    }

    /// Validates `update` against the current axes and applies it.
    ///
    /// # Errors
    ///
    /// [`ModelError::Validation`] naming the offending value. The selection
    /// is unchanged and nothing is notified.
    pub fn update_selection(&mut self, update: &SelectionUpdate) -> Result<()> {
        let selection = self.selection.apply(update, self.pattern.as_deref())?;
        debug!(
            "selection: {} frequencies, {} cuts, {}",
            selection.frequencies().len(),
            selection.cuts().len(),
            selection.plot_kind()
        );
        self.selection = selection;
        self.emit(Notification::new(Changes::SELECTION));
        Ok(())
    }

    /// Runs `transform` on the current pattern and installs the result.
    ///
    /// The source label is kept. The selection is kept if it is still valid
    /// for the new axes, otherwise re-derived with the display settings
    /// preserved.
    ///
    /// # Errors
    ///
    /// [`ModelError::NoPattern`], [`ModelError::Validation`] or
    /// [`ModelError::Transform`]. The model is unchanged and nothing is
    /// notified.
    pub fn apply_transform(&mut self, transform: &Transform) -> Result<PatternValue> {
        let input = self.pattern.clone().ok_or(ModelError::NoPattern)?;
        let output = self.pipeline.apply(transform, &input)?;
        let selection = if self.selection.is_valid_for(&output) && !self.selection.is_empty() {
            self.selection.clone()
        } else {
            self.selection.reset_for(&output)
        };
        let label = self.source_label.clone();
        self.install(output.clone(), label, selection);
        Ok(output)
    }

    /// Starts `request` on the current pattern, superseding any earlier job.
    ///
    /// Returns immediately. The outcome arrives as a notification carrying
    /// an [`AnalysisEvent`](crate::AnalysisEvent) once the job finishes.
    ///
    /// # Errors
    ///
    /// [`ModelError::NoPattern`] or [`ModelError::Validation`]. The current
    /// job is left alone.
    pub fn request_analysis(&mut self, request: AnalysisRequest) -> Result<JobId> {
        let input = self.pattern.clone().ok_or(ModelError::NoPattern)?;
        request.validate(&input)?;
        let kind = request.kind();
        let job = self.supervisor.submit(request, input);
        info!("{job}: {kind} requested");
        self.emit(Notification::new(Changes::ANALYSIS));
        Ok(job)
    }

    /// Cancels the current job. Returns its id if it was still pending.
    pub fn cancel_analysis(&mut self) -> Option<JobId> {
        let event = self.supervisor.cancel_current()?;
        let job = event.job();
        info!("{job} cancelled");
        self.emit(Notification::analysis(event));
        Some(job)
    }

    /// Registers a shared subscriber. Only a weak reference is kept; the
    /// registration lapses when the last `Rc` is dropped.
    pub fn subscribe<S>(&mut self, subscriber: &Rc<RefCell<S>>) -> SubscriberId
    where
        S: Subscriber + 'static,
    {
        let id = self.next_subscriber_id();
        self.subscribers.push(Registration::shared(id, subscriber));
        id
    }

    /// Registers a callback owned by the model.
    pub fn subscribe_fn<F>(&mut self, callback: F) -> SubscriberId
    where
        F: FnMut(&PatternDataModel, &Notification, &mut Deferred) + 'static,
    {
        let id = self.next_subscriber_id();
        self.subscribers.push(Registration::owned(id, callback));
        id
    }

    /// Removes a subscriber. Returns false if it was not registered.
    pub fn unsubscribe(&mut self, id: SubscriberId) -> bool {
        let before = self.subscribers.len();
        self.subscribers.retain(|s| s.id() != id);
        self.subscribers.len() != before
    }

    /// Applies every worker message received so far. Returns how many were
    /// handled.
    ///
    /// Notifications postponed because a shared subscriber was borrowed
    /// during dispatch are delivered first.
    pub fn handle_messages(&mut self) -> usize {
        self.redeliver_postponed();
        let mut handled = 0;
        while let Some(msg) = self.supervisor.try_recv() {
            self.handle_message(msg);
            handled += 1;
        }
        handled
    }

    /// Handles worker messages until no job is running or queued, or until
    /// `timeout` passes. Returns true if the supervisor went idle.
    ///
    /// A timeout too large to represent as a deadline, such as
    /// [`Duration::MAX`], waits without limit.
    pub fn wait_for_analysis(&mut self, timeout: Duration) -> bool {
        let deadline = Instant::now().checked_add(timeout);
        loop {
            self.handle_messages();
            if self.supervisor.is_idle() {
                return true;
            }
            let remaining = match deadline {
                Some(deadline) => deadline.saturating_duration_since(Instant::now()),
                None => UNBOUNDED_WAIT,
            };
            if remaining.is_zero() {
                return false;
            }
            if let Some(msg) = self.supervisor.recv_timeout(remaining) {
                self.handle_message(msg);
            }
        }
    }

    fn handle_message(&mut self, msg: WorkerMessage) {
        if let Some(event) = self.supervisor.handle(msg) {
            info!("{} finished", event.job());
            self.emit(Notification::analysis(event));
        }
    }

    fn next_subscriber_id(&mut self) -> SubscriberId {
        let id = SubscriberId(self.next_subscriber);
        self.next_subscriber += 1;
        id
    }

    fn discard_analysis(&mut self) {
        if let Some(job) = self.supervisor.discard_current() {
            debug!("{job} dropped with its input pattern");
        }
    }

    fn install(&mut self, value: PatternValue, label: Option<String>, selection: SelectionState) {
        self.discard_analysis();
        log_pattern(&value, label.as_deref());
        self.pattern = Some(value);
        self.source_label = label;
        self.selection = selection;
        self.emit(Notification::new(Changes::PATTERN));
    }

    /// Delivers `notification` to every subscriber, then runs the commands
    /// they queued. Commands queued while running those are appended to the
    /// same queue, so execution stays FIFO and never nests.
    fn emit(&mut self, notification: Notification) {
        self.dispatch(Some(&notification));
    }

    fn redeliver_postponed(&mut self) {
        if self.subscribers.iter().any(|s| s.postponed() > 0) {
            self.dispatch(None);
        }
    }

    fn dispatch(&mut self, notification: Option<&Notification>) {
        let mut deferred = Deferred::default();
        let mut subscribers = std::mem::take(&mut self.subscribers);
        {
            let model: &Self = self;
            subscribers.retain_mut(|s| s.deliver(model, notification, &mut deferred));
        }
        subscribers.retain(Registration::is_alive);
        self.subscribers = subscribers;
        self.pending.extend(deferred.into_commands());

        if !self.draining {
            self.drain_pending();
        }
    }

    fn drain_pending(&mut self) {
        self.draining = true;
        let limit = self.config.max_cascade;
        let mut executed = 0;
        while let Some(command) = self.pending.pop_front() {
            if executed == limit {
                warn!(
                    "deferred command limit of {limit} reached; dropping {} commands",
                    self.pending.len() + 1
                );
                self.pending.clear();
                self.deferred_errors.push(ModelError::CascadeLimit { limit });
                break;
            }
            executed += 1;
            if let Err(err) = self.execute(command) {
                warn!("deferred command failed: {err}");
                self.deferred_errors.push(err);
            }
        }
        self.draining = false;
    }

    fn execute(&mut self, command: ModelCommand) -> Result<()> {
        match command {
            ModelCommand::SetPattern {
                value,
                source_label,
            } => self.set_pattern(value, source_label.as_deref()),
            ModelCommand::ClearPattern => self.clear_pattern(),
            ModelCommand::UpdateSelection(update) => self.update_selection(&update)?,
            ModelCommand::ApplyTransform(transform) => {
                self.apply_transform(&transform)?;
            }
            ModelCommand::RequestAnalysis(request) => {
                self.request_analysis(request)?;
            }
            ModelCommand::CancelAnalysis => {
                self.cancel_analysis();
            }
            ModelCommand::Unsubscribe(id) => {
                self.unsubscribe(id);
            }
        }
        Ok(())
    }
}

fn log_pattern(pattern: &Pattern, label: Option<&str>) {
    let (frequencies, cuts, angles) = pattern.shape();
    info!(
        "pattern {}: {frequencies} x {cuts} x {angles} samples, {} basis, {} transforms",
        label.unwrap_or("<unnamed>"),
        pattern.polarization().name(),
        pattern.history().count()
    );
}
