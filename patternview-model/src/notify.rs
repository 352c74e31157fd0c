//! Subscriber registry and notification payloads.

use std::cell::RefCell;
use std::fmt;
use std::rc::{Rc, Weak};
use std::sync::Arc;

use log::debug;
use patternview_algorithms::{AnalysisError, AnalysisOutput, AnalysisRequest};
use patternview_core::{PatternValue, SelectionUpdate, Transform};

use crate::job::JobId;
use crate::model::PatternDataModel;

/// Which parts of the model changed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Changes {
    /// The current pattern was replaced or cleared.
    pub pattern: bool,
    /// The selection was replaced.
    pub selection: bool,
    /// The analysis job record changed.
    pub analysis: bool,
}

impl Changes {
    pub(crate) const PATTERN: Changes = Changes {
        pattern: true,
        selection: true,
        analysis: false,
    };
    pub(crate) const SELECTION: Changes = Changes {
        pattern: false,
        selection: true,
        analysis: false,
    };
    pub(crate) const ANALYSIS: Changes = Changes {
        pattern: false,
        selection: false,
        analysis: true,
    };

    /// Flags set in either `self` or `other`.
    #[must_use]
    pub fn union(self, other: Changes) -> Changes {
        Changes {
            pattern: self.pattern || other.pattern,
            selection: self.selection || other.selection,
            analysis: self.analysis || other.analysis,
        }
    }
}

/// Terminal outcome of an analysis job, delivered once per job.
#[derive(Debug, Clone, PartialEq)]
pub enum AnalysisEvent {
    /// The job produced a result.
    Completed {
        /// Finished job.
        job: JobId,
        /// Result, shared with the job record.
        output: Arc<AnalysisOutput>,
    },
    /// The job failed.
    Failed {
        /// Finished job.
        job: JobId,
        /// What went wrong.
        error: AnalysisError,
    },
    /// The job was cancelled on request.
    Cancelled {
        /// Finished job.
        job: JobId,
    },
}

impl AnalysisEvent {
    /// Job the event belongs to.
    #[must_use]
    pub fn job(&self) -> JobId {
        match self {
            AnalysisEvent::Completed { job, .. }
            | AnalysisEvent::Failed { job, .. }
            | AnalysisEvent::Cancelled { job } => *job,
        }
    }
}

/// Payload delivered to every subscriber after a mutation.
#[derive(Debug, Clone, PartialEq)]
pub struct Notification {
    /// What changed.
    pub changes: Changes,
    /// Set when an analysis job reached a terminal state.
    pub analysis: Option<AnalysisEvent>,
}

impl Notification {
    pub(crate) fn new(changes: Changes) -> Self {
        Self {
            changes,
            analysis: None,
        }
    }

    pub(crate) fn analysis(event: AnalysisEvent) -> Self {
        Self {
            changes: Changes::ANALYSIS,
            analysis: Some(event),
        }
    }
}

/// A mutation a subscriber asks the model to perform after the current
/// dispatch finishes.
#[derive(Debug, Clone)]
pub enum ModelCommand {
    /// See [`PatternDataModel::set_pattern`].
    SetPattern {
        /// New pattern.
        value: PatternValue,
        /// Label shown for the pattern.
        source_label: Option<String>,
    },
    /// See [`PatternDataModel::clear_pattern`].
    ClearPattern,
    /// See [`PatternDataModel::update_selection`].
    UpdateSelection(SelectionUpdate),
    /// See [`PatternDataModel::apply_transform`].
    ApplyTransform(Transform),
    /// See [`PatternDataModel::request_analysis`].
    RequestAnalysis(AnalysisRequest),
    /// See [`PatternDataModel::cancel_analysis`].
    CancelAnalysis,
    /// See [`PatternDataModel::unsubscribe`].
    Unsubscribe(SubscriberId),
}

/// Commands queued by subscribers during one notification.
#[derive(Debug, Default)]
pub struct Deferred {
    commands: Vec<ModelCommand>,
}

impl Deferred {
    /// Queues `command`. Commands run in the order they were pushed.
    pub fn push(&mut self, command: ModelCommand) {
        self.commands.push(command);
    }

    /// Number of queued commands.
    #[must_use]
    pub fn len(&self) -> usize {
        self.commands.len()
    }

    /// Returns true if nothing is queued.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.commands.is_empty()
    }

    pub(crate) fn into_commands(self) -> Vec<ModelCommand> {
        self.commands
    }
}

/// A view that follows the model.
///
/// Subscribers get read-only access to the model. To change it they queue
/// commands on `deferred`; those run once every subscriber has seen the
/// current notification.
pub trait Subscriber {
    /// Called once per model mutation.
    fn on_change(
        &mut self,
        model: &PatternDataModel,
        notification: &Notification,
        deferred: &mut Deferred,
    );
}

struct FnSubscriber<F>(F);

impl<F> Subscriber for FnSubscriber<F>
where
    F: FnMut(&PatternDataModel, &Notification, &mut Deferred),
{
    fn on_change(
        &mut self,
        model: &PatternDataModel,
        notification: &Notification,
        deferred: &mut Deferred,
    ) {
        (self.0)(model, notification, deferred);
    }
}

/// Handle returned by `subscribe`, used to unsubscribe.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SubscriberId(pub(crate) u64);

impl fmt::Display for SubscriberId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "subscriber-{}", self.0)
    }
}

enum Handle {
    Shared(Weak<RefCell<dyn Subscriber>>),
    Owned(Box<dyn Subscriber>),
}

pub(crate) struct Registration {
    id: SubscriberId,
    handle: Handle,
    postponed: Vec<Notification>,
}

impl Registration {
    pub(crate) fn shared<S>(id: SubscriberId, subscriber: &Rc<RefCell<S>>) -> Self
    where
        S: Subscriber + 'static,
    {
        let subscriber: Rc<RefCell<dyn Subscriber>> = subscriber.clone();
        Self::new(id, Handle::Shared(Rc::downgrade(&subscriber)))
    }

    pub(crate) fn owned<F>(id: SubscriberId, callback: F) -> Self
    where
        F: FnMut(&PatternDataModel, &Notification, &mut Deferred) + 'static,
    {
        Self::new(id, Handle::Owned(Box::new(FnSubscriber(callback))))
    }

    fn new(id: SubscriberId, handle: Handle) -> Self {
        Self {
            id,
            handle,
            postponed: Vec::new(),
        }
    }

    pub(crate) fn id(&self) -> SubscriberId {
        self.id
    }

    pub(crate) fn is_alive(&self) -> bool {
        match &self.handle {
            Handle::Shared(weak) => weak.strong_count() > 0,
            Handle::Owned(_) => true,
        }
    }

    /// Number of notifications waiting for the subscriber to be released.
    pub(crate) fn postponed(&self) -> usize {
        self.postponed.len()
    }

    /// Delivers any postponed notifications, then `notification`.
    ///
    /// A shared subscriber that is borrowed elsewhere keeps `notification`
    /// for the next delivery attempt. Returns false once a shared
    /// subscriber has been dropped, so the caller can prune it.
    pub(crate) fn deliver(
        &mut self,
        model: &PatternDataModel,
        notification: Option<&Notification>,
        deferred: &mut Deferred,
    ) -> bool {
        let Self {
            id,
            handle,
            postponed,
        } = self;
        match handle {
            Handle::Shared(weak) => {
                let Some(subscriber) = weak.upgrade() else {
                    return false;
                };
                let Ok(mut subscriber) = subscriber.try_borrow_mut() else {
                    if let Some(notification) = notification {
                        debug!("{id} is borrowed elsewhere; notification postponed");
                        postpone(postponed, notification);
                    }
                    return true;
                };
                for missed in postponed.drain(..) {
                    subscriber.on_change(model, &missed, deferred);
                }
                if let Some(notification) = notification {
                    subscriber.on_change(model, notification, deferred);
                }
                true
            }
            Handle::Owned(subscriber) => {
                if let Some(notification) = notification {
                    subscriber.on_change(model, notification, deferred);
                }
                true
            }
        }
    }
}

/// Queues `notification`, merging it into the previous one unless either
/// carries an analysis event. Each job's event is kept so it is still
/// delivered exactly once.
fn postpone(postponed: &mut Vec<Notification>, notification: &Notification) {
    match postponed.last_mut() {
        Some(last) if last.analysis.is_none() && notification.analysis.is_none() => {
            last.changes = last.changes.union(notification.changes);
        }
        _ => postponed.push(notification.clone()),
    }
}
