//! Background analysis supervision.
//!
//! The supervisor owns the worker pool and the model's single job record.
//! Workers report over an mpsc channel; nothing they send is applied until
//! the model drains the channel on its own thread. A new job never starts
//! while an older worker is still executing: it waits as `Queued` until the
//! older worker's `AnalysisFinished` arrives.

use std::any::Any;
use std::cell::Cell;
use std::panic::{self, AssertUnwindSafe};
use std::sync::mpsc::{self, Receiver, RecvTimeoutError, Sender};
use std::sync::Arc;
use std::time::{Duration, Instant};

use log::debug;
use patternview_algorithms::{
    run_analysis, AnalysisError, AnalysisRequest, CancellationToken, PatternAlgebra,
};
use patternview_core::PatternValue;
use rayon::ThreadPool;

use crate::config::ModelConfig;
use crate::error::{ModelError, Result};
use crate::job::{AnalysisJob, JobId, JobStatus};
use crate::message::WorkerMessage;
use crate::notify::AnalysisEvent;

/// The worker currently executing, whether or not its job is still wanted.
struct ActiveWorker {
    job: JobId,
    cancel: CancellationToken,
}

pub(crate) struct AnalysisSupervisor {
    pool: ThreadPool,
    algebra: Arc<dyn PatternAlgebra>,
    tx: Sender<WorkerMessage>,
    rx: Receiver<WorkerMessage>,
    next_id: u64,
    active: Option<ActiveWorker>,
    current: Option<AnalysisJob>,
    progress_interval: Duration,
}

impl AnalysisSupervisor {
    pub(crate) fn new(config: &ModelConfig, algebra: Arc<dyn PatternAlgebra>) -> Result<Self> {
        let pool = rayon::ThreadPoolBuilder::new()
            .num_threads(config.worker_threads)
            .thread_name(|i| format!("patternview-analysis-{i}"))
            .build()
            .map_err(|e| ModelError::WorkerPool(e.to_string()))?;
        let (tx, rx) = mpsc::channel();
        Ok(Self {
            pool,
            algebra,
            tx,
            rx,
            next_id: 1,
            active: None,
            current: None,
            progress_interval: config.progress_interval,
        })
    }

    pub(crate) fn current(&self) -> Option<&AnalysisJob> {
        self.current.as_ref()
    }

    /// True when no worker is executing and nothing is queued.
    pub(crate) fn is_idle(&self) -> bool {
        self.active.is_none()
            && self
                .current
                .as_ref()
                .map_or(true, |job| job.status() != JobStatus::Queued)
    }

    /// Replaces the current job with a new one. An executing worker is asked
    /// to stop and the new job waits until it has.
    pub(crate) fn submit(&mut self, request: AnalysisRequest, input: PatternValue) -> JobId {
        let id = JobId(self.next_id);
        self.next_id += 1;

        if let Some(old) = self.current.take() {
            if !old.is_terminal() {
                debug!("{} superseded by {id}", old.id());
            }
        }
        self.current = Some(AnalysisJob::new(id, request, input));

        match &self.active {
            Some(worker) => {
                worker.cancel.cancel();
                debug!("{id} queued behind {}", worker.job);
            }
            None => self.spawn(),
        }
        id
    }

    /// Drops the current job without reporting it. Returns its id if it had
    /// not finished.
    pub(crate) fn discard_current(&mut self) -> Option<JobId> {
        if let Some(worker) = &self.active {
            worker.cancel.cancel();
        }
        let job = self.current.take()?;
        if job.is_terminal() {
            None
        } else {
            debug!("{} discarded", job.id());
            Some(job.id())
        }
    }

    /// Marks the current job cancelled and signals its worker.
    pub(crate) fn cancel_current(&mut self) -> Option<AnalysisEvent> {
        let job = self.current.as_mut().filter(|job| !job.is_terminal())?;
        if let Some(worker) = &self.active {
            worker.cancel.cancel();
        }
        job.cancel();
        Some(AnalysisEvent::Cancelled { job: job.id() })
    }

    pub(crate) fn try_recv(&self) -> Option<WorkerMessage> {
        self.rx.try_recv().ok()
    }

    pub(crate) fn recv_timeout(&self, timeout: Duration) -> Option<WorkerMessage> {
        match self.rx.recv_timeout(timeout) {
            Ok(msg) => Some(msg),
            Err(RecvTimeoutError::Timeout | RecvTimeoutError::Disconnected) => None,
        }
    }

    /// Applies one worker message. Returns the event subscribers must see,
    /// if any. Progress never produces an event.
    pub(crate) fn handle(&mut self, msg: WorkerMessage) -> Option<AnalysisEvent> {
        match msg {
            WorkerMessage::AnalysisProgress { job, fraction } => {
                match self.current.as_mut().filter(|current| current.id() == job) {
                    Some(current) => {
                        current.advance(fraction);
                    }
                    None => debug!("dropping progress from stale {job}"),
                }
                None
            }
            WorkerMessage::AnalysisFinished { job, result } => {
                if self.active.as_ref().is_some_and(|worker| worker.job == job) {
                    self.active = None;
                }

                let event = match self
                    .current
                    .as_mut()
                    .filter(|current| current.id() == job && current.status() == JobStatus::Running)
                {
                    Some(current) => Some(match result {
                        Ok(output) => {
                            let output = Arc::new(output);
                            current.complete(Arc::clone(&output));
                            AnalysisEvent::Completed { job, output }
                        }
                        Err(AnalysisError::Cancelled) => {
                            current.cancel();
                            AnalysisEvent::Cancelled { job }
                        }
                        Err(error) => {
                            current.fail(error.clone());
                            AnalysisEvent::Failed { job, error }
                        }
                    }),
                    None => {
                        debug!("discarding result of stale {job}");
                        None
                    }
                };

                if self.active.is_none()
                    && self
                        .current
                        .as_ref()
                        .is_some_and(|current| current.status() == JobStatus::Queued)
                {
                    self.spawn();
                }
                event
            }
        }
    }

    /// Starts the current (queued) job on the pool.
    fn spawn(&mut self) {
        let Some(job) = self.current.as_mut() else {
            return;
        };
        job.start();

        let id = job.id();
        let request = job.request().clone();
        let input = job.input().clone();
        let cancel = CancellationToken::new();
        let token = cancel.clone();
        let algebra = Arc::clone(&self.algebra);
        let tx = self.tx.clone();
        let interval = self.progress_interval;

        self.active = Some(ActiveWorker { job: id, cancel });
        debug!("{id} running ({})", request.kind());

        self.pool.spawn(move || {
            let reporter = ProgressReporter::new(id, tx.clone(), interval);
            let result = panic::catch_unwind(AssertUnwindSafe(|| {
                run_analysis(
                    algebra.as_ref(),
                    &request,
                    &input,
                    &|fraction| reporter.report(fraction),
                    &token,
                )
            }))
            .unwrap_or_else(|payload| {
                Err(AnalysisError::Panicked(panic_message(payload.as_ref())))
            });

            // The model may already be gone.
            let _ = tx.send(WorkerMessage::AnalysisFinished { job: id, result });
        });
    }
}

impl Drop for AnalysisSupervisor {
    fn drop(&mut self) {
        if let Some(worker) = self.active.take() {
            debug!("cancelling {} on shutdown", worker.job);
            worker.cancel.cancel();
        }
    }
}

/// Worker-side progress sender: clamps, keeps values increasing and
/// throttles to the configured interval. Completion (1.0) is never
/// throttled.
struct ProgressReporter {
    job: JobId,
    tx: Sender<WorkerMessage>,
    interval: Duration,
    last_value: Cell<f32>,
    last_update: Cell<Option<Instant>>,
}

impl ProgressReporter {
    fn new(job: JobId, tx: Sender<WorkerMessage>, interval: Duration) -> Self {
        Self {
            job,
            tx,
            interval,
            last_value: Cell::new(0.0),
            last_update: Cell::new(None),
        }
    }

    fn report(&self, fraction: f32) {
        if fraction.is_nan() {
            return;
        }
        let fraction = fraction.clamp(0.0, 1.0);
        if fraction <= self.last_value.get() {
            return;
        }
        if fraction < 1.0
            && self
                .last_update
                .get()
                .is_some_and(|last| last.elapsed() < self.interval)
        {
            return;
        }
        self.last_value.set(fraction);
        self.last_update.set(Some(Instant::now()));
        let _ = self.tx.send(WorkerMessage::AnalysisProgress {
            job: self.job,
            fraction,
        });
    }
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "unknown panic payload".to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use patternview_algorithms::ReferenceAlgebra;
    use patternview_core::synthetic::SyntheticPattern;

    fn supervisor() -> AnalysisSupervisor {
        let config = ModelConfig::default().with_worker_threads(1);
        AnalysisSupervisor::new(&config, Arc::new(ReferenceAlgebra::new())).unwrap()
    }

    fn input() -> PatternValue {
        PatternValue::new(SyntheticPattern::new(vec![1e9], vec![0.0, 90.0]).build())
    }

    fn drain(supervisor: &mut AnalysisSupervisor) -> Vec<AnalysisEvent> {
        let mut events = Vec::new();
        while !supervisor.is_idle() {
            if let Some(msg) = supervisor.recv_timeout(Duration::from_secs(10)) {
                events.extend(supervisor.handle(msg));
            }
        }
        events
    }

    #[test]
    fn test_single_job_completes() {
        let mut supervisor = supervisor();
        let id = supervisor.submit(AnalysisRequest::Directivity, input());
        assert_eq!(supervisor.current().unwrap().status(), JobStatus::Running);

        let events = drain(&mut supervisor);
        assert_eq!(events.len(), 1);
        assert!(matches!(events[0], AnalysisEvent::Completed { job, .. } if job == id));
        assert_eq!(supervisor.current().unwrap().status(), JobStatus::Completed);
    }

    #[test]
    fn test_second_submit_queues_until_first_finishes() {
        let mut supervisor = supervisor();
        let first = supervisor.submit(AnalysisRequest::Directivity, input());
        let second = supervisor.submit(AnalysisRequest::AxialRatio, input());
        assert_ne!(first, second);
        assert_eq!(supervisor.current().unwrap().status(), JobStatus::Queued);

        let events = drain(&mut supervisor);
        assert_eq!(events.len(), 1);
        assert_eq!(events[0].job(), second);
    }

    #[test]
    fn test_discard_reports_nothing() {
        let mut supervisor = supervisor();
        let id = supervisor.submit(AnalysisRequest::Directivity, input());
        assert_eq!(supervisor.discard_current(), Some(id));
        assert!(drain(&mut supervisor).is_empty());
        assert!(supervisor.current().is_none());
    }

    #[test]
    fn test_stale_progress_is_ignored() {
        let mut supervisor = supervisor();
        let id = supervisor.submit(AnalysisRequest::Directivity, input());
        let stale = WorkerMessage::AnalysisProgress {
            job: JobId(id.get() + 100),
            fraction: 0.5,
        };
        assert!(supervisor.handle(stale).is_none());
        assert!(supervisor.current().unwrap().progress() < 0.5);
        drain(&mut supervisor);
    }

    #[test]
    fn test_reporter_throttles_and_orders() {
        let (tx, rx) = mpsc::channel();
        let reporter = ProgressReporter::new(JobId(1), tx, Duration::from_secs(60));
        reporter.report(0.1);
        reporter.report(0.2);
        reporter.report(0.05);
        reporter.report(f32::NAN);
        reporter.report(3.0);
        let sent: Vec<f32> = rx
            .try_iter()
            .map(|msg| match msg {
                WorkerMessage::AnalysisProgress { fraction, .. } => fraction,
                WorkerMessage::AnalysisFinished { .. } => unreachable!(),
            })
            .collect();
        assert_eq!(sent, vec![0.1, 1.0]);
    }

    #[test]
    fn test_panic_message() {
        let payload: Box<dyn Any + Send> = Box::new("boom");
        assert_eq!(panic_message(payload.as_ref()), "boom");
        let payload: Box<dyn Any + Send> = Box::new(String::from("bang"));
        assert_eq!(panic_message(payload.as_ref()), "bang");
    }
}
