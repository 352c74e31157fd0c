//! Analysis job records.

use std::fmt;
use std::sync::Arc;

use patternview_algorithms::{AnalysisError, AnalysisOutput, AnalysisRequest};
use patternview_core::PatternValue;

/// Identifier of an analysis job, unique within one model.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct JobId(pub(crate) u64);

impl JobId {
    /// Raw sequence number.
    #[must_use]
    pub fn get(self) -> u64 {
        self.0
    }
}

impl fmt::Display for JobId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "job-{}", self.0)
    }
}

/// Lifecycle state of a job.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum JobStatus {
    /// Waiting for the previous worker to stop.
    Queued,
    /// Executing on a worker thread.
    Running,
    /// Produced a result.
    Completed,
    /// Produced an error.
    Failed,
    /// Stopped by an explicit cancel.
    Cancelled,
}

impl JobStatus {
    /// Returns true for `Completed`, `Failed` and `Cancelled`.
    #[must_use]
    pub fn is_terminal(self) -> bool {
        matches!(
            self,
            JobStatus::Completed | JobStatus::Failed | JobStatus::Cancelled
        )
    }
}

impl fmt::Display for JobStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            JobStatus::Queued => "queued",
            JobStatus::Running => "running",
            JobStatus::Completed => "completed",
            JobStatus::Failed => "failed",
            JobStatus::Cancelled => "cancelled",
        };
        f.write_str(name)
    }
}

/// The model's record of its current analysis job.
#[derive(Debug, Clone)]
pub struct AnalysisJob {
    id: JobId,
    request: AnalysisRequest,
    input: PatternValue,
    status: JobStatus,
    progress: f32,
    output: Option<Arc<AnalysisOutput>>,
    error: Option<AnalysisError>,
}

impl AnalysisJob {
    pub(crate) fn new(id: JobId, request: AnalysisRequest, input: PatternValue) -> Self {
        Self {
            id,
            request,
            input,
            status: JobStatus::Queued,
            progress: 0.0,
            output: None,
            error: None,
        }
    }

    /// Job identifier.
    #[must_use]
    pub fn id(&self) -> JobId {
        self.id
    }

    /// Parameters the job was started with.
    #[must_use]
    pub fn request(&self) -> &AnalysisRequest {
        &self.request
    }

    /// Pattern snapshot the job runs on.
    #[must_use]
    pub fn input(&self) -> &PatternValue {
        &self.input
    }

    /// Current status.
    #[must_use]
    pub fn status(&self) -> JobStatus {
        self.status
    }

    /// Last reported progress fraction.
    #[must_use]
    pub fn progress(&self) -> f32 {
        self.progress
    }

    /// Result, once completed.
    #[must_use]
    pub fn output(&self) -> Option<&Arc<AnalysisOutput>> {
        self.output.as_ref()
    }

    /// Error, once failed.
    #[must_use]
    pub fn error(&self) -> Option<&AnalysisError> {
        self.error.as_ref()
    }

    /// Returns true once the job can no longer change.
    #[must_use]
    pub fn is_terminal(&self) -> bool {
        self.status.is_terminal()
    }

    pub(crate) fn start(&mut self) {
        self.status = JobStatus::Running;
    }

    /// Records progress. Returns false if the value did not advance.
    pub(crate) fn advance(&mut self, fraction: f32) -> bool {
        let fraction = fraction.clamp(0.0, 1.0);
        if self.status != JobStatus::Running || fraction <= self.progress {
            return false;
        }
        self.progress = fraction;
        true
    }

    pub(crate) fn complete(&mut self, output: Arc<AnalysisOutput>) {
        self.status = JobStatus::Completed;
        self.progress = 1.0;
        self.output = Some(output);
    }

    pub(crate) fn fail(&mut self, error: AnalysisError) {
        self.status = JobStatus::Failed;
        self.error = Some(error);
    }

    pub(crate) fn cancel(&mut self) {
        self.status = JobStatus::Cancelled;
        self.error = Some(AnalysisError::Cancelled);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;
    use patternview_core::synthetic::SyntheticPattern;

    fn job() -> AnalysisJob {
        let pattern = SyntheticPattern::new(vec![1e9], vec![0.0]).build();
        AnalysisJob::new(
            JobId(1),
            AnalysisRequest::Directivity,
            PatternValue::new(pattern),
        )
    }

    #[test]
    fn test_progress_is_monotonic_and_clamped() {
        let mut job = job();
        assert!(!job.advance(0.5), "queued jobs do not advance");
        job.start();
        assert!(job.advance(0.25));
        assert!(!job.advance(0.1));
        assert!(job.advance(7.0));
        assert_relative_eq!(job.progress(), 1.0);
    }

    #[test]
    fn test_terminal_states() {
        let mut job = job();
        assert!(!job.is_terminal());
        job.start();
        job.cancel();
        assert_eq!(job.status(), JobStatus::Cancelled);
        assert!(job.is_terminal());
        assert_eq!(job.error(), Some(&AnalysisError::Cancelled));
        assert_eq!(JobId(3).to_string(), "job-3");
    }
}
