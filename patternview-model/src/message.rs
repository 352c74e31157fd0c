//! Messages sent from analysis workers to the model's thread.

use patternview_algorithms::{AnalysisError, AnalysisOutput};

use crate::job::JobId;

/// Messages sent from background workers to the interactive thread.
#[derive(Debug)]
pub enum WorkerMessage {
    /// Progress fraction in `[0, 1]`, already throttled by the worker.
    AnalysisProgress {
        /// Job the update belongs to.
        job: JobId,
        /// Completed fraction.
        fraction: f32,
    },

    /// The worker stopped. Always the last message for a job, whether it
    /// completed, failed, panicked or observed cancellation.
    AnalysisFinished {
        /// Job the result belongs to.
        job: JobId,
        /// Output or error.
        result: Result<AnalysisOutput, AnalysisError>,
    },
}

impl WorkerMessage {
    /// Job this message belongs to.
    #[must_use]
    pub fn job(&self) -> JobId {
        match self {
            WorkerMessage::AnalysisProgress { job, .. }
            | WorkerMessage::AnalysisFinished { job, .. } => *job,
        }
    }
}
