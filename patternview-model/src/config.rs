//! Model configuration.

use std::time::Duration;

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

/// Configuration for [`crate::PatternDataModel`].
#[derive(Debug, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct ModelConfig {
    /// Analysis worker threads (0 = rayon default).
    pub worker_threads: usize,
    /// Minimum time between progress messages from one job.
    pub progress_interval: Duration,
    /// Maximum number of deferred commands executed after one mutation.
    pub max_cascade: usize,
}

impl Default for ModelConfig {
    fn default() -> Self {
        Self {
            worker_threads: 0,
            progress_interval: Duration::from_millis(200),
            max_cascade: 32,
        }
    }
}

impl ModelConfig {
    /// Sets the worker thread count.
    #[must_use]
    pub fn with_worker_threads(mut self, threads: usize) -> Self {
        self.worker_threads = threads;
        self
    }

    /// Sets the progress throttle interval.
    #[must_use]
    pub fn with_progress_interval(mut self, interval: Duration) -> Self {
        self.progress_interval = interval;
        self
    }

    /// Sets the deferred command limit.
    #[must_use]
    pub fn with_max_cascade(mut self, limit: usize) -> Self {
        self.max_cascade = limit;
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_builder() {
        let config = ModelConfig::default()
            .with_worker_threads(2)
            .with_progress_interval(Duration::ZERO)
            .with_max_cascade(4);
        assert_eq!(config.worker_threads, 2);
        assert_eq!(config.progress_interval, Duration::ZERO);
        assert_eq!(config.max_cascade, 4);
        assert_eq!(
            ModelConfig::default().progress_interval,
            Duration::from_millis(200)
        );
    }
}
