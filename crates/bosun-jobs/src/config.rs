//! Job queue configuration.

use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Configuration for the in-process job queue.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct QueueConfig {
    /// Maximum jobs processed at the same time.
    #[serde(default = "default_max_concurrent_jobs")]
    pub max_concurrent_jobs: usize,

    /// Interval of the periodic dispatch tick in milliseconds.
    #[serde(default = "default_tick_interval_ms")]
    pub tick_interval_ms: u64,

    /// Number of terminal results kept in the history.
    #[serde(default = "default_max_history_size")]
    pub max_history_size: usize,

    /// Buffer size of the event channel.
    #[serde(default = "default_event_capacity")]
    pub event_capacity: usize,
}

fn default_max_concurrent_jobs() -> usize {
    3
}

fn default_tick_interval_ms() -> u64 {
    1000
}

fn default_max_history_size() -> usize {
    1000
}

fn default_event_capacity() -> usize {
    256
}

impl Default for QueueConfig {
    fn default() -> Self {
        Self {
            max_concurrent_jobs: default_max_concurrent_jobs(),
            tick_interval_ms: default_tick_interval_ms(),
            max_history_size: default_max_history_size(),
            event_capacity: default_event_capacity(),
        }
    }
}

impl QueueConfig {
    /// Get tick interval as Duration.
    pub fn tick_interval(&self) -> Duration {
        Duration::from_millis(self.tick_interval_ms)
    }

    /// Set the concurrency limit.
    pub fn with_max_concurrent_jobs(mut self, max: usize) -> Self {
        self.max_concurrent_jobs = max;
        self
    }

    /// Set the history bound.
    pub fn with_max_history_size(mut self, size: usize) -> Self {
        self.max_history_size = size;
        self
    }
}
