//! Retry policy for failed jobs.

use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Exponential retry policy attached to each job.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct RetryPolicy {
    /// Total attempts allowed, including the first.
    pub max_attempts: u32,

    /// Base delay in milliseconds; doubled after every failed attempt.
    pub backoff_ms: u64,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            backoff_ms: 1000,
        }
    }
}

impl RetryPolicy {
    /// Creates a policy.
    pub fn new(max_attempts: u32, backoff: Duration) -> Self {
        Self {
            max_attempts,
            backoff_ms: u64::try_from(backoff.as_millis()).unwrap_or(u64::MAX),
        }
    }

    /// Returns true if another attempt is allowed after `attempts` failures.
    pub fn should_retry(&self, attempts: u32) -> bool {
        attempts < self.max_attempts
    }

    /// Delay before the next attempt, given the number of attempts made.
    ///
    /// `backoff * 2^(attempts - 1)`, saturating.
    pub fn delay_for_attempt(&self, attempts: u32) -> Duration {
        if attempts == 0 {
            return Duration::ZERO;
        }
        let factor = 1u64.checked_shl(attempts - 1).unwrap_or(u64::MAX);
        Duration::from_millis(self.backoff_ms.saturating_mul(factor))
    }
}
