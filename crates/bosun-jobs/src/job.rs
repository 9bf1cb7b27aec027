//! Job definitions, options, and terminal results.

use crate::retry::RetryPolicy;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::fmt;
use std::str::FromStr;
use std::time::Duration;
use tokio::time::Instant;
use uuid::Uuid;

/// Unique job identifier.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct JobId(String);

impl JobId {
    /// Creates a new random job ID.
    pub fn new() -> Self {
        Self(Uuid::new_v4().to_string())
    }

    /// Returns the job ID as a string slice.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl Default for JobId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for JobId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<String> for JobId {
    fn from(s: String) -> Self {
        Self(s)
    }
}

impl From<&str> for JobId {
    fn from(s: &str) -> Self {
        Self(s.to_string())
    }
}

/// Job priority levels.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
#[repr(u8)]
pub enum Priority {
    /// Background work.
    Low = 1,
    /// Default.
    #[default]
    Medium = 2,
    /// Operator-requested work.
    High = 3,
    /// Time-sensitive work.
    Critical = 4,
}

impl Priority {
    /// Numeric rank; higher dispatches first.
    pub fn rank(self) -> u8 {
        self as u8
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Priority::Low => "low",
            Priority::Medium => "medium",
            Priority::High => "high",
            Priority::Critical => "critical",
        }
    }
}

impl fmt::Display for Priority {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Priority {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "low" => Ok(Priority::Low),
            "medium" => Ok(Priority::Medium),
            "high" => Ok(Priority::High),
            "critical" => Ok(Priority::Critical),
            other => Err(format!("unknown priority: {}", other)),
        }
    }
}

impl From<u8> for Priority {
    fn from(value: u8) -> Self {
        match value {
            v if v >= 4 => Priority::Critical,
            3 => Priority::High,
            2 => Priority::Medium,
            _ => Priority::Low,
        }
    }
}

/// Options accepted by `JobQueue::add_job`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct JobOptions {
    pub priority: Priority,
    /// Time before the first attempt becomes eligible.
    pub delay: Duration,
    pub max_attempts: u32,
    /// Base of the exponential backoff between attempts.
    pub retry_backoff: Duration,
}

impl Default for JobOptions {
    fn default() -> Self {
        Self {
            priority: Priority::Medium,
            delay: Duration::ZERO,
            max_attempts: 3,
            retry_backoff: Duration::from_millis(1000),
        }
    }
}

impl JobOptions {
    /// Set the priority.
    pub fn priority(mut self, priority: Priority) -> Self {
        self.priority = priority;
        self
    }

    /// Set the initial delay.
    pub fn delay(mut self, delay: Duration) -> Self {
        self.delay = delay;
        self
    }

    /// Set the attempt limit.
    pub fn max_attempts(mut self, max_attempts: u32) -> Self {
        self.max_attempts = max_attempts.max(1);
        self
    }

    /// Set the backoff base.
    pub fn retry_backoff(mut self, backoff: Duration) -> Self {
        self.retry_backoff = backoff;
        self
    }
}

/// A job owned by the queue until it reaches a terminal state.
#[derive(Debug, Clone)]
pub(crate) struct Job {
    pub id: JobId,
    pub job_type: String,
    pub payload: Value,
    pub priority: Priority,
    pub created_at: DateTime<Utc>,
    /// Insertion order; breaks creation-time ties.
    pub sequence: u64,
    pub attempts: u32,
    pub retry: RetryPolicy,
    /// Earliest instant the job may be dispatched.
    pub ready_at: Option<Instant>,
    pub next_attempt_at: Option<DateTime<Utc>>,
    pub last_error: Option<String>,
}

impl Job {
    pub fn new(job_type: String, payload: Value, options: JobOptions, sequence: u64) -> Self {
        let (ready_at, next_attempt_at) = if options.delay.is_zero() {
            (None, None)
        } else {
            (
                Some(Instant::now() + options.delay),
                chrono::Duration::from_std(options.delay)
                    .ok()
                    .and_then(|d| Utc::now().checked_add_signed(d)),
            )
        };

        Self {
            id: JobId::new(),
            job_type,
            payload,
            priority: options.priority,
            created_at: Utc::now(),
            sequence,
            attempts: 0,
            retry: RetryPolicy::new(options.max_attempts, options.retry_backoff),
            ready_at,
            next_attempt_at,
            last_error: None,
        }
    }

    pub fn is_ready(&self, now: Instant) -> bool {
        self.ready_at.map_or(true, |at| at <= now)
    }

    /// Ordering key: higher priority first, then older first.
    pub fn outranks(&self, other: &Job) -> bool {
        match self.priority.rank().cmp(&other.priority.rank()) {
            std::cmp::Ordering::Greater => true,
            std::cmp::Ordering::Less => false,
            std::cmp::Ordering::Equal => (self.created_at, self.sequence) < (other.created_at, other.sequence),
        }
    }

    pub fn snapshot(&self, status: JobStatus) -> JobSnapshot {
        JobSnapshot {
            id: self.id.clone(),
            job_type: self.job_type.clone(),
            status,
            priority: self.priority,
            attempts: self.attempts,
            max_attempts: self.retry.max_attempts,
            created_at: self.created_at,
            next_attempt_at: self.next_attempt_at,
            last_error: self.last_error.clone(),
        }
    }
}

/// Lifecycle state of a job.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum JobStatus {
    Pending,
    Processing,
    Completed,
    Failed,
}

impl JobStatus {
    pub fn is_terminal(self) -> bool {
        matches!(self, JobStatus::Completed | JobStatus::Failed)
    }
}

/// Immutable outcome of a job that reached a terminal state.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct JobResult {
    pub id: JobId,
    pub job_type: String,
    /// `Completed` or `Failed`.
    pub status: JobStatus,
    pub result: Option<Value>,
    pub error: Option<String>,
    pub attempts: u32,
    pub completed_at: DateTime<Utc>,
    #[serde(with = "duration_ms")]
    pub duration: Duration,
}

/// Point-in-time view of a job that has not finished.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct JobSnapshot {
    pub id: JobId,
    pub job_type: String,
    /// `Pending` or `Processing`.
    pub status: JobStatus,
    pub priority: Priority,
    pub attempts: u32,
    pub max_attempts: u32,
    pub created_at: DateTime<Utc>,
    pub next_attempt_at: Option<DateTime<Utc>>,
    pub last_error: Option<String>,
}

/// Answer to a status query.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "state", rename_all = "lowercase")]
pub enum JobStatusView {
    /// Still owned by the queue.
    Active(JobSnapshot),
    /// Reached a terminal state.
    Finished(JobResult),
}

impl JobStatusView {
    pub fn status(&self) -> JobStatus {
        match self {
            JobStatusView::Active(s) => s.status,
            JobStatusView::Finished(r) => r.status,
        }
    }
}

mod duration_ms {
    use serde::{Deserialize, Deserializer, Serializer};
    use std::time::Duration;

    pub fn serialize<S: Serializer>(d: &Duration, s: S) -> Result<S::Ok, S::Error> {
        s.serialize_u64(u64::try_from(d.as_millis()).unwrap_or(u64::MAX))
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(d: D) -> Result<Duration, D::Error> {
        u64::deserialize(d).map(Duration::from_millis)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_priority_rank_order() {
        assert!(Priority::Critical.rank() > Priority::High.rank());
        assert!(Priority::High.rank() > Priority::Medium.rank());
        assert!(Priority::Medium.rank() > Priority::Low.rank());
        assert_eq!(Priority::default(), Priority::Medium);
    }

    #[test]
    fn test_priority_parse() {
        assert_eq!("HIGH".parse::<Priority>().unwrap(), Priority::High);
        assert_eq!(Priority::from(4), Priority::Critical);
        assert_eq!(Priority::from(0), Priority::Low);
        assert!("urgent".parse::<Priority>().is_err());
    }

    #[test]
    fn test_job_options_defaults() {
        let options = JobOptions::default();
        assert_eq!(options.priority, Priority::Medium);
        assert_eq!(options.delay, Duration::ZERO);
        assert_eq!(options.max_attempts, 3);
        assert_eq!(options.retry_backoff, Duration::from_secs(1));
        assert_eq!(JobOptions::default().max_attempts(0).max_attempts, 1);
    }

    #[test]
    fn test_outranks() {
        let low = Job::new("a".into(), Value::Null, JobOptions::default().priority(Priority::Low), 1);
        let high = Job::new("a".into(), Value::Null, JobOptions::default().priority(Priority::High), 2);
        assert!(high.outranks(&low));
        assert!(!low.outranks(&high));

        let mut first = Job::new("a".into(), Value::Null, JobOptions::default(), 3);
        let mut second = Job::new("a".into(), Value::Null, JobOptions::default(), 4);
        second.created_at = first.created_at;
        assert!(first.outranks(&second));
        first.created_at = second.created_at + chrono::Duration::milliseconds(5);
        assert!(second.outranks(&first));
    }

    #[tokio::test(start_paused = true)]
    async fn test_delayed_job_not_ready() {
        let job = Job::new(
            "a".into(),
            Value::Null,
            JobOptions::default().delay(Duration::from_secs(2)),
            1,
        );
        assert!(!job.is_ready(Instant::now()));
        tokio::time::advance(Duration::from_secs(2)).await;
        assert!(job.is_ready(Instant::now()));
    }

    #[test]
    fn test_job_result_duration_serializes_as_millis() {
        let result = JobResult {
            id: JobId::from("job-1"),
            job_type: "report".into(),
            status: JobStatus::Completed,
            result: Some(serde_json::json!({"ok": true})),
            error: None,
            attempts: 1,
            completed_at: Utc::now(),
            duration: Duration::from_millis(1500),
        };
        let json = serde_json::to_value(&result).unwrap();
        assert_eq!(json["duration"], 1500);
        assert_eq!(json["status"], "completed");
    }
}
