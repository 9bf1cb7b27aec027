//! Queue lifecycle events.

use crate::job::{JobId, JobResult, Priority};
use chrono::{DateTime, Utc};
use serde::Serialize;
use std::time::Duration;

/// Event published on the queue's broadcast channel.
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "event")]
pub enum QueueEvent {
    #[serde(rename = "job:added")]
    JobAdded {
        job_id: JobId,
        job_type: String,
        priority: Priority,
    },
    #[serde(rename = "job:started")]
    JobStarted {
        job_id: JobId,
        job_type: String,
        attempt: u32,
    },
    #[serde(rename = "job:completed")]
    JobCompleted { result: JobResult },
    #[serde(rename = "job:failed")]
    JobFailed { result: JobResult },
    #[serde(rename = "job:retrying")]
    JobRetrying {
        job_id: JobId,
        job_type: String,
        attempt: u32,
        error: String,
        #[serde(skip)]
        delay: Duration,
        next_attempt_at: DateTime<Utc>,
    },
    #[serde(rename = "queue:started")]
    QueueStarted,
    #[serde(rename = "queue:stopped")]
    QueueStopped,
}

impl QueueEvent {
    /// Event name as published to listeners.
    pub fn name(&self) -> &'static str {
        match self {
            QueueEvent::JobAdded { .. } => "job:added",
            QueueEvent::JobStarted { .. } => "job:started",
            QueueEvent::JobCompleted { .. } => "job:completed",
            QueueEvent::JobFailed { .. } => "job:failed",
            QueueEvent::JobRetrying { .. } => "job:retrying",
            QueueEvent::QueueStarted => "queue:started",
            QueueEvent::QueueStopped => "queue:stopped",
        }
    }

    /// The job this event concerns, if any.
    pub fn job_id(&self) -> Option<&JobId> {
        match self {
            QueueEvent::JobAdded { job_id, .. }
            | QueueEvent::JobStarted { job_id, .. }
            | QueueEvent::JobRetrying { job_id, .. } => Some(job_id),
            QueueEvent::JobCompleted { result } | QueueEvent::JobFailed { result } => Some(&result.id),
            QueueEvent::QueueStarted | QueueEvent::QueueStopped => None,
        }
    }
}
