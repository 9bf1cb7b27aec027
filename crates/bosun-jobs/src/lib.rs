//! Bosun Jobs - In-process Job Queue and Schedule Registry
//!
//! Background work for the fleet backend:
//! - Priority job queue (critical, high, medium, low) with FIFO ordering on ties
//! - Bounded concurrency driven by a periodic tick and by queue events
//! - Per-job retry with exponential backoff
//! - Bounded, newest-first history of finished jobs
//! - Lifecycle events over a broadcast channel
//! - Named cron schedules registered at most once per process
//!
//! # Architecture
//!
//! ```text
//!  add_job ──► pending jobs ──► dispatch (≤ max_concurrent_jobs) ──► processor
//!                  ▲                                                   │
//!                  │            retry after backoff × 2^(n-1)          │
//!                  └──────────────────────────────────────────────────┤
//!                                                                      ▼
//!                                                     results + history + events
//! ```
//!
//! # Example
//!
//! ```rust,ignore
//! use bosun_jobs::{JobOptions, JobQueue, Priority, QueueConfig};
//! use serde_json::json;
//!
//! let queue = JobQueue::new(QueueConfig::default());
//! queue.register_processor("insight_snapshot", |payload| async move {
//!     Ok(json!({ "scope": payload["scope"] }))
//! });
//! queue.start();
//!
//! let id = queue.add_job(
//!     "insight_snapshot",
//!     json!({ "scope": "fleet" }),
//!     JobOptions::default().priority(Priority::High),
//! );
//! ```

pub mod config;
pub mod error;
pub mod events;
pub mod job;
pub mod metrics;
pub mod queue;
pub mod retry;
pub mod scheduler;

pub use config::QueueConfig;
pub use error::{JobError, JobsResult};
pub use events::QueueEvent;
pub use job::{JobId, JobOptions, JobResult, JobSnapshot, JobStatus, JobStatusView, Priority};
pub use metrics::{register_metrics, JobMetrics, ScheduleMetrics};
pub use queue::{JobProcessor, JobQueue, QueueStats};
pub use retry::RetryPolicy;
pub use scheduler::{cron_expressions, parse_cron, ScheduleInfo, ScheduleRegistry};

/// Re-export commonly used types
pub mod prelude {
    pub use crate::job::{JobId, JobOptions, JobStatus, Priority};
    pub use crate::queue::{JobProcessor, JobQueue};
    pub use crate::scheduler::ScheduleRegistry;
    pub use crate::{JobError, JobsResult};
}
