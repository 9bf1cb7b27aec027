//! Prometheus metrics for queue and schedule monitoring.

use metrics::{counter, describe_counter, describe_gauge, describe_histogram, gauge, histogram};
use std::time::Duration;

/// Metric names for the job queue system.
pub mod names {
    /// Total jobs enqueued.
    pub const JOBS_ENQUEUED_TOTAL: &str = "bosun_jobs_enqueued_total";
    /// Total job attempts started.
    pub const JOBS_STARTED_TOTAL: &str = "bosun_jobs_started_total";
    /// Total jobs completed successfully.
    pub const JOBS_COMPLETED_TOTAL: &str = "bosun_jobs_completed_total";
    /// Total jobs failed permanently.
    pub const JOBS_FAILED_TOTAL: &str = "bosun_jobs_failed_total";
    /// Total jobs retried.
    pub const JOBS_RETRIED_TOTAL: &str = "bosun_jobs_retried_total";

    /// Current pending jobs.
    pub const JOBS_PENDING: &str = "bosun_jobs_pending";
    /// Current processing jobs.
    pub const JOBS_PROCESSING: &str = "bosun_jobs_processing";

    /// Job execution duration in seconds.
    pub const JOB_DURATION_SECONDS: &str = "bosun_job_duration_seconds";

    /// Scheduled runs fired.
    pub const SCHEDULE_RUNS_TOTAL: &str = "bosun_schedule_runs_total";
    /// Scheduled runs that returned an error.
    pub const SCHEDULE_FAILURES_TOTAL: &str = "bosun_schedule_failures_total";
}

/// Register all metric descriptions.
pub fn register_metrics() {
    describe_counter!(names::JOBS_ENQUEUED_TOTAL, "Total number of jobs enqueued");
    describe_counter!(names::JOBS_STARTED_TOTAL, "Total number of job attempts started");
    describe_counter!(names::JOBS_COMPLETED_TOTAL, "Total number of jobs completed successfully");
    describe_counter!(names::JOBS_FAILED_TOTAL, "Total number of jobs that failed permanently");
    describe_counter!(names::JOBS_RETRIED_TOTAL, "Total number of job retries");

    describe_gauge!(names::JOBS_PENDING, "Current number of pending jobs");
    describe_gauge!(names::JOBS_PROCESSING, "Current number of processing jobs");

    describe_histogram!(names::JOB_DURATION_SECONDS, "Job execution duration in seconds");

    describe_counter!(names::SCHEDULE_RUNS_TOTAL, "Total number of scheduled runs fired");
    describe_counter!(names::SCHEDULE_FAILURES_TOTAL, "Total number of scheduled runs that failed");
}

/// Job metrics recorder.
#[derive(Clone)]
pub struct JobMetrics;

impl JobMetrics {
    /// Record a job enqueued.
    pub fn job_enqueued(job_type: &str, priority: &str) {
        counter!(
            names::JOBS_ENQUEUED_TOTAL,
            "job_type" => job_type.to_string(),
            "priority" => priority.to_string()
        )
        .increment(1);
    }

    /// Record an attempt started.
    pub fn job_started(job_type: &str) {
        counter!(names::JOBS_STARTED_TOTAL, "job_type" => job_type.to_string()).increment(1);
    }

    /// Record a job completed.
    pub fn job_completed(job_type: &str, duration: Duration) {
        counter!(names::JOBS_COMPLETED_TOTAL, "job_type" => job_type.to_string()).increment(1);

        histogram!(
            names::JOB_DURATION_SECONDS,
            "job_type" => job_type.to_string(),
            "status" => "completed"
        )
        .record(duration.as_secs_f64());
    }

    /// Record a job failed.
    pub fn job_failed(job_type: &str, reason: &str, duration: Duration) {
        counter!(
            names::JOBS_FAILED_TOTAL,
            "job_type" => job_type.to_string(),
            "reason" => reason.to_string()
        )
        .increment(1);

        histogram!(
            names::JOB_DURATION_SECONDS,
            "job_type" => job_type.to_string(),
            "status" => "failed"
        )
        .record(duration.as_secs_f64());
    }

    /// Record a job retried.
    pub fn job_retried(job_type: &str, attempt: u32) {
        counter!(
            names::JOBS_RETRIED_TOTAL,
            "job_type" => job_type.to_string(),
            "attempt" => attempt.to_string()
        )
        .increment(1);
    }

    /// Update queue size gauges.
    pub fn update_queue_sizes(pending: usize, processing: usize) {
        gauge!(names::JOBS_PENDING).set(pending as f64);
        gauge!(names::JOBS_PROCESSING).set(processing as f64);
    }
}

/// Schedule metrics recorder.
#[derive(Clone)]
pub struct ScheduleMetrics;

impl ScheduleMetrics {
    /// Record a scheduled run.
    pub fn run_fired(schedule: &str) {
        counter!(names::SCHEDULE_RUNS_TOTAL, "schedule" => schedule.to_string()).increment(1);
    }

    /// Record a failed scheduled run.
    pub fn run_failed(schedule: &str) {
        counter!(names::SCHEDULE_FAILURES_TOTAL, "schedule" => schedule.to_string()).increment(1);
    }
}
