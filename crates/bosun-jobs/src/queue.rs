//! In-process priority job queue.
//!
//! Dispatch selects the highest-priority ready job, oldest first on ties,
//! and starts at most one job per trigger while fewer than
//! `max_concurrent_jobs` are processing. Triggers are the periodic tick,
//! every enqueue, every completion, and every retry timer.

use crate::config::QueueConfig;
use crate::error::{panic_message, JobError, JobsResult};
use crate::events::QueueEvent;
use crate::job::{Job, JobId, JobOptions, JobResult, JobStatus, JobStatusView, Priority};
use crate::metrics::JobMetrics;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use futures::future::{BoxFuture, FutureExt};
use parking_lot::{Mutex, RwLock};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::{HashMap, HashSet, VecDeque};
use std::future::Future;
use std::panic::AssertUnwindSafe;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Weak};
use std::time::Duration;
use tokio::sync::broadcast;
use tokio::task::JoinHandle;
use tokio::time::{Instant, MissedTickBehavior};
use tracing::{debug, error, info, warn};

/// Handler for one job type.
#[async_trait]
pub trait JobProcessor: Send + Sync {
    /// Process a payload, returning the job result.
    async fn process(&self, payload: Value) -> JobsResult<Value>;
}

type ProcessorFn = dyn Fn(Value) -> BoxFuture<'static, JobsResult<Value>> + Send + Sync;

struct FnProcessor(Box<ProcessorFn>);

#[async_trait]
impl JobProcessor for FnProcessor {
    async fn process(&self, payload: Value) -> JobsResult<Value> {
        (self.0)(payload).await
    }
}

/// Queue counters.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct QueueStats {
    /// Jobs waiting to be dispatched, including those waiting on a backoff.
    pub pending: usize,
    /// Jobs currently running.
    pub processing: usize,
    /// Completed results not yet cleared.
    pub completed: usize,
    /// Failed results not yet cleared.
    pub failed: usize,
    /// Jobs that reached a terminal state since the queue was created.
    pub total_processed: u64,
}

#[derive(Default)]
struct QueueState {
    /// Pending and processing jobs.
    jobs: HashMap<JobId, Job>,
    processing: HashSet<JobId>,
    /// Terminal results by id, until `clear_completed`.
    results: HashMap<JobId, JobResult>,
    /// Terminal results, newest first.
    history: VecDeque<JobResult>,
    next_sequence: u64,
    total_processed: u64,
}

impl QueueState {
    fn record(&mut self, result: JobResult, max_history: usize) {
        self.results.insert(result.id.clone(), result.clone());
        self.history.push_front(result);
        self.history.truncate(max_history);
        self.total_processed += 1;
    }

    fn next_ready(&self, now: Instant) -> Option<&Job> {
        self.jobs
            .values()
            .filter(|job| !self.processing.contains(&job.id) && job.is_ready(now))
            .fold(None, |best: Option<&Job>, job| match best {
                Some(current) if !job.outranks(current) => Some(current),
                _ => Some(job),
            })
    }

    fn pending(&self) -> usize {
        self.jobs.len() - self.processing.len()
    }
}

struct QueueInner {
    config: QueueConfig,
    state: Mutex<QueueState>,
    processors: RwLock<HashMap<String, Arc<dyn JobProcessor>>>,
    running: AtomicBool,
    events: broadcast::Sender<QueueEvent>,
    ticker: Mutex<Option<JoinHandle<()>>>,
}

/// Priority job queue with retry and bounded history.
///
/// Cheap to clone; clones share the same queue.
#[derive(Clone)]
pub struct JobQueue {
    inner: Arc<QueueInner>,
}

impl JobQueue {
    /// Create a stopped queue.
    pub fn new(config: QueueConfig) -> Self {
        let (events, _) = broadcast::channel(config.event_capacity.max(1));

        Self {
            inner: Arc::new(QueueInner {
                config,
                state: Mutex::new(QueueState::default()),
                processors: RwLock::new(HashMap::new()),
                running: AtomicBool::new(false),
                events,
                ticker: Mutex::new(None),
            }),
        }
    }

    /// Register a closure as the processor for `job_type`, replacing any
    /// previous one.
    pub fn register_processor<F, Fut>(&self, job_type: impl Into<String>, processor: F)
    where
        F: Fn(Value) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = JobsResult<Value>> + Send + 'static,
    {
        let boxed: Box<ProcessorFn> = Box::new(move |payload| Box::pin(processor(payload)));
        self.register_handler(job_type, Arc::new(FnProcessor(boxed)));
    }

    /// Register a processor object for `job_type`, replacing any previous one.
    pub fn register_handler(&self, job_type: impl Into<String>, processor: Arc<dyn JobProcessor>) {
        let job_type = job_type.into();
        let replaced = self
            .inner
            .processors
            .write()
            .insert(job_type.clone(), processor)
            .is_some();
        if replaced {
            warn!(job_type = %job_type, "Replaced job processor");
        } else {
            info!(job_type = %job_type, "Registered job processor");
        }
    }

    /// Returns true if a processor exists for `job_type`.
    pub fn has_processor(&self, job_type: &str) -> bool {
        self.inner.processors.read().contains_key(job_type)
    }

    /// Enqueue a job and return its id.
    pub fn add_job(&self, job_type: impl Into<String>, payload: Value, options: JobOptions) -> JobId {
        let job_type = job_type.into();
        let delay = options.delay;

        let (id, priority) = {
            let mut state = self.inner.state.lock();
            let sequence = state.next_sequence;
            state.next_sequence += 1;
            let job = Job::new(job_type.clone(), payload, options, sequence);
            let id = job.id.clone();
            let priority = job.priority;
            state.jobs.insert(id.clone(), job);
            JobMetrics::update_queue_sizes(state.pending(), state.processing.len());
            (id, priority)
        };

        debug!(job_id = %id, job_type = %job_type, priority = %priority, delay_ms = delay.as_millis() as u64, "Job added");
        JobMetrics::job_enqueued(&job_type, priority.as_str());
        self.inner.emit(QueueEvent::JobAdded {
            job_id: id.clone(),
            job_type,
            priority,
        });

        if delay.is_zero() {
            self.inner.dispatch();
        } else {
            self.inner.wake_after(delay);
        }

        id
    }

    /// Enqueue with default options at the given priority.
    pub fn add(&self, job_type: impl Into<String>, payload: Value, priority: Priority) -> JobId {
        self.add_job(job_type, payload, JobOptions::default().priority(priority))
    }

    /// Start the periodic tick and event-driven dispatch. Idempotent.
    ///
    /// Must be called from within a Tokio runtime.
    pub fn start(&self) {
        if self.inner.running.swap(true, Ordering::SeqCst) {
            debug!("Job queue already running");
            return;
        }

        let weak: Weak<QueueInner> = Arc::downgrade(&self.inner);
        let tick = self.inner.config.tick_interval().max(Duration::from_millis(1));
        let handle = tokio::spawn(async move {
            let mut interval = tokio::time::interval(tick);
            interval.set_missed_tick_behavior(MissedTickBehavior::Delay);
            loop {
                interval.tick().await;
                let Some(inner) = weak.upgrade() else { break };
                if !inner.running.load(Ordering::SeqCst) {
                    break;
                }
                inner.dispatch();
            }
        });

        if let Some(previous) = self.inner.ticker.lock().replace(handle) {
            previous.abort();
        }

        info!(
            max_concurrent_jobs = self.inner.config.max_concurrent_jobs,
            tick_ms = self.inner.config.tick_interval_ms,
            "Job queue started"
        );
        self.inner.emit(QueueEvent::QueueStarted);
        self.inner.dispatch();
    }

    /// Stop dispatching new jobs. In-flight jobs run to completion. Idempotent.
    pub fn stop(&self) {
        if !self.inner.running.swap(false, Ordering::SeqCst) {
            debug!("Job queue already stopped");
            return;
        }

        if let Some(handle) = self.inner.ticker.lock().take() {
            handle.abort();
        }

        info!("Job queue stopped");
        self.inner.emit(QueueEvent::QueueStopped);
    }

    /// Returns true between `start` and `stop`.
    pub fn is_running(&self) -> bool {
        self.inner.running.load(Ordering::SeqCst)
    }

    /// Status of a job: terminal result, live snapshot, or history entry.
    pub fn get_job_status(&self, id: &JobId) -> Option<JobStatusView> {
        let state = self.inner.state.lock();

        if let Some(result) = state.results.get(id) {
            return Some(JobStatusView::Finished(result.clone()));
        }

        if let Some(job) = state.jobs.get(id) {
            let status = if state.processing.contains(id) {
                JobStatus::Processing
            } else {
                JobStatus::Pending
            };
            return Some(JobStatusView::Active(job.snapshot(status)));
        }

        state
            .history
            .iter()
            .find(|r| &r.id == id)
            .cloned()
            .map(JobStatusView::Finished)
    }

    /// Queue counters.
    pub fn get_stats(&self) -> QueueStats {
        let state = self.inner.state.lock();
        let failed = state
            .results
            .values()
            .filter(|r| r.status == JobStatus::Failed)
            .count();

        QueueStats {
            pending: state.pending(),
            processing: state.processing.len(),
            completed: state.results.len() - failed,
            failed,
            total_processed: state.total_processed,
        }
    }

    /// Up to `limit` terminal results, newest first.
    pub fn get_recent_jobs(&self, limit: usize) -> Vec<JobResult> {
        self.inner
            .state
            .lock()
            .history
            .iter()
            .take(limit)
            .cloned()
            .collect()
    }

    /// Drop the terminal-result map; history is kept. Returns the number removed.
    pub fn clear_completed(&self) -> usize {
        let cleared = {
            let mut state = self.inner.state.lock();
            let cleared = state.results.len();
            state.results.clear();
            cleared
        };
        info!(cleared, "Cleared terminal job results");
        cleared
    }

    /// Subscribe to queue events.
    pub fn subscribe(&self) -> broadcast::Receiver<QueueEvent> {
        self.inner.events.subscribe()
    }
}

impl Default for JobQueue {
    fn default() -> Self {
        Self::new(QueueConfig::default())
    }
}

enum Selection {
    Start(Job, Arc<dyn JobProcessor>),
    Orphan(JobResult),
}

impl QueueInner {
    fn emit(&self, event: QueueEvent) {
        // No receivers is fine.
        let _ = self.events.send(event);
    }

    /// Re-run dispatch after `delay`, if a runtime is available.
    fn wake_after(self: &Arc<Self>, delay: Duration) {
        let Ok(handle) = tokio::runtime::Handle::try_current() else {
            debug!(delay_ms = delay.as_millis() as u64, "No runtime for wake-up; relying on tick");
            return;
        };
        let weak = Arc::downgrade(self);
        handle.spawn(async move {
            tokio::time::sleep(delay).await;
            if let Some(inner) = weak.upgrade() {
                inner.dispatch();
            }
        });
    }

    /// Start at most one ready job.
    ///
    /// Jobs whose type has no processor are failed on the way and do not
    /// count as the started job.
    fn dispatch(self: &Arc<Self>) {
        loop {
            if !self.running.load(Ordering::SeqCst) {
                return;
            }

            let selection = {
                let mut state = self.state.lock();
                if state.processing.len() >= self.config.max_concurrent_jobs {
                    return;
                }

                let Some(id) = state.next_ready(Instant::now()).map(|job| job.id.clone()) else {
                    return;
                };

                let job_type = match state.jobs.get(&id) {
                    Some(job) => job.job_type.clone(),
                    None => return,
                };
                let processor = self.processors.read().get(&job_type).cloned();

                match processor {
                    Some(processor) => {
                        let Some(job) = state.jobs.get_mut(&id) else { return };
                        job.attempts += 1;
                        job.ready_at = None;
                        job.next_attempt_at = None;
                        let job = job.clone();
                        state.processing.insert(id);
                        JobMetrics::update_queue_sizes(state.pending(), state.processing.len());
                        Selection::Start(job, processor)
                    }
                    None => {
                        let Some(job) = state.jobs.remove(&id) else { return };
                        let result = JobResult {
                            id: job.id,
                            job_type: job.job_type.clone(),
                            status: JobStatus::Failed,
                            result: None,
                            error: Some(JobError::NoProcessor(job.job_type).to_string()),
                            attempts: job.attempts.max(1),
                            completed_at: Utc::now(),
                            duration: Duration::ZERO,
                        };
                        state.record(result.clone(), self.config.max_history_size);
                        JobMetrics::update_queue_sizes(state.pending(), state.processing.len());
                        Selection::Orphan(result)
                    }
                }
            };

            match selection {
                Selection::Orphan(result) => {
                    error!(job_id = %result.id, job_type = %result.job_type, "No processor registered; job failed");
                    JobMetrics::job_failed(&result.job_type, "no_processor", Duration::ZERO);
                    self.emit(QueueEvent::JobFailed { result });
                }
                Selection::Start(job, processor) => {
                    self.spawn_job(job, processor);
                    return;
                }
            }
        }
    }

    fn spawn_job(self: &Arc<Self>, job: Job, processor: Arc<dyn JobProcessor>) {
        debug!(job_id = %job.id, job_type = %job.job_type, attempt = job.attempts, "Job started");
        JobMetrics::job_started(&job.job_type);
        self.emit(QueueEvent::JobStarted {
            job_id: job.id.clone(),
            job_type: job.job_type.clone(),
            attempt: job.attempts,
        });

        let inner = Arc::clone(self);
        tokio::spawn(async move {
            let started = Instant::now();
            let outcome = AssertUnwindSafe(processor.process(job.payload))
                .catch_unwind()
                .await
                .unwrap_or_else(|panic| Err(JobError::execution(panic_message(panic.as_ref()))));
            inner.finish(&job.id, outcome, started.elapsed());
            inner.dispatch();
        });
    }

    fn finish(self: &Arc<Self>, id: &JobId, outcome: JobsResult<Value>, elapsed: Duration) {
        let mut retry_delay = None;

        let event = {
            let mut state = self.state.lock();
            state.processing.remove(id);
            let Some(mut job) = state.jobs.remove(id) else {
                warn!(job_id = %id, "Finished job was not tracked");
                return;
            };

            let event = match outcome {
                Ok(value) => {
                    let result = JobResult {
                        id: job.id.clone(),
                        job_type: job.job_type.clone(),
                        status: JobStatus::Completed,
                        result: Some(value),
                        error: None,
                        attempts: job.attempts,
                        completed_at: Utc::now(),
                        duration: elapsed,
                    };
                    state.record(result.clone(), self.config.max_history_size);
                    QueueEvent::JobCompleted { result }
                }
                Err(err) if job.retry.should_retry(job.attempts) => {
                    let delay = job.retry.delay_for_attempt(job.attempts);
                    let next_attempt_at = chrono::Duration::from_std(delay)
                        .ok()
                        .and_then(|d| Utc::now().checked_add_signed(d))
                        .unwrap_or(DateTime::<Utc>::MAX_UTC);
                    let message = err.to_string();
                    job.ready_at = Some(Instant::now() + delay);
                    job.next_attempt_at = Some(next_attempt_at);
                    job.last_error = Some(message.clone());

                    let event = QueueEvent::JobRetrying {
                        job_id: job.id.clone(),
                        job_type: job.job_type.clone(),
                        attempt: job.attempts,
                        error: message,
                        delay,
                        next_attempt_at,
                    };
                    state.jobs.insert(job.id.clone(), job);
                    retry_delay = Some(delay);
                    event
                }
                Err(err) => {
                    let result = JobResult {
                        id: job.id.clone(),
                        job_type: job.job_type.clone(),
                        status: JobStatus::Failed,
                        result: None,
                        error: Some(err.to_string()),
                        attempts: job.attempts,
                        completed_at: Utc::now(),
                        duration: elapsed,
                    };
                    state.record(result.clone(), self.config.max_history_size);
                    QueueEvent::JobFailed { result }
                }
            };

            JobMetrics::update_queue_sizes(state.pending(), state.processing.len());
            event
        };

        match &event {
            QueueEvent::JobCompleted { result } => {
                info!(job_id = %result.id, job_type = %result.job_type, duration_ms = elapsed.as_millis() as u64, "Job completed");
                JobMetrics::job_completed(&result.job_type, elapsed);
            }
            QueueEvent::JobFailed { result } => {
                error!(
                    job_id = %result.id,
                    job_type = %result.job_type,
                    attempts = result.attempts,
                    error = result.error.as_deref().unwrap_or_default(),
                    "Job failed permanently"
                );
                JobMetrics::job_failed(&result.job_type, "exhausted", elapsed);
            }
            QueueEvent::JobRetrying { job_id, job_type, attempt, error, delay, .. } => {
                warn!(
                    job_id = %job_id,
                    job_type = %job_type,
                    attempt = *attempt,
                    delay_ms = delay.as_millis() as u64,
                    error = %error,
                    "Job failed; retrying"
                );
                JobMetrics::job_retried(job_type, *attempt);
            }
            _ => {}
        }
        self.emit(event);

        if let Some(delay) = retry_delay {
            self.wake_after(delay);
        }
    }
}
