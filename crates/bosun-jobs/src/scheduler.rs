//! Process-wide registry of recurring cron tasks.
//!
//! Each schedule is registered at most once per registry; a second
//! registration under the same name is a logged no-op. Every schedule
//! runs on its own Tokio task that sleeps until the next fire time. A
//! failing or panicking run is logged and the schedule keeps firing.

use crate::error::{panic_message, JobError, JobsResult};
use crate::metrics::ScheduleMetrics;
use chrono::{DateTime, Utc};
use cron::Schedule;
use futures::future::{BoxFuture, FutureExt};
use parking_lot::{Mutex, RwLock};
use std::collections::HashMap;
use std::future::Future;
use std::panic::AssertUnwindSafe;
use std::str::FromStr;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

/// Body of a scheduled run.
pub type ScheduledTask = Arc<dyn Fn() -> BoxFuture<'static, anyhow::Result<()>> + Send + Sync>;

/// Parse a cron expression.
///
/// Accepts the five-field crontab form (`min hour dom month dow`) and the
/// six- or seven-field form with seconds. Five-field expressions fire at
/// second zero and use crontab day-of-week numbering (0 or 7 is Sunday).
pub fn parse_cron(expr: &str) -> JobsResult<Schedule> {
    let fields: Vec<&str> = expr.split_whitespace().collect();
    let normalized = match fields.len() {
        5 => {
            let day_of_week = crontab_day_of_week(fields[4])
                .map_err(|e| JobError::Configuration(format!("Invalid cron expression '{}': {}", expr, e)))?;
            format!("0 {} {}", fields[..4].join(" "), day_of_week)
        }
        6 | 7 => fields.join(" "),
        n => {
            return Err(JobError::Configuration(format!(
                "Invalid cron expression '{}': expected 5 to 7 fields, got {}",
                expr, n
            )))
        }
    };

    Schedule::from_str(&normalized)
        .map_err(|e| JobError::Configuration(format!("Invalid cron expression '{}': {}", expr, e)))
}

/// Rewrite a crontab day-of-week field (0-7, Sunday = 0 or 7) as the
/// explicit list of `cron` crate days (1-7, Sunday = 1).
///
/// Wildcards and day names are kept as written.
fn crontab_day_of_week(field: &str) -> Result<String, String> {
    if field == "*" || field == "?" || field.chars().any(|c| c.is_ascii_alphabetic()) {
        return Ok(field.to_string());
    }

    let mut days = [false; 7];
    for item in field.split(',') {
        let (range, step) = match item.split_once('/') {
            Some((range, step)) => {
                let step: u8 = step.parse().map_err(|_| format!("invalid step '{}'", step))?;
                if step == 0 {
                    return Err("step must be positive".to_string());
                }
                (range, step)
            }
            None => (item, 1),
        };

        let (start, end) = match range {
            "*" => (0, 6),
            _ => match range.split_once('-') {
                Some((start, end)) => (parse_weekday(start)?, parse_weekday(end)?),
                None if step > 1 => (parse_weekday(range)?, 6),
                None => {
                    let day = parse_weekday(range)?;
                    (day, day)
                }
            },
        };
        if start > end {
            return Err(format!("day-of-week range '{}' is reversed", range));
        }

        for day in (start..=end).step_by(usize::from(step)) {
            days[usize::from(day % 7)] = true;
        }
    }

    let translated: Vec<String> = days
        .iter()
        .enumerate()
        .filter(|(_, set)| **set)
        .map(|(day, _)| (day + 1).to_string())
        .collect();
    Ok(translated.join(","))
}

fn parse_weekday(value: &str) -> Result<u8, String> {
    match value.parse::<u8>() {
        Ok(day) if day <= 7 => Ok(day),
        _ => Err(format!("invalid day of week '{}'", value)),
    }
}

#[derive(Default)]
struct RunStats {
    runs: AtomicU64,
    failures: AtomicU64,
    last_run: Mutex<Option<DateTime<Utc>>>,
    last_error: Mutex<Option<String>>,
}

struct ScheduleEntry {
    cron: String,
    schedule: Schedule,
    task: ScheduledTask,
    stats: Arc<RunStats>,
    handle: Option<JoinHandle<()>>,
}

/// Information about a registered schedule.
#[derive(Debug, Clone)]
pub struct ScheduleInfo {
    /// Schedule name.
    pub name: String,

    /// Cron expression as registered.
    pub cron: String,

    /// Next fire time.
    pub next_run: Option<DateTime<Utc>>,

    /// Last fire time.
    pub last_run: Option<DateTime<Utc>>,

    /// Number of runs, scheduled or manual.
    pub runs: u64,

    /// Number of runs that returned an error.
    pub failures: u64,

    /// Error of the most recent failing run.
    pub last_error: Option<String>,
}

/// Registry of named cron schedules.
#[derive(Default)]
pub struct ScheduleRegistry {
    entries: RwLock<HashMap<String, ScheduleEntry>>,
}

impl ScheduleRegistry {
    /// Create an empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Register `task` under `name` and start firing it on `cron_expr`.
    ///
    /// Returns `Ok(false)` without touching the existing schedule if `name`
    /// is already registered. Must be called from within a Tokio runtime.
    pub fn register_once<F, Fut>(&self, name: &str, cron_expr: &str, task: F) -> JobsResult<bool>
    where
        F: Fn() -> Fut + Send + Sync + 'static,
        Fut: Future<Output = anyhow::Result<()>> + Send + 'static,
    {
        let mut entries = self.entries.write();
        if entries.contains_key(name) {
            warn!(schedule = %name, "Schedule already registered; ignoring");
            return Ok(false);
        }

        let schedule = parse_cron(cron_expr)?;
        let task: ScheduledTask = Arc::new(move || Box::pin(task()));
        let stats = Arc::new(RunStats::default());
        let handle = tokio::spawn(run_loop(
            name.to_string(),
            schedule.clone(),
            task.clone(),
            stats.clone(),
        ));

        entries.insert(
            name.to_string(),
            ScheduleEntry {
                cron: cron_expr.to_string(),
                schedule,
                task,
                stats,
                handle: Some(handle),
            },
        );

        info!(schedule = %name, cron = %cron_expr, "Registered schedule");
        Ok(true)
    }

    /// Returns true if `name` is registered.
    pub fn is_registered(&self, name: &str) -> bool {
        self.entries.read().contains_key(name)
    }

    /// List all registered schedules, sorted by name.
    pub fn list(&self) -> Vec<ScheduleInfo> {
        let now = Utc::now();
        let mut infos: Vec<ScheduleInfo> = self
            .entries
            .read()
            .iter()
            .map(|(name, entry)| ScheduleInfo {
                name: name.clone(),
                cron: entry.cron.clone(),
                next_run: entry.schedule.after(&now).next(),
                last_run: *entry.stats.last_run.lock(),
                runs: entry.stats.runs.load(Ordering::Relaxed),
                failures: entry.stats.failures.load(Ordering::Relaxed),
                last_error: entry.stats.last_error.lock().clone(),
            })
            .collect();
        infos.sort_by(|a, b| a.name.cmp(&b.name));
        infos
    }

    /// Run a schedule's task now and propagate its error.
    pub async fn trigger(&self, name: &str) -> JobsResult<()> {
        let (task, stats) = {
            let entries = self.entries.read();
            let entry = entries
                .get(name)
                .ok_or_else(|| JobError::NotFound(format!("Schedule not found: {}", name)))?;
            (entry.task.clone(), entry.stats.clone())
        };

        info!(schedule = %name, "Manually triggering schedule");
        execute(name, &task, &stats).await.map_err(JobError::from)
    }

    /// Stop every schedule loop. Registrations are kept, so a later
    /// `register_once` for the same name is still a no-op.
    pub fn shutdown(&self) {
        let mut entries = self.entries.write();
        for (name, entry) in entries.iter_mut() {
            if let Some(handle) = entry.handle.take() {
                handle.abort();
                debug!(schedule = %name, "Stopped schedule");
            }
        }
        info!(schedules = entries.len(), "Schedule registry shut down");
    }
}

impl Drop for ScheduleRegistry {
    fn drop(&mut self) {
        for entry in self.entries.get_mut().values_mut() {
            if let Some(handle) = entry.handle.take() {
                handle.abort();
            }
        }
    }
}

async fn execute(name: &str, task: &ScheduledTask, stats: &RunStats) -> anyhow::Result<()> {
    stats.runs.fetch_add(1, Ordering::Relaxed);
    *stats.last_run.lock() = Some(Utc::now());
    ScheduleMetrics::run_fired(name);

    let result = AssertUnwindSafe(task())
        .catch_unwind()
        .await
        .unwrap_or_else(|panic| Err(anyhow::anyhow!(panic_message(panic.as_ref()))));
    if let Err(e) = &result {
        stats.failures.fetch_add(1, Ordering::Relaxed);
        *stats.last_error.lock() = Some(format!("{:#}", e));
        ScheduleMetrics::run_failed(name);
    }
    result
}

async fn run_loop(name: String, schedule: Schedule, task: ScheduledTask, stats: Arc<RunStats>) {
    loop {
        let Some(next) = schedule.upcoming(Utc).next() else {
            warn!(schedule = %name, "Schedule has no upcoming fire time; stopping");
            return;
        };

        let wait = (next - Utc::now()).to_std().unwrap_or(Duration::ZERO);
        debug!(schedule = %name, next_run = %next, "Waiting for next run");
        tokio::time::sleep(wait).await;

        match execute(&name, &task, &stats).await {
            Ok(()) => debug!(schedule = %name, "Scheduled run finished"),
            Err(e) => error!(schedule = %name, error = %format!("{:#}", e), "Scheduled run failed"),
        }
    }
}

/// Common cron expressions.
pub mod cron_expressions {
    /// Every second.
    pub const EVERY_SECOND: &str = "* * * * * *";

    /// Every hour.
    pub const EVERY_HOUR: &str = "0 0 * * * *";

    /// Every six hours, on the hour.
    pub const EVERY_6_HOURS: &str = "0 0 */6 * * *";

    /// Every day at 3 AM.
    pub const DAILY_3AM: &str = "0 0 3 * * *";

    /// Every day at 4 AM.
    pub const DAILY_4AM: &str = "0 0 4 * * *";
}
