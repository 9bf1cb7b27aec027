//! Server startup utilities.

use bosun_jobs::ScheduleInfo;
use tracing::info;

/// Prints the startup banner.
pub fn print_banner() {
    info!(r#"
    ____
   / __ )____  _______  ______
  / __  / __ \/ ___/ / / / __ \
 / /_/ / /_/ (__  ) /_/ / / / /
/_____/\____/____/\__,_/_/ /_/

           Fleet Worker
    "#);
}

/// Prints the registered schedules and their next fire times.
pub fn print_startup_info(max_concurrent_jobs: usize, schedules: &[ScheduleInfo]) {
    let separator = "=".repeat(60);
    info!("{}", separator);
    info!("Job workers: {}", max_concurrent_jobs);
    for schedule in schedules {
        let next = schedule
            .next_run
            .map(|t| t.to_rfc3339())
            .unwrap_or_else(|| "never".to_string());
        info!("Schedule:  {:<24} {:<16} next {}", schedule.name, schedule.cron, next);
    }
    info!("{}", separator);
}
