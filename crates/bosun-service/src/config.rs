//! Fleet schedule configuration.

use serde::{Deserialize, Serialize};

/// Cron expressions and scope of the recurring fleet schedules.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScheduleConfig {
    /// Organization the scheduled sweeps run for.
    #[serde(default = "default_org_id")]
    pub default_org_id: String,

    /// Insight snapshot schedule.
    #[serde(default = "default_insights_cron")]
    pub insights_cron: String,

    /// Predictive maintenance sweep schedule.
    #[serde(default = "default_pdm_cron")]
    pub pdm_cron: String,

    /// Retraining evaluation schedule.
    #[serde(default = "default_retraining_cron")]
    pub retraining_cron: String,
}

fn default_org_id() -> String {
    "default-org-id".to_string()
}

fn default_insights_cron() -> String {
    "0 3 * * *".to_string()
}

fn default_pdm_cron() -> String {
    "0 */6 * * *".to_string()
}

fn default_retraining_cron() -> String {
    "0 4 * * *".to_string()
}

impl Default for ScheduleConfig {
    fn default() -> Self {
        Self {
            default_org_id: default_org_id(),
            insights_cron: default_insights_cron(),
            pdm_cron: default_pdm_cron(),
            retraining_cron: default_retraining_cron(),
        }
    }
}

impl ScheduleConfig {
    /// All configured cron expressions, labelled by key.
    pub fn cron_expressions(&self) -> [(&'static str, &str); 3] {
        [
            ("insights_cron", self.insights_cron.as_str()),
            ("pdm_cron", self.pdm_cron.as_str()),
            ("retraining_cron", self.retraining_cron.as_str()),
        ]
    }
}
