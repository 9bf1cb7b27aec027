//! Insight snapshot jobs.
//!
//! A snapshot is a JSON summary of one org's state for a single scope. The
//! schedule enqueues one job per scope; the queue hands each payload to
//! [`InsightSnapshotProcessor`], which delegates to an [`InsightGenerator`].

use async_trait::async_trait;
use bosun_core::BosunResult;
use bosun_domain::DiagnosticSeverity;
use bosun_jobs::{JobError, JobId, JobOptions, JobProcessor, JobQueue, JobsResult, Priority};
use bosun_repository::{DiagnosticRepository, EquipmentRepository, FailoverRepository, RetrainingTriggerRepository};
use chrono::{Duration as ChronoDuration, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info};

/// Job type handled by [`InsightSnapshotProcessor`].
pub const INSIGHT_JOB_TYPE: &str = "insight_snapshot";

/// Attempts per snapshot job.
pub const SNAPSHOT_MAX_ATTEMPTS: u32 = 3;

/// Backoff base between snapshot attempts.
pub const SNAPSHOT_RETRY_BACKOFF: Duration = Duration::from_secs(5);

/// Area of the business a snapshot summarizes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum InsightScope {
    Fleet,
    Equipment,
    Maintenance,
    Compliance,
}

impl InsightScope {
    /// Every scope, in enqueue order.
    pub const ALL: [InsightScope; 4] = [
        InsightScope::Fleet,
        InsightScope::Equipment,
        InsightScope::Maintenance,
        InsightScope::Compliance,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            InsightScope::Fleet => "fleet",
            InsightScope::Equipment => "equipment",
            InsightScope::Maintenance => "maintenance",
            InsightScope::Compliance => "compliance",
        }
    }
}

impl fmt::Display for InsightScope {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for InsightScope {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        InsightScope::ALL
            .into_iter()
            .find(|scope| scope.as_str().eq_ignore_ascii_case(s))
            .ok_or_else(|| format!("Unknown insight scope: {}", s))
    }
}

/// Payload of an insight snapshot job.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct InsightJobPayload {
    pub org_id: String,
    pub scope: InsightScope,
}

/// Produces the snapshot document for an org and scope.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait InsightGenerator: Send + Sync {
    async fn generate(&self, org_id: &str, scope: InsightScope) -> BosunResult<Value>;
}

/// Builds snapshots from counts held in storage.
pub struct StoreInsightGenerator {
    equipment: Arc<dyn EquipmentRepository>,
    failovers: Arc<dyn FailoverRepository>,
    triggers: Arc<dyn RetrainingTriggerRepository>,
    diagnostics: Arc<dyn DiagnosticRepository>,
}

impl StoreInsightGenerator {
    /// Creates a new generator.
    pub fn new(
        equipment: Arc<dyn EquipmentRepository>,
        failovers: Arc<dyn FailoverRepository>,
        triggers: Arc<dyn RetrainingTriggerRepository>,
        diagnostics: Arc<dyn DiagnosticRepository>,
    ) -> Self {
        Self {
            equipment,
            failovers,
            triggers,
            diagnostics,
        }
    }
}

#[async_trait]
impl InsightGenerator for StoreInsightGenerator {
    async fn generate(&self, org_id: &str, scope: InsightScope) -> BosunResult<Value> {
        let since_day = Utc::now() - ChronoDuration::hours(24);

        let body = match scope {
            InsightScope::Fleet => {
                let equipment = self.equipment.find_active_by_org(org_id).await?;
                json!({
                    "active_equipment": equipment.len(),
                    "open_failovers": self.failovers.count_active(org_id).await?,
                    "pending_retraining_triggers": self.triggers.count_pending(org_id).await?,
                    "critical_diagnostics_24h": self
                        .diagnostics
                        .count_since(org_id, DiagnosticSeverity::Critical, since_day)
                        .await?,
                })
            }
            InsightScope::Equipment => {
                let equipment = self.equipment.find_active_by_org(org_id).await?;
                let mut by_type: BTreeMap<&str, usize> = BTreeMap::new();
                for item in &equipment {
                    *by_type.entry(item.equipment_type.as_str()).or_default() += 1;
                }
                json!({
                    "active_equipment": equipment.len(),
                    "by_type": by_type,
                })
            }
            InsightScope::Maintenance => json!({
                "pending_retraining_triggers": self.triggers.count_pending(org_id).await?,
                "open_failovers": self.failovers.count_active(org_id).await?,
            }),
            InsightScope::Compliance => {
                let since_week = Utc::now() - ChronoDuration::days(7);
                json!({
                    "critical_diagnostics_7d": self
                        .diagnostics
                        .count_since(org_id, DiagnosticSeverity::Critical, since_week)
                        .await?,
                    "error_diagnostics_7d": self
                        .diagnostics
                        .count_since(org_id, DiagnosticSeverity::Error, since_week)
                        .await?,
                })
            }
        };

        Ok(json!({
            "org_id": org_id,
            "scope": scope,
            "generated_at": Utc::now(),
            "summary": body,
        }))
    }
}

/// Queue processor for [`INSIGHT_JOB_TYPE`].
pub struct InsightSnapshotProcessor {
    generator: Arc<dyn InsightGenerator>,
}

impl InsightSnapshotProcessor {
    pub fn new(generator: Arc<dyn InsightGenerator>) -> Self {
        Self { generator }
    }
}

#[async_trait]
impl JobProcessor for InsightSnapshotProcessor {
    async fn process(&self, payload: Value) -> JobsResult<Value> {
        let payload: InsightJobPayload = serde_json::from_value(payload)?;
        debug!(org_id = %payload.org_id, scope = %payload.scope, "Generating insight snapshot");

        self.generator
            .generate(&payload.org_id, payload.scope)
            .await
            .map_err(JobError::from)
    }
}

fn snapshot_options(priority: Priority) -> JobOptions {
    JobOptions::default()
        .priority(priority)
        .max_attempts(SNAPSHOT_MAX_ATTEMPTS)
        .retry_backoff(SNAPSHOT_RETRY_BACKOFF)
}

fn snapshot_payload(org_id: &str, scope: InsightScope) -> Value {
    json!({ "org_id": org_id, "scope": scope })
}

/// Enqueues one medium-priority snapshot job per scope.
pub fn enqueue_all_scopes(queue: &JobQueue, org_id: &str) -> Vec<JobId> {
    let ids: Vec<JobId> = InsightScope::ALL
        .into_iter()
        .map(|scope| {
            queue.add_job(
                INSIGHT_JOB_TYPE,
                snapshot_payload(org_id, scope),
                snapshot_options(Priority::Medium),
            )
        })
        .collect();

    info!(org_id = %org_id, jobs = ids.len(), "Enqueued insight snapshots");
    ids
}

/// Enqueues a single high-priority snapshot job.
pub fn enqueue_snapshot(queue: &JobQueue, org_id: &str, scope: InsightScope) -> JobId {
    let id = queue.add_job(
        INSIGHT_JOB_TYPE,
        snapshot_payload(org_id, scope),
        snapshot_options(Priority::High),
    );
    info!(job_id = %id, org_id = %org_id, scope = %scope, "Enqueued manual insight snapshot");
    id
}
