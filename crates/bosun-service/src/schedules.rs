//! Recurring fleet schedules and their manual entry points.
//!
//! | schedule | default | work |
//! |---|---|---|
//! | `insight-snapshots` | daily 03:00 | one medium-priority snapshot job per scope |
//! | `predictive-maintenance` | every 6 hours | failure prediction sweep |
//! | `model-retraining` | daily 04:00 | evaluate models, persist triggers |
//!
//! Scheduled runs log their own failures. Manual entry points return them.

use crate::config::ScheduleConfig;
use crate::insights::{self, InsightScope};
use crate::pdm::PredictiveMaintenanceSweep;
use crate::retraining::RetrainingEvaluator;
use bosun_core::BosunResult;
use bosun_jobs::{JobId, JobQueue, JobsResult, ScheduleRegistry};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::info;

/// Registered schedule names.
pub mod schedule_names {
    pub const INSIGHTS: &str = "insight-snapshots";
    pub const PREDICTIVE_MAINTENANCE: &str = "predictive-maintenance";
    pub const RETRAINING: &str = "model-retraining";
}

/// Result of a retraining run.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RetrainingRunSummary {
    /// Models evaluated.
    pub evaluations: usize,
    /// Models with at least one trigger.
    pub needs_retraining: usize,
    /// Trigger records persisted by this run.
    pub triggers_created: usize,
}

/// The fleet's recurring background work.
pub struct FleetSchedules {
    config: ScheduleConfig,
    queue: JobQueue,
    sweep: Arc<PredictiveMaintenanceSweep>,
    evaluator: Arc<RetrainingEvaluator>,
}

impl FleetSchedules {
    /// Creates the schedules. Nothing fires until [`FleetSchedules::register`].
    pub fn new(
        config: ScheduleConfig,
        queue: JobQueue,
        sweep: Arc<PredictiveMaintenanceSweep>,
        evaluator: Arc<RetrainingEvaluator>,
    ) -> Self {
        Self {
            config,
            queue,
            sweep,
            evaluator,
        }
    }

    /// Registers all three schedules. Returns how many were newly
    /// registered; schedules already present are left untouched.
    pub fn register(self: &Arc<Self>, registry: &ScheduleRegistry) -> JobsResult<usize> {
        let mut registered = 0;

        let this = Arc::clone(self);
        if registry.register_once(schedule_names::INSIGHTS, &self.config.insights_cron, move || {
            let this = Arc::clone(&this);
            async move {
                this.run_insight_snapshots();
                Ok(())
            }
        })? {
            registered += 1;
        }

        let this = Arc::clone(self);
        if registry.register_once(
            schedule_names::PREDICTIVE_MAINTENANCE,
            &self.config.pdm_cron,
            move || {
                let this = Arc::clone(&this);
                async move {
                    this.sweep.run_all(&this.config.default_org_id).await?;
                    Ok(())
                }
            },
        )? {
            registered += 1;
        }

        let this = Arc::clone(self);
        if registry.register_once(schedule_names::RETRAINING, &self.config.retraining_cron, move || {
            let this = Arc::clone(&this);
            async move {
                this.run_retraining_check().await?;
                Ok(())
            }
        })? {
            registered += 1;
        }

        info!(registered, "Fleet schedules registered");
        Ok(registered)
    }

    /// Enqueues snapshot jobs for every scope of the default org.
    pub fn run_insight_snapshots(&self) -> Vec<JobId> {
        insights::enqueue_all_scopes(&self.queue, &self.config.default_org_id)
    }

    /// Enqueues one high-priority snapshot and returns its job id.
    pub fn trigger_insight_snapshot(&self, org_id: &str, scope: InsightScope) -> JobId {
        insights::enqueue_snapshot(&self.queue, org_id, scope)
    }

    /// Runs the predictive maintenance sweep for one equipment item, or for
    /// all active equipment of the default org. Returns the number of
    /// equipment above the risk threshold.
    pub async fn trigger_predictive_maintenance(&self, equipment_id: Option<&str>) -> BosunResult<usize> {
        let summary = match equipment_id {
            Some(id) => self.sweep.run_for_equipment(id).await?,
            None => self.sweep.run_all(&self.config.default_org_id).await?,
        };
        Ok(summary.high_risk_count())
    }

    /// Evaluates all active models and persists triggers for those that
    /// need retraining.
    pub async fn run_retraining_check(&self) -> BosunResult<RetrainingRunSummary> {
        let evaluations = self.evaluator.evaluate_all().await?;
        let needing: Vec<_> = evaluations.iter().filter(|e| e.should_retrain).cloned().collect();

        for evaluation in &needing {
            info!(
                model_id = %evaluation.model_id,
                model = %evaluation.model_name,
                priority = %evaluation.priority,
                reasons = %evaluation.reasons(),
                "Model needs retraining"
            );
        }

        let triggers_created = self.evaluator.create_triggers(&needing).await?;
        let summary = RetrainingRunSummary {
            evaluations: evaluations.len(),
            needs_retraining: needing.len(),
            triggers_created,
        };
        info!(
            evaluations = summary.evaluations,
            needs_retraining = summary.needs_retraining,
            triggers_created = summary.triggers_created,
            "Retraining check finished"
        );
        Ok(summary)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pdm::RangeDeviationPredictor;
    use bosun_domain::{Equipment, MlModel, ModelValidation, TelemetryReading};
    use bosun_jobs::QueueConfig;
    use bosun_repository::MemoryStore;
    use chrono::{Duration, Utc};

    const ORG: &str = "default-org-id";

    fn build(store: &Arc<MemoryStore>, config: ScheduleConfig) -> (JobQueue, Arc<FleetSchedules>) {
        let queue = JobQueue::new(QueueConfig::default());
        let sweep = Arc::new(PredictiveMaintenanceSweep::new(
            store.clone(),
            store.clone(),
            Arc::new(RangeDeviationPredictor),
        ));
        let evaluator = Arc::new(RetrainingEvaluator::new(store.clone(), store.clone()));
        let schedules = Arc::new(FleetSchedules::new(config, queue.clone(), sweep, evaluator));
        (queue, schedules)
    }

    #[tokio::test]
    async fn test_register_is_idempotent() {
        let store = Arc::new(MemoryStore::new());
        let (_, schedules) = build(&store, ScheduleConfig::default());
        let registry = ScheduleRegistry::new();

        assert_eq!(schedules.register(&registry).unwrap(), 3);
        assert_eq!(schedules.register(&registry).unwrap(), 0);
        assert_eq!(registry.list().len(), 3);
        registry.shutdown();
    }

    #[tokio::test]
    async fn test_register_rejects_bad_cron() {
        let store = Arc::new(MemoryStore::new());
        let config = ScheduleConfig {
            pdm_cron: "sometimes".to_string(),
            ..ScheduleConfig::default()
        };
        let (_, schedules) = build(&store, config);
        let registry = ScheduleRegistry::new();

        assert!(schedules.register(&registry).is_err());
        assert!(registry.is_registered(schedule_names::INSIGHTS));
        assert!(!registry.is_registered(schedule_names::PREDICTIVE_MAINTENANCE));
        registry.shutdown();
    }

    #[tokio::test]
    async fn test_scheduled_insights_enqueue_every_scope() {
        let store = Arc::new(MemoryStore::new());
        let (queue, schedules) = build(&store, ScheduleConfig::default());
        let registry = ScheduleRegistry::new();
        schedules.register(&registry).unwrap();

        registry.trigger(schedule_names::INSIGHTS).await.unwrap();
        assert_eq!(queue.get_stats().pending, 4);
        registry.shutdown();
    }

    #[tokio::test]
    async fn test_manual_predictive_maintenance() {
        let store = Arc::new(MemoryStore::new());
        store.add_equipment(Equipment::new("eq-1", ORG, "Main engine", "engine"));
        store.add_equipment(Equipment::new("eq-2", ORG, "Ballast pump", "pump"));
        store.add_reading(
            TelemetryReading::new("eq-1", "temperature", 120.0, Utc::now() - Duration::minutes(5))
                .with_normal_range(60.0, 90.0),
        );
        store.add_reading(
            TelemetryReading::new("eq-2", "pressure", 3.0, Utc::now() - Duration::minutes(5))
                .with_normal_range(2.0, 4.0),
        );
        let (_, schedules) = build(&store, ScheduleConfig::default());

        assert_eq!(schedules.trigger_predictive_maintenance(None).await.unwrap(), 1);
        assert_eq!(schedules.trigger_predictive_maintenance(Some("eq-2")).await.unwrap(), 0);
        assert!(schedules.trigger_predictive_maintenance(Some("eq-404")).await.is_err());
    }

    #[tokio::test]
    async fn test_manual_retraining_check() {
        let store = Arc::new(MemoryStore::new());
        store.add_model(MlModel::new("m-ok", ORG, "Healthy", "anomaly", Utc::now() - Duration::days(3)));
        store.add_model(MlModel::new("m-bad", ORG, "Degraded", "anomaly", Utc::now() - Duration::days(3)));
        for day in 1..=5 {
            store.add_validation(ModelValidation {
                model_id: "m-bad".to_string(),
                accuracy: Some(0.5),
                validated_at: Utc::now() - Duration::days(day),
            });
        }
        let (_, schedules) = build(&store, ScheduleConfig::default());

        let first = schedules.run_retraining_check().await.unwrap();
        assert_eq!(
            first,
            RetrainingRunSummary {
                evaluations: 2,
                needs_retraining: 1,
                triggers_created: 1,
            }
        );

        let second = schedules.run_retraining_check().await.unwrap();
        assert_eq!(second.needs_retraining, 1);
        assert_eq!(second.triggers_created, 0);
        assert_eq!(store.trigger_records().len(), 1);
    }

    #[tokio::test]
    async fn test_manual_insight_trigger_returns_id() {
        let store = Arc::new(MemoryStore::new());
        let (queue, schedules) = build(&store, ScheduleConfig::default());

        let id = schedules.trigger_insight_snapshot("org-7", InsightScope::Fleet);
        assert!(queue.get_job_status(&id).is_some());
    }
}
