//! Model retraining evaluation.
//!
//! Every active model is checked against four independent signals:
//! validation accuracy, negative operator feedback, volume of new labelled
//! data, and time since the model was last trained. Each signal emits at most
//! one trigger carrying an explicit severity; the model's retraining priority
//! is aggregated from those severities.

use bosun_core::BosunResult;
use bosun_domain::{
    MlModel, NewRetrainingTriggerRecord, RetrainingPriority, RetrainingTrigger,
    RetrainingTriggerRecord, TriggerSeverity, TriggerType,
};
use bosun_repository::{ModelRepository, RetrainingTriggerRepository};
use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use serde_json::json;
use std::sync::Arc;
use tracing::{debug, info};

/// Thresholds used by the evaluator.
pub mod thresholds {
    /// Validation window in days.
    pub const VALIDATION_WINDOW_DAYS: i64 = 30;
    /// Validations with an accuracy score needed before accuracy is judged.
    pub const MIN_VALIDATIONS: usize = 5;
    /// Mean accuracy upper bounds, most severe first.
    pub const ACCURACY: [(f64, super::TriggerSeverity); 3] = [
        (0.6, super::TriggerSeverity::Critical),
        (0.7, super::TriggerSeverity::High),
        (0.8, super::TriggerSeverity::Medium),
    ];

    /// Feedback window in days.
    pub const FEEDBACK_WINDOW_DAYS: i64 = 60;
    /// Negative feedback lower bounds, most severe first.
    pub const NEGATIVE_FEEDBACK: [(u64, super::TriggerSeverity); 3] = [
        (10, super::TriggerSeverity::Critical),
        (5, super::TriggerSeverity::High),
        (3, super::TriggerSeverity::Medium),
    ];

    /// New labelled data points needed to suggest retraining.
    pub const NEW_DATA_POINTS: u64 = 50;

    /// Model age lower bounds in days, most severe first.
    pub const MODEL_AGE_DAYS: [(i64, super::TriggerSeverity); 3] = [
        (180, super::TriggerSeverity::Critical),
        (90, super::TriggerSeverity::High),
        (60, super::TriggerSeverity::Medium),
    ];
}

/// Outcome of evaluating one model.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RetrainingEvaluation {
    pub model_id: String,
    pub model_name: String,
    pub org_id: String,
    /// True iff at least one trigger fired.
    pub should_retrain: bool,
    pub priority: RetrainingPriority,
    pub triggers: Vec<RetrainingTrigger>,
    /// Model performance metrics at evaluation time.
    pub performance_snapshot: Option<serde_json::Value>,
    /// New data points counted when the new-data trigger fired.
    pub new_data_points: Option<u64>,
    /// Negative feedback counted when the feedback trigger fired.
    pub negative_feedback_count: Option<u64>,
}

impl RetrainingEvaluation {
    /// Reasons of all triggers joined into one line.
    pub fn reasons(&self) -> String {
        self.triggers
            .iter()
            .map(|t| t.reason.as_str())
            .collect::<Vec<_>>()
            .join("; ")
    }
}

/// Aggregates trigger severities into a retraining priority.
///
/// Critical if any trigger is critical, else high if any is high, else
/// medium if two or more triggers fired or any is medium, else low.
pub fn aggregate_priority(triggers: &[RetrainingTrigger]) -> RetrainingPriority {
    let has = |severity| triggers.iter().any(|t| t.severity == severity);

    if has(TriggerSeverity::Critical) {
        RetrainingPriority::Critical
    } else if has(TriggerSeverity::High) {
        RetrainingPriority::High
    } else if triggers.len() >= 2 || has(TriggerSeverity::Medium) {
        RetrainingPriority::Medium
    } else {
        RetrainingPriority::Low
    }
}

fn percent(value: f64) -> String {
    format!("{:.1}%", value * 100.0)
}

/// Evaluates active models and persists retraining triggers.
pub struct RetrainingEvaluator {
    models: Arc<dyn ModelRepository>,
    triggers: Arc<dyn RetrainingTriggerRepository>,
}

impl RetrainingEvaluator {
    /// Creates a new evaluator.
    pub fn new(models: Arc<dyn ModelRepository>, triggers: Arc<dyn RetrainingTriggerRepository>) -> Self {
        Self { models, triggers }
    }

    /// Evaluates every active model.
    pub async fn evaluate_all(&self) -> BosunResult<Vec<RetrainingEvaluation>> {
        let models = self.models.find_active().await?;
        debug!(models = models.len(), "Evaluating active models for retraining");

        let mut evaluations = Vec::with_capacity(models.len());
        for model in &models {
            evaluations.push(self.evaluate_model(model).await?);
        }
        Ok(evaluations)
    }

    /// Evaluates one model as of now.
    pub async fn evaluate_model(&self, model: &MlModel) -> BosunResult<RetrainingEvaluation> {
        self.evaluate_model_at(model, Utc::now()).await
    }

    /// Evaluates one model as of `now`.
    pub async fn evaluate_model_at(&self, model: &MlModel, now: DateTime<Utc>) -> BosunResult<RetrainingEvaluation> {
        let mut triggers = Vec::new();
        let mut negative_feedback_count = None;
        let mut new_data_points = None;

        if let Some(trigger) = self.check_performance(model, now).await? {
            triggers.push(trigger);
        }

        let (feedback_trigger, negatives) = self.check_feedback(model, now).await?;
        if let Some(trigger) = feedback_trigger {
            negative_feedback_count = Some(negatives);
            triggers.push(trigger);
        }

        let (data_trigger, points) = self.check_new_data(model).await?;
        if let Some(trigger) = data_trigger {
            new_data_points = Some(points);
            triggers.push(trigger);
        }

        if let Some(trigger) = check_model_age(model, now) {
            triggers.push(trigger);
        }

        let priority = aggregate_priority(&triggers);
        Ok(RetrainingEvaluation {
            model_id: model.id.clone(),
            model_name: model.name.clone(),
            org_id: model.org_id.clone(),
            should_retrain: !triggers.is_empty(),
            priority,
            triggers,
            performance_snapshot: model.performance.clone(),
            new_data_points,
            negative_feedback_count,
        })
    }

    async fn check_performance(&self, model: &MlModel, now: DateTime<Utc>) -> BosunResult<Option<RetrainingTrigger>> {
        let since = now - Duration::days(thresholds::VALIDATION_WINDOW_DAYS);
        let scores: Vec<f64> = self
            .models
            .validations_since(&model.id, since)
            .await?
            .into_iter()
            .filter_map(|v| v.accuracy)
            .collect();

        if scores.len() < thresholds::MIN_VALIDATIONS {
            return Ok(None);
        }

        let mean = scores.iter().sum::<f64>() / scores.len() as f64;
        let breached = thresholds::ACCURACY
            .iter()
            .find(|(limit, _)| mean < *limit);

        Ok(breached.map(|&(limit, severity)| RetrainingTrigger {
            trigger_type: TriggerType::PerformanceDegradation,
            severity,
            reason: format!(
                "Mean accuracy {} over {} validations is below {}",
                percent(mean),
                scores.len(),
                percent(limit)
            ),
            metrics: json!({
                "mean_accuracy": mean,
                "validations": scores.len(),
                "threshold": limit,
            }),
        }))
    }

    async fn check_feedback(&self, model: &MlModel, now: DateTime<Utc>) -> BosunResult<(Option<RetrainingTrigger>, u64)> {
        let since = now - Duration::days(thresholds::FEEDBACK_WINDOW_DAYS);
        let negatives = self
            .models
            .feedback_since(&model.id, since)
            .await?
            .iter()
            .filter(|f| f.is_negative())
            .count() as u64;

        let trigger = thresholds::NEGATIVE_FEEDBACK
            .iter()
            .find(|(limit, _)| negatives >= *limit)
            .map(|&(limit, severity)| RetrainingTrigger {
                trigger_type: TriggerType::UserFeedbackThreshold,
                severity,
                reason: format!(
                    "{} negative feedback entries in the last {} days (threshold {})",
                    negatives,
                    thresholds::FEEDBACK_WINDOW_DAYS,
                    limit
                ),
                metrics: json!({
                    "negative_feedback": negatives,
                    "threshold": limit,
                }),
            });

        Ok((trigger, negatives))
    }

    async fn check_new_data(&self, model: &MlModel) -> BosunResult<(Option<RetrainingTrigger>, u64)> {
        let since = model.last_trained_at();
        let verified = self.models.count_verified_predictions_since(&model.org_id, since).await?;
        let anomalies = self.models.count_anomalies_since(&model.org_id, since).await?;
        let total = verified + anomalies;

        if total < thresholds::NEW_DATA_POINTS {
            return Ok((None, total));
        }

        let trigger = RetrainingTrigger {
            trigger_type: TriggerType::NewDataAvailable,
            severity: TriggerSeverity::Low,
            reason: format!("{} new labelled data points since last training", total),
            metrics: json!({
                "verified_predictions": verified,
                "anomalies": anomalies,
                "total": total,
            }),
        };
        Ok((Some(trigger), total))
    }

    /// Persists a pending trigger record unless one is already pending.
    ///
    /// Returns `None` when the evaluation did not fire or a pending record
    /// already exists for the model.
    pub async fn create_trigger(&self, evaluation: &RetrainingEvaluation) -> BosunResult<Option<RetrainingTriggerRecord>> {
        if !evaluation.should_retrain {
            return Ok(None);
        }

        if let Some(existing) = self
            .triggers
            .find_pending(&evaluation.model_id, &evaluation.org_id)
            .await?
        {
            debug!(
                model_id = %evaluation.model_id,
                trigger_id = %existing.id,
                "Retraining trigger already pending"
            );
            return Ok(None);
        }

        let record = self
            .triggers
            .create(NewRetrainingTriggerRecord {
                org_id: evaluation.org_id.clone(),
                model_id: evaluation.model_id.clone(),
                triggers: evaluation.triggers.clone(),
                priority: evaluation.priority,
                performance_snapshot: evaluation.performance_snapshot.clone(),
                new_data_points: evaluation.new_data_points,
                negative_feedback_count: evaluation.negative_feedback_count,
            })
            .await?;

        info!(
            model_id = %evaluation.model_id,
            trigger_id = %record.id,
            priority = %evaluation.priority,
            "Created retraining trigger"
        );
        Ok(Some(record))
    }

    /// Persists triggers for every evaluation that fired. Returns the number
    /// of records created.
    pub async fn create_triggers(&self, evaluations: &[RetrainingEvaluation]) -> BosunResult<usize> {
        let mut created = 0;
        for evaluation in evaluations {
            if self.create_trigger(evaluation).await?.is_some() {
                created += 1;
            }
        }
        Ok(created)
    }
}

fn check_model_age(model: &MlModel, now: DateTime<Utc>) -> Option<RetrainingTrigger> {
    let days = (now - model.last_trained_at()).num_days();

    thresholds::MODEL_AGE_DAYS
        .iter()
        .find(|(limit, _)| days >= *limit)
        .map(|&(limit, severity)| RetrainingTrigger {
            trigger_type: TriggerType::Scheduled,
            severity,
            reason: format!("Model last trained {} days ago (threshold {} days)", days, limit),
            metrics: json!({
                "days_since_training": days,
                "threshold": limit,
            }),
        })
}

#[cfg(test)]
mod tests {
    use super::*;
    use bosun_domain::{FeedbackType, ModelValidation, PredictionFeedback};
    use bosun_repository::MemoryStore;

    const ORG: &str = "org-1";

    fn setup() -> (Arc<MemoryStore>, RetrainingEvaluator) {
        let store = Arc::new(MemoryStore::new());
        let evaluator = RetrainingEvaluator::new(store.clone(), store.clone());
        (store, evaluator)
    }

    fn fresh_model(store: &MemoryStore, id: &str) -> MlModel {
        let model = MlModel::new(id, ORG, "Bearing wear", "failure_prediction", Utc::now() - Duration::days(5))
            .with_performance(json!({ "accuracy": 0.9 }));
        store.add_model(model.clone());
        model
    }

    fn add_validations(store: &MemoryStore, model_id: &str, scores: &[f64]) {
        for (i, score) in scores.iter().enumerate() {
            store.add_validation(ModelValidation {
                model_id: model_id.to_string(),
                accuracy: Some(*score),
                validated_at: Utc::now() - Duration::days(i as i64 + 1),
            });
        }
    }

    fn add_negative_feedback(store: &MemoryStore, model_id: &str, count: usize) {
        for _ in 0..count {
            store.add_feedback(PredictionFeedback {
                model_id: model_id.to_string(),
                org_id: ORG.to_string(),
                is_accurate: Some(false),
                rating: None,
                feedback_type: FeedbackType::Correction,
                created_at: Utc::now() - Duration::days(1),
            });
        }
    }

    fn trigger(trigger_type: TriggerType, severity: TriggerSeverity) -> RetrainingTrigger {
        RetrainingTrigger {
            trigger_type,
            severity,
            reason: String::new(),
            metrics: json!({}),
        }
    }

    fn performance_trigger(evaluation: &RetrainingEvaluation) -> Option<&RetrainingTrigger> {
        evaluation
            .triggers
            .iter()
            .find(|t| t.trigger_type == TriggerType::PerformanceDegradation)
    }

    #[tokio::test]
    async fn test_four_validations_are_not_enough() {
        let (store, evaluator) = setup();
        let model = fresh_model(&store, "m-1");
        add_validations(&store, "m-1", &[0.1, 0.1, 0.1, 0.1]);

        let evaluation = evaluator.evaluate_model(&model).await.unwrap();
        assert!(performance_trigger(&evaluation).is_none());
        assert!(!evaluation.should_retrain);
        assert_eq!(evaluation.priority, RetrainingPriority::Low);
    }

    #[tokio::test]
    async fn test_validations_without_accuracy_are_ignored() {
        let (store, evaluator) = setup();
        let model = fresh_model(&store, "m-1");
        add_validations(&store, "m-1", &[0.2, 0.2, 0.2, 0.2]);
        store.add_validation(ModelValidation {
            model_id: "m-1".to_string(),
            accuracy: None,
            validated_at: Utc::now(),
        });

        let evaluation = evaluator.evaluate_model(&model).await.unwrap();
        assert!(performance_trigger(&evaluation).is_none());
    }

    #[tokio::test]
    async fn test_accuracy_tiers() {
        let cases = [
            (0.55, Some(TriggerSeverity::Critical)),
            (0.65, Some(TriggerSeverity::High)),
            (0.75, Some(TriggerSeverity::Medium)),
            (0.82, None),
        ];

        for (mean, expected) in cases {
            let (store, evaluator) = setup();
            let model = fresh_model(&store, "m-1");
            add_validations(&store, "m-1", &[mean; 5]);

            let evaluation = evaluator.evaluate_model(&model).await.unwrap();
            assert_eq!(performance_trigger(&evaluation).map(|t| t.severity), expected, "mean {mean}");
        }
    }

    #[tokio::test]
    async fn test_old_validations_fall_outside_window() {
        let (store, evaluator) = setup();
        let model = fresh_model(&store, "m-1");
        for _ in 0..5 {
            store.add_validation(ModelValidation {
                model_id: "m-1".to_string(),
                accuracy: Some(0.3),
                validated_at: Utc::now() - Duration::days(45),
            });
        }

        let evaluation = evaluator.evaluate_model(&model).await.unwrap();
        assert!(performance_trigger(&evaluation).is_none());
    }

    #[tokio::test]
    async fn test_feedback_tiers() {
        for (count, expected) in [
            (2, None),
            (3, Some(TriggerSeverity::Medium)),
            (5, Some(TriggerSeverity::High)),
            (10, Some(TriggerSeverity::Critical)),
        ] {
            let (store, evaluator) = setup();
            let model = fresh_model(&store, "m-1");
            add_negative_feedback(&store, "m-1", count);

            let evaluation = evaluator.evaluate_model(&model).await.unwrap();
            let severity = evaluation
                .triggers
                .iter()
                .find(|t| t.trigger_type == TriggerType::UserFeedbackThreshold)
                .map(|t| t.severity);
            assert_eq!(severity, expected, "count {count}");
            assert_eq!(evaluation.negative_feedback_count, expected.map(|_| count as u64));
        }
    }

    #[tokio::test]
    async fn test_new_data_trigger_is_low_priority() {
        let (store, evaluator) = setup();
        let model = fresh_model(&store, "m-1");
        for _ in 0..30 {
            store.record_verified_prediction(ORG, Utc::now() - Duration::days(1));
        }
        for _ in 0..20 {
            store.record_anomaly(ORG, Utc::now() - Duration::days(2));
        }
        // Before the model was trained; not new data.
        store.record_anomaly(ORG, Utc::now() - Duration::days(30));

        let evaluation = evaluator.evaluate_model(&model).await.unwrap();
        assert_eq!(evaluation.triggers.len(), 1);
        assert_eq!(evaluation.triggers[0].trigger_type, TriggerType::NewDataAvailable);
        assert_eq!(evaluation.triggers[0].severity, TriggerSeverity::Low);
        assert_eq!(evaluation.new_data_points, Some(50));
        assert!(evaluation.should_retrain);
        assert_eq!(evaluation.priority, RetrainingPriority::Low);
    }

    #[tokio::test]
    async fn test_model_age_uses_deployment_date() {
        let (store, evaluator) = setup();
        let now = Utc::now();
        let model = MlModel::new("m-1", ORG, "Pump cavitation", "anomaly", now - Duration::days(400))
            .deployed(now - Duration::days(95));
        store.add_model(model.clone());

        let evaluation = evaluator.evaluate_model_at(&model, now).await.unwrap();
        assert_eq!(evaluation.triggers.len(), 1);
        assert_eq!(evaluation.triggers[0].trigger_type, TriggerType::Scheduled);
        assert_eq!(evaluation.triggers[0].severity, TriggerSeverity::High);
        assert_eq!(evaluation.priority, RetrainingPriority::High);
    }

    #[test]
    fn test_priority_aggregation() {
        use TriggerSeverity::*;
        let t = |s| trigger(TriggerType::Scheduled, s);

        assert_eq!(aggregate_priority(&[]), RetrainingPriority::Low);
        assert_eq!(aggregate_priority(&[t(Low)]), RetrainingPriority::Low);
        assert_eq!(aggregate_priority(&[t(Low), t(Low)]), RetrainingPriority::Medium);
        assert_eq!(aggregate_priority(&[t(Medium)]), RetrainingPriority::Medium);
        assert_eq!(aggregate_priority(&[t(Low), t(High)]), RetrainingPriority::High);
        assert_eq!(aggregate_priority(&[t(High), t(Critical)]), RetrainingPriority::Critical);
    }

    #[tokio::test]
    async fn test_trigger_creation_is_idempotent_while_pending() {
        let (store, evaluator) = setup();
        let model = fresh_model(&store, "m-1");
        add_validations(&store, "m-1", &[0.5; 6]);
        add_negative_feedback(&store, "m-1", 4);

        let evaluation = evaluator.evaluate_model(&model).await.unwrap();
        assert_eq!(evaluation.priority, RetrainingPriority::Critical);

        let first = evaluator.create_trigger(&evaluation).await.unwrap();
        let second = evaluator.create_trigger(&evaluation).await.unwrap();
        assert!(first.is_some());
        assert!(second.is_none());

        let records = store.trigger_records();
        assert_eq!(records.len(), 1);
        assert_eq!(records[0].triggers.len(), 2);
        assert_eq!(records[0].negative_feedback_count, Some(4));
        assert_eq!(records[0].new_data_points, None);
        assert_eq!(records[0].performance_snapshot, Some(json!({ "accuracy": 0.9 })));
    }

    #[tokio::test]
    async fn test_evaluate_all_and_create_triggers() {
        let (store, evaluator) = setup();
        fresh_model(&store, "healthy");
        fresh_model(&store, "degraded");
        add_validations(&store, "degraded", &[0.65; 5]);
        store.add_model(
            MlModel::new("retired", ORG, "Old", "anomaly", Utc::now() - Duration::days(500))
                .with_status(bosun_domain::ModelStatus::Retired),
        );

        let evaluations = evaluator.evaluate_all().await.unwrap();
        assert_eq!(evaluations.len(), 2);
        assert_eq!(evaluations.iter().filter(|e| e.should_retrain).count(), 1);

        assert_eq!(evaluator.create_triggers(&evaluations).await.unwrap(), 1);
        assert_eq!(evaluator.create_triggers(&evaluations).await.unwrap(), 0);
    }
}
