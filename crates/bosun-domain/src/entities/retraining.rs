//! Retraining triggers and the persisted trigger record.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::fmt;

/// Why a model may need retraining.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TriggerType {
    PerformanceDegradation,
    NewDataAvailable,
    UserFeedbackThreshold,
    Scheduled,
}

impl fmt::Display for TriggerType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::PerformanceDegradation => write!(f, "performance_degradation"),
            Self::NewDataAvailable => write!(f, "new_data_available"),
            Self::UserFeedbackThreshold => write!(f, "user_feedback_threshold"),
            Self::Scheduled => write!(f, "scheduled"),
        }
    }
}

/// Severity attached to a single trigger.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TriggerSeverity {
    Low,
    Medium,
    High,
    Critical,
}

/// Overall urgency of retraining a model.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RetrainingPriority {
    Low,
    Medium,
    High,
    Critical,
}

impl fmt::Display for RetrainingPriority {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Low => write!(f, "low"),
            Self::Medium => write!(f, "medium"),
            Self::High => write!(f, "high"),
            Self::Critical => write!(f, "critical"),
        }
    }
}

/// A structured reason a model may need retraining.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RetrainingTrigger {
    pub trigger_type: TriggerType,
    pub severity: TriggerSeverity,
    pub reason: String,
    pub metrics: Value,
}

/// Status of a persisted trigger record.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TriggerRecordStatus {
    Pending,
    InProgress,
    Completed,
    Dismissed,
}

/// Insert payload for a retraining trigger record.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NewRetrainingTriggerRecord {
    pub org_id: String,
    pub model_id: String,
    pub triggers: Vec<RetrainingTrigger>,
    pub priority: RetrainingPriority,
    pub performance_snapshot: Option<Value>,
    pub new_data_points: Option<u64>,
    pub negative_feedback_count: Option<u64>,
}

/// Persisted retraining trigger.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RetrainingTriggerRecord {
    pub id: String,
    pub org_id: String,
    pub model_id: String,
    pub triggers: Vec<RetrainingTrigger>,
    pub priority: RetrainingPriority,
    pub performance_snapshot: Option<Value>,
    pub new_data_points: Option<u64>,
    pub negative_feedback_count: Option<u64>,
    pub status: TriggerRecordStatus,
    pub created_at: DateTime<Utc>,
}

impl RetrainingTriggerRecord {
    /// Materializes an insert payload as a pending record.
    #[must_use]
    pub fn pending(id: impl Into<String>, new: NewRetrainingTriggerRecord) -> Self {
        Self {
            id: id.into(),
            org_id: new.org_id,
            model_id: new.model_id,
            triggers: new.triggers,
            priority: new.priority,
            performance_snapshot: new.performance_snapshot,
            new_data_points: new.new_data_points,
            negative_feedback_count: new.negative_feedback_count,
            status: TriggerRecordStatus::Pending,
            created_at: Utc::now(),
        }
    }
}
