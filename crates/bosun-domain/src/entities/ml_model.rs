//! Predictive models, their validation runs, and operator feedback.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Lifecycle status of a model.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ModelStatus {
    Active,
    Training,
    Retired,
}

/// A deployed predictive model.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MlModel {
    pub id: String,
    pub org_id: String,
    pub name: String,
    pub model_type: String,
    pub status: ModelStatus,
    /// Last recorded performance metrics, copied into retraining triggers.
    pub performance: Option<Value>,
    pub created_at: DateTime<Utc>,
    pub deployed_at: Option<DateTime<Utc>>,
}

impl MlModel {
    #[must_use]
    pub fn new(
        id: impl Into<String>,
        org_id: impl Into<String>,
        name: impl Into<String>,
        model_type: impl Into<String>,
        created_at: DateTime<Utc>,
    ) -> Self {
        Self {
            id: id.into(),
            org_id: org_id.into(),
            name: name.into(),
            model_type: model_type.into(),
            status: ModelStatus::Active,
            performance: None,
            created_at,
            deployed_at: None,
        }
    }

    #[must_use]
    pub fn deployed(mut self, at: DateTime<Utc>) -> Self {
        self.deployed_at = Some(at);
        self
    }

    #[must_use]
    pub fn with_status(mut self, status: ModelStatus) -> Self {
        self.status = status;
        self
    }

    #[must_use]
    pub fn with_performance(mut self, performance: Value) -> Self {
        self.performance = Some(performance);
        self
    }

    /// Deployment date, falling back to creation date.
    #[must_use]
    pub fn last_trained_at(&self) -> DateTime<Utc> {
        self.deployed_at.unwrap_or(self.created_at)
    }
}

/// One validation run of a model against labelled data.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ModelValidation {
    pub model_id: String,
    pub accuracy: Option<f64>,
    pub validated_at: DateTime<Utc>,
}

/// Kind of feedback left on a prediction.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FeedbackType {
    Correction,
    Flag,
    Confirmation,
    Comment,
}

/// Operator feedback on a model prediction.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PredictionFeedback {
    pub model_id: String,
    pub org_id: String,
    pub is_accurate: Option<bool>,
    /// Star rating, 1 to 5.
    pub rating: Option<u8>,
    pub feedback_type: FeedbackType,
    pub created_at: DateTime<Utc>,
}

impl PredictionFeedback {
    /// Inaccurate, rated two stars or lower, or flagged.
    #[must_use]
    pub fn is_negative(&self) -> bool {
        self.is_accurate == Some(false)
            || self.rating.is_some_and(|r| r <= 2)
            || self.feedback_type == FeedbackType::Flag
    }
}
