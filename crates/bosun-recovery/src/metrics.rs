//! Metrics for auto-recovery attempts.

use crate::outcome::RecoveryAction;
use metrics::{counter, describe_counter};

/// Metric names for the recovery engine.
pub mod names {
    /// Recovery attempts, labelled by action and outcome.
    pub const RECOVERY_ATTEMPTS_TOTAL: &str = "bosun_recovery_attempts_total";
}

/// Register all metric descriptions.
pub fn register_metrics() {
    describe_counter!(
        names::RECOVERY_ATTEMPTS_TOTAL,
        "Total number of auto-recovery attempts by action and outcome"
    );
}

/// Result label of a recovery attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AttemptOutcome {
    Success,
    Failed,
    /// The flow is disabled or the fault does not apply.
    Skipped,
}

impl AttemptOutcome {
    pub fn as_str(self) -> &'static str {
        match self {
            AttemptOutcome::Success => "success",
            AttemptOutcome::Failed => "failed",
            AttemptOutcome::Skipped => "skipped",
        }
    }

    pub fn from_success(success: bool) -> Self {
        if success {
            AttemptOutcome::Success
        } else {
            AttemptOutcome::Failed
        }
    }
}

/// Recovery metrics recorder.
#[derive(Clone)]
pub struct RecoveryMetrics;

impl RecoveryMetrics {
    /// Record a recovery attempt.
    pub fn attempt(action: RecoveryAction, outcome: AttemptOutcome) {
        counter!(
            names::RECOVERY_ATTEMPTS_TOTAL,
            "action" => action.as_str(),
            "outcome" => outcome.as_str()
        )
        .increment(1);
    }
}
