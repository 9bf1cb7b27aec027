//! Diagnostic log entries written by the auto-recovery engine.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::fmt;

/// Severity of a diagnostic entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DiagnosticSeverity {
    Info,
    Warning,
    Error,
    Critical,
}

/// Progress of the action a diagnostic entry describes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DiagnosticStatus {
    InProgress,
    Success,
    Failed,
}

impl fmt::Display for DiagnosticStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::InProgress => write!(f, "in_progress"),
            Self::Success => write!(f, "success"),
            Self::Failed => write!(f, "failed"),
        }
    }
}

/// Insert payload for a diagnostic entry.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NewDiagnosticLog {
    pub org_id: String,
    pub device_id: String,
    pub event_type: String,
    pub severity: DiagnosticSeverity,
    pub status: DiagnosticStatus,
    pub message: String,
    pub details: Value,
    pub auto_fix_applied: bool,
}

impl NewDiagnosticLog {
    #[must_use]
    pub fn new(
        org_id: impl Into<String>,
        device_id: impl Into<String>,
        event_type: impl Into<String>,
        severity: DiagnosticSeverity,
        status: DiagnosticStatus,
        message: impl Into<String>,
    ) -> Self {
        Self {
            org_id: org_id.into(),
            device_id: device_id.into(),
            event_type: event_type.into(),
            severity,
            status,
            message: message.into(),
            details: Value::Null,
            auto_fix_applied: false,
        }
    }

    #[must_use]
    pub fn with_details(mut self, details: Value) -> Self {
        self.details = details;
        self
    }

    #[must_use]
    pub fn auto_fixed(mut self) -> Self {
        self.auto_fix_applied = true;
        self
    }
}

/// Persisted diagnostic entry.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DiagnosticLog {
    pub id: String,
    pub org_id: String,
    pub device_id: String,
    pub event_type: String,
    pub severity: DiagnosticSeverity,
    pub status: DiagnosticStatus,
    pub message: String,
    pub details: Value,
    pub auto_fix_applied: bool,
    pub created_at: DateTime<Utc>,
}

impl DiagnosticLog {
    #[must_use]
    pub fn from_new(id: impl Into<String>, new: NewDiagnosticLog) -> Self {
        Self {
            id: id.into(),
            org_id: new.org_id,
            device_id: new.device_id,
            event_type: new.event_type,
            severity: new.severity,
            status: new.status,
            message: new.message,
            details: new.details,
            auto_fix_applied: new.auto_fix_applied,
            created_at: Utc::now(),
        }
    }
}
