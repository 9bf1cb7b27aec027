//! Structured results of recovery flows.

use serde::{Deserialize, Serialize};
use std::fmt;

/// A recovery flow.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RecoveryAction {
    MqttFailover,
    CredentialRefresh,
    PortRestart,
    StaleSensor,
    TransportRecovered,
}

impl RecoveryAction {
    /// Event type recorded in diagnostic logs and metric labels.
    pub fn as_str(self) -> &'static str {
        match self {
            RecoveryAction::MqttFailover => "mqtt_failover",
            RecoveryAction::CredentialRefresh => "credential_refresh",
            RecoveryAction::PortRestart => "serial_port_restart",
            RecoveryAction::StaleSensor => "stale_sensor_recovery",
            RecoveryAction::TransportRecovered => "transport_recovered",
        }
    }
}

impl fmt::Display for RecoveryAction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Result of an MQTT to HTTP failover.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FailoverOutcome {
    pub success: bool,
    pub failover_id: Option<String>,
    /// Where the device should post telemetry while failed over.
    pub http_endpoint: Option<String>,
    pub message: String,
}

impl FailoverOutcome {
    pub(crate) fn failed(message: impl Into<String>) -> Self {
        Self {
            success: false,
            failover_id: None,
            http_endpoint: None,
            message: message.into(),
        }
    }
}

/// Where refreshed credentials came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CredentialSource {
    Environment,
    RefreshEndpoint,
}

/// Result of a credential refresh.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CredentialOutcome {
    pub success: bool,
    pub source: Option<CredentialSource>,
    /// Token issued by the refresh endpoint.
    #[serde(skip_serializing)]
    pub token: Option<String>,
    /// An operator must re-provision the device.
    pub requires_user_action: bool,
    pub message: String,
}

impl CredentialOutcome {
    pub(crate) fn failed(message: impl Into<String>, requires_user_action: bool) -> Self {
        Self {
            success: false,
            source: None,
            token: None,
            requires_user_action,
            message: message.into(),
        }
    }
}

/// Result of a serial port restart.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PortRestartOutcome {
    pub success: bool,
    /// Consecutive failed restarts after this attempt.
    pub restart_count: u32,
    /// The restart cap was reached; no restart was attempted.
    pub requires_manual_intervention: bool,
    pub message: String,
}

impl PortRestartOutcome {
    pub(crate) fn failed(message: impl Into<String>, restart_count: u32) -> Self {
        Self {
            success: false,
            restart_count,
            requires_manual_intervention: false,
            message: message.into(),
        }
    }
}

/// Result of a stale sensor check.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StaleSensorOutcome {
    /// The sensor was stale and polling was restarted.
    pub attempted: bool,
    pub success: bool,
    pub elapsed_secs: i64,
    pub message: String,
}

impl StaleSensorOutcome {
    /// True when the sensor was stale and polling came back.
    pub fn recovered(&self) -> bool {
        self.attempted && self.success
    }
}
