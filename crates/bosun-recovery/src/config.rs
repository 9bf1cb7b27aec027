//! Auto-recovery configuration.

use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Configuration for the auto-recovery engine.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RecoveryConfig {
    /// Fail over from MQTT to HTTP ingestion when the broker is unreachable.
    #[serde(default = "default_true")]
    pub enable_mqtt_failover: bool,

    /// Refresh device credentials on authentication failures.
    #[serde(default = "default_true")]
    pub enable_credential_refresh: bool,

    /// Restart failed serial ports.
    #[serde(default = "default_true")]
    pub enable_port_restart: bool,

    /// Restart polling of sensors that stopped reporting.
    #[serde(default = "default_true")]
    pub enable_stale_sensor_recovery: bool,

    /// Seconds without a reading before a sensor is stale.
    #[serde(default = "default_stale_sensor_threshold_secs")]
    pub stale_sensor_threshold_secs: u64,

    /// Consecutive failed restarts after which a port needs manual attention.
    #[serde(default = "default_max_port_restart_attempts")]
    pub max_port_restart_attempts: u32,

    /// Endpoint issuing fresh device tokens.
    #[serde(default)]
    pub credential_refresh_url: Option<String>,

    /// Device API key provided by the environment.
    #[serde(default)]
    pub device_api_key: Option<String>,

    /// Base URL of the HTTP telemetry ingestion service.
    #[serde(default = "default_http_ingest_base_url")]
    pub http_ingest_base_url: String,

    /// Timeout of credential refresh requests in seconds.
    #[serde(default = "default_request_timeout_secs")]
    pub request_timeout_secs: u64,
}

fn default_true() -> bool {
    true
}

fn default_stale_sensor_threshold_secs() -> u64 {
    300
}

fn default_max_port_restart_attempts() -> u32 {
    3
}

fn default_http_ingest_base_url() -> String {
    "http://localhost:5000".to_string()
}

fn default_request_timeout_secs() -> u64 {
    10
}

impl Default for RecoveryConfig {
    fn default() -> Self {
        Self {
            enable_mqtt_failover: true,
            enable_credential_refresh: true,
            enable_port_restart: true,
            enable_stale_sensor_recovery: true,
            stale_sensor_threshold_secs: default_stale_sensor_threshold_secs(),
            max_port_restart_attempts: default_max_port_restart_attempts(),
            credential_refresh_url: None,
            device_api_key: None,
            http_ingest_base_url: default_http_ingest_base_url(),
            request_timeout_secs: default_request_timeout_secs(),
        }
    }
}

impl RecoveryConfig {
    /// HTTP endpoint devices post telemetry to while failed over.
    pub fn http_ingest_url(&self) -> String {
        format!("{}/api/edge/telemetry", self.http_ingest_base_url.trim_end_matches('/'))
    }

    /// Get request timeout as Duration.
    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }

    /// Environment credentials, ignoring blank values.
    pub fn env_credentials(&self) -> Option<&str> {
        self.device_api_key.as_deref().filter(|key| !key.trim().is_empty())
    }
}
