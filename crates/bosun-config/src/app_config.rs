//! Application configuration structures.

use bosun_core::telemetry::TelemetryConfig;
use bosun_jobs::QueueConfig;
use bosun_recovery::RecoveryConfig;
use bosun_service::ScheduleConfig;
use serde::{Deserialize, Serialize};

/// Root application configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AppConfig {
    /// Application name and metadata.
    #[serde(default)]
    pub app: AppMetadata,

    /// Job queue configuration.
    #[serde(default)]
    pub jobs: QueueConfig,

    /// Fleet schedule configuration.
    #[serde(default)]
    pub schedules: ScheduleConfig,

    /// Auto-recovery configuration.
    #[serde(default)]
    pub recovery: RecoveryConfig,

    /// Logging configuration.
    #[serde(default)]
    pub telemetry: TelemetryConfig,
}

/// Application metadata.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AppMetadata {
    /// Application name.
    #[serde(default = "default_app_name")]
    pub name: String,
    /// Application version.
    #[serde(default = "default_app_version")]
    pub version: String,
    /// Environment (development, staging, production).
    #[serde(default = "default_environment")]
    pub environment: String,
}

fn default_app_name() -> String {
    "bosun".to_string()
}

fn default_app_version() -> String {
    env!("CARGO_PKG_VERSION").to_string()
}

fn default_environment() -> String {
    "development".to_string()
}

impl Default for AppMetadata {
    fn default() -> Self {
        Self {
            name: default_app_name(),
            version: default_app_version(),
            environment: default_environment(),
        }
    }
}

impl AppMetadata {
    /// Returns true in the production environment.
    pub fn is_production(&self) -> bool {
        self.environment.eq_ignore_ascii_case("production")
    }
}
