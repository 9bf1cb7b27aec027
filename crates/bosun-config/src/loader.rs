//! Configuration loader with layered sources.

use crate::{AppConfig, ConfigValidator};
use bosun_core::BosunError;
use config::{Config, ConfigError, Environment, File};
use std::path::Path;
use std::sync::Arc;
use tokio::sync::RwLock;
use tracing::{debug, info, warn};

/// Prefix of environment variable overrides.
pub const ENV_PREFIX: &str = "BOSUN";

/// Configuration loader with runtime refresh support.
#[derive(Clone)]
pub struct ConfigLoader {
    config: Arc<RwLock<AppConfig>>,
    config_dir: String,
    env_prefix: String,
}

impl ConfigLoader {
    /// Creates a new configuration loader.
    ///
    /// Configuration is loaded from multiple sources in order:
    /// 1. `config/default.toml` - Default values
    /// 2. `config/{environment}.toml` - Environment-specific overrides
    /// 3. `config/local.toml` - Local overrides
    /// 4. Environment variables with `BOSUN_` prefix and `__` separator
    pub fn new(config_dir: impl Into<String>) -> Result<Self, BosunError> {
        Self::with_env_prefix(config_dir, ENV_PREFIX)
    }

    /// Creates a loader reading environment overrides under `env_prefix`.
    pub fn with_env_prefix(config_dir: impl Into<String>, env_prefix: impl Into<String>) -> Result<Self, BosunError> {
        let config_dir = config_dir.into();
        let env_prefix = env_prefix.into();
        let config = Self::load_config(&config_dir, &env_prefix)?;

        Ok(Self {
            config: Arc::new(RwLock::new(config)),
            config_dir,
            env_prefix,
        })
    }

    /// Loads configuration from the default location (`./config`).
    pub fn from_default_location() -> Result<Self, BosunError> {
        Self::new("./config")
    }

    /// Returns the current configuration.
    pub async fn get(&self) -> AppConfig {
        self.config.read().await.clone()
    }

    /// Reloads the configuration from disk.
    pub async fn reload(&self) -> Result<(), BosunError> {
        let new_config = Self::load_config(&self.config_dir, &self.env_prefix)?;
        let mut config = self.config.write().await;
        *config = new_config;
        info!("Configuration reloaded successfully");
        Ok(())
    }

    /// Loads configuration from the specified directory.
    fn load_config(config_dir: &str, env_prefix: &str) -> Result<AppConfig, BosunError> {
        // Load .env file if present
        if let Err(e) = dotenvy::dotenv() {
            debug!("No .env file found or error loading it: {}", e);
        }

        let environment = std::env::var(format!("{}_ENVIRONMENT", env_prefix))
            .unwrap_or_else(|_| "development".to_string());

        info!(environment = %environment, config_dir = %config_dir, "Loading configuration");

        let mut builder = Config::builder().set_default("app.environment", environment.as_str())
            .map_err(config_error_to_bosun_error)?;

        // 1. Load default configuration
        let default_path = format!("{}/default.toml", config_dir);
        if Path::new(&default_path).exists() {
            debug!("Loading default config from: {}", default_path);
            builder = builder.add_source(File::with_name(&default_path).required(false));
        }

        // 2. Load environment-specific configuration
        let env_path = format!("{}/{}.toml", config_dir, environment);
        if Path::new(&env_path).exists() {
            debug!("Loading environment config from: {}", env_path);
            builder = builder.add_source(File::with_name(&env_path).required(false));
        }

        // 3. Load local overrides (not committed to version control)
        let local_path = format!("{}/local.toml", config_dir);
        if Path::new(&local_path).exists() {
            debug!("Loading local config from: {}", local_path);
            builder = builder.add_source(File::with_name(&local_path).required(false));
        }

        // 4. Override with environment variables
        builder = builder.add_source(
            Environment::with_prefix(env_prefix)
                .prefix_separator("_")
                .separator("__")
                .try_parsing(true),
        );

        let config = builder.build().map_err(config_error_to_bosun_error)?;

        let app_config: AppConfig = config
            .try_deserialize()
            .map_err(config_error_to_bosun_error)?;

        Self::validate_config(&app_config)?;

        Ok(app_config)
    }

    /// Validates the configuration.
    fn validate_config(config: &AppConfig) -> Result<(), BosunError> {
        if config.app.is_production() && config.recovery.credential_refresh_url.is_none() && config.recovery.device_api_key.is_none() {
            warn!("No device credential source configured in production; 401 recovery will require operators");
        }

        ConfigValidator::validate(config).map_err(|errors| {
            let message = errors
                .iter()
                .map(ToString::to_string)
                .collect::<Vec<_>>()
                .join("; ");
            BosunError::Configuration(message)
        })
    }

    /// Gets a specific configuration value by key path.
    pub async fn get_value<T: serde::de::DeserializeOwned>(&self, key: &str) -> Option<T> {
        let config = self.config.read().await;
        let json = serde_json::to_value(&*config).ok()?;

        let mut current = &json;
        for part in key.split('.') {
            current = current.get(part)?;
        }

        serde_json::from_value(current.clone()).ok()
    }
}

fn config_error_to_bosun_error(err: ConfigError) -> BosunError {
    BosunError::Configuration(err.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use bosun_core::telemetry::LogFormat;
    use std::fs;

    fn write(dir: &Path, name: &str, contents: &str) {
        fs::write(dir.join(name), contents).unwrap();
    }

    fn dir_str(dir: &tempfile::TempDir) -> String {
        dir.path().to_string_lossy().into_owned()
    }

    #[tokio::test]
    async fn test_empty_directory_yields_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let loader = ConfigLoader::with_env_prefix(dir_str(&dir), "BOSUN_TEST_EMPTY").unwrap();
        let config = loader.get().await;

        assert_eq!(config.app.name, "bosun");
        assert_eq!(config.app.environment, "development");
        assert_eq!(config.jobs.max_concurrent_jobs, 3);
        assert_eq!(config.jobs.tick_interval_ms, 1000);
        assert_eq!(config.jobs.max_history_size, 1000);
        assert_eq!(config.schedules.default_org_id, "default-org-id");
        assert_eq!(config.schedules.insights_cron, "0 3 * * *");
        assert_eq!(config.recovery.stale_sensor_threshold_secs, 300);
        assert_eq!(config.recovery.max_port_restart_attempts, 3);
        assert_eq!(config.recovery.http_ingest_base_url, "http://localhost:5000");
        assert_eq!(config.telemetry.log_format, LogFormat::Pretty);
    }

    #[tokio::test]
    async fn test_files_are_layered() {
        let dir = tempfile::tempdir().unwrap();
        write(
            dir.path(),
            "default.toml",
            r#"
[jobs]
max_concurrent_jobs = 5

[schedules]
pdm_cron = "0 */2 * * *"

[telemetry]
log_format = "json"
"#,
        );
        write(
            dir.path(),
            "local.toml",
            r#"
[jobs]
max_concurrent_jobs = 8
"#,
        );

        let loader = ConfigLoader::with_env_prefix(dir_str(&dir), "BOSUN_TEST_LAYERED").unwrap();
        let config = loader.get().await;

        assert_eq!(config.jobs.max_concurrent_jobs, 8);
        assert_eq!(config.jobs.max_history_size, 1000);
        assert_eq!(config.schedules.pdm_cron, "0 */2 * * *");
        assert_eq!(config.telemetry.log_format, LogFormat::Json);
        assert_eq!(loader.get_value::<usize>("jobs.max_concurrent_jobs").await, Some(8));
    }

    #[tokio::test]
    async fn test_environment_variables_override_files() {
        let dir = tempfile::tempdir().unwrap();
        write(dir.path(), "default.toml", "[recovery]\nmax_port_restart_attempts = 4\n");
        std::env::set_var("BOSUN_TEST_ENV_RECOVERY__MAX_PORT_RESTART_ATTEMPTS", "6");
        std::env::set_var("BOSUN_TEST_ENV_SCHEDULES__DEFAULT_ORG_ID", "org-north-sea");

        let loader = ConfigLoader::with_env_prefix(dir_str(&dir), "BOSUN_TEST_ENV").unwrap();
        let config = loader.get().await;

        assert_eq!(config.recovery.max_port_restart_attempts, 6);
        assert_eq!(config.schedules.default_org_id, "org-north-sea");
    }

    #[tokio::test]
    async fn test_invalid_configuration_is_rejected() {
        let dir = tempfile::tempdir().unwrap();
        write(dir.path(), "default.toml", "[jobs]\nmax_concurrent_jobs = 0\n");

        let err = ConfigLoader::with_env_prefix(dir_str(&dir), "BOSUN_TEST_INVALID").err().unwrap();
        assert_eq!(err.error_code(), "CONFIGURATION_ERROR");
        assert!(err.to_string().contains("jobs.max_concurrent_jobs"));
    }

    #[tokio::test]
    async fn test_reload_picks_up_changes() {
        let dir = tempfile::tempdir().unwrap();
        let loader = ConfigLoader::with_env_prefix(dir_str(&dir), "BOSUN_TEST_RELOAD").unwrap();
        assert_eq!(loader.get().await.jobs.max_history_size, 1000);

        write(dir.path(), "default.toml", "[jobs]\nmax_history_size = 50\n");
        loader.reload().await.unwrap();
        assert_eq!(loader.get().await.jobs.max_history_size, 50);
    }
}
