//! Configuration validation.
//!
//! Collects every problem in one pass so a bad deployment reports all of
//! them at startup.

use crate::AppConfig;
use std::fmt;

/// Configuration validation error variants.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConfigValidationError {
    /// A value that must be positive is zero.
    MustBePositive { name: String },
    /// A cron expression does not parse.
    InvalidCron { name: String, expression: String, message: String },
    /// A URL is not an http(s) URL.
    InvalidUrl { name: String, value: String },
}

impl fmt::Display for ConfigValidationError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::MustBePositive { name } => write!(f, "'{}' must be greater than zero", name),
            Self::InvalidCron { name, expression, message } => {
                write!(f, "Invalid cron expression for '{}' ('{}'): {}", name, expression, message)
            }
            Self::InvalidUrl { name, value } => {
                write!(f, "Invalid URL for '{}': '{}' (must start with http:// or https://)", name, value)
            }
        }
    }
}

impl std::error::Error for ConfigValidationError {}

/// Configuration validator.
pub struct ConfigValidator;

impl ConfigValidator {
    /// Validates the entire application configuration.
    ///
    /// Returns Ok(()) if valid, or Err with all validation errors found.
    pub fn validate(config: &AppConfig) -> Result<(), Vec<ConfigValidationError>> {
        let mut errors = Vec::new();

        Self::validate_jobs(config, &mut errors);
        Self::validate_schedules(config, &mut errors);
        Self::validate_recovery(config, &mut errors);

        if errors.is_empty() {
            Ok(())
        } else {
            Err(errors)
        }
    }

    fn validate_jobs(config: &AppConfig, errors: &mut Vec<ConfigValidationError>) {
        if config.jobs.max_concurrent_jobs == 0 {
            errors.push(ConfigValidationError::MustBePositive {
                name: "jobs.max_concurrent_jobs".to_string(),
            });
        }
        if config.jobs.max_history_size == 0 {
            errors.push(ConfigValidationError::MustBePositive {
                name: "jobs.max_history_size".to_string(),
            });
        }
        if config.jobs.tick_interval_ms == 0 {
            errors.push(ConfigValidationError::MustBePositive {
                name: "jobs.tick_interval_ms".to_string(),
            });
        }
    }

    fn validate_schedules(config: &AppConfig, errors: &mut Vec<ConfigValidationError>) {
        for (key, expression) in config.schedules.cron_expressions() {
            if let Err(e) = bosun_jobs::parse_cron(expression) {
                errors.push(ConfigValidationError::InvalidCron {
                    name: format!("schedules.{}", key),
                    expression: expression.to_string(),
                    message: e.to_string(),
                });
            }
        }
    }

    fn validate_recovery(config: &AppConfig, errors: &mut Vec<ConfigValidationError>) {
        let recovery = &config.recovery;

        if recovery.max_port_restart_attempts == 0 {
            errors.push(ConfigValidationError::MustBePositive {
                name: "recovery.max_port_restart_attempts".to_string(),
            });
        }

        let urls = [
            ("recovery.http_ingest_base_url", Some(recovery.http_ingest_base_url.as_str())),
            ("recovery.credential_refresh_url", recovery.credential_refresh_url.as_deref()),
        ];
        for (name, value) in urls {
            if let Some(value) = value {
                if !value.starts_with("http://") && !value.starts_with("https://") {
                    errors.push(ConfigValidationError::InvalidUrl {
                        name: name.to_string(),
                        value: value.to_string(),
                    });
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config_is_valid() {
        assert!(ConfigValidator::validate(&AppConfig::default()).is_ok());
    }

    #[test]
    fn test_zero_values_rejected() {
        let mut config = AppConfig::default();
        config.jobs.max_concurrent_jobs = 0;
        config.jobs.max_history_size = 0;
        config.recovery.max_port_restart_attempts = 0;

        let errors = ConfigValidator::validate(&config).unwrap_err();
        assert_eq!(errors.len(), 3);
        assert!(errors.iter().all(|e| matches!(e, ConfigValidationError::MustBePositive { .. })));
    }

    #[test]
    fn test_bad_cron_rejected() {
        let mut config = AppConfig::default();
        config.schedules.retraining_cron = "at four".to_string();

        let errors = ConfigValidator::validate(&config).unwrap_err();
        assert_eq!(errors.len(), 1);
        match &errors[0] {
            ConfigValidationError::InvalidCron { name, expression, .. } => {
                assert_eq!(name, "schedules.retraining_cron");
                assert_eq!(expression, "at four");
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn test_bad_refresh_url_rejected() {
        let mut config = AppConfig::default();
        config.recovery.credential_refresh_url = Some("ftp://tokens".to_string());

        let errors = ConfigValidator::validate(&config).unwrap_err();
        assert!(matches!(&errors[0], ConfigValidationError::InvalidUrl { name, .. } if name == "recovery.credential_refresh_url"));
    }
}
