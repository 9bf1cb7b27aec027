//! Unified error type shared by the storage, scheduling, and recovery layers.

use thiserror::Error;

/// Unified error type for Bosun.
#[derive(Error, Debug)]
pub enum BosunError {
    // ============ Domain Errors ============
    /// Resource not found
    #[error("Resource not found: {resource_type} with id {id}")]
    NotFound {
        resource_type: &'static str,
        id: String,
    },

    /// Validation error
    #[error("Validation error: {0}")]
    Validation(String),

    /// Conflict error (e.g., duplicate pending record)
    #[error("Conflict: {0}")]
    Conflict(String),

    // ============ Infrastructure Errors ============
    /// Storage port failure
    #[error("Storage error: {0}")]
    Storage(String),

    /// Configuration error
    #[error("Configuration error: {0}")]
    Configuration(String),

    /// External service error
    #[error("External service error: {service} - {message}")]
    ExternalService { service: String, message: String },

    /// Timeout error
    #[error("Operation timed out: {0}")]
    Timeout(String),

    // ============ Internal Errors ============
    /// Internal error
    #[error("Internal error: {0}")]
    Internal(String),

    /// Generic error wrapper
    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

impl BosunError {
    /// Returns a machine-readable error code.
    #[must_use]
    pub const fn error_code(&self) -> &'static str {
        match self {
            Self::NotFound { .. } => "NOT_FOUND",
            Self::Validation(_) => "VALIDATION_ERROR",
            Self::Conflict(_) => "CONFLICT",
            Self::Storage(_) => "STORAGE_ERROR",
            Self::Configuration(_) => "CONFIGURATION_ERROR",
            Self::ExternalService { .. } => "EXTERNAL_SERVICE_ERROR",
            Self::Timeout(_) => "TIMEOUT",
            Self::Internal(_) | Self::Other(_) => "INTERNAL_ERROR",
        }
    }

    /// Creates a not found error for a resource.
    #[must_use]
    pub fn not_found<T: ToString>(resource_type: &'static str, id: T) -> Self {
        Self::NotFound {
            resource_type,
            id: id.to_string(),
        }
    }

    /// Creates a validation error.
    #[must_use]
    pub fn validation<T: Into<String>>(message: T) -> Self {
        Self::Validation(message.into())
    }

    /// Creates a storage error.
    #[must_use]
    pub fn storage<T: Into<String>>(message: T) -> Self {
        Self::Storage(message.into())
    }

    /// Creates an external service error.
    #[must_use]
    pub fn external<S: Into<String>, M: Into<String>>(service: S, message: M) -> Self {
        Self::ExternalService {
            service: service.into(),
            message: message.into(),
        }
    }

    /// Creates an internal error.
    #[must_use]
    pub fn internal<T: Into<String>>(message: T) -> Self {
        Self::Internal(message.into())
    }

    /// Checks if this error is retriable.
    #[must_use]
    pub const fn is_retriable(&self) -> bool {
        matches!(
            self,
            Self::Storage(_) | Self::ExternalService { .. } | Self::Timeout(_)
        )
    }
}

impl From<serde_json::Error> for BosunError {
    fn from(err: serde_json::Error) -> Self {
        Self::Internal(format!("JSON serialization error: {}", err))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_codes() {
        assert_eq!(BosunError::not_found("Equipment", "eq-1").error_code(), "NOT_FOUND");
        assert_eq!(BosunError::validation("bad input").error_code(), "VALIDATION_ERROR");
        assert_eq!(BosunError::Conflict("dup".to_string()).error_code(), "CONFLICT");
        assert_eq!(BosunError::storage("down").error_code(), "STORAGE_ERROR");
        assert_eq!(BosunError::external("refresh", "502").error_code(), "EXTERNAL_SERVICE_ERROR");
        assert_eq!(BosunError::internal("err").error_code(), "INTERNAL_ERROR");
    }

    #[test]
    fn test_retriable_errors() {
        assert!(BosunError::storage("connection lost").is_retriable());
        assert!(BosunError::Timeout("request timed out".to_string()).is_retriable());
        assert!(BosunError::external("auth", "unavailable").is_retriable());
        assert!(!BosunError::not_found("Equipment", 1).is_retriable());
        assert!(!BosunError::validation("bad input").is_retriable());
    }

    #[test]
    fn test_not_found_display() {
        let err = BosunError::not_found("Equipment", "eq-42");
        assert_eq!(err.to_string(), "Resource not found: Equipment with id eq-42");
    }

    #[test]
    fn test_from_anyhow() {
        let err: BosunError = anyhow::anyhow!("boom").into();
        assert!(matches!(err, BosunError::Other(_)));
        assert_eq!(err.to_string(), "boom");
    }

    #[test]
    fn test_from_serde_json() {
        let json_err = serde_json::from_str::<serde_json::Value>("{not json").unwrap_err();
        let err = BosunError::from(json_err);
        assert!(err.to_string().contains("JSON serialization error"));
    }
}
