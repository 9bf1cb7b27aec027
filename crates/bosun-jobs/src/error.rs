//! Job error types.

use std::any::Any;
use thiserror::Error;

/// Result type for queue and scheduler operations.
pub type JobsResult<T> = Result<T, JobError>;

/// Job-related errors.
#[derive(Debug, Error)]
pub enum JobError {
    /// Processor reported a failure. The message is kept verbatim.
    #[error("{0}")]
    ExecutionFailed(String),

    /// No processor is registered for the job type.
    #[error("No processor registered for job type: {0}")]
    NoProcessor(String),

    /// Payload could not be decoded by the processor.
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// Job not found.
    #[error("Job not found: {0}")]
    NotFound(String),

    /// Scheduler error.
    #[error("Scheduler error: {0}")]
    Scheduler(String),

    /// Configuration error.
    #[error("Configuration error: {0}")]
    Configuration(String),

    /// Internal error.
    #[error("Internal error: {0}")]
    Internal(String),
}

impl JobError {
    /// Creates an execution failure from any displayable error.
    pub fn execution(err: impl std::fmt::Display) -> Self {
        JobError::ExecutionFailed(err.to_string())
    }
}

/// Message carried by a caught panic payload.
pub(crate) fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(message) = payload.downcast_ref::<&str>() {
        format!("panicked: {}", message)
    } else if let Some(message) = payload.downcast_ref::<String>() {
        format!("panicked: {}", message)
    } else {
        "panicked".to_string()
    }
}

impl From<bosun_core::BosunError> for JobError {
    fn from(err: bosun_core::BosunError) -> Self {
        JobError::ExecutionFailed(err.to_string())
    }
}

impl From<anyhow::Error> for JobError {
    fn from(err: anyhow::Error) -> Self {
        JobError::ExecutionFailed(format!("{:#}", err))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_execution_failed_is_verbatim() {
        let err = JobError::ExecutionFailed("disk full".into());
        assert_eq!(err.to_string(), "disk full");
    }

    #[test]
    fn test_panic_message_from_payload() {
        let literal: Box<dyn Any + Send> = Box::new("index out of bounds");
        let owned: Box<dyn Any + Send> = Box::new(String::from("bad sensor id"));
        let opaque: Box<dyn Any + Send> = Box::new(42_u8);

        assert_eq!(panic_message(literal.as_ref()), "panicked: index out of bounds");
        assert_eq!(panic_message(owned.as_ref()), "panicked: bad sensor id");
        assert_eq!(panic_message(opaque.as_ref()), "panicked");
    }

    #[test]
    fn test_from_bosun_error() {
        let err = JobError::from(bosun_core::BosunError::storage("database down"));
        match err {
            JobError::ExecutionFailed(msg) => assert!(msg.contains("database down")),
            _ => panic!("Expected ExecutionFailed error"),
        }
    }

    #[test]
    fn test_from_anyhow_keeps_context_chain() {
        let err = anyhow::anyhow!("connection refused").context("fetching telemetry");
        let job_err = JobError::from(err);
        assert_eq!(job_err.to_string(), "fetching telemetry: connection refused");
    }

    #[test]
    fn test_no_processor_display() {
        let err = JobError::NoProcessor("insight_snapshot".into());
        assert!(err.to_string().contains("insight_snapshot"));
    }
}
