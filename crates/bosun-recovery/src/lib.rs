//! # Bosun Recovery
//!
//! Bounded automatic remediation of edge-device connectivity faults:
//!
//! - MQTT to HTTP transport failover, and recovery back to MQTT
//! - Credential refresh after an HTTP 401
//! - Serial port restart, capped by a persisted consecutive-failure count
//! - Polling restart for sensors that stopped reporting
//!
//! Every flow can be switched off in [`RecoveryConfig`] and writes
//! diagnostic log entries describing what it did.

pub mod config;
pub mod credentials;
pub mod engine;
pub mod metrics;
pub mod outcome;

pub use config::RecoveryConfig;
pub use credentials::CredentialClient;
pub use engine::AutoRecoveryEngine;
pub use metrics::{register_metrics, RecoveryMetrics};
pub use outcome::{
    CredentialOutcome, CredentialSource, FailoverOutcome, PortRestartOutcome, RecoveryAction,
    StaleSensorOutcome,
};
