//! Auto-recovery engine for edge-device connectivity faults.
//!
//! Each flow records an `in_progress` diagnostic, attempts the fix, records
//! a terminal `success` or `failed` diagnostic and returns a structured
//! outcome. Diagnostic writes are best-effort: a failing diagnostic store
//! never changes the outcome of a flow.
//!
//! Persisted port counters are read, modified and written without a lock.
//! Faults for one device port are expected to arrive serialized from the
//! device's connection handler.

use crate::config::RecoveryConfig;
use crate::credentials::CredentialClient;
use crate::metrics::{AttemptOutcome, RecoveryMetrics};
use crate::outcome::{
    CredentialOutcome, CredentialSource, FailoverOutcome, PortRestartOutcome, RecoveryAction,
    StaleSensorOutcome,
};
use bosun_core::BosunResult;
use bosun_domain::{
    DiagnosticSeverity, DiagnosticStatus, NewDiagnosticLog, NewTransportFailover, PortState,
    PortStatus, Transport,
};
use bosun_repository::{DiagnosticRepository, FailoverRepository, PortStateRepository};
use chrono::{DateTime, Utc};
use serde_json::json;
use std::future::Future;
use std::sync::Arc;
use tracing::{debug, error, info, warn};

/// HTTP status that starts a credential refresh.
const UNAUTHORIZED: u16 = 401;

/// Applies bounded automatic fixes to edge-device faults.
pub struct AutoRecoveryEngine {
    config: RecoveryConfig,
    diagnostics: Arc<dyn DiagnosticRepository>,
    failovers: Arc<dyn FailoverRepository>,
    ports: Arc<dyn PortStateRepository>,
    credentials: CredentialClient,
}

impl AutoRecoveryEngine {
    /// Creates a new engine.
    pub fn new(
        config: RecoveryConfig,
        diagnostics: Arc<dyn DiagnosticRepository>,
        failovers: Arc<dyn FailoverRepository>,
        ports: Arc<dyn PortStateRepository>,
    ) -> BosunResult<Self> {
        let credentials = CredentialClient::new(config.request_timeout())?;
        Ok(Self {
            config,
            diagnostics,
            failovers,
            ports,
            credentials,
        })
    }

    /// Returns the engine configuration.
    pub fn config(&self) -> &RecoveryConfig {
        &self.config
    }

    /// Writes a diagnostic entry, downgrading failures to a warning.
    async fn record(&self, entry: NewDiagnosticLog) {
        let device_id = entry.device_id.clone();
        let event_type = entry.event_type.clone();
        if let Err(e) = self.diagnostics.create(entry).await {
            warn!(
                device_id = %device_id,
                event_type = %event_type,
                error = %e,
                "Failed to write diagnostic log"
            );
        }
    }

    fn skipped(action: RecoveryAction, device_id: &str) -> String {
        debug!(device_id = %device_id, action = %action, "Auto-recovery disabled; not attempted");
        RecoveryMetrics::attempt(action, AttemptOutcome::Skipped);
        format!("Auto-recovery for {} is disabled; not attempted", action)
    }

    // ------------------------------------------------------------------
    // Transport failover
    // ------------------------------------------------------------------

    /// Switches a device from MQTT to HTTP ingestion.
    pub async fn handle_mqtt_failure(
        &self,
        org_id: &str,
        device_id: &str,
        reason: &str,
        pending_readings: u64,
    ) -> FailoverOutcome {
        let action = RecoveryAction::MqttFailover;
        if !self.config.enable_mqtt_failover {
            return FailoverOutcome::failed(Self::skipped(action, device_id));
        }

        self.record(
            NewDiagnosticLog::new(
                org_id,
                device_id,
                action.as_str(),
                DiagnosticSeverity::Warning,
                DiagnosticStatus::InProgress,
                format!("MQTT connection lost ({}); failing over to HTTP", reason),
            )
            .with_details(json!({ "pending_readings": pending_readings })),
        )
        .await;

        let created = self
            .failovers
            .create(NewTransportFailover {
                org_id: org_id.to_string(),
                device_id: device_id.to_string(),
                from_transport: Transport::Mqtt,
                to_transport: Transport::Http,
                reason: reason.to_string(),
                pending_readings,
            })
            .await;

        match created {
            Ok(failover) => {
                let endpoint = self.config.http_ingest_url();
                info!(
                    device_id = %device_id,
                    failover_id = %failover.id,
                    endpoint = %endpoint,
                    "Failed over from MQTT to HTTP"
                );
                self.record(
                    NewDiagnosticLog::new(
                        org_id,
                        device_id,
                        action.as_str(),
                        DiagnosticSeverity::Info,
                        DiagnosticStatus::Success,
                        "Telemetry switched to HTTP ingestion",
                    )
                    .with_details(json!({
                        "failover_id": failover.id,
                        "http_endpoint": endpoint,
                        "pending_readings": pending_readings,
                    }))
                    .auto_fixed(),
                )
                .await;
                RecoveryMetrics::attempt(action, AttemptOutcome::Success);

                FailoverOutcome {
                    success: true,
                    failover_id: Some(failover.id),
                    http_endpoint: Some(endpoint),
                    message: "Failed over to HTTP ingestion".to_string(),
                }
            }
            Err(e) => {
                error!(device_id = %device_id, error = %e, "Failed to record transport failover");
                let message = format!("Failed to record transport failover: {}", e);
                self.record(NewDiagnosticLog::new(
                    org_id,
                    device_id,
                    action.as_str(),
                    DiagnosticSeverity::Error,
                    DiagnosticStatus::Failed,
                    message.clone(),
                ))
                .await;
                RecoveryMetrics::attempt(action, AttemptOutcome::Failed);
                FailoverOutcome::failed(message)
            }
        }
    }

    /// Closes every active failover of a device. Returns how many were
    /// closed.
    pub async fn mark_failover_recovered(&self, device_id: &str, readings_flushed: u64) -> BosunResult<usize> {
        let active = self.failovers.find_active_by_device(device_id).await?;
        let now = Utc::now();
        let mut recovered = 0;

        for mut failover in active {
            if !failover.recover(readings_flushed, now) {
                continue;
            }
            self.failovers.update(&failover).await?;
            recovered += 1;

            self.record(
                NewDiagnosticLog::new(
                    failover.org_id.as_str(),
                    device_id,
                    RecoveryAction::TransportRecovered.as_str(),
                    DiagnosticSeverity::Info,
                    DiagnosticStatus::Success,
                    format!(
                        "{} transport restored; {} readings flushed",
                        failover.from_transport, readings_flushed
                    ),
                )
                .with_details(json!({
                    "failover_id": failover.id,
                    "readings_flushed": readings_flushed,
                })),
            )
            .await;
        }

        if recovered > 0 {
            info!(device_id = %device_id, recovered, readings_flushed, "Transport failover recovered");
            RecoveryMetrics::attempt(RecoveryAction::TransportRecovered, AttemptOutcome::Success);
        }
        Ok(recovered)
    }

    // ------------------------------------------------------------------
    // Credential refresh
    // ------------------------------------------------------------------

    /// Refreshes device credentials after an HTTP 401.
    ///
    /// Environment credentials win; otherwise the refresh endpoint is
    /// asked for a token. Any other status code is ignored.
    pub async fn handle_auth_failure(&self, org_id: &str, device_id: &str, status_code: u16) -> CredentialOutcome {
        let action = RecoveryAction::CredentialRefresh;
        if status_code != UNAUTHORIZED {
            debug!(device_id = %device_id, status_code, "Not an authentication failure; credentials untouched");
            RecoveryMetrics::attempt(action, AttemptOutcome::Skipped);
            return CredentialOutcome::failed(
                format!("HTTP {} is not an authentication failure; not attempted", status_code),
                false,
            );
        }
        if !self.config.enable_credential_refresh {
            return CredentialOutcome::failed(Self::skipped(action, device_id), false);
        }

        self.record(NewDiagnosticLog::new(
            org_id,
            device_id,
            action.as_str(),
            DiagnosticSeverity::Warning,
            DiagnosticStatus::InProgress,
            "Device authentication rejected; refreshing credentials",
        ))
        .await;

        if self.config.env_credentials().is_some() {
            info!(device_id = %device_id, "Using credentials provided by the environment");
            return self
                .credential_success(org_id, device_id, CredentialSource::Environment, None)
                .await;
        }

        let Some(url) = self.config.credential_refresh_url.as_deref() else {
            warn!(device_id = %device_id, "No credential source configured; device must be re-provisioned");
            return self
                .credential_failure(org_id, device_id, "No credential source available; re-provision the device")
                .await;
        };

        match self.credentials.refresh(url, device_id).await {
            Ok(Some(token)) => {
                info!(device_id = %device_id, "Obtained fresh token from refresh endpoint");
                self.credential_success(org_id, device_id, CredentialSource::RefreshEndpoint, Some(token))
                    .await
            }
            Ok(None) => {
                warn!(device_id = %device_id, "Refresh endpoint returned no token");
                self.credential_failure(org_id, device_id, "Refresh endpoint returned no token")
                    .await
            }
            Err(e) => {
                warn!(device_id = %device_id, error = %e, "Credential refresh request failed");
                self.credential_failure(org_id, device_id, &format!("Credential refresh request failed: {}", e))
                    .await
            }
        }
    }

    async fn credential_success(
        &self,
        org_id: &str,
        device_id: &str,
        source: CredentialSource,
        token: Option<String>,
    ) -> CredentialOutcome {
        let message = match source {
            CredentialSource::Environment => "Reloaded credentials from environment",
            CredentialSource::RefreshEndpoint => "Obtained fresh token from refresh endpoint",
        };

        self.record(
            NewDiagnosticLog::new(
                org_id,
                device_id,
                RecoveryAction::CredentialRefresh.as_str(),
                DiagnosticSeverity::Info,
                DiagnosticStatus::Success,
                message,
            )
            .with_details(json!({ "source": source }))
            .auto_fixed(),
        )
        .await;
        RecoveryMetrics::attempt(RecoveryAction::CredentialRefresh, AttemptOutcome::Success);

        CredentialOutcome {
            success: true,
            source: Some(source),
            token,
            requires_user_action: false,
            message: message.to_string(),
        }
    }

    async fn credential_failure(&self, org_id: &str, device_id: &str, message: &str) -> CredentialOutcome {
        self.record(NewDiagnosticLog::new(
            org_id,
            device_id,
            RecoveryAction::CredentialRefresh.as_str(),
            DiagnosticSeverity::Error,
            DiagnosticStatus::Failed,
            message,
        ))
        .await;
        RecoveryMetrics::attempt(RecoveryAction::CredentialRefresh, AttemptOutcome::Failed);
        CredentialOutcome::failed(message, true)
    }

    // ------------------------------------------------------------------
    // Serial port restart
    // ------------------------------------------------------------------

    /// Restarts a failed serial port through `restart`, which resolves to
    /// whether the port came back.
    ///
    /// Refuses once the consecutive-failure count reaches
    /// `max_port_restart_attempts`. An error from `restart` or from storage
    /// is reported as a failure with `restart_count = 0` and leaves the
    /// persisted state untouched.
    pub async fn handle_port_failure<F, Fut>(
        &self,
        org_id: &str,
        device_id: &str,
        port_path: &str,
        restart: F,
    ) -> PortRestartOutcome
    where
        F: FnOnce() -> Fut + Send,
        Fut: Future<Output = anyhow::Result<bool>> + Send,
    {
        let action = RecoveryAction::PortRestart;
        if !self.config.enable_port_restart {
            return PortRestartOutcome::failed(Self::skipped(action, device_id), 0);
        }

        match self.restart_port(org_id, device_id, port_path, restart).await {
            Ok(outcome) => outcome,
            Err(e) => {
                error!(device_id = %device_id, port = %port_path, error = %format!("{:#}", e), "Port restart errored");
                let message = format!("Port restart errored: {:#}", e);
                self.record(
                    NewDiagnosticLog::new(
                        org_id,
                        device_id,
                        action.as_str(),
                        DiagnosticSeverity::Error,
                        DiagnosticStatus::Failed,
                        message.clone(),
                    )
                    .with_details(json!({ "port_path": port_path })),
                )
                .await;
                RecoveryMetrics::attempt(action, AttemptOutcome::Failed);
                PortRestartOutcome::failed(message, 0)
            }
        }
    }

    async fn restart_port<F, Fut>(
        &self,
        org_id: &str,
        device_id: &str,
        port_path: &str,
        restart: F,
    ) -> anyhow::Result<PortRestartOutcome>
    where
        F: FnOnce() -> Fut + Send,
        Fut: Future<Output = anyhow::Result<bool>> + Send,
    {
        let action = RecoveryAction::PortRestart;
        let max_attempts = self.config.max_port_restart_attempts;
        let mut state = self
            .ports
            .get(device_id, port_path)
            .await?
            .unwrap_or_else(|| PortState::new(device_id, port_path));

        if state.restart_count >= max_attempts {
            error!(
                device_id = %device_id,
                port = %port_path,
                restart_count = state.restart_count,
                "Port restart limit reached; manual intervention required"
            );
            let message = format!(
                "Port {} failed {} consecutive restarts; manual intervention required",
                port_path, state.restart_count
            );
            self.record(
                NewDiagnosticLog::new(
                    org_id,
                    device_id,
                    action.as_str(),
                    DiagnosticSeverity::Critical,
                    DiagnosticStatus::Failed,
                    message.clone(),
                )
                .with_details(json!({
                    "port_path": port_path,
                    "restart_count": state.restart_count,
                    "max_attempts": max_attempts,
                })),
            )
            .await;
            RecoveryMetrics::attempt(action, AttemptOutcome::Failed);

            return Ok(PortRestartOutcome {
                success: false,
                restart_count: state.restart_count,
                requires_manual_intervention: true,
                message,
            });
        }

        let attempt = state.restart_count + 1;
        self.record(
            NewDiagnosticLog::new(
                org_id,
                device_id,
                action.as_str(),
                DiagnosticSeverity::Warning,
                DiagnosticStatus::InProgress,
                format!("Restarting port {} (attempt {} of {})", port_path, attempt, max_attempts),
            )
            .with_details(json!({ "port_path": port_path })),
        )
        .await;

        let restarted = restart().await?;
        state.last_restart_at = Some(Utc::now());

        if restarted {
            state.restart_count = 0;
            state.status = PortStatus::Online;
            self.ports.upsert(&state).await?;

            info!(device_id = %device_id, port = %port_path, "Port restarted");
            self.record(
                NewDiagnosticLog::new(
                    org_id,
                    device_id,
                    action.as_str(),
                    DiagnosticSeverity::Info,
                    DiagnosticStatus::Success,
                    format!("Port {} restarted", port_path),
                )
                .with_details(json!({ "port_path": port_path, "attempt": attempt }))
                .auto_fixed(),
            )
            .await;
            RecoveryMetrics::attempt(action, AttemptOutcome::Success);

            Ok(PortRestartOutcome {
                success: true,
                restart_count: 0,
                requires_manual_intervention: false,
                message: format!("Port {} restarted", port_path),
            })
        } else {
            state.restart_count = attempt;
            state.status = PortStatus::Error;
            self.ports.upsert(&state).await?;

            warn!(device_id = %device_id, port = %port_path, restart_count = attempt, "Port restart failed");
            let message = format!("Port {} did not come back (failure {} of {})", port_path, attempt, max_attempts);
            self.record(
                NewDiagnosticLog::new(
                    org_id,
                    device_id,
                    action.as_str(),
                    DiagnosticSeverity::Error,
                    DiagnosticStatus::Failed,
                    message.clone(),
                )
                .with_details(json!({ "port_path": port_path, "restart_count": attempt })),
            )
            .await;
            RecoveryMetrics::attempt(action, AttemptOutcome::Failed);

            Ok(PortRestartOutcome::failed(message, attempt))
        }
    }

    // ------------------------------------------------------------------
    // Stale sensor
    // ------------------------------------------------------------------

    /// Restarts polling of a sensor whose last reading is at least
    /// `stale_sensor_threshold_secs` old.
    pub async fn handle_stale_sensor<F, Fut>(
        &self,
        org_id: &str,
        device_id: &str,
        sensor_id: &str,
        last_reading_at: DateTime<Utc>,
        restart_polling: F,
    ) -> StaleSensorOutcome
    where
        F: FnOnce() -> Fut + Send,
        Fut: Future<Output = anyhow::Result<bool>> + Send,
    {
        self.handle_stale_sensor_at(org_id, device_id, sensor_id, last_reading_at, Utc::now(), restart_polling)
            .await
    }

    /// [`AutoRecoveryEngine::handle_stale_sensor`] evaluated at `now`.
    pub async fn handle_stale_sensor_at<F, Fut>(
        &self,
        org_id: &str,
        device_id: &str,
        sensor_id: &str,
        last_reading_at: DateTime<Utc>,
        now: DateTime<Utc>,
        restart_polling: F,
    ) -> StaleSensorOutcome
    where
        F: FnOnce() -> Fut + Send,
        Fut: Future<Output = anyhow::Result<bool>> + Send,
    {
        let action = RecoveryAction::StaleSensor;
        let elapsed_secs = (now - last_reading_at).num_seconds();
        let threshold = i64::try_from(self.config.stale_sensor_threshold_secs).unwrap_or(i64::MAX);

        if elapsed_secs < threshold {
            return StaleSensorOutcome {
                attempted: false,
                success: false,
                elapsed_secs,
                message: "Sensor is reporting".to_string(),
            };
        }

        if !self.config.enable_stale_sensor_recovery {
            return StaleSensorOutcome {
                attempted: false,
                success: false,
                elapsed_secs,
                message: Self::skipped(action, device_id),
            };
        }

        self.record(
            NewDiagnosticLog::new(
                org_id,
                device_id,
                action.as_str(),
                DiagnosticSeverity::Warning,
                DiagnosticStatus::InProgress,
                format!("No reading from sensor {} for {}s; restarting polling", sensor_id, elapsed_secs),
            )
            .with_details(json!({ "sensor_id": sensor_id, "elapsed_secs": elapsed_secs })),
        )
        .await;

        let (success, message) = match restart_polling().await {
            Ok(true) => (true, format!("Polling restarted for sensor {}", sensor_id)),
            Ok(false) => (false, format!("Polling restart for sensor {} failed", sensor_id)),
            Err(e) => (false, format!("Polling restart for sensor {} errored: {:#}", sensor_id, e)),
        };

        if success {
            info!(device_id = %device_id, sensor_id = %sensor_id, elapsed_secs, "Stale sensor recovered");
        } else {
            warn!(device_id = %device_id, sensor_id = %sensor_id, elapsed_secs, reason = %message, "Stale sensor recovery failed");
        }

        let (severity, status) = if success {
            (DiagnosticSeverity::Info, DiagnosticStatus::Success)
        } else {
            (DiagnosticSeverity::Error, DiagnosticStatus::Failed)
        };
        let mut entry = NewDiagnosticLog::new(org_id, device_id, action.as_str(), severity, status, message.clone())
            .with_details(json!({ "sensor_id": sensor_id, "elapsed_secs": elapsed_secs }));
        if success {
            entry = entry.auto_fixed();
        }
        self.record(entry).await;
        RecoveryMetrics::attempt(action, AttemptOutcome::from_success(success));

        StaleSensorOutcome {
            attempted: true,
            success,
            elapsed_secs,
            message,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use bosun_core::BosunError;
    use bosun_domain::DiagnosticLog;
    use bosun_repository::MemoryStore;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use wiremock::matchers::{body_json, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    const ORG: &str = "org-1";
    const DEVICE: &str = "dev-1";
    const PORT: &str = "/dev/ttyUSB0";

    struct FailingDiagnostics;

    #[async_trait]
    impl DiagnosticRepository for FailingDiagnostics {
        async fn create(&self, _log: NewDiagnosticLog) -> BosunResult<DiagnosticLog> {
            Err(BosunError::storage("diagnostics table unavailable"))
        }

        async fn find_by_device(&self, _device_id: &str, _limit: usize) -> BosunResult<Vec<DiagnosticLog>> {
            Err(BosunError::storage("diagnostics table unavailable"))
        }

        async fn count_since(
            &self,
            _org_id: &str,
            _severity: DiagnosticSeverity,
            _since: DateTime<Utc>,
        ) -> BosunResult<u64> {
            Err(BosunError::storage("diagnostics table unavailable"))
        }
    }

    fn engine_with(config: RecoveryConfig) -> (Arc<MemoryStore>, AutoRecoveryEngine) {
        let store = Arc::new(MemoryStore::new());
        let engine = AutoRecoveryEngine::new(config, store.clone(), store.clone(), store.clone()).unwrap();
        (store, engine)
    }

    fn engine() -> (Arc<MemoryStore>, AutoRecoveryEngine) {
        engine_with(RecoveryConfig::default())
    }

    fn statuses(store: &MemoryStore) -> Vec<DiagnosticStatus> {
        store.diagnostics().iter().map(|d| d.status).collect()
    }

    async fn port_count(store: &MemoryStore) -> Option<u32> {
        PortStateRepository::get(store, DEVICE, PORT)
            .await
            .unwrap()
            .map(|p| p.restart_count)
    }

    #[tokio::test]
    async fn test_mqtt_failover() {
        let (store, engine) = engine();

        let outcome = engine.handle_mqtt_failure(ORG, DEVICE, "broker unreachable", 42).await;
        assert!(outcome.success);
        assert_eq!(
            outcome.http_endpoint.as_deref(),
            Some("http://localhost:5000/api/edge/telemetry")
        );

        let failovers = store.failovers();
        assert_eq!(failovers.len(), 1);
        assert!(failovers[0].is_active);
        assert_eq!(failovers[0].pending_readings, 42);
        assert_eq!(Some(&failovers[0].id), outcome.failover_id.as_ref());
        assert_eq!(statuses(&store), vec![DiagnosticStatus::InProgress, DiagnosticStatus::Success]);
    }

    #[tokio::test]
    async fn test_disabled_flow_is_not_attempted() {
        let (store, engine) = engine_with(RecoveryConfig {
            enable_mqtt_failover: false,
            ..RecoveryConfig::default()
        });

        let outcome = engine.handle_mqtt_failure(ORG, DEVICE, "broker unreachable", 1).await;
        assert!(!outcome.success);
        assert!(outcome.message.contains("not attempted"));
        assert!(store.failovers().is_empty());
        assert!(store.diagnostics().is_empty());
    }

    #[tokio::test]
    async fn test_diagnostic_failures_do_not_abort_recovery() {
        let store = Arc::new(MemoryStore::new());
        let engine = AutoRecoveryEngine::new(
            RecoveryConfig::default(),
            Arc::new(FailingDiagnostics),
            store.clone(),
            store.clone(),
        )
        .unwrap();

        let outcome = engine.handle_mqtt_failure(ORG, DEVICE, "broker unreachable", 0).await;
        assert!(outcome.success);
        assert_eq!(store.failovers().len(), 1);

        let port = engine.handle_port_failure(ORG, DEVICE, PORT, || async { Ok(true) }).await;
        assert!(port.success);
    }

    #[tokio::test]
    async fn test_mark_failover_recovered() {
        let (store, engine) = engine();
        engine.handle_mqtt_failure(ORG, DEVICE, "broker unreachable", 5).await;
        engine.handle_mqtt_failure(ORG, DEVICE, "broker flapping", 7).await;

        assert_eq!(engine.mark_failover_recovered(DEVICE, 12).await.unwrap(), 2);
        assert_eq!(engine.mark_failover_recovered(DEVICE, 12).await.unwrap(), 0);

        for failover in store.failovers() {
            assert!(!failover.is_active);
            assert_eq!(failover.readings_flushed, Some(12));
            assert!(failover.recovered_at.is_some());
        }
    }

    #[tokio::test]
    async fn test_non_401_never_refreshes() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({ "token": "t" })))
            .expect(0)
            .mount(&server)
            .await;

        let (store, engine) = engine_with(RecoveryConfig {
            credential_refresh_url: Some(format!("{}/api/devices/refresh", server.uri())),
            ..RecoveryConfig::default()
        });

        let outcome = engine.handle_auth_failure(ORG, DEVICE, 403).await;
        assert!(!outcome.success);
        assert!(!outcome.requires_user_action);
        assert!(store.diagnostics().is_empty());
    }

    #[tokio::test]
    async fn test_env_credentials_skip_refresh_endpoint() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({ "token": "t" })))
            .expect(0)
            .mount(&server)
            .await;

        let (store, engine) = engine_with(RecoveryConfig {
            device_api_key: Some("env-key".to_string()),
            credential_refresh_url: Some(format!("{}/api/devices/refresh", server.uri())),
            ..RecoveryConfig::default()
        });

        let outcome = engine.handle_auth_failure(ORG, DEVICE, 401).await;
        assert!(outcome.success);
        assert_eq!(outcome.source, Some(CredentialSource::Environment));
        assert!(outcome.token.is_none());
        assert_eq!(statuses(&store), vec![DiagnosticStatus::InProgress, DiagnosticStatus::Success]);
    }

    #[tokio::test]
    async fn test_refresh_endpoint_issues_token() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/api/devices/refresh"))
            .and(body_json(json!({ "deviceId": DEVICE })))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({ "token": "fresh-token" })))
            .expect(1)
            .mount(&server)
            .await;

        let (_, engine) = engine_with(RecoveryConfig {
            credential_refresh_url: Some(format!("{}/api/devices/refresh", server.uri())),
            ..RecoveryConfig::default()
        });

        let outcome = engine.handle_auth_failure(ORG, DEVICE, 401).await;
        assert!(outcome.success);
        assert_eq!(outcome.source, Some(CredentialSource::RefreshEndpoint));
        assert_eq!(outcome.token.as_deref(), Some("fresh-token"));
    }

    #[tokio::test]
    async fn test_refresh_endpoint_without_token_fails() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({ "token": "" })))
            .mount(&server)
            .await;

        let (store, engine) = engine_with(RecoveryConfig {
            credential_refresh_url: Some(server.uri()),
            ..RecoveryConfig::default()
        });

        let outcome = engine.handle_auth_failure(ORG, DEVICE, 401).await;
        assert!(!outcome.success);
        assert!(outcome.requires_user_action);
        assert_eq!(statuses(&store), vec![DiagnosticStatus::InProgress, DiagnosticStatus::Failed]);
    }

    #[tokio::test]
    async fn test_refresh_endpoint_error_fails() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(500))
            .mount(&server)
            .await;

        let (_, engine) = engine_with(RecoveryConfig {
            credential_refresh_url: Some(server.uri()),
            ..RecoveryConfig::default()
        });

        let outcome = engine.handle_auth_failure(ORG, DEVICE, 401).await;
        assert!(!outcome.success);
        assert!(outcome.message.contains("HTTP 500"));
    }

    #[tokio::test]
    async fn test_no_credential_source_requires_user_action() {
        let (_, engine) = engine();

        let outcome = engine.handle_auth_failure(ORG, DEVICE, 401).await;
        assert!(!outcome.success);
        assert!(outcome.requires_user_action);
    }

    #[tokio::test]
    async fn test_port_restart_cap() {
        let (store, engine) = engine();
        let calls = Arc::new(AtomicUsize::new(0));

        for expected in 1..=3 {
            let counter = calls.clone();
            let outcome = engine
                .handle_port_failure(ORG, DEVICE, PORT, move || async move {
                    counter.fetch_add(1, Ordering::SeqCst);
                    Ok(false)
                })
                .await;
            assert!(!outcome.success);
            assert_eq!(outcome.restart_count, expected);
        }
        assert_eq!(port_count(&store).await, Some(3));

        let counter = calls.clone();
        let outcome = engine
            .handle_port_failure(ORG, DEVICE, PORT, move || async move {
                counter.fetch_add(1, Ordering::SeqCst);
                Ok(true)
            })
            .await;
        assert!(!outcome.success);
        assert!(outcome.requires_manual_intervention);
        assert_eq!(calls.load(Ordering::SeqCst), 3);

        let last = store.diagnostics().pop().unwrap();
        assert_eq!(last.severity, DiagnosticSeverity::Critical);
    }

    #[tokio::test]
    async fn test_port_restart_success_resets_count() {
        let (store, engine) = engine();

        for _ in 0..2 {
            engine.handle_port_failure(ORG, DEVICE, PORT, || async { Ok(false) }).await;
        }
        assert_eq!(port_count(&store).await, Some(2));

        let outcome = engine.handle_port_failure(ORG, DEVICE, PORT, || async { Ok(true) }).await;
        assert!(outcome.success);
        assert_eq!(outcome.restart_count, 0);
        assert_eq!(port_count(&store).await, Some(0));

        let state = PortStateRepository::get(store.as_ref(), DEVICE, PORT).await.unwrap().unwrap();
        assert_eq!(state.status, PortStatus::Online);
        assert!(state.last_restart_at.is_some());
    }

    #[tokio::test]
    async fn test_port_restart_callback_error_is_not_persisted() {
        let (store, engine) = engine();
        engine.handle_port_failure(ORG, DEVICE, PORT, || async { Ok(false) }).await;

        let outcome = engine
            .handle_port_failure(ORG, DEVICE, PORT, || async { Err(anyhow::anyhow!("serial driver crashed")) })
            .await;
        assert!(!outcome.success);
        assert_eq!(outcome.restart_count, 0);
        assert!(outcome.message.contains("serial driver crashed"));
        assert_eq!(port_count(&store).await, Some(1));
    }

    #[tokio::test]
    async fn test_stale_sensor_threshold_is_inclusive() {
        let (store, engine) = engine();
        let now = Utc::now();
        let calls = Arc::new(AtomicUsize::new(0));

        let counter = calls.clone();
        let fresh = engine
            .handle_stale_sensor_at(ORG, DEVICE, "temp-1", now - chrono::Duration::seconds(299), now, move || async move {
                counter.fetch_add(1, Ordering::SeqCst);
                Ok(true)
            })
            .await;
        assert!(!fresh.attempted);
        assert!(!fresh.recovered());
        assert_eq!(calls.load(Ordering::SeqCst), 0);
        assert!(store.diagnostics().is_empty());

        let counter = calls.clone();
        let stale = engine
            .handle_stale_sensor_at(ORG, DEVICE, "temp-1", now - chrono::Duration::seconds(300), now, move || async move {
                counter.fetch_add(1, Ordering::SeqCst);
                Ok(true)
            })
            .await;
        assert!(stale.recovered());
        assert_eq!(stale.elapsed_secs, 300);
        assert_eq!(calls.load(Ordering::SeqCst), 1);
        assert_eq!(statuses(&store), vec![DiagnosticStatus::InProgress, DiagnosticStatus::Success]);
    }

    #[tokio::test]
    async fn test_stale_sensor_restart_failure() {
        let (_, engine) = engine();
        let last = Utc::now() - chrono::Duration::minutes(30);

        let outcome = engine
            .handle_stale_sensor(ORG, DEVICE, "vib-2", last, || async { Err(anyhow::anyhow!("device offline")) })
            .await;
        assert!(outcome.attempted);
        assert!(!outcome.success);
        assert!(outcome.message.contains("device offline"));
    }
}
