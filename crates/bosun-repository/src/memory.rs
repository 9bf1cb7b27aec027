//! In-process store implementing every storage port.

use crate::traits::{
    DiagnosticRepository, EquipmentRepository, FailoverRepository, ModelRepository,
    PortStateRepository, RetrainingTriggerRepository, TelemetryRepository,
};
use async_trait::async_trait;
use bosun_core::BosunResult;
use bosun_domain::{
    new_record_id, DiagnosticLog, DiagnosticSeverity, Equipment, MlModel, ModelStatus,
    ModelValidation, NewDiagnosticLog, NewRetrainingTriggerRecord, NewTransportFailover,
    PortState, PredictionFeedback, RetrainingTriggerRecord, TelemetryReading, TransportFailover,
    TriggerRecordStatus,
};
use chrono::{DateTime, Duration, Utc};
use parking_lot::RwLock;
use std::collections::HashMap;
use tracing::debug;

#[derive(Default)]
struct StoreState {
    diagnostics: Vec<DiagnosticLog>,
    failovers: Vec<TransportFailover>,
    ports: HashMap<(String, String), PortState>,
    equipment: HashMap<String, Equipment>,
    telemetry: Vec<TelemetryReading>,
    models: HashMap<String, MlModel>,
    validations: Vec<ModelValidation>,
    feedback: Vec<PredictionFeedback>,
    verified_predictions: Vec<(String, DateTime<Utc>)>,
    anomalies: Vec<(String, DateTime<Utc>)>,
    triggers: Vec<RetrainingTriggerRecord>,
}

/// Thread-safe in-memory store.
///
/// Backs the server binary when no database is configured and serves as
/// the fake for service and engine tests.
#[derive(Default)]
pub struct MemoryStore {
    state: RwLock<StoreState>,
}

impl MemoryStore {
    /// Creates an empty store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_equipment(&self, equipment: Equipment) {
        self.state.write().equipment.insert(equipment.id.clone(), equipment);
    }

    pub fn add_reading(&self, reading: TelemetryReading) {
        self.state.write().telemetry.push(reading);
    }

    pub fn add_model(&self, model: MlModel) {
        self.state.write().models.insert(model.id.clone(), model);
    }

    pub fn add_validation(&self, validation: ModelValidation) {
        self.state.write().validations.push(validation);
    }

    pub fn add_feedback(&self, feedback: PredictionFeedback) {
        self.state.write().feedback.push(feedback);
    }

    pub fn record_verified_prediction(&self, org_id: &str, at: DateTime<Utc>) {
        self.state.write().verified_predictions.push((org_id.to_string(), at));
    }

    pub fn record_anomaly(&self, org_id: &str, at: DateTime<Utc>) {
        self.state.write().anomalies.push((org_id.to_string(), at));
    }

    /// Every diagnostic entry, oldest first.
    #[must_use]
    pub fn diagnostics(&self) -> Vec<DiagnosticLog> {
        self.state.read().diagnostics.clone()
    }

    /// Every failover record, active or not.
    #[must_use]
    pub fn failovers(&self) -> Vec<TransportFailover> {
        self.state.read().failovers.clone()
    }

    /// Every retraining trigger record.
    #[must_use]
    pub fn trigger_records(&self) -> Vec<RetrainingTriggerRecord> {
        self.state.read().triggers.clone()
    }
}

#[async_trait]
impl DiagnosticRepository for MemoryStore {
    async fn create(&self, log: NewDiagnosticLog) -> BosunResult<DiagnosticLog> {
        let entry = DiagnosticLog::from_new(new_record_id(), log);
        self.state.write().diagnostics.push(entry.clone());
        Ok(entry)
    }

    async fn find_by_device(&self, device_id: &str, limit: usize) -> BosunResult<Vec<DiagnosticLog>> {
        Ok(self
            .state
            .read()
            .diagnostics
            .iter()
            .rev()
            .filter(|d| d.device_id == device_id)
            .take(limit)
            .cloned()
            .collect())
    }

    async fn count_since(
        &self,
        org_id: &str,
        severity: DiagnosticSeverity,
        since: DateTime<Utc>,
    ) -> BosunResult<u64> {
        Ok(self
            .state
            .read()
            .diagnostics
            .iter()
            .filter(|d| d.org_id == org_id && d.severity == severity && d.created_at >= since)
            .count() as u64)
    }
}

#[async_trait]
impl FailoverRepository for MemoryStore {
    async fn create(&self, failover: NewTransportFailover) -> BosunResult<TransportFailover> {
        let record = TransportFailover::from_new(new_record_id(), failover);
        self.state.write().failovers.push(record.clone());
        Ok(record)
    }

    async fn find_active_by_device(&self, device_id: &str) -> BosunResult<Vec<TransportFailover>> {
        Ok(self
            .state
            .read()
            .failovers
            .iter()
            .filter(|f| f.device_id == device_id && f.is_active)
            .cloned()
            .collect())
    }

    async fn update(&self, failover: &TransportFailover) -> BosunResult<()> {
        let mut state = self.state.write();
        match state.failovers.iter_mut().find(|f| f.id == failover.id) {
            Some(existing) => {
                *existing = failover.clone();
                Ok(())
            }
            None => Err(bosun_core::BosunError::not_found("TransportFailover", &failover.id)),
        }
    }

    async fn count_active(&self, org_id: &str) -> BosunResult<u64> {
        Ok(self
            .state
            .read()
            .failovers
            .iter()
            .filter(|f| f.org_id == org_id && f.is_active)
            .count() as u64)
    }
}

#[async_trait]
impl PortStateRepository for MemoryStore {
    async fn get(&self, device_id: &str, port_path: &str) -> BosunResult<Option<PortState>> {
        let key = (device_id.to_string(), port_path.to_string());
        Ok(self.state.read().ports.get(&key).cloned())
    }

    async fn upsert(&self, port: &PortState) -> BosunResult<()> {
        let key = (port.device_id.clone(), port.port_path.clone());
        debug!(device_id = %port.device_id, port = %port.port_path, restart_count = port.restart_count, "Port state saved");
        self.state.write().ports.insert(key, port.clone());
        Ok(())
    }
}

#[async_trait]
impl EquipmentRepository for MemoryStore {
    async fn find_active_by_org(&self, org_id: &str) -> BosunResult<Vec<Equipment>> {
        let mut items: Vec<Equipment> = self
            .state
            .read()
            .equipment
            .values()
            .filter(|e| e.org_id == org_id && e.is_active)
            .cloned()
            .collect();
        items.sort_by(|a, b| a.id.cmp(&b.id));
        Ok(items)
    }

    async fn find_by_id(&self, id: &str) -> BosunResult<Option<Equipment>> {
        Ok(self.state.read().equipment.get(id).cloned())
    }
}

#[async_trait]
impl TelemetryRepository for MemoryStore {
    async fn find_recent(
        &self,
        equipment_id: &str,
        sensor_type: Option<&str>,
        lookback_hours: u32,
    ) -> BosunResult<Vec<TelemetryReading>> {
        let since = Utc::now() - Duration::hours(i64::from(lookback_hours));
        let mut readings: Vec<TelemetryReading> = self
            .state
            .read()
            .telemetry
            .iter()
            .filter(|r| r.equipment_id == equipment_id && r.recorded_at >= since)
            .filter(|r| sensor_type.map_or(true, |s| r.sensor_type == s))
            .cloned()
            .collect();
        readings.sort_by_key(|r| r.recorded_at);
        Ok(readings)
    }
}

#[async_trait]
impl ModelRepository for MemoryStore {
    async fn find_active(&self) -> BosunResult<Vec<MlModel>> {
        let mut models: Vec<MlModel> = self
            .state
            .read()
            .models
            .values()
            .filter(|m| m.status == ModelStatus::Active)
            .cloned()
            .collect();
        models.sort_by(|a, b| a.id.cmp(&b.id));
        Ok(models)
    }

    async fn validations_since(&self, model_id: &str, since: DateTime<Utc>) -> BosunResult<Vec<ModelValidation>> {
        Ok(self
            .state
            .read()
            .validations
            .iter()
            .filter(|v| v.model_id == model_id && v.validated_at >= since)
            .cloned()
            .collect())
    }

    async fn feedback_since(&self, model_id: &str, since: DateTime<Utc>) -> BosunResult<Vec<PredictionFeedback>> {
        Ok(self
            .state
            .read()
            .feedback
            .iter()
            .filter(|f| f.model_id == model_id && f.created_at >= since)
            .cloned()
            .collect())
    }

    async fn count_verified_predictions_since(&self, org_id: &str, since: DateTime<Utc>) -> BosunResult<u64> {
        Ok(self
            .state
            .read()
            .verified_predictions
            .iter()
            .filter(|(org, at)| org == org_id && *at >= since)
            .count() as u64)
    }

    async fn count_anomalies_since(&self, org_id: &str, since: DateTime<Utc>) -> BosunResult<u64> {
        Ok(self
            .state
            .read()
            .anomalies
            .iter()
            .filter(|(org, at)| org == org_id && *at >= since)
            .count() as u64)
    }
}

#[async_trait]
impl RetrainingTriggerRepository for MemoryStore {
    async fn find_pending(&self, model_id: &str, org_id: &str) -> BosunResult<Option<RetrainingTriggerRecord>> {
        Ok(self
            .state
            .read()
            .triggers
            .iter()
            .find(|t| t.model_id == model_id && t.org_id == org_id && t.status == TriggerRecordStatus::Pending)
            .cloned())
    }

    async fn create(&self, record: NewRetrainingTriggerRecord) -> BosunResult<RetrainingTriggerRecord> {
        let record = RetrainingTriggerRecord::pending(new_record_id(), record);
        self.state.write().triggers.push(record.clone());
        Ok(record)
    }

    async fn count_pending(&self, org_id: &str) -> BosunResult<u64> {
        Ok(self
            .state
            .read()
            .triggers
            .iter()
            .filter(|t| t.org_id == org_id && t.status == TriggerRecordStatus::Pending)
            .count() as u64)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use bosun_domain::{DiagnosticStatus, Transport};

    fn failover(device_id: &str) -> NewTransportFailover {
        NewTransportFailover {
            org_id: "org-1".to_string(),
            device_id: device_id.to_string(),
            from_transport: Transport::Mqtt,
            to_transport: Transport::Http,
            reason: "broker down".to_string(),
            pending_readings: 3,
        }
    }

    #[tokio::test]
    async fn test_port_state_round_trip() {
        let store = MemoryStore::new();
        assert!(store.get("dev-1", "/dev/ttyS0").await.unwrap().is_none());

        let mut port = PortState::new("dev-1", "/dev/ttyS0");
        port.restart_count = 2;
        store.upsert(&port).await.unwrap();

        let loaded = store.get("dev-1", "/dev/ttyS0").await.unwrap().unwrap();
        assert_eq!(loaded.restart_count, 2);
        assert!(store.get("dev-1", "/dev/ttyS1").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_active_failovers_filtered_by_device() {
        let store = MemoryStore::new();
        let mut first = FailoverRepository::create(&store, failover("dev-1")).await.unwrap();
        FailoverRepository::create(&store, failover("dev-1")).await.unwrap();
        FailoverRepository::create(&store, failover("dev-2")).await.unwrap();

        assert_eq!(store.find_active_by_device("dev-1").await.unwrap().len(), 2);
        assert_eq!(store.count_active("org-1").await.unwrap(), 3);

        first.recover(3, Utc::now());
        store.update(&first).await.unwrap();
        assert_eq!(store.find_active_by_device("dev-1").await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_update_unknown_failover_is_not_found() {
        let store = MemoryStore::new();
        let orphan = TransportFailover::from_new("missing", failover("dev-1"));
        let err = store.update(&orphan).await.unwrap_err();
        assert_eq!(err.error_code(), "NOT_FOUND");
    }

    #[tokio::test]
    async fn test_telemetry_lookback_and_sensor_filter() {
        let store = MemoryStore::new();
        let now = Utc::now();
        store.add_reading(TelemetryReading::new("eq-1", "temperature", 80.0, now - Duration::hours(1)));
        store.add_reading(TelemetryReading::new("eq-1", "vibration", 2.0, now - Duration::hours(2)));
        store.add_reading(TelemetryReading::new("eq-1", "temperature", 75.0, now - Duration::hours(48)));
        store.add_reading(TelemetryReading::new("eq-2", "temperature", 60.0, now));

        let all = store.find_recent("eq-1", None, 24).await.unwrap();
        assert_eq!(all.len(), 2);
        assert_eq!(all[0].sensor_type, "vibration");

        let temps = store.find_recent("eq-1", Some("temperature"), 24).await.unwrap();
        assert_eq!(temps.len(), 1);
    }

    #[tokio::test]
    async fn test_diagnostics_newest_first() {
        let store = MemoryStore::new();
        for message in ["first", "second", "third"] {
            DiagnosticRepository::create(
                &store,
                NewDiagnosticLog::new(
                    "org-1",
                    "dev-1",
                    "port_restart",
                    DiagnosticSeverity::Info,
                    DiagnosticStatus::Success,
                    message,
                ),
            )
            .await
            .unwrap();
        }

        let recent = store.find_by_device("dev-1", 2).await.unwrap();
        assert_eq!(recent.len(), 2);
        assert_eq!(recent[0].message, "third");
        assert_eq!(
            store.count_since("org-1", DiagnosticSeverity::Info, Utc::now() - Duration::hours(1)).await.unwrap(),
            3
        );
    }

    #[tokio::test]
    async fn test_find_pending_trigger() {
        let store = MemoryStore::new();
        assert!(store.find_pending("m-1", "org-1").await.unwrap().is_none());

        RetrainingTriggerRepository::create(
            &store,
            NewRetrainingTriggerRecord {
                org_id: "org-1".to_string(),
                model_id: "m-1".to_string(),
                triggers: vec![],
                priority: bosun_domain::RetrainingPriority::Low,
                performance_snapshot: None,
                new_data_points: None,
                negative_feedback_count: None,
            },
        )
        .await
        .unwrap();

        assert!(store.find_pending("m-1", "org-1").await.unwrap().is_some());
        assert!(store.find_pending("m-1", "org-2").await.unwrap().is_none());
        assert_eq!(store.count_pending("org-1").await.unwrap(), 1);
    }
}
