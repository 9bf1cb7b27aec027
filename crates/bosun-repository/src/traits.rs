//! Repository trait definitions.

use bosun_core::{BosunResult, Interface};
use bosun_domain::{
    DiagnosticLog, DiagnosticSeverity, Equipment, MlModel, ModelValidation, NewDiagnosticLog,
    NewRetrainingTriggerRecord, NewTransportFailover, PortState, PredictionFeedback,
    RetrainingTriggerRecord, TelemetryReading, TransportFailover,
};
use async_trait::async_trait;
use chrono::{DateTime, Utc};

/// Diagnostic log store.
#[async_trait]
pub trait DiagnosticRepository: Interface + Send + Sync {
    /// Appends a diagnostic entry.
    async fn create(&self, log: NewDiagnosticLog) -> BosunResult<DiagnosticLog>;

    /// Most recent entries for a device, newest first.
    async fn find_by_device(&self, device_id: &str, limit: usize) -> BosunResult<Vec<DiagnosticLog>>;

    /// Counts entries for an org at `severity` since `since`.
    async fn count_since(
        &self,
        org_id: &str,
        severity: DiagnosticSeverity,
        since: DateTime<Utc>,
    ) -> BosunResult<u64>;
}

/// Transport failover store.
#[async_trait]
pub trait FailoverRepository: Interface + Send + Sync {
    /// Records a new active failover.
    async fn create(&self, failover: NewTransportFailover) -> BosunResult<TransportFailover>;

    /// Active failovers for a device.
    async fn find_active_by_device(&self, device_id: &str) -> BosunResult<Vec<TransportFailover>>;

    /// Persists changes to an existing failover.
    async fn update(&self, failover: &TransportFailover) -> BosunResult<()>;

    /// Number of active failovers in an org.
    async fn count_active(&self, org_id: &str) -> BosunResult<u64>;
}

/// Serial port state store.
#[async_trait]
pub trait PortStateRepository: Interface + Send + Sync {
    /// Loads the state of one port.
    async fn get(&self, device_id: &str, port_path: &str) -> BosunResult<Option<PortState>>;

    /// Inserts or replaces the state of one port.
    async fn upsert(&self, state: &PortState) -> BosunResult<()>;
}

/// Equipment registry.
#[async_trait]
pub trait EquipmentRepository: Interface + Send + Sync {
    /// Active equipment belonging to an org.
    async fn find_active_by_org(&self, org_id: &str) -> BosunResult<Vec<Equipment>>;

    /// Finds equipment by ID.
    async fn find_by_id(&self, id: &str) -> BosunResult<Option<Equipment>>;
}

/// Sensor telemetry history.
#[async_trait]
pub trait TelemetryRepository: Interface + Send + Sync {
    /// Readings for `equipment_id` within the last `lookback_hours`,
    /// optionally restricted to one sensor type, oldest first.
    async fn find_recent(
        &self,
        equipment_id: &str,
        sensor_type: Option<&str>,
        lookback_hours: u32,
    ) -> BosunResult<Vec<TelemetryReading>>;
}

/// Model registry and the signals used to judge model health.
#[async_trait]
pub trait ModelRepository: Interface + Send + Sync {
    /// All models in the active status.
    async fn find_active(&self) -> BosunResult<Vec<MlModel>>;

    /// Validation runs for a model since `since`.
    async fn validations_since(&self, model_id: &str, since: DateTime<Utc>) -> BosunResult<Vec<ModelValidation>>;

    /// Feedback on a model's predictions since `since`.
    async fn feedback_since(&self, model_id: &str, since: DateTime<Utc>) -> BosunResult<Vec<PredictionFeedback>>;

    /// Failure predictions with a verified outcome since `since`.
    async fn count_verified_predictions_since(&self, org_id: &str, since: DateTime<Utc>) -> BosunResult<u64>;

    /// Anomaly detections recorded since `since`.
    async fn count_anomalies_since(&self, org_id: &str, since: DateTime<Utc>) -> BosunResult<u64>;
}

/// Retraining trigger records.
#[async_trait]
pub trait RetrainingTriggerRepository: Interface + Send + Sync {
    /// The pending record for a model, if any.
    async fn find_pending(&self, model_id: &str, org_id: &str) -> BosunResult<Option<RetrainingTriggerRecord>>;

    /// Persists a new pending record.
    async fn create(&self, record: NewRetrainingTriggerRecord) -> BosunResult<RetrainingTriggerRecord>;

    /// Number of pending records in an org.
    async fn count_pending(&self, org_id: &str) -> BosunResult<u64>;
}
