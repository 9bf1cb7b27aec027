//! # Bosun Service
//!
//! Background work of the fleet backend, built on the storage ports and the
//! job queue:
//!
//! - `retraining` decides which predictive models need retraining
//! - `pdm` sweeps equipment telemetry for failure risk
//! - `insights` produces per-scope snapshot jobs
//! - `schedules` wires all three into the cron registry

pub mod config;
pub mod insights;
pub mod pdm;
pub mod retraining;
pub mod schedules;

pub use config::ScheduleConfig;
pub use insights::{
    InsightGenerator, InsightJobPayload, InsightScope, InsightSnapshotProcessor, StoreInsightGenerator,
    INSIGHT_JOB_TYPE,
};
pub use pdm::{FailurePrediction, FailurePredictor, HighRiskEquipment, PredictiveMaintenanceSweep, RangeDeviationPredictor, SweepSummary};
pub use retraining::{aggregate_priority, RetrainingEvaluation, RetrainingEvaluator};
pub use schedules::{schedule_names, FleetSchedules, RetrainingRunSummary};
