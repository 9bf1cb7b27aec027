//! Predictive maintenance sweep.
//!
//! Feeds recent telemetry of active equipment to a failure predictor and
//! reports equipment whose failure probability exceeds a fixed threshold.

use async_trait::async_trait;
use bosun_core::{BosunError, BosunResult};
use bosun_domain::{Equipment, TelemetryReading};
use bosun_repository::{EquipmentRepository, TelemetryRepository};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::Arc;
use tracing::{debug, info, warn};

/// Hours of telemetry considered by a sweep.
pub const LOOKBACK_HOURS: u32 = 24;

/// Failure probability above which equipment is reported.
pub const HIGH_RISK_THRESHOLD: f64 = 0.3;

/// Predictor output for one piece of equipment.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FailurePrediction {
    /// Probability of failure, 0.0 to 1.0.
    pub failure_probability: f64,
    /// Most likely failure mode, if identified.
    pub failure_mode: Option<String>,
}

/// Estimates failure probability from recent telemetry.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait FailurePredictor: Send + Sync {
    async fn predict(&self, equipment: &Equipment, readings: &[TelemetryReading]) -> BosunResult<FailurePrediction>;
}

/// Scores equipment by the fraction of readings outside their normal range.
///
/// The failure mode is the sensor type with the most out-of-range readings.
#[derive(Debug, Default, Clone, Copy)]
pub struct RangeDeviationPredictor;

#[async_trait]
impl FailurePredictor for RangeDeviationPredictor {
    async fn predict(&self, _equipment: &Equipment, readings: &[TelemetryReading]) -> BosunResult<FailurePrediction> {
        if readings.is_empty() {
            return Ok(FailurePrediction {
                failure_probability: 0.0,
                failure_mode: None,
            });
        }

        let mut by_sensor: HashMap<&str, usize> = HashMap::new();
        for reading in readings.iter().filter(|r| r.is_out_of_range()) {
            *by_sensor.entry(reading.sensor_type.as_str()).or_default() += 1;
        }

        let out_of_range: usize = by_sensor.values().sum();
        let failure_mode = by_sensor
            .into_iter()
            .max_by(|a, b| a.1.cmp(&b.1).then_with(|| b.0.cmp(a.0)))
            .map(|(sensor, _)| format!("{}_out_of_range", sensor));

        Ok(FailurePrediction {
            failure_probability: out_of_range as f64 / readings.len() as f64,
            failure_mode,
        })
    }
}

/// Equipment reported by a sweep.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HighRiskEquipment {
    pub equipment_id: String,
    pub name: String,
    pub failure_probability: f64,
    pub failure_mode: Option<String>,
}

/// Outcome of a sweep.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SweepSummary {
    /// Equipment that received a prediction.
    pub processed: usize,
    /// Equipment skipped for lack of recent telemetry.
    pub skipped: usize,
    /// Equipment whose prediction failed.
    pub failed: usize,
    pub high_risk: Vec<HighRiskEquipment>,
}

impl SweepSummary {
    /// Number of equipment above the risk threshold.
    pub fn high_risk_count(&self) -> usize {
        self.high_risk.len()
    }
}

/// Runs failure predictions over the equipment registry.
pub struct PredictiveMaintenanceSweep {
    equipment: Arc<dyn EquipmentRepository>,
    telemetry: Arc<dyn TelemetryRepository>,
    predictor: Arc<dyn FailurePredictor>,
}

impl PredictiveMaintenanceSweep {
    /// Creates a new sweep.
    pub fn new(
        equipment: Arc<dyn EquipmentRepository>,
        telemetry: Arc<dyn TelemetryRepository>,
        predictor: Arc<dyn FailurePredictor>,
    ) -> Self {
        Self {
            equipment,
            telemetry,
            predictor,
        }
    }

    /// Sweeps all active equipment of an org.
    ///
    /// A failing prediction is counted and logged; the sweep continues.
    pub async fn run_all(&self, org_id: &str) -> BosunResult<SweepSummary> {
        let equipment = self.equipment.find_active_by_org(org_id).await?;
        info!(org_id = %org_id, equipment = equipment.len(), "Running predictive maintenance sweep");

        let mut summary = SweepSummary::default();
        for item in &equipment {
            if let Err(e) = self.sweep_one(item, &mut summary).await {
                summary.failed += 1;
                warn!(equipment_id = %item.id, error = %e, "Failure prediction failed");
            }
        }

        info!(
            org_id = %org_id,
            processed = summary.processed,
            skipped = summary.skipped,
            failed = summary.failed,
            high_risk = summary.high_risk_count(),
            "Predictive maintenance sweep finished"
        );
        Ok(summary)
    }

    /// Sweeps a single piece of equipment. Prediction errors propagate.
    pub async fn run_for_equipment(&self, equipment_id: &str) -> BosunResult<SweepSummary> {
        let item = self
            .equipment
            .find_by_id(equipment_id)
            .await?
            .ok_or_else(|| BosunError::not_found("Equipment", equipment_id))?;

        let mut summary = SweepSummary::default();
        self.sweep_one(&item, &mut summary).await?;
        Ok(summary)
    }

    async fn sweep_one(&self, item: &Equipment, summary: &mut SweepSummary) -> BosunResult<()> {
        let readings = self.telemetry.find_recent(&item.id, None, LOOKBACK_HOURS).await?;
        if readings.is_empty() {
            debug!(equipment_id = %item.id, "No recent telemetry; skipping");
            summary.skipped += 1;
            return Ok(());
        }

        let prediction = self.predictor.predict(item, &readings).await?;
        summary.processed += 1;

        if prediction.failure_probability > HIGH_RISK_THRESHOLD {
            warn!(
                equipment_id = %item.id,
                equipment = %item.name,
                probability = prediction.failure_probability,
                failure_mode = prediction.failure_mode.as_deref().unwrap_or("unknown"),
                "High failure risk detected"
            );
            summary.high_risk.push(HighRiskEquipment {
                equipment_id: item.id.clone(),
                name: item.name.clone(),
                failure_probability: prediction.failure_probability,
                failure_mode: prediction.failure_mode,
            });
        }
        Ok(())
    }
}
