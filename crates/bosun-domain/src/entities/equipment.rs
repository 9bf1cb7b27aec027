//! Equipment registry and sensor telemetry.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// A piece of monitored shipboard equipment.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Equipment {
    pub id: String,
    pub org_id: String,
    pub name: String,
    pub equipment_type: String,
    pub vessel_id: Option<String>,
    pub is_active: bool,
}

impl Equipment {
    #[must_use]
    pub fn new(
        id: impl Into<String>,
        org_id: impl Into<String>,
        name: impl Into<String>,
        equipment_type: impl Into<String>,
    ) -> Self {
        Self {
            id: id.into(),
            org_id: org_id.into(),
            name: name.into(),
            equipment_type: equipment_type.into(),
            vessel_id: None,
            is_active: true,
        }
    }

    #[must_use]
    pub fn on_vessel(mut self, vessel_id: impl Into<String>) -> Self {
        self.vessel_id = Some(vessel_id.into());
        self
    }

    #[must_use]
    pub fn inactive(mut self) -> Self {
        self.is_active = false;
        self
    }
}

/// A single sensor reading.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TelemetryReading {
    pub equipment_id: String,
    pub sensor_type: String,
    pub value: f64,
    pub unit: Option<String>,
    /// Lower bound of the normal operating range, if known.
    pub min_normal: Option<f64>,
    /// Upper bound of the normal operating range, if known.
    pub max_normal: Option<f64>,
    pub recorded_at: DateTime<Utc>,
}

impl TelemetryReading {
    #[must_use]
    pub fn new(
        equipment_id: impl Into<String>,
        sensor_type: impl Into<String>,
        value: f64,
        recorded_at: DateTime<Utc>,
    ) -> Self {
        Self {
            equipment_id: equipment_id.into(),
            sensor_type: sensor_type.into(),
            value,
            unit: None,
            min_normal: None,
            max_normal: None,
            recorded_at,
        }
    }

    #[must_use]
    pub fn with_normal_range(mut self, min: f64, max: f64) -> Self {
        self.min_normal = Some(min);
        self.max_normal = Some(max);
        self
    }

    /// True when the value falls outside a known normal range.
    #[must_use]
    pub fn is_out_of_range(&self) -> bool {
        let below = self.min_normal.is_some_and(|min| self.value < min);
        let above = self.max_normal.is_some_and(|max| self.value > max);
        below || above
    }
}
