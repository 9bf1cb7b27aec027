//! Edge-device connectivity state: serial ports and transport failovers.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Health of a serial port on an edge device.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PortStatus {
    #[default]
    Online,
    Error,
}

/// Persisted state of one device port.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PortState {
    pub device_id: String,
    pub port_path: String,
    pub status: PortStatus,
    /// Consecutive failed restarts; reset to zero on any success.
    pub restart_count: u32,
    pub last_restart_at: Option<DateTime<Utc>>,
}

impl PortState {
    #[must_use]
    pub fn new(device_id: impl Into<String>, port_path: impl Into<String>) -> Self {
        Self {
            device_id: device_id.into(),
            port_path: port_path.into(),
            status: PortStatus::Online,
            restart_count: 0,
            last_restart_at: None,
        }
    }
}

/// Telemetry transport path.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Transport {
    Mqtt,
    Http,
}

impl fmt::Display for Transport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Mqtt => write!(f, "mqtt"),
            Self::Http => write!(f, "http"),
        }
    }
}

/// Insert payload for a failover record.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NewTransportFailover {
    pub org_id: String,
    pub device_id: String,
    pub from_transport: Transport,
    pub to_transport: Transport,
    pub reason: String,
    pub pending_readings: u64,
}

/// A recorded switch from one transport to a backup.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TransportFailover {
    pub id: String,
    pub org_id: String,
    pub device_id: String,
    pub from_transport: Transport,
    pub to_transport: Transport,
    pub reason: String,
    pub pending_readings: u64,
    pub is_active: bool,
    pub readings_flushed: Option<u64>,
    pub started_at: DateTime<Utc>,
    pub recovered_at: Option<DateTime<Utc>>,
}

impl TransportFailover {
    #[must_use]
    pub fn from_new(id: impl Into<String>, new: NewTransportFailover) -> Self {
        Self {
            id: id.into(),
            org_id: new.org_id,
            device_id: new.device_id,
            from_transport: new.from_transport,
            to_transport: new.to_transport,
            reason: new.reason,
            pending_readings: new.pending_readings,
            is_active: true,
            readings_flushed: None,
            started_at: Utc::now(),
            recovered_at: None,
        }
    }

    /// Closes an active failover. Returns false if it was already closed.
    pub fn recover(&mut self, readings_flushed: u64, at: DateTime<Utc>) -> bool {
        if !self.is_active {
            return false;
        }
        self.is_active = false;
        self.readings_flushed = Some(readings_flushed);
        self.recovered_at = Some(at);
        true
    }
}
