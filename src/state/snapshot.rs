//! Serializable views handed to the web, MQTT and chat collaborators.

use super::reading::{Mode, SensorReading, COMPANION_HISTORY_LEN};
use super::system::ConnectivityMode;
use serde::{Deserialize, Serialize};

/// Point-in-time view of the node.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NodeSnapshot {
    /// Current distance in centimeters (may be out of range)
    pub distance: f32,
    pub object_detected: bool,
    pub status: String,
    /// Milliseconds since boot of the current reading
    pub timestamp: u64,
    pub mode: Mode,
    pub alert_active: bool,
    pub companion_history: [f32; COMPANION_HISTORY_LEN],
    /// Uptime in seconds
    pub uptime: u64,
    pub uptime_formatted: String,
    /// Available host memory in bytes
    pub free_memory: u64,
    pub connectivity_mode: ConnectivityMode,
    pub signal_strength: i32,
    pub peer_connected: bool,
    pub recent_alert: bool,
    pub history_count: usize,
    pub average_distance: f32,
    pub detections_last_minute: usize,
    /// Detection threshold in centimeters
    pub threshold: f32,
}

/// Compact history row as served by `/api/history`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HistoryEntry {
    pub distance: f32,
    pub timestamp: u64,
    pub object_detected: bool,
}

impl From<&SensorReading> for HistoryEntry {
    fn from(reading: &SensorReading) -> Self {
        Self {
            distance: reading.distance,
            timestamp: reading.timestamp,
            object_detected: reading.object_detected,
        }
    }
}
