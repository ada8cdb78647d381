//! The node's shared state: current reading, history and peer bookkeeping.

use super::history::HistoryBuffer;
use super::reading::SensorReading;
use super::snapshot::{HistoryEntry, NodeSnapshot};
use crate::clock::SharedClock;
use crate::config::NodeConfig;
use serde::{Deserialize, Serialize};

/// Window during which a detection counts as a recent alert.
pub const RECENT_ALERT_WINDOW_MS: u64 = 30_000;

/// Number of readings averaged for the snapshot's `average_distance`.
pub const SNAPSHOT_AVERAGE_SAMPLES: i64 = 10;

/// Detection window reported in snapshots, in seconds.
pub const SNAPSHOT_DETECTION_WINDOW_SECS: i64 = 60;

const SECONDS_PER_YEAR: u64 = 31_536_000;
const SECONDS_PER_DAY: u64 = 86_400;
const SECONDS_PER_HOUR: u64 = 3_600;
const SECONDS_PER_MINUTE: u64 = 60;

/// How the node is attached to its network.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ConnectivityMode {
    /// Node hosts its own access point
    #[serde(rename = "AP", alias = "ap", alias = "access_point")]
    AccessPoint,
    /// Node joined an existing network
    #[serde(rename = "Station", alias = "station")]
    Station,
}

impl Default for ConnectivityMode {
    fn default() -> Self {
        ConnectivityMode::AccessPoint
    }
}

impl std::fmt::Display for ConnectivityMode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ConnectivityMode::AccessPoint => write!(f, "AP"),
            ConnectivityMode::Station => write!(f, "Station"),
        }
    }
}

/// Facade over the reading history and peer bookkeeping.
///
/// Collaborators only read through the query methods; the ingestion loop is
/// the only writer. `current` may hold an invalid reading, so callers check
/// [`SensorReading::is_valid`] before trusting its distance.
pub struct SystemState {
    current: SensorReading,
    history: HistoryBuffer,
    clock: SharedClock,
    /// Milliseconds since boot of the last dispatched alert
    pub last_alert_time: u64,
    /// Alerts dispatched since boot
    pub alerts_sent: u64,
    /// Seconds since boot, refreshed by [`SystemState::update_uptime`]
    pub uptime_seconds: u64,
    /// Milliseconds since boot of the last heartbeat from the companion
    pub last_peer_heartbeat: u64,
    pub connectivity_mode: ConnectivityMode,
    /// Received signal strength in dBm (0 in access-point mode)
    pub signal_strength: i32,
}

impl SystemState {
    /// Create state with an empty history of the given capacity.
    pub fn new(history_capacity: usize, clock: SharedClock) -> Self {
        let current = SensorReading {
            distance: 0.0,
            timestamp: clock.now_ms(),
            ..Default::default()
        };

        Self {
            current,
            history: HistoryBuffer::new(history_capacity),
            clock,
            last_alert_time: 0,
            alerts_sent: 0,
            uptime_seconds: 0,
            last_peer_heartbeat: 0,
            connectivity_mode: ConnectivityMode::AccessPoint,
            signal_strength: 0,
        }
    }

    /// Milliseconds since boot according to the state's clock.
    pub fn now_ms(&self) -> u64 {
        self.clock.now_ms()
    }

    /// Replace the current reading and offer it to the history.
    ///
    /// An out-of-range reading still becomes `current` but is kept out of
    /// the history.
    pub fn apply_reading(&mut self, reading: SensorReading) {
        self.current = reading.clone();
        self.history.append(reading);
    }

    /// Overwrite only the current status label.
    pub fn set_status(&mut self, status: impl Into<String>) {
        self.current.status = status.into();
    }

    /// Stamp the companion as alive now.
    pub fn record_heartbeat(&mut self) {
        self.last_peer_heartbeat = self.now_ms();
    }

    /// Recomputed on every call from the time since the last heartbeat.
    pub fn is_peer_connected(&self, timeout_ms: u64) -> bool {
        self.now_ms().saturating_sub(self.last_peer_heartbeat) < timeout_ms
    }

    /// Something is detected and an alert went out within the recent-alert window.
    pub fn has_recent_alert(&self) -> bool {
        self.current.object_detected
            && self.now_ms().saturating_sub(self.last_alert_time) < RECENT_ALERT_WINDOW_MS
    }

    /// Record a delivered alert for cooldown tracking.
    pub fn mark_alert_sent(&mut self, at_ms: u64) {
        self.last_alert_time = at_ms;
        self.alerts_sent += 1;
    }

    /// Whether the current detection may raise a new alert.
    ///
    /// The cooldown only applies once an alert has actually been sent.
    pub fn alert_due(&self, cooldown_ms: u64) -> bool {
        self.current.object_detected
            && (self.alerts_sent == 0
                || self.now_ms().saturating_sub(self.last_alert_time) > cooldown_ms)
    }

    /// Refresh `uptime_seconds` from the clock.
    pub fn update_uptime(&mut self) {
        self.uptime_seconds = self.now_ms() / 1000;
    }

    /// Connectivity mode and signal strength (dBm) as last reported.
    pub fn set_connectivity(&mut self, mode: ConnectivityMode, signal_strength: i32) {
        self.connectivity_mode = mode;
        self.signal_strength = signal_strength;
    }

    /// Resize the history in place, keeping the newest readings.
    pub fn set_history_capacity(&mut self, capacity: usize) {
        if capacity != self.history.capacity() {
            tracing::info!(
                from = self.history.capacity(),
                to = capacity,
                "Resizing reading history"
            );
            self.history.resize(capacity);
        }
    }

    /// Return readings and alert bookkeeping to their boot state.
    ///
    /// Connectivity and uptime are left alone.
    pub fn reset_readings(&mut self) {
        self.current = SensorReading {
            distance: 0.0,
            timestamp: self.now_ms(),
            ..Default::default()
        };
        self.history.reset();
        self.last_alert_time = 0;
        self.alerts_sent = 0;
    }

    /// Latest reading, valid or not.
    pub fn current_reading(&self) -> &SensorReading {
        &self.current
    }

    /// The `k`-th newest stored reading; see [`HistoryBuffer::get`].
    pub fn history(&self, k: usize) -> SensorReading {
        self.history.get(k)
    }

    /// Stored readings, at most the capacity.
    pub fn history_count(&self) -> usize {
        self.history.count()
    }

    pub fn history_capacity(&self) -> usize {
        self.history.capacity()
    }

    /// Newest-first iterator over stored readings.
    pub fn history_iter(&self) -> impl Iterator<Item = &SensorReading> + '_ {
        self.history.iter()
    }

    /// Mean distance of the newest `sample_count` readings.
    pub fn average_distance(&self, sample_count: i64) -> f32 {
        self.history.average_distance(sample_count, &self.current)
    }

    /// Detections among readings stamped in the last `window_seconds`.
    pub fn detection_count(&self, window_seconds: i64) -> usize {
        self.history.detection_count(window_seconds, self.now_ms())
    }

    /// Uptime as `"Xh Ym Zs"`.
    pub fn formatted_uptime(&self) -> String {
        format_uptime(self.uptime_seconds)
    }

    /// Serializable view for collaborators.
    pub fn snapshot(&self, config: &NodeConfig, free_memory: u64) -> NodeSnapshot {
        let current = &self.current;
        NodeSnapshot {
            distance: current.distance,
            object_detected: current.object_detected,
            status: current.status.clone(),
            timestamp: current.timestamp,
            mode: current.mode,
            alert_active: current.alert_active,
            companion_history: current.companion_history,
            uptime: self.uptime_seconds,
            uptime_formatted: self.formatted_uptime(),
            free_memory,
            connectivity_mode: self.connectivity_mode,
            signal_strength: self.signal_strength,
            peer_connected: self.is_peer_connected(config.peer.connection_timeout_ms),
            recent_alert: self.has_recent_alert(),
            history_count: self.history_count(),
            average_distance: self.average_distance(SNAPSHOT_AVERAGE_SAMPLES),
            detections_last_minute: self.detection_count(SNAPSHOT_DETECTION_WINDOW_SECS),
            threshold: config.system.distance_threshold_cm,
        }
    }

    /// Stored history as compact entries, newest first.
    pub fn history_entries(&self) -> Vec<HistoryEntry> {
        self.history.iter().map(HistoryEntry::from).collect()
    }
}

/// Render seconds as a short human string.
///
/// Above one year: `"Yy Dd"`. Otherwise the largest non-zero unit picks the
/// layout: `"Dd Hh Mm"`, `"Hh Mm Ss"`, `"Mm Ss"` or `"Ss"`.
pub fn format_uptime(total_seconds: u64) -> String {
    let mut seconds = total_seconds;

    if seconds > SECONDS_PER_YEAR {
        let years = seconds / SECONDS_PER_YEAR;
        seconds %= SECONDS_PER_YEAR;
        let days = seconds / SECONDS_PER_DAY;
        return format!("{}y {}d", years, days);
    }

    let days = seconds / SECONDS_PER_DAY;
    seconds %= SECONDS_PER_DAY;
    let hours = seconds / SECONDS_PER_HOUR;
    seconds %= SECONDS_PER_HOUR;
    let minutes = seconds / SECONDS_PER_MINUTE;
    seconds %= SECONDS_PER_MINUTE;

    if days > 0 {
        format!("{}d {}h {}m", days, hours, minutes)
    } else if hours > 0 {
        format!("{}h {}m {}s", hours, minutes, seconds)
    } else if minutes > 0 {
        format!("{}m {}s", minutes, seconds)
    } else {
        format!("{}s", seconds)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::ManualClock;
    use std::sync::Arc;

    fn state_at(start_ms: u64) -> (SystemState, ManualClock) {
        let clock = ManualClock::new(start_ms);
        (SystemState::new(10, Arc::new(clock.clone())), clock)
    }

    #[test]
    fn test_initial_current_is_invalid() {
        let (state, _) = state_at(250);
        assert!(!state.current_reading().is_valid());
        assert_eq!(state.current_reading().timestamp, 250);
        assert_eq!(state.history_count(), 0);
    }

    #[test]
    fn test_invalid_reading_updates_current_only() {
        let (mut state, _) = state_at(0);
        state.apply_reading(SensorReading::new(25.0, 1));
        state.apply_reading(SensorReading::new(450.0, 2).with_status("Out of range"));

        assert_eq!(state.current_reading().distance, 450.0);
        assert_eq!(state.current_reading().status, "Out of range");
        assert_eq!(state.history_count(), 1);
        assert_eq!(state.history(0).distance, 25.0);
    }

    #[test]
    fn test_peer_connection_is_derived_from_elapsed_time() {
        let (mut state, clock) = state_at(20_000);
        assert!(!state.is_peer_connected(10_000));

        state.record_heartbeat();
        clock.advance(9_999);
        assert!(state.is_peer_connected(10_000));

        clock.advance(1);
        assert!(!state.is_peer_connected(10_000));
    }

    #[test]
    fn test_recent_alert_requires_detection() {
        let (mut state, clock) = state_at(100_000);
        state.mark_alert_sent(100_000);
        assert!(!state.has_recent_alert());

        state.apply_reading(SensorReading::new(10.0, 100_000).with_detection(true));
        assert!(state.has_recent_alert());

        clock.advance(RECENT_ALERT_WINDOW_MS);
        assert!(!state.has_recent_alert());
    }

    #[test]
    fn test_alert_due_honours_cooldown() {
        let (mut state, clock) = state_at(500);
        assert!(!state.alert_due(30_000));

        state.apply_reading(SensorReading::new(10.0, 500).with_detection(true));
        assert!(state.alert_due(30_000));

        state.mark_alert_sent(500);
        assert_eq!(state.alerts_sent, 1);
        clock.advance(30_000);
        assert!(!state.alert_due(30_000));
        clock.advance(1);
        assert!(state.alert_due(30_000));
    }

    #[test]
    fn test_reset_readings() {
        let (mut state, clock) = state_at(1_000);
        state.apply_reading(SensorReading::new(12.0, 1_000).with_detection(true));
        state.mark_alert_sent(1_000);
        state.set_connectivity(ConnectivityMode::Station, -50);

        clock.set(4_000);
        state.reset_readings();
        assert_eq!(state.history_count(), 0);
        assert_eq!(state.current_reading().timestamp, 4_000);
        assert!(!state.current_reading().object_detected);
        assert_eq!(state.alerts_sent, 0);
        assert_eq!(state.connectivity_mode, ConnectivityMode::Station);
    }

    #[test]
    fn test_update_uptime() {
        let (mut state, clock) = state_at(0);
        clock.set(3_661_500);
        state.update_uptime();
        assert_eq!(state.uptime_seconds, 3_661);
        assert_eq!(state.formatted_uptime(), "1h 1m 1s");
    }

    #[test]
    fn test_format_uptime_tiers() {
        assert_eq!(format_uptime(0), "0s");
        assert_eq!(format_uptime(45), "45s");
        assert_eq!(format_uptime(125), "2m 5s");
        assert_eq!(format_uptime(3_661), "1h 1m 1s");
        assert_eq!(format_uptime(90_061), "1d 1h 1m");
        assert_eq!(format_uptime(SECONDS_PER_YEAR), "365d 0h 0m");
        assert_eq!(format_uptime(SECONDS_PER_YEAR + 2 * SECONDS_PER_DAY + 5), "1y 2d");
    }

    #[test]
    fn test_snapshot_reflects_state() {
        let (mut state, _) = state_at(5_000);
        state.set_connectivity(ConnectivityMode::Station, -61);
        state.apply_reading(SensorReading::new(30.0, 5_000).with_detection(true));

        let config = NodeConfig::default();
        let snapshot = state.snapshot(&config, 1024);
        assert_eq!(snapshot.distance, 30.0);
        assert_eq!(snapshot.history_count, 1);
        assert_eq!(snapshot.detections_last_minute, 1);
        assert_eq!(snapshot.connectivity_mode, ConnectivityMode::Station);
        assert_eq!(snapshot.signal_strength, -61);
        assert_eq!(snapshot.free_memory, 1024);
        assert_eq!(snapshot.threshold, config.system.distance_threshold_cm);
    }

    #[test]
    fn test_connectivity_mode_labels() {
        assert_eq!(ConnectivityMode::AccessPoint.to_string(), "AP");
        let mode: ConnectivityMode = serde_json::from_str("\"station\"").unwrap();
        assert_eq!(mode, ConnectivityMode::Station);
    }
}
