//! Applies classified lines to [`SystemState`].

use super::parser::{CompanionFrame, IngestEvent};
use crate::state::reading::{detection_status, Mode};
use crate::state::SystemState;
use serde::Serialize;
use tracing::{debug, info, warn};

/// Effect of one event, reported back to the loop.
#[derive(Debug, Clone, PartialEq)]
pub enum ApplyOutcome {
    /// `current` replaced (and history appended when valid)
    ReadingApplied { in_history: bool },
    /// Only the status label changed
    StatusChanged,
    /// Companion asked for a visual alert
    AlertSignal(String),
    /// Heartbeat recorded without a reading
    Heartbeat,
    /// Informational line, logged only
    Logged,
    /// Line dropped (malformed JSON or console noise)
    Discarded,
}

/// Running counters over everything ingested.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct IngestStats {
    pub json_frames: u64,
    pub legacy_readings: u64,
    pub heartbeats: u64,
    pub alerts: u64,
    pub malformed: u64,
    pub console_noise: u64,
}

/// Apply a single event under the given detection threshold.
pub fn apply_event(
    state: &mut SystemState,
    event: IngestEvent,
    threshold_cm: f32,
    stats: &mut IngestStats,
) -> ApplyOutcome {
    match event {
        IngestEvent::Frame(frame) => {
            stats.json_frames += 1;
            let in_history = apply_frame(state, &frame, threshold_cm);
            state.record_heartbeat();
            ApplyOutcome::ReadingApplied { in_history }
        }
        IngestEvent::Distance(distance) => {
            stats.legacy_readings += 1;
            let in_history = apply_legacy_distance(state, distance, threshold_cm);
            ApplyOutcome::ReadingApplied { in_history }
        }
        IngestEvent::Alert(level) => {
            stats.alerts += 1;
            info!(level = %level, "Alert from companion");
            ApplyOutcome::AlertSignal(level)
        }
        IngestEvent::Status(status) => {
            state.set_status(status);
            ApplyOutcome::StatusChanged
        }
        IngestEvent::System(message) => {
            info!(message = %message, "System message from companion");
            ApplyOutcome::Logged
        }
        IngestEvent::Heartbeat => {
            stats.heartbeats += 1;
            state.record_heartbeat();
            debug!("Companion heartbeat received");
            ApplyOutcome::Heartbeat
        }
        IngestEvent::PeerError(message) => {
            warn!(message = %message, "Companion reported an error");
            ApplyOutcome::Logged
        }
        IngestEvent::ConsoleNoise(line) => {
            stats.console_noise += 1;
            warn!(
                console_noise = true,
                line = %line,
                "Companion serial console detected on the data link; disable the login console on the companion's serial port"
            );
            ApplyOutcome::Discarded
        }
        IngestEvent::Malformed { line, reason } => {
            stats.malformed += 1;
            warn!(line = %line, error = %reason, "Discarding malformed JSON frame");
            ApplyOutcome::Discarded
        }
    }
}

/// JSON path: detection is the threshold comparison OR the companion's alert flag.
fn apply_frame(state: &mut SystemState, frame: &CompanionFrame, threshold_cm: f32) -> bool {
    let mut reading = state.current_reading().clone();
    reading.distance = frame.distance;
    reading.mode = Mode::from(frame.mode);
    reading.alert_active = frame.alert_asserted();
    reading.timestamp = state.now_ms();
    reading.object_detected = frame.distance <= threshold_cm || reading.alert_active;
    reading.status = detection_status(reading.object_detected).to_string();
    // slots beyond the frame's list keep their previous values
    for (slot, value) in reading.companion_history.iter_mut().zip(&frame.history) {
        *slot = *value;
    }

    let in_history = reading.is_valid();
    state.apply_reading(reading);
    in_history
}

/// Legacy path: detection is the threshold comparison only; the alert flag is left alone.
fn apply_legacy_distance(state: &mut SystemState, distance: f32, threshold_cm: f32) -> bool {
    let mut reading = state.current_reading().clone();
    reading.distance = distance;
    reading.timestamp = state.now_ms();
    reading.object_detected = distance <= threshold_cm;
    reading.status = detection_status(reading.object_detected).to_string();

    let in_history = reading.is_valid();
    state.apply_reading(reading);
    in_history
}
