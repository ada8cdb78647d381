//! Data structures for a single distance observation.

use serde::{Deserialize, Serialize};

/// Number of companion-side history values carried inline with each reading.
pub const COMPANION_HISTORY_LEN: usize = 5;

/// Lower (exclusive) bound of the ultrasonic sensor's usable range, in cm.
pub const MIN_VALID_DISTANCE_CM: f32 = 0.0;

/// Upper (exclusive) bound of the ultrasonic sensor's usable range, in cm.
pub const MAX_VALID_DISTANCE_CM: f32 = 400.0;

/// Status label for a reading within the detection threshold.
pub const STATUS_DETECTED: &str = "Object Detected";

/// Status label for a reading outside the detection threshold.
pub const STATUS_NORMAL: &str = "Normal";

/// Status label of a freshly constructed reading.
pub const STATUS_INITIALIZING: &str = "Initializing";

/// Status label of an unused history slot.
pub const STATUS_NO_DATA: &str = "No Data";

/// Status label returned for out-of-range history lookups.
pub const STATUS_INVALID_INDEX: &str = "Invalid Index";

/// Operating mode reported by the companion board.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(from = "i32", into = "i32")]
pub enum Mode {
    /// Plain distance measurement
    Normal,
    /// Companion is showing its history view
    History,
    /// Companion is showing its directional view
    Directional,
    /// Any code this node does not know about
    Unknown(i32),
}

impl From<i32> for Mode {
    fn from(code: i32) -> Self {
        match code {
            0 => Mode::Normal,
            1 => Mode::History,
            2 => Mode::Directional,
            other => Mode::Unknown(other),
        }
    }
}

impl From<Mode> for i32 {
    fn from(mode: Mode) -> Self {
        match mode {
            Mode::Normal => 0,
            Mode::History => 1,
            Mode::Directional => 2,
            Mode::Unknown(code) => code,
        }
    }
}

impl Default for Mode {
    fn default() -> Self {
        Mode::Normal
    }
}

/// One timestamped distance observation plus alert metadata.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SensorReading {
    /// Measured distance in centimeters
    pub distance: f32,
    /// Milliseconds since boot when the reading was taken
    pub timestamp: u64,
    /// Whether an object is considered present
    pub object_detected: bool,
    /// Alert flag asserted by the companion, independent of the threshold
    pub alert_active: bool,
    /// Companion operating mode
    pub mode: Mode,
    /// Recent values as seen by the companion (not this node's history)
    pub companion_history: [f32; COMPANION_HISTORY_LEN],
    /// Human-readable status label
    pub status: String,
}

impl SensorReading {
    /// Build a reading carrying only a distance and timestamp.
    pub fn new(distance: f32, timestamp: u64) -> Self {
        Self {
            distance,
            timestamp,
            ..Default::default()
        }
    }

    /// Set whether an object is detected.
    pub fn with_detection(mut self, object_detected: bool) -> Self {
        self.object_detected = object_detected;
        self
    }

    /// Set the status label.
    pub fn with_status(mut self, status: impl Into<String>) -> Self {
        self.status = status.into();
        self
    }

    /// Unused history slot.
    pub fn placeholder() -> Self {
        Self {
            distance: 0.0,
            status: STATUS_NO_DATA.to_string(),
            ..Default::default()
        }
    }

    /// Value handed out for history lookups outside the stored range.
    pub fn sentinel() -> Self {
        Self {
            status: STATUS_INVALID_INDEX.to_string(),
            ..Default::default()
        }
    }

    /// A reading is eligible for history iff its distance lies in the
    /// sensor's open range.
    pub fn is_valid(&self) -> bool {
        self.distance > MIN_VALID_DISTANCE_CM && self.distance < MAX_VALID_DISTANCE_CM
    }

    /// Whether this is the out-of-range lookup sentinel.
    pub fn is_sentinel(&self) -> bool {
        self.status == STATUS_INVALID_INDEX
    }
}

impl Default for SensorReading {
    fn default() -> Self {
        Self {
            distance: -1.0,
            timestamp: 0,
            object_detected: false,
            alert_active: false,
            mode: Mode::Normal,
            companion_history: [0.0; COMPANION_HISTORY_LEN],
            status: STATUS_INITIALIZING.to_string(),
        }
    }
}

/// Status label matching a detection decision.
pub fn detection_status(object_detected: bool) -> &'static str {
    if object_detected {
        STATUS_DETECTED
    } else {
        STATUS_NORMAL
    }
}
