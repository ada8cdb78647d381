//! Classification of companion-board lines.
//!
//! Each complete line is classified in priority order:
//!
//! 1. JSON frame (`{"d":35.2,"m":0,"a":0,"h":[...]}`)
//! 2. console/boot noise from a companion whose serial console is still enabled
//! 3. legacy tagged commands (`DISTANCE:`, `ALERT:`, `STATUS:`, `SYSTEM:`,
//!    `HEARTBEAT:`, `ERROR:`)
//!
//! Anything else is ignored.

use super::line::LineBuffer;
use serde::Deserialize;

/// Substrings that only show up when the companion dropped to a login or
/// boot console instead of running the sender.
pub const CONSOLE_MARKERS: [&str; 3] = ["Debian", "login:", "Linux"];

const DISTANCE_PREFIX: &str = "DISTANCE:";
const ALERT_PREFIX: &str = "ALERT:";
const STATUS_PREFIX: &str = "STATUS:";
const SYSTEM_PREFIX: &str = "SYSTEM:";
const HEARTBEAT_PREFIX: &str = "HEARTBEAT:";
const ERROR_PREFIX: &str = "ERROR:";

/// Decoded JSON frame. Field names are fixed by the companion's sender.
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct CompanionFrame {
    /// Distance in cm
    #[serde(rename = "d", default)]
    pub distance: f32,
    /// Mode code
    #[serde(rename = "m", default)]
    pub mode: i32,
    /// Alert flag, `1` when asserted
    #[serde(rename = "a", default)]
    pub alert: i64,
    /// Up to five recent companion-side values
    #[serde(rename = "h", default)]
    pub history: Vec<f32>,
}

impl CompanionFrame {
    /// `a == 1`
    pub fn alert_asserted(&self) -> bool {
        self.alert == 1
    }
}

/// What a single line means to the node.
#[derive(Debug, Clone, PartialEq)]
pub enum IngestEvent {
    /// Full JSON reading; also counts as a heartbeat
    Frame(CompanionFrame),
    /// `DISTANCE:` reading, threshold-only detection
    Distance(f32),
    /// `ALERT:` side-effect signal
    Alert(String),
    /// `STATUS:` label override
    Status(String),
    /// `SYSTEM:` informational message
    System(String),
    /// `HEARTBEAT:` liveness signal
    Heartbeat,
    /// `ERROR:` reported by the companion
    PeerError(String),
    /// Companion is printing its login/boot console
    ConsoleNoise(String),
    /// JSON frame that failed to decode
    Malformed { line: String, reason: String },
}

/// Line-buffered parser over the inbound byte stream.
#[derive(Debug, Default)]
pub struct IngestionParser {
    lines: LineBuffer,
}

impl IngestionParser {
    pub fn new() -> Self {
        Self::default()
    }

    /// Feed raw bytes and return the events of every line they complete.
    pub fn feed(&mut self, bytes: &[u8]) -> Vec<IngestEvent> {
        self.lines
            .push(bytes)
            .iter()
            .filter_map(|line| classify(line))
            .collect()
    }

    /// Bytes of an unterminated line still held.
    pub fn pending_len(&self) -> usize {
        self.lines.pending_len()
    }

    /// Classify whatever is left after the input has ended.
    pub fn finish(&mut self) -> Option<IngestEvent> {
        self.lines.finish().and_then(|line| classify(&line))
    }
}

/// Classify one complete line. Empty and unrecognized lines yield `None`.
pub fn classify(line: &str) -> Option<IngestEvent> {
    if line.is_empty() {
        return None;
    }

    if line.starts_with('{') {
        return Some(match serde_json::from_str::<CompanionFrame>(line) {
            Ok(frame) => IngestEvent::Frame(frame),
            Err(e) => IngestEvent::Malformed {
                line: line.to_string(),
                reason: e.to_string(),
            },
        });
    }

    if CONSOLE_MARKERS.iter().any(|marker| line.contains(marker)) {
        return Some(IngestEvent::ConsoleNoise(line.to_string()));
    }

    if let Some(rest) = line.strip_prefix(DISTANCE_PREFIX) {
        Some(IngestEvent::Distance(leading_float(rest)))
    } else if let Some(rest) = line.strip_prefix(ALERT_PREFIX) {
        Some(IngestEvent::Alert(rest.to_string()))
    } else if let Some(rest) = line.strip_prefix(STATUS_PREFIX) {
        Some(IngestEvent::Status(rest.to_string()))
    } else if let Some(rest) = line.strip_prefix(SYSTEM_PREFIX) {
        Some(IngestEvent::System(rest.to_string()))
    } else if line.starts_with(HEARTBEAT_PREFIX) {
        Some(IngestEvent::Heartbeat)
    } else if let Some(rest) = line.strip_prefix(ERROR_PREFIX) {
        Some(IngestEvent::PeerError(rest.to_string()))
    } else {
        None
    }
}

/// Parse the longest numeric prefix of `text`, or `0.0` when there is none.
///
/// Reads numbers the way the companion's legacy firmware did, so `"12.5cm"`
/// reads as `12.5`, `"1.5e2"` as `150.0` and `"abc"` as `0.0`. An exponent
/// marker only counts when digits follow it.
pub fn leading_float(text: &str) -> f32 {
    let text = text.trim_start();
    let bytes = text.as_bytes();
    let mut end = 0;
    let mut seen_digit = false;
    let mut seen_dot = false;

    if matches!(bytes.first(), Some(b'+') | Some(b'-')) {
        end = 1;
    }
    while end < bytes.len() {
        match bytes[end] {
            b'0'..=b'9' => seen_digit = true,
            b'.' if !seen_dot => seen_dot = true,
            _ => break,
        }
        end += 1;
    }

    if !seen_digit {
        return 0.0;
    }

    if matches!(bytes.get(end), Some(b'e') | Some(b'E')) {
        let mut exp_end = end + 1;
        if matches!(bytes.get(exp_end), Some(b'+') | Some(b'-')) {
            exp_end += 1;
        }
        let digits_start = exp_end;
        while matches!(bytes.get(exp_end), Some(b'0'..=b'9')) {
            exp_end += 1;
        }
        if exp_end > digits_start {
            end = exp_end;
        }
    }

    text[..end].parse().unwrap_or(0.0)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_json_frame() {
        let event = classify(r#"{"d":35.2,"m":0,"a":0,"h":[1,2,3,4,5]}"#).unwrap();
        match event {
            IngestEvent::Frame(frame) => {
                assert_eq!(frame.distance, 35.2);
                assert_eq!(frame.mode, 0);
                assert!(!frame.alert_asserted());
                assert_eq!(frame.history, vec![1.0, 2.0, 3.0, 4.0, 5.0]);
            }
            other => panic!("unexpected event {:?}", other),
        }
    }

    #[test]
    fn test_json_missing_keys_default_to_zero() {
        match classify(r#"{"d":12}"#).unwrap() {
            IngestEvent::Frame(frame) => {
                assert_eq!(frame.distance, 12.0);
                assert_eq!(frame.alert, 0);
                assert!(frame.history.is_empty());
            }
            other => panic!("unexpected event {:?}", other),
        }
    }

    #[test]
    fn test_malformed_json() {
        assert!(matches!(
            classify(r#"{"d":"far"}"#),
            Some(IngestEvent::Malformed { .. })
        ));
        assert!(matches!(
            classify("{not json"),
            Some(IngestEvent::Malformed { .. })
        ));
    }

    #[test]
    fn test_console_noise() {
        for line in [
            "raspberrypi login:",
            "Debian GNU/Linux 12 raspberrypi ttyS0",
            "Linux raspberrypi 6.1.21-v8+",
        ] {
            assert!(matches!(classify(line), Some(IngestEvent::ConsoleNoise(_))));
        }
    }

    #[test]
    fn test_legacy_prefixes() {
        assert_eq!(classify("DISTANCE:12.5"), Some(IngestEvent::Distance(12.5)));
        assert_eq!(
            classify("ALERT:HIGH"),
            Some(IngestEvent::Alert("HIGH".to_string()))
        );
        assert_eq!(
            classify("STATUS:Calibrating"),
            Some(IngestEvent::Status("Calibrating".to_string()))
        );
        assert_eq!(
            classify("SYSTEM:boot ok"),
            Some(IngestEvent::System("boot ok".to_string()))
        );
        assert_eq!(classify("HEARTBEAT:"), Some(IngestEvent::Heartbeat));
        assert_eq!(classify("HEARTBEAT:42"), Some(IngestEvent::Heartbeat));
        assert_eq!(
            classify("ERROR:sensor timeout"),
            Some(IngestEvent::PeerError("sensor timeout".to_string()))
        );
    }

    #[test]
    fn test_unknown_and_empty_lines_are_ignored() {
        assert_eq!(classify(""), None);
        assert_eq!(classify("hello"), None);
        assert_eq!(classify("distance:12"), None);
    }

    #[test]
    fn test_leading_float() {
        assert_eq!(leading_float("12.5"), 12.5);
        assert_eq!(leading_float(" 7cm"), 7.0);
        assert_eq!(leading_float("-3.25x"), -3.25);
        assert_eq!(leading_float("5."), 5.0);
        assert_eq!(leading_float("abc"), 0.0);
        assert_eq!(leading_float(""), 0.0);
        assert_eq!(leading_float("-"), 0.0);
    }

    #[test]
    fn test_leading_float_reads_exponents() {
        assert_eq!(leading_float("1.5e2"), 150.0);
        assert_eq!(leading_float("2E1cm"), 20.0);
        assert_eq!(leading_float("3.5e-1"), 0.35);
        assert_eq!(leading_float("4e+1x"), 40.0);
        assert_eq!(leading_float("12e"), 12.0);
        assert_eq!(leading_float("12e+cm"), 12.0);
        assert_eq!(classify("DISTANCE:1.5e2"), Some(IngestEvent::Distance(150.0)));
    }

    #[test]
    fn test_parser_feeds_across_chunks() {
        let mut parser = IngestionParser::new();
        assert!(parser.feed(b"HEART").is_empty());
        let events = parser.feed(b"BEAT:\n\nnoise\nDISTANCE:80\n");
        assert_eq!(
            events,
            vec![IngestEvent::Heartbeat, IngestEvent::Distance(80.0)]
        );
        assert_eq!(parser.pending_len(), 0);
    }
}
