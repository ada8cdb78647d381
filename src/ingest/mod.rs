//! Companion-board ingestion: framing, classification and state updates.

pub mod apply;
pub mod line;
pub mod parser;
pub mod source;

pub use apply::{apply_event, ApplyOutcome, IngestStats};
pub use line::{LineBuffer, MAX_LINE_BYTES};
pub use parser::{classify, leading_float, CompanionFrame, IngestEvent, IngestionParser};
pub use source::{pump, spawn_reader, ByteSource};

use crate::state::SystemState;

/// Parser plus running statistics; the single writer of reading state.
#[derive(Debug, Default)]
pub struct Ingestor {
    parser: IngestionParser,
    stats: IngestStats,
}

impl Ingestor {
    pub fn new() -> Self {
        Self::default()
    }

    /// Feed raw bytes and apply every completed line to `state`.
    pub fn ingest(
        &mut self,
        bytes: &[u8],
        state: &mut SystemState,
        threshold_cm: f32,
    ) -> Vec<ApplyOutcome> {
        self.parser
            .feed(bytes)
            .into_iter()
            .map(|event| apply_event(state, event, threshold_cm, &mut self.stats))
            .collect()
    }

    /// Apply a final unterminated line, for inputs that have ended.
    pub fn finish(&mut self, state: &mut SystemState, threshold_cm: f32) -> Option<ApplyOutcome> {
        self.parser
            .finish()
            .map(|event| apply_event(state, event, threshold_cm, &mut self.stats))
    }

    /// Running counters since the ingestor was created.
    pub fn stats(&self) -> IngestStats {
        self.stats
    }

    pub fn pending_len(&self) -> usize {
        self.parser.pending_len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::ManualClock;
    use std::sync::Arc;

    #[test]
    fn test_ingest_mixed_stream() {
        let clock = ManualClock::new(2_000);
        let mut state = SystemState::new(10, Arc::new(clock.clone()));
        let mut ingestor = Ingestor::new();

        let outcomes = ingestor.ingest(
            b"{\"d\":55,\"h\":[1]}\nDISTANCE:30\nALERT:HIGH\nDebian GNU/Linux\nDIST",
            &mut state,
            40.0,
        );

        assert_eq!(outcomes.len(), 4);
        assert_eq!(outcomes[2], ApplyOutcome::AlertSignal("HIGH".to_string()));
        assert_eq!(state.history_count(), 2);
        assert!(state.current_reading().object_detected);
        assert_eq!(ingestor.pending_len(), 4);

        let stats = ingestor.stats();
        assert_eq!(stats.json_frames, 1);
        assert_eq!(stats.legacy_readings, 1);
        assert_eq!(stats.alerts, 1);
        assert_eq!(stats.console_noise, 1);
    }

    #[test]
    fn test_finish_applies_unterminated_frame() {
        let clock = ManualClock::new(2_000);
        let mut state = SystemState::new(10, Arc::new(clock.clone()));
        let mut ingestor = Ingestor::new();

        let outcomes = ingestor.ingest(b"DISTANCE:30\n{\"d\":20,\"a\":0}", &mut state, 40.0);
        assert_eq!(outcomes.len(), 1);
        assert_eq!(state.history_count(), 1);

        assert!(ingestor.finish(&mut state, 40.0).is_some());
        assert_eq!(state.history_count(), 2);
        assert_eq!(state.current_reading().distance, 20.0);
        assert_eq!(ingestor.stats().json_frames, 1);
        assert_eq!(ingestor.pending_len(), 0);

        assert!(ingestor.finish(&mut state, 40.0).is_none());
    }
}
