//! Newline framing over a raw byte stream.

use tracing::warn;

/// Longest line kept while waiting for a terminator.
pub const MAX_LINE_BYTES: usize = 4096;

/// Accumulates bytes until `\n` and yields complete lines.
///
/// The terminator (and a preceding `\r`) is discarded. Bytes after the last
/// terminator stay buffered until the next call.
#[derive(Debug, Default)]
pub struct LineBuffer {
    pending: Vec<u8>,
    overflowed: bool,
}

impl LineBuffer {
    pub fn new() -> Self {
        Self::default()
    }

    /// Feed bytes, returning every line completed by them.
    pub fn push(&mut self, bytes: &[u8]) -> Vec<String> {
        let mut lines = Vec::new();

        for &byte in bytes {
            if byte == b'\n' {
                if self.overflowed {
                    // tail of an oversized line; drop it and resync
                    self.overflowed = false;
                    self.pending.clear();
                    continue;
                }
                if self.pending.last() == Some(&b'\r') {
                    self.pending.pop();
                }
                lines.push(String::from_utf8_lossy(&self.pending).into_owned());
                self.pending.clear();
            } else if !self.overflowed {
                if self.pending.len() >= MAX_LINE_BYTES {
                    warn!(
                        limit = MAX_LINE_BYTES,
                        "Inbound line exceeds limit without a terminator, discarding"
                    );
                    self.pending.clear();
                    self.overflowed = true;
                } else {
                    self.pending.push(byte);
                }
            }
        }

        lines
    }

    /// Bytes waiting for a terminator.
    pub fn pending_len(&self) -> usize {
        self.pending.len()
    }

    /// Take the unterminated tail as a final line once the stream has ended.
    ///
    /// Returns `None` when nothing is pending or the tail was already
    /// discarded as oversized.
    pub fn finish(&mut self) -> Option<String> {
        if self.overflowed {
            self.overflowed = false;
            self.pending.clear();
            return None;
        }
        if self.pending.is_empty() {
            return None;
        }
        if self.pending.last() == Some(&b'\r') {
            self.pending.pop();
        }
        let line = String::from_utf8_lossy(&self.pending).into_owned();
        self.pending.clear();
        Some(line)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_splits_on_newline() {
        let mut buffer = LineBuffer::new();
        let lines = buffer.push(b"HEARTBEAT:\nSTATUS:ok\n");
        assert_eq!(lines, vec!["HEARTBEAT:", "STATUS:ok"]);
        assert_eq!(buffer.pending_len(), 0);
    }

    #[test]
    fn test_partial_line_survives_calls() {
        let mut buffer = LineBuffer::new();
        assert!(buffer.push(b"DISTANCE:1").is_empty());
        assert_eq!(buffer.pending_len(), 10);
        assert_eq!(buffer.push(b"2.5\r\n"), vec!["DISTANCE:12.5"]);
    }

    #[test]
    fn test_empty_lines_are_yielded_empty() {
        let mut buffer = LineBuffer::new();
        assert_eq!(buffer.push(b"\n\n"), vec!["", ""]);
    }

    #[test]
    fn test_oversized_line_is_dropped() {
        let mut buffer = LineBuffer::new();
        let long = vec![b'x'; MAX_LINE_BYTES + 10];
        assert!(buffer.push(&long).is_empty());
        assert_eq!(buffer.push(b"tail\nHEARTBEAT:\n"), vec!["HEARTBEAT:"]);
    }

    #[test]
    fn test_finish_flushes_tail() {
        let mut buffer = LineBuffer::new();
        assert_eq!(buffer.push(b"HEARTBEAT:\nDISTANCE:12\r"), vec!["HEARTBEAT:"]);
        assert_eq!(buffer.finish(), Some("DISTANCE:12".to_string()));
        assert_eq!(buffer.pending_len(), 0);
        assert_eq!(buffer.finish(), None);
    }

    #[test]
    fn test_finish_skips_oversized_tail() {
        let mut buffer = LineBuffer::new();
        let long = vec![b'x'; MAX_LINE_BYTES + 1];
        assert!(buffer.push(&long).is_empty());
        assert_eq!(buffer.finish(), None);
        assert_eq!(buffer.push(b"STATUS:ok\n"), vec!["STATUS:ok"]);
    }

    #[test]
    fn test_invalid_utf8_is_lossy() {
        let mut buffer = LineBuffer::new();
        let lines = buffer.push(b"STATUS:\xffok\n");
        assert_eq!(lines.len(), 1);
        assert!(lines[0].starts_with("STATUS:"));
    }
}
