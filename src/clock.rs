//! Monotonic millisecond clock.
//!
//! Every timestamp in the node is milliseconds since boot, never wall-clock
//! time. The clock sits behind a trait so tests can drive time by hand.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Instant;

/// Source of monotonic milliseconds since the node started.
pub trait Clock: Send + Sync {
    /// Milliseconds elapsed since boot.
    fn now_ms(&self) -> u64;
}

/// Shared handle to a clock.
pub type SharedClock = Arc<dyn Clock>;

/// Clock backed by [`Instant`], anchored at construction.
#[derive(Debug, Clone)]
pub struct MonotonicClock {
    boot: Instant,
}

impl MonotonicClock {
    pub fn new() -> Self {
        Self {
            boot: Instant::now(),
        }
    }

    /// Convenience constructor returning a [`SharedClock`].
    pub fn shared() -> SharedClock {
        Arc::new(Self::new())
    }
}

impl Default for MonotonicClock {
    fn default() -> Self {
        Self::new()
    }
}

impl Clock for MonotonicClock {
    fn now_ms(&self) -> u64 {
        self.boot.elapsed().as_millis() as u64
    }
}

/// Hand-driven clock for tests and replays.
///
/// Clones share the same underlying counter.
#[derive(Debug, Clone, Default)]
pub struct ManualClock {
    now: Arc<AtomicU64>,
}

impl ManualClock {
    /// Clock reading `start_ms` until moved.
    pub fn new(start_ms: u64) -> Self {
        Self {
            now: Arc::new(AtomicU64::new(start_ms)),
        }
    }

    pub fn set(&self, ms: u64) {
        self.now.store(ms, Ordering::SeqCst);
    }

    /// Move forward by `ms`.
    pub fn advance(&self, ms: u64) {
        self.now.fetch_add(ms, Ordering::SeqCst);
    }
}

impl Clock for ManualClock {
    fn now_ms(&self) -> u64 {
        self.now.load(Ordering::SeqCst)
    }
}
