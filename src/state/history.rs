//! Fixed-capacity ring of valid readings with windowed analytics.

use super::reading::SensorReading;

/// Default number of readings retained.
pub const DEFAULT_HISTORY_CAPACITY: usize = 100;

/// Largest capacity a buffer will allocate.
pub const MAX_HISTORY_CAPACITY: usize = 10_000;

/// Circular store of the most recent valid readings.
///
/// Slots are allocated once and overwritten in place. The newest reading
/// always lives at `(write_index + capacity - 1) % capacity`; `count`
/// saturates at the capacity and only drops on [`HistoryBuffer::reset`].
#[derive(Debug, Clone)]
pub struct HistoryBuffer {
    slots: Vec<SensorReading>,
    write_index: usize,
    count: usize,
}

impl HistoryBuffer {
    /// Create a buffer pre-filled with "No Data" placeholders.
    ///
    /// The capacity is clamped to `1..=MAX_HISTORY_CAPACITY`; configuration
    /// validation rejects values outside that range before they get here.
    pub fn new(capacity: usize) -> Self {
        let capacity = capacity.clamp(1, MAX_HISTORY_CAPACITY);
        Self {
            slots: vec![SensorReading::placeholder(); capacity],
            write_index: 0,
            count: 0,
        }
    }

    /// Append a reading. Invalid readings are dropped without touching any slot.
    pub fn append(&mut self, reading: SensorReading) {
        if !reading.is_valid() {
            return;
        }
        let capacity = self.capacity();
        self.slots[self.write_index] = reading;
        self.write_index = (self.write_index + 1) % capacity;
        if self.count < capacity {
            self.count += 1;
        }
    }

    /// The reading `k` steps older than the newest (`k = 0` is the newest).
    ///
    /// Lookups outside `[0, count)` return [`SensorReading::sentinel`].
    pub fn get(&self, k: usize) -> SensorReading {
        self.slot(k).cloned().unwrap_or_else(SensorReading::sentinel)
    }

    fn slot(&self, k: usize) -> Option<&SensorReading> {
        if k >= self.count {
            return None;
        }
        let capacity = self.capacity();
        // k < count <= capacity, so the sum never underflows
        let index = (self.write_index + capacity - k - 1) % capacity;
        self.slots.get(index)
    }

    /// Number of valid readings held.
    pub fn count(&self) -> usize {
        self.count
    }

    /// Slots in the ring.
    pub fn capacity(&self) -> usize {
        self.slots.len()
    }

    /// True until the first valid reading is appended.
    pub fn is_empty(&self) -> bool {
        self.count == 0
    }

    /// Iterate stored readings newest first.
    pub fn iter(&self) -> impl Iterator<Item = &SensorReading> + '_ {
        (0..self.count).filter_map(move |k| self.slot(k))
    }

    /// Mean distance over the newest `sample_count` readings.
    ///
    /// When `sample_count` is not positive or exceeds the stored count this
    /// returns `current.distance` instead of averaging what is available.
    pub fn average_distance(&self, sample_count: i64, current: &SensorReading) -> f32 {
        if sample_count <= 0 || sample_count as u64 > self.count as u64 {
            return current.distance;
        }

        let (sum, valid) = self
            .iter()
            .take(sample_count as usize)
            .filter(|reading| reading.is_valid())
            .fold((0.0_f32, 0_usize), |(sum, n), reading| {
                (sum + reading.distance, n + 1)
            });

        if valid > 0 {
            sum / valid as f32
        } else {
            0.0
        }
    }

    /// Number of stored detections no older than `window_seconds` before `now_ms`.
    pub fn detection_count(&self, window_seconds: i64, now_ms: u64) -> usize {
        if window_seconds <= 0 {
            return 0;
        }
        let window_ms = (window_seconds as u64).saturating_mul(1000);
        let window_start = now_ms.saturating_sub(window_ms);

        self.iter()
            .filter(|reading| reading.object_detected && reading.timestamp >= window_start)
            .count()
    }

    /// Drop all readings and restore the placeholders.
    pub fn reset(&mut self) {
        self.slots.fill(SensorReading::placeholder());
        self.write_index = 0;
        self.count = 0;
    }

    /// Change the capacity, keeping the newest readings that still fit.
    pub fn resize(&mut self, new_capacity: usize) {
        let new_capacity = new_capacity.clamp(1, MAX_HISTORY_CAPACITY);
        if new_capacity == self.capacity() {
            return;
        }

        let keep: Vec<SensorReading> = self.iter().take(new_capacity).cloned().collect();
        let mut resized = HistoryBuffer::new(new_capacity);
        for reading in keep.into_iter().rev() {
            resized.append(reading);
        }
        *self = resized;
    }
}

impl Default for HistoryBuffer {
    fn default() -> Self {
        Self::new(DEFAULT_HISTORY_CAPACITY)
    }
}
