//! Free-memory figures reported alongside readings.

use std::sync::Mutex;
use sysinfo::System;

/// Wraps a sysinfo handle that only refreshes memory figures.
pub struct MemoryGauge {
    system: Mutex<System>,
}

impl MemoryGauge {
    pub fn new() -> Self {
        let mut system = System::new();
        system.refresh_memory();
        Self {
            system: Mutex::new(system),
        }
    }

    /// Currently available memory in bytes, or 0 if the lock is poisoned.
    pub fn available_bytes(&self) -> u64 {
        match self.system.lock() {
            Ok(mut system) => {
                system.refresh_memory();
                system.available_memory()
            }
            Err(_) => 0,
        }
    }

    /// Installed memory in bytes.
    pub fn total_bytes(&self) -> u64 {
        self.system
            .lock()
            .map(|system| system.total_memory())
            .unwrap_or(0)
    }
}

impl Default for MemoryGauge {
    fn default() -> Self {
        Self::new()
    }
}
