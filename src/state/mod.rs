//! Reading history and node state.
//!
//! This module holds the bounded reading history with its derived analytics
//! and the [`SystemState`] facade that every collaborator queries.

pub mod history;
pub mod reading;
pub mod snapshot;
pub mod system;

// Re-export commonly used items
pub use history::{HistoryBuffer, DEFAULT_HISTORY_CAPACITY, MAX_HISTORY_CAPACITY};
pub use reading::{Mode, SensorReading};
pub use snapshot::{HistoryEntry, NodeSnapshot};
pub use system::{format_uptime, ConnectivityMode, SystemState};
