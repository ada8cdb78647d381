//! Alert evaluation and notifier fan-out.
//!
//! The node loop decides under the state lock whether an alert is due and
//! records it; delivery happens afterwards, outside the lock, through every
//! registered [`Notifier`].

use crate::error::Result;
use crate::state::SystemState;
use async_trait::async_trait;
use serde::Serialize;
use std::sync::Arc;
use tracing::{info, warn};

/// A detection worth telling someone about.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Alert {
    /// Human-readable summary, e.g. `"Object detected at 32.5cm"`
    pub message: String,
    pub distance: f32,
    /// Milliseconds since boot when the alert was raised
    pub timestamp: u64,
    pub uptime_seconds: u64,
    pub uptime_formatted: String,
    pub threshold: f32,
    /// Raised by a test command rather than a detection
    pub test: bool,
}

impl Alert {
    /// Alert describing the state's current detection.
    pub fn from_detection(state: &SystemState, threshold: f32) -> Self {
        let distance = state.current_reading().distance;
        Self {
            message: detection_message(distance),
            ..Self::with_message(state, "", threshold)
        }
    }

    /// Alert carrying an arbitrary message, stamped with the current state.
    pub fn with_message(state: &SystemState, message: impl Into<String>, threshold: f32) -> Self {
        Self {
            message: message.into(),
            distance: state.current_reading().distance,
            timestamp: state.now_ms(),
            uptime_seconds: state.uptime_seconds,
            uptime_formatted: state.formatted_uptime(),
            threshold,
            test: false,
        }
    }

    /// Mark as a test alert.
    pub fn into_test(mut self) -> Self {
        self.test = true;
        self
    }
}

/// Human text for a detection at `distance` cm.
pub fn detection_message(distance: f32) -> String {
    format!("Object detected at {:.1}cm", distance)
}

/// Something that delivers alerts to the outside world.
#[async_trait]
pub trait Notifier: Send + Sync {
    fn name(&self) -> &str;

    async fn notify(&self, alert: &Alert) -> Result<()>;
}

/// Writes alerts to the log.
#[derive(Debug, Default)]
pub struct LogNotifier;

#[async_trait]
impl Notifier for LogNotifier {
    fn name(&self) -> &str {
        "log"
    }

    async fn notify(&self, alert: &Alert) -> Result<()> {
        warn!(
            distance = alert.distance,
            threshold = alert.threshold,
            uptime = %alert.uptime_formatted,
            test = alert.test,
            "Alert: {}",
            alert.message
        );
        Ok(())
    }
}

/// Cooldown-gated alert evaluation plus delivery to all notifiers.
#[derive(Clone, Default)]
pub struct AlertDispatcher {
    notifiers: Vec<Arc<dyn Notifier>>,
}

impl AlertDispatcher {
    pub fn new() -> Self {
        Self::default()
    }

    /// Builder form of [`AlertDispatcher::register`].
    pub fn with_notifier(mut self, notifier: Arc<dyn Notifier>) -> Self {
        self.notifiers.push(notifier);
        self
    }

    /// Add a notifier; delivery follows registration order.
    pub fn register(&mut self, notifier: Arc<dyn Notifier>) {
        self.notifiers.push(notifier);
    }

    pub fn notifier_names(&self) -> Vec<String> {
        self.notifiers.iter().map(|n| n.name().to_string()).collect()
    }

    /// Raise an alert if the current detection is outside the cooldown.
    ///
    /// Records the alert time on `state` when one is raised.
    pub fn evaluate(
        &self,
        state: &mut SystemState,
        threshold: f32,
        cooldown_ms: u64,
    ) -> Option<Alert> {
        if !state.alert_due(cooldown_ms) {
            return None;
        }
        let alert = Alert::from_detection(state, threshold);
        state.mark_alert_sent(alert.timestamp);
        Some(alert)
    }

    /// Deliver to every notifier, returning how many succeeded.
    ///
    /// A failing notifier is logged and never stops the others.
    pub async fn dispatch(&self, alert: &Alert) -> usize {
        let mut delivered = 0;
        for notifier in &self.notifiers {
            match notifier.notify(alert).await {
                Ok(()) => delivered += 1,
                Err(e) => warn!(notifier = notifier.name(), "Failed to deliver alert: {}", e),
            }
        }
        info!(
            delivered,
            total = self.notifiers.len(),
            "Alert sent: {}",
            alert.message
        );
        delivered
    }
}
