//! MQTT payload shaping and command-topic handling.
//!
//! Topics hang off one configured base topic:
//!
//! | Topic | Direction | Payload |
//! |---|---|---|
//! | `<base>` | out | reading: `distance`, `object_detected`, `status`, `timestamp`, `uptime`, `free_memory` |
//! | `<base>/alert` | out | `message`, `distance`, `timestamp`, `uptime` |
//! | `<base>/command` | in | `status`, `test_alert` or `restart` |

use super::{NodeCommand, Outbox, OutboundMessage};
use crate::alerts::{Alert, Notifier};
use crate::config::ConfigHandle;
use crate::error::{NodeError, Result};
use crate::state::SensorReading;
use async_trait::async_trait;
use serde_json::{json, Value};
use tracing::debug;

/// `<base>/alert`
pub fn alert_topic(base: &str) -> String {
    format!("{}/alert", base)
}

/// `<base>/command`, where inbound commands arrive.
pub fn command_topic(base: &str) -> String {
    format!("{}/command", base)
}

/// Reading payload published on the base topic.
pub fn data_payload(reading: &SensorReading, uptime_seconds: u64, free_memory: u64) -> Value {
    json!({
        "distance": reading.distance,
        "object_detected": reading.object_detected,
        "status": reading.status,
        "timestamp": reading.timestamp,
        "uptime": uptime_seconds,
        "free_memory": free_memory,
    })
}

/// Alert payload published on `<base>/alert`.
pub fn alert_payload(message: &str, distance: f32, timestamp: u64, uptime_seconds: u64) -> Value {
    json!({
        "message": message,
        "distance": distance,
        "timestamp": timestamp,
        "uptime": uptime_seconds,
    })
}

/// Commands accepted on `<base>/command`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MqttCommand {
    Status,
    TestAlert,
    Restart,
}

impl From<MqttCommand> for NodeCommand {
    fn from(command: MqttCommand) -> Self {
        match command {
            MqttCommand::Status => NodeCommand::PublishStatus,
            MqttCommand::TestAlert => NodeCommand::TestAlert,
            MqttCommand::Restart => NodeCommand::Restart,
        }
    }
}

/// Parse a command payload. Only `status` is matched case-insensitively.
pub fn parse_command(payload: &str) -> Option<MqttCommand> {
    if payload.eq_ignore_ascii_case("status") {
        Some(MqttCommand::Status)
    } else if payload == "test_alert" {
        Some(MqttCommand::TestAlert)
    } else if payload == "restart" {
        Some(MqttCommand::Restart)
    } else {
        None
    }
}

/// Route an inbound message; anything off the command topic is ignored.
pub fn handle_message(base: &str, topic: &str, payload: &str) -> Option<MqttCommand> {
    if topic != command_topic(base) {
        debug!(topic, "Ignoring MQTT message outside the command topic");
        return None;
    }
    let command = parse_command(payload);
    if command.is_none() {
        debug!(payload, "Unknown MQTT command");
    }
    command
}

/// Queue a reading payload for the base topic.
pub async fn publish_data(
    outbox: &Outbox,
    base: &str,
    reading: &SensorReading,
    uptime_seconds: u64,
    free_memory: u64,
) -> Result<()> {
    let payload = data_payload(reading, uptime_seconds, free_memory);
    outbox
        .send(OutboundMessage::Mqtt {
            topic: base.to_string(),
            payload: payload.to_string(),
        })
        .await
        .map_err(|_| NodeError::notify_error("MQTT outbox closed"))
}

/// Publishes alerts on `<base>/alert` while MQTT is enabled.
pub struct MqttNotifier {
    config: ConfigHandle,
    outbox: Outbox,
}

impl MqttNotifier {
    /// Publishes through `outbox` while MQTT is enabled in `config`.
    pub fn new(config: ConfigHandle, outbox: Outbox) -> Self {
        Self { config, outbox }
    }
}

#[async_trait]
impl Notifier for MqttNotifier {
    fn name(&self) -> &str {
        "mqtt"
    }

    async fn notify(&self, alert: &Alert) -> Result<()> {
        let config = self.config.current().await;
        if !config.mqtt.enabled {
            debug!("MQTT disabled, skipping alert");
            return Ok(());
        }
        let payload = alert_payload(
            &alert.message,
            alert.distance,
            alert.timestamp,
            alert.uptime_seconds,
        );
        self.outbox
            .send(OutboundMessage::Mqtt {
                topic: alert_topic(&config.mqtt.topic),
                payload: payload.to_string(),
            })
            .await
            .map_err(|_| NodeError::notify_error("MQTT outbox closed"))
    }
}
