//! Collaborator surfaces: MQTT payloads and the chat bot.
//!
//! Neither surface owns a network client. Both shape their messages here and
//! push them into an [`Outbox`]; whatever bridges the node to a broker or a
//! bot API drains it. Commands coming back in become [`NodeCommand`]s for the
//! node loop.

pub mod chat;
pub mod mqtt;

pub use chat::{ChatContext, ChatNotifier, ChatReply};
pub use mqtt::{MqttCommand, MqttNotifier};

use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{debug, info};

/// Depth of the outbound message queue.
pub const OUTBOX_CAPACITY: usize = 64;

/// Side effects requested by a collaborator, executed by the node loop.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NodeCommand {
    /// Publish the current reading on the MQTT data topic
    PublishStatus,
    /// Flash the indicator and send a test alert through every notifier
    TestAlert,
    /// Clear readings and alert bookkeeping as if freshly booted
    Restart,
    /// Push a fresh snapshot to live clients
    Refresh,
}

/// A message shaped for a collaborator transport.
#[derive(Debug, Clone, PartialEq)]
pub enum OutboundMessage {
    Mqtt {
        topic: String,
        payload: String,
    },
    Chat {
        chat_id: String,
        text: String,
        parse_mode: Option<&'static str>,
    },
}

pub type Outbox = mpsc::Sender<OutboundMessage>;

/// Create the outbound queue.
pub fn outbox(capacity: usize) -> (Outbox, mpsc::Receiver<OutboundMessage>) {
    mpsc::channel(capacity.max(1))
}

/// Drain the outbox into the log until every sender is gone.
pub fn spawn_outbox_logger(mut rx: mpsc::Receiver<OutboundMessage>) -> JoinHandle<()> {
    tokio::spawn(async move {
        while let Some(message) = rx.recv().await {
            match message {
                OutboundMessage::Mqtt { topic, payload } => {
                    info!(topic = %topic, "MQTT publish: {}", payload);
                }
                OutboundMessage::Chat { chat_id, text, .. } => {
                    info!(chat_id = %chat_id, "Chat message: {}", text);
                }
            }
        }
        debug!("Outbox closed");
    })
}
