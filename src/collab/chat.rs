//! Chat-bot command handling.
//!
//! Only the configured chat may issue commands. Replies use Markdown except
//! for the unauthorized and restart notices.

use super::{NodeCommand, Outbox, OutboundMessage};
use crate::alerts::{Alert, Notifier};
use crate::config::{ConfigHandle, NodeConfig};
use crate::error::{NodeError, Result};
use crate::state::{HistoryEntry, SensorReading, SystemState};
use async_trait::async_trait;
use tracing::{debug, info, warn};

/// Entries listed by `/history`.
pub const CHAT_HISTORY_LIMIT: usize = 5;

pub const MARKDOWN: &str = "Markdown";

/// Everything a reply may mention, captured under one state read.
#[derive(Debug, Clone)]
pub struct ChatContext {
    pub current: SensorReading,
    pub recent: Vec<HistoryEntry>,
    pub history_count: usize,
    pub uptime_seconds: u64,
    pub uptime_formatted: String,
    pub connectivity: String,
    pub free_memory: u64,
    pub config: NodeConfig,
}

impl ChatContext {
    /// Copy what the chat replies need out of the live state.
    pub fn capture(state: &SystemState, config: &NodeConfig, free_memory: u64) -> Self {
        Self {
            current: state.current_reading().clone(),
            recent: state
                .history_iter()
                .take(CHAT_HISTORY_LIMIT)
                .map(HistoryEntry::from)
                .collect(),
            history_count: state.history_count(),
            uptime_seconds: state.uptime_seconds,
            uptime_formatted: state.formatted_uptime(),
            connectivity: state.connectivity_mode.to_string(),
            free_memory,
            config: config.clone(),
        }
    }
}

/// A reply plus any side effect the command asks for.
#[derive(Debug, Clone, PartialEq)]
pub struct ChatReply {
    pub chat_id: String,
    pub text: String,
    pub parse_mode: Option<&'static str>,
    pub command: Option<NodeCommand>,
}

impl ChatReply {
    fn markdown(chat_id: &str, text: String) -> Self {
        Self {
            chat_id: chat_id.to_string(),
            text,
            parse_mode: Some(MARKDOWN),
            command: None,
        }
    }

    fn plain(chat_id: &str, text: String) -> Self {
        Self {
            parse_mode: None,
            ..Self::markdown(chat_id, text)
        }
    }

    fn with_command(mut self, command: NodeCommand) -> Self {
        self.command = Some(command);
        self
    }
}

/// Answer one inbound chat message.
pub fn handle_message(chat_id: &str, text: &str, ctx: &ChatContext) -> ChatReply {
    let command = text.trim().to_lowercase();
    info!(chat_id, command = %command, "Chat command received");

    if chat_id != ctx.config.telegram.chat_id {
        warn!(chat_id, "Unauthorized chat id");
        return ChatReply::plain(
            chat_id,
            format!("Unauthorized access. Your chat ID: {}", chat_id),
        );
    }

    match command.as_str() {
        "/start" | "/help" => ChatReply::markdown(chat_id, help_message(ctx)),
        "/status" => ChatReply::markdown(chat_id, status_message(ctx)),
        "/history" => ChatReply::markdown(chat_id, history_message(ctx)),
        "/config" => ChatReply::markdown(chat_id, config_message(ctx)),
        "/test" => ChatReply::markdown(
            chat_id,
            format!(
                "*Test Alert Sent!*\n\nThis is a test notification from your perimeter node.\nSystem time: {}s",
                ctx.uptime_seconds
            ),
        )
        .with_command(NodeCommand::TestAlert),
        "/restart" => ChatReply::plain(
            chat_id,
            "*System Restarting...*\n\nReadings and alert state will be cleared.".to_string(),
        )
        .with_command(NodeCommand::Restart),
        _ => ChatReply::markdown(
            chat_id,
            "Unknown command. Send `/help` for available commands.".to_string(),
        ),
    }
}

fn help_message(ctx: &ChatContext) -> String {
    format!(
        "*Perimeter Node Bot Commands:*\n\n\
         `/status` - Current system status\n\
         `/history` - Recent distance readings\n\
         `/config` - System configuration\n\
         `/test` - Send test alert\n\
         `/restart` - Restart system\n\
         `/help` - This help message\n\n\
         _Distance Threshold: {:.1}cm_",
        ctx.config.system.distance_threshold_cm
    )
}

/// Reply to `/status`.
pub fn status_message(ctx: &ChatContext) -> String {
    let current = &ctx.current;
    let mut message = String::from("*Perimeter Node Status*\n\n");
    message.push_str(&format!("*Distance:* {:.1} cm\n", current.distance));
    message.push_str(&format!(
        "*Alert:* {}\n",
        if current.object_detected { "ACTIVE" } else { "Clear" }
    ));
    message.push_str(&format!("*Status:* {}\n", current.status));
    message.push_str(&format!("*Uptime:* {}\n", ctx.uptime_formatted));
    message.push_str(&format!("*Network:* {}\n", ctx.connectivity));
    message.push_str(&format!("*Memory:* {} bytes\n", ctx.free_memory));
    message.push_str(&format!("*Data Points:* {}\n\n", ctx.history_count));

    if current.object_detected {
        message.push_str(&format!(
            "*Object detected within {:.1}cm!*",
            ctx.config.system.distance_threshold_cm
        ));
    } else {
        message.push_str("*System monitoring normally*");
    }
    message
}

fn history_message(ctx: &ChatContext) -> String {
    let mut message = String::from("*Recent Distance History:*\n\n");
    if ctx.recent.is_empty() {
        message.push_str("No data available yet");
        return message;
    }
    for entry in &ctx.recent {
        message.push_str(&format!(
            "• {:.1}cm - {}\n",
            entry.distance,
            if entry.object_detected { "Alert" } else { "Normal" }
        ));
    }
    message
}

fn config_message(ctx: &ChatContext) -> String {
    let config = &ctx.config;
    format!(
        "*System Configuration:*\n\n\
         Threshold: {:.1}cm\n\
         Cooldown: {}s\n\
         Refresh: {}s\n\
         Telegram: {}\n\
         Network Mode: {}\n\
         Uptime: {}",
        config.system.distance_threshold_cm,
        config.system.alert_cooldown_ms / 1000,
        config.web.refresh_interval_secs,
        if config.telegram.enabled { "Enabled" } else { "Disabled" },
        ctx.connectivity,
        ctx.uptime_formatted
    )
}

/// Alert text sent to the authorized chat.
pub fn alert_message(alert: &Alert) -> String {
    format!(
        "*PERIMETER ALERT*\n\n{}\n\nCurrent Distance: {:.1}cm\nTime: {}\nThreshold: {:.1}cm",
        alert.message, alert.distance, alert.uptime_formatted, alert.threshold
    )
}

/// Sends alerts to the authorized chat while the bot is enabled.
pub struct ChatNotifier {
    config: ConfigHandle,
    outbox: Outbox,
}

impl ChatNotifier {
    /// Sends through `outbox` while the bot is enabled in `config`.
    pub fn new(config: ConfigHandle, outbox: Outbox) -> Self {
        Self { config, outbox }
    }
}

#[async_trait]
impl Notifier for ChatNotifier {
    fn name(&self) -> &str {
        "chat"
    }

    async fn notify(&self, alert: &Alert) -> Result<()> {
        let config = self.config.current().await;
        if !config.telegram.enabled {
            debug!("Chat bot disabled, skipping alert");
            return Ok(());
        }
        if config.telegram.chat_id.is_empty() {
            return Err(NodeError::notify_error("no chat id configured"));
        }
        self.outbox
            .send(OutboundMessage::Chat {
                chat_id: config.telegram.chat_id.clone(),
                text: alert_message(alert),
                parse_mode: Some(MARKDOWN),
            })
            .await
            .map_err(|_| NodeError::notify_error("chat outbox closed"))
    }
}
