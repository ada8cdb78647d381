//! Node configuration.
//!
//! The configuration is a TOML document with one table per concern. Missing
//! tables or keys fall back to defaults. At runtime it lives behind a
//! [`ConfigHandle`]; the node loop re-reads it every tick, so edits made
//! through the web API apply without restarting ingestion.

use crate::error::{NodeError, Result};
use crate::state::{ConnectivityMode, MAX_HISTORY_CAPACITY};
use crate::web::WebConfig;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio::sync::RwLock;
use tracing::{info, warn};

/// Root configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
#[serde(default)]
pub struct NodeConfig {
    pub system: SystemConfig,
    pub peer: PeerConfig,
    pub network: NetworkConfig,
    pub mqtt: MqttConfig,
    pub telegram: TelegramConfig,
    pub web: WebConfig,
}

/// Detection and main-loop settings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SystemConfig {
    /// Readings at or below this distance count as a detection (cm)
    pub distance_threshold_cm: f32,
    /// Minimum time between dispatched alerts (ms)
    pub alert_cooldown_ms: u64,
    /// Number of valid readings retained
    pub history_capacity: usize,
    /// Delay between loop iterations (ms)
    pub loop_interval_ms: u64,
    /// Interval between health log lines (ms)
    pub health_interval_ms: u64,
    /// BCM pin of the status LED, if one is wired
    pub status_led_pin: Option<u8>,
    /// How long an alert flash keeps the LED lit (ms)
    pub alert_flash_ms: u64,
}

impl Default for SystemConfig {
    fn default() -> Self {
        Self {
            distance_threshold_cm: 40.0,
            alert_cooldown_ms: 30_000,
            history_capacity: crate::state::DEFAULT_HISTORY_CAPACITY,
            loop_interval_ms: 50,
            health_interval_ms: 30_000,
            status_led_pin: None,
            alert_flash_ms: 200,
        }
    }
}

/// Companion-board link settings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PeerConfig {
    /// Where frames come from: `stdin`, a device/file path, or `tcp://host:port`
    pub source: String,
    /// Peer is considered gone after this long without a heartbeat (ms)
    pub connection_timeout_ms: u64,
    /// Interval the companion is expected to send heartbeats at (ms)
    pub heartbeat_interval_ms: u64,
    /// Bounded queue depth between the byte reader and the parser
    pub channel_capacity: usize,
}

impl Default for PeerConfig {
    fn default() -> Self {
        Self {
            source: "stdin".to_string(),
            connection_timeout_ms: 10_000,
            heartbeat_interval_ms: 5_000,
            channel_capacity: 64,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
#[serde(default)]
pub struct NetworkConfig {
    pub mode: ConnectivityMode,
    pub signal_strength: i32,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct MqttConfig {
    pub enabled: bool,
    pub server: String,
    pub port: u16,
    /// Base topic; alerts go to `<topic>/alert`, commands arrive on `<topic>/command`
    pub topic: String,
    pub username: String,
    pub password: String,
}

impl Default for MqttConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            server: "localhost".to_string(),
            port: 1883,
            topic: "perimeter/node".to_string(),
            username: String::new(),
            password: String::new(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TelegramConfig {
    pub enabled: bool,
    pub bot_token: String,
    /// The only chat allowed to issue commands
    pub chat_id: String,
    pub check_interval_ms: u64,
}

impl Default for TelegramConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            bot_token: String::new(),
            chat_id: String::new(),
            check_interval_ms: 5_000,
        }
    }
}

impl NodeConfig {
    /// Load and validate configuration from a TOML file.
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        let content = std::fs::read_to_string(path.as_ref())?;
        let config: NodeConfig = toml::from_str(&content)?;
        config.validate()?;
        Ok(config)
    }

    /// Load from `path` when it exists, otherwise use defaults.
    pub fn load_or_default(path: Option<&Path>) -> Result<Self> {
        match path {
            Some(path) if path.exists() => {
                let config = Self::load(path)?;
                info!("Loaded configuration from {}", path.display());
                Ok(config)
            }
            Some(path) => {
                warn!(
                    "Configuration file {} not found, using defaults",
                    path.display()
                );
                Ok(Self::default())
            }
            None => Ok(Self::default()),
        }
    }

    /// Write the configuration as TOML.
    pub async fn save<P: AsRef<Path>>(&self, path: P) -> Result<()> {
        let content = self.to_toml()?;
        tokio::fs::write(path.as_ref(), content).await?;
        info!("Configuration saved to {}", path.as_ref().display());
        Ok(())
    }

    /// Render as pretty TOML.
    pub fn to_toml(&self) -> Result<String> {
        Ok(toml::to_string_pretty(self)?)
    }

    /// Reject values the node cannot run with.
    pub fn validate(&self) -> Result<()> {
        let threshold = self.system.distance_threshold_cm;
        if !(threshold > 0.0 && threshold < crate::state::reading::MAX_VALID_DISTANCE_CM) {
            return Err(NodeError::config_error(format!(
                "distance threshold must be within (0, 400) cm, got {}",
                threshold
            )));
        }
        let capacity = self.system.history_capacity;
        if !(1..=MAX_HISTORY_CAPACITY).contains(&capacity) {
            return Err(NodeError::config_error(format!(
                "history capacity must be within 1..={}, got {}",
                MAX_HISTORY_CAPACITY, capacity
            )));
        }
        if self.system.loop_interval_ms == 0 {
            return Err(NodeError::config_error("loop interval must be positive"));
        }
        if self.peer.connection_timeout_ms == 0 {
            return Err(NodeError::config_error(
                "peer connection timeout must be positive",
            ));
        }
        if self.peer.channel_capacity == 0 {
            return Err(NodeError::config_error("channel capacity must be at least 1"));
        }
        self.web.validate()?;
        if self.telegram.enabled && self.telegram.bot_token.is_empty() {
            warn!("Telegram enabled without a bot token; chat replies will not be delivered");
        }
        Ok(())
    }
}

/// Partial update accepted by `POST /api/config`.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct ConfigUpdate {
    /// Detection threshold in cm
    pub threshold: Option<f32>,
    /// Alert cooldown in seconds
    pub cooldown: Option<u64>,
    /// Accepts a JSON bool or the strings "true"/"false"
    pub telegram: Option<serde_json::Value>,
    pub history_capacity: Option<usize>,
}

impl ConfigUpdate {
    /// Apply onto a copy of `config`, returning the validated result.
    pub fn apply_to(&self, config: &NodeConfig) -> Result<NodeConfig> {
        let mut updated = config.clone();
        if let Some(threshold) = self.threshold {
            updated.system.distance_threshold_cm = threshold;
        }
        if let Some(cooldown) = self.cooldown {
            updated.system.alert_cooldown_ms = cooldown.saturating_mul(1000);
        }
        if let Some(telegram) = &self.telegram {
            updated.telegram.enabled = match telegram {
                serde_json::Value::Bool(enabled) => *enabled,
                serde_json::Value::String(text) => text == "true",
                other => {
                    return Err(NodeError::config_error(format!(
                        "telegram must be a bool, got {}",
                        other
                    )))
                }
            };
        }
        if let Some(capacity) = self.history_capacity {
            updated.system.history_capacity = capacity;
        }
        updated.validate()?;
        Ok(updated)
    }
}

/// Shared, hot-reloadable configuration with optional file persistence.
#[derive(Debug, Clone)]
pub struct ConfigHandle {
    inner: Arc<RwLock<NodeConfig>>,
    path: Option<PathBuf>,
}

impl ConfigHandle {
    /// Wrap `config`; updates persist to `path` when one is given.
    pub fn new(config: NodeConfig, path: Option<PathBuf>) -> Self {
        Self {
            inner: Arc::new(RwLock::new(config)),
            path,
        }
    }

    /// Clone of the current configuration.
    pub async fn current(&self) -> NodeConfig {
        self.inner.read().await.clone()
    }

    /// File backing this handle, if any.
    pub fn path(&self) -> Option<&Path> {
        self.path.as_deref()
    }

    /// Apply a partial update and persist it when a file backs this handle.
    ///
    /// The new values take effect first; the file is written after the lock
    /// is released.
    pub async fn update(&self, update: &ConfigUpdate) -> Result<NodeConfig> {
        let updated = {
            let mut guard = self.inner.write().await;
            let updated = update.apply_to(&guard)?;
            *guard = updated.clone();
            updated
        };
        if let Some(path) = &self.path {
            updated.save(path).await?;
        }
        info!(
            threshold = updated.system.distance_threshold_cm,
            cooldown_ms = updated.system.alert_cooldown_ms,
            telegram = updated.telegram.enabled,
            "Configuration updated"
        );
        Ok(updated)
    }

    /// Replace the whole configuration after validating it.
    pub async fn replace(&self, config: NodeConfig) -> Result<()> {
        config.validate()?;
        *self.inner.write().await = config;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_are_valid() {
        let config = NodeConfig::default();
        assert!(config.validate().is_ok());
        assert_eq!(config.system.distance_threshold_cm, 40.0);
        assert_eq!(config.peer.connection_timeout_ms, 10_000);
        assert_eq!(config.system.history_capacity, 100);
    }

    #[test]
    fn test_partial_toml_uses_defaults() {
        let config: NodeConfig = toml::from_str(
            r#"
            [system]
            distance_threshold_cm = 55.5

            [network]
            mode = "Station"
            signal_strength = -70
            "#,
        )
        .unwrap();
        assert_eq!(config.system.distance_threshold_cm, 55.5);
        assert_eq!(config.system.alert_cooldown_ms, 30_000);
        assert_eq!(config.network.mode, ConnectivityMode::Station);
        assert_eq!(config.mqtt.port, 1883);
    }

    #[test]
    fn test_toml_round_trip() {
        let mut config = NodeConfig::default();
        config.mqtt.enabled = true;
        config.system.status_led_pin = Some(17);
        let text = config.to_toml().unwrap();
        let parsed: NodeConfig = toml::from_str(&text).unwrap();
        assert_eq!(parsed, config);
    }

    #[test]
    fn test_validation_rejects_bad_values() {
        let mut config = NodeConfig::default();
        config.system.distance_threshold_cm = 0.0;
        assert!(config.validate().is_err());

        let mut config = NodeConfig::default();
        config.system.distance_threshold_cm = 400.0;
        assert!(config.validate().is_err());

        let mut config = NodeConfig::default();
        config.system.history_capacity = 0;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_update_rejects_oversized_history() {
        let update: ConfigUpdate =
            serde_json::from_str(r#"{"history_capacity": 9223372036854775807}"#).unwrap();
        assert!(update.apply_to(&NodeConfig::default()).is_err());

        let update = ConfigUpdate {
            history_capacity: Some(MAX_HISTORY_CAPACITY),
            ..Default::default()
        };
        let updated = update.apply_to(&NodeConfig::default()).unwrap();
        assert_eq!(updated.system.history_capacity, MAX_HISTORY_CAPACITY);
    }

    #[test]
    fn test_update_converts_units() {
        let update: ConfigUpdate =
            serde_json::from_str(r#"{"threshold": 25.0, "cooldown": 12, "telegram": "true"}"#)
                .unwrap();
        let updated = update.apply_to(&NodeConfig::default()).unwrap();
        assert_eq!(updated.system.distance_threshold_cm, 25.0);
        assert_eq!(updated.system.alert_cooldown_ms, 12_000);
        assert!(updated.telegram.enabled);
    }

    #[test]
    fn test_update_rejects_invalid_threshold() {
        let update = ConfigUpdate {
            threshold: Some(-1.0),
            ..Default::default()
        };
        assert!(update.apply_to(&NodeConfig::default()).is_err());
    }

    #[tokio::test]
    async fn test_handle_update_is_visible() {
        let handle = ConfigHandle::new(NodeConfig::default(), None);
        let update = ConfigUpdate {
            history_capacity: Some(20),
            ..Default::default()
        };
        handle.update(&update).await.unwrap();
        assert_eq!(handle.current().await.system.history_capacity, 20);
    }

    #[tokio::test]
    async fn test_handle_update_persists_to_file() {
        let path =
            std::env::temp_dir().join(format!("perimeter_node_{}.toml", uuid::Uuid::new_v4()));
        let handle = ConfigHandle::new(NodeConfig::default(), Some(path.clone()));
        let update = ConfigUpdate {
            threshold: Some(65.0),
            ..Default::default()
        };
        handle.update(&update).await.unwrap();

        let saved = NodeConfig::load(&path).unwrap();
        assert_eq!(saved.system.distance_threshold_cm, 65.0);
        std::fs::remove_file(&path).unwrap();
    }
}
