//! Dashboard server settings, the `[web]` table of the node configuration.

use crate::error::{NodeError, Result};
use serde::{Deserialize, Serialize};
use std::net::SocketAddr;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct WebConfig {
    /// Whether the dashboard is served at all
    pub enabled: bool,
    pub host: String,
    pub port: u16,
    /// Permissive CORS for dashboards hosted elsewhere
    pub enable_cors: bool,
    /// Directory with a custom dashboard (`index.html` plus assets)
    pub static_path: Option<String>,
    /// Live feed clients beyond this are refused
    pub max_websocket_connections: usize,
    /// Dashboard poll period, also the idle snapshot broadcast period (s)
    pub refresh_interval_secs: u32,
}

impl Default for WebConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            host: "0.0.0.0".to_string(),
            port: crate::DEFAULT_WEB_PORT,
            enable_cors: true,
            static_path: None,
            max_websocket_connections: 16,
            refresh_interval_secs: 2,
        }
    }
}

impl WebConfig {
    /// Apply command-line overrides for the listen address.
    pub fn with_bind(mut self, host: Option<String>, port: Option<u16>) -> Self {
        if let Some(host) = host {
            self.host = host;
        }
        if let Some(port) = port {
            self.port = port;
        }
        self
    }

    pub fn with_cors(mut self, enable_cors: bool) -> Self {
        self.enable_cors = enable_cors;
        self
    }

    pub fn with_static_path(mut self, path: Option<String>) -> Self {
        self.static_path = path;
        self
    }

    pub fn with_max_websocket_connections(mut self, max: usize) -> Self {
        self.max_websocket_connections = max;
        self
    }

    /// `host:port` as configured.
    pub fn bind_address(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }

    /// Parsed listen address.
    pub fn socket_addr(&self) -> Result<SocketAddr> {
        self.bind_address()
            .parse()
            .map_err(|e| NodeError::config_error(format!("Invalid bind address: {}", e)))
    }

    pub fn refresh_interval_ms(&self) -> u64 {
        u64::from(self.refresh_interval_secs) * 1000
    }

    /// Reject a zero refresh period, and an unparsable address when serving.
    pub fn validate(&self) -> Result<()> {
        if self.refresh_interval_secs == 0 {
            return Err(NodeError::config_error("web refresh interval must be positive"));
        }
        if self.enabled {
            self.socket_addr()?;
        }
        Ok(())
    }
}
