//! Error handling for the perimeter node crate.

/// A specialized `Result` type for perimeter node operations.
pub type Result<T> = std::result::Result<T, NodeError>;

/// The main error type for perimeter node operations.
///
/// Nothing in the ingestion core returns this type: bad frames are logged and
/// dropped. It covers the surfaces around the core (configuration files, the
/// byte source, the web server and notifiers).
#[derive(Debug, thiserror::Error)]
pub enum NodeError {
    /// I/O operation failed
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON encoding or decoding failed
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// Configuration file could not be parsed
    #[error("Failed to parse configuration: {0}")]
    Toml(#[from] toml::de::Error),

    /// Configuration could not be written back out
    #[error("Failed to serialize configuration: {0}")]
    TomlSerialize(#[from] toml::ser::Error),

    /// Configuration value rejected
    #[error("Configuration error: {0}")]
    Config(String),

    /// Byte source could not be opened or read
    #[error("Source error: {0}")]
    Source(String),

    /// Web server error
    #[error("Web server error: {0}")]
    WebServer(String),

    /// An alert sink failed to deliver
    #[error("Notification error: {0}")]
    Notify(String),

    /// GPIO operation failed (only available with gpio feature)
    #[cfg(feature = "gpio")]
    #[error("GPIO error: {0}")]
    Gpio(String),
}

impl NodeError {
    /// Create a new configuration error
    pub fn config_error(msg: impl Into<String>) -> Self {
        Self::Config(msg.into())
    }

    /// Create a new source error
    pub fn source_error(msg: impl Into<String>) -> Self {
        Self::Source(msg.into())
    }

    /// Create a new web server error
    pub fn web_server_error(msg: impl Into<String>) -> Self {
        Self::WebServer(msg.into())
    }

    /// Create a new notification error
    pub fn notify_error(msg: impl Into<String>) -> Self {
        Self::Notify(msg.into())
    }

    /// Create a new GPIO error
    #[cfg(feature = "gpio")]
    pub fn gpio_error(msg: impl Into<String>) -> Self {
        Self::Gpio(msg.into())
    }
}
