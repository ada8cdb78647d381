//! # Perimeter Node
//!
//! Host-side node of a two-board perimeter monitor. A companion board sends
//! distance frames over a serial link; this crate ingests them, keeps a
//! bounded history with derived analytics and republishes what it knows.
//!
//! ## Features
//!
//! - **Ingestion**: newline-framed JSON frames plus the legacy `DISTANCE:` /
//!   `STATUS:` / `HEARTBEAT:` line protocol, from stdin, a device or TCP
//! - **History**: fixed-capacity ring of valid readings with averages and
//!   windowed detection counts
//! - **Alerts**: cooldown-gated detection alerts fanned out to notifiers
//! - **Collaborators**: MQTT payload shaping and chat-bot command replies
//! - **Web dashboard**: JSON API and a WebSocket snapshot feed
//! - **Status LED**: GPIO indicator behind the `gpio` feature
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use perimeter_node::{
//!     collab, spawn_reader, start_web_server, ByteSource, ConfigHandle, MonotonicClock, Node,
//!     NodeConfig,
//! };
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let config = ConfigHandle::new(NodeConfig::default(), None);
//!     let (outbox, outbound) = collab::outbox(collab::OUTBOX_CAPACITY);
//!     collab::spawn_outbox_logger(outbound);
//!
//!     let node = Node::new(config.clone(), MonotonicClock::shared(), outbox).await;
//!     let (inbound, _reader) = spawn_reader(ByteSource::Stdin, 64);
//!
//!     let web = config.current().await.web;
//!     tokio::spawn(start_web_server(web, node.app_state(), std::future::pending()));
//!     node.run(inbound, std::future::pending()).await;
//!     Ok(())
//! }
//! ```

pub mod alerts;
pub mod clock;
pub mod collab;
pub mod config;
pub mod error;
pub mod indicator;
pub mod ingest;
pub mod memory;
pub mod node;
pub mod state;
pub mod web;

// Re-export public API
pub use alerts::{Alert, AlertDispatcher, LogNotifier, Notifier};
pub use clock::{Clock, ManualClock, MonotonicClock, SharedClock};
pub use config::{ConfigHandle, ConfigUpdate, NodeConfig};
pub use error::{NodeError, Result};
pub use ingest::{spawn_reader, ByteSource, IngestEvent, IngestionParser, Ingestor};
pub use node::{Node, SharedState, TickReport};
pub use state::{
    format_uptime, ConnectivityMode, HistoryBuffer, HistoryEntry, Mode, NodeSnapshot,
    SensorReading, SystemState,
};
pub use web::{start_web_server, AppState, WebConfig};

/// The default web server port
pub const DEFAULT_WEB_PORT: u16 = 8080;

/// Configuration file read when `--config` is not given
pub const DEFAULT_CONFIG_PATH: &str = "perimeter_node.toml";
