//! Web server and API endpoints for the perimeter node dashboard.
//!
//! The dashboard, JSON API and WebSocket feed all read from the shared
//! [`SystemState`](crate::state::SystemState); the only writes they make go
//! through the configuration handle or the node's command queue.

pub mod config;
pub mod handlers;
pub mod router;
pub mod websocket;

// Re-export commonly used items
pub use config::WebConfig;
pub use router::create_app;

use crate::collab::NodeCommand;
use crate::config::ConfigHandle;
use crate::error::{NodeError, Result};
use crate::memory::MemoryGauge;
use crate::node::SharedState;
use crate::state::NodeSnapshot;
use std::future::Future;
use std::sync::atomic::AtomicUsize;
use std::sync::Arc;
use tokio::sync::{broadcast, mpsc};
use tracing::info;

/// Handles the web layer needs from the node.
#[derive(Clone)]
pub struct AppState {
    pub state: SharedState,
    pub config: ConfigHandle,
    /// Live snapshot feed; each WebSocket client subscribes
    pub snapshots: broadcast::Sender<NodeSnapshot>,
    /// Commands for the node loop
    pub commands: mpsc::Sender<NodeCommand>,
    pub memory: Arc<MemoryGauge>,
    /// Currently open WebSocket connections
    pub websocket_clients: Arc<AtomicUsize>,
}

/// Serve the dashboard until `shutdown` resolves.
pub async fn start_web_server<F>(config: WebConfig, state: AppState, shutdown: F) -> Result<()>
where
    F: Future<Output = ()> + Send + 'static,
{
    let app = create_app(&config, state);

    let addr = config.socket_addr()?;

    info!("Starting perimeter node web server on http://{}", addr);
    info!("Dashboard available at http://{}/", addr);
    info!("API endpoint: http://{}/api/status", addr);
    info!("WebSocket endpoint: ws://{}/ws", addr);

    let listener = tokio::net::TcpListener::bind(&addr)
        .await
        .map_err(|e| NodeError::web_server_error(format!("Failed to bind to address: {}", e)))?;

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown)
        .await
        .map_err(|e| NodeError::web_server_error(format!("Server error: {}", e)))?;

    Ok(())
}
