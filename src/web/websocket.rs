//! WebSocket handler for the live snapshot feed.

use super::AppState;
use axum::extract::ws::{Message, WebSocket};
use axum::{
    extract::{State, WebSocketUpgrade},
    http::StatusCode,
    response::{IntoResponse, Response},
};
use futures_util::{SinkExt, StreamExt};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use tokio_stream::wrappers::{errors::BroadcastStreamRecvError, BroadcastStream};
use tracing::{debug, error, info, warn};

/// One occupied place in the live feed. The place frees up when this drops,
/// including when the upgrade callback is discarded without running.
#[derive(Debug)]
pub struct ConnectionSlot {
    clients: Arc<AtomicUsize>,
}

impl ConnectionSlot {
    /// Take a place if fewer than `limit` are held.
    pub fn try_acquire(clients: &Arc<AtomicUsize>, limit: usize) -> Option<Self> {
        let previous = clients.fetch_add(1, Ordering::SeqCst);
        if previous >= limit {
            clients.fetch_sub(1, Ordering::SeqCst);
            return None;
        }
        Some(Self {
            clients: Arc::clone(clients),
        })
    }
}

impl Drop for ConnectionSlot {
    fn drop(&mut self) {
        self.clients.fetch_sub(1, Ordering::SeqCst);
    }
}

/// WebSocket upgrade handler. Refuses the upgrade once the client limit is reached.
pub async fn websocket_handler(ws: WebSocketUpgrade, State(app): State<AppState>) -> Response {
    let limit = app.config.current().await.web.max_websocket_connections;
    let Some(slot) = ConnectionSlot::try_acquire(&app.websocket_clients, limit) else {
        warn!(limit, "Refusing WebSocket client, connection limit reached");
        return (StatusCode::SERVICE_UNAVAILABLE, "Too many WebSocket connections").into_response();
    };

    ws.on_failed_upgrade(|e| warn!("WebSocket upgrade failed: {}", e))
        .on_upgrade(move |socket| handle_websocket(socket, app, slot))
}

/// Push snapshots to one client until either side goes away.
async fn handle_websocket(socket: WebSocket, app: AppState, _slot: ConnectionSlot) {
    let client_id = uuid::Uuid::new_v4().to_string();
    info!("WebSocket client connected: {}", client_id);

    let (mut sender, mut receiver) = socket.split();
    let mut updates = BroadcastStream::new(app.snapshots.subscribe());

    // Send the current snapshot right away so the client need not wait a tick
    let initial = {
        let config = app.config.current().await;
        let free_memory = app.memory.available_bytes();
        let state = app.state.read().await;
        state.snapshot(&config, free_memory)
    };
    if let Ok(json_string) = serde_json::to_string(&initial) {
        if sender.send(Message::Text(json_string)).await.is_err() {
            return;
        }
    }

    let client_id_recv = client_id.clone();
    let mut recv_task = tokio::spawn(async move {
        while let Some(msg) = receiver.next().await {
            match msg {
                Ok(Message::Close(_)) => {
                    info!("WebSocket client {} disconnected", client_id_recv);
                    break;
                }
                Ok(Message::Text(text)) => {
                    debug!("Received message from {}: {}", client_id_recv, text);
                }
                Ok(_) => {}
                Err(e) => {
                    warn!("WebSocket error for client {}: {}", client_id_recv, e);
                    break;
                }
            }
        }
    });

    let client_id_send = client_id.clone();
    let mut send_task = tokio::spawn(async move {
        while let Some(update) = updates.next().await {
            let snapshot = match update {
                Ok(snapshot) => snapshot,
                Err(BroadcastStreamRecvError::Lagged(skipped)) => {
                    debug!("Client {} lagged, skipped {} snapshots", client_id_send, skipped);
                    continue;
                }
            };
            match serde_json::to_string(&snapshot) {
                Ok(json_string) => {
                    if let Err(e) = sender.send(Message::Text(json_string)).await {
                        warn!("Failed to send message to client {}: {}", client_id_send, e);
                        break;
                    }
                }
                Err(e) => {
                    error!(
                        "Failed to serialize snapshot for client {}: {}",
                        client_id_send, e
                    );
                }
            }
        }
    });

    tokio::select! {
        _ = &mut recv_task => {
            debug!("Receive task completed for client {}", client_id);
            send_task.abort();
        }
        _ = &mut send_task => {
            debug!("Send task completed for client {}", client_id);
            recv_task.abort();
        }
    }

    info!("WebSocket client disconnected: {}", client_id);
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_slots_respect_limit() {
        let clients = Arc::new(AtomicUsize::new(0));
        let first = ConnectionSlot::try_acquire(&clients, 2);
        let second = ConnectionSlot::try_acquire(&clients, 2);
        assert!(first.is_some());
        assert!(second.is_some());
        assert!(ConnectionSlot::try_acquire(&clients, 2).is_none());
        assert_eq!(clients.load(Ordering::SeqCst), 2);

        drop(first);
        assert_eq!(clients.load(Ordering::SeqCst), 1);
        assert!(ConnectionSlot::try_acquire(&clients, 2).is_some());
        assert_eq!(clients.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_discarded_upgrade_frees_slot() {
        let clients = Arc::new(AtomicUsize::new(0));
        let slot = ConnectionSlot::try_acquire(&clients, 1).unwrap();
        // An upgrade that never completes drops its callback and the slot with it
        let callback = move || drop(slot);
        assert_eq!(clients.load(Ordering::SeqCst), 1);
        std::mem::drop(callback);
        assert_eq!(clients.load(Ordering::SeqCst), 0);
        assert!(ConnectionSlot::try_acquire(&clients, 1).is_some());
    }

    #[test]
    fn test_zero_limit_refuses_everyone() {
        let clients = Arc::new(AtomicUsize::new(0));
        assert!(ConnectionSlot::try_acquire(&clients, 0).is_none());
        assert_eq!(clients.load(Ordering::SeqCst), 0);
    }
}
