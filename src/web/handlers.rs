//! HTTP handlers for API endpoints.

use super::AppState;
use crate::collab::{chat, mqtt, ChatContext, NodeCommand};
use crate::config::ConfigUpdate;
use crate::state::NodeSnapshot;
use axum::{
    body::Bytes,
    extract::{Query, State},
    http::StatusCode,
    response::{Html, IntoResponse, Json, Response},
};
use serde::Deserialize;
use serde_json::{json, Value};
use std::path::PathBuf;
use tracing::{error, info, warn};

/// Current node snapshot.
pub async fn get_status(State(app): State<AppState>) -> Json<NodeSnapshot> {
    let config = app.config.current().await;
    let free_memory = app.memory.available_bytes();
    let state = app.state.read().await;
    Json(state.snapshot(&config, free_memory))
}

/// Stored readings, newest first.
pub async fn get_history(State(app): State<AppState>) -> Json<Value> {
    let state = app.state.read().await;
    Json(json!({ "history": state.history_entries() }))
}

/// Threshold, cooldown in seconds, bot flag and history capacity for the dashboard.
pub async fn get_config(State(app): State<AppState>) -> Json<Value> {
    let config = app.config.current().await;
    Json(json!({
        "threshold": config.system.distance_threshold_cm,
        "cooldown": config.system.alert_cooldown_ms / 1000,
        "telegram": config.telegram.enabled,
        "history_capacity": config.system.history_capacity,
    }))
}

/// Apply a partial configuration update.
///
/// The body is decoded by hand so malformed JSON maps to 400 like a rejected value.
pub async fn post_config(State(app): State<AppState>, body: Bytes) -> Response {
    let update: ConfigUpdate = match serde_json::from_slice(&body) {
        Ok(update) => update,
        Err(e) => {
            warn!("Rejected configuration body: {}", e);
            return bad_request(format!("Invalid JSON: {}", e));
        }
    };

    match app.config.update(&update).await {
        Ok(_) => Json(json!({
            "status": "ok",
            "message": "Configuration saved",
        }))
        .into_response(),
        Err(e) => {
            warn!("Rejected configuration update: {}", e);
            bad_request(e.to_string())
        }
    }
}

fn bad_request(message: String) -> Response {
    (
        StatusCode::BAD_REQUEST,
        Json(json!({ "status": "error", "message": message })),
    )
        .into_response()
}

#[derive(Debug, Deserialize)]
pub struct CommandParams {
    pub command: Option<String>,
}

/// `POST /api/command?command=...`
pub async fn post_command(
    State(app): State<AppState>,
    Query(params): Query<CommandParams>,
) -> (StatusCode, &'static str) {
    let Some(command) = params.command else {
        return (StatusCode::BAD_REQUEST, "Missing command parameter");
    };

    let (node_command, reply) = match command.as_str() {
        "test_alert" => {
            info!("Manual test alert requested");
            (NodeCommand::TestAlert, "Test alert triggered")
        }
        "refresh" => (NodeCommand::Refresh, "Refreshed"),
        _ => return (StatusCode::BAD_REQUEST, "Unknown command"),
    };

    match app.commands.send(node_command).await {
        Ok(()) => (StatusCode::OK, reply),
        Err(_) => {
            error!("Node loop is not accepting commands");
            (StatusCode::SERVICE_UNAVAILABLE, "Node loop unavailable")
        }
    }
}

/// Message delivered by an MQTT bridge.
#[derive(Debug, Deserialize)]
pub struct MqttInbound {
    pub topic: String,
    pub payload: String,
}

/// Accept a message received on the MQTT command topic.
pub async fn post_mqtt_inbound(
    State(app): State<AppState>,
    Json(message): Json<MqttInbound>,
) -> Response {
    let config = app.config.current().await;
    if !config.mqtt.enabled {
        return (StatusCode::NOT_FOUND, "MQTT disabled").into_response();
    }

    match mqtt::handle_message(&config.mqtt.topic, &message.topic, &message.payload) {
        Some(command) => {
            info!(topic = %message.topic, ?command, "MQTT command received");
            if app.commands.send(command.into()).await.is_err() {
                return (StatusCode::SERVICE_UNAVAILABLE, "Node loop unavailable").into_response();
            }
            Json(json!({ "status": "ok" })).into_response()
        }
        None => Json(json!({ "status": "ignored" })).into_response(),
    }
}

#[derive(Debug, Deserialize)]
pub struct ChatUpdate {
    pub message: Option<ChatMessage>,
}

#[derive(Debug, Deserialize)]
pub struct ChatMessage {
    pub chat: ChatRef,
    pub text: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct ChatRef {
    pub id: i64,
}

/// Bot webhook: answers with a `sendMessage` call in the response body.
pub async fn telegram_webhook(
    State(app): State<AppState>,
    Json(update): Json<ChatUpdate>,
) -> Json<Value> {
    let config = app.config.current().await;
    if !config.telegram.enabled {
        return Json(json!({}));
    }
    let Some(message) = update.message else {
        return Json(json!({}));
    };
    let Some(text) = message.text else {
        return Json(json!({}));
    };

    let free_memory = app.memory.available_bytes();
    let ctx = {
        let state = app.state.read().await;
        ChatContext::capture(&state, &config, free_memory)
    };
    let reply = chat::handle_message(&message.chat.id.to_string(), &text, &ctx);

    if let Some(command) = reply.command {
        if app.commands.send(command).await.is_err() {
            error!("Node loop is not accepting commands");
        }
    }

    let mut body = json!({
        "method": "sendMessage",
        "chat_id": reply.chat_id,
        "text": reply.text,
    });
    if let Some(mode) = reply.parse_mode {
        body["parse_mode"] = json!(mode);
    }
    Json(body)
}

/// Health check endpoint.
pub async fn health_check(State(app): State<AppState>) -> Json<Value> {
    let config = app.config.current().await;
    let state = app.state.read().await;
    Json(json!({
        "status": "ok",
        "service": "perimeter-node",
        "version": env!("CARGO_PKG_VERSION"),
        "uptime": state.uptime_seconds,
        "peer_connected": state.is_peer_connected(config.peer.connection_timeout_ms),
        "timestamp": chrono::Utc::now().to_rfc3339()
    }))
}

/// Serve `index.html` from the configured static directory.
pub async fn serve_index(State(app): State<AppState>) -> Result<Html<String>, StatusCode> {
    let config = app.config.current().await;
    let Some(dir) = config.web.static_path else {
        return Err(StatusCode::NOT_FOUND);
    };
    let index = PathBuf::from(dir).join("index.html");
    match tokio::fs::read_to_string(&index).await {
        Ok(content) => Ok(Html(content)),
        Err(e) => {
            error!("Failed to read {}: {}", index.display(), e);
            Err(StatusCode::NOT_FOUND)
        }
    }
}

/// Built-in dashboard, polling the status endpoint at the configured interval.
pub async fn default_index(State(app): State<AppState>) -> Html<String> {
    let refresh_ms = app.config.current().await.web.refresh_interval_ms();
    Html(DEFAULT_INDEX_HTML.replace("{{REFRESH_MS}}", &refresh_ms.to_string()))
}

const DEFAULT_INDEX_HTML: &str = r#"<!DOCTYPE html>
<html lang="en">
<head>
    <meta charset="UTF-8">
    <meta name="viewport" content="width=device-width, initial-scale=1.0">
    <title>Perimeter Node</title>
    <style>
        body { font-family: -apple-system, BlinkMacSystemFont, 'Segoe UI', Roboto, sans-serif; background: #1d2330; color: #e8eaf0; margin: 0; padding: 20px; }
        .container { max-width: 900px; margin: 0 auto; }
        h1 { font-weight: 600; margin-bottom: 4px; }
        .subtitle { opacity: 0.7; margin-bottom: 24px; }
        .grid { display: grid; grid-template-columns: repeat(auto-fit, minmax(200px, 1fr)); gap: 16px; }
        .card { background: #262e3f; border-radius: 10px; padding: 16px; }
        .label { font-size: 0.85rem; opacity: 0.7; }
        .value { font-size: 1.6rem; font-weight: bold; margin-top: 6px; }
        .alert { background: #7a2630; }
        table { width: 100%; margin-top: 24px; border-collapse: collapse; }
        td, th { padding: 6px 8px; border-bottom: 1px solid #333c50; text-align: left; }
    </style>
</head>
<body>
    <div class="container">
        <h1>Perimeter Node</h1>
        <div class="subtitle" id="subtitle">Connecting...</div>
        <div class="grid">
            <div class="card" id="distance-card"><div class="label">Distance</div><div class="value" id="distance">--</div></div>
            <div class="card"><div class="label">Status</div><div class="value" id="status">--</div></div>
            <div class="card"><div class="label">Average (10)</div><div class="value" id="average">--</div></div>
            <div class="card"><div class="label">Detections (60s)</div><div class="value" id="detections">--</div></div>
            <div class="card"><div class="label">Companion</div><div class="value" id="peer">--</div></div>
            <div class="card"><div class="label">Uptime</div><div class="value" id="uptime">--</div></div>
        </div>
        <table>
            <thead><tr><th>Distance</th><th>Timestamp (ms)</th><th>Detected</th></tr></thead>
            <tbody id="history"></tbody>
        </table>
    </div>
    <script>
        async function refresh() {
            try {
                const status = await (await fetch('/api/status')).json();
                document.getElementById('distance').textContent = status.distance.toFixed(1) + ' cm';
                document.getElementById('status').textContent = status.status;
                document.getElementById('average').textContent = status.average_distance.toFixed(1) + ' cm';
                document.getElementById('detections').textContent = status.detections_last_minute;
                document.getElementById('peer').textContent = status.peer_connected ? 'Connected' : 'Lost';
                document.getElementById('uptime').textContent = status.uptime_formatted;
                document.getElementById('distance-card').className = status.object_detected ? 'card alert' : 'card';
                document.getElementById('subtitle').textContent =
                    status.connectivity_mode + ' | threshold ' + status.threshold.toFixed(1) + ' cm';

                const history = await (await fetch('/api/history')).json();
                document.getElementById('history').innerHTML = history.history.slice(0, 10).map(h =>
                    '<tr><td>' + h.distance.toFixed(1) + ' cm</td><td>' + h.timestamp + '</td><td>' +
                    (h.object_detected ? 'yes' : 'no') + '</td></tr>').join('');
            } catch (e) {
                document.getElementById('subtitle').textContent = 'Connection lost';
            }
        }
        refresh();
        setInterval(refresh, {{REFRESH_MS}});
    </script>
</body>
</html>
"#;
