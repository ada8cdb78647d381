//! Web application router and middleware setup.

use super::{handlers, websocket, AppState, WebConfig};
use axum::{
    routing::{get, post},
    Router,
};
use std::path::PathBuf;
use tower::ServiceBuilder;
use tower_http::{
    cors::{Any, CorsLayer},
    services::ServeDir,
    trace::TraceLayer,
};
use tracing::{info, warn};

/// Create the axum application with all routes and middleware.
pub fn create_app(config: &WebConfig, state: AppState) -> Router {
    let mut app = Router::new()
        // API routes
        .route("/api/status", get(handlers::get_status))
        .route("/api/history", get(handlers::get_history))
        .route(
            "/api/config",
            get(handlers::get_config).post(handlers::post_config),
        )
        .route("/api/command", post(handlers::post_command))
        .route("/api/mqtt/inbound", post(handlers::post_mqtt_inbound))
        .route("/api/telegram/webhook", post(handlers::telegram_webhook))
        .route("/api/health", get(handlers::health_check))
        // WebSocket route
        .route("/ws", get(websocket::websocket_handler));

    let custom_index = match &config.static_path {
        Some(static_path) => {
            let static_path = PathBuf::from(static_path);
            if static_path.exists() {
                info!("Serving static files from: {:?}", static_path);
                app = app.nest_service("/static", ServeDir::new(&static_path));
                static_path.join("index.html").exists()
            } else {
                warn!(
                    "Static path {:?} does not exist, serving default index",
                    static_path
                );
                false
            }
        }
        None => false,
    };

    app = if custom_index {
        app.route("/", get(handlers::serve_index))
    } else {
        app.route("/", get(handlers::default_index))
    };

    let mut app = app.with_state(state);

    if config.enable_cors {
        app = app.layer(
            CorsLayer::new()
                .allow_origin(Any)
                .allow_methods(Any)
                .allow_headers(Any),
        );
    }

    app.layer(ServiceBuilder::new().layer(TraceLayer::new_for_http()))
}
