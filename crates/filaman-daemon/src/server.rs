//! Web server setup and routing

use anyhow::Result;
use axum::{
    routing::{get, post},
    Router,
};
use std::sync::Arc;
use tokio::time::Duration;
use tower_http::cors::{Any, CorsLayer};
use tracing::info;

use crate::api;
use crate::state::AppState;
use crate::watcher::PresenceWatcher;
use crate::ws;

/// Build the HTTP router
pub fn router(state: Arc<AppState>) -> Router {
    Router::new()
        .route("/server/filaman/status", get(api::get_status))
        .route("/server/filaman/nfc_read", get(api::nfc_read))
        .route("/server/filaman/nfc_write", post(api::nfc_write))
        .route("/server/filaman/refresh", post(api::refresh))
        // WebSocket for filament change notifications
        .route("/ws", get(ws::websocket_handler))
        .layer(
            CorsLayer::new()
                .allow_origin(Any)
                .allow_methods(Any)
                .allow_headers(Any),
        )
        .with_state(state)
}

/// Start the presence watcher and serve HTTP until shutdown
pub async fn run(state: Arc<AppState>, bind: &str) -> Result<()> {
    let poll_interval_ms = state.config.device.poll_interval_ms;
    if poll_interval_ms > 0 {
        let watcher = PresenceWatcher::new(state.clone());
        tokio::spawn(watcher.run(Duration::from_millis(poll_interval_ms)));
    } else {
        info!("Presence watcher disabled");
    }

    let app = router(state);
    let listener = tokio::net::TcpListener::bind(bind).await?;
    info!(address = %bind, "Starting web server");
    axum::serve(listener, app).await?;
    Ok(())
}
