use std::sync::Arc;

use axum::{
    routing::{get, post},
    Router,
};
use tracing::info;

use leadline_channels::ChannelManager;

/// Shared state handed to every handler.
pub struct AppState {
    pub manager: Arc<ChannelManager>,
    pub started_at: std::time::Instant,
}

impl AppState {
    pub fn new(manager: Arc<ChannelManager>) -> Self {
        Self {
            manager,
            started_at: std::time::Instant::now(),
        }
    }
}

/// Log every normalized inbound message. Persistence and other consumers
/// subscribe the same way.
pub fn register_log_subscriber(manager: &ChannelManager) {
    manager.on_event_fn("log", |event| {
        let m = event.message();
        info!(
            event = event.name(),
            channel = %m.channel,
            conversation_id = %m.conversation_id,
            external_id = %m.external_id,
            kind = %m.kind(),
            sender = %m.sender.name,
            "message received"
        );
        Ok(())
    });
}

pub fn build_router(state: Arc<AppState>) -> Router {
    Router::new()
        .route("/health", get(crate::http::health::health_handler))
        .route(
            "/webhooks/{channel}",
            post(crate::http::webhooks::webhook_handler),
        )
        .route(
            "/channels/status",
            get(crate::http::channels::status_handler),
        )
        .route(
            "/channels/{channel}/send",
            post(crate::http::channels::send_handler),
        )
        .with_state(state)
        .layer(tower_http::trace::TraceLayer::new_for_http())
}
