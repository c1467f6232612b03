use axum::{extract::State, Json};
use serde_json::{json, Value};
use std::sync::Arc;

use crate::app::AppState;

/// GET /health: liveness check. Never calls a provider.
pub async fn health_handler(State(state): State<Arc<AppState>>) -> Json<Value> {
    let channels: Vec<String> = state
        .manager
        .channels()
        .into_iter()
        .map(|c| c.to_string())
        .collect();
    Json(json!({
        "status": "ok",
        "version": env!("CARGO_PKG_VERSION"),
        "uptime_secs": state.started_at.elapsed().as_secs(),
        "channels": channels,
    }))
}
