//! Provider webhook ingress: POST /webhooks/{channel}.
//!
//! The body goes to the channel manager untouched. Providers always get a
//! 200 so they do not retry events we deliberately skipped; only an unknown
//! channel name is a 404.

use axum::{
    body::Bytes,
    extract::{Path, State},
    http::{HeaderMap, StatusCode},
    Json,
};
use serde_json::{json, Value};
use std::sync::Arc;
use tracing::{debug, info};

use crate::app::AppState;

/// Headers that may carry proof of origin, in lookup order.
const SIGNATURE_HEADERS: [&str; 3] = [
    "x-telegram-bot-api-secret-token",
    "x-hub-signature-256",
    "apikey",
];

pub async fn webhook_handler(
    State(state): State<Arc<AppState>>,
    Path(channel): Path<String>,
    headers: HeaderMap,
    body: Bytes,
) -> Result<Json<Value>, (StatusCode, Json<Value>)> {
    let channel = super::channel_from_path(&channel)?;
    info!(channel = %channel, bytes = body.len(), "webhook arrived");

    let signature = signature(&headers);
    match state
        .manager
        .handle_webhook(channel, &body, signature)
        .await
    {
        Some(message) => Ok(Json(json!({"ok": true, "messageId": message.id}))),
        None => {
            debug!(channel = %channel, "webhook produced no message");
            Ok(Json(json!({"ok": false})))
        }
    }
}

fn signature(headers: &HeaderMap) -> Option<&str> {
    SIGNATURE_HEADERS
        .iter()
        .find_map(|name| headers.get(*name).and_then(|v| v.to_str().ok()))
}
