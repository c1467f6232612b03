pub mod channels;
pub mod health;
pub mod webhooks;

use axum::{http::StatusCode, Json};
use serde_json::{json, Value};

use leadline_channels::ChannelType;

/// Resolve the `{channel}` path segment, or 404.
pub(crate) fn channel_from_path(raw: &str) -> Result<ChannelType, (StatusCode, Json<Value>)> {
    raw.parse::<ChannelType>().map_err(|_| {
        tracing::warn!(channel = %raw, "request for unknown channel");
        (
            StatusCode::NOT_FOUND,
            Json(json!({"error": format!("unknown channel: {}", raw)})),
        )
    })
}
