//! Outbound sends and status: POST /channels/{channel}/send, GET /channels/status.

use axum::{
    extract::{Path, State},
    http::StatusCode,
    Json,
};
use serde::Deserialize;
use serde_json::{json, Value};
use std::collections::BTreeMap;
use std::sync::Arc;

use leadline_channels::{ChannelStatus, OutboundMedia, OutboundMessageKind, SendResult};

use crate::app::AppState;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SendKind {
    Text,
    Image,
    Document,
    Audio,
    Video,
}

impl SendKind {
    fn media_kind(self) -> Option<OutboundMessageKind> {
        match self {
            SendKind::Text => None,
            SendKind::Image => Some(OutboundMessageKind::Image),
            SendKind::Document => Some(OutboundMessageKind::Document),
            SendKind::Audio => Some(OutboundMessageKind::Audio),
            SendKind::Video => Some(OutboundMessageKind::Video),
        }
    }
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SendRequest {
    pub to: String,
    #[serde(default = "default_kind")]
    pub kind: SendKind,
    pub text: Option<String>,
    pub url: Option<String>,
    pub caption: Option<String>,
    pub file_name: Option<String>,
    pub mime_type: Option<String>,
}

fn default_kind() -> SendKind {
    SendKind::Text
}

type ApiError = (StatusCode, Json<Value>);

fn bad_request(msg: &str) -> ApiError {
    (StatusCode::BAD_REQUEST, Json(json!({ "error": msg })))
}

/// POST /channels/{channel}/send
///
/// Malformed requests are a 400; anything past that is a `SendResult`,
/// including provider failures and channels with no adapter.
pub async fn send_handler(
    State(state): State<Arc<AppState>>,
    Path(channel): Path<String>,
    Json(req): Json<SendRequest>,
) -> Result<Json<SendResult>, ApiError> {
    let channel = super::channel_from_path(&channel)?;
    if req.to.trim().is_empty() {
        return Err(bad_request("`to` is required"));
    }

    let result = match req.kind.media_kind() {
        None => {
            let text = req
                .text
                .as_deref()
                .filter(|t| !t.is_empty())
                .ok_or_else(|| bad_request("`text` is required for kind=text"))?;
            state.manager.send_text(channel, &req.to, text).await
        }
        Some(kind) => {
            let url = req
                .url
                .clone()
                .filter(|u| !u.trim().is_empty())
                .ok_or_else(|| bad_request("`url` is required for media sends"))?;
            let media = OutboundMedia {
                url,
                mime_type: req.mime_type.clone(),
                caption: req.caption.clone(),
                file_name: req.file_name.clone(),
            };
            state
                .manager
                .send_media(channel, kind, &req.to, &media)
                .await
        }
    };
    Ok(Json(result))
}

/// GET /channels/status
pub async fn status_handler(
    State(state): State<Arc<AppState>>,
) -> Json<BTreeMap<String, ChannelStatus>> {
    let statuses = state
        .manager
        .get_status()
        .await
        .into_iter()
        .map(|(channel, status)| (channel.to_string(), status))
        .collect();
    Json(statuses)
}
