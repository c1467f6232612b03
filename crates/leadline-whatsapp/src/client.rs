//! Thin client for the WhatsApp bridge REST API.
//!
//! Every call authenticates with the `apikey` header and targets a
//! per-instance route (`{api_url}/{path}/{instance}`).

use serde_json::{json, Value};
use tracing::{debug, warn};

use leadline_channels::error::{ChannelError, Result};
use leadline_channels::message::OutboundMedia;

use crate::settings::WhatsAppSettings;

/// `mediatype` values understood by the bridge's sendMedia route.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum BridgeMediaType {
    Image,
    Video,
    Document,
}

impl BridgeMediaType {
    fn as_str(&self) -> &'static str {
        match self {
            BridgeMediaType::Image => "image",
            BridgeMediaType::Video => "video",
            BridgeMediaType::Document => "document",
        }
    }
}

pub(crate) struct BridgeClient {
    http: reqwest::Client,
}

impl BridgeClient {
    pub(crate) fn new(http: reqwest::Client) -> Self {
        Self { http }
    }

    /// `GET instance/connectionState`: `{"instance": {"instanceName", "state"}}`.
    pub(crate) async fn connection_state(&self, s: &WhatsAppSettings) -> Result<Value> {
        let url = s.endpoint("instance/connectionState");
        debug!(url = %url, "querying bridge connection state");
        let resp = self
            .http
            .get(&url)
            .header("apikey", &s.api_key)
            .send()
            .await?;
        read_json(resp).await
    }

    /// Returns the provider message id (`key.id`) when the bridge reports one.
    pub(crate) async fn send_text(
        &self,
        s: &WhatsAppSettings,
        number: &str,
        text: &str,
    ) -> Result<Option<String>> {
        let body = json!({ "number": number, "text": text });
        let resp = self.post(s, "message/sendText", &body).await?;
        Ok(message_key_id(&resp))
    }

    pub(crate) async fn send_media(
        &self,
        s: &WhatsAppSettings,
        number: &str,
        kind: BridgeMediaType,
        media: &OutboundMedia,
    ) -> Result<Option<String>> {
        let mut body = json!({
            "number": number,
            "mediatype": kind.as_str(),
            "media": media.url,
        });
        if let Some(mime) = &media.mime_type {
            body["mimetype"] = json!(mime);
        }
        if let Some(caption) = &media.caption {
            body["caption"] = json!(caption);
        }
        if let Some(name) = &media.file_name {
            body["fileName"] = json!(name);
        }
        let resp = self.post(s, "message/sendMedia", &body).await?;
        Ok(message_key_id(&resp))
    }

    /// Audio goes out as a voice note through its own route.
    pub(crate) async fn send_audio(
        &self,
        s: &WhatsAppSettings,
        number: &str,
        media: &OutboundMedia,
    ) -> Result<Option<String>> {
        let body = json!({ "number": number, "audio": media.url });
        let resp = self.post(s, "message/sendWhatsAppAudio", &body).await?;
        Ok(message_key_id(&resp))
    }

    /// Stored message envelopes for one thread, newest first as the bridge
    /// returns them.
    pub(crate) async fn find_messages(
        &self,
        s: &WhatsAppSettings,
        remote_jid: &str,
        limit: usize,
    ) -> Result<Vec<Value>> {
        let body = json!({
            "where": { "key": { "remoteJid": remote_jid } },
            "limit": limit,
        });
        let resp = self.post(s, "chat/findMessages", &body).await?;
        let mut records = history_records(resp);
        records.truncate(limit);
        Ok(records)
    }

    async fn post(&self, s: &WhatsAppSettings, path: &str, body: &Value) -> Result<Value> {
        let url = s.endpoint(path);
        debug!(url = %url, "calling bridge");
        let resp = self
            .http
            .post(&url)
            .header("apikey", &s.api_key)
            .json(body)
            .send()
            .await?;
        read_json(resp).await
    }
}

/// Turn a bridge response into JSON, or into `ChannelError::Api` with the
/// bridge's own error text when the status is not 2xx.
async fn read_json(resp: reqwest::Response) -> Result<Value> {
    let status = resp.status().as_u16();
    if !resp.status().is_success() {
        let text = resp.text().await.unwrap_or_default();
        warn!(status, body = %text, "WhatsApp bridge API error");
        return Err(ChannelError::Api {
            status,
            message: error_message(&text),
        });
    }
    let text = resp.text().await?;
    if text.trim().is_empty() {
        return Ok(Value::Null);
    }
    Ok(serde_json::from_str(&text)?)
}

/// Pull a readable message out of a bridge error body.
///
/// Shapes seen: `{"response": {"message": [...]}}`, `{"message": "..."}`,
/// `{"error": "..."}`; anything else is returned verbatim.
fn error_message(body: &str) -> String {
    let Ok(v) = serde_json::from_str::<Value>(body) else {
        return if body.trim().is_empty() {
            "empty error response".to_string()
        } else {
            body.to_string()
        };
    };
    let candidate = v
        .pointer("/response/message")
        .or_else(|| v.get("message"))
        .or_else(|| v.get("error"));
    match candidate {
        Some(Value::String(s)) => s.clone(),
        Some(Value::Array(items)) => items
            .iter()
            .map(|i| match i {
                Value::String(s) => s.clone(),
                other => other.to_string(),
            })
            .collect::<Vec<_>>()
            .join("; "),
        Some(other) => other.to_string(),
        None => body.to_string(),
    }
}

fn message_key_id(resp: &Value) -> Option<String> {
    resp.pointer("/key/id")
        .and_then(Value::as_str)
        .map(String::from)
}

/// History comes back either as a bare array or paginated under
/// `messages.records`.
fn history_records(resp: Value) -> Vec<Value> {
    match resp {
        Value::Array(items) => items,
        Value::Object(mut obj) => match obj.remove("messages") {
            Some(Value::Object(mut page)) => match page.remove("records") {
                Some(Value::Array(items)) => items,
                _ => Vec::new(),
            },
            Some(Value::Array(items)) => items,
            _ => Vec::new(),
        },
        _ => Vec::new(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn error_message_shapes() {
        assert_eq!(
            error_message(r#"{"status":400,"error":"Bad Request","response":{"message":["number not on WhatsApp"]}}"#),
            "number not on WhatsApp"
        );
        assert_eq!(error_message(r#"{"message":"Unauthorized"}"#), "Unauthorized");
        assert_eq!(error_message("gateway timeout"), "gateway timeout");
        assert_eq!(error_message(""), "empty error response");
    }

    #[test]
    fn history_record_shapes() {
        let bare = serde_json::json!([{"key": {"id": "1"}}]);
        assert_eq!(history_records(bare).len(), 1);

        let paged = serde_json::json!({"messages": {"total": 2, "records": [{"key": {}}, {"key": {}}]}});
        assert_eq!(history_records(paged).len(), 2);

        assert!(history_records(serde_json::json!({"unexpected": true})).is_empty());
    }
}
