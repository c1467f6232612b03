//! Bot API calls over plain `reqwest`.
//!
//! Every method is `POST {api_url}/bot{token}/{method}` with a JSON body; the
//! response is the Bot API envelope, unwrapped here into `result` or
//! `ChannelError::Api`.

use serde::de::DeserializeOwned;
use serde_json::{json, Value};
use tracing::{debug, warn};

use leadline_channels::error::{ChannelError, Result};
use leadline_channels::message::OutboundMedia;

use crate::settings::TelegramSettings;
use crate::wire::{ApiResponse, BotUser, File, SentMessage};

/// The send methods this adapter uses, with the field each puts its media in.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum SendMethod {
    Photo,
    Document,
    Audio,
    Video,
}

impl SendMethod {
    fn method(&self) -> &'static str {
        match self {
            SendMethod::Photo => "sendPhoto",
            SendMethod::Document => "sendDocument",
            SendMethod::Audio => "sendAudio",
            SendMethod::Video => "sendVideo",
        }
    }

    fn field(&self) -> &'static str {
        match self {
            SendMethod::Photo => "photo",
            SendMethod::Document => "document",
            SendMethod::Audio => "audio",
            SendMethod::Video => "video",
        }
    }
}

pub(crate) struct BotClient {
    http: reqwest::Client,
}

impl BotClient {
    pub(crate) fn new(http: reqwest::Client) -> Self {
        Self { http }
    }

    pub(crate) async fn get_me(&self, s: &TelegramSettings) -> Result<BotUser> {
        self.call(s, "getMe", &json!({})).await
    }

    /// Resolve a `file_id` to a download URL.
    pub(crate) async fn file_url(&self, s: &TelegramSettings, file_id: &str) -> Result<String> {
        let file: File = self.call(s, "getFile", &json!({ "file_id": file_id })).await?;
        let path = file
            .file_path
            .ok_or_else(|| ChannelError::Parse("getFile returned no file_path".to_string()))?;
        Ok(s.file_url(&path))
    }

    /// Returns the sent message's id.
    pub(crate) async fn send_message(
        &self,
        s: &TelegramSettings,
        chat_id: &str,
        text: &str,
    ) -> Result<Option<String>> {
        let body = json!({ "chat_id": chat_id, "text": text });
        let sent: SentMessage = self.call(s, "sendMessage", &body).await?;
        Ok(Some(sent.message_id.to_string()))
    }

    pub(crate) async fn send_media(
        &self,
        s: &TelegramSettings,
        chat_id: &str,
        method: SendMethod,
        media: &OutboundMedia,
    ) -> Result<Option<String>> {
        let mut body = json!({ "chat_id": chat_id });
        body[method.field()] = json!(media.url);
        if let Some(caption) = &media.caption {
            body["caption"] = json!(caption);
        }
        let sent: SentMessage = self.call(s, method.method(), &body).await?;
        Ok(Some(sent.message_id.to_string()))
    }

    async fn call<T: DeserializeOwned>(
        &self,
        s: &TelegramSettings,
        method: &str,
        body: &Value,
    ) -> Result<T> {
        // The URL carries the token; log the method only.
        debug!(method, "calling Telegram Bot API");
        let resp = self.http.post(s.method_url(method)).json(body).send().await?;
        let status = resp.status().as_u16();
        let text = resp.text().await?;
        unwrap_envelope(method, status, &text)
    }
}

/// Unwrap `{"ok": true, "result": ...}`; anything else becomes an error
/// carrying Telegram's own description.
fn unwrap_envelope<T: DeserializeOwned>(method: &str, status: u16, text: &str) -> Result<T> {
    let envelope: ApiResponse<T> = match serde_json::from_str(text) {
        Ok(e) => e,
        Err(e) if (200..300).contains(&status) => return Err(e.into()),
        Err(_) => {
            warn!(method, status, "Telegram returned a non-JSON error");
            return Err(ChannelError::Api {
                status,
                message: if text.trim().is_empty() {
                    "empty error response".to_string()
                } else {
                    text.to_string()
                },
            });
        }
    };
    match envelope {
        ApiResponse {
            ok: true,
            result: Some(result),
            ..
        } => Ok(result),
        ApiResponse { ok: true, .. } => Err(ChannelError::Parse(format!("{} returned no result", method))),
        ApiResponse {
            description,
            error_code,
            ..
        } => {
            let code = error_code.unwrap_or(status);
            let message = description.unwrap_or_else(|| "request rejected".to_string());
            warn!(method, code, error = %message, "Telegram API error");
            Err(ChannelError::Api { status: code, message })
        }
    }
}
