//! Telegram channel adapter.
//!
//! Webhook updates come in as raw Bot API JSON; sends and status checks go out over
//! the same Bot API with the token in the URL path.

use std::sync::Arc;

use async_trait::async_trait;
use serde_json::{json, Value};
use tracing::{debug, warn};

use leadline_channels::adapter::ChannelAdapter;
use leadline_channels::config_slot::ConfigSlot;
use leadline_channels::error::ChannelError;
use leadline_channels::message::{
    strip_conversation_prefix, ChannelStatus, Message, OutboundMedia, SendResult,
};
use leadline_channels::webhook::{tokens_match, WebhookPayload};
use leadline_core::{ChannelConfig, ChannelType};

use crate::client::{BotClient, SendMethod};
use crate::parse;
use crate::settings::TelegramSettings;

pub struct TelegramAdapter {
    client: BotClient,
    settings: ConfigSlot<TelegramSettings>,
}

impl TelegramAdapter {
    pub fn new() -> Self {
        Self::with_client(reqwest::Client::new())
    }

    pub fn with_client(http: reqwest::Client) -> Self {
        Self {
            client: BotClient::new(http),
            settings: ConfigSlot::new(),
        }
    }

    fn target(&self, to: &str) -> Result<(Arc<TelegramSettings>, String), ChannelError> {
        let settings = self.settings.get()?;
        let chat_id = strip_conversation_prefix(ChannelType::Telegram, to).trim();
        if chat_id.is_empty() {
            return Err(ChannelError::Config("empty recipient".to_string()));
        }
        Ok((settings, chat_id.to_string()))
    }

    async fn send_file(&self, to: &str, method: SendMethod, media: &OutboundMedia) -> SendResult {
        let (settings, chat_id) = match self.target(to) {
            Ok(t) => t,
            Err(e) => return SendResult::from_error(&e),
        };
        let outcome = self
            .client
            .send_media(&settings, &chat_id, method, media)
            .await;
        SendResult::from_outcome(ChannelType::Telegram, outcome)
    }
}

impl Default for TelegramAdapter {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl ChannelAdapter for TelegramAdapter {
    fn channel_type(&self) -> ChannelType {
        ChannelType::Telegram
    }

    fn configure(&self, config: ChannelConfig) -> Result<(), ChannelError> {
        self.settings.install(&config, TelegramSettings::from_config)
    }

    async fn validate_config(&self, config: &ChannelConfig) -> bool {
        let settings = match TelegramSettings::from_config(config) {
            Ok(s) => s,
            Err(e) => {
                warn!(error = %e, "Telegram: incomplete config");
                return false;
            }
        };
        match self.client.get_me(&settings).await {
            Ok(bot) => {
                debug!(bot_id = bot.id, username = ?bot.username, "Telegram: token accepted");
                true
            }
            Err(e) => {
                warn!(error = %e, "Telegram: getMe failed");
                false
            }
        }
    }

    fn verify_webhook(&self, payload: &WebhookPayload, signature: Option<&str>) -> bool {
        let Ok(settings) = self.settings.get() else {
            return false;
        };

        if payload.body().get("update_id").and_then(Value::as_i64).is_none() {
            debug!("Telegram: webhook without update_id");
            return false;
        }

        match (settings.webhook_secret.as_deref(), signature) {
            (None, _) => true,
            (Some(secret), Some(presented)) => {
                let ok = tokens_match(secret, presented.trim());
                if !ok {
                    warn!("Telegram: webhook secret token mismatch");
                }
                ok
            }
            (Some(_), None) => {
                warn!("Telegram: webhook secret configured but header missing");
                false
            }
        }
    }

    async fn parse_webhook(&self, payload: &WebhookPayload) -> Option<Message> {
        let parse::Parsed {
            mut message,
            file_id,
        } = parse::parse_update(payload.body())?;

        if let Some(file_id) = file_id {
            match self.settings.get() {
                Ok(settings) => match self.client.file_url(&settings, &file_id).await {
                    Ok(url) => parse::set_media_url(&mut message.content, url),
                    Err(e) => warn!(
                        external_id = %message.external_id,
                        error = %e,
                        "Telegram: getFile failed, media URL left unset"
                    ),
                },
                Err(e) => debug!(error = %e, "Telegram: cannot resolve media without settings"),
            }
        }
        Some(message)
    }

    async fn send_text(&self, to: &str, text: &str) -> SendResult {
        let (settings, chat_id) = match self.target(to) {
            Ok(t) => t,
            Err(e) => return SendResult::from_error(&e),
        };
        let outcome = self.client.send_message(&settings, &chat_id, text).await;
        SendResult::from_outcome(ChannelType::Telegram, outcome)
    }

    async fn send_image(&self, to: &str, media: &OutboundMedia) -> SendResult {
        self.send_file(to, SendMethod::Photo, media).await
    }

    async fn send_document(&self, to: &str, media: &OutboundMedia) -> SendResult {
        self.send_file(to, SendMethod::Document, media).await
    }

    async fn send_audio(&self, to: &str, media: &OutboundMedia) -> SendResult {
        self.send_file(to, SendMethod::Audio, media).await
    }

    async fn send_video(&self, to: &str, media: &OutboundMedia) -> SendResult {
        self.send_file(to, SendMethod::Video, media).await
    }

    async fn health_check(&self) -> bool {
        self.get_status().await.connected
    }

    async fn get_status(&self) -> ChannelStatus {
        let settings = match self.settings.get() {
            Ok(s) => s,
            Err(e) => return ChannelStatus::disconnected(e.to_string()),
        };
        match self.client.get_me(&settings).await {
            Ok(bot) => ChannelStatus::connected(Some(json!({
                "botId": bot.id,
                "username": bot.username,
                "name": bot.first_name,
            }))),
            Err(e) => ChannelStatus::disconnected(e.to_string()),
        }
    }
}
