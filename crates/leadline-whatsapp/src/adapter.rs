//! WhatsApp-bridge channel adapter.
//!
//! Receives `messages.upsert` webhooks from a self-hosted WhatsApp bridge and
//! sends through the bridge's REST API. One adapter governs one bridge
//! instance.

use async_trait::async_trait;
use serde_json::{json, Value};
use tracing::{debug, warn};

use leadline_channels::adapter::ChannelAdapter;
use leadline_channels::config_slot::ConfigSlot;
use leadline_channels::error::ChannelError;
use leadline_channels::message::{
    strip_conversation_prefix, ChannelStatus, Message, OutboundMedia, SendResult,
};
use leadline_channels::webhook::{tokens_match, verify_hmac_sha256, WebhookPayload};
use leadline_core::{ChannelConfig, ChannelType};

use crate::client::{BridgeClient, BridgeMediaType};
use crate::parse::{self, Origin};
use crate::settings::WhatsAppSettings;

/// Bridge connection state meaning "logged in and online".
const STATE_OPEN: &str = "open";

pub struct WhatsAppAdapter {
    client: BridgeClient,
    settings: ConfigSlot<WhatsAppSettings>,
}

impl WhatsAppAdapter {
    pub fn new() -> Self {
        Self::with_client(reqwest::Client::new())
    }

    /// Share an existing HTTP client (connection pool, proxy, timeouts).
    pub fn with_client(http: reqwest::Client) -> Self {
        Self {
            client: BridgeClient::new(http),
            settings: ConfigSlot::new(),
        }
    }

    async fn send_with<F, Fut>(&self, to: &str, op: F) -> SendResult
    where
        F: FnOnce(std::sync::Arc<WhatsAppSettings>, String) -> Fut,
        Fut: std::future::Future<Output = Result<Option<String>, ChannelError>>,
    {
        let settings = match self.settings.get() {
            Ok(s) => s,
            Err(e) => return SendResult::from_error(&e),
        };
        let number = match recipient(to) {
            Ok(n) => n,
            Err(e) => return SendResult::from_error(&e),
        };
        SendResult::from_outcome(ChannelType::WhatsApp, op(settings, number).await)
    }

    async fn send_bridge_media(&self, to: &str, kind: BridgeMediaType, media: &OutboundMedia) -> SendResult {
        self.send_with(to, |s, number| async move {
            self.client.send_media(&s, &number, kind, media).await
        })
        .await
    }
}

impl Default for WhatsAppAdapter {
    fn default() -> Self {
        Self::new()
    }
}

/// Normalize a send recipient: canonical conversation ids lose their
/// namespace, bare numbers lose a leading `+`, JIDs pass through.
fn recipient(to: &str) -> Result<String, ChannelError> {
    let bare = strip_conversation_prefix(ChannelType::WhatsApp, to);
    let bare = bare.strip_prefix('+').unwrap_or(bare);
    if bare.is_empty() {
        return Err(ChannelError::Config("empty recipient".to_string()));
    }
    Ok(bare.to_string())
}

#[async_trait]
impl ChannelAdapter for WhatsAppAdapter {
    fn channel_type(&self) -> ChannelType {
        ChannelType::WhatsApp
    }

    fn configure(&self, config: ChannelConfig) -> Result<(), ChannelError> {
        self.settings.install(&config, WhatsAppSettings::from_config)
    }

    async fn validate_config(&self, config: &ChannelConfig) -> bool {
        let settings = match WhatsAppSettings::from_config(config) {
            Ok(s) => s,
            Err(e) => {
                warn!(error = %e, "WhatsApp: incomplete config");
                return false;
            }
        };
        match self.client.connection_state(&settings).await {
            Ok(state) => {
                debug!(instance = %settings.instance, state = %state, "WhatsApp: credentials accepted");
                true
            }
            Err(e) => {
                warn!(instance = %settings.instance, error = %e, "WhatsApp: credential check failed");
                false
            }
        }
    }

    fn verify_webhook(&self, payload: &WebhookPayload, signature: Option<&str>) -> bool {
        let Ok(settings) = self.settings.get() else {
            return false;
        };
        let body = payload.body();

        // Envelope sanity: every bridge callback names its event.
        if body.get("event").and_then(Value::as_str).is_none() {
            debug!("WhatsApp: webhook without event name");
            return false;
        }

        // Instance identity: a webhook for another instance is not ours.
        match body.get("instance").and_then(Value::as_str) {
            Some(instance) if instance == settings.instance => {}
            other => {
                warn!(
                    expected = %settings.instance,
                    got = other.unwrap_or("<missing>"),
                    "WhatsApp: webhook instance mismatch"
                );
                return false;
            }
        }

        let Some(secret) = settings.webhook_secret.as_deref() else {
            return true;
        };
        let Some(sig) = signature.map(str::trim).filter(|s| !s.is_empty()) else {
            warn!("WhatsApp: webhook secret configured but no signature presented");
            return false;
        };
        if sig.starts_with("sha256=") {
            match verify_hmac_sha256(secret, payload.raw(), sig) {
                Ok(()) => true,
                Err(reason) => {
                    warn!(reason = %reason, "WhatsApp: webhook signature rejected");
                    false
                }
            }
        } else {
            tokens_match(secret, sig)
        }
    }

    async fn parse_webhook(&self, payload: &WebhookPayload) -> Option<Message> {
        parse::parse_webhook_body(payload.body())
    }

    async fn send_text(&self, to: &str, text: &str) -> SendResult {
        self.send_with(to, |s, number| async move {
            self.client.send_text(&s, &number, text).await
        })
        .await
    }

    async fn send_image(&self, to: &str, media: &OutboundMedia) -> SendResult {
        self.send_bridge_media(to, BridgeMediaType::Image, media).await
    }

    async fn send_document(&self, to: &str, media: &OutboundMedia) -> SendResult {
        self.send_bridge_media(to, BridgeMediaType::Document, media).await
    }

    async fn send_audio(&self, to: &str, media: &OutboundMedia) -> SendResult {
        self.send_with(to, |s, number| async move {
            self.client.send_audio(&s, &number, media).await
        })
        .await
    }

    async fn send_video(&self, to: &str, media: &OutboundMedia) -> SendResult {
        self.send_bridge_media(to, BridgeMediaType::Video, media).await
    }

    fn supports_history(&self) -> bool {
        true
    }

    async fn fetch_history(&self, contact_id: &str, limit: usize) -> Vec<Message> {
        let Ok(settings) = self.settings.get() else {
            return Vec::new();
        };
        let Ok(number) = recipient(contact_id) else {
            return Vec::new();
        };
        let jid = parse::to_jid(&number);
        match self.client.find_messages(&settings, &jid, limit).await {
            Ok(records) => records
                .iter()
                .filter_map(|r| parse::parse_envelope(r, Origin::History))
                .collect(),
            Err(e) => {
                warn!(jid = %jid, error = %e, "WhatsApp: history fetch failed");
                Vec::new()
            }
        }
    }

    async fn health_check(&self) -> bool {
        self.get_status().await.connected
    }

    async fn get_status(&self) -> ChannelStatus {
        let settings = match self.settings.get() {
            Ok(s) => s,
            Err(e) => return ChannelStatus::disconnected(e.to_string()),
        };
        match self.client.connection_state(&settings).await {
            Ok(body) => {
                let state = body
                    .pointer("/instance/state")
                    .or_else(|| body.get("state"))
                    .and_then(Value::as_str)
                    .unwrap_or("unknown")
                    .to_string();
                let details = json!({ "instance": settings.instance, "state": state });
                if state == STATE_OPEN {
                    ChannelStatus::connected(Some(details))
                } else {
                    ChannelStatus::disconnected(format!("instance state: {}", state))
                        .with_details(details)
                }
            }
            Err(e) => ChannelStatus::disconnected(e.to_string()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use httpmock::Method::{GET, POST};
    use httpmock::MockServer;
    use leadline_channels::message::MessageType;
    use leadline_channels::webhook::sign_hmac_sha256;

    fn config(base: &str) -> ChannelConfig {
        ChannelConfig::new()
            .with_api_url(base)
            .with_api_key("bridge-key")
            .with_instance("sales")
    }

    fn configured(base: &str) -> WhatsAppAdapter {
        let adapter = WhatsAppAdapter::new();
        adapter.configure(config(base)).unwrap();
        adapter
    }

    fn upsert_payload(instance: &str) -> WebhookPayload {
        WebhookPayload::from_json(json!({
            "event": "messages.upsert",
            "instance": instance,
            "data": {
                "key": {"remoteJid": "5511999990000@s.whatsapp.net", "fromMe": false, "id": "ABC"},
                "message": {"conversation": "Oi"},
                "messageTimestamp": 1_700_000_000,
            }
        }))
    }

    #[tokio::test]
    async fn validate_config_checks_connection_state() {
        let server = MockServer::start();
        let state = server.mock(|when, then| {
            when.method(GET)
                .path("/instance/connectionState/sales")
                .header("apikey", "bridge-key");
            then.status(200)
                .json_body(json!({"instance": {"instanceName": "sales", "state": "open"}}));
        });

        let adapter = WhatsAppAdapter::new();
        assert!(adapter.validate_config(&config(&server.base_url())).await);
        state.assert_calls(1);

        // incomplete config never reaches the network
        assert!(!adapter.validate_config(&ChannelConfig::new()).await);
    }

    #[tokio::test]
    async fn validate_config_is_false_on_rejection() {
        let server = MockServer::start();
        server.mock(|when, then| {
            when.method(GET).path("/instance/connectionState/sales");
            then.status(401).json_body(json!({"message": "Unauthorized"}));
        });
        let adapter = WhatsAppAdapter::new();
        assert!(!adapter.validate_config(&config(&server.base_url())).await);
    }

    #[test]
    fn verify_requires_matching_instance() {
        let adapter = configured("http://bridge.invalid");
        assert!(adapter.verify_webhook(&upsert_payload("sales"), None));
        assert!(!adapter.verify_webhook(&upsert_payload("support"), None));

        let no_event = WebhookPayload::from_json(json!({"instance": "sales"}));
        assert!(!adapter.verify_webhook(&no_event, None));
    }

    #[test]
    fn verify_rejects_when_unconfigured_or_disabled() {
        let adapter = WhatsAppAdapter::new();
        assert!(!adapter.verify_webhook(&upsert_payload("sales"), None));

        adapter.configure(ChannelConfig::new().disabled()).unwrap();
        assert!(!adapter.verify_webhook(&upsert_payload("sales"), None));
    }

    #[test]
    fn verify_with_secret_accepts_token_or_hmac() {
        let adapter = WhatsAppAdapter::new();
        adapter
            .configure(config("http://bridge.invalid").with_webhook_secret("hook-secret"))
            .unwrap();
        let payload = upsert_payload("sales");

        assert!(!adapter.verify_webhook(&payload, None));
        assert!(!adapter.verify_webhook(&payload, Some("wrong")));
        assert!(adapter.verify_webhook(&payload, Some("hook-secret")));

        let sig = sign_hmac_sha256("hook-secret", payload.raw()).unwrap();
        assert!(adapter.verify_webhook(&payload, Some(&sig)));
        let forged = sign_hmac_sha256("other", payload.raw()).unwrap();
        assert!(!adapter.verify_webhook(&payload, Some(&forged)));
    }

    #[tokio::test]
    async fn send_text_posts_and_returns_key_id() {
        let server = MockServer::start();
        let send = server.mock(|when, then| {
            when.method(POST)
                .path("/message/sendText/sales")
                .header("apikey", "bridge-key")
                .json_body(json!({"number": "5511999990000", "text": "Olá"}));
            then.status(201).json_body(json!({
                "key": {"remoteJid": "5511999990000@s.whatsapp.net", "fromMe": true, "id": "BAE5F00D"},
                "status": "PENDING"
            }));
        });

        let adapter = configured(&server.base_url());
        let result = adapter.send_text("wa_5511999990000", "Olá").await;
        send.assert_calls(1);
        assert!(result.success, "{result:?}");
        assert!(result.error.is_none());
        assert_eq!(result.external_id.as_deref(), Some("BAE5F00D"));
        assert!(result.message_id.unwrap().starts_with("wa_BAE5F00D_"));
    }

    #[tokio::test]
    async fn provider_error_becomes_failed_result() {
        let server = MockServer::start();
        server.mock(|when, then| {
            when.method(POST).path("/message/sendText/sales");
            then.status(400).json_body(json!({
                "status": 400, "error": "Bad Request",
                "response": {"message": ["number not on WhatsApp"]}
            }));
        });

        let adapter = configured(&server.base_url());
        let result = adapter.send_text("+5511000", "hi").await;
        assert!(!result.success);
        let err = result.error.expect("error present");
        assert!(err.contains("400") && err.contains("number not on WhatsApp"), "{err}");
    }

    #[tokio::test]
    async fn transport_failure_becomes_failed_result() {
        // nothing listens on port 9 (discard) of localhost in test sandboxes
        let adapter = configured("http://127.0.0.1:9");
        let result = adapter.send_text("5511", "hi").await;
        assert!(!result.success);
        assert!(result.error.is_some());
    }

    #[tokio::test]
    async fn sends_fail_cleanly_when_not_configured() {
        let adapter = WhatsAppAdapter::new();
        let result = adapter.send_text("5511", "hi").await;
        assert_eq!(result.error.as_deref(), Some("channel not configured"));

        adapter.configure(ChannelConfig::new().disabled()).unwrap();
        let media = OutboundMedia::new("https://x/a.png");
        let result = adapter.send_image("5511", &media).await;
        assert_eq!(result.error.as_deref(), Some("channel disabled"));
    }

    #[tokio::test]
    async fn media_sends_use_the_right_routes() {
        let server = MockServer::start();
        let doc = server.mock(|when, then| {
            when.method(POST)
                .path("/message/sendMedia/sales")
                .json_body(json!({
                    "number": "5511",
                    "mediatype": "document",
                    "media": "https://files/q.pdf",
                    "fileName": "quote.pdf"
                }));
            then.status(201).json_body(json!({"key": {"id": "DOC1"}}));
        });
        let audio = server.mock(|when, then| {
            when.method(POST)
                .path("/message/sendWhatsAppAudio/sales")
                .json_body(json!({"number": "5511", "audio": "https://files/v.ogg"}));
            then.status(201).json_body(json!({"key": {"id": "AUD1"}}));
        });

        let adapter = configured(&server.base_url());
        let pdf = OutboundMedia::new("https://files/q.pdf").with_file_name("quote.pdf");
        let r = adapter.send_document("5511", &pdf).await;
        assert_eq!(r.external_id.as_deref(), Some("DOC1"));

        let voice = OutboundMedia::new("https://files/v.ogg");
        let r = adapter.send_audio("5511", &voice).await;
        assert_eq!(r.external_id.as_deref(), Some("AUD1"));

        doc.assert_calls(1);
        audio.assert_calls(1);
    }

    #[tokio::test]
    async fn history_maps_both_directions() {
        let server = MockServer::start();
        server.mock(|when, then| {
            when.method(POST)
                .path("/chat/findMessages/sales")
                .json_body(json!({
                    "where": {"key": {"remoteJid": "5511999990000@s.whatsapp.net"}},
                    "limit": 10
                }));
            then.status(200).json_body(json!({"messages": {"total": 3, "records": [
                {"key": {"remoteJid": "5511999990000@s.whatsapp.net", "fromMe": false, "id": "IN1"},
                 "message": {"conversation": "quero um orçamento"}, "messageTimestamp": 1_700_000_000},
                {"key": {"remoteJid": "5511999990000@s.whatsapp.net", "fromMe": true, "id": "OUT1"},
                 "message": {"conversation": "claro!"}, "messageTimestamp": 1_700_000_060},
                {"key": {"remoteJid": "5511999990000@s.whatsapp.net", "fromMe": false, "id": "R1"},
                 "message": {"reactionMessage": {"text": "👍"}}}
            ]}}));
        });

        let adapter = configured(&server.base_url());
        assert!(adapter.supports_history());
        let history = adapter.fetch_history("wa_5511999990000", 10).await;
        assert_eq!(history.len(), 2);
        assert_eq!(history[0].direction, leadline_channels::Direction::Inbound);
        assert_eq!(history[1].direction, leadline_channels::Direction::Outbound);
        assert!(history.iter().all(|m| m.kind() == MessageType::Text));
    }

    #[tokio::test]
    async fn status_reports_instance_state() {
        let server = MockServer::start();
        server.mock(|when, then| {
            when.method(GET).path("/instance/connectionState/sales");
            then.status(200)
                .json_body(json!({"instance": {"instanceName": "sales", "state": "close"}}));
        });

        let adapter = configured(&server.base_url());
        let status = adapter.get_status().await;
        assert!(!status.connected);
        assert_eq!(status.error.as_deref(), Some("instance state: close"));
        assert_eq!(status.details.unwrap()["state"], "close");
        assert!(!adapter.health_check().await);

        let unconfigured = WhatsAppAdapter::new().get_status().await;
        assert!(!unconfigured.connected);
    }

    #[test]
    fn recipient_normalization() {
        assert_eq!(recipient("wa_5511").unwrap(), "5511");
        assert_eq!(recipient("+5511").unwrap(), "5511");
        assert_eq!(recipient("1203@g.us").unwrap(), "1203@g.us");
        assert!(recipient("  ").is_err());
    }
}
