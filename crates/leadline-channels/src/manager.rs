use std::collections::BTreeMap;
use std::sync::Arc;

use dashmap::DashMap;
use tracing::{debug, info, warn};

use leadline_core::{ChannelConfig, ChannelType};

use crate::{
    adapter::ChannelAdapter,
    events::{ChannelEvent, EmitReport, EventBus, EventHandler, SubscriberError},
    message::{ChannelStatus, Message, OutboundMedia, OutboundMessageKind, SendResult},
    webhook::WebhookPayload,
};

/// History page size when the caller does not pick one.
pub const DEFAULT_HISTORY_LIMIT: usize = 50;

struct RegistryEntry {
    adapter: Arc<dyn ChannelAdapter>,
    /// `None` until `configure_channel` succeeds.
    config: Option<ChannelConfig>,
}

/// Registry and router for every channel adapter.
///
/// The only entry point downstream code uses for channel traffic: webhooks
/// come in through [`handle_webhook`](Self::handle_webhook), sends go out
/// through the `send_*` methods, and normalized inbound messages are
/// republished to subscribers as `message.received`.
///
/// Construct one per process and share it as `Arc<ChannelManager>`. The
/// registry is read on every request and written only on (re)configuration.
/// Every operation degrades to `false`, `None` or a failed [`SendResult`];
/// nothing here returns an error.
pub struct ChannelManager {
    registry: DashMap<ChannelType, RegistryEntry>,
    events: EventBus,
}

impl ChannelManager {
    /// Create an empty manager with no registered channels.
    pub fn new() -> Self {
        Self {
            registry: DashMap::new(),
            events: EventBus::new(),
        }
    }

    // ── Registry ─────────────────────────────────────────────────────────────

    /// Register an adapter under its own channel type.
    ///
    /// An adapter already registered for that type is replaced, config and
    /// all, and handed back to the caller.
    pub fn register_adapter(
        &self,
        adapter: Arc<dyn ChannelAdapter>,
    ) -> Option<Arc<dyn ChannelAdapter>> {
        let channel = adapter.channel_type();
        info!(channel = %channel, "registering channel adapter");
        self.registry
            .insert(
                channel,
                RegistryEntry {
                    adapter,
                    config: None,
                },
            )
            .map(|old| old.adapter)
    }

    /// Drop the adapter and its config together. Returns false if nothing
    /// was registered.
    pub fn unregister_adapter(&self, channel: ChannelType) -> bool {
        let removed = self.registry.remove(&channel).is_some();
        if removed {
            info!(channel = %channel, "channel adapter unregistered");
        }
        removed
    }

    /// Validate `config` against the live provider, then install it.
    ///
    /// A disabled config is installed without a live check; the adapter then
    /// refuses all traffic until reconfigured.
    pub async fn configure_channel(&self, channel: ChannelType, config: ChannelConfig) -> bool {
        let Some(adapter) = self.adapter(channel) else {
            warn!(channel = %channel, "configure requested for unregistered channel");
            return false;
        };

        if config.enabled && !adapter.validate_config(&config).await {
            warn!(channel = %channel, "channel config failed validation");
            return false;
        }

        let Some(mut entry) = self.registry.get_mut(&channel) else {
            warn!(channel = %channel, "channel unregistered while validating config");
            return false;
        };
        if !Arc::ptr_eq(&entry.adapter, &adapter) {
            warn!(channel = %channel, "channel adapter replaced while validating config");
            return false;
        }
        if let Err(e) = entry.adapter.configure(config.clone()) {
            warn!(channel = %channel, error = %e, "adapter rejected config");
            return false;
        }
        info!(channel = %channel, enabled = config.enabled, "channel configured");
        entry.config = Some(config);
        true
    }

    /// Registered channel types, sorted.
    pub fn channels(&self) -> Vec<ChannelType> {
        let mut out: Vec<ChannelType> = self.registry.iter().map(|e| *e.key()).collect();
        out.sort();
        out
    }

    pub fn is_registered(&self, channel: ChannelType) -> bool {
        self.registry.contains_key(&channel)
    }

    pub fn is_configured(&self, channel: ChannelType) -> bool {
        self.registry
            .get(&channel)
            .is_some_and(|e| e.config.is_some())
    }

    /// The config last installed for `channel`, if any.
    pub fn config(&self, channel: ChannelType) -> Option<ChannelConfig> {
        self.registry.get(&channel).and_then(|e| e.config.clone())
    }

    // ── Inbound ──────────────────────────────────────────────────────────────

    /// Verify and normalize one provider callback.
    ///
    /// On a processable message, `message.received` is emitted to every
    /// subscriber before the message is returned. Subscriber failures never
    /// affect the return value.
    pub async fn handle_webhook(
        &self,
        channel: ChannelType,
        raw: &[u8],
        signature: Option<&str>,
    ) -> Option<Message> {
        let payload = match WebhookPayload::from_bytes(raw) {
            Ok(p) => p,
            Err(e) => {
                warn!(channel = %channel, error = %e, bytes = raw.len(), "webhook body is not JSON");
                return None;
            }
        };
        self.handle_webhook_payload(channel, &payload, signature).await
    }

    /// Same as [`handle_webhook`](Self::handle_webhook), for an already-parsed payload.
    pub async fn handle_webhook_payload(
        &self,
        channel: ChannelType,
        payload: &WebhookPayload,
        signature: Option<&str>,
    ) -> Option<Message> {
        let Some(adapter) = self.adapter(channel) else {
            warn!(channel = %channel, "webhook for unregistered channel");
            return None;
        };

        if !adapter.verify_webhook(payload, signature) {
            warn!(channel = %channel, "webhook failed authenticity check");
            return None;
        }

        let Some(message) = adapter.parse_webhook(payload).await else {
            debug!(channel = %channel, "webhook carried no processable message");
            return None;
        };

        info!(
            channel = %channel,
            external_id = %message.external_id,
            conversation_id = %message.conversation_id,
            kind = %message.kind(),
            "inbound message normalized"
        );

        let event = ChannelEvent::MessageReceived(message);
        let report = self.events.emit(&event);
        if report.failed > 0 {
            warn!(
                channel = %channel,
                delivered = report.delivered,
                failed = report.failed,
                "some subscribers failed on message.received"
            );
        }
        Some(event.into_message())
    }

    // ── Outbound ─────────────────────────────────────────────────────────────

    pub async fn send_text(&self, channel: ChannelType, to: &str, text: &str) -> SendResult {
        let Some(adapter) = self.adapter(channel) else {
            return unavailable(channel, "text");
        };
        let result = adapter.send_text(to, text).await;
        log_send(channel, "text", &result);
        result
    }

    pub async fn send_image(&self, channel: ChannelType, to: &str, media: &OutboundMedia) -> SendResult {
        self.send_media(channel, OutboundMessageKind::Image, to, media).await
    }

    pub async fn send_document(&self, channel: ChannelType, to: &str, media: &OutboundMedia) -> SendResult {
        self.send_media(channel, OutboundMessageKind::Document, to, media).await
    }

    pub async fn send_audio(&self, channel: ChannelType, to: &str, media: &OutboundMedia) -> SendResult {
        self.send_media(channel, OutboundMessageKind::Audio, to, media).await
    }

    pub async fn send_video(&self, channel: ChannelType, to: &str, media: &OutboundMedia) -> SendResult {
        self.send_media(channel, OutboundMessageKind::Video, to, media).await
    }

    /// Route a media send by kind.
    pub async fn send_media(
        &self,
        channel: ChannelType,
        kind: OutboundMessageKind,
        to: &str,
        media: &OutboundMedia,
    ) -> SendResult {
        let label = kind_label(kind);
        let Some(adapter) = self.adapter(channel) else {
            return unavailable(channel, label);
        };
        let result = adapter.send_media(kind, to, media).await;
        log_send(channel, label, &result);
        result
    }

    /// Backfill one contact's thread. Empty when the channel is missing or
    /// its provider has no history endpoint.
    pub async fn import_history(
        &self,
        channel: ChannelType,
        contact_id: &str,
        limit: Option<usize>,
    ) -> Vec<Message> {
        let Some(adapter) = self.adapter(channel) else {
            warn!(channel = %channel, "history import for unregistered channel");
            return Vec::new();
        };
        if !adapter.supports_history() {
            debug!(channel = %channel, "channel has no history capability");
            return Vec::new();
        }
        let messages = adapter
            .fetch_history(contact_id, limit.unwrap_or(DEFAULT_HISTORY_LIMIT))
            .await;
        info!(channel = %channel, count = messages.len(), "history imported");
        messages
    }

    // ── Status ───────────────────────────────────────────────────────────────

    /// Poll every registered adapter concurrently.
    ///
    /// Each status check runs on its own task, so a panicking adapter turns into a
    /// `connected: false` entry instead of aborting the sweep.
    pub async fn get_status(&self) -> BTreeMap<ChannelType, ChannelStatus> {
        let adapters: Vec<(ChannelType, Arc<dyn ChannelAdapter>)> = self
            .registry
            .iter()
            .map(|e| (*e.key(), Arc::clone(&e.adapter)))
            .collect();

        let checks: Vec<_> = adapters
            .into_iter()
            .map(|(channel, adapter)| {
                (
                    channel,
                    tokio::spawn(async move { adapter.get_status().await }),
                )
            })
            .collect();

        let mut out = BTreeMap::new();
        for (channel, check) in checks {
            let status = match check.await {
                Ok(status) => status,
                Err(e) => {
                    warn!(channel = %channel, error = %e, "status check failed");
                    ChannelStatus::disconnected(format!("status check failed: {}", e))
                }
            };
            out.insert(channel, status);
        }
        out
    }

    // ── Events ───────────────────────────────────────────────────────────────

    /// Subscribe to channel events. Same-named subscribers are replaced.
    pub fn on_event(&self, name: impl Into<String>, handler: Arc<dyn EventHandler>) {
        self.events.subscribe(name, handler);
    }

    /// Closure form of [`on_event`](Self::on_event).
    pub fn on_event_fn<F>(&self, name: impl Into<String>, f: F)
    where
        F: Fn(&ChannelEvent) -> Result<(), SubscriberError> + Send + Sync + 'static,
    {
        self.events.subscribe_fn(name, f);
    }

    pub fn off_event(&self, name: &str) -> bool {
        self.events.unsubscribe(name)
    }

    /// Publish an event directly, for callers that build messages themselves.
    pub fn emit(&self, event: &ChannelEvent) -> EmitReport {
        self.events.emit(event)
    }

    // ── Internal helpers ─────────────────────────────────────────────────────

    /// Clone the adapter handle out of the map. The map guard must not be
    /// held across an await.
    fn adapter(&self, channel: ChannelType) -> Option<Arc<dyn ChannelAdapter>> {
        self.registry.get(&channel).map(|e| Arc::clone(&e.adapter))
    }
}

impl Default for ChannelManager {
    fn default() -> Self {
        Self::new()
    }
}

fn kind_label(kind: OutboundMessageKind) -> &'static str {
    match kind {
        OutboundMessageKind::Image => "image",
        OutboundMessageKind::Document => "document",
        OutboundMessageKind::Audio => "audio",
        OutboundMessageKind::Video => "video",
    }
}

fn unavailable(channel: ChannelType, kind: &str) -> SendResult {
    warn!(channel = %channel, kind, "send to unregistered channel");
    SendResult::unavailable()
}

fn log_send(channel: ChannelType, kind: &str, result: &SendResult) {
    if result.success {
        info!(
            channel = %channel,
            kind,
            external_id = result.external_id.as_deref().unwrap_or(""),
            "message sent"
        );
    } else {
        warn!(
            channel = %channel,
            kind,
            error = result.error.as_deref().unwrap_or(""),
            "send failed"
        );
    }
}
