use async_trait::async_trait;

use leadline_core::{ChannelConfig, ChannelType};

use crate::{
    error::ChannelError,
    message::{ChannelStatus, Message, OutboundMessageKind, OutboundMedia, SendResult},
    webhook::WebhookPayload,
};

/// Common interface implemented by every provider integration (WhatsApp
/// bridge, Telegram, ...).
///
/// Implementations must be `Send + Sync` so the [`ChannelManager`](crate::manager::ChannelManager)
/// can hold them as `Arc<dyn ChannelAdapter>` and drive them from concurrent
/// webhook requests. All methods take `&self`; the only mutable state an
/// adapter has is its config, swapped wholesale by [`configure`](Self::configure).
#[async_trait]
pub trait ChannelAdapter: Send + Sync {
    /// The routing key this adapter serves.
    fn channel_type(&self) -> ChannelType;

    /// Store credentials, replacing any previous config. Never touches the network.
    fn configure(&self, config: ChannelConfig) -> Result<(), ChannelError>;

    /// Live credential check. Any failure is `false`, never an error.
    async fn validate_config(&self, config: &ChannelConfig) -> bool;

    /// Proof-of-origin gate. Missing or ambiguous proof is `false`.
    fn verify_webhook(&self, payload: &WebhookPayload, signature: Option<&str>) -> bool;

    /// Translate a provider callback into a canonical message.
    ///
    /// `None` is the normal answer for events that carry nothing to process
    /// (status updates, echoes of our own sends, bot messages, unsupported
    /// kinds).
    async fn parse_webhook(&self, payload: &WebhookPayload) -> Option<Message>;

    async fn send_text(&self, to: &str, text: &str) -> SendResult;

    async fn send_image(&self, to: &str, media: &OutboundMedia) -> SendResult;

    async fn send_document(&self, to: &str, media: &OutboundMedia) -> SendResult;

    async fn send_audio(&self, to: &str, media: &OutboundMedia) -> SendResult;

    async fn send_video(&self, to: &str, media: &OutboundMedia) -> SendResult;

    /// Route a media send by kind. Text goes through [`send_text`](Self::send_text).
    async fn send_media(&self, kind: OutboundMessageKind, to: &str, media: &OutboundMedia) -> SendResult {
        match kind {
            OutboundMessageKind::Image => self.send_image(to, media).await,
            OutboundMessageKind::Document => self.send_document(to, media).await,
            OutboundMessageKind::Audio => self.send_audio(to, media).await,
            OutboundMessageKind::Video => self.send_video(to, media).await,
        }
    }

    /// Whether [`fetch_history`](Self::fetch_history) does anything.
    fn supports_history(&self) -> bool {
        false
    }

    /// Bulk backfill of one contact's thread. Providers without a history
    /// endpoint return an empty list.
    async fn fetch_history(&self, _contact_id: &str, _limit: usize) -> Vec<Message> {
        Vec::new()
    }

    async fn health_check(&self) -> bool;

    async fn get_status(&self) -> ChannelStatus;
}
