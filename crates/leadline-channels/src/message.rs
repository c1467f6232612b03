//! Canonical, provider-independent message model.
//!
//! Every adapter normalizes its wire format onto these types, and everything
//! downstream of the channel layer (persistence, AI triggers, notifications)
//! consumes only these types.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::fmt;

use leadline_core::ChannelType;

use crate::error::ChannelError;

/// Error text used when a send is routed to a channel with no adapter.
pub const CHANNEL_UNAVAILABLE: &str = "channel unavailable";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Direction {
    Inbound,
    Outbound,
}

/// Discriminant of [`MessageContent`], for callers that only need the kind.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MessageType {
    Text,
    Image,
    Video,
    Audio,
    Document,
    Sticker,
    Location,
    Contact,
}

impl MessageType {
    pub fn as_str(&self) -> &'static str {
        match self {
            MessageType::Text => "text",
            MessageType::Image => "image",
            MessageType::Video => "video",
            MessageType::Audio => "audio",
            MessageType::Document => "document",
            MessageType::Sticker => "sticker",
            MessageType::Location => "location",
            MessageType::Contact => "contact",
        }
    }
}

impl fmt::Display for MessageType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A media attachment. `media_url` stays unset when the provider could not
/// resolve a fetchable URL; the message is still emitted.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Media {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub media_url: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub mime_type: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub caption: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub file_name: Option<String>,
}

/// Type-specific payload. The variant *is* the message type, so a message can
/// never carry fields that belong to another type.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", content = "content", rename_all = "lowercase")]
pub enum MessageContent {
    Text {
        text: String,
    },
    Image(Media),
    Video(Media),
    Audio(Media),
    Document(Media),
    Sticker(Media),
    Location {
        latitude: f64,
        longitude: f64,
        #[serde(skip_serializing_if = "Option::is_none")]
        name: Option<String>,
        #[serde(skip_serializing_if = "Option::is_none")]
        address: Option<String>,
    },
    Contact {
        name: String,
        #[serde(skip_serializing_if = "Option::is_none")]
        phone: Option<String>,
        #[serde(skip_serializing_if = "Option::is_none")]
        vcard: Option<String>,
    },
}

impl MessageContent {
    pub fn text(text: impl Into<String>) -> Self {
        MessageContent::Text { text: text.into() }
    }

    pub fn kind(&self) -> MessageType {
        match self {
            MessageContent::Text { .. } => MessageType::Text,
            MessageContent::Image(_) => MessageType::Image,
            MessageContent::Video(_) => MessageType::Video,
            MessageContent::Audio(_) => MessageType::Audio,
            MessageContent::Document(_) => MessageType::Document,
            MessageContent::Sticker(_) => MessageType::Sticker,
            MessageContent::Location { .. } => MessageType::Location,
            MessageContent::Contact { .. } => MessageType::Contact,
        }
    }

    /// The attachment, for media kinds.
    pub fn media(&self) -> Option<&Media> {
        match self {
            MessageContent::Image(m)
            | MessageContent::Video(m)
            | MessageContent::Audio(m)
            | MessageContent::Document(m)
            | MessageContent::Sticker(m) => Some(m),
            _ => None,
        }
    }

    pub fn as_text(&self) -> Option<&str> {
        match self {
            MessageContent::Text { text } => Some(text),
            _ => None,
        }
    }
}

/// Delivery state, on a vocabulary shared by every provider.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MessageStatus {
    Sending,
    Sent,
    Delivered,
    Read,
    Failed,
}

impl MessageStatus {
    /// Map a WhatsApp-bridge ack string onto the shared vocabulary.
    ///
    /// Unknown acks return `None` so the caller picks its own default.
    pub fn from_bridge_ack(ack: &str) -> Option<Self> {
        match ack.to_ascii_uppercase().as_str() {
            "PENDING" => Some(MessageStatus::Sending),
            "SERVER_ACK" => Some(MessageStatus::Sent),
            "DELIVERY_ACK" => Some(MessageStatus::Delivered),
            "READ" | "PLAYED" => Some(MessageStatus::Read),
            "ERROR" => Some(MessageStatus::Failed),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Sender {
    pub id: String,
    pub name: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub avatar_url: Option<String>,
}

impl Sender {
    pub fn new(id: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
            avatar_url: None,
        }
    }
}

/// The canonical message every adapter produces or consumes.
///
/// Treat as read-only once built. `external_id` is the idempotency key for
/// persistence; `id` is stable across redeliveries only while the provider
/// supplies a timestamp.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Message {
    pub id: String,
    pub external_id: String,
    pub conversation_id: String,
    pub channel: ChannelType,
    pub direction: Direction,
    #[serde(flatten)]
    pub content: MessageContent,
    pub status: MessageStatus,
    pub sender: Sender,
    pub timestamp: DateTime<Utc>,
    #[serde(default)]
    pub metadata: Map<String, Value>,
}

impl Message {
    /// Build a message with derived `id` and `conversation_id`.
    ///
    /// Inbound messages start as `delivered`; outbound ones as `sent`.
    pub fn new(
        channel: ChannelType,
        direction: Direction,
        external_id: impl Into<String>,
        contact: &str,
        content: MessageContent,
        sender: Sender,
        timestamp: DateTime<Utc>,
    ) -> Self {
        let external_id = external_id.into();
        let status = match direction {
            Direction::Inbound => MessageStatus::Delivered,
            Direction::Outbound => MessageStatus::Sent,
        };
        Self {
            id: message_id(channel, &external_id, timestamp),
            conversation_id: conversation_id(channel, contact),
            external_id,
            channel,
            direction,
            content,
            status,
            sender,
            timestamp,
            metadata: Map::new(),
        }
    }

    pub fn with_status(mut self, status: MessageStatus) -> Self {
        self.status = status;
        self
    }

    pub fn with_metadata(mut self, metadata: Map<String, Value>) -> Self {
        self.metadata = metadata;
        self
    }

    pub fn kind(&self) -> MessageType {
        self.content.kind()
    }
}

/// Local message id: `{prefix}_{external_id}_{unix_millis}`.
pub fn message_id(channel: ChannelType, external_id: &str, at: DateTime<Utc>) -> String {
    format!(
        "{}_{}_{}",
        channel.id_prefix(),
        external_id,
        at.timestamp_millis()
    )
}

/// Per-contact thread key, namespaced by channel.
pub fn conversation_id(channel: ChannelType, contact: &str) -> String {
    format!("{}_{}", channel.id_prefix(), contact)
}

/// Strip this channel's namespace from a recipient, if present.
///
/// Lets callers address a send with either a bare provider id or the
/// canonical conversation id they got from an inbound message.
pub fn strip_conversation_prefix(channel: ChannelType, to: &str) -> &str {
    let to = to.trim();
    to.strip_prefix(channel.id_prefix())
        .and_then(|rest| rest.strip_prefix('_'))
        .unwrap_or(to)
}

/// Media kinds that can be sent outbound.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OutboundMessageKind {
    Image,
    Document,
    Audio,
    Video,
}

/// Media attached to an outbound send.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OutboundMedia {
    /// Publicly fetchable URL of the file.
    pub url: String,
    pub mime_type: Option<String>,
    pub caption: Option<String>,
    pub file_name: Option<String>,
}

impl OutboundMedia {
    pub fn new(url: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            ..Default::default()
        }
    }

    pub fn with_caption(mut self, caption: impl Into<String>) -> Self {
        self.caption = Some(caption.into());
        self
    }

    pub fn with_file_name(mut self, name: impl Into<String>) -> Self {
        self.file_name = Some(name.into());
        self
    }

    pub fn with_mime_type(mut self, mime: impl Into<String>) -> Self {
        self.mime_type = Some(mime.into());
        self
    }
}

/// Outcome of any outbound send.
///
/// Build through [`SendResult::sent`] or [`SendResult::failed`]: a successful
/// result never carries an error and a failed one always does.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SendResult {
    pub success: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub external_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    pub timestamp: DateTime<Utc>,
}

impl SendResult {
    pub fn sent(channel: ChannelType, external_id: Option<String>) -> Self {
        let timestamp = Utc::now();
        Self {
            success: true,
            message_id: external_id
                .as_deref()
                .map(|ext| message_id(channel, ext, timestamp)),
            external_id,
            error: None,
            timestamp,
        }
    }

    pub fn failed(error: impl Into<String>) -> Self {
        let mut error = error.into();
        if error.is_empty() {
            error = "unknown error".to_string();
        }
        Self {
            success: false,
            message_id: None,
            external_id: None,
            error: Some(error),
            timestamp: Utc::now(),
        }
    }

    pub fn from_error(err: &ChannelError) -> Self {
        Self::failed(err.to_string())
    }

    /// Result for a send routed to a channel with no registered adapter.
    pub fn unavailable() -> Self {
        Self::failed(CHANNEL_UNAVAILABLE)
    }

    /// Collapse an adapter's internal send outcome (provider message id or
    /// error) into the uniform result.
    pub fn from_outcome(
        channel: ChannelType,
        outcome: crate::error::Result<Option<String>>,
    ) -> Self {
        match outcome {
            Ok(external_id) => Self::sent(channel, external_id),
            Err(e) => Self::from_error(&e),
        }
    }
}

/// Health snapshot of one channel.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChannelStatus {
    pub connected: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub details: Option<Value>,
}

impl ChannelStatus {
    pub fn connected(details: Option<Value>) -> Self {
        Self {
            connected: true,
            error: None,
            details,
        }
    }

    pub fn disconnected(error: impl Into<String>) -> Self {
        Self {
            connected: false,
            error: Some(error.into()),
            details: None,
        }
    }

    pub fn with_details(mut self, details: Value) -> Self {
        self.details = Some(details);
        self
    }
}
