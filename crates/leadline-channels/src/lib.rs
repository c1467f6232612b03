pub mod adapter;
pub mod config_slot;
pub mod error;
pub mod events;
pub mod manager;
pub mod message;
pub mod webhook;

pub use adapter::ChannelAdapter;
pub use config_slot::ConfigSlot;
pub use error::ChannelError;
pub use events::{ChannelEvent, EmitReport, EventBus, EventHandler, QueueSubscriber, SubscriberError};
pub use manager::ChannelManager;
pub use message::{
    ChannelStatus, Direction, Media, Message, MessageContent, MessageStatus, MessageType,
    OutboundMedia, OutboundMessageKind, SendResult, Sender,
};
pub use webhook::WebhookPayload;

pub use leadline_core::{ChannelConfig, ChannelType};
