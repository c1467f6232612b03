//! WhatsApp channel for leadline, via a self-hosted WhatsApp bridge.

pub mod adapter;
mod client;
mod parse;
pub mod settings;

pub use adapter::WhatsAppAdapter;
pub use settings::WhatsAppSettings;
