//! Telegram channel for leadline, over the Bot API.

pub mod adapter;
mod client;
mod parse;
pub mod settings;
mod wire;

pub use adapter::TelegramAdapter;
pub use settings::TelegramSettings;
