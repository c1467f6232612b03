use serde::{Deserialize, Serialize};
use std::fmt;

/// Identifies one messaging provider integration.
///
/// This is the routing key everywhere in the channel layer: the manager holds
/// at most one adapter per variant, and every canonical message carries the
/// variant it came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ChannelType {
    WhatsApp,
    Telegram,
}

impl ChannelType {
    /// Stable lowercase name, matches the serde representation.
    pub fn as_str(&self) -> &'static str {
        match self {
            ChannelType::WhatsApp => "whatsapp",
            ChannelType::Telegram => "telegram",
        }
    }

    /// Short namespace prefix used in conversation and message ids.
    ///
    /// `wa_5511999` and `tg_5511999` never collide even when the provider-side
    /// identifiers are identical.
    pub fn id_prefix(&self) -> &'static str {
        match self {
            ChannelType::WhatsApp => "wa",
            ChannelType::Telegram => "tg",
        }
    }
}

impl fmt::Display for ChannelType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for ChannelType {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "whatsapp" => Ok(ChannelType::WhatsApp),
            "telegram" => Ok(ChannelType::Telegram),
            other => Err(format!("unknown channel type: {}", other)),
        }
    }
}
