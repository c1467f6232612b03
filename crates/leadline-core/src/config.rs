use figment::{
    providers::{Env, Format, Toml},
    Figment,
};
use serde::{Deserialize, Serialize};
use std::fmt;

use crate::types::ChannelType;

pub const DEFAULT_PORT: u16 = 18790;
pub const DEFAULT_BIND: &str = "127.0.0.1";

/// Top-level config (leadline.toml + LEADLINE_* env overrides).
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct LeadlineConfig {
    #[serde(default)]
    pub gateway: GatewayConfig,
    #[serde(default)]
    pub channels: ChannelsConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GatewayConfig {
    #[serde(default = "default_port")]
    pub port: u16,
    #[serde(default = "default_bind")]
    pub bind: String,
}

impl Default for GatewayConfig {
    fn default() -> Self {
        Self {
            port: DEFAULT_PORT,
            bind: DEFAULT_BIND.to_string(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct ChannelsConfig {
    pub whatsapp: Option<ChannelConfig>,
    pub telegram: Option<ChannelConfig>,
}

impl ChannelsConfig {
    /// Configured channels in routing-key order.
    pub fn iter(&self) -> impl Iterator<Item = (ChannelType, &ChannelConfig)> {
        [
            (ChannelType::WhatsApp, self.whatsapp.as_ref()),
            (ChannelType::Telegram, self.telegram.as_ref()),
        ]
        .into_iter()
        .filter_map(|(ty, cfg)| cfg.map(|c| (ty, c)))
    }
}

/// Provider credentials and settings for one channel.
///
/// The same shape serves every provider; each adapter picks the fields it
/// needs and rejects the config when a required one is missing. Replaced
/// wholesale on reconfiguration, never patched field by field.
#[derive(Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChannelConfig {
    /// A disabled channel stays registered but refuses all traffic.
    #[serde(default = "bool_true")]
    pub enabled: bool,
    /// Provider REST base URL, without trailing slash.
    pub api_url: Option<String>,
    /// Bridge API key, or the bot token for Telegram.
    pub api_key: Option<String>,
    /// Bridge instance name. Telegram ignores it.
    pub instance: Option<String>,
    /// Shared secret proving webhook origin.
    pub webhook_secret: Option<String>,
}

impl ChannelConfig {
    pub fn new() -> Self {
        Self {
            enabled: true,
            ..Default::default()
        }
    }

    pub fn with_api_url(mut self, url: impl Into<String>) -> Self {
        self.api_url = Some(url.into());
        self
    }

    pub fn with_api_key(mut self, key: impl Into<String>) -> Self {
        self.api_key = Some(key.into());
        self
    }

    pub fn with_instance(mut self, instance: impl Into<String>) -> Self {
        self.instance = Some(instance.into());
        self
    }

    pub fn with_webhook_secret(mut self, secret: impl Into<String>) -> Self {
        self.webhook_secret = Some(secret.into());
        self
    }

    pub fn disabled(mut self) -> Self {
        self.enabled = false;
        self
    }
}

// Credentials must never reach the logs.
impl fmt::Debug for ChannelConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ChannelConfig")
            .field("enabled", &self.enabled)
            .field("api_url", &self.api_url)
            .field("api_key", &self.api_key.as_ref().map(|_| "<redacted>"))
            .field("instance", &self.instance)
            .field(
                "webhook_secret",
                &self.webhook_secret.as_ref().map(|_| "<redacted>"),
            )
            .finish()
    }
}

fn bool_true() -> bool {
    true
}
fn default_port() -> u16 {
    DEFAULT_PORT
}
fn default_bind() -> String {
    DEFAULT_BIND.to_string()
}

impl LeadlineConfig {
    /// Load config from a TOML file with LEADLINE_* env var overrides.
    ///
    /// Path order: explicit argument, then `~/.leadline/leadline.toml`.
    /// Nested env keys use a double underscore:
    /// `LEADLINE_CHANNELS__TELEGRAM__API_KEY=...`.
    pub fn load(config_path: Option<&str>) -> crate::error::Result<Self> {
        let path = config_path
            .map(String::from)
            .unwrap_or_else(default_config_path);

        tracing::debug!(path = %path, "loading config");

        Figment::new()
            .merge(Toml::file(&path))
            .merge(Env::prefixed("LEADLINE_").split("__"))
            .extract()
            .map_err(|e| crate::error::LeadlineError::Config(e.to_string()))
    }
}

fn default_config_path() -> String {
    let home = std::env::var("HOME").unwrap_or_else(|_| ".".to_string());
    format!("{}/.leadline/leadline.toml", home)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn debug_redacts_credentials() {
        let cfg = ChannelConfig::new()
            .with_api_key("super-secret-key")
            .with_webhook_secret("hook-secret");
        let printed = format!("{:?}", cfg);
        assert!(!printed.contains("super-secret-key"));
        assert!(!printed.contains("hook-secret"));
        assert!(printed.contains("<redacted>"));
    }

    #[test]
    fn enabled_defaults_to_true() {
        let cfg: ChannelConfig = serde_json::from_str(r#"{"api_key":"k"}"#).unwrap();
        assert!(cfg.enabled);
    }

    #[test]
    fn load_merges_toml_and_env() {
        figment::Jail::expect_with(|jail| {
            jail.create_file(
                "leadline.toml",
                r#"
                [gateway]
                port = 9000

                [channels.whatsapp]
                api_url = "http://bridge.local"
                api_key = "wa-key"
                instance = "sales"
                "#,
            )?;
            jail.set_env("LEADLINE_CHANNELS__TELEGRAM__API_KEY", "123:abc");

            let cfg = LeadlineConfig::load(Some("leadline.toml")).expect("config loads");
            assert_eq!(cfg.gateway.port, 9000);
            assert_eq!(cfg.gateway.bind, DEFAULT_BIND);

            let wa = cfg.channels.whatsapp.as_ref().expect("whatsapp section");
            assert_eq!(wa.instance.as_deref(), Some("sales"));
            let tg = cfg.channels.telegram.as_ref().expect("telegram from env");
            assert_eq!(tg.api_key.as_deref(), Some("123:abc"));

            let types: Vec<_> = cfg.channels.iter().map(|(t, _)| t).collect();
            assert_eq!(types, vec![ChannelType::WhatsApp, ChannelType::Telegram]);
            Ok(())
        });
    }

    #[test]
    fn malformed_file_is_a_config_error() {
        figment::Jail::expect_with(|jail| {
            jail.create_file("leadline.toml", "[gateway\nport = ")?;
            let err = LeadlineConfig::load(Some("leadline.toml")).unwrap_err();
            assert!(matches!(err, crate::error::LeadlineError::Config(_)));
            Ok(())
        });
    }

    #[test]
    fn missing_file_yields_defaults() {
        figment::Jail::expect_with(|_jail| {
            let cfg = LeadlineConfig::load(Some("absent.toml")).expect("defaults");
            assert_eq!(cfg.gateway.port, DEFAULT_PORT);
            assert!(cfg.channels.whatsapp.is_none());
            Ok(())
        });
    }
}
