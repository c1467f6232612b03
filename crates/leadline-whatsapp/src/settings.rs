use leadline_channels::config_slot::required;
use leadline_channels::error::Result;
use leadline_core::ChannelConfig;

/// Typed view of a [`ChannelConfig`] for the WhatsApp bridge.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WhatsAppSettings {
    /// Bridge base URL, no trailing slash.
    pub api_url: String,
    /// Sent in the `apikey` header on every bridge call.
    pub api_key: String,
    /// Bridge instance this adapter governs; webhooks naming another
    /// instance are rejected.
    pub instance: String,
    pub webhook_secret: Option<String>,
}

impl WhatsAppSettings {
    /// Every field except the webhook secret is required.
    pub fn from_config(config: &ChannelConfig) -> Result<Self> {
        Ok(Self {
            api_url: required(&config.api_url, "api_url")?
                .trim_end_matches('/')
                .to_string(),
            api_key: required(&config.api_key, "api_key")?.to_string(),
            instance: required(&config.instance, "instance")?.to_string(),
            webhook_secret: config
                .webhook_secret
                .as_deref()
                .map(str::trim)
                .filter(|s| !s.is_empty())
                .map(String::from),
        })
    }

    /// `{api_url}/{path}/{instance}`, the bridge's per-instance route shape.
    pub fn endpoint(&self, path: &str) -> String {
        format!("{}/{}/{}", self.api_url, path, self.instance)
    }
}
