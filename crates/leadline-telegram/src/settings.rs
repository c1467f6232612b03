use leadline_channels::config_slot::required;
use leadline_channels::error::Result;
use leadline_core::ChannelConfig;

pub const DEFAULT_API_URL: &str = "https://api.telegram.org";

/// Typed view of a [`ChannelConfig`] for the Telegram Bot API.
#[derive(Clone, PartialEq, Eq)]
pub struct TelegramSettings {
    /// Bot API base URL, no trailing slash.
    pub api_url: String,
    /// Bot token from @BotFather. Travels in the URL path, never in a header.
    pub token: String,
    /// Expected `X-Telegram-Bot-Api-Secret-Token` value, as registered with `setWebhook`.
    pub webhook_secret: Option<String>,
}

impl TelegramSettings {
    /// The token (`api_key`) is the only required field.
    pub fn from_config(config: &ChannelConfig) -> Result<Self> {
        let api_url = config
            .api_url
            .as_deref()
            .map(str::trim)
            .filter(|u| !u.is_empty())
            .unwrap_or(DEFAULT_API_URL)
            .trim_end_matches('/')
            .to_string();
        Ok(Self {
            api_url,
            token: required(&config.api_key, "api_key")?.to_string(),
            webhook_secret: config
                .webhook_secret
                .as_deref()
                .map(str::trim)
                .filter(|s| !s.is_empty())
                .map(String::from),
        })
    }

    /// `{api_url}/bot{token}/{method}`.
    pub fn method_url(&self, method: &str) -> String {
        format!("{}/bot{}/{}", self.api_url, self.token, method)
    }

    /// Download URL for a `file_path` returned by `getFile`.
    pub fn file_url(&self, file_path: &str) -> String {
        format!("{}/file/bot{}/{}", self.api_url, self.token, file_path)
    }
}

impl std::fmt::Debug for TelegramSettings {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TelegramSettings")
            .field("api_url", &self.api_url)
            .field("token", &"<redacted>")
            .field(
                "webhook_secret",
                &self.webhook_secret.as_ref().map(|_| "<redacted>"),
            )
            .finish()
    }
}
