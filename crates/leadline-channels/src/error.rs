use thiserror::Error;

/// Errors that can occur inside any channel adapter.
///
/// These never cross the public channel API: the manager and the adapter
/// contract report through `bool`, `Option<Message>` and `SendResult`, and
/// this type is what adapters convert from.
#[derive(Debug, Error)]
pub enum ChannelError {
    /// The provider could not be reached, or the response body was unreadable.
    #[error("Transport error: {0}")]
    Transport(String),

    /// The provider answered with an error of its own (rate limit, bad recipient, ...).
    #[error("Provider API error ({status}): {message}")]
    Api { status: u16, message: String },

    /// A provider payload did not have the expected shape.
    #[error("Parse error: {0}")]
    Parse(String),

    /// The channel-specific configuration is invalid or missing.
    #[error("Configuration error: {0}")]
    Config(String),

    /// The adapter has not been configured yet.
    #[error("channel not configured")]
    NotConfigured,

    /// The adapter is configured with `enabled = false`.
    #[error("channel disabled")]
    Disabled,
}

impl From<reqwest::Error> for ChannelError {
    fn from(e: reqwest::Error) -> Self {
        // Request URLs can carry credentials (Telegram puts the bot token in
        // the path), and this message ends up in SendResult and ChannelStatus.
        let e = e.without_url();
        if e.is_decode() {
            ChannelError::Parse(e.to_string())
        } else {
            ChannelError::Transport(e.to_string())
        }
    }
}

impl From<serde_json::Error> for ChannelError {
    fn from(e: serde_json::Error) -> Self {
        ChannelError::Parse(e.to_string())
    }
}

pub type Result<T> = std::result::Result<T, ChannelError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn transport_error_drops_request_url() {
        let err = reqwest::Client::new()
            .get("http://127.0.0.1:9/bot123:SECRET_TOKEN/getMe")
            .send()
            .await
            .unwrap_err();
        let converted = ChannelError::from(err);
        assert!(matches!(converted, ChannelError::Transport(_)));
        let text = converted.to_string();
        assert!(!text.contains("SECRET_TOKEN"), "{text}");
        assert!(!text.contains("/bot123"), "{text}");
    }
}
