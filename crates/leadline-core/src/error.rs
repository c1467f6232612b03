use thiserror::Error;

#[derive(Debug, Error)]
pub enum LeadlineError {
    /// The config file or `LEADLINE_*` environment could not be read into
    /// a [`LeadlineConfig`](crate::config::LeadlineConfig).
    #[error("Configuration error: {0}")]
    Config(String),
}

pub type Result<T> = std::result::Result<T, LeadlineError>;
