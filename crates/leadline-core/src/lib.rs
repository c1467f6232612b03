pub mod config;
pub mod error;
pub mod types;

pub use config::{ChannelConfig, ChannelsConfig, GatewayConfig, LeadlineConfig};
pub use error::{LeadlineError, Result};
pub use types::ChannelType;
