use std::net::SocketAddr;
use std::sync::Arc;

use clap::Parser;
use tracing::{info, warn};

use leadline_channels::{ChannelAdapter, ChannelManager, ChannelType};
use leadline_core::LeadlineConfig;
use leadline_telegram::TelegramAdapter;
use leadline_whatsapp::WhatsAppAdapter;

mod app;
mod http;

/// Channel gateway: provider webhooks in, normalized messages out.
#[derive(Debug, Parser)]
#[command(name = "leadline-gateway", version)]
struct Args {
    /// Path to leadline.toml (default: $LEADLINE_CONFIG, then ~/.leadline/leadline.toml).
    #[arg(long)]
    config: Option<String>,
    /// Override gateway.bind.
    #[arg(long)]
    bind: Option<String>,
    /// Override gateway.port.
    #[arg(long)]
    port: Option<u16>,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| {
                "leadline_gateway=info,leadline_channels=info,tower_http=debug".into()
            }),
        )
        .init();

    let args = Args::parse();

    // config: --config > LEADLINE_CONFIG env > ~/.leadline/leadline.toml
    let config_path = args
        .config
        .clone()
        .or_else(|| std::env::var("LEADLINE_CONFIG").ok());
    let config = LeadlineConfig::load(config_path.as_deref()).unwrap_or_else(|e| {
        warn!("Config load failed ({}), using defaults", e);
        LeadlineConfig::default()
    });

    let bind = args.bind.unwrap_or_else(|| config.gateway.bind.clone());
    let port = args.port.unwrap_or(config.gateway.port);

    let http = reqwest::Client::new();
    let manager = Arc::new(ChannelManager::new());
    app::register_log_subscriber(&manager);

    for (channel, channel_cfg) in config.channels.iter() {
        let adapter: Arc<dyn ChannelAdapter> = match channel {
            ChannelType::WhatsApp => Arc::new(WhatsAppAdapter::with_client(http.clone())),
            ChannelType::Telegram => Arc::new(TelegramAdapter::with_client(http.clone())),
        };
        manager.register_adapter(adapter);
        if manager.configure_channel(channel, channel_cfg.clone()).await {
            info!(channel = %channel, enabled = channel_cfg.enabled, "channel ready");
        } else {
            // Stays registered so webhooks and sends fail softly until fixed.
            warn!(channel = %channel, "channel config rejected, channel is inert");
        }
    }
    if manager.channels().is_empty() {
        warn!("no channels configured; only /health will be useful");
    }

    let router = app::build_router(Arc::new(app::AppState::new(manager)));

    let addr: SocketAddr = format!("{}:{}", bind, port).parse()?;
    info!("Leadline gateway listening on {}", addr);

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, router).await?;
    Ok(())
}
