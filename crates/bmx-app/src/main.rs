//! bmx-viewer: headless live order book / trade tape viewer.

use anyhow::Result;
use bmx_app::{AppConfig, Application};
use clap::Parser;
use tracing::info;

/// Live BitMEX order book / trade tape viewer
#[derive(Parser, Debug)]
#[command(version, about, long_about = None)]
struct Args {
    /// Configuration file path (can also be set via BMX_CONFIG env var)
    #[arg(short, long)]
    config: Option<String>,

    /// Topic to follow, e.g. orderBookL2:XBTUSD or trade:XBTUSD
    #[arg(short, long)]
    topic: Option<String>,

    /// WebSocket endpoint
    #[arg(short, long)]
    url: Option<String>,
}

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize TLS crypto provider (must be before any WS connections)
    bmx_ws::init_crypto();

    let args = Args::parse();

    bmx_telemetry::init_logging()?;

    info!("Starting bmx-viewer v{}", env!("CARGO_PKG_VERSION"));

    // Config path: CLI arg > BMX_CONFIG env var > default
    let config_path = args
        .config
        .or_else(|| std::env::var("BMX_CONFIG").ok())
        .unwrap_or_else(|| "config/default.toml".to_string());

    info!(config_path = %config_path, "Loading configuration");

    let config = AppConfig::load(&config_path)?.with_overrides(args.url, args.topic)?;
    info!(url = %config.websocket.url, topic = %config.feed.topic, "Configuration loaded");

    let app = Application::new(config)?;
    app.run().await?;

    Ok(())
}
