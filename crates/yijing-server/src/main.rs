//! WebSocket hub server for the divination service.

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::Context;
use clap::Parser;
use tracing_subscriber::EnvFilter;

use yijing_server::config::Config;
use yijing_server::divination::DailyOracle;
use yijing_server::server;

#[derive(Debug, Parser)]
#[command(name = "yijing-server", version, about = "Divination hub: generic and bot WebSocket transports")]
struct Cli {
    /// Path to the JSON config file (created with defaults if missing).
    #[arg(short, long, default_value = "config.json")]
    config: PathBuf,

    /// Override the listening port.
    #[arg(short, long)]
    port: Option<u16>,

    /// Enable debug logging.
    #[arg(long)]
    debug: bool,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let default_level = if cli.debug { "debug" } else { "info" };
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level)),
        )
        .init();

    let mut config = Config::load_or_create(&cli.config)
        .with_context(|| format!("loading {}", cli.config.display()))?;
    if let Some(port) = cli.port {
        config.server.port = port;
        config.validate().context("invalid --port")?;
    }

    tracing::info!(
        bind_addr = %config.server.bind_addr,
        port = config.server.port,
        self_id = config.onebot.self_id,
        "starting yijing-server"
    );

    let oracle = Arc::new(DailyOracle::new(config.public_url()));
    server::run(config, oracle).await
}
