mod server;

use anyhow::Result;
use clap::Parser;
use tracing::info;

use podtail_core::{config::load_config, logging, source::build_provider};

use server::RelayServer;

#[derive(Parser, Debug)]
#[command(name = "podtail")]
#[command(about = "Relay pod logs to WebSocket viewers", long_about = None)]
struct Args {
    /// Configuration file (YAML, TOML or JSON)
    #[arg(long, short = 'c')]
    config: Option<String>,
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    // 1. Load and validate configuration
    let config = load_config(args.config.as_deref())?;

    // 2. Initialize logging
    logging::init_logging(&config.logging)?;
    info!("podtail relay starting...");
    info!("HTTP address: {}", config.http_address());

    // 3. Build the log source provider
    let provider = build_provider(&config.source).await?;

    // 4. Serve until a shutdown signal arrives
    RelayServer::new(config, provider).start().await
}
