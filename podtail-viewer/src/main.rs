use anyhow::Result;
use clap::Parser;
use tracing::info;

use podtail_core::{logging, shutdown::shutdown_signal};
use podtail_viewer::ViewerConfig;

#[tokio::main]
async fn main() -> Result<()> {
    let config = ViewerConfig::parse();

    // Diagnostics go to stderr; stdout carries only log payload
    logging::init_logging(&config.logging())?;

    let exit = podtail_viewer::run(&config, tokio::io::stdout(), shutdown_signal()).await?;
    info!(exit = %exit, "Viewer finished");

    if !exit.is_success() {
        anyhow::bail!("{exit}");
    }
    Ok(())
}
