//! Speed-Limit Sign Watch - Demo Entry Point
//!
//! Runs the full watch loop on synthetic frames with model-free
//! capabilities and prints presentation events as JSON lines.

use std::path::PathBuf;

use clap::Parser;
use perception::Capabilities;
use sign_watch::{init_logging, init_metrics, run, PresentationEvent, WatchConfig};
use tokio::sync::mpsc;
use tracing::info;

#[derive(Parser, Debug)]
#[command(name = "speed-sign-watch")]
#[command(about = "Read speed-limit signs from a camera stream", long_about = None)]
#[command(version)]
struct Cli {
    /// TOML configuration file (defaults to ./speed-sign-watch.toml if present)
    #[arg(short, long, value_name = "FILE")]
    config: Option<PathBuf>,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();
    let config = WatchConfig::load(cli.config.as_deref())?;

    init_logging(&config.logging);
    init_metrics(&config.metrics)?;

    info!("=== Speed Sign Watch v{} ===", env!("CARGO_PKG_VERSION"));

    let (events_tx, mut events_rx) = mpsc::channel::<PresentationEvent>(config.engine.outbox_capacity);
    let printer = tokio::spawn(async move {
        while let Some(event) = events_rx.recv().await {
            println!("{}", serde_json::to_string(&event)?);
        }
        Ok::<_, serde_json::Error>(())
    });

    run(config, Capabilities::mock(), events_tx).await?;
    printer.await??;

    Ok(())
}
