use std::path::PathBuf;
use std::sync::Arc;

use anyhow::Result;
use clap::Parser;
use tracing::{error, info};

use dropwatch::AppConfig;
use dropwatch::fetcher::HttpPageFetcher;
use dropwatch::registry::{TrackerRegistry, Watchlist};

#[derive(Parser, Debug)]
#[command(name = "dropwatch", about = "Email alerts when tracked product prices drop")]
struct Cli {
    /// TOML file with one [[alert]] table per tracked item
    #[arg(short, long, default_value = "watchlist.toml")]
    watchlist: PathBuf,
}

#[tokio::main]
async fn main() -> Result<()> {
    dotenvy::dotenv().ok();

    // Initialize tracing
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive("dropwatch=debug".parse()?),
        )
        .init();

    let cli = Cli::parse();
    let config = AppConfig::from_env()?;

    info!("Starting Dropwatch...");

    let watchlist = Watchlist::load(&cli.watchlist)?;
    let fetcher = Arc::new(HttpPageFetcher::new(&config.fetcher)?);
    let mut registry = TrackerRegistry::new(fetcher, config.smtp.clone());

    for alert in watchlist.alerts {
        let url = alert.url.clone();
        if let Err(e) = registry.add_tracker(alert) {
            error!("Rejected alert for {}: {}", url, e);
        }
    }

    if registry.is_empty() {
        anyhow::bail!("no valid alerts in watchlist");
    }
    info!("{} tracker(s) running", registry.len());

    tokio::signal::ctrl_c().await?;
    info!("Shutting down...");
    registry.shutdown().await;

    Ok(())
}
