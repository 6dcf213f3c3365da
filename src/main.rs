//! Hosts container - Entry point.
//!
//! This binary watches the configured hosts files and logs every table the
//! container commits, until Ctrl-C is received.

use std::borrow::Cow;

use anyhow::{Context, Result};
use tracing::{debug, info};

use hosts_container::config::Config;
use hosts_container::container::HostsContainer;
use hosts_container::updates::UpdateReceiver;

/// Log the tables committed by the container until the feed is closed.
async fn log_updates(updates: UpdateReceiver) {
    while let Some(table) = updates.recv().await {
        info!(addresses = table.len(), "hosts table updated");
        for (ip, record) in table.iter() {
            debug!(%ip, main = %record.main, aliases = ?record.aliases, "hosts entry");
        }
    }
}

async fn run() -> Result<()> {
    let config_path = std::env::var("CONFIG_PATH")
        .map(Cow::Owned)
        .unwrap_or(Cow::Borrowed("config.toml"));
    let config = Config::load(config_path.as_ref()).context("Failed to load configuration")?;

    // Initialize metrics (must be done early, before any metrics are recorded)
    hosts_container::metrics::init(&config.metrics).context("Failed to initialize metrics")?;
    if config.metrics.enabled {
        info!("Metrics enabled on {}", config.metrics.listen);
    }

    info!("Starting hosts container...");
    info!("Root: {}", config.root.display());
    for path in &config.hosts_paths {
        info!("Hosts path: {}", path.display());
    }

    let container = HostsContainer::from_config(&config)
        .await
        .context("Failed to create hosts container")?;

    let updates = tokio::spawn(log_updates(container.updates()));

    tokio::signal::ctrl_c()
        .await
        .context("Failed to listen for Ctrl-C")?;
    info!("Ctrl-C received, shutting down...");

    container.close().await;
    let _ = updates.await;

    info!("Shutdown complete.");
    Ok(())
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt::init();
    run().await
}
