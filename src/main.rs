//! straybot - extensible plugin-driven IRC chat agent.

use std::sync::Arc;

use tracing::{error, info};
use tracing_subscriber::EnvFilter;

use straybot::bus::Bus;
use straybot::config::ConfigDocument;
use straybot::manager::PluginManager;
use straybot::plugin::PluginRegistry;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with_target(true)
        .init();

    let config_path = std::env::args()
        .nth(1)
        .unwrap_or_else(|| "config.toml".to_string());

    let config = ConfigDocument::load(&config_path).map_err(|e| {
        error!(path = %config_path, error = %e, "failed to load config");
        e
    })?;

    let bus = Bus::new();
    let manager = PluginManager::new(Arc::clone(&bus), config, PluginRegistry::with_builtins());
    manager.start();
    manager.autoload().await;
    info!(modules = ?manager.loaded(), "straybot running");

    tokio::signal::ctrl_c().await?;
    info!("shutting down");
    manager.stop().await;
    Ok(())
}
