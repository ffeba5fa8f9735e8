// PIA Status - System Tray Indicator
// Shows VPN status in the tray and drives connection changes from its menu

use anyhow::{Context, Result};
use pia_status_common::StatusConfig;
use pia_status_core::Engine;
use tracing::info;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

mod notifications;
mod tray;

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize logging
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "pia_status_tray=info,pia_status_core=info".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    info!("PIA Status tray starting...");
    info!("Version: {}", env!("CARGO_PKG_VERSION"));

    let config = StatusConfig::load().context("Failed to load configuration")?;
    let engine = Engine::start(config, true).await;

    // Finish a kill-switch restore interrupted by the previous run
    engine.restore_pending_in_background();

    tray::run_tray(&engine).await?;

    engine.shutdown();
    Ok(())
}
