use anyhow::Result;
use std::time::Duration;
use tokio::time::timeout;
use tracing::{info, warn};

use crate::context::AppContext;

/// Wait for Ctrl-C
pub async fn wait_for_signal() -> Result<()> {
    tokio::signal::ctrl_c().await?;
    info!("Shutdown signal received");
    Ok(())
}

/// Perform graceful shutdown of the services owned by `ctx`
pub async fn shutdown_services(ctx: &AppContext) -> Result<()> {
    info!("Initiating graceful shutdown...");

    // Cancelling finalizes with placeholders, so requesters still get an answer
    match timeout(Duration::from_secs(10), ctx.fusion.cancel_all()).await {
        Ok(cancelled) => info!(cancelled, "Pending fusions cancelled"),
        Err(_) => warn!("Timeout cancelling pending fusions"),
    }

    match timeout(Duration::from_secs(30), ctx.bus.flush()).await {
        Ok(Ok(())) => info!("Message bus drained"),
        Ok(Err(e)) => warn!("Message bus already closed: {}", e),
        Err(_) => warn!("Timeout waiting for message bus to drain"),
    }

    if timeout(Duration::from_secs(5), ctx.bus.shutdown()).await.is_err() {
        warn!("Timeout stopping dispatch worker");
    }

    info!("Graceful shutdown completed successfully");
    Ok(())
}
