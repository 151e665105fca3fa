//! `berthd` binary entry point.

use std::sync::Arc;

use anyhow::{Context, Result};
use berth_core::{init_tracing, ChannelRegistry, METRICS};
use berthd::{app, AppState, Config};
use clap::Parser;
use tokio::net::TcpListener;
use tracing::info;

#[tokio::main]
async fn main() -> Result<()> {
    let config = Config::parse();
    init_tracing(config.json, config.log_level());

    let factory = config.open_store().await?;
    let registry = Arc::new(ChannelRegistry::new(factory, config.settings()));

    let listener = TcpListener::bind(config.bind)
        .await
        .with_context(|| format!("Failed to bind {}", config.bind))?;
    info!(
        bind = %config.bind,
        store = ?config.store,
        prerelease_policy = %config.prerelease_policy,
        "berthd listening"
    );

    axum::serve(listener, app(AppState::new(registry.clone())))
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("Server error")?;

    registry.shutdown().await;
    METRICS.flush();
    info!("berthd stopped");
    Ok(())
}

async fn shutdown_signal() {
    if let Err(err) = tokio::signal::ctrl_c().await {
        tracing::error!(error = %err, "failed to listen for shutdown signal");
    }
    info!("shutdown requested");
}
