//! Jewel Pricing - metal rate and making-charge pricing service
//!
//! Keeps current precious-metal rates fresh from unreliable upstream quote
//! providers and prices jewelry items (metal value, making charges,
//! wastage, GST) for inventory and order services over HTTP/JSON.

pub mod api;
pub mod cache;
pub mod config;
pub mod db;
pub mod error;
pub mod pricing;
pub mod retry;
pub mod scheduler;
pub mod services;
pub mod sources;
pub mod state;

use api::ApiServer;
use config::AppConfig;
use scheduler::RateRefreshScheduler;
use state::AppState;
use std::sync::Arc;
use tokio::sync::watch;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

/// Initialize logging, start the refresh scheduler and API server, and run
/// until Ctrl-C
pub async fn run() -> anyhow::Result<()> {
    // Initialize tracing/logging
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "jewel_pricing=debug,tower_http=info".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    tracing::info!("Starting Jewel Pricing v{}...", env!("CARGO_PKG_VERSION"));

    let config = AppConfig::from_env()?;
    let state = Arc::new(AppState::new(config)?);
    tracing::info!("Application state initialized");

    // Start rate refresh scheduler (startup refresh, then every interval in business hours)
    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    let scheduler = RateRefreshScheduler::new(state.clone()).start(shutdown_rx);

    let mut server = ApiServer::new(state.clone());
    server.start().await?;

    tokio::signal::ctrl_c().await?;
    tracing::info!("Shutdown requested");

    server.stop();
    let _ = shutdown_tx.send(true);
    if let Err(e) = scheduler.await {
        tracing::warn!("Rate refresh scheduler ended abnormally: {}", e);
    }

    tracing::info!("Jewel Pricing stopped");
    Ok(())
}
