// packages/engine/src/main.rs
//! WireLens Engine
//!
//! Runs the capture proxy: every request relayed through it is recorded,
//! and the recording is exported on shutdown when an export path is set.

use anyhow::Result;
use tokio_util::sync::CancellationToken;
use tracing::{error, info};
use wirelens_engine::interception::{CaptureProxy, HyperTransport};
use wirelens_engine::observability::{init_metrics, init_tracing};
use wirelens_engine::utils::config::EngineConfig;
use wirelens_engine::Engine;

#[tokio::main]
async fn main() -> Result<()> {
    // Load configuration
    let config = EngineConfig::load()?;

    // Initialize observability (tracing, metrics)
    init_tracing(&config.observability)?;
    init_metrics(&config.observability)?;

    info!("Starting WireLens Engine v{}", env!("CARGO_PKG_VERSION"));
    info!("Configuration loaded: {:?}", config);

    let engine = Engine::new(config.clone());
    engine.install();

    let loaded = engine.load_schemas()?;
    if !loaded.is_empty() {
        info!("Registered schemas: {}", loaded.join(", "));
    }

    let addr = config.server.socket_addr()?;
    let transport = engine.interceptor().http(HyperTransport::new());
    let proxy = CaptureProxy::bind(addr, transport).await?;
    info!("Point HTTP clients at http://{} to record their traffic", proxy.local_addr()?);

    // Graceful shutdown handler
    let shutdown = CancellationToken::new();
    let signal = shutdown.clone();
    tokio::spawn(async move {
        if let Err(e) = tokio::signal::ctrl_c().await {
            error!("Failed to listen for CTRL+C: {}", e);
        }
        info!("Received shutdown signal, cleaning up...");
        signal.cancel();
    });

    proxy.run(shutdown).await?;
    engine.settle().await;

    let stats = engine.stats();
    info!(
        "Recorded {} events ({} evicted, {} buffered)",
        stats.events_recorded,
        stats.events_evicted,
        engine.recorder().len()
    );

    if let Some(path) = &config.export.path {
        engine.export_to_file(config.export.format, path)?;
    }

    info!("Engine stopped gracefully");
    Ok(())
}
