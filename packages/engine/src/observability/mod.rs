// packages/engine/src/observability/mod.rs
//! Logging and metrics initialisation
//!
//! - **Tracing**: `tracing-subscriber` with an `EnvFilter`; `RUST_LOG`
//!   overrides the configured level
//! - **Metrics**: `metrics` facade, exported through Prometheus when an
//!   address is configured

pub mod metrics;

use crate::utils::errors::{EngineError, Result};
use metrics_exporter_prometheus::PrometheusBuilder;
use serde::{Deserialize, Serialize};
use std::net::SocketAddr;
use tracing::info;
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

/// Observability configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ObservabilityConfig {
    /// Default filter directive: "trace" | "debug" | "info" | "warn" | "error"
    pub log_level: String,

    /// Emit JSON structured logs instead of human-readable text
    pub json_logs: bool,

    /// Prometheus scrape endpoint, e.g. "0.0.0.0:9000"
    pub metrics_addr: Option<String>,
}

impl Default for ObservabilityConfig {
    fn default() -> Self {
        Self {
            log_level: "info".to_string(),
            json_logs: false,
            metrics_addr: None,
        }
    }
}

/// Initialise tracing; a second initialisation is ignored
pub fn init_tracing(config: &ObservabilityConfig) -> Result<()> {
    let filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(&config.log_level))
        .map_err(|e| {
            EngineError::ConfigError(format!("Invalid log level '{}': {}", config.log_level, e))
        })?;

    let registry = tracing_subscriber::registry().with(filter);
    let result = if config.json_logs {
        registry.with(fmt::layer().json()).try_init()
    } else {
        registry.with(fmt::layer()).try_init()
    };

    if result.is_err() {
        tracing::debug!("Tracing subscriber already installed");
    }

    Ok(())
}

/// Install the Prometheus exporter when `metrics_addr` is set
///
/// Must be called from within a tokio runtime.
pub fn init_metrics(config: &ObservabilityConfig) -> Result<()> {
    let Some(addr) = &config.metrics_addr else {
        return Ok(());
    };

    let addr: SocketAddr = addr.parse().map_err(|e| {
        EngineError::ConfigError(format!("Invalid metrics address '{}': {}", addr, e))
    })?;

    PrometheusBuilder::new()
        .with_http_listener(addr)
        .install()
        .map_err(|e| EngineError::ConfigError(format!("Failed to install metrics exporter: {}", e)))?;

    metrics::describe();
    info!("Prometheus metrics exposed on {}", addr);

    Ok(())
}
