// packages/engine/src/utils/config.rs
//! Engine configuration
//!
//! Configuration is layered with the `config` crate:
//!
//! 1. Built-in defaults (every field has one)
//! 2. An optional file: `$WIRELENS_CONFIG`, or `wirelens.{toml,yaml,json}`
//! 3. Environment variables: `WIRELENS__SECTION__KEY`, e.g.
//!    `WIRELENS__RECORDER__CAPACITY=5000`

use crate::interception::interceptor::InterceptionConfig;
use crate::observability::ObservabilityConfig;
use crate::query::QueryConfig;
use crate::recording::exporter::ExportFormat;
use crate::recording::recorder::RecorderConfig;
use crate::schema::decoder::DecoderConfig;
use crate::utils::errors::{EngineError, Result};
use config::{Config, Environment, File};
use serde::{Deserialize, Serialize};
use std::net::SocketAddr;
use std::path::{Path, PathBuf};
use tracing::debug;

/// Environment variable naming an explicit configuration file
pub const CONFIG_PATH_ENV: &str = "WIRELENS_CONFIG";

/// Basename probed when `WIRELENS_CONFIG` is unset
pub const DEFAULT_CONFIG_BASENAME: &str = "wirelens";

/// Top-level engine configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    /// Event buffer settings
    pub recorder: RecorderConfig,

    /// Body capture settings for the interception wrappers
    pub interception: InterceptionConfig,

    /// Structural decoder limits
    pub decoder: DecoderConfig,

    /// Query defaults
    pub query: QueryConfig,

    /// Capture proxy listen address
    pub server: ServerConfig,

    /// Schema files registered at start-up
    pub schemas: SchemaSourceConfig,

    /// Snapshot export on shutdown
    pub export: ExportConfig,

    /// Logging and metrics
    pub observability: ObservabilityConfig,
}

/// Capture proxy listen address
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: "127.0.0.1".to_string(),
            port: 8888,
        }
    }
}

impl ServerConfig {
    /// Parse `host:port` into a socket address
    pub fn socket_addr(&self) -> Result<SocketAddr> {
        format!("{}:{}", self.host, self.port)
            .parse()
            .map_err(|e| {
                EngineError::ConfigError(format!(
                    "Invalid server address {}:{}: {}",
                    self.host, self.port, e
                ))
            })
    }
}

/// Directory of `.proto` files registered at start-up
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct SchemaSourceConfig {
    pub dir: Option<PathBuf>,
}

/// Where and how to write the snapshot on shutdown
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct ExportConfig {
    pub path: Option<PathBuf>,
    pub format: ExportFormat,
}

impl EngineConfig {
    /// Load configuration from the default file (if any) and environment
    pub fn load() -> Result<Self> {
        let file = match std::env::var(CONFIG_PATH_ENV) {
            Ok(path) => {
                debug!("Loading configuration from {}", path);
                File::from(Path::new(&path)).required(true)
            }
            Err(_) => File::with_name(DEFAULT_CONFIG_BASENAME).required(false),
        };

        Self::build(file)
    }

    /// Load configuration from an explicit file; the file must exist
    pub fn load_from(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        debug!("Loading configuration from {:?}", path);
        Self::build(File::from(path).required(true))
    }

    fn build(file: File<config::FileSourceFile, config::FileFormat>) -> Result<Self> {
        let settings = Config::builder()
            .add_source(file)
            .add_source(
                Environment::with_prefix("WIRELENS")
                    .prefix_separator("__")
                    .separator("__")
                    .try_parsing(true),
            )
            .build()
            .map_err(|e| EngineError::ConfigError(format!("Failed to read configuration: {}", e)))?;

        settings
            .try_deserialize()
            .map_err(|e| EngineError::ConfigError(format!("Invalid configuration: {}", e)))
    }
}
