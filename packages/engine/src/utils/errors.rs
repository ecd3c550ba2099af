// packages/engine/src/utils/errors.rs
//! Engine error types
//!
//! Only a few operations surface errors to callers: schema registration,
//! export, configuration and proxy start-up. Decode misses, filter misses,
//! capacity eviction and double updates are normal outcomes and never appear
//! here.

use thiserror::Error;

/// Errors surfaced by the engine
#[derive(Debug, Error)]
pub enum EngineError {
    /// Schema text could not be scanned at all
    #[error("Schema '{name}' could not be scanned{}: {reason}", line_suffix(.line))]
    SchemaParse {
        name: String,
        line: Option<usize>,
        reason: String,
    },

    /// Interception infrastructure (proxy listener, client) failed
    #[error("Interception failed: {0}")]
    InterceptionFailed(String),

    /// Snapshot export failed
    #[error("Export failed: {0}")]
    ExportFailed(String),

    /// Invalid or unreadable configuration
    #[error("Configuration error: {0}")]
    ConfigError(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

fn line_suffix(line: &Option<usize>) -> String {
    match line {
        Some(line) => format!(" (line {})", line),
        None => String::new(),
    }
}

impl EngineError {
    pub(crate) fn schema_parse(
        name: impl Into<String>,
        line: Option<usize>,
        reason: impl Into<String>,
    ) -> Self {
        Self::SchemaParse {
            name: name.into(),
            line,
            reason: reason.into(),
        }
    }
}

/// Result type used across the engine
pub type Result<T> = std::result::Result<T, EngineError>;
