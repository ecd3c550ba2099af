// packages/engine/src/lib.rs
//! WireLens Engine Library
//!
//! Transparent traffic interception, bounded event recording and heuristic
//! protobuf decoding for in-process HTTP and WebSocket traffic.
//!
//! # Architecture
//!
//! The engine is structured into several key modules:
//!
//! - **engine**: The `Engine` context owning one instance of each component
//! - **interception**: Transport decorators, concrete transports, capture proxy
//! - **recording**: Event model, bounded recorder, exporters
//! - **schema**: Schema registry and structural protobuf decoder
//! - **query**: Filtering, full-text and fuzzy search over snapshots
//! - **observability**: Tracing and metrics
//! - **utils**: Configuration and errors

// Public module exports
pub mod engine;
pub mod interception;
pub mod observability;
pub mod query;
pub mod recording;
pub mod schema;
pub mod utils;

// Re-export commonly used types
pub use engine::{BodyPart, Engine};
pub use interception::{InterceptionConfig, Interceptor};
pub use query::{DecoratedEvent, FilterSpec, QueryConfig, QueryEngine};
pub use recording::{EventRecorder, ExportFormat, InterceptedEvent, RecorderConfig};
pub use schema::{DecodeResult, Decoder, SchemaRegistry};
pub use utils::config::EngineConfig;
pub use utils::errors::{EngineError, Result};

// Version information
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_version() {
        assert!(!VERSION.is_empty());
    }
}
