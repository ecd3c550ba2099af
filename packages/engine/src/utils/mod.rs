// packages/engine/src/utils/mod.rs
//! Common utilities shared by every engine component
//!
//! - **errors**: Engine error taxonomy and `Result` alias
//! - **config**: Layered configuration (file + environment)

pub mod config;
pub mod errors;

pub use config::EngineConfig;
pub use errors::{EngineError, Result};
