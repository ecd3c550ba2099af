// packages/engine/src/schema/mod.rs
//! Schema registry and heuristic protobuf decoding
//!
//! - **Scanner**: structural `.proto` scan (packages, messages, enums, fields)
//! - **Registry**: named schemas in registration order
//! - **Wire**: protobuf wire-format reader
//! - **Decoder**: first-match structural decode of opaque payloads

pub mod decoder;
pub mod registry;
pub mod scanner;
pub mod wire;

pub use decoder::{DecodeResult, Decoder, DecoderConfig};
pub use registry::{SchemaDefinition, SchemaRegistry};
