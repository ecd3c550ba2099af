// packages/engine/src/recording/mod.rs
//! Event recording
//!
//! - **Event**: the normalized event and connection model
//! - **Recorder**: bounded, correlation-aware event log
//! - **Exporter**: snapshot export to JSON, NDJSON and HAR
//!
//! # Architecture
//!
//! ```text
//! Notification → EventRecorder::notify → append / update / connection state
//!                        │
//!                        ├─ snapshot()  → QueryEngine, Exporter
//!                        └─ subscribe() → incremental consumers
//! ```
//!
//! The log is a ring: when it is full the oldest event is evicted before a
//! new one is appended. Eviction is never reported as an error.

pub mod event;
pub mod exporter;
pub mod recorder;

// Re-export commonly used types
pub use event::{
    CapturedBody, Connection, ConnectionState, Direction, EventId, EventPatch, EventStatus,
    Headers, InterceptedEvent, PartialEvent, TransportKind,
};
pub use exporter::{ExportFormat, Exporter};
pub use recorder::{EventRecorder, RecorderConfig, RecorderStats, RecorderUpdate, UpdateOutcome};
