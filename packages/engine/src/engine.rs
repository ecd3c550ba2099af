// packages/engine/src/engine.rs
//! Engine context
//!
//! One `Engine` owns one instance of every component:
//!
//! - **Interceptor**: wraps transports, notifies the recorder
//! - **EventRecorder**: bounded event log
//! - **SchemaRegistry / Decoder**: on-demand structural decoding
//! - **QueryEngine**: filter and search over recorder snapshots
//!
//! Engines share nothing, so several can run side by side in one process.

use crate::interception::interceptor::Interceptor;
use crate::query::{DecoratedEvent, FilterSpec, QueryEngine};
use crate::recording::event::{CapturedBody, Connection, EventId, InterceptedEvent};
use crate::recording::exporter::{ExportFormat, Exporter};
use crate::recording::recorder::{EventRecorder, RecorderStats, RecorderUpdate};
use crate::schema::decoder::{DecodeResult, Decoder};
use crate::schema::registry::SchemaRegistry;
use crate::utils::config::EngineConfig;
use crate::utils::errors::Result;
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::sync::Arc;
use tokio::sync::broadcast;
use tracing::info;

/// Which body of a stored event to decode
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BodyPart {
    Request,
    Response,
}

pub struct Engine {
    config: EngineConfig,
    recorder: Arc<EventRecorder>,
    interceptor: Arc<Interceptor>,
    registry: Arc<SchemaRegistry>,
    decoder: Decoder,
    query: QueryEngine,
}

impl Engine {
    /// Build an engine; nothing is intercepted until `install` is called
    pub fn new(config: EngineConfig) -> Self {
        info!(
            "Creating engine (capacity {}, max body {} bytes)",
            config.recorder.capacity, config.interception.max_body_size
        );
        let recorder = Arc::new(EventRecorder::new(config.recorder.clone()));
        let interceptor = Arc::new(Interceptor::new(
            recorder.clone(),
            config.interception.clone(),
        ));
        let registry = Arc::new(SchemaRegistry::new());
        let decoder = Decoder::new(registry.clone(), config.decoder.clone());
        let query = QueryEngine::new(config.query.clone());

        Self {
            config,
            recorder,
            interceptor,
            registry,
            decoder,
            query,
        }
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    /// Activate interception; idempotent
    pub fn install(&self) -> bool {
        self.interceptor.install()
    }

    pub fn interceptor(&self) -> &Arc<Interceptor> {
        &self.interceptor
    }

    pub fn recorder(&self) -> &Arc<EventRecorder> {
        &self.recorder
    }

    pub fn registry(&self) -> &Arc<SchemaRegistry> {
        &self.registry
    }

    pub fn decoder(&self) -> &Decoder {
        &self.decoder
    }

    pub fn query(&self) -> &QueryEngine {
        &self.query
    }

    /// Register (or replace) a schema by name
    pub fn register_schema(&self, name: &str, raw_text: &str) -> Result<()> {
        self.registry.register(name, raw_text).map(|_| ())
    }

    pub fn remove_schema(&self, name: &str) -> bool {
        self.registry.remove(name)
    }

    /// Register every `.proto` file of the configured schema directory
    pub fn load_schemas(&self) -> Result<Vec<String>> {
        match &self.config.schemas.dir {
            Some(dir) => self.registry.load_directory(dir),
            None => Ok(Vec::new()),
        }
    }

    pub fn decode(&self, bytes: &[u8], domain_hint: Option<&str>) -> DecodeResult {
        self.decoder.decode(bytes, domain_hint)
    }

    /// Decode one body of a stored event
    ///
    /// `None` when the event has been evicted or carries no such body.
    pub fn decode_event(
        &self,
        id: EventId,
        part: BodyPart,
        domain_hint: Option<&str>,
    ) -> Option<DecodeResult> {
        let event = self.recorder.get(id)?;
        let body: &CapturedBody = match part {
            BodyPart::Request => event.request_body.as_ref()?,
            BodyPart::Response => event.response_body.as_ref()?,
        };
        Some(self.decoder.decode(&body.raw, domain_hint))
    }

    pub fn events(&self) -> Vec<InterceptedEvent> {
        self.recorder.snapshot()
    }

    pub fn connections(&self) -> Vec<Connection> {
        self.recorder.connections()
    }

    pub fn subscribe(&self) -> broadcast::Receiver<RecorderUpdate> {
        self.recorder.subscribe()
    }

    pub fn stats(&self) -> RecorderStats {
        self.recorder.stats()
    }

    pub fn clear(&self) {
        self.recorder.clear();
    }

    pub fn filter(&self, spec: &FilterSpec) -> Vec<InterceptedEvent> {
        self.query.filter(&self.events(), spec)
    }

    pub fn search(&self, query: &str) -> Vec<InterceptedEvent> {
        self.query.full_text_search(&self.events(), query)
    }

    pub fn fuzzy_search(&self, query: &str, threshold: Option<f64>) -> Vec<InterceptedEvent> {
        self.query.fuzzy_search(&self.events(), query, threshold)
    }

    /// Snapshot with undecoded bodies run through the decoder
    pub fn decorated(&self, domain_hint: Option<&str>) -> Vec<DecoratedEvent> {
        self.query.decorate(&self.events(), &self.decoder, domain_hint)
    }

    /// Full-text search that also sees decoded bodies
    pub fn search_decoded(&self, query: &str, domain_hint: Option<&str>) -> Vec<DecoratedEvent> {
        self.query.search_decorated(&self.decorated(domain_hint), query)
    }

    pub fn export(&self, format: ExportFormat) -> Result<String> {
        Exporter::new(format).export(&self.events())
    }

    pub fn export_to_file(&self, format: ExportFormat, path: impl AsRef<Path>) -> Result<()> {
        Exporter::new(format).export_to_file(&self.events(), path)
    }

    /// Wait for detached completions to reach the recorder
    pub async fn settle(&self) {
        self.interceptor.settle().await;
    }
}

impl Default for Engine {
    fn default() -> Self {
        Self::new(EngineConfig::default())
    }
}
