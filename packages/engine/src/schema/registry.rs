// packages/engine/src/schema/registry.rs
//! Schema registry
//!
//! Named `.proto` definitions kept in registration order. Registering a name
//! that already exists replaces the definition in place.

use crate::observability::metrics as m;
use crate::schema::scanner::{self, MessageDef};
use crate::utils::errors::{EngineError, Result};
use chrono::{DateTime, Utc};
use parking_lot::RwLock;
use std::collections::HashMap;
use std::path::Path;
use std::sync::Arc;
use tracing::{debug, info};

/// A registered schema and the message types scanned from it
#[derive(Debug, Clone)]
pub struct SchemaDefinition {
    /// Registration key
    pub name: String,

    /// Source text as registered
    pub raw_text: String,

    pub package: Option<String>,

    /// Message types in extraction order
    pub messages: Vec<MessageDef>,

    /// Fully-qualified enum names
    pub enums: Vec<String>,

    pub registered_at: DateTime<Utc>,

    index: HashMap<String, usize>,
}

impl SchemaDefinition {
    /// Scan `raw_text` into a definition
    pub fn parse(name: &str, raw_text: &str) -> Result<Self> {
        let scanned = scanner::scan(name, raw_text)?;
        let index = scanned
            .messages
            .iter()
            .enumerate()
            .map(|(i, message)| (message.full_name.clone(), i))
            .collect();

        Ok(Self {
            name: name.to_string(),
            raw_text: raw_text.to_string(),
            package: scanned.package,
            messages: scanned.messages,
            enums: scanned.enums,
            registered_at: Utc::now(),
            index,
        })
    }

    /// Fully-qualified message type names, in extraction order
    pub fn message_types(&self) -> Vec<&str> {
        self.messages.iter().map(|m| m.full_name.as_str()).collect()
    }

    pub fn message(&self, full_name: &str) -> Option<&MessageDef> {
        self.index.get(full_name).map(|&i| &self.messages[i])
    }
}

/// Thread-safe registry of schemas
#[derive(Debug, Default)]
pub struct SchemaRegistry {
    schemas: RwLock<Vec<Arc<SchemaDefinition>>>,
}

impl SchemaRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register (or replace) a schema under `name`
    ///
    /// Nothing is registered when the text cannot be scanned.
    pub fn register(&self, name: &str, raw_text: &str) -> Result<Arc<SchemaDefinition>> {
        let definition = Arc::new(SchemaDefinition::parse(name, raw_text)?);

        let mut schemas = self.schemas.write();
        match schemas.iter_mut().find(|s| s.name == name) {
            Some(existing) => {
                *existing = Arc::clone(&definition);
                debug!("Replaced schema {}", name);
            }
            None => schemas.push(Arc::clone(&definition)),
        }
        drop(schemas);

        metrics::counter!(m::SCHEMAS_REGISTERED).increment(1);
        info!(
            "Registered schema {} ({} message types)",
            name,
            definition.messages.len()
        );

        Ok(definition)
    }

    /// Remove a schema; returns whether it was present
    pub fn remove(&self, name: &str) -> bool {
        let mut schemas = self.schemas.write();
        let before = schemas.len();
        schemas.retain(|s| s.name != name);
        before != schemas.len()
    }

    pub fn get(&self, name: &str) -> Option<Arc<SchemaDefinition>> {
        self.schemas.read().iter().find(|s| s.name == name).cloned()
    }

    /// Registered names, in registration order
    pub fn names(&self) -> Vec<String> {
        self.schemas.read().iter().map(|s| s.name.clone()).collect()
    }

    /// Registered schemas, in registration order
    pub fn schemas(&self) -> Vec<Arc<SchemaDefinition>> {
        self.schemas.read().clone()
    }

    pub fn len(&self) -> usize {
        self.schemas.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.schemas.read().is_empty()
    }

    /// Register every `*.proto` file in `dir`, sorted by file name
    ///
    /// The schema name is the file stem. The first file that fails to scan
    /// aborts the load; files before it stay registered.
    pub fn load_directory(&self, dir: impl AsRef<Path>) -> Result<Vec<String>> {
        let dir = dir.as_ref();
        let mut paths = Vec::new();

        for entry in std::fs::read_dir(dir)? {
            let path = entry?.path();
            if path.is_file() && path.extension().is_some_and(|ext| ext == "proto") {
                paths.push(path);
            }
        }
        paths.sort();

        let mut loaded = Vec::with_capacity(paths.len());
        for path in paths {
            let Some(name) = path.file_stem().and_then(|s| s.to_str()) else {
                continue;
            };
            let text = std::fs::read_to_string(&path).map_err(|e| {
                EngineError::ConfigError(format!("Failed to read {}: {}", path.display(), e))
            })?;
            self.register(name, &text)?;
            loaded.push(name.to_string());
        }

        info!("Loaded {} schemas from {}", loaded.len(), dir.display());
        Ok(loaded)
    }
}
