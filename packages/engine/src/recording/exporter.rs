// packages/engine/src/recording/exporter.rs
//! Export recorded events
//!
//! Supports:
//! - JSON (pretty-printed array)
//! - NDJSON (one event per line, for streaming into other tools)
//! - HAR 1.2 (HTTP events only; duplex messages have no HAR shape)

use crate::recording::event::{CapturedBody, Headers, InterceptedEvent, TransportKind};
use crate::utils::errors::{EngineError, Result};
use base64::engine::general_purpose::STANDARD;
use base64::Engine as _;
use serde::{Deserialize, Serialize};
use std::path::Path;
use tracing::{debug, info};

/// Export formats
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ExportFormat {
    /// Pretty-printed JSON array
    #[default]
    Json,

    /// Newline-delimited JSON
    Ndjson,

    /// HAR (HTTP Archive) format
    Har,
}

/// Exporter for event snapshots
pub struct Exporter {
    format: ExportFormat,
}

impl Exporter {
    /// Create a new exporter
    pub fn new(format: ExportFormat) -> Self {
        Self { format }
    }

    /// Export events to string
    pub fn export(&self, events: &[InterceptedEvent]) -> Result<String> {
        debug!("Exporting {} events to {:?} format", events.len(), self.format);

        match self.format {
            ExportFormat::Json => self.export_json(events),
            ExportFormat::Ndjson => self.export_ndjson(events),
            ExportFormat::Har => self.export_har(events),
        }
    }

    /// Export events and write them to `path`
    pub fn export_to_file(&self, events: &[InterceptedEvent], path: impl AsRef<Path>) -> Result<()> {
        let path = path.as_ref();
        let rendered = self.export(events)?;
        std::fs::write(path, rendered).map_err(|e| {
            EngineError::ExportFailed(format!("Failed to write {}: {}", path.display(), e))
        })?;

        info!("Exported {} events to {}", events.len(), path.display());
        Ok(())
    }

    fn export_json(&self, events: &[InterceptedEvent]) -> Result<String> {
        serde_json::to_string_pretty(events).map_err(|e| {
            EngineError::ExportFailed(format!("JSON serialization error: {}", e))
        })
    }

    fn export_ndjson(&self, events: &[InterceptedEvent]) -> Result<String> {
        let mut out = String::new();
        for event in events {
            let line = serde_json::to_string(event).map_err(|e| {
                EngineError::ExportFailed(format!("JSON serialization error: {}", e))
            })?;
            out.push_str(&line);
            out.push('\n');
        }
        Ok(out)
    }

    fn export_har(&self, events: &[InterceptedEvent]) -> Result<String> {
        let entries = events
            .iter()
            .filter(|e| e.transport != TransportKind::Duplex)
            .map(har_entry)
            .collect();

        let har = HarDocument {
            log: HarLog {
                version: "1.2".to_string(),
                creator: HarCreator {
                    name: "WireLens".to_string(),
                    version: env!("CARGO_PKG_VERSION").to_string(),
                },
                entries,
            },
        };

        serde_json::to_string_pretty(&har).map_err(|e| {
            EngineError::ExportFailed(format!("HAR serialization error: {}", e))
        })
    }
}

fn har_entry(event: &InterceptedEvent) -> HarEntry {
    let status = event.status_code.unwrap_or(0);
    let status_text = http::StatusCode::from_u16(status)
        .ok()
        .and_then(|s| s.canonical_reason())
        .unwrap_or_default()
        .to_string();

    HarEntry {
        started_date_time: event.sent_at.to_rfc3339(),
        time: event
            .duration()
            .map(|d| d.num_microseconds().unwrap_or(0) as f64 / 1000.0)
            .unwrap_or(0.0),
        request: HarRequest {
            method: event.method.clone().unwrap_or_else(|| "GET".to_string()),
            url: event.url.clone(),
            http_version: "HTTP/1.1".to_string(),
            headers: har_headers(&event.request_headers),
            post_data: event.request_body.as_ref().map(|body| HarPostData {
                mime_type: event
                    .request_headers
                    .get("content-type")
                    .cloned()
                    .unwrap_or_default(),
                text: body_text(body),
            }),
            body_size: event.request_body.as_ref().map_or(0, |b| b.size as i64),
        },
        response: HarResponse {
            status,
            status_text,
            http_version: "HTTP/1.1".to_string(),
            headers: event
                .response_headers
                .as_ref()
                .map(har_headers)
                .unwrap_or_default(),
            content: HarContent {
                size: event.response_body.as_ref().map_or(0, |b| b.size as i64),
                mime_type: event
                    .response_headers
                    .as_ref()
                    .and_then(|h| h.get("content-type").cloned())
                    .unwrap_or_default(),
                text: event.response_body.as_ref().map(body_text),
                encoding: event
                    .response_body
                    .as_ref()
                    .filter(|b| b.text.is_none())
                    .map(|_| "base64".to_string()),
            },
            body_size: event.response_body.as_ref().map_or(-1, |b| b.size as i64),
        },
        comment: event.error.clone(),
    }
}

fn har_headers(headers: &Headers) -> Vec<HarHeader> {
    headers
        .iter()
        .map(|(name, value)| HarHeader {
            name: name.clone(),
            value: value.clone(),
        })
        .collect()
}

/// Text bodies verbatim, anything else base64-encoded
fn body_text(body: &CapturedBody) -> String {
    body.text
        .clone()
        .unwrap_or_else(|| STANDARD.encode(&body.raw))
}

// HAR format structures
#[derive(Serialize)]
struct HarDocument {
    log: HarLog,
}

#[derive(Serialize)]
struct HarLog {
    version: String,
    creator: HarCreator,
    entries: Vec<HarEntry>,
}

#[derive(Serialize)]
struct HarCreator {
    name: String,
    version: String,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct HarEntry {
    started_date_time: String,
    time: f64,
    request: HarRequest,
    response: HarResponse,
    #[serde(skip_serializing_if = "Option::is_none")]
    comment: Option<String>,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct HarRequest {
    method: String,
    url: String,
    http_version: String,
    headers: Vec<HarHeader>,
    #[serde(skip_serializing_if = "Option::is_none")]
    post_data: Option<HarPostData>,
    body_size: i64,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct HarResponse {
    status: u16,
    status_text: String,
    http_version: String,
    headers: Vec<HarHeader>,
    content: HarContent,
    body_size: i64,
}

#[derive(Serialize)]
struct HarHeader {
    name: String,
    value: String,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct HarPostData {
    mime_type: String,
    text: String,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct HarContent {
    size: i64,
    mime_type: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    text: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    encoding: Option<String>,
}
