// packages/engine/src/query/mod.rs
//! Query engine
//!
//! Pure functions over a recorder snapshot:
//!
//! - **filter**: structured `FilterSpec` predicates (logical AND)
//! - **full_text_search**: every query token must appear in the event text
//! - **fuzzy_search**: normalized edit-distance similarity
//! - **decorate / search_decorated**: the same, with decoded binary bodies
//!
//! Results are always an ordered subsequence of the input.

pub mod filter;
pub mod flatten;
pub mod search;

pub use filter::{FilterSpec, StatusFilter, TimeRange};
pub use search::similarity;

use crate::query::flatten::{event_document, DecodedBodies};
use crate::recording::event::{CapturedBody, InterceptedEvent};
use crate::schema::decoder::{DecodeResult, Decoder};
use serde::{Deserialize, Serialize};

/// Query defaults
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct QueryConfig {
    /// Depth bound of the flattened event rendering
    pub max_depth: usize,

    /// Default similarity threshold for fuzzy search
    pub fuzzy_threshold: f64,
}

impl Default for QueryConfig {
    fn default() -> Self {
        Self {
            max_depth: 5,
            fuzzy_threshold: 0.6,
        }
    }
}

/// An event together with successful decodes of its bodies
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DecoratedEvent {
    pub event: InterceptedEvent,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub request_decode: Option<DecodeResult>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub response_decode: Option<DecodeResult>,
}

/// Stateless query front-end carrying its defaults
#[derive(Debug, Clone, Default)]
pub struct QueryEngine {
    config: QueryConfig,
}

impl QueryEngine {
    pub fn new(config: QueryConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &QueryConfig {
        &self.config
    }

    pub fn filter(&self, events: &[InterceptedEvent], spec: &FilterSpec) -> Vec<InterceptedEvent> {
        filter::filter(events, spec, self.config.max_depth)
    }

    pub fn full_text_search(&self, events: &[InterceptedEvent], query: &str) -> Vec<InterceptedEvent> {
        search::full_text_search(events, query, self.config.max_depth)
    }

    /// Fuzzy search; `threshold` defaults to the configured one
    pub fn fuzzy_search(
        &self,
        events: &[InterceptedEvent],
        query: &str,
        threshold: Option<f64>,
    ) -> Vec<InterceptedEvent> {
        let threshold = threshold.unwrap_or(self.config.fuzzy_threshold);
        search::fuzzy_search(events, query, threshold, self.config.max_depth)
    }

    /// Decode every body that did not parse as JSON or a form
    ///
    /// Protobuf payloads are often valid UTF-8, so the text view does not
    /// rule a body out. Only successful decodes are attached.
    pub fn decorate(
        &self,
        events: &[InterceptedEvent],
        decoder: &Decoder,
        domain_hint: Option<&str>,
    ) -> Vec<DecoratedEvent> {
        let decode = |body: Option<&CapturedBody>| {
            body.filter(|b| b.parsed.is_none() && !b.raw.is_empty())
                .map(|b| decoder.decode(&b.raw, domain_hint))
                .filter(|result| result.success)
        };

        events
            .iter()
            .map(|event| DecoratedEvent {
                event: event.clone(),
                request_decode: decode(event.request_body.as_ref()),
                response_decode: decode(event.response_body.as_ref()),
            })
            .collect()
    }

    /// Full-text search over events rendered together with their decodes
    pub fn search_decorated(&self, events: &[DecoratedEvent], query: &str) -> Vec<DecoratedEvent> {
        let tokens = search::tokenize(query);
        if tokens.is_empty() {
            return events.to_vec();
        }

        events
            .iter()
            .filter(|decorated| {
                let document = event_document(
                    &decorated.event,
                    DecodedBodies {
                        request: decorated.request_decode.as_ref(),
                        response: decorated.response_decode.as_ref(),
                    },
                );
                let text = flatten::flatten(&document, self.config.max_depth);
                search::contains_all(&text, &tokens)
            })
            .cloned()
            .collect()
    }
}
