// packages/engine/src/query/filter.rs
//! Structured event filtering
//!
//! Every present field of a `FilterSpec` must match; absent fields impose no
//! constraint. Filtering never fails: an invalid URL regex degrades to a
//! substring match.

use crate::query::flatten::{event_document, flatten, DecodedBodies};
use crate::recording::event::{EventStatus, InterceptedEvent, TransportKind};
use chrono::{DateTime, Utc};
use regex::RegexBuilder;
use serde::{Deserialize, Serialize};
use tracing::debug;

/// Fully-optional predicate over events
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct FilterSpec {
    /// Accepted transport kinds
    #[serde(skip_serializing_if = "Option::is_none")]
    pub transports: Option<Vec<TransportKind>>,

    /// Substring, or `/regex/`
    #[serde(skip_serializing_if = "Option::is_none")]
    pub url: Option<String>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub method: Option<String>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub status: Option<StatusFilter>,

    /// Lifecycle state
    #[serde(skip_serializing_if = "Option::is_none")]
    pub state: Option<EventStatus>,

    /// Inclusive bounds on `sent_at`
    #[serde(skip_serializing_if = "Option::is_none")]
    pub time: Option<TimeRange>,

    /// Case-insensitive substring of the flattened event
    #[serde(skip_serializing_if = "Option::is_none")]
    pub keyword: Option<String>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub content_type: Option<String>,
}

/// HTTP status constraint: `404` or `{"min": 400, "max": 499}`
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum StatusFilter {
    Exact(u16),
    Range { min: u16, max: u16 },
}

impl StatusFilter {
    pub fn matches(&self, code: u16) -> bool {
        match *self {
            StatusFilter::Exact(expected) => code == expected,
            StatusFilter::Range { min, max } => (min..=max).contains(&code),
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TimeRange {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub from: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub to: Option<DateTime<Utc>>,
}

impl TimeRange {
    pub fn contains(&self, at: DateTime<Utc>) -> bool {
        self.from.map_or(true, |from| at >= from) && self.to.map_or(true, |to| at <= to)
    }
}

/// URL pattern compiled once per filter call
enum UrlMatcher {
    Regex(regex::Regex),
    Substring(String),
}

impl UrlMatcher {
    fn new(pattern: &str) -> Self {
        let regex_body = pattern
            .strip_prefix('/')
            .and_then(|rest| rest.strip_suffix('/'))
            .filter(|body| !body.is_empty());

        if let Some(body) = regex_body {
            match RegexBuilder::new(body).case_insensitive(true).build() {
                Ok(regex) => return UrlMatcher::Regex(regex),
                Err(e) => debug!("Invalid URL regex {}, matching as text: {}", pattern, e),
            }
        }

        UrlMatcher::Substring(pattern.to_lowercase())
    }

    fn matches(&self, url: &str) -> bool {
        match self {
            UrlMatcher::Regex(regex) => regex.is_match(url),
            UrlMatcher::Substring(needle) => url.to_lowercase().contains(needle),
        }
    }
}

/// Events matching `spec`, in their original order
pub fn filter(events: &[InterceptedEvent], spec: &FilterSpec, max_depth: usize) -> Vec<InterceptedEvent> {
    let url = spec.url.as_deref().map(UrlMatcher::new);
    let keyword = spec.keyword.as_deref().map(str::to_lowercase);
    let content_type = spec.content_type.as_deref().map(str::to_lowercase);

    events
        .iter()
        .filter(|event| {
            if let Some(transports) = &spec.transports {
                if !transports.contains(&event.transport) {
                    return false;
                }
            }
            if let Some(url) = &url {
                if !url.matches(&event.url) {
                    return false;
                }
            }
            if let Some(method) = &spec.method {
                match &event.method {
                    Some(actual) if actual.eq_ignore_ascii_case(method) => {}
                    _ => return false,
                }
            }
            if let Some(status) = &spec.status {
                match event.status_code {
                    Some(code) if status.matches(code) => {}
                    _ => return false,
                }
            }
            if let Some(state) = spec.state {
                if event.status != state {
                    return false;
                }
            }
            if let Some(time) = &spec.time {
                if !time.contains(event.sent_at) {
                    return false;
                }
            }
            if let Some(content_type) = &content_type {
                match event.content_type() {
                    Some(actual) if actual.to_lowercase().contains(content_type.as_str()) => {}
                    _ => return false,
                }
            }
            if let Some(keyword) = &keyword {
                let text = flatten(&event_document(event, DecodedBodies::default()), max_depth);
                if !text.to_lowercase().contains(keyword.as_str()) {
                    return false;
                }
            }
            true
        })
        .cloned()
        .collect()
}
