// packages/engine/src/interception/body.rs
//! Best-effort body capture
//!
//! Capture never fails: anything that does not parse is kept as raw bytes.

use crate::recording::event::{CapturedBody, Headers};
use bytes::Bytes;
use http::HeaderMap;
use serde_json::{Map, Value};

/// Build a captured body from a complete payload
///
/// At most `limit` bytes are retained. The parsed view is attempted only
/// when `parse` is set and the payload was retained in full.
pub fn capture(payload: &Bytes, content_type: Option<&str>, limit: usize, parse: bool) -> CapturedBody {
    let retained = payload.slice(..payload.len().min(limit));
    capture_prefix(retained, payload.len(), content_type, parse)
}

/// Build a captured body from the retained prefix of a payload whose full
/// length is `size`
pub fn capture_prefix(
    retained: Bytes,
    size: usize,
    content_type: Option<&str>,
    parse: bool,
) -> CapturedBody {
    let truncated = size > retained.len();
    let text = std::str::from_utf8(&retained).ok().map(str::to_owned);
    let parsed = match (&text, parse && !truncated) {
        (Some(text), true) => parse_text(text, content_type),
        _ => None,
    };

    CapturedBody {
        raw: retained,
        size,
        truncated,
        text,
        parsed,
    }
}

fn parse_text(text: &str, content_type: Option<&str>) -> Option<Value> {
    let content_type = content_type.map(str::to_ascii_lowercase).unwrap_or_default();

    if content_type.contains("application/x-www-form-urlencoded") {
        return Some(parse_form(text));
    }

    let trimmed = text.trim_start();
    let looks_like_json = trimmed.starts_with('{') || trimmed.starts_with('[');
    if content_type.contains("json") || looks_like_json {
        return serde_json::from_str(text).ok();
    }

    None
}

fn parse_form(text: &str) -> Value {
    let fields: Map<String, Value> = url::form_urlencoded::parse(text.as_bytes())
        .map(|(key, value)| (key.into_owned(), Value::String(value.into_owned())))
        .collect();
    Value::Object(fields)
}

/// Normalize an HTTP header map: lower-cased names, repeated values joined
pub fn header_map(headers: &HeaderMap) -> Headers {
    let mut out = Headers::new();
    for (name, value) in headers {
        let value = String::from_utf8_lossy(value.as_bytes()).into_owned();
        out.entry(name.as_str().to_ascii_lowercase())
            .and_modify(|existing: &mut String| {
                existing.push_str(", ");
                existing.push_str(&value);
            })
            .or_insert(value);
    }
    out
}

pub fn content_type(headers: &HeaderMap) -> Option<&str> {
    headers
        .get(http::header::CONTENT_TYPE)
        .and_then(|v| v.to_str().ok())
}
