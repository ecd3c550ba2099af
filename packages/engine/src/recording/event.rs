// packages/engine/src/recording/event.rs
//! Normalized event model shared by the interception layer, the recorder
//! and the query engine.

use bytes::Bytes;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Monotonic event sequence number
pub type EventId = u64;

/// Header map with lower-cased names; repeated headers are joined with `", "`
pub type Headers = BTreeMap<String, String>;

/// Transport shape an event was observed on
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TransportKind {
    /// Buffered request/response (fetch/XHR style)
    RequestResponse,

    /// Request with a streamed response body
    Streaming,

    /// Full-duplex socket (WebSocket style)
    Duplex,
}

impl TransportKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            TransportKind::RequestResponse => "request_response",
            TransportKind::Streaming => "streaming",
            TransportKind::Duplex => "duplex",
        }
    }
}

/// Lifecycle state of an event
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EventStatus {
    Pending,
    Completed,
    Error,
}

impl EventStatus {
    pub fn is_terminal(&self) -> bool {
        !matches!(self, EventStatus::Pending)
    }
}

/// Direction of a duplex message
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Direction {
    Outbound,
    Inbound,
}

/// A captured payload: raw bytes plus best-effort views of them
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct CapturedBody {
    /// Retained bytes (hex-encoded when serialized)
    #[serde(with = "hex_bytes")]
    pub raw: Bytes,

    /// Original payload length, including any truncated tail
    pub size: usize,

    /// Whether `raw` holds only a prefix of the payload
    pub truncated: bool,

    /// UTF-8 view of `raw`, when valid
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub text: Option<String>,

    /// Parsed JSON (or form-encoded) view, when the payload parses
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub parsed: Option<serde_json::Value>,
}

impl CapturedBody {
    pub fn is_empty(&self) -> bool {
        self.size == 0
    }

    /// True when the retained bytes are not valid UTF-8
    pub fn is_binary(&self) -> bool {
        !self.raw.is_empty() && self.text.is_none()
    }
}

/// A recorded request, response or message
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct InterceptedEvent {
    /// Recorder-assigned sequence id, strictly increasing
    pub id: EventId,

    /// Request correlation id, or the connection id for duplex messages
    pub correlation_id: String,

    pub transport: TransportKind,

    pub url: String,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub method: Option<String>,

    #[serde(default)]
    pub request_headers: Headers,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub request_body: Option<CapturedBody>,

    pub status: EventStatus,

    /// HTTP status of the response
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub status_code: Option<u16>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub response_headers: Option<Headers>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub response_body: Option<CapturedBody>,

    /// Set on duplex message events only
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub direction: Option<Direction>,

    /// Terminal error description
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,

    pub sent_at: DateTime<Utc>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub completed_at: Option<DateTime<Utc>>,
}

impl InterceptedEvent {
    /// Content type of the response, falling back to the request
    pub fn content_type(&self) -> Option<&str> {
        self.response_headers
            .as_ref()
            .and_then(|headers| headers.get("content-type"))
            .or_else(|| self.request_headers.get("content-type"))
            .map(String::as_str)
    }

    /// Elapsed time between dispatch and completion
    pub fn duration(&self) -> Option<chrono::Duration> {
        self.completed_at.map(|done| done - self.sent_at)
    }
}

/// Event as emitted by the interception layer, before the recorder assigns
/// an id and timestamp
#[derive(Debug, Clone)]
pub struct PartialEvent {
    pub correlation_id: String,
    pub transport: TransportKind,
    pub url: String,
    pub method: Option<String>,
    pub request_headers: Headers,
    pub request_body: Option<CapturedBody>,
    pub status: EventStatus,
    pub status_code: Option<u16>,
    pub response_headers: Option<Headers>,
    pub response_body: Option<CapturedBody>,
    pub direction: Option<Direction>,
    pub error: Option<String>,
}

impl PartialEvent {
    /// A dispatched request awaiting its terminal state
    pub fn pending(
        correlation_id: impl Into<String>,
        transport: TransportKind,
        url: impl Into<String>,
    ) -> Self {
        Self {
            correlation_id: correlation_id.into(),
            transport,
            url: url.into(),
            method: None,
            request_headers: Headers::new(),
            request_body: None,
            status: EventStatus::Pending,
            status_code: None,
            response_headers: None,
            response_body: None,
            direction: None,
            error: None,
        }
    }

    /// A duplex message; messages are terminal as soon as they are observed
    pub fn message(
        connection_id: impl Into<String>,
        url: impl Into<String>,
        direction: Direction,
        payload: CapturedBody,
    ) -> Self {
        let mut event = Self::pending(connection_id, TransportKind::Duplex, url);
        event.status = EventStatus::Completed;
        event.direction = Some(direction);
        match direction {
            Direction::Outbound => event.request_body = Some(payload),
            Direction::Inbound => event.response_body = Some(payload),
        }
        event
    }

    pub fn with_method(mut self, method: impl Into<String>) -> Self {
        self.method = Some(method.into());
        self
    }

    pub fn with_request_headers(mut self, headers: Headers) -> Self {
        self.request_headers = headers;
        self
    }

    pub fn with_request_body(mut self, body: Option<CapturedBody>) -> Self {
        self.request_body = body;
        self
    }
}

/// Terminal transition applied to a pending event
#[derive(Debug, Clone)]
pub struct EventPatch {
    pub status: EventStatus,
    pub status_code: Option<u16>,
    pub response_headers: Option<Headers>,
    pub response_body: Option<CapturedBody>,
    pub error: Option<String>,
}

impl EventPatch {
    pub fn completed(
        status_code: Option<u16>,
        response_headers: Headers,
        response_body: Option<CapturedBody>,
    ) -> Self {
        Self {
            status: EventStatus::Completed,
            status_code,
            response_headers: Some(response_headers),
            response_body,
            error: None,
        }
    }

    pub fn failed(error: impl Into<String>) -> Self {
        Self {
            status: EventStatus::Error,
            status_code: None,
            response_headers: None,
            response_body: None,
            error: Some(error.into()),
        }
    }

    /// A streamed response that failed after its head was received
    pub fn failed_after_head(
        error: impl Into<String>,
        status_code: Option<u16>,
        response_headers: Headers,
        partial_body: Option<CapturedBody>,
    ) -> Self {
        Self {
            status: EventStatus::Error,
            status_code,
            response_headers: Some(response_headers),
            response_body: partial_body,
            error: Some(error.into()),
        }
    }
}

/// Duplex connection state
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ConnectionState {
    Open,
    Closed,
    Error,
}

/// A duplex connection; its messages reference it by `correlation_id`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Connection {
    pub connection_id: String,
    pub url: String,
    pub state: ConnectionState,
    pub opened_at: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub closed_at: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    pub messages_sent: u64,
    pub messages_received: u64,
}

mod hex_bytes {
    use bytes::Bytes;
    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(raw: &Bytes, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&hex::encode(raw))
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Bytes, D::Error> {
        let text = String::deserialize(deserializer)?;
        hex::decode(text)
            .map(Bytes::from)
            .map_err(serde::de::Error::custom)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_terminal() {
        assert!(!EventStatus::Pending.is_terminal());
        assert!(EventStatus::Completed.is_terminal());
        assert!(EventStatus::Error.is_terminal());
    }

    #[test]
    fn test_message_payload_placement() {
        let body = CapturedBody {
            raw: Bytes::from_static(b"hi"),
            size: 2,
            truncated: false,
            text: Some("hi".to_string()),
            parsed: None,
        };

        let out = PartialEvent::message("c1", "ws://x", Direction::Outbound, body.clone());
        assert_eq!(out.status, EventStatus::Completed);
        assert!(out.request_body.is_some());
        assert!(out.response_body.is_none());

        let inbound = PartialEvent::message("c1", "ws://x", Direction::Inbound, body);
        assert!(inbound.response_body.is_some());
    }

    #[test]
    fn test_body_serializes_raw_as_hex() {
        let body = CapturedBody {
            raw: Bytes::from_static(&[0x08, 0x96, 0x01]),
            size: 3,
            truncated: false,
            text: None,
            parsed: None,
        };

        let json = serde_json::to_value(&body).unwrap();
        assert_eq!(json["raw"], "089601");
        assert!(json.get("text").is_none());

        let back: CapturedBody = serde_json::from_value(json).unwrap();
        assert_eq!(back, body);
        assert!(back.is_binary());
    }

    #[test]
    fn test_content_type_falls_back_to_request() {
        let mut headers = Headers::new();
        headers.insert("content-type".to_string(), "application/json".to_string());

        let event = InterceptedEvent {
            id: 1,
            correlation_id: "c".to_string(),
            transport: TransportKind::RequestResponse,
            url: "http://x".to_string(),
            method: Some("POST".to_string()),
            request_headers: headers,
            request_body: None,
            status: EventStatus::Pending,
            status_code: None,
            response_headers: None,
            response_body: None,
            direction: None,
            error: None,
            sent_at: Utc::now(),
            completed_at: None,
        };

        assert_eq!(event.content_type(), Some("application/json"));
        assert!(event.duration().is_none());
    }
}
