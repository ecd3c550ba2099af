// packages/engine/src/query/flatten.rs
//! Textual rendering of events for searching
//!
//! An event is rendered as a JSON document and walked with an explicit
//! stack. Object keys and scalar values are emitted; nodes deeper than the
//! depth bound are left out.

use crate::recording::event::{CapturedBody, InterceptedEvent};
use crate::schema::decoder::DecodeResult;
use serde_json::{Map, Value};

/// Decode results attached to an event's bodies
#[derive(Debug, Clone, Copy, Default)]
pub struct DecodedBodies<'a> {
    pub request: Option<&'a DecodeResult>,
    pub response: Option<&'a DecodeResult>,
}

/// Build the searchable document for an event
pub fn event_document(event: &InterceptedEvent, decoded: DecodedBodies<'_>) -> Value {
    let mut doc = Map::new();

    doc.insert("transport".into(), event.transport.as_str().into());
    doc.insert("correlation_id".into(), event.correlation_id.clone().into());
    doc.insert("url".into(), event.url.clone().into());
    if let Some(method) = &event.method {
        doc.insert("method".into(), method.clone().into());
    }
    doc.insert("status".into(), serde_json::to_value(event.status).unwrap_or(Value::Null));
    if let Some(code) = event.status_code {
        doc.insert("status_code".into(), code.into());
    }
    if let Some(direction) = event.direction {
        doc.insert(
            "direction".into(),
            serde_json::to_value(direction).unwrap_or(Value::Null),
        );
    }
    if let Some(error) = &event.error {
        doc.insert("error".into(), error.clone().into());
    }

    doc.insert(
        "request_headers".into(),
        serde_json::to_value(&event.request_headers).unwrap_or(Value::Null),
    );
    insert_body(&mut doc, "request", event.request_body.as_ref());

    if let Some(headers) = &event.response_headers {
        doc.insert(
            "response_headers".into(),
            serde_json::to_value(headers).unwrap_or(Value::Null),
        );
    }
    insert_body(&mut doc, "response", event.response_body.as_ref());

    for (prefix, result) in [("request", decoded.request), ("response", decoded.response)] {
        if let Some(DecodeResult {
            success: true,
            data: Some(data),
            message_type,
            ..
        }) = result
        {
            doc.insert(format!("{}_decoded", prefix), data.clone());
            if let Some(message_type) = message_type {
                doc.insert(format!("{}_message_type", prefix), message_type.clone().into());
            }
        }
    }

    Value::Object(doc)
}

fn insert_body(doc: &mut Map<String, Value>, prefix: &str, body: Option<&CapturedBody>) {
    let Some(body) = body else {
        return;
    };
    if let Some(text) = &body.text {
        doc.insert(format!("{}_text", prefix), text.clone().into());
    }
    if let Some(parsed) = &body.parsed {
        doc.insert(format!("{}_parsed", prefix), parsed.clone());
    }
}

enum Node<'a> {
    Key(&'a str),
    Item(&'a Value, usize),
}

/// Flatten a JSON value to space-separated text, visiting at most
/// `max_depth` levels below the root
pub fn flatten(value: &Value, max_depth: usize) -> String {
    let mut out = String::new();
    let mut stack = vec![Node::Item(value, 0)];

    while let Some(node) = stack.pop() {
        let (value, depth) = match node {
            Node::Key(key) => {
                push_word(&mut out, key);
                continue;
            }
            Node::Item(value, depth) => (value, depth),
        };

        match value {
            Value::Object(map) if depth < max_depth => {
                // Reversed so entries come off the stack in document order
                for (key, child) in map.iter().rev() {
                    stack.push(Node::Item(child, depth + 1));
                    stack.push(Node::Key(key));
                }
            }
            Value::Array(items) if depth < max_depth => {
                for child in items.iter().rev() {
                    stack.push(Node::Item(child, depth + 1));
                }
            }
            Value::String(s) => push_word(&mut out, s),
            Value::Number(n) => push_word(&mut out, &n.to_string()),
            Value::Bool(b) => push_word(&mut out, if *b { "true" } else { "false" }),
            Value::Object(_) | Value::Array(_) | Value::Null => {}
        }
    }

    out
}

fn push_word(out: &mut String, word: &str) {
    if word.is_empty() {
        return;
    }
    if !out.is_empty() {
        out.push(' ');
    }
    out.push_str(word);
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::recording::event::{EventStatus, PartialEvent, TransportKind};
    use crate::recording::recorder::EventRecorder;
    use serde_json::json;

    #[test]
    fn test_flatten_emits_keys_and_scalars() {
        let value = json!({"a": {"b": [1, true, null, "x"]}, "c": "d"});
        assert_eq!(flatten(&value, 5), "a b 1 true x c d");
    }

    #[test]
    fn test_flatten_depth_bound() {
        let value = json!({"l1": {"l2": {"l3": "deep"}}});
        assert_eq!(flatten(&value, 2), "l1 l2");
        assert_eq!(flatten(&value, 3), "l1 l2 l3 deep");
        assert_eq!(flatten(&value, 0), "");
    }

    #[test]
    fn test_flatten_deeply_nested_does_not_recurse() {
        let mut value = Value::String("bottom".to_string());
        for _ in 0..2_000 {
            value = Value::Array(vec![value]);
        }
        assert_eq!(flatten(&value, 5), "");
        assert_eq!(flatten(&value, 2_000), "bottom");
    }

    #[test]
    fn test_event_document_fields() {
        let recorder = EventRecorder::default();
        recorder.append(
            PartialEvent::pending("c-1", TransportKind::RequestResponse, "http://api.test/login")
                .with_method("POST"),
        );
        let event = recorder.snapshot().remove(0);
        assert_eq!(event.status, EventStatus::Pending);

        let text = flatten(&event_document(&event, DecodedBodies::default()), 5);
        assert!(text.contains("http://api.test/login"));
        assert!(text.contains("POST"));
        assert!(text.contains("pending"));
        assert!(text.contains("request_response"));
    }
}
