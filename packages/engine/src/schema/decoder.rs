// packages/engine/src/schema/decoder.rs
//! Heuristic structural decoder
//!
//! Tries every registered message type, in schema registration order then
//! extraction order, and returns the first one the bytes decode against.
//! Protobuf carries no type information on the wire, so the first
//! structurally valid match wins even if a later type would fit better.

use crate::observability::metrics as m;
use crate::schema::registry::{SchemaDefinition, SchemaRegistry};
use crate::schema::scanner::{FieldShape, FieldType, MessageDef, ScalarKind};
use crate::schema::wire::{self, WireError, WireValue};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Number, Value};
use std::sync::Arc;
use tracing::trace;

/// Structural decoder limits
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct DecoderConfig {
    /// Maximum nesting of message fields
    pub max_depth: usize,
}

impl Default for DecoderConfig {
    fn default() -> Self {
        Self { max_depth: 32 }
    }
}

/// Outcome of a decode call
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DecodeResult {
    pub success: bool,

    /// Decoded fields keyed by field name
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub data: Option<Value>,

    /// Fully-qualified name of the matching type
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub message_type: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub schema_name: Option<String>,
}

impl DecodeResult {
    pub fn miss() -> Self {
        Self {
            success: false,
            data: None,
            message_type: None,
            schema_name: None,
        }
    }
}

/// Decoder bound to a schema registry
pub struct Decoder {
    registry: Arc<SchemaRegistry>,
    config: DecoderConfig,
}

impl Decoder {
    pub fn new(registry: Arc<SchemaRegistry>, config: DecoderConfig) -> Self {
        Self { registry, config }
    }

    pub fn registry(&self) -> &Arc<SchemaRegistry> {
        &self.registry
    }

    /// Decode `bytes` against the registered schemas
    ///
    /// With a `domain_hint`, only schemas whose name contains it
    /// (case-insensitively) are tried. Never fails; a miss is
    /// `success: false`.
    pub fn decode(&self, bytes: &[u8], domain_hint: Option<&str>) -> DecodeResult {
        let result = self.first_match(bytes, domain_hint);
        let outcome = if result.success { "hit" } else { "miss" };
        metrics::counter!(m::DECODE_RESULTS, "outcome" => outcome).increment(1);
        result
    }

    fn first_match(&self, bytes: &[u8], domain_hint: Option<&str>) -> DecodeResult {
        if bytes.is_empty() {
            return DecodeResult::miss();
        }

        let hint = domain_hint.map(str::to_lowercase);
        let candidates = self.registry.schemas().into_iter().filter(|schema| {
            hint.as_deref()
                .map_or(true, |hint| schema.name.to_lowercase().contains(hint))
        });

        for schema in candidates {
            for message in &schema.messages {
                metrics::counter!(m::DECODE_ATTEMPTS).increment(1);

                match self.attempt(&schema, message, bytes) {
                    Ok(data) => {
                        trace!("Decoded {} bytes as {}", bytes.len(), message.full_name);
                        return DecodeResult {
                            success: true,
                            data: Some(data),
                            message_type: Some(message.full_name.clone()),
                            schema_name: Some(schema.name.clone()),
                        };
                    }
                    Err(e) => trace!("{} rejected: {}", message.full_name, e),
                }
            }
        }

        DecodeResult::miss()
    }

    fn attempt(
        &self,
        schema: &SchemaDefinition,
        message: &MessageDef,
        bytes: &[u8],
    ) -> Result<Value, WireError> {
        let walker = Walker {
            schema,
            max_depth: self.config.max_depth,
        };
        let (data, matched) = walker.message(message, bytes, 0)?;
        if matched == 0 {
            return Err(WireError::Malformed("no declared field matched".to_string()));
        }
        Ok(Value::Object(data))
    }
}

/// One decode attempt against one schema
struct Walker<'s> {
    schema: &'s SchemaDefinition,
    max_depth: usize,
}

impl Walker<'_> {
    /// Decode a whole buffer as `message`; returns the object and the number
    /// of declared fields seen
    fn message(
        &self,
        message: &MessageDef,
        mut buf: &[u8],
        depth: usize,
    ) -> Result<(Map<String, Value>, usize), WireError> {
        if depth > self.max_depth {
            return Err(WireError::Malformed(format!(
                "nesting deeper than {}",
                self.max_depth
            )));
        }

        let mut out = Map::new();
        let mut matched = 0;

        while !buf.is_empty() {
            let (number, value) = wire::next_field(&mut buf)?;
            let Some(field) = message.field(number) else {
                continue;
            };
            matched += 1;

            match &field.shape {
                FieldShape::Singular(ty) => {
                    out.insert(field.name.clone(), self.value(ty, value, depth)?);
                }
                FieldShape::Repeated(ty) => {
                    let items = self.repeated(ty, value, depth)?;
                    let slot = out
                        .entry(field.name.clone())
                        .or_insert_with(|| Value::Array(Vec::new()));
                    if let Value::Array(existing) = slot {
                        existing.extend(items);
                    }
                }
                FieldShape::Map { key, value: value_ty } => {
                    let (k, v) = self.map_entry(key, value_ty, value, depth)?;
                    let slot = out
                        .entry(field.name.clone())
                        .or_insert_with(|| Value::Object(Map::new()));
                    if let Value::Object(entries) = slot {
                        entries.insert(k, v);
                    }
                }
            }
        }

        Ok((out, matched))
    }

    fn value(&self, ty: &FieldType, value: WireValue<'_>, depth: usize) -> Result<Value, WireError> {
        match ty {
            FieldType::Scalar(kind) => scalar(*kind, value),
            FieldType::Enum(_) => match value {
                WireValue::Varint(v) => Ok(Value::from(v as i32)),
                other => Err(mismatch("enum", other)),
            },
            FieldType::Message(name) => {
                let WireValue::LengthDelimited(bytes) = value else {
                    return Err(mismatch("message", value));
                };
                match self.schema.message(name) {
                    Some(nested) => {
                        let (data, _) = self.message(nested, bytes, depth + 1)?;
                        Ok(Value::Object(data))
                    }
                    None => Ok(opaque(value)),
                }
            }
            FieldType::Opaque(_) => Ok(opaque(value)),
        }
    }

    fn repeated(
        &self,
        ty: &FieldType,
        value: WireValue<'_>,
        depth: usize,
    ) -> Result<Vec<Value>, WireError> {
        let packed_kind = match ty {
            FieldType::Scalar(kind) if packable(*kind) => Some(*kind),
            FieldType::Enum(_) => Some(ScalarKind::Int32),
            _ => None,
        };

        match (packed_kind, value) {
            (Some(kind), WireValue::LengthDelimited(bytes)) => unpack(kind, bytes),
            _ => Ok(vec![self.value(ty, value, depth)?]),
        }
    }

    fn map_entry(
        &self,
        key_ty: &FieldType,
        value_ty: &FieldType,
        value: WireValue<'_>,
        depth: usize,
    ) -> Result<(String, Value), WireError> {
        let WireValue::LengthDelimited(mut entry) = value else {
            return Err(mismatch("map entry", value));
        };

        let mut key = None;
        let mut val = None;
        while !entry.is_empty() {
            match wire::next_field(&mut entry)? {
                (1, raw) => key = Some(self.value(key_ty, raw, depth)?),
                (2, raw) => val = Some(self.value(value_ty, raw, depth + 1)?),
                _ => {}
            }
        }

        let key = match key {
            Some(Value::String(s)) => s,
            Some(other) => other.to_string(),
            None => default_key(key_ty),
        };
        Ok((key, val.unwrap_or(Value::Null)))
    }
}

fn scalar(kind: ScalarKind, value: WireValue<'_>) -> Result<Value, WireError> {
    use ScalarKind::*;

    let rendered = match (kind, value) {
        (Int32, WireValue::Varint(v)) => Value::from(v as i32),
        (Int64, WireValue::Varint(v)) => Value::from(v as i64),
        (Uint32, WireValue::Varint(v)) => Value::from(v as u32),
        (Uint64, WireValue::Varint(v)) => Value::from(v),
        (Sint32, WireValue::Varint(v)) => Value::from(wire::zigzag(v) as i32),
        (Sint64, WireValue::Varint(v)) => Value::from(wire::zigzag(v)),
        (Bool, WireValue::Varint(v)) => Value::Bool(v != 0),
        (Fixed32, WireValue::Fixed32(v)) => Value::from(v),
        (Sfixed32, WireValue::Fixed32(v)) => Value::from(v as i32),
        (Float, WireValue::Fixed32(v)) => float(f32::from_bits(v) as f64),
        (Fixed64, WireValue::Fixed64(v)) => Value::from(v),
        (Sfixed64, WireValue::Fixed64(v)) => Value::from(v as i64),
        (Double, WireValue::Fixed64(v)) => float(f64::from_bits(v)),
        (String, WireValue::LengthDelimited(bytes)) => {
            let text = std::str::from_utf8(bytes)
                .map_err(|_| WireError::Malformed("string field is not valid UTF-8".to_string()))?;
            Value::String(text.to_string())
        }
        (Bytes, WireValue::LengthDelimited(bytes)) => Value::String(hex::encode(bytes)),
        (kind, other) => return Err(mismatch(&format!("{:?}", kind), other)),
    };

    Ok(rendered)
}

fn packable(kind: ScalarKind) -> bool {
    !matches!(kind, ScalarKind::String | ScalarKind::Bytes)
}

/// Decode a packed repeated payload; its length must fit the element width
fn unpack(kind: ScalarKind, mut bytes: &[u8]) -> Result<Vec<Value>, WireError> {
    use ScalarKind::*;

    let width = match kind {
        Fixed32 | Sfixed32 | Float => Some(4),
        Fixed64 | Sfixed64 | Double => Some(8),
        _ => None,
    };

    let mut items = Vec::new();
    match width {
        Some(width) => {
            if bytes.len() % width != 0 {
                return Err(WireError::Malformed(format!(
                    "packed payload of {} bytes is not a multiple of {}",
                    bytes.len(),
                    width
                )));
            }
            for chunk in bytes.chunks_exact(width) {
                let value = if width == 4 {
                    let mut raw = [0u8; 4];
                    raw.copy_from_slice(chunk);
                    WireValue::Fixed32(u32::from_le_bytes(raw))
                } else {
                    let mut raw = [0u8; 8];
                    raw.copy_from_slice(chunk);
                    WireValue::Fixed64(u64::from_le_bytes(raw))
                };
                items.push(scalar(kind, value)?);
            }
        }
        None => {
            while !bytes.is_empty() {
                let v = wire::read_varint(&mut bytes)?;
                items.push(scalar(kind, WireValue::Varint(v))?);
            }
        }
    }

    Ok(items)
}

fn opaque(value: WireValue<'_>) -> Value {
    match value {
        WireValue::Varint(v) | WireValue::Fixed64(v) => Value::from(v),
        WireValue::Fixed32(v) => Value::from(v),
        WireValue::LengthDelimited(bytes) => Value::String(hex::encode(bytes)),
    }
}

fn float(v: f64) -> Value {
    Number::from_f64(v).map(Value::Number).unwrap_or(Value::Null)
}

fn default_key(ty: &FieldType) -> String {
    match ty {
        FieldType::Scalar(ScalarKind::String) => String::new(),
        FieldType::Scalar(ScalarKind::Bool) => "false".to_string(),
        _ => "0".to_string(),
    }
}

fn mismatch(expected: &str, found: WireValue<'_>) -> WireError {
    WireError::Malformed(format!("expected {} but found {}", expected, found.kind()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use prost::Message;

    const DEMO: &str = r#"syntax="proto3"; package p; message M { int32 a = 1; }"#;

    const SHOP: &str = r#"
        syntax = "proto3";
        package shop;

        message Order {
            message Line { string sku = 1; uint32 qty = 2; }
            enum State { NEW = 0; PAID = 1; }

            int64 id = 1;
            repeated Line lines = 2;
            State state = 3;
            map<string, int32> tags = 4;
            repeated sint32 deltas = 5;
            double total = 6;
            bytes blob = 7;
        }
    "#;

    #[derive(Clone, PartialEq, prost::Message)]
    struct Line {
        #[prost(string, tag = "1")]
        sku: String,
        #[prost(uint32, tag = "2")]
        qty: u32,
    }

    #[derive(Clone, PartialEq, prost::Message)]
    struct Order {
        #[prost(int64, tag = "1")]
        id: i64,
        #[prost(message, repeated, tag = "2")]
        lines: Vec<Line>,
        #[prost(int32, tag = "3")]
        state: i32,
        #[prost(map = "string, int32", tag = "4")]
        tags: std::collections::HashMap<String, i32>,
        #[prost(sint32, repeated, tag = "5")]
        deltas: Vec<i32>,
        #[prost(double, tag = "6")]
        total: f64,
        #[prost(bytes = "vec", tag = "7")]
        blob: Vec<u8>,
    }

    fn decoder_with(schemas: &[(&str, &str)]) -> Decoder {
        let registry = Arc::new(SchemaRegistry::new());
        for (name, text) in schemas {
            registry.register(name, text).unwrap();
        }
        Decoder::new(registry, DecoderConfig::default())
    }

    #[test]
    fn test_demo_message_decodes() {
        let decoder = decoder_with(&[("demo", DEMO)]);
        let result = decoder.decode(&[0x08, 0x96, 0x01], None);

        assert!(result.success);
        assert_eq!(result.message_type.as_deref(), Some("p.M"));
        assert_eq!(result.schema_name.as_deref(), Some("demo"));
        assert_eq!(result.data.unwrap()["a"], 150);
    }

    #[test]
    fn test_empty_input_misses() {
        let decoder = decoder_with(&[("demo", DEMO)]);
        assert_eq!(decoder.decode(&[], None), DecodeResult::miss());
    }

    #[test]
    fn test_no_schemas_misses() {
        let decoder = decoder_with(&[]);
        assert!(!decoder.decode(&[0x08, 0x01], None).success);
    }

    #[test]
    fn test_garbage_misses() {
        let decoder = decoder_with(&[("demo", DEMO)]);
        assert!(!decoder.decode(b"\xff\xff\xff", None).success);
        // Well-formed wire data, but no declared field
        assert!(!decoder.decode(&[0x10, 0x01], None).success);
        // Declared field with the wrong wire type
        assert!(!decoder.decode(&[0x0d, 1, 0, 0, 0], None).success);
    }

    #[test]
    fn test_rich_message() {
        let order = Order {
            id: 42,
            lines: vec![
                Line {
                    sku: "A-1".to_string(),
                    qty: 2,
                },
                Line {
                    sku: "B-2".to_string(),
                    qty: 1,
                },
            ],
            state: 1,
            tags: [("gift".to_string(), 1)].into_iter().collect(),
            deltas: vec![-1, 3],
            total: 19.5,
            blob: vec![0xde, 0xad],
        };

        let decoder = decoder_with(&[("shop", SHOP)]);
        let result = decoder.decode(&order.encode_to_vec(), None);
        assert!(result.success);
        assert_eq!(result.message_type.as_deref(), Some("shop.Order"));

        let data = result.data.unwrap();
        assert_eq!(data["id"], 42);
        assert_eq!(data["lines"][1]["sku"], "B-2");
        assert_eq!(data["lines"][0]["qty"], 2);
        assert_eq!(data["state"], 1);
        assert_eq!(data["tags"]["gift"], 1);
        assert_eq!(data["deltas"], serde_json::json!([-1, 3]));
        assert_eq!(data["total"], 19.5);
        assert_eq!(data["blob"], "dead");
    }

    #[test]
    fn test_first_match_wins() {
        let decoder = decoder_with(&[
            ("first", "package a; message X { int32 n = 1; }"),
            ("second", "package b; message Y { int32 n = 1; }"),
        ]);

        let result = decoder.decode(&[0x08, 0x01], None);
        assert_eq!(result.schema_name.as_deref(), Some("first"));

        let hinted = decoder.decode(&[0x08, 0x01], Some("SEC"));
        assert_eq!(hinted.schema_name.as_deref(), Some("second"));
        assert_eq!(hinted.message_type.as_deref(), Some("b.Y"));

        assert!(!decoder.decode(&[0x08, 0x01], Some("nothing")).success);
    }

    #[test]
    fn test_depth_limit() {
        let registry = Arc::new(SchemaRegistry::new());
        registry
            .register("nest", "message N { N child = 1; int32 v = 2; }")
            .unwrap();

        // child { child { v: 1 } }
        let bytes = [0x0a, 0x04, 0x0a, 0x02, 0x10, 0x01];

        let shallow = Decoder::new(registry.clone(), DecoderConfig { max_depth: 1 });
        assert!(!shallow.decode(&bytes, None).success);

        let deep = Decoder::new(registry, DecoderConfig::default());
        let result = deep.decode(&bytes, None);
        assert_eq!(result.data.unwrap()["child"]["child"]["v"], 1);
    }
}
