// packages/engine/src/schema/scanner.rs
//! Line-oriented `.proto` scanner
//!
//! Not a grammar parser. The text is cut into statements at `;`, `{` and
//! `}`, and only the shapes the decoder needs are recognized:
//!
//! - `package a.b;`
//! - `message Name {` / `enum Name {` / `oneof name {` block headers
//! - field statements, including `map<K, V>` fields
//!
//! Everything else (`syntax`, `import`, `option`, `reserved`, services,
//! extensions) is skipped structurally.

use crate::utils::errors::{EngineError, Result};
use once_cell::sync::Lazy;
use regex::Regex;
use std::collections::HashMap;

static FIELD_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(
        r"^(?:(repeated|optional|required)\s+)?(map\s*<\s*([\w.]+)\s*,\s*([\w.]+)\s*>|[\w.]+)\s+(\w+)\s*=\s*(\d+)\s*(?:\[.*\])?$",
    )
    .expect("field pattern is valid")
});

static BLOCK_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^(message|enum|oneof)\s+(\w+)$").expect("block pattern is valid"));

static PACKAGE_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^package\s+([\w.]+)$").expect("package pattern is valid"));

/// Protobuf scalar value types
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ScalarKind {
    Int32,
    Int64,
    Uint32,
    Uint64,
    Sint32,
    Sint64,
    Bool,
    Fixed32,
    Fixed64,
    Sfixed32,
    Sfixed64,
    Float,
    Double,
    String,
    Bytes,
}

impl ScalarKind {
    pub fn from_name(name: &str) -> Option<Self> {
        let kind = match name {
            "int32" => Self::Int32,
            "int64" => Self::Int64,
            "uint32" => Self::Uint32,
            "uint64" => Self::Uint64,
            "sint32" => Self::Sint32,
            "sint64" => Self::Sint64,
            "bool" => Self::Bool,
            "fixed32" => Self::Fixed32,
            "fixed64" => Self::Fixed64,
            "sfixed32" => Self::Sfixed32,
            "sfixed64" => Self::Sfixed64,
            "float" => Self::Float,
            "double" => Self::Double,
            "string" => Self::String,
            "bytes" => Self::Bytes,
            _ => return None,
        };
        Some(kind)
    }
}

/// Resolved type of a field
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FieldType {
    Scalar(ScalarKind),
    /// Fully-qualified message name within the same schema
    Message(String),
    /// Fully-qualified enum name; values decode as numbers
    Enum(String),
    /// Unresolvable type name; accepts any wire type
    Opaque(String),
}

/// Field cardinality and shape
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FieldShape {
    Singular(FieldType),
    Repeated(FieldType),
    Map { key: FieldType, value: FieldType },
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FieldDef {
    pub name: String,
    pub number: u32,
    pub shape: FieldShape,
}

/// A message type and its declared fields
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MessageDef {
    pub full_name: String,
    pub fields: Vec<FieldDef>,
}

impl MessageDef {
    pub fn field(&self, number: u32) -> Option<&FieldDef> {
        self.fields.iter().find(|f| f.number == number)
    }
}

/// Result of scanning one schema text
#[derive(Debug, Clone, Default)]
pub struct ScannedSchema {
    pub package: Option<String>,
    /// Messages in order of appearance, nested ones included
    pub messages: Vec<MessageDef>,
    pub enums: Vec<String>,
}

/// A field before type resolution
struct RawField {
    label: Option<String>,
    type_name: String,
    map_types: Option<(String, String)>,
    name: String,
    number: u32,
}

/// A message named relative to the package, before type resolution
struct RawMessage {
    path: String,
    fields: Vec<RawField>,
}

enum Block {
    Message(usize),
    Enum,
    Oneof,
    Other,
}

enum Piece {
    Statement(String),
    Open(String),
    Close,
}

/// Scan schema text into message and enum definitions
pub fn scan(name: &str, text: &str) -> Result<ScannedSchema> {
    if text.trim().is_empty() {
        return Err(EngineError::schema_parse(name, None, "schema text is empty"));
    }
    if let Some(pos) = text.find('\0') {
        let line = text[..pos].matches('\n').count() + 1;
        return Err(EngineError::schema_parse(name, Some(line), "schema text contains NUL characters"));
    }

    let stripped = strip_comments(text);

    let mut package: Option<String> = None;
    let mut messages: Vec<RawMessage> = Vec::new();
    let mut enums: Vec<String> = Vec::new();
    let mut stack: Vec<(Block, usize)> = Vec::new();

    for (piece, line) in split_pieces(&stripped) {
        match piece {
            Piece::Statement(statement) => {
                if stack.is_empty() {
                    if let Some(caps) = PACKAGE_RE.captures(&statement) {
                        package.get_or_insert_with(|| caps[1].to_string());
                    }
                    continue;
                }
                let Some(owner) = enclosing_message(&stack) else {
                    continue;
                };
                if let Some(field) = parse_field(&statement) {
                    messages[owner].fields.push(field);
                }
            }
            Piece::Open(header) => {
                let block = match BLOCK_RE.captures(&header) {
                    Some(caps) if &caps[1] == "message" && !in_skipped(&stack) => {
                        let path = match enclosing_message(&stack) {
                            Some(parent) => format!("{}.{}", messages[parent].path, &caps[2]),
                            None => caps[2].to_string(),
                        };
                        messages.push(RawMessage {
                            path,
                            fields: Vec::new(),
                        });
                        Block::Message(messages.len() - 1)
                    }
                    Some(caps) if &caps[1] == "enum" && !in_skipped(&stack) => {
                        let path = match enclosing_message(&stack) {
                            Some(parent) => format!("{}.{}", messages[parent].path, &caps[2]),
                            None => caps[2].to_string(),
                        };
                        enums.push(path);
                        Block::Enum
                    }
                    Some(caps) if &caps[1] == "oneof" && enclosing_message(&stack).is_some() => {
                        Block::Oneof
                    }
                    _ => Block::Other,
                };
                stack.push((block, line));
            }
            Piece::Close => {
                if stack.pop().is_none() {
                    return Err(EngineError::schema_parse(name, Some(line), "unmatched '}'"));
                }
            }
        }
    }

    if let Some((_, line)) = stack.first() {
        return Err(EngineError::schema_parse(name, Some(*line), "block is never closed"));
    }

    Ok(resolve(package, messages, enums))
}

/// Innermost message whose fields a statement would belong to
fn enclosing_message(stack: &[(Block, usize)]) -> Option<usize> {
    for (block, _) in stack.iter().rev() {
        match block {
            Block::Message(index) => return Some(*index),
            Block::Oneof => continue,
            Block::Enum | Block::Other => return None,
        }
    }
    None
}

/// Whether the innermost block hides declarations (service bodies, option
/// literals, enum bodies)
fn in_skipped(stack: &[(Block, usize)]) -> bool {
    matches!(stack.last(), Some((Block::Enum | Block::Other, _)))
}

fn parse_field(statement: &str) -> Option<RawField> {
    let caps = FIELD_RE.captures(statement)?;
    let number: u32 = caps[6].parse().ok()?;
    if number == 0 {
        return None;
    }

    let map_types = match (caps.get(3), caps.get(4)) {
        (Some(key), Some(value)) => Some((key.as_str().to_string(), value.as_str().to_string())),
        _ => None,
    };

    Some(RawField {
        label: caps.get(1).map(|m| m.as_str().to_string()),
        type_name: caps[2].to_string(),
        map_types,
        name: caps[5].to_string(),
        number,
    })
}

/// Replace comments with spaces, keeping newlines so line numbers hold
fn strip_comments(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    let mut chars = text.chars().peekable();
    let mut quote: Option<char> = None;

    while let Some(c) = chars.next() {
        if let Some(q) = quote {
            out.push(c);
            if c == '\\' {
                if let Some(escaped) = chars.next() {
                    out.push(escaped);
                }
            } else if c == q || c == '\n' {
                quote = None;
            }
            continue;
        }

        match (c, chars.peek()) {
            ('/', Some('/')) => {
                for skipped in chars.by_ref() {
                    if skipped == '\n' {
                        out.push('\n');
                        break;
                    }
                }
            }
            ('/', Some('*')) => {
                chars.next();
                let mut prev = '\0';
                for skipped in chars.by_ref() {
                    if skipped == '\n' {
                        out.push('\n');
                    }
                    if prev == '*' && skipped == '/' {
                        break;
                    }
                    prev = skipped;
                }
                out.push(' ');
            }
            ('"' | '\'', _) => {
                quote = Some(c);
                out.push(c);
            }
            _ => out.push(c),
        }
    }

    out
}

/// Cut text into statements and block delimiters, each tagged with the
/// 1-based line where it starts
fn split_pieces(text: &str) -> Vec<(Piece, usize)> {
    let mut pieces = Vec::new();
    let mut current = String::new();
    let mut start_line = 1;
    let mut line = 1;
    let mut quote: Option<char> = None;
    // Nesting of `[...]` field options, whose values may hold `{`, `}` and `;`
    let mut brackets = 0usize;

    for c in text.chars() {
        if let Some(q) = quote {
            current.push(c);
            if c == q {
                quote = None;
            }
            if c == '\n' {
                line += 1;
            }
            continue;
        }

        if brackets > 0 && matches!(c, ';' | '{' | '}') {
            current.push(c);
            continue;
        }

        match c {
            '[' => {
                brackets += 1;
                current.push(c);
            }
            ']' => {
                brackets = brackets.saturating_sub(1);
                current.push(c);
            }
            ';' => {
                let statement = take(&mut current);
                if !statement.is_empty() {
                    pieces.push((Piece::Statement(statement), start_line));
                }
            }
            '{' => {
                let header = take(&mut current);
                let open_line = start_line_or(line, &header, start_line);
                pieces.push((Piece::Open(header), open_line));
            }
            '}' => {
                let statement = take(&mut current);
                if !statement.is_empty() {
                    pieces.push((Piece::Statement(statement), start_line));
                }
                pieces.push((Piece::Close, line));
            }
            '"' | '\'' => {
                if current.trim().is_empty() {
                    start_line = line;
                }
                quote = Some(c);
                current.push(c);
            }
            '\n' => {
                line += 1;
                current.push(c);
            }
            _ => {
                if !c.is_whitespace() && current.trim().is_empty() {
                    start_line = line;
                }
                current.push(c);
            }
        }
    }

    let trailing = take(&mut current);
    if !trailing.is_empty() {
        pieces.push((Piece::Statement(trailing), start_line));
    }

    pieces
}

/// Collapse the buffered statement's whitespace and reset the buffer
fn take(current: &mut String) -> String {
    let normalized = current.split_whitespace().collect::<Vec<_>>().join(" ");
    current.clear();
    normalized
}

/// A `{` with no header text belongs to the line it appears on
fn start_line_or(line: usize, header: &str, start_line: usize) -> usize {
    if header.is_empty() {
        line
    } else {
        start_line
    }
}

#[derive(Clone, Copy, PartialEq, Eq)]
enum Declared {
    Message,
    Enum,
}

fn resolve(package: Option<String>, raw: Vec<RawMessage>, enum_paths: Vec<String>) -> ScannedSchema {
    let qualify = |path: &str| match &package {
        Some(pkg) => format!("{}.{}", pkg, path),
        None => path.to_string(),
    };

    let mut declared: HashMap<String, Declared> = HashMap::new();
    for message in &raw {
        declared.insert(qualify(&message.path), Declared::Message);
    }
    let enums: Vec<String> = enum_paths.iter().map(|path| qualify(path)).collect();
    for name in &enums {
        declared.entry(name.clone()).or_insert(Declared::Enum);
    }

    let messages = raw
        .into_iter()
        .map(|message| {
            let full_name = qualify(&message.path);
            let fields = message
                .fields
                .into_iter()
                .map(|field| {
                    let lookup = |type_name: &str| resolve_type(type_name, &full_name, &declared);
                    let shape = match (&field.map_types, field.label.as_deref()) {
                        (Some((key, value)), _) => FieldShape::Map {
                            key: lookup(key),
                            value: lookup(value),
                        },
                        (None, Some("repeated")) => FieldShape::Repeated(lookup(&field.type_name)),
                        (None, _) => FieldShape::Singular(lookup(&field.type_name)),
                    };
                    FieldDef {
                        name: field.name,
                        number: field.number,
                        shape,
                    }
                })
                .collect();

            MessageDef { full_name, fields }
        })
        .collect();

    ScannedSchema {
        package,
        messages,
        enums,
    }
}

/// Resolve a type reference from inside `scope` using protobuf scoping rules
fn resolve_type(type_name: &str, scope: &str, declared: &HashMap<String, Declared>) -> FieldType {
    if let Some(kind) = ScalarKind::from_name(type_name) {
        return FieldType::Scalar(kind);
    }

    let found = |candidate: &str| {
        declared.get(candidate).map(|kind| match kind {
            Declared::Message => FieldType::Message(candidate.to_string()),
            Declared::Enum => FieldType::Enum(candidate.to_string()),
        })
    };

    if let Some(absolute) = type_name.strip_prefix('.') {
        return found(absolute).unwrap_or_else(|| FieldType::Opaque(type_name.to_string()));
    }

    let mut scope = scope;
    loop {
        let candidate = if scope.is_empty() {
            type_name.to_string()
        } else {
            format!("{}.{}", scope, type_name)
        };
        if let Some(resolved) = found(&candidate) {
            return resolved;
        }
        if scope.is_empty() {
            return FieldType::Opaque(type_name.to_string());
        }
        scope = scope.rsplit_once('.').map(|(outer, _)| outer).unwrap_or("");
    }
}
