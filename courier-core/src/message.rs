//! Message types and payload field helpers
//!
//! Payloads travel as `serde_json::Value` documents. The routing key of a
//! payload is its [`MessageType`], read from `method` (or `type` when
//! `method` is empty) unless a custom hook says otherwise.

use serde_json::{Map, Value};
use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

/// Field holding the RPC-style message type
pub const METHOD_FIELD: &str = "method";
/// Field holding the event-style message type
pub const TYPE_FIELD: &str = "type";
/// Field carrying the id of an outgoing request
pub const REQUEST_ID_FIELD: &str = "requestId";
/// Field carrying the id a reply answers
pub const RESPONSE_ID_FIELD: &str = "responseId";
/// Field partitioning one channel into logical peers
pub const SCOPE_FIELD: &str = "scope";
/// Field holding the business data of a payload
pub const DATA_FIELD: &str = "data";

static NEXT_SYMBOL: AtomicU64 = AtomicU64::new(1);

/// Opaque routing token, equal only to itself and its clones
#[derive(Clone)]
pub struct Symbol {
    id: u64,
    description: Arc<str>,
}

impl Symbol {
    /// Create a fresh token; two calls never produce equal symbols
    pub fn new(description: impl Into<String>) -> Self {
        Self {
            id: NEXT_SYMBOL.fetch_add(1, Ordering::Relaxed),
            description: Arc::from(description.into()),
        }
    }

    /// Diagnostic description
    pub fn description(&self) -> &str {
        &self.description
    }
}

impl PartialEq for Symbol {
    fn eq(&self, other: &Self) -> bool {
        self.id == other.id
    }
}

impl Eq for Symbol {}

impl std::hash::Hash for Symbol {
    fn hash<H: std::hash::Hasher>(&self, state: &mut H) {
        self.id.hash(state);
    }
}

impl fmt::Debug for Symbol {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Symbol({})", self.description)
    }
}

/// Routing key of a message
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum MessageType {
    /// String name, e.g. `"ping"`
    Name(String),
    /// Numeric code
    Code(i64),
    /// Opaque token
    Symbol(Symbol),
}

impl MessageType {
    /// Read a message type from a JSON value (strings and integers only)
    pub fn from_value(value: &Value) -> Option<Self> {
        match value {
            Value::String(s) => Some(MessageType::Name(s.clone())),
            Value::Number(n) => n.as_i64().map(MessageType::Code),
            _ => None,
        }
    }
}

impl fmt::Display for MessageType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            MessageType::Name(name) => f.write_str(name),
            MessageType::Code(code) => write!(f, "{}", code),
            MessageType::Symbol(symbol) => write!(f, "Symbol({})", symbol.description()),
        }
    }
}

impl From<&str> for MessageType {
    fn from(name: &str) -> Self {
        MessageType::Name(name.to_string())
    }
}

impl From<String> for MessageType {
    fn from(name: String) -> Self {
        MessageType::Name(name)
    }
}

impl From<i64> for MessageType {
    fn from(code: i64) -> Self {
        MessageType::Code(code)
    }
}

impl From<i32> for MessageType {
    fn from(code: i32) -> Self {
        MessageType::Code(code.into())
    }
}

impl From<Symbol> for MessageType {
    fn from(symbol: Symbol) -> Self {
        MessageType::Symbol(symbol)
    }
}

/// JavaScript-style truthiness, used for the `method || type` fallback
fn is_truthy(value: &Value) -> bool {
    match value {
        Value::Null => false,
        Value::Bool(b) => *b,
        Value::Number(n) => n.as_f64().map(|f| f != 0.0).unwrap_or(true),
        Value::String(s) => !s.is_empty(),
        Value::Array(_) | Value::Object(_) => true,
    }
}

/// Default message type extraction: `method`, falling back to `type`
pub fn message_type_of(payload: &Value) -> Option<MessageType> {
    let method = payload.get(METHOD_FIELD).filter(|v| is_truthy(v));
    method
        .or_else(|| payload.get(TYPE_FIELD))
        .and_then(MessageType::from_value)
}

/// Read a string field, treating non-strings as absent
pub fn str_field(payload: &Value, field: &str) -> Option<String> {
    payload
        .get(field)
        .and_then(|v| v.as_str())
        .map(ToString::to_string)
}

/// Whether the payload object carries `field` at all (null counts)
pub fn has_field(payload: &Value, field: &str) -> bool {
    payload
        .as_object()
        .map(|obj| obj.contains_key(field))
        .unwrap_or(false)
}

/// Narrow a reply to its `data` field
pub fn data_of(payload: Value) -> Value {
    match payload {
        Value::Object(mut obj) => obj.remove(DATA_FIELD).unwrap_or(Value::Null),
        _ => Value::Null,
    }
}

/// Build a request payload `{ method, data }`
pub fn request(method: impl Into<String>, data: Value) -> Value {
    let mut obj = Map::new();
    obj.insert(METHOD_FIELD.to_string(), Value::String(method.into()));
    obj.insert(DATA_FIELD.to_string(), data);
    Value::Object(obj)
}
