/**
 * Core type definitions shared by the flattener and the send queue.
 *
 * `EventValue` is the richer, pre-flatten representation a producer
 * builds an event out of (numbers, strings, bools, big integers, nested
 * maps, ordered sequences, unordered sets, coerced errors). `FlatValue`
 * is what comes out of `flatten::flatten_event` — the only two shapes
 * the ingest endpoint accepts (§6): a JSON number or a JSON string.
 */
use std::collections::BTreeMap;

use serde::Serialize;

/// A fully-built event: a string-keyed map of `EventValue`s. Required
/// keys at emit time (`eventType`, `timestamp`) are enforced by the
/// `Agent`, not by this type — `Event` itself imposes no required keys
/// so that default-metric merging and flattening stay generic.
pub type Event = BTreeMap<String, EventValue>;

/// The pre-flatten value model.
///
/// Keys in `Map` are always `String` — Rust's type system enforces the
/// "drop non-string keys" rule from spec §4.1 structurally, so there is
/// no runtime check or drop path for that case.
#[derive(Debug, Clone, PartialEq)]
pub enum EventValue {
    Null,
    Bool(bool),
    Int(i64),
    UInt(u64),
    Float(f64),
    /// A big integer that does not fit in `i64`/`u64` — always
    /// stringified by the flattener, never treated as a JSON number.
    BigInt(i128),
    Str(String),
    Map(BTreeMap<String, EventValue>),
    /// An ordered sequence (Rust's analogue of a JS array).
    Seq(Vec<EventValue>),
    /// An unordered collection. Carried as a separate variant (rather
    /// than `std::collections::HashSet<EventValue>`, which would need
    /// `Eq`/`Hash` on floats) because the flattener's collapse rule is
    /// identical for sequences and sets — only the semantic tag differs.
    Set(Vec<EventValue>),
    /// A standard error, coerced per spec §4.1: name, message, code,
    /// plus any platform-attached extra keys. The stack trace is
    /// deliberately omitted.
    Error(ErrorValue),
    /// A function or other opaque, non-serializable value. Flattening
    /// this always fails with `FlattenError::UnsupportedProperty`.
    Unsupported,
}

#[derive(Debug, Clone, PartialEq, Default)]
pub struct ErrorValue {
    pub name: String,
    pub message: String,
    pub code: Option<i64>,
    pub extra: BTreeMap<String, EventValue>,
}

impl ErrorValue {
    pub fn new(name: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            message: message.into(),
            code: None,
            extra: BTreeMap::new(),
        }
    }

    pub fn with_code(mut self, code: i64) -> Self {
        self.code = Some(code);
        self
    }
}

impl From<&std::io::Error> for ErrorValue {
    fn from(err: &std::io::Error) -> Self {
        let mut ev = ErrorValue::new("io::Error", err.to_string());
        if let Some(code) = err.raw_os_error() {
            ev.code = Some(code as i64);
        }
        ev
    }
}

// ---------------------------------------------------------------------------
// Ergonomic conversions for building events
// ---------------------------------------------------------------------------

impl From<&str> for EventValue {
    fn from(s: &str) -> Self {
        EventValue::Str(s.to_string())
    }
}

impl From<String> for EventValue {
    fn from(s: String) -> Self {
        EventValue::Str(s)
    }
}

impl From<bool> for EventValue {
    fn from(b: bool) -> Self {
        EventValue::Bool(b)
    }
}

impl From<i64> for EventValue {
    fn from(v: i64) -> Self {
        EventValue::Int(v)
    }
}

impl From<u64> for EventValue {
    fn from(v: u64) -> Self {
        EventValue::UInt(v)
    }
}

impl From<f64> for EventValue {
    fn from(v: f64) -> Self {
        EventValue::Float(v)
    }
}

impl From<i128> for EventValue {
    fn from(v: i128) -> Self {
        EventValue::BigInt(v)
    }
}

impl From<ErrorValue> for EventValue {
    fn from(e: ErrorValue) -> Self {
        EventValue::Error(e)
    }
}

impl From<serde_json::Value> for EventValue {
    /// Converts an arbitrary `serde_json::Value` (e.g. a caller's
    /// custom metric payload decoded from JSON) into an `EventValue`.
    /// JSON has no big-integer, set, or error kinds, so those variants
    /// are never produced by this path.
    fn from(value: serde_json::Value) -> Self {
        match value {
            serde_json::Value::Null => EventValue::Null,
            serde_json::Value::Bool(b) => EventValue::Bool(b),
            serde_json::Value::Number(n) => {
                if let Some(i) = n.as_i64() {
                    EventValue::Int(i)
                } else if let Some(u) = n.as_u64() {
                    EventValue::UInt(u)
                } else {
                    EventValue::Float(n.as_f64().unwrap_or(0.0))
                }
            }
            serde_json::Value::String(s) => EventValue::Str(s),
            serde_json::Value::Array(items) => {
                EventValue::Seq(items.into_iter().map(EventValue::from).collect())
            }
            serde_json::Value::Object(map) => EventValue::Map(
                map.into_iter()
                    .map(|(k, v)| (k, EventValue::from(v)))
                    .collect(),
            ),
        }
    }
}

// ---------------------------------------------------------------------------
// FlatValue — the output of the flattener, and the wire representation
// ---------------------------------------------------------------------------

/// A flattened scalar: exactly what the ingest endpoint accepts per
/// spec §6 ("values are numbers or strings only").
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum FlatValue {
    Number(f64),
    Text(String),
}

impl FlatValue {
    pub fn as_f64(&self) -> Option<f64> {
        match self {
            FlatValue::Number(n) => Some(*n),
            FlatValue::Text(_) => None,
        }
    }
}
