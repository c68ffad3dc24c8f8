//! Values carried by properties and bindings.

use std::fmt;
use std::sync::Arc;

use indexmap::IndexMap;
use serde_json::Value as Json;

use crate::arena::BlockId;
use crate::event::Event;

/// Ordered map of plain nested data.
pub type ValueMap = IndexMap<String, Value>;

/// Payload of a property.
#[derive(Debug, Clone, PartialEq, Default)]
pub enum Value {
    /// Nothing stored (distinct from an explicit `Null`).
    #[default]
    Undefined,
    Null,
    Bool(bool),
    Number(f64),
    Text(Arc<str>),
    List(Arc<Vec<Value>>),
    Map(Arc<ValueMap>),
    /// A live Block. Ownership is tracked by the holding property.
    Block(BlockId),
    Event(Event),
}

impl Value {
    pub fn is_undefined(&self) -> bool {
        matches!(self, Value::Undefined)
    }

    /// Identity comparison used to suppress no-op updates.
    ///
    /// Numbers compare by value with NaN equal to itself, text by
    /// content, lists and maps by pointer.
    pub fn same(&self, other: &Value) -> bool {
        match (self, other) {
            (Value::Undefined, Value::Undefined) | (Value::Null, Value::Null) => true,
            (Value::Bool(a), Value::Bool(b)) => a == b,
            (Value::Number(a), Value::Number(b)) => a == b || (a.is_nan() && b.is_nan()),
            (Value::Text(a), Value::Text(b)) => a == b,
            (Value::List(a), Value::List(b)) => Arc::ptr_eq(a, b),
            (Value::Map(a), Value::Map(b)) => Arc::ptr_eq(a, b),
            (Value::Block(a), Value::Block(b)) => a == b,
            (Value::Event(a), Value::Event(b)) => a.same(b),
            _ => false,
        }
    }

    pub fn as_f64(&self) -> Option<f64> {
        match self {
            Value::Number(n) => Some(*n),
            Value::Bool(b) => Some(if *b { 1.0 } else { 0.0 }),
            Value::Text(s) => s.trim().parse().ok(),
            _ => None,
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            Value::Text(s) => Some(s),
            _ => None,
        }
    }

    pub fn as_block(&self) -> Option<BlockId> {
        match self {
            Value::Block(id) => Some(*id),
            _ => None,
        }
    }

    pub fn as_event(&self) -> Option<&Event> {
        match self {
            Value::Event(e) => Some(e),
            _ => None,
        }
    }

    pub fn truthy(&self) -> bool {
        match self {
            Value::Undefined | Value::Null => false,
            Value::Bool(b) => *b,
            Value::Number(n) => *n != 0.0 && !n.is_nan(),
            Value::Text(s) => !s.is_empty(),
            _ => true,
        }
    }

    /// Drill into plain nested data: a map field or a list index.
    ///
    /// Not reactive: changes below a plain value are only seen when the
    /// value itself is replaced.
    pub fn field(&self, name: &str) -> Option<Value> {
        match self {
            Value::Map(map) => map.get(name).cloned(),
            Value::List(list) => name.parse::<usize>().ok().and_then(|i| list.get(i).cloned()),
            _ => None,
        }
    }

    /// Convert plain JSON data. Objects become `Map`, keeping key order.
    pub fn from_json(json: &Json) -> Value {
        match json {
            Json::Null => Value::Null,
            Json::Bool(b) => Value::Bool(*b),
            Json::Number(n) => Value::Number(n.as_f64().unwrap_or(f64::NAN)),
            Json::String(s) => Value::Text(s.as_str().into()),
            Json::Array(items) => {
                Value::List(Arc::new(items.iter().map(Value::from_json).collect()))
            }
            Json::Object(map) => Value::Map(Arc::new(
                map.iter().map(|(k, v)| (k.clone(), Value::from_json(v))).collect(),
            )),
        }
    }

    /// Convert to JSON. Runtime-only values (undefined, blocks, events)
    /// have no serialized form.
    pub fn to_json(&self) -> Option<Json> {
        Some(match self {
            Value::Undefined | Value::Block(_) | Value::Event(_) => return None,
            Value::Null => Json::Null,
            Value::Bool(b) => Json::Bool(*b),
            Value::Number(n) => number_to_json(*n),
            Value::Text(s) => Json::String(s.to_string()),
            Value::List(items) => {
                Json::Array(items.iter().map(|v| v.to_json().unwrap_or(Json::Null)).collect())
            }
            Value::Map(map) => Json::Object(
                map.iter()
                    .filter_map(|(k, v)| v.to_json().map(|j| (k.clone(), j)))
                    .collect(),
            ),
        })
    }
}

/// Integral values serialize as JSON integers so saved data round-trips.
fn number_to_json(n: f64) -> Json {
    const MAX_SAFE: f64 = 9_007_199_254_740_991.0;
    if n.fract() == 0.0 && n.abs() <= MAX_SAFE {
        Json::from(n as i64)
    } else {
        serde_json::Number::from_f64(n).map(Json::Number).unwrap_or(Json::Null)
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Undefined => write!(f, "undefined"),
            Value::Null => write!(f, "null"),
            Value::Bool(b) => write!(f, "{}", b),
            Value::Number(n) => write!(f, "{}", n),
            Value::Text(s) => write!(f, "{}", s),
            Value::List(_) | Value::Map(_) => match self.to_json() {
                Some(json) => write!(f, "{}", json),
                None => write!(f, "[data]"),
            },
            Value::Block(id) => write!(f, "{:?}", id),
            Value::Event(e) => write!(f, "{}", e),
        }
    }
}

impl From<f64> for Value {
    fn from(n: f64) -> Self {
        Value::Number(n)
    }
}

impl From<i32> for Value {
    fn from(n: i32) -> Self {
        Value::Number(n as f64)
    }
}

impl From<bool> for Value {
    fn from(b: bool) -> Self {
        Value::Bool(b)
    }
}

impl From<&str> for Value {
    fn from(s: &str) -> Self {
        Value::Text(s.into())
    }
}

impl From<String> for Value {
    fn from(s: String) -> Self {
        Value::Text(s.into())
    }
}

impl From<BlockId> for Value {
    fn from(id: BlockId) -> Self {
        Value::Block(id)
    }
}

impl From<Event> for Value {
    fn from(e: Event) -> Self {
        Value::Event(e)
    }
}
