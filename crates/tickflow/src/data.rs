//! Serialized graph data.
//!
//! Flow data is a JSON object with reserved key conventions:
//!
//! - `#is`: function id of the block.
//! - `~key`: a binding (`"~a": "path"`) or a helper block (`"~a": {...}`).
//! - `@key`: attribute (display metadata).
//! - `^key`: reference into the global namespace.
//! - a nested object with `#is` or any `~` binding key is an embedded block,
//!   unless it is wrapped as `{"#is": {...}}`, meaning "this is data, not a
//!   block".
//!
//! Each field is classified once into [`FieldData`] when it is read.

use serde_json::{Map, Value as Json};

use crate::value::Value;

/// Serialized block: an ordered JSON object.
pub type DataMap = Map<String, Json>;

/// Key that holds a block's function id.
pub const IS_KEY: &str = "#is";

/// Classified field of a serialized block.
#[derive(Debug, Clone, PartialEq)]
pub enum FieldData<'a> {
    /// Literal value (plain data, possibly unwrapped from `{"#is": ...}`).
    Literal(Value),
    /// Direct binding to a path; `None` clears the binding.
    Binding(Option<&'a str>),
    /// Embedded block to construct.
    Block(&'a DataMap),
    /// Helper block feeding the property through `~name.#output`.
    Helper(&'a DataMap),
}

/// Classify one `key: value` entry, returning the property name it targets.
pub fn parse_field<'a>(key: &'a str, json: &'a Json) -> (&'a str, FieldData<'a>) {
    if let Some(name) = key.strip_prefix('~') {
        let field = match json {
            Json::String(path) => FieldData::Binding(Some(path.as_str())),
            Json::Object(map) => FieldData::Helper(map),
            _ => FieldData::Binding(None),
        };
        return (name, field);
    }
    let field = match json {
        Json::Object(map) => match map.get(IS_KEY) {
            // {"#is": {...}} wraps data that would otherwise look like a block
            Some(Json::Object(inner)) if map.len() == 1 => {
                FieldData::Literal(Value::from_json(&Json::Object(inner.clone())))
            }
            Some(_) => FieldData::Block(map),
            None if looks_like_block(map) => FieldData::Block(map),
            None => FieldData::Literal(Value::from_json(json)),
        },
        _ => FieldData::Literal(Value::from_json(json)),
    };
    (key, field)
}

/// Whether a JSON object would be read back as an embedded block.
pub fn looks_like_block(map: &DataMap) -> bool {
    map.contains_key(IS_KEY) || map.keys().any(|k| k.starts_with('~'))
}

/// Wrap literal data so it survives a load as data.
pub fn wrap_literal(json: Json) -> Json {
    match json {
        Json::Object(map) if looks_like_block(&map) => {
            let mut wrapper = DataMap::new();
            wrapper.insert(IS_KEY.to_string(), Json::Object(map));
            Json::Object(wrapper)
        }
        other => other,
    }
}

/// Stable string for structurally identical data, independent of key order.
pub fn canonical_key(json: &Json) -> String {
    fn sorted(json: &Json) -> Json {
        match json {
            Json::Object(map) => {
                let mut keys: Vec<&String> = map.keys().collect();
                keys.sort();
                Json::Object(keys.into_iter().map(|k| (k.clone(), sorted(&map[k]))).collect())
            }
            Json::Array(items) => Json::Array(items.iter().map(sorted).collect()),
            other => other.clone(),
        }
    }
    sorted(json).to_string()
}
