//! Checked access to a parsed JSON tree.
//!
//! Capture files are loosely typed, so nothing here assumes a key exists or
//! holds the expected kind of value: every accessor answers `None` on absence
//! or mismatch.

use serde_json::{Map, Value};

const UTF8_BOM: char = '\u{feff}';

pub fn parse_tree(text: &str) -> Result<Value, serde_json::Error> {
    serde_json::from_str(text.strip_prefix(UTF8_BOM).unwrap_or(text))
}

pub fn member<'a>(value: &'a Value, key: &str) -> Option<&'a Value> {
    value.as_object()?.get(key)
}

pub fn object_member<'a>(value: &'a Value, key: &str) -> Option<&'a Map<String, Value>> {
    member(value, key)?.as_object()
}

pub fn str_member<'a>(value: &'a Value, key: &str) -> Option<&'a str> {
    member(value, key)?.as_str()
}

/// Short human name for a value's kind, used in diagnostics.
pub fn kind(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "boolean",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}
