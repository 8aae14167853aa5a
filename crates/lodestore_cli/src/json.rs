//! Conversion of records and keys to JSON for output.

use lodestore_codec::Value;
use lodestore_core::PrimaryKey;
use serde_json::{Map, Number, Value as Json};

fn hex(bytes: &[u8]) -> String {
    bytes.iter().map(|b| format!("{b:02x}")).collect()
}

/// Renders a record value as JSON. Byte strings become hex text; non-text
/// map keys use their display form.
pub fn value_to_json(value: &Value) -> Json {
    match value {
        Value::Null => Json::Null,
        Value::Bool(b) => Json::Bool(*b),
        Value::Integer(n) => Json::Number(Number::from(*n)),
        Value::Bytes(b) => Json::String(hex(b)),
        Value::Text(s) => Json::String(s.clone()),
        Value::Array(items) => Json::Array(items.iter().map(value_to_json).collect()),
        Value::Map(pairs) => {
            let mut object = Map::new();
            for (k, v) in pairs {
                let key = match k {
                    Value::Text(s) => s.clone(),
                    other => other.to_string(),
                };
                object.insert(key, value_to_json(v));
            }
            Json::Object(object)
        }
    }
}

/// Renders a primary key as JSON.
pub fn key_to_json(key: &PrimaryKey) -> Json {
    match key {
        PrimaryKey::Int(n) | PrimaryKey::Timestamp(n) => Json::Number(Number::from(*n)),
        PrimaryKey::UInt(n) => Json::Number(Number::from(*n)),
        PrimaryKey::Text(s) => Json::String(s.clone()),
        PrimaryKey::Bytes(b) => Json::String(hex(b)),
        PrimaryKey::Uuid(u) => Json::String(u.to_string()),
    }
}

/// Parses a key given on the command line: integer if it parses as one,
/// text otherwise.
pub fn parse_key(raw: &str) -> PrimaryKey {
    raw.parse::<i64>()
        .map_or_else(|_| PrimaryKey::Text(raw.to_string()), PrimaryKey::Int)
}
