//! Payload normalization
//!
//! Advertisement and attribute payloads arrive in a handful of loose shapes:
//! byte blobs, vendor maps keyed by company id, lists of UUIDs, plain scalars.
//! `normalize` turns a [`Payload`] into a `serde_json::Value` that is text-safe
//! and order-stable, so identical inputs always serialize to identical bytes.

use serde_json::{Map, Number, Value};
use thiserror::Error;

/// Deepest nesting accepted before the payload is rejected
pub const MAX_DEPTH: usize = 32;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum NormalizeError {
    #[error("payload nesting exceeds {limit} levels")]
    TooDeep { limit: usize },

    #[error("payload map has more than one entry rendering to key '{key}'")]
    DuplicateKey { key: String },
}

/// Map key as reported by the protocol layer
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Key {
    Text(String),
    /// Numeric ids such as company identifiers or property bitmasks
    Number(u64),
}

impl Key {
    /// Numeric keys become `0x`-prefixed hex, at least four digits wide
    pub fn render(&self) -> String {
        match self {
            Key::Text(text) => text.clone(),
            Key::Number(value) => format!("{:#06x}", value),
        }
    }
}

impl From<&str> for Key {
    fn from(text: &str) -> Self {
        Key::Text(text.to_string())
    }
}

impl From<u16> for Key {
    fn from(value: u16) -> Self {
        Key::Number(value as u64)
    }
}

/// Loosely-typed payload from the protocol layer
#[derive(Debug, Clone, PartialEq)]
pub enum Payload {
    Null,
    Bool(bool),
    Int(i64),
    Float(f64),
    Text(String),
    Bytes(Vec<u8>),
    List(Vec<Payload>),
    Map(Vec<(Key, Payload)>),
}

impl From<&str> for Payload {
    fn from(text: &str) -> Self {
        Payload::Text(text.to_string())
    }
}

impl From<String> for Payload {
    fn from(text: String) -> Self {
        Payload::Text(text)
    }
}

impl From<i64> for Payload {
    fn from(value: i64) -> Self {
        Payload::Int(value)
    }
}

impl From<bool> for Payload {
    fn from(value: bool) -> Self {
        Payload::Bool(value)
    }
}

impl<T: Into<Payload>> From<Option<T>> for Payload {
    fn from(value: Option<T>) -> Self {
        value.map(Into::into).unwrap_or(Payload::Null)
    }
}

/// Convert a payload into its canonical JSON form
pub fn normalize(payload: &Payload) -> Result<Value, NormalizeError> {
    normalize_at(payload, 0)
}

/// Normalize a map payload into a JSON object
pub fn normalize_map(entries: &[(Key, Payload)]) -> Result<Map<String, Value>, NormalizeError> {
    map_at(entries, 0)
}

fn normalize_at(payload: &Payload, depth: usize) -> Result<Value, NormalizeError> {
    if depth > MAX_DEPTH {
        return Err(NormalizeError::TooDeep { limit: MAX_DEPTH });
    }

    let value = match payload {
        Payload::Null => Value::Null,
        Payload::Bool(b) => Value::Bool(*b),
        Payload::Int(i) => Value::Number((*i).into()),
        // JSON has no NaN or infinity
        Payload::Float(f) => Number::from_f64(*f).map(Value::Number).unwrap_or(Value::Null),
        Payload::Text(text) => Value::String(text.clone()),
        Payload::Bytes(bytes) => Value::String(hex::encode(bytes)),
        Payload::List(items) => Value::Array(
            items
                .iter()
                .map(|item| normalize_at(item, depth + 1))
                .collect::<Result<_, _>>()?,
        ),
        Payload::Map(entries) => Value::Object(map_at(entries, depth)?),
    };
    Ok(value)
}

fn map_at(entries: &[(Key, Payload)], depth: usize) -> Result<Map<String, Value>, NormalizeError> {
    if depth > MAX_DEPTH {
        return Err(NormalizeError::TooDeep { limit: MAX_DEPTH });
    }
    let mut map = Map::new();
    for (key, value) in entries {
        let rendered = key.render();
        if map.contains_key(&rendered) {
            return Err(NormalizeError::DuplicateKey { key: rendered });
        }
        map.insert(rendered, normalize_at(value, depth + 1)?);
    }
    Ok(map)
}

/// Canonical capability tags: lowercase, sorted, no duplicates
pub fn normalize_properties(tags: &[String]) -> Vec<String> {
    let mut normalized: Vec<String> = tags
        .iter()
        .map(|tag| tag.trim().to_lowercase())
        .filter(|tag| !tag.is_empty())
        .collect();
    normalized.sort();
    normalized.dedup();
    normalized
}
