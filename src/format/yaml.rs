//! YAML (and JSON) property extraction
//!
//! Documents are parsed with `serde_yaml`, which also accepts JSON, and
//! flattened to dotted keys:
//!
//! ```yaml
//! server:
//!   port: 8080
//!   hosts: [a, b]
//! ```
//!
//! becomes `server.port = 8080`, `server.hosts[0] = a`, `server.hosts[1] = b`.
//! Empty mappings and sequences flatten to an empty string so their key is
//! still visible. Scalars keep their type (numbers and booleans stay numbers
//! and booleans); `null` becomes an empty string.

use indexmap::IndexMap;
use serde::Deserialize;
use serde_json::Value as JsonValue;
use serde_yaml::Value as YamlValue;

use crate::error::{Error, Result};

/// Parses every document of a YAML stream.
///
/// Empty documents (for example a leading `---`) are skipped.
pub fn parse_documents(text: &str, source_name: &str) -> Result<Vec<YamlValue>> {
    let mut documents = Vec::new();
    for document in serde_yaml::Deserializer::from_str(text) {
        let value = YamlValue::deserialize(document).map_err(|e| Error::PropertySource {
            source_name: source_name.to_string(),
            message: e.to_string(),
        })?;
        if !value.is_null() {
            documents.push(value);
        }
    }
    Ok(documents)
}

/// Flattens one document into dotted keys, in document order.
pub fn flatten(document: &YamlValue) -> IndexMap<String, JsonValue> {
    let mut out = IndexMap::new();
    flatten_into(document, "", &mut out);
    out
}

fn flatten_into(value: &YamlValue, path: &str, out: &mut IndexMap<String, JsonValue>) {
    match value {
        YamlValue::Mapping(map) => {
            if map.is_empty() && !path.is_empty() {
                out.insert(path.to_string(), JsonValue::String(String::new()));
            }
            for (key, child) in map {
                let key = key_to_string(key);
                let child_path = if path.is_empty() {
                    key
                } else {
                    format!("{}.{}", path, key)
                };
                flatten_into(child, &child_path, out);
            }
        }
        YamlValue::Sequence(items) => {
            if items.is_empty() && !path.is_empty() {
                out.insert(path.to_string(), JsonValue::String(String::new()));
            }
            for (i, child) in items.iter().enumerate() {
                flatten_into(child, &format!("{}[{}]", path, i), out);
            }
        }
        YamlValue::Tagged(tagged) => flatten_into(&tagged.value, path, out),
        scalar => {
            if !path.is_empty() {
                out.insert(path.to_string(), scalar_to_json(scalar));
            }
        }
    }
}

fn key_to_string(key: &YamlValue) -> String {
    match key {
        YamlValue::String(s) => s.clone(),
        YamlValue::Number(n) => n.to_string(),
        YamlValue::Bool(b) => b.to_string(),
        YamlValue::Null => String::new(),
        other => serde_yaml::to_string(other)
            .map(|s| s.trim().to_string())
            .unwrap_or_default(),
    }
}

fn scalar_to_json(value: &YamlValue) -> JsonValue {
    match value {
        YamlValue::Null => JsonValue::String(String::new()),
        YamlValue::Bool(b) => JsonValue::Bool(*b),
        YamlValue::Number(n) => {
            if let Some(i) = n.as_i64() {
                JsonValue::from(i)
            } else if let Some(u) = n.as_u64() {
                JsonValue::from(u)
            } else {
                n.as_f64()
                    .and_then(serde_json::Number::from_f64)
                    .map(JsonValue::Number)
                    .unwrap_or_else(|| JsonValue::String(n.to_string()))
            }
        }
        YamlValue::String(s) => JsonValue::String(s.clone()),
        other => JsonValue::String(
            serde_yaml::to_string(other)
                .map(|s| s.trim().to_string())
                .unwrap_or_default(),
        ),
    }
}

/// Every string scalar in a document, depth first.
///
/// Mapping keys are not included.
pub fn string_scalars(value: &YamlValue) -> Vec<&str> {
    let mut out = Vec::new();
    collect_strings(value, &mut out);
    out
}

fn collect_strings<'a>(value: &'a YamlValue, out: &mut Vec<&'a str>) {
    match value {
        YamlValue::String(s) => out.push(s),
        YamlValue::Mapping(map) => map.values().for_each(|v| collect_strings(v, out)),
        YamlValue::Sequence(items) => items.iter().for_each(|v| collect_strings(v, out)),
        YamlValue::Tagged(tagged) => collect_strings(&tagged.value, out),
        _ => {}
    }
}
