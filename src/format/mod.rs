//! Property file formats
//!
//! Each supported format has its own submodule; this module picks the right
//! one by file extension and applies the rules shared by all of them:
//! document activation by profile and origin tracking.
//!
//! ## Supported Formats
//!
//! - Properties (properties.rs) - flat `key=value` lines
//! - YAML and JSON (yaml.rs) - nested documents flattened to dotted keys
//!
//! ## Profile Activation
//!
//! A document that sets `spring.config.activate.on-profile` (or the legacy
//! `spring.profiles`) only applies when the expression matches one of the
//! requested profiles. The expression is a comma-separated list; an entry
//! `!name` matches when `name` is not requested. Documents without the marker
//! always apply.

pub mod properties;
pub mod yaml;

use std::path::Path;

use indexmap::IndexMap;
use serde_json::Value as JsonValue;

use crate::environment::PropertyValue;
use crate::error::Result;

/// Key that restricts a document to some profiles.
pub const ACTIVATE_ON_PROFILE: &str = "spring.config.activate.on-profile";
/// Older spelling of [`ACTIVATE_ON_PROFILE`].
pub const LEGACY_PROFILES: &str = "spring.profiles";

/// Extensions probed for every candidate file name, highest precedence first.
pub const EXTENSIONS: [&str; 4] = ["properties", "yml", "yaml", "json"];

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FileFormat {
    Properties,
    Yaml,
    Json,
}

impl FileFormat {
    pub fn from_extension(extension: &str) -> Option<Self> {
        match extension.to_ascii_lowercase().as_str() {
            "properties" => Some(FileFormat::Properties),
            "yml" | "yaml" => Some(FileFormat::Yaml),
            "json" => Some(FileFormat::Json),
            _ => None,
        }
    }

    pub fn from_path(path: &Path) -> Option<Self> {
        path.extension()
            .and_then(|ext| ext.to_str())
            .and_then(Self::from_extension)
    }
}

/// One document of a file that applies to the requested profiles.
#[derive(Debug, Clone, PartialEq)]
pub struct Document {
    /// Zero-based position of the document in its file.
    pub index: usize,
    /// Total number of documents in the file, applicable or not.
    pub total: usize,
    pub properties: IndexMap<String, PropertyValue>,
}

/// Parses `text` and returns the documents that apply to `profiles`, in file
/// order.
///
/// `display_name` names the file in origins and error messages.
pub fn load_documents(
    text: &str,
    format: FileFormat,
    display_name: &str,
    profiles: &[String],
    include_origin: bool,
) -> Result<Vec<Document>> {
    let parsed: Vec<Vec<(String, JsonValue, String)>> = match format {
        FileFormat::Properties => properties::parse_documents(text, display_name)?
            .into_iter()
            .map(|entries| {
                entries
                    .into_iter()
                    .map(|p| {
                        let origin = format!("{}:{}", display_name, p.line);
                        (p.key, JsonValue::String(p.value), origin)
                    })
                    .collect()
            })
            .collect(),
        FileFormat::Yaml | FileFormat::Json => yaml::parse_documents(text, display_name)?
            .iter()
            .enumerate()
            .map(|(i, document)| {
                let origin = format!("{} (document #{})", display_name, i);
                yaml::flatten(document)
                    .into_iter()
                    .map(|(k, v)| (k, v, origin.clone()))
                    .collect()
            })
            .collect(),
    };

    let total = parsed.len();
    let documents = parsed
        .into_iter()
        .enumerate()
        .filter(|(_, entries)| !entries.is_empty())
        .filter(|(_, entries)| document_applies(entries, profiles))
        .map(|(index, entries)| {
            let properties = entries
                .into_iter()
                .map(|(key, value, origin)| {
                    let value = if include_origin {
                        PropertyValue::Tracked { value, origin }
                    } else {
                        PropertyValue::Plain(value)
                    };
                    (key, value)
                })
                .collect();
            Document {
                index,
                total,
                properties,
            }
        })
        .collect();
    Ok(documents)
}

fn document_applies(entries: &[(String, JsonValue, String)], profiles: &[String]) -> bool {
    let expressions: Vec<String> = entries
        .iter()
        .filter(|(key, _, _)| is_activation_key(key))
        .map(|(_, value, _)| match value {
            JsonValue::String(s) => s.clone(),
            other => other.to_string(),
        })
        .collect();
    if expressions.is_empty() {
        return true;
    }
    profiles_match(&expressions.join(","), profiles)
}

fn is_activation_key(key: &str) -> bool {
    [ACTIVATE_ON_PROFILE, LEGACY_PROFILES].iter().any(|marker| {
        key == *marker
            || key
                .strip_prefix(marker)
                .is_some_and(|rest| rest.starts_with('['))
    })
}

/// Evaluates a comma-separated activation expression against the requested
/// profiles.
pub fn profiles_match(expression: &str, profiles: &[String]) -> bool {
    expression
        .split(',')
        .map(str::trim)
        .filter(|p| !p.is_empty())
        .any(|entry| match entry.strip_prefix('!') {
            Some(negated) => !profiles.iter().any(|p| p == negated.trim()),
            None => profiles.iter().any(|p| p == entry),
        })
}
