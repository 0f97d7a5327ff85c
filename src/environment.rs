//! # Environment Data Model
//!
//! The types every repository produces and every client consumes:
//!
//! - **`Environment`**: the resolved configuration for one
//!   (application, profiles, label) request. Its `property_sources` are
//!   ordered from highest to lowest precedence.
//! - **`PropertySource`**: one named, ordered map of properties. The name
//!   records provenance (backend URI plus file path) for diagnostics.
//! - **`PropertyValue`**: a scalar, optionally carrying a human-readable
//!   origin when the request asked for origin tracking.
//! - **`EnvironmentRequest`**: request identity with the well-known defaults
//!   applied.
//! - **`Locations`**: where on a synchronized workspace the files for a
//!   request live.
//!
//! Environments serialize with camelCase field names (`propertySources`), the
//! shape clients receive over the wire.

use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use serde_json::Value as JsonValue;
use std::path::PathBuf;

/// Application name used when a request does not name one.
pub const DEFAULT_APPLICATION: &str = "application";

/// Profile used when a request does not name one.
pub const DEFAULT_PROFILE: &str = "default";

/// A single property value.
///
/// Values are scalars (string, number, boolean or null). When a request sets
/// `include_origin`, each value is wrapped together with the place it was
/// read from.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum PropertyValue {
    /// A value with its provenance, e.g. `application.properties:3`.
    Tracked { value: JsonValue, origin: String },
    /// A bare scalar.
    Plain(JsonValue),
}

impl PropertyValue {
    /// Creates a plain string value.
    pub fn string(value: impl Into<String>) -> Self {
        PropertyValue::Plain(JsonValue::String(value.into()))
    }

    /// The underlying scalar.
    pub fn value(&self) -> &JsonValue {
        match self {
            PropertyValue::Tracked { value, .. } => value,
            PropertyValue::Plain(value) => value,
        }
    }

    /// The string content, if the scalar is a string.
    pub fn as_str(&self) -> Option<&str> {
        self.value().as_str()
    }

    /// The origin, if this value is tracked.
    pub fn origin(&self) -> Option<&str> {
        match self {
            PropertyValue::Tracked { origin, .. } => Some(origin),
            PropertyValue::Plain(_) => None,
        }
    }

    /// Replaces the scalar while keeping the origin.
    pub fn with_value(&self, value: JsonValue) -> Self {
        match self {
            PropertyValue::Tracked { origin, .. } => PropertyValue::Tracked {
                value,
                origin: origin.clone(),
            },
            PropertyValue::Plain(_) => PropertyValue::Plain(value),
        }
    }

    /// Renders the scalar the way a `.properties` file would hold it.
    pub fn to_display_string(&self) -> String {
        match self.value() {
            JsonValue::String(s) => s.clone(),
            JsonValue::Null => String::new(),
            other => other.to_string(),
        }
    }
}

impl From<&str> for PropertyValue {
    fn from(value: &str) -> Self {
        PropertyValue::string(value)
    }
}

/// A named, ordered set of properties.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PropertySource {
    pub name: String,
    #[serde(default)]
    pub source: IndexMap<String, PropertyValue>,
}

impl PropertySource {
    pub fn new(name: impl Into<String>, source: IndexMap<String, PropertyValue>) -> Self {
        Self {
            name: name.into(),
            source,
        }
    }

    pub fn get(&self, key: &str) -> Option<&PropertyValue> {
        self.source.get(key)
    }
}

/// The resolved configuration for one request.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Environment {
    pub name: String,
    #[serde(default)]
    pub profiles: Vec<String>,
    #[serde(default)]
    pub label: Option<String>,
    #[serde(default)]
    pub version: Option<String>,
    #[serde(default)]
    pub state: Option<String>,
    #[serde(default)]
    pub property_sources: Vec<PropertySource>,
}

impl Environment {
    pub fn new(name: impl Into<String>, profiles: Vec<String>, label: Option<String>) -> Self {
        Self {
            name: name.into(),
            profiles,
            label,
            version: None,
            state: None,
            property_sources: Vec::new(),
        }
    }

    /// An empty environment shaped after a request.
    pub fn for_request(request: &EnvironmentRequest) -> Self {
        Self::new(
            request.application.clone(),
            request.profiles(),
            request.label.clone(),
        )
    }

    /// Appends a source with lower precedence than every existing one.
    pub fn add(&mut self, source: PropertySource) {
        self.property_sources.push(source);
    }

    /// Appends sources, preserving their relative order.
    pub fn add_all(&mut self, sources: impl IntoIterator<Item = PropertySource>) {
        self.property_sources.extend(sources);
    }

    /// Looks a key up across all sources; the earliest source wins.
    pub fn get(&self, key: &str) -> Option<&PropertyValue> {
        self.property_sources
            .iter()
            .find_map(|source| source.source.get(key))
    }

    /// Flattens all sources into one map, earlier sources taking precedence.
    ///
    /// Keys keep the position of their first appearance.
    pub fn flatten(&self) -> IndexMap<String, PropertyValue> {
        let mut merged = IndexMap::new();
        for source in &self.property_sources {
            for (key, value) in &source.source {
                if !merged.contains_key(key) {
                    merged.insert(key.clone(), value.clone());
                }
            }
        }
        merged
    }
}

/// Identity of a resolution request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EnvironmentRequest {
    pub application: String,
    /// Comma-separated profile list, in increasing order of precedence.
    pub profile: String,
    pub label: Option<String>,
    pub include_origin: bool,
}

impl EnvironmentRequest {
    /// Builds a request, substituting the well-known defaults for blank
    /// application or profile names.
    pub fn new(application: &str, profile: &str) -> Self {
        let application = match application.trim() {
            "" => DEFAULT_APPLICATION,
            name => name,
        };
        let profile = match profile.trim() {
            "" => DEFAULT_PROFILE,
            profile => profile,
        };
        Self {
            application: application.to_string(),
            profile: profile.to_string(),
            label: None,
            include_origin: false,
        }
    }

    pub fn with_label(mut self, label: Option<&str>) -> Self {
        self.label = label
            .map(str::trim)
            .filter(|label| !label.is_empty())
            .map(str::to_string);
        self
    }

    pub fn with_origin(mut self, include_origin: bool) -> Self {
        self.include_origin = include_origin;
        self
    }

    /// The individual profiles, in the order given.
    pub fn profiles(&self) -> Vec<String> {
        split_profiles(&self.profile)
    }

    /// The individual applications, in the order given. The last one listed
    /// takes precedence.
    pub fn applications(&self) -> Vec<String> {
        split_applications(&self.application)
    }

    /// The same request for a different label.
    pub fn relabel(&self, label: &str) -> Self {
        let mut request = self.clone();
        request.label = Some(label.to_string());
        request
    }
}

/// Splits a comma-separated profile list, dropping blanks.
///
/// An empty list yields the default profile.
pub fn split_profiles(profile: &str) -> Vec<String> {
    let profiles: Vec<String> = profile
        .split(',')
        .map(str::trim)
        .filter(|p| !p.is_empty())
        .map(str::to_string)
        .collect();
    if profiles.is_empty() {
        vec![DEFAULT_PROFILE.to_string()]
    } else {
        profiles
    }
}

/// Splits a comma-separated application list, dropping blanks.
///
/// An empty list yields the default application.
pub fn split_applications(application: &str) -> Vec<String> {
    let applications: Vec<String> = application
        .split(',')
        .map(str::trim)
        .filter(|a| !a.is_empty())
        .map(str::to_string)
        .collect();
    if applications.is_empty() {
        vec![DEFAULT_APPLICATION.to_string()]
    } else {
        applications
    }
}

/// Where the files for one request live on a synchronized workspace.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Locations {
    pub application: String,
    pub profile: String,
    pub label: Option<String>,
    pub version: Option<String>,
    pub search_paths: Vec<PathBuf>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn source(name: &str, entries: &[(&str, &str)]) -> PropertySource {
        let mut map = IndexMap::new();
        for (k, v) in entries {
            map.insert(k.to_string(), PropertyValue::from(*v));
        }
        PropertySource::new(name, map)
    }

    #[test]
    fn test_request_defaults() {
        let request = EnvironmentRequest::new("", " ");
        assert_eq!(request.application, DEFAULT_APPLICATION);
        assert_eq!(request.profile, DEFAULT_PROFILE);
        assert_eq!(request.label, None);
    }

    #[test]
    fn test_blank_label_is_absent() {
        let request = EnvironmentRequest::new("app", "dev").with_label(Some("  "));
        assert_eq!(request.label, None);
    }

    #[test]
    fn test_split_profiles() {
        assert_eq!(split_profiles("dev, mysql,,"), vec!["dev", "mysql"]);
        assert_eq!(split_profiles(""), vec!["default"]);
    }

    #[test]
    fn test_split_applications() {
        assert_eq!(split_applications("foo, bar"), vec!["foo", "bar"]);
        assert_eq!(split_applications(" ,"), vec!["application"]);
        let request = EnvironmentRequest::new("foo,bar", "dev");
        assert_eq!(request.applications(), vec!["foo", "bar"]);
    }

    #[test]
    fn test_earlier_source_wins() {
        let mut env = Environment::new("app", vec!["dev".into()], None);
        env.add(source("high", &[("k", "first")]));
        env.add(source("low", &[("k", "second"), ("other", "x")]));

        assert_eq!(env.get("k").unwrap().as_str(), Some("first"));
        let flat = env.flatten();
        assert_eq!(flat.get("k").unwrap().as_str(), Some("first"));
        assert_eq!(flat.get("other").unwrap().as_str(), Some("x"));
    }

    #[test]
    fn test_serializes_with_camel_case() {
        let mut env = Environment::new("app", vec!["default".into()], Some("main".into()));
        env.version = Some("abc".into());
        env.add(source("file.yml", &[("a", "b")]));

        let json = serde_json::to_value(&env).unwrap();
        assert_eq!(json["propertySources"][0]["name"], "file.yml");
        assert_eq!(json["propertySources"][0]["source"]["a"], "b");
        assert_eq!(json["version"], "abc");
    }

    #[test]
    fn test_tracked_value_round_trips_through_json() {
        let text = r#"{"name":"app","profiles":["default"],"label":null,"version":null,"state":null,
            "propertySources":[{"name":"s","source":{"a":{"value":"x","origin":"a.yml (document #0)"},"b":3}}]}"#;
        let env: Environment = serde_json::from_str(text).unwrap();
        let a = env.get("a").unwrap();
        assert_eq!(a.as_str(), Some("x"));
        assert_eq!(a.origin(), Some("a.yml (document #0)"));
        assert_eq!(env.get("b").unwrap().value(), &json!(3));
    }

    #[test]
    fn test_with_value_keeps_origin() {
        let tracked = PropertyValue::Tracked {
            value: json!("{cipher}abc"),
            origin: "app.properties:2".into(),
        };
        let replaced = tracked.with_value(json!("plain"));
        assert_eq!(replaced.as_str(), Some("plain"));
        assert_eq!(replaced.origin(), Some("app.properties:2"));
    }

    #[test]
    fn test_display_string() {
        assert_eq!(PropertyValue::Plain(json!(8080)).to_display_string(), "8080");
        assert_eq!(PropertyValue::Plain(json!(null)).to_display_string(), "");
        assert_eq!(PropertyValue::string("x").to_display_string(), "x");
    }
}
