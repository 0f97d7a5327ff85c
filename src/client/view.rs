//! Local view of remotely fetched configuration

use indexmap::IndexMap;

use crate::environment::{Environment, PropertySource, PropertyValue};

/// Prefix of property source names in a [`PropertyView`].
pub const SOURCE_PREFIX: &str = "configserver:";

/// The property sources of a fetched environment, as the client sees them.
///
/// Sources keep the server's order and lookups return the first match.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct PropertyView {
    sources: Vec<PropertySource>,
}

impl PropertyView {
    pub fn from_environment(environment: &Environment) -> Self {
        let sources = environment
            .property_sources
            .iter()
            .map(|source| {
                PropertySource::new(format!("{}{}", SOURCE_PREFIX, source.name), source.source.clone())
            })
            .collect();
        Self { sources }
    }

    pub fn sources(&self) -> &[PropertySource] {
        &self.sources
    }

    pub fn names(&self) -> Vec<&str> {
        self.sources.iter().map(|s| s.name.as_str()).collect()
    }

    pub fn get(&self, key: &str) -> Option<&PropertyValue> {
        self.sources.iter().find_map(|source| source.get(key))
    }

    /// Every key with its winning value.
    pub fn flatten(&self) -> IndexMap<String, PropertyValue> {
        let mut merged = IndexMap::new();
        for source in &self.sources {
            for (key, value) in &source.source {
                merged.entry(key.clone()).or_insert_with(|| value.clone());
            }
        }
        merged
    }

    pub fn is_empty(&self) -> bool {
        self.sources.is_empty()
    }
}
