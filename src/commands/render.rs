//! Printing environments and property maps

use anyhow::Result;
use clap::ValueEnum;
use indexmap::IndexMap;

use config_hub::environment::{Environment, PropertyValue};

/// Output format for resolved configuration
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, ValueEnum)]
pub enum OutputFormat {
    /// The environment as JSON, as a config server returns it
    #[default]
    Json,
    /// The environment as YAML
    Yaml,
    /// Flat `key=value` lines, winning values only
    Properties,
}

pub fn environment(environment: &Environment, format: OutputFormat) -> Result<String> {
    Ok(match format {
        OutputFormat::Json => serde_json::to_string_pretty(environment)? + "\n",
        OutputFormat::Yaml => serde_yaml::to_string(environment)?,
        OutputFormat::Properties => properties(&environment.flatten()),
    })
}

/// Flat properties; JSON and YAML print a map of key to value.
pub fn flat(values: &IndexMap<String, PropertyValue>, format: OutputFormat) -> Result<String> {
    let plain: IndexMap<&str, &serde_json::Value> =
        values.iter().map(|(k, v)| (k.as_str(), v.value())).collect();
    Ok(match format {
        OutputFormat::Json => serde_json::to_string_pretty(&plain)? + "\n",
        OutputFormat::Yaml => serde_yaml::to_string(&plain)?,
        OutputFormat::Properties => properties(values),
    })
}

fn properties(values: &IndexMap<String, PropertyValue>) -> String {
    let mut out = String::new();
    for (key, value) in values {
        if let Some(origin) = value.origin() {
            out.push_str(&format!("# {}\n", origin));
        }
        out.push_str(&format!("{}={}\n", key, value.to_display_string()));
    }
    out
}
