//! # Configuration Schema and Parsing
//!
//! This module defines the `config-hub.yaml` file and its parsing. The file
//! has two independent sections:
//!
//! - **`server`**: the backends that serve environments, plus the encryption
//!   keys used to decrypt `{cipher}` values.
//! - **`client`**: how `config-hub fetch` reaches one or more running config
//!   servers (see [`ClientSettings`]).
//!
//! ```yaml
//! server:
//!   backends:
//!     - type: git
//!       uri: https://example.com/config-repo.git
//!       search-paths: ["{application}"]
//!       repos:
//!         team-a:
//!           pattern: team-a*
//!           uri: https://example.com/{application}-config.git
//!     - type: native
//!       search-locations: ["/etc/config"]
//!   encrypt:
//!     keys:
//!       primary: s3cret
//! client:
//!   uris: ["http://localhost:8888"]
//! ```
//!
//! ## Backends
//!
//! `backends` is a closed set tagged by `type`. Backends are combined in
//! ascending `order`; a backend without `order` goes last, and backends with
//! the same order keep their position in the file.
//!
//! ## Route Inheritance
//!
//! Every entry under a git backend's `repos` is a route. Settings a route
//! leaves out are taken from its parent backend, so credentials and timeouts
//! only need to be written once.
//!
//! ## Validation
//!
//! [`parse`] checks the file eagerly and reports problems as
//! [`Error::ConfigParse`] with a hint on how to fix them.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use indexmap::IndexMap;
use serde::{Deserialize, Serialize};

use crate::client::settings::ClientSettings;
use crate::crypto::encryptor::{
    KeyRingLocator, NoKeyLocator, TextEncryptorLocator, DEFAULT_SALT,
};
use crate::environment::{DEFAULT_APPLICATION, DEFAULT_PROFILE};
use crate::error::{Error, Result};
use crate::git::RemoteOptions;
use crate::workspace::{WorkspaceSettings, MAIN_LABEL};

/// Alias given to a key configured with the single `key` setting.
pub const SINGLE_KEY_ALIAS: &str = "default";

/// The whole configuration file.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub struct Config {
    #[serde(default)]
    pub server: ServerConfig,
    #[serde(default)]
    pub client: Option<ClientSettings>,
}

fn default_application() -> String {
    DEFAULT_APPLICATION.to_string()
}

fn default_profile() -> String {
    DEFAULT_PROFILE.to_string()
}

fn default_label() -> String {
    MAIN_LABEL.to_string()
}

fn default_true() -> bool {
    true
}

fn default_timeout() -> u64 {
    5
}

fn default_salt() -> String {
    DEFAULT_SALT.to_string()
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub struct ServerConfig {
    /// Application used when a request names none.
    #[serde(default = "default_application")]
    pub default_application: String,
    /// Profile used when a request names none.
    #[serde(default = "default_profile")]
    pub default_profile: String,
    #[serde(default)]
    pub backends: Vec<BackendConfig>,
    /// Fail a request when any backend fails, instead of leaving it out.
    #[serde(default)]
    pub fail_on_error: bool,
    #[serde(default)]
    pub encrypt: Option<EncryptConfig>,
    /// Base directory for git workspaces.
    #[serde(default)]
    pub basedir: Option<PathBuf>,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            default_application: default_application(),
            default_profile: default_profile(),
            backends: Vec::new(),
            fail_on_error: false,
            encrypt: None,
            basedir: None,
        }
    }
}

/// One environment backend.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "kebab-case")]
pub enum BackendConfig {
    Git(GitBackendConfig),
    Native(NativeBackendConfig),
}

impl BackendConfig {
    pub fn order(&self) -> Option<i32> {
        match self {
            BackendConfig::Git(git) => git.order,
            BackendConfig::Native(native) => native.order,
        }
    }

    pub fn kind(&self) -> &'static str {
        match self {
            BackendConfig::Git(_) => "git",
            BackendConfig::Native(_) => "native",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub struct GitBackendConfig {
    #[serde(default)]
    pub order: Option<i32>,
    pub uri: String,
    #[serde(default = "default_label")]
    pub default_label: String,
    #[serde(default)]
    pub search_paths: Vec<String>,
    /// Base directory for this backend's workspaces.
    #[serde(default)]
    pub basedir: Option<PathBuf>,
    /// Seconds between fetches.
    #[serde(default)]
    pub refresh_rate: i64,
    #[serde(default)]
    pub force_pull: bool,
    #[serde(default)]
    pub clone_on_start: bool,
    #[serde(default)]
    pub delete_untracked_branches: bool,
    #[serde(default = "default_true")]
    pub try_master_branch: bool,
    #[serde(default = "default_true")]
    pub serve_stale: bool,
    #[serde(default)]
    pub skip_ssl_validation: bool,
    /// Network timeout in seconds.
    #[serde(default = "default_timeout")]
    pub timeout: u64,
    #[serde(default)]
    pub username: Option<String>,
    #[serde(default)]
    pub password: Option<String>,
    #[serde(default)]
    pub repos: IndexMap<String, RepoRouteConfig>,
}

impl GitBackendConfig {
    pub fn new(uri: &str) -> Self {
        Self {
            order: None,
            uri: uri.to_string(),
            default_label: default_label(),
            search_paths: Vec::new(),
            basedir: None,
            refresh_rate: 0,
            force_pull: false,
            clone_on_start: false,
            delete_untracked_branches: false,
            try_master_branch: true,
            serve_stale: true,
            skip_ssl_validation: false,
            timeout: default_timeout(),
            username: None,
            password: None,
            repos: IndexMap::new(),
        }
    }

    /// Workspace settings of the backend's default repository.
    pub fn workspace_settings(&self) -> WorkspaceSettings {
        WorkspaceSettings {
            uri: self.uri.clone(),
            default_label: self.default_label.clone(),
            search_paths: self.search_paths.clone(),
            refresh_rate: self.refresh_rate,
            force_pull: self.force_pull,
            delete_untracked_branches: self.delete_untracked_branches,
            try_master_branch: self.try_master_branch,
            clone_on_start: self.clone_on_start,
            serve_stale: self.serve_stale,
            remote: RemoteOptions {
                username: self.username.clone(),
                password: self.password.clone(),
                skip_ssl_validation: self.skip_ssl_validation,
                timeout_secs: self.timeout,
            },
        }
    }
}

/// Route patterns, written either as one comma-separated string or a list.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Patterns {
    One(String),
    Many(Vec<String>),
}

impl Default for Patterns {
    fn default() -> Self {
        Patterns::Many(Vec::new())
    }
}

impl Patterns {
    pub fn to_vec(&self) -> Vec<String> {
        let raw: Vec<&str> = match self {
            Patterns::One(pattern) => pattern.split(',').collect(),
            Patterns::Many(patterns) => patterns.iter().map(String::as_str).collect(),
        };
        raw.into_iter()
            .map(str::trim)
            .filter(|p| !p.is_empty())
            .map(str::to_string)
            .collect()
    }
}

/// A named route under a git backend.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub struct RepoRouteConfig {
    #[serde(default)]
    pub pattern: Patterns,
    pub uri: String,
    #[serde(default)]
    pub order: Option<i32>,
    #[serde(default)]
    pub default_label: Option<String>,
    #[serde(default)]
    pub search_paths: Option<Vec<String>>,
    /// Working directory for a route without placeholders.
    #[serde(default)]
    pub basedir: Option<PathBuf>,
    #[serde(default)]
    pub refresh_rate: Option<i64>,
    #[serde(default)]
    pub force_pull: Option<bool>,
    #[serde(default)]
    pub clone_on_start: Option<bool>,
    #[serde(default)]
    pub skip_ssl_validation: Option<bool>,
    #[serde(default)]
    pub timeout: Option<u64>,
    #[serde(default)]
    pub username: Option<String>,
    #[serde(default)]
    pub password: Option<String>,
}

impl RepoRouteConfig {
    /// Workspace settings of this route, unset fields taken from `parent`.
    pub fn workspace_settings(&self, parent: &GitBackendConfig) -> WorkspaceSettings {
        let inherited = parent.workspace_settings();
        WorkspaceSettings {
            uri: self.uri.clone(),
            default_label: self
                .default_label
                .clone()
                .unwrap_or(inherited.default_label),
            search_paths: self
                .search_paths
                .clone()
                .unwrap_or(inherited.search_paths),
            refresh_rate: self.refresh_rate.unwrap_or(inherited.refresh_rate),
            force_pull: self.force_pull.unwrap_or(inherited.force_pull),
            clone_on_start: self.clone_on_start.unwrap_or(inherited.clone_on_start),
            remote: RemoteOptions {
                username: self.username.clone().or(inherited.remote.username),
                password: self.password.clone().or(inherited.remote.password),
                skip_ssl_validation: self
                    .skip_ssl_validation
                    .unwrap_or(inherited.remote.skip_ssl_validation),
                timeout_secs: self.timeout.unwrap_or(inherited.remote.timeout_secs),
            },
            ..inherited
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub struct NativeBackendConfig {
    #[serde(default)]
    pub order: Option<i32>,
    pub search_locations: Vec<String>,
    /// Label substituted into `{label}` locations when a request has none.
    #[serde(default)]
    pub default_label: Option<String>,
}

/// Keys for `{cipher}` values.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub struct EncryptConfig {
    #[serde(default = "default_salt")]
    pub salt: String,
    /// A single passphrase, registered under the alias `default`.
    #[serde(default)]
    pub key: Option<String>,
    /// Passphrases by alias.
    #[serde(default)]
    pub keys: IndexMap<String, String>,
    #[serde(default)]
    pub default_key: Option<String>,
}

impl Default for EncryptConfig {
    fn default() -> Self {
        Self {
            salt: default_salt(),
            key: None,
            keys: IndexMap::new(),
            default_key: None,
        }
    }
}

impl EncryptConfig {
    /// Every passphrase by alias, the single `key` included.
    pub fn passphrases(&self) -> IndexMap<String, String> {
        let mut passphrases = self.keys.clone();
        if let Some(key) = &self.key {
            passphrases
                .entry(SINGLE_KEY_ALIAS.to_string())
                .or_insert_with(|| key.clone());
        }
        passphrases
    }

    /// Builds the locator for these keys.
    pub fn locator(&self) -> Result<Arc<dyn TextEncryptorLocator>> {
        let passphrases = self.passphrases();
        if passphrases.is_empty() {
            return Ok(Arc::new(NoKeyLocator));
        }
        let default_alias = self.default_key.as_deref().or_else(|| {
            if self.key.is_some() {
                Some(SINGLE_KEY_ALIAS)
            } else {
                None
            }
        });
        Ok(Arc::new(KeyRingLocator::from_passphrases(
            &passphrases,
            &self.salt,
            default_alias,
        )?))
    }
}

/// Locator for an optional `encrypt` section.
pub fn locator(encrypt: Option<&EncryptConfig>) -> Result<Arc<dyn TextEncryptorLocator>> {
    match encrypt {
        Some(encrypt) => encrypt.locator(),
        None => Ok(Arc::new(NoKeyLocator)),
    }
}

/// Parses and validates a YAML configuration.
pub fn parse(yaml_content: &str) -> Result<Config> {
    // an empty file is an empty configuration
    if yaml_content.trim().is_empty() {
        return Ok(Config::default());
    }
    let config: Config = serde_yaml::from_str(yaml_content)?;
    validate(&config)?;
    Ok(config)
}

/// Parses a configuration file.
pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Config> {
    let content = std::fs::read_to_string(path).map_err(Error::Io)?;
    parse(&content)
}

fn validate(config: &Config) -> Result<()> {
    for (i, backend) in config.server.backends.iter().enumerate() {
        match backend {
            BackendConfig::Git(git) => {
                if git.uri.trim().is_empty() {
                    return Err(Error::ConfigParse {
                        message: format!("git backend #{} has an empty uri", i + 1),
                        hint: Some("Set 'uri:' to the repository to serve".to_string()),
                    });
                }
                for (name, route) in &git.repos {
                    if route.uri.trim().is_empty() {
                        return Err(Error::ConfigParse {
                            message: format!("route '{}' has an empty uri", name),
                            hint: Some(format!("Set 'uri:' under repos.{}", name)),
                        });
                    }
                }
            }
            BackendConfig::Native(native) => {
                if native.search_locations.is_empty() {
                    return Err(Error::ConfigParse {
                        message: format!("native backend #{} has no search locations", i + 1),
                        hint: Some("Add 'search-locations:' with at least one directory".to_string()),
                    });
                }
            }
        }
    }

    if let Some(encrypt) = &config.server.encrypt {
        if let Some(alias) = &encrypt.default_key {
            if !encrypt.passphrases().contains_key(alias) {
                return Err(Error::ConfigParse {
                    message: format!("default key '{}' is not defined", alias),
                    hint: Some(format!("Add '{}' under encrypt.keys", alias)),
                });
            }
        }
        if encrypt.passphrases().values().any(|p| p.is_empty()) {
            return Err(Error::ConfigParse {
                message: "encryption keys must not be empty".to_string(),
                hint: None,
            });
        }
    }

    if let Some(client) = &config.client {
        client.validate().map_err(|e| Error::ConfigParse {
            message: e.to_string(),
            hint: Some("Check the 'client:' section".to_string()),
        })?;
    }
    Ok(())
}
