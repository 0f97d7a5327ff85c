//! # Error Handling
//!
//! This module defines the centralized error type for `config-hub`. It uses
//! `thiserror` to build one `Error` enum covering every anticipated failure
//! mode, with descriptive messages and enough structure for callers to decide
//! how to degrade.
//!
//! ## Classification
//!
//! A few variants carry meaning beyond their message:
//!
//! - **`NoSuchLabel`**: the requested branch, tag or commit does not exist.
//!   Routing and composite layers treat it as "not found" and move on.
//! - **`NoSuchRepository`**: the remote store could not be reached or cloned.
//! - **`ScmUpdateFailed`**: a sync failed but a previously synchronized
//!   version is still checked out; it carries that fallback version.
//! - **`ClientFailFast`**: client-side retrieval exhausted every endpoint and
//!   retry with fail-fast enabled. This one is always surfaced.
//!
//! Everything else is either a wrapped library error (`Io`, `Yaml`, `Json`,
//! ...) or a descriptive variant for a specific subsystem.

use thiserror::Error;

/// Main error type for config-hub operations
#[derive(Error, Debug)]
pub enum Error {
    /// The configuration file could not be parsed or failed validation.
    #[error("Configuration parsing error: {message}{}", hint.as_ref().map(|h| format!("\n  hint: {}", h)).unwrap_or_default())]
    ConfigParse {
        message: String,
        /// Optional hint for how to fix the configuration issue
        hint: Option<String>,
    },

    /// A configuration combination that is rejected eagerly.
    #[error("Invalid configuration: {message}")]
    InvalidConfig { message: String },

    /// The requested label (branch, tag or commit) does not exist.
    #[error("No such label: {label}")]
    NoSuchLabel { label: String },

    /// No backend has a plain resource file at the requested path.
    #[error("No such resource: {path}")]
    NoSuchResource { path: String },

    /// The backing repository could not be reached, cloned or opened.
    #[error("No such repository: {uri}: {message}")]
    NoSuchRepository { uri: String, message: String },

    /// A sync failed, but the workspace still holds a usable version.
    #[error("Could not update {uri} for label {label}, last known version is {fallback_version}: {message}")]
    ScmUpdateFailed {
        uri: String,
        label: String,
        fallback_version: String,
        message: String,
    },

    /// An error occurred while executing a Git command.
    #[error("Git command failed for {uri}: {command} - {stderr}")]
    GitCommand {
        command: String,
        uri: String,
        stderr: String,
    },

    /// A property file could not be read or parsed.
    #[error("Cannot load property source {source_name}: {message}")]
    PropertySource {
        source_name: String,
        message: String,
    },

    /// A value could not be encrypted or decrypted.
    #[error("Cipher operation failed: {message}")]
    Cipher { message: String },

    /// A malformed `{name:value}` prefix or key selection.
    #[error("Invalid key selection: {message}")]
    KeyFormat { message: String },

    /// A member of a composite repository failed and `fail-on-error` is set.
    #[error("Repository {repository} failed: {source}")]
    Aggregation {
        repository: String,
        #[source]
        source: Box<Error>,
    },

    /// Remote configuration could not be retrieved and fail-fast is enabled.
    #[error("Could not locate remote configuration after trying [{}] ({attempts} attempt(s)): {cause}", endpoints.join(", "))]
    ClientFailFast {
        endpoints: Vec<String>,
        attempts: u32,
        cause: String,
    },

    /// An error occurred during a network operation.
    #[error("Network operation error: {url} - {message}")]
    Network { url: String, message: String },

    /// An I/O error, wrapped from `std::io::Error`.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// A YAML parsing error, wrapped from `serde_yaml::Error`.
    #[error("YAML parsing error: {0}")]
    Yaml(#[from] serde_yaml::Error),

    /// A JSON error, wrapped from `serde_json::Error`.
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// A glob pattern error, wrapped from `glob::PatternError`.
    #[error("Glob pattern error: {0}")]
    Glob(#[from] glob::PatternError),

    /// A URL parsing error, wrapped from `url::ParseError`.
    #[error("URL parsing error: {0}")]
    UrlParse(#[from] url::ParseError),

    /// An HTTP client error, wrapped from `reqwest::Error`.
    #[error("HTTP client error: {0}")]
    Http(#[from] reqwest::Error),

    /// An error indicating that a mutex or other lock has been poisoned.
    #[error("Lock poisoned: {context}")]
    LockPoisoned { context: String },
}

impl Error {
    /// Whether this error means "the store has no such data" rather than
    /// "the store is broken".
    pub fn is_not_found(&self) -> bool {
        matches!(
            self,
            Error::NoSuchLabel { .. } | Error::NoSuchResource { .. }
        )
    }

    /// The version a failed sync left checked out, if any.
    pub fn fallback_version(&self) -> Option<&str> {
        match self {
            Error::ScmUpdateFailed {
                fallback_version, ..
            } => Some(fallback_version),
            _ => None,
        }
    }
}

/// A convenient type alias for `Result<T, Error>`.
pub type Result<T> = std::result::Result<T, Error>;
