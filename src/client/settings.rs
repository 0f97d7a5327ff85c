//! Client configuration

use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use url::Url;

use super::retry::RetryPolicy;
use crate::environment::{DEFAULT_APPLICATION, DEFAULT_PROFILE};
use crate::error::{Error, Result};

/// Header carrying an explicit authorization.
pub const AUTHORIZATION_HEADER: &str = "authorization";
/// Header carrying the server access token.
pub const TOKEN_HEADER: &str = "X-Config-Token";

/// When the client moves on to the next server URI.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum MultipleUriStrategy {
    /// Any failure advances to the next URI.
    #[default]
    #[serde(alias = "ALWAYS")]
    Always,
    /// Only connection-level failures advance; an HTTP error status stops.
    #[serde(alias = "CONNECTION_TIMEOUT_ONLY")]
    ConnectionTimeoutOnly,
}

fn default_uris() -> Vec<String> {
    vec!["http://localhost:8888".to_string()]
}

fn default_name() -> String {
    DEFAULT_APPLICATION.to_string()
}

fn default_profile() -> String {
    DEFAULT_PROFILE.to_string()
}

fn default_connect_timeout() -> u64 {
    10
}

fn default_read_timeout() -> u64 {
    185
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub struct ClientSettings {
    /// Server base URIs, tried in order.
    #[serde(default = "default_uris")]
    pub uris: Vec<String>,
    #[serde(default = "default_name")]
    pub name: String,
    #[serde(default = "default_profile")]
    pub profile: String,
    /// Comma-separated labels, tried in order.
    #[serde(default)]
    pub label: Option<String>,
    #[serde(default)]
    pub fail_fast: bool,
    #[serde(default)]
    pub multiple_uri_strategy: MultipleUriStrategy,
    /// Seconds.
    #[serde(default = "default_connect_timeout")]
    pub connect_timeout: u64,
    /// Seconds.
    #[serde(default = "default_read_timeout")]
    pub read_timeout: u64,
    #[serde(default)]
    pub username: Option<String>,
    #[serde(default)]
    pub password: Option<String>,
    #[serde(default)]
    pub token: Option<String>,
    #[serde(default)]
    pub headers: IndexMap<String, String>,
    #[serde(default)]
    pub retry: RetryPolicy,
}

impl Default for ClientSettings {
    fn default() -> Self {
        Self {
            uris: default_uris(),
            name: default_name(),
            profile: default_profile(),
            label: None,
            fail_fast: false,
            multiple_uri_strategy: MultipleUriStrategy::default(),
            connect_timeout: default_connect_timeout(),
            read_timeout: default_read_timeout(),
            username: None,
            password: None,
            token: None,
            headers: IndexMap::new(),
            retry: RetryPolicy::default(),
        }
    }
}

/// One server URI with the credentials to use for it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Endpoint {
    /// URI without user info and trailing slash.
    pub base_uri: String,
    pub username: Option<String>,
    pub password: Option<String>,
}

impl ClientSettings {
    /// Rejects contradictory settings up front.
    pub fn validate(&self) -> Result<()> {
        if self.uris.iter().all(|u| u.trim().is_empty()) {
            return Err(Error::InvalidConfig {
                message: "at least one config server URI is required".to_string(),
            });
        }
        if self.password.is_some() && self.authorization().is_some() {
            return Err(Error::InvalidConfig {
                message: "You must set either 'password' or 'authorization', but not both."
                    .to_string(),
            });
        }
        Ok(())
    }

    /// An explicit `Authorization` header from `headers`, if any.
    pub fn authorization(&self) -> Option<&str> {
        self.headers
            .iter()
            .find(|(name, _)| name.eq_ignore_ascii_case(AUTHORIZATION_HEADER))
            .map(|(_, value)| value.as_str())
    }

    /// Labels to try, in order; `[None]` when no label is set.
    pub fn labels(&self) -> Vec<Option<String>> {
        let labels: Vec<Option<String>> = self
            .label
            .as_deref()
            .unwrap_or_default()
            .split(',')
            .map(str::trim)
            .filter(|l| !l.is_empty())
            .map(|l| Some(l.to_string()))
            .collect();
        if labels.is_empty() {
            vec![None]
        } else {
            labels
        }
    }

    /// The configured URIs with their credentials.
    ///
    /// Explicit `username`/`password` settings override credentials embedded
    /// in a URI.
    pub fn endpoints(&self) -> Result<Vec<Endpoint>> {
        self.uris
            .iter()
            .map(|u| u.trim())
            .filter(|u| !u.is_empty())
            .map(|uri| -> Result<Endpoint> {
                let mut url = Url::parse(uri)?;
                let embedded_user = Some(url.username().to_string()).filter(|u| !u.is_empty());
                let embedded_password = url.password().map(str::to_string);
                // both setters only fail for cannot-be-a-base URLs, which
                // carry no credentials to strip
                let _ = url.set_username("");
                let _ = url.set_password(None);

                let username = self.username.clone().or(embedded_user);
                let password = self.password.clone().or(embedded_password);
                Ok(Endpoint {
                    base_uri: url.as_str().trim_end_matches('/').to_string(),
                    username,
                    password,
                })
            })
            .collect()
    }
}
