//! # Config Client
//!
//! Fetches an [`Environment`] from one of several config server URIs.
//!
//! ## One Attempt
//!
//! For every label (a comma-separated label list is tried in order) the
//! endpoints are visited in order with `GET {uri}/{name}/{profile}[/{label}]`:
//!
//! - A 2xx response ends the attempt with the environment.
//! - 404 on the last endpoint means "not found" for this label; the next
//!   label is tried. On any other endpoint it is handled like the other HTTP
//!   error statuses.
//! - Other HTTP error statuses move on to the next endpoint with the
//!   `always` strategy and end the attempt with `connection-timeout-only`.
//! - A request that gets no response at all (refused, timed out) always moves
//!   on to the next endpoint.
//!
//! ## Fail-Fast and Retry
//!
//! Without `fail_fast` a failed attempt is logged and the client carries on
//! without remote configuration. With `fail_fast` the attempt is retried with
//! exponential backoff, and exhausting the retries is an
//! [`Error::ClientFailFast`] naming every endpoint tried.

pub mod retry;
pub mod settings;
pub mod transport;
pub mod view;

use std::time::Duration;

use base64::Engine;
use log::{info, warn};

use crate::environment::Environment;
use crate::error::{Error, Result};
use crate::path::{encode_label, redact_credentials};
use retry::{Sleeper, ThreadSleeper};
use settings::{ClientSettings, Endpoint, MultipleUriStrategy, TOKEN_HEADER};
use transport::{HttpRequest, HttpTransport, ReqwestTransport};

pub use retry::RetryPolicy;
pub use settings::MultipleUriStrategy as Strategy;
pub use view::PropertyView;

/// Outcome of one pass over the labels and endpoints.
#[derive(Debug)]
enum Attempt {
    Found(Environment),
    NotFound,
    Failed(String),
}

pub struct ConfigClient {
    settings: ClientSettings,
    transport: Box<dyn HttpTransport>,
    sleeper: Box<dyn Sleeper>,
}

impl std::fmt::Debug for ConfigClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ConfigClient")
            .field("uris", &self.settings.uris.iter().map(|u| redact_credentials(u)).collect::<Vec<_>>())
            .finish()
    }
}

impl ConfigClient {
    /// Creates a client using `reqwest` with the configured timeouts.
    pub fn new(settings: ClientSettings) -> Result<Self> {
        let transport = ReqwestTransport::new(
            Duration::from_secs(settings.connect_timeout),
            Duration::from_secs(settings.read_timeout),
        )?;
        Self::with_transport(settings, Box::new(transport), Box::new(ThreadSleeper))
    }

    /// Creates a client with a custom transport and sleeper.
    pub fn with_transport(
        settings: ClientSettings,
        transport: Box<dyn HttpTransport>,
        sleeper: Box<dyn Sleeper>,
    ) -> Result<Self> {
        settings.validate()?;
        Ok(Self {
            settings,
            transport,
            sleeper,
        })
    }

    pub fn settings(&self) -> &ClientSettings {
        &self.settings
    }

    /// Fetches the configured application and profile.
    pub fn fetch(&self) -> Result<Option<Environment>> {
        self.fetch_for(&self.settings.name, &self.settings.profile)
    }

    /// Fetches the environment for one application and profile.
    ///
    /// `Ok(None)` means no remote configuration was found and fail-fast is
    /// off.
    pub fn fetch_for(&self, application: &str, profile: &str) -> Result<Option<Environment>> {
        let endpoints = self.settings.endpoints()?;

        if !self.settings.fail_fast {
            return Ok(match self.attempt(&endpoints, application, profile) {
                Attempt::Found(environment) => Some(environment),
                Attempt::NotFound => {
                    info!("Could not locate PropertySource for {}/{}: not found", application, profile);
                    None
                }
                Attempt::Failed(cause) => {
                    warn!(
                        "Could not locate PropertySource for {}/{} ({}), continuing without remote configuration",
                        application, profile, cause
                    );
                    None
                }
            });
        }

        let policy = &self.settings.retry;
        let mut delays = policy.backoff();
        let mut attempts = 0;
        loop {
            attempts += 1;
            let cause = match self.attempt(&endpoints, application, profile) {
                Attempt::Found(environment) => return Ok(Some(environment)),
                Attempt::NotFound => format!("no configuration found for {}/{}", application, profile),
                Attempt::Failed(cause) => cause,
            };

            match delays.next() {
                Some(delay) => {
                    info!(
                        "Attempt {} of {} to fetch configuration failed ({}), retrying in {:?}",
                        attempts, policy.max_attempts, cause, delay
                    );
                    self.sleeper.sleep(delay);
                }
                None => {
                    return Err(Error::ClientFailFast {
                        endpoints: endpoints.iter().map(|e| e.base_uri.clone()).collect(),
                        attempts,
                        cause,
                    })
                }
            }
        }
    }

    /// Fetches and wraps the result in a [`PropertyView`].
    pub fn load(&self) -> Result<Option<PropertyView>> {
        Ok(self
            .fetch()?
            .map(|environment| PropertyView::from_environment(&environment)))
    }

    fn attempt(&self, endpoints: &[Endpoint], application: &str, profile: &str) -> Attempt {
        for label in self.settings.labels() {
            match self.attempt_label(endpoints, application, profile, label.as_deref()) {
                Attempt::NotFound => continue,
                other => return other,
            }
        }
        Attempt::NotFound
    }

    fn attempt_label(
        &self,
        endpoints: &[Endpoint],
        application: &str,
        profile: &str,
        label: Option<&str>,
    ) -> Attempt {
        let strategy = self.settings.multiple_uri_strategy;
        let mut last_cause = String::from("no config server URI configured");

        for (i, endpoint) in endpoints.iter().enumerate() {
            let is_last = i + 1 == endpoints.len();
            let request = self.request(endpoint, application, profile, label);
            info!("Fetching config from server at : {}", endpoint.base_uri);

            match self.transport.get(&request) {
                Ok(response) if (200..300).contains(&response.status) => {
                    match serde_json::from_str::<Environment>(&response.body) {
                        Ok(environment) => {
                            info!(
                                "Located environment: name={}, profiles={:?}, label={:?}, version={:?}, state={:?}",
                                environment.name,
                                environment.profiles,
                                environment.label,
                                environment.version,
                                environment.state
                            );
                            return Attempt::Found(environment);
                        }
                        Err(e) => {
                            last_cause = format!("invalid response from {}: {}", endpoint.base_uri, e);
                        }
                    }
                }
                Ok(response) if response.status == 404 && is_last => {
                    info!("No configuration for {}/{} at {}", application, profile, endpoint.base_uri);
                    return Attempt::NotFound;
                }
                Ok(response) => {
                    last_cause = format!("HTTP {} from {}", response.status, endpoint.base_uri);
                    if strategy == MultipleUriStrategy::ConnectionTimeoutOnly {
                        return if response.status == 404 {
                            Attempt::NotFound
                        } else {
                            Attempt::Failed(last_cause)
                        };
                    }
                }
                Err(e) => {
                    last_cause = format!("{} ({})", e, endpoint.base_uri);
                }
            }

            if !is_last {
                info!("{}, trying next config server URI", last_cause);
            }
        }
        Attempt::Failed(last_cause)
    }

    fn request(&self, endpoint: &Endpoint, application: &str, profile: &str, label: Option<&str>) -> HttpRequest {
        let mut url = format!("{}/{}/{}", endpoint.base_uri, application, profile);
        if let Some(label) = label {
            url.push('/');
            url.push_str(&encode_label(label));
        }

        let mut headers = vec![("Accept".to_string(), "application/json".to_string())];
        if let Some(token) = &self.settings.token {
            headers.push((TOKEN_HEADER.to_string(), token.clone()));
        }
        for (name, value) in &self.settings.headers {
            headers.push((name.clone(), value.clone()));
        }
        if self.settings.authorization().is_none() {
            if let Some(username) = &endpoint.username {
                let credentials = format!(
                    "{}:{}",
                    username,
                    endpoint.password.as_deref().unwrap_or_default()
                );
                let encoded = base64::engine::general_purpose::STANDARD.encode(credentials);
                headers.push(("Authorization".to_string(), format!("Basic {}", encoded)));
            }
        }
        HttpRequest { url, headers }
    }
}
