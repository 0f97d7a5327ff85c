//! HTTP transport used by the config client

use std::time::Duration;

use log::debug;
use thiserror::Error;

use crate::error::Result;
use crate::path::redact_credentials;

/// One GET request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HttpRequest {
    pub url: String,
    pub headers: Vec<(String, String)>,
}

impl HttpRequest {
    /// Value of a header, compared case-insensitively.
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers
            .iter()
            .find(|(key, _)| key.eq_ignore_ascii_case(name))
            .map(|(_, value)| value.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HttpResponse {
    pub status: u16,
    pub body: String,
}

/// A request that produced no HTTP response at all.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum TransportError {
    #[error("connect timed out: {0}")]
    ConnectTimeout(String),

    #[error("connection failed: {0}")]
    Connect(String),

    #[error("read timed out: {0}")]
    ReadTimeout(String),

    #[error("request failed: {0}")]
    Other(String),
}

/// Blocking HTTP GET - allows mocking in tests
pub trait HttpTransport: Send + Sync {
    fn get(&self, request: &HttpRequest) -> std::result::Result<HttpResponse, TransportError>;
}

/// `reqwest` blocking client with connect and read timeouts.
#[derive(Debug, Clone)]
pub struct ReqwestTransport {
    client: reqwest::blocking::Client,
}

impl ReqwestTransport {
    pub fn new(connect_timeout: Duration, read_timeout: Duration) -> Result<Self> {
        let client = reqwest::blocking::Client::builder()
            .connect_timeout(connect_timeout)
            .timeout(read_timeout)
            .user_agent(concat!("config-hub/", env!("CARGO_PKG_VERSION")))
            .build()?;
        Ok(Self { client })
    }
}

impl HttpTransport for ReqwestTransport {
    fn get(&self, request: &HttpRequest) -> std::result::Result<HttpResponse, TransportError> {
        debug!("GET {}", redact_credentials(&request.url));
        let mut builder = self.client.get(&request.url);
        for (name, value) in &request.headers {
            builder = builder.header(name.as_str(), value.as_str());
        }

        let response = builder.send().map_err(classify)?;
        let status = response.status().as_u16();
        let body = response.text().map_err(classify)?;
        Ok(HttpResponse { status, body })
    }
}

fn classify(error: reqwest::Error) -> TransportError {
    let message = error.to_string();
    if error.is_connect() && error.is_timeout() {
        TransportError::ConnectTimeout(message)
    } else if error.is_connect() {
        TransportError::Connect(message)
    } else if error.is_timeout() {
        TransportError::ReadTimeout(message)
    } else {
        TransportError::Other(message)
    }
}
