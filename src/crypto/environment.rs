//! Value-level decryption of environments

use indexmap::IndexMap;
use log::{debug, warn};
use serde_json::Value as JsonValue;

use super::{CipherService, CIPHER_MARKER, INVALID_PREFIX, INVALID_VALUE};
use crate::environment::{Environment, EnvironmentRequest, PropertySource, PropertyValue};
use crate::error::Result;
use crate::repository::EnvironmentRepository;

/// Decrypts every `{cipher}` value of an environment.
#[derive(Debug, Clone)]
pub struct EnvironmentDecryptor {
    cipher: CipherService,
}

impl EnvironmentDecryptor {
    pub fn new(cipher: CipherService) -> Self {
        Self { cipher }
    }

    /// Returns a copy of `environment` with its encrypted values decrypted.
    ///
    /// Keys keep their position. A value that fails to decrypt becomes
    /// `invalid.<key> = <n/a>`, keeping any origin.
    pub fn decrypt(&self, environment: &Environment) -> Environment {
        let profiles = environment.profiles.join(",");
        let mut decrypted = environment.clone();
        decrypted.property_sources = environment
            .property_sources
            .iter()
            .map(|source| self.decrypt_source(source, &environment.name, &profiles))
            .collect();
        decrypted
    }

    fn decrypt_source(&self, source: &PropertySource, application: &str, profiles: &str) -> PropertySource {
        let mut out: IndexMap<String, PropertyValue> = IndexMap::with_capacity(source.source.len());
        for (key, value) in &source.source {
            let encrypted = match value.as_str() {
                Some(text) if text.starts_with(CIPHER_MARKER) => text,
                _ => {
                    out.insert(key.clone(), value.clone());
                    continue;
                }
            };

            match self.cipher.decrypt(encrypted, application, profiles) {
                Ok(plain) => {
                    debug!("Decrypted {} from {}", key, source.name);
                    out.insert(key.clone(), value.with_value(JsonValue::String(plain)));
                }
                Err(e) => {
                    warn!("Cannot decrypt key: {} ({})", key, e);
                    out.insert(
                        format!("{}{}", INVALID_PREFIX, key),
                        value.with_value(JsonValue::String(INVALID_VALUE.to_string())),
                    );
                }
            }
        }
        PropertySource::new(source.name.clone(), out)
    }
}

/// Decorator that decrypts whatever the wrapped repository returns.
pub struct DecryptingRepository<R> {
    inner: R,
    decryptor: EnvironmentDecryptor,
}

impl<R: EnvironmentRepository> DecryptingRepository<R> {
    pub fn new(inner: R, decryptor: EnvironmentDecryptor) -> Self {
        Self { inner, decryptor }
    }

    pub fn inner(&self) -> &R {
        &self.inner
    }
}

impl<R: EnvironmentRepository> EnvironmentRepository for DecryptingRepository<R> {
    fn find_one(&self, request: &EnvironmentRequest) -> Result<Environment> {
        let environment = self.inner.find_one(request)?;
        Ok(self.decryptor.decrypt(&environment))
    }

    fn order(&self) -> i32 {
        self.inner.order()
    }

    fn describe(&self) -> String {
        format!("decrypting {}", self.inner.describe())
    }
}
