//! # Encrypted Property Values
//!
//! Property values starting with `{cipher}` are stored encrypted and
//! decrypted on the way out:
//!
//! ```yaml
//! db.password: '{cipher}{key:legacy}5f0a...'
//! ```
//!
//! ## Modules
//!
//! - **`prefix`**: the `{name:value}` tag grammar in front of a payload.
//! - **`encryptor`**: AES-GCM text encryption and the locators that pick a
//!   key from the tags.
//! - **`environment`**: decryption of every value of an [`Environment`], and
//!   a repository decorator applying it.
//! - **`resource`**: decryption of the values inside a raw properties, YAML
//!   or JSON file.
//!
//! ## Failures
//!
//! A value that cannot be decrypted never fails a whole environment. Its key
//! is renamed `invalid.<key>`, its value replaced by `<n/a>` and a warning is
//! logged.
//!
//! [`Environment`]: crate::environment::Environment

pub mod encryptor;
pub mod environment;
pub mod prefix;
pub mod resource;

#[cfg(test)]
mod prefix_proptest;

use std::sync::Arc;

use crate::error::Result;
use encryptor::TextEncryptorLocator;

/// Marker in front of encrypted values.
pub const CIPHER_MARKER: &str = "{cipher}";
/// Prefix given to keys whose value could not be decrypted.
pub const INVALID_PREFIX: &str = "invalid.";
/// Value given to keys whose value could not be decrypted.
pub const INVALID_VALUE: &str = "<n/a>";

pub use encryptor::{
    AesGcmTextEncryptor, KeyRingLocator, NoKeyLocator, SingleTextEncryptorLocator, TextEncryptor,
};
pub use environment::{DecryptingRepository, EnvironmentDecryptor};
pub use resource::ResourceDecryptor;

/// Encrypts and decrypts single values in the context of a request.
#[derive(Clone)]
pub struct CipherService {
    locator: Arc<dyn TextEncryptorLocator>,
}

impl std::fmt::Debug for CipherService {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str("CipherService")
    }
}

impl CipherService {
    pub fn new(locator: Arc<dyn TextEncryptorLocator>) -> Self {
        Self { locator }
    }

    /// Encrypts `input`, which may start with tags such as `{key:alias}`.
    ///
    /// The result is the tags followed by the ciphertext, without the
    /// `{cipher}` marker.
    pub fn encrypt(&self, input: &str, application: &str, profiles: &str) -> Result<String> {
        let prefixed = prefix::parse_with_context(input, application, profiles);
        let encryptor = self.locator.locate(&prefixed.tags)?;
        let sealed = encryptor.encrypt(&prefixed.payload)?;
        Ok(prefix::render(&prefixed.tags, &sealed))
    }

    /// Decrypts `input`, with or without a leading `{cipher}` marker.
    pub fn decrypt(&self, input: &str, application: &str, profiles: &str) -> Result<String> {
        let input = input.strip_prefix(CIPHER_MARKER).unwrap_or(input);
        let prefixed = prefix::parse_with_context(input, application, profiles);
        let encryptor = self.locator.locate(&prefixed.tags)?;
        encryptor.decrypt(&prefixed.payload)
    }
}
