//! Text encryptors and the locators that choose between them

use std::sync::Arc;

use aes_gcm::aead::{Aead, KeyInit};
use aes_gcm::{Aes256Gcm, Nonce};
use indexmap::IndexMap;
use rand::rngs::OsRng;
use rand::RngCore;
use sha2::{Digest, Sha256};

use super::prefix::{KEY_TAG, NAME_TAG};
use crate::error::{Error, Result};

const NONCE_LEN: usize = 12;
const TAG_LEN: usize = 16;

/// Default salt when the configuration does not set one.
pub const DEFAULT_SALT: &str = "deadbeef";

/// Symmetric encryption of text values.
pub trait TextEncryptor: Send + Sync {
    fn encrypt(&self, plaintext: &str) -> Result<String>;
    fn decrypt(&self, ciphertext: &str) -> Result<String>;
}

/// AES-256-GCM with a key derived from a passphrase.
///
/// The key is `SHA-256(salt || passphrase)`. Ciphertext is the hex encoding
/// of a random 12-byte nonce followed by the sealed bytes, so encrypting the
/// same text twice gives different output.
#[derive(Clone)]
pub struct AesGcmTextEncryptor {
    cipher: Aes256Gcm,
}

impl std::fmt::Debug for AesGcmTextEncryptor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str("AesGcmTextEncryptor")
    }
}

impl AesGcmTextEncryptor {
    pub fn new(passphrase: &str, salt: &str) -> Result<Self> {
        if passphrase.is_empty() {
            return Err(Error::InvalidConfig {
                message: "encryption key passphrase must not be empty".to_string(),
            });
        }
        let mut hasher = Sha256::new();
        hasher.update(salt.as_bytes());
        hasher.update(passphrase.as_bytes());
        let key = hasher.finalize();
        let cipher = Aes256Gcm::new_from_slice(&key).map_err(|e| Error::Cipher {
            message: e.to_string(),
        })?;
        Ok(Self { cipher })
    }
}

impl TextEncryptor for AesGcmTextEncryptor {
    fn encrypt(&self, plaintext: &str) -> Result<String> {
        let mut nonce = [0u8; NONCE_LEN];
        OsRng.fill_bytes(&mut nonce);
        let sealed = self
            .cipher
            .encrypt(Nonce::from_slice(&nonce), plaintext.as_bytes())
            .map_err(|_| Error::Cipher {
                message: "encryption failed".to_string(),
            })?;

        let mut out = Vec::with_capacity(NONCE_LEN + sealed.len());
        out.extend_from_slice(&nonce);
        out.extend_from_slice(&sealed);
        Ok(hex::encode(out))
    }

    fn decrypt(&self, ciphertext: &str) -> Result<String> {
        let bytes = hex::decode(ciphertext.trim()).map_err(|e| Error::Cipher {
            message: format!("ciphertext is not hex encoded: {}", e),
        })?;
        if bytes.len() < NONCE_LEN + TAG_LEN {
            return Err(Error::Cipher {
                message: "ciphertext is too short".to_string(),
            });
        }
        let (nonce, sealed) = bytes.split_at(NONCE_LEN);
        let plain = self
            .cipher
            .decrypt(Nonce::from_slice(nonce), sealed)
            .map_err(|_| Error::Cipher {
                message: "wrong key or corrupted ciphertext".to_string(),
            })?;
        String::from_utf8(plain).map_err(|_| Error::Cipher {
            message: "plaintext is not valid UTF-8".to_string(),
        })
    }
}

/// Picks the encryptor for a value from its tags (including the reserved
/// `name` and `profiles` tags) - allows mocking in tests
pub trait TextEncryptorLocator: Send + Sync {
    fn locate(&self, tags: &IndexMap<String, String>) -> Result<Arc<dyn TextEncryptor>>;
}

/// Uses one encryptor for everything.
pub struct SingleTextEncryptorLocator {
    encryptor: Arc<dyn TextEncryptor>,
}

impl SingleTextEncryptorLocator {
    pub fn new(encryptor: Arc<dyn TextEncryptor>) -> Self {
        Self { encryptor }
    }
}

impl TextEncryptorLocator for SingleTextEncryptorLocator {
    fn locate(&self, _tags: &IndexMap<String, String>) -> Result<Arc<dyn TextEncryptor>> {
        Ok(self.encryptor.clone())
    }
}

/// Named keys.
///
/// Selection order: the alias in an explicit `{key:alias}` tag (which must
/// exist), then a key named after the application, then the default alias.
pub struct KeyRingLocator {
    keys: IndexMap<String, Arc<dyn TextEncryptor>>,
    default_alias: Option<String>,
}

impl KeyRingLocator {
    /// Builds AES-GCM encryptors for every `alias -> passphrase` entry.
    pub fn from_passphrases(
        passphrases: &IndexMap<String, String>,
        salt: &str,
        default_alias: Option<&str>,
    ) -> Result<Self> {
        let mut keys: IndexMap<String, Arc<dyn TextEncryptor>> = IndexMap::new();
        for (alias, passphrase) in passphrases {
            keys.insert(alias.clone(), Arc::new(AesGcmTextEncryptor::new(passphrase, salt)?));
        }
        Self::new(keys, default_alias)
    }

    pub fn new(
        keys: IndexMap<String, Arc<dyn TextEncryptor>>,
        default_alias: Option<&str>,
    ) -> Result<Self> {
        if let Some(alias) = default_alias {
            if !keys.contains_key(alias) {
                return Err(Error::InvalidConfig {
                    message: format!("default key '{}' is not defined", alias),
                });
            }
        }
        // a single key is the default even when not named as such
        let default_alias = default_alias.map(str::to_string).or_else(|| {
            if keys.len() == 1 {
                keys.keys().next().cloned()
            } else {
                None
            }
        });
        Ok(Self {
            keys,
            default_alias,
        })
    }
}

impl TextEncryptorLocator for KeyRingLocator {
    fn locate(&self, tags: &IndexMap<String, String>) -> Result<Arc<dyn TextEncryptor>> {
        if let Some(alias) = tags.get(KEY_TAG).filter(|a| !a.is_empty()) {
            return self.keys.get(alias).cloned().ok_or_else(|| Error::KeyFormat {
                message: format!("no key named '{}'", alias),
            });
        }
        if let Some(found) = tags.get(NAME_TAG).and_then(|name| self.keys.get(name)) {
            return Ok(found.clone());
        }
        self.default_alias
            .as_ref()
            .and_then(|alias| self.keys.get(alias))
            .cloned()
            .ok_or_else(|| Error::KeyFormat {
                message: "no key selected and no default key configured".to_string(),
            })
    }
}

/// Fails every lookup; stands in when no key is configured so encrypted
/// values are reported instead of served.
pub struct NoKeyLocator;

impl TextEncryptorLocator for NoKeyLocator {
    fn locate(&self, _tags: &IndexMap<String, String>) -> Result<Arc<dyn TextEncryptor>> {
        Err(Error::Cipher {
            message: "no encryption key is configured".to_string(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn tags(pairs: &[(&str, &str)]) -> IndexMap<String, String> {
        pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect()
    }

    #[test]
    fn test_aes_round_trip() {
        let encryptor = AesGcmTextEncryptor::new("s3cr3t", DEFAULT_SALT).unwrap();
        let first = encryptor.encrypt("hunter2").unwrap();
        let second = encryptor.encrypt("hunter2").unwrap();

        assert_ne!(first, second);
        assert!(first.chars().all(|c| c.is_ascii_hexdigit()));
        assert_eq!(encryptor.decrypt(&first).unwrap(), "hunter2");
        assert_eq!(encryptor.decrypt(&second).unwrap(), "hunter2");
    }

    #[test]
    fn test_wrong_key_fails() {
        let one = AesGcmTextEncryptor::new("one", DEFAULT_SALT).unwrap();
        let two = AesGcmTextEncryptor::new("two", DEFAULT_SALT).unwrap();
        let sealed = one.encrypt("value").unwrap();
        assert!(matches!(two.decrypt(&sealed), Err(Error::Cipher { .. })));
    }

    #[test]
    fn test_salt_changes_key() {
        let one = AesGcmTextEncryptor::new("pass", "aa").unwrap();
        let two = AesGcmTextEncryptor::new("pass", "bb").unwrap();
        assert!(two.decrypt(&one.encrypt("value").unwrap()).is_err());
    }

    #[test]
    fn test_malformed_ciphertext() {
        let encryptor = AesGcmTextEncryptor::new("pass", DEFAULT_SALT).unwrap();
        assert!(encryptor.decrypt("not hex").is_err());
        assert!(encryptor.decrypt("abcd").is_err());
    }

    #[test]
    fn test_empty_passphrase_rejected() {
        assert!(AesGcmTextEncryptor::new("", DEFAULT_SALT).is_err());
    }

    #[test]
    fn test_key_ring_selection_order() {
        let passphrases: IndexMap<String, String> = [
            ("primary", "p1"),
            ("billing", "p2"),
            ("legacy", "p3"),
        ]
        .iter()
        .map(|(k, v)| (k.to_string(), v.to_string()))
        .collect();
        let ring = KeyRingLocator::from_passphrases(&passphrases, DEFAULT_SALT, Some("primary")).unwrap();
        let legacy = AesGcmTextEncryptor::new("p3", DEFAULT_SALT).unwrap();
        let billing = AesGcmTextEncryptor::new("p2", DEFAULT_SALT).unwrap();
        let primary = AesGcmTextEncryptor::new("p1", DEFAULT_SALT).unwrap();

        // explicit key tag wins over the application name
        let found = ring.locate(&tags(&[("name", "billing"), ("key", "legacy")])).unwrap();
        assert_eq!(found.decrypt(&legacy.encrypt("x").unwrap()).unwrap(), "x");

        let found = ring.locate(&tags(&[("name", "billing")])).unwrap();
        assert_eq!(found.decrypt(&billing.encrypt("y").unwrap()).unwrap(), "y");

        let found = ring.locate(&tags(&[("name", "orders")])).unwrap();
        assert_eq!(found.decrypt(&primary.encrypt("z").unwrap()).unwrap(), "z");

        assert!(matches!(
            ring.locate(&tags(&[("key", "missing")])),
            Err(Error::KeyFormat { .. })
        ));
    }

    #[test]
    fn test_key_ring_single_key_is_default() {
        let passphrases: IndexMap<String, String> =
            [("only".to_string(), "p".to_string())].into_iter().collect();
        let ring = KeyRingLocator::from_passphrases(&passphrases, DEFAULT_SALT, None).unwrap();
        assert!(ring.locate(&IndexMap::new()).is_ok());
    }

    #[test]
    fn test_key_ring_unknown_default_rejected() {
        let passphrases: IndexMap<String, String> =
            [("only".to_string(), "p".to_string())].into_iter().collect();
        assert!(KeyRingLocator::from_passphrases(&passphrases, DEFAULT_SALT, Some("other")).is_err());
    }

    #[test]
    fn test_no_key_locator_fails() {
        assert!(NoKeyLocator.locate(&IndexMap::new()).is_err());
    }
}
