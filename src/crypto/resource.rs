//! Decryption inside raw resource files
//!
//! A raw file is served as text, so its encrypted values are replaced
//! textually: the file is parsed only to find which scalar values carry the
//! `{cipher}` marker, each distinct value is decrypted once, and the
//! plaintext is written back in place. Formatting, comments and key order of
//! the file are untouched. Files of other types pass through unchanged.
//!
//! Properties files are rewritten through the byte span of each raw value,
//! so continued and escaped values are replaced too; the plaintext is
//! escaped as a property value. YAML and JSON values are located by their
//! text, and in JSON the plaintext is escaped as a JSON string body. A value
//! that cannot be located (a folded scalar, say) is served as it is, with a
//! warning.

use std::collections::{BTreeMap, BTreeSet};
use std::ops::Range;

use log::warn;

use super::{CipherService, CIPHER_MARKER, INVALID_VALUE};
use crate::error::Result;
use crate::format::{properties, yaml, FileFormat};

#[derive(Debug, Clone)]
pub struct ResourceDecryptor {
    cipher: CipherService,
}

impl ResourceDecryptor {
    pub fn new(cipher: CipherService) -> Self {
        Self { cipher }
    }

    /// Decrypts the values of `text`, a file in `format`.
    ///
    /// A value that cannot be decrypted is replaced with `<n/a>` and logged.
    pub fn decrypt(
        &self,
        text: &str,
        format: Option<FileFormat>,
        application: &str,
        profiles: &str,
    ) -> Result<String> {
        let format = match format {
            Some(format) => format,
            None => return Ok(text.to_string()),
        };
        if format == FileFormat::Properties {
            return self.decrypt_properties(text, application, profiles);
        }

        let encrypted = encrypted_values(text)?;
        if encrypted.is_empty() {
            return Ok(text.to_string());
        }

        // longest first, so a value that is a prefix of another one cannot
        // clobber it
        let mut ordered: Vec<&String> = encrypted.iter().collect();
        ordered.sort_by(|a, b| b.len().cmp(&a.len()).then_with(|| a.cmp(b)));

        let mut out = text.to_string();
        for value in ordered {
            if !out.contains(value.as_str()) {
                warn!(
                    "Cannot locate encrypted value in resource text, serving it encrypted: {}",
                    value
                );
                continue;
            }
            let plain = self.decrypt_value(value, application, profiles);
            let replacement = match format {
                FileFormat::Json => json_escape(&plain)?,
                _ => plain,
            };
            out = out.replace(value.as_str(), &replacement);
        }
        Ok(out)
    }

    /// Rewrites each encrypted value through its raw span, last span first so
    /// earlier offsets stay valid.
    fn decrypt_properties(&self, text: &str, application: &str, profiles: &str) -> Result<String> {
        let mut spans: Vec<(Range<usize>, String)> = Vec::new();
        for document in properties::parse_documents(text, "resource")? {
            for entry in document {
                if entry.value.starts_with(CIPHER_MARKER) {
                    spans.push((entry.span, entry.value));
                }
            }
        }
        if spans.is_empty() {
            return Ok(text.to_string());
        }

        let mut decrypted: BTreeMap<String, String> = BTreeMap::new();
        let mut out = text.to_string();
        spans.sort_by_key(|(span, _)| std::cmp::Reverse(span.start));
        for (span, value) in spans {
            let plain = match decrypted.get(&value) {
                Some(plain) => plain.clone(),
                None => {
                    let plain = properties::escape_value(&self.decrypt_value(&value, application, profiles));
                    decrypted.insert(value, plain.clone());
                    plain
                }
            };
            out.replace_range(span, &plain);
        }
        Ok(out)
    }

    fn decrypt_value(&self, value: &str, application: &str, profiles: &str) -> String {
        match self.cipher.decrypt(value, application, profiles) {
            Ok(plain) => plain,
            Err(e) => {
                warn!("Cannot decrypt value in resource: {}", e);
                INVALID_VALUE.to_string()
            }
        }
    }
}

/// Distinct encrypted string scalars of a YAML or JSON document.
fn encrypted_values(text: &str) -> Result<BTreeSet<String>> {
    let mut found = BTreeSet::new();
    for document in yaml::parse_documents(text, "resource")? {
        for value in yaml::string_scalars(&document) {
            let value = value.trim();
            if value.starts_with(CIPHER_MARKER) {
                found.insert(value.to_string());
            }
        }
    }
    Ok(found)
}

/// The body of a JSON string literal for `text`, without the quotes.
fn json_escape(text: &str) -> Result<String> {
    let quoted = serde_json::to_string(text)?;
    Ok(quoted[1..quoted.len() - 1].to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::crypto::{AesGcmTextEncryptor, SingleTextEncryptorLocator, TextEncryptor};
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;

    /// Encryptor that counts decryptions and reverses text.
    #[derive(Default)]
    struct CountingEncryptor {
        decryptions: AtomicUsize,
    }

    impl TextEncryptor for CountingEncryptor {
        fn encrypt(&self, plaintext: &str) -> Result<String> {
            Ok(plaintext.chars().rev().collect())
        }

        fn decrypt(&self, ciphertext: &str) -> Result<String> {
            self.decryptions.fetch_add(1, Ordering::SeqCst);
            if ciphertext == "quote" {
                return Ok("a\"b".to_string());
            }
            if ciphertext.starts_with("bad") {
                return Err(crate::error::Error::Cipher {
                    message: "bad".into(),
                });
            }
            Ok(ciphertext.chars().rev().collect())
        }
    }

    fn decryptor(encryptor: Arc<CountingEncryptor>) -> ResourceDecryptor {
        ResourceDecryptor::new(CipherService::new(Arc::new(SingleTextEncryptorLocator::new(encryptor))))
    }

    #[test]
    fn test_each_distinct_value_decrypted_once() {
        let encryptor = Arc::new(CountingEncryptor::default());
        let text = "\
# database
db.password={cipher}terces
db.replica.password={cipher}terces
api.key={cipher}yek
plain=value
";
        let out = decryptor(encryptor.clone())
            .decrypt(text, Some(FileFormat::Properties), "app", "default")
            .unwrap();
        assert_eq!(
            out,
            "# database\ndb.password=secret\ndb.replica.password=secret\napi.key=key\nplain=value\n"
        );
        assert_eq!(encryptor.decryptions.load(Ordering::SeqCst), 2);
    }

    #[test]
    fn test_yaml_keeps_layout() {
        let encryptor = Arc::new(CountingEncryptor::default());
        let text = "db:\n  # primary\n  password: '{cipher}terces'\n  user: admin\n";
        let out = decryptor(encryptor)
            .decrypt(text, Some(FileFormat::Yaml), "app", "default")
            .unwrap();
        assert_eq!(out, "db:\n  # primary\n  password: 'secret'\n  user: admin\n");
    }

    #[test]
    fn test_json_plaintext_is_escaped() {
        let encryptor = Arc::new(CountingEncryptor::default());
        let text = r#"{"token": "{cipher}quote", "n": 1}"#;
        let out = decryptor(encryptor)
            .decrypt(text, Some(FileFormat::Json), "app", "default")
            .unwrap();
        assert_eq!(out, r#"{"token": "a\"b", "n": 1}"#);
        let parsed: serde_json::Value = serde_json::from_str(&out).unwrap();
        assert_eq!(parsed["token"], "a\"b");
    }

    #[test]
    fn test_prefix_values_do_not_clobber_each_other() {
        let encryptor = Arc::new(CountingEncryptor::default());
        let text = "a={cipher}cba\nb={cipher}cbaxx\n";
        let out = decryptor(encryptor)
            .decrypt(text, Some(FileFormat::Properties), "app", "default")
            .unwrap();
        assert_eq!(out, "a=abc\nb=xxabc\n");
    }

    #[test]
    fn test_failed_value_is_marked() {
        let encryptor = Arc::new(CountingEncryptor::default());
        let out = decryptor(encryptor)
            .decrypt("a={cipher}bad1\nb={cipher}dog\n", Some(FileFormat::Properties), "app", "default")
            .unwrap();
        assert_eq!(out, "a=<n/a>\nb=god\n");
    }

    #[test]
    fn test_continued_properties_value_is_replaced() {
        let encryptor = Arc::new(CountingEncryptor::default());
        let text = "password={cipher}terc\\\n    es\nnext=x\n";
        let out = decryptor(encryptor)
            .decrypt(text, Some(FileFormat::Properties), "app", "default")
            .unwrap();
        assert_eq!(out, "password=secret\nnext=x\n");
    }

    #[test]
    fn test_escaped_properties_value_is_replaced() {
        let encryptor = Arc::new(CountingEncryptor::default());
        let text = "a={cipher}\\u0061bc\nb={cipher}abc\n";
        let out = decryptor(encryptor.clone())
            .decrypt(text, Some(FileFormat::Properties), "app", "default")
            .unwrap();
        assert_eq!(out, "a=cba\nb=cba\n");
        assert_eq!(encryptor.decryptions.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_unlocated_yaml_value_is_logged() {
        testing_logger::setup();
        let encryptor = Arc::new(CountingEncryptor::default());
        let text = "password: \"{cipher}ter\\x63es\"\n";
        let out = decryptor(encryptor)
            .decrypt(text, Some(FileFormat::Yaml), "app", "default")
            .unwrap();
        assert_eq!(out, text);
        testing_logger::validate(|logs| {
            assert!(logs
                .iter()
                .any(|l| l.level == log::Level::Warn && l.body.contains("Cannot locate encrypted value")));
        });
    }

    #[test]
    fn test_unknown_format_passes_through() {
        let encryptor = Arc::new(CountingEncryptor::default());
        let text = "password {cipher}abc;";
        let out = decryptor(encryptor.clone()).decrypt(text, None, "app", "default").unwrap();
        assert_eq!(out, text);
        assert_eq!(encryptor.decryptions.load(Ordering::SeqCst), 0);
    }

    #[test]
    fn test_real_cipher_round_trip() {
        let encryptor = AesGcmTextEncryptor::new("passphrase", "deadbeef").unwrap();
        let service = CipherService::new(Arc::new(SingleTextEncryptorLocator::new(Arc::new(encryptor))));
        let sealed = service.encrypt("s3cr3t", "app", "default").unwrap();
        let text = format!("spring:\n  password: \"{{cipher}}{}\"\n", sealed);

        let out = ResourceDecryptor::new(service)
            .decrypt(&text, Some(FileFormat::Yaml), "app", "default")
            .unwrap();
        assert_eq!(out, "spring:\n  password: \"s3cr3t\"\n");
    }
}
