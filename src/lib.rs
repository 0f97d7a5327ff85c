//! # Config Hub Library
//!
//! This library serves externalized application configuration out of git
//! repositories and plain directories, and retrieves it again from client
//! processes. It is used by the `config-hub` command-line tool but can also
//! be embedded into other applications.
//!
//! ## Quick Example
//!
//! ```
//! use std::sync::Arc;
//! use config_hub::config;
//! use config_hub::crypto::{AesGcmTextEncryptor, CipherService, SingleTextEncryptorLocator};
//!
//! // Parse a configuration
//! let config = config::parse(r#"
//! server:
//!   backends:
//!     - type: native
//!       search-locations: ["/etc/config"]
//! "#).unwrap();
//! assert_eq!(config.server.backends.len(), 1);
//!
//! // Encrypt and decrypt a property value
//! let encryptor = AesGcmTextEncryptor::new("s3cr3t", "deadbeef").unwrap();
//! let cipher = CipherService::new(Arc::new(SingleTextEncryptorLocator::new(Arc::new(encryptor))));
//! let secret = cipher.encrypt("hunter2", "app", "default").unwrap();
//! let value = format!("{{cipher}}{}", secret);
//! assert_eq!(cipher.decrypt(&value, "app", "default").unwrap(), "hunter2");
//! ```
//!
//! ## Core Concepts
//!
//! - **Environment (`environment`)**: the answer to a request for an
//!   application, profiles and a label: an ordered list of property sources,
//!   highest precedence first.
//! - **Workspaces (`git`, `workspace`, `registry`)**: local working copies of
//!   remote git repositories, kept in step with the remote on every request.
//! - **Loading (`format`, `loader`)**: reading `.properties`, YAML and JSON
//!   files into flat property sources.
//! - **Repositories (`repository`, `router`, `native`, `composite`)**: the
//!   backends that answer requests, routing between git repositories by
//!   pattern and combining several backends into one.
//! - **Encryption (`crypto`)**: `{cipher}` values and their decryption, both
//!   in environments and in raw files.
//! - **Client (`client`)**: retrieval from one or more running servers with
//!   failover and retry.
//! - **Server (`server`, `config`)**: everything above assembled from a
//!   configuration file.
//!
//! ## Request Flow
//!
//! 1.  **Routing**: pick the git repositories whose patterns match the
//!     application and profiles.
//! 2.  **Synchronization**: clone or fetch the repository and check the label
//!     out.
//! 3.  **Loading**: read the matching files under the search paths.
//! 4.  **Composition**: concatenate the property sources of all backends.
//! 5.  **Decryption**: replace `{cipher}` values with their plaintext.

pub mod client;
pub mod composite;
pub mod config;
pub mod crypto;
pub mod defaults;
pub mod environment;
pub mod error;
pub mod format;
pub mod git;
pub mod loader;
pub mod native;
pub mod path;
pub mod registry;
pub mod repository;
pub mod router;
pub mod server;
pub mod workspace;

#[cfg(test)]
mod path_proptest;
