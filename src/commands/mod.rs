//! # CLI Command Implementations
//!
//! This module contains the implementation for each subcommand of the
//! `config-hub` command-line tool. Each subcommand is defined in its own file.
//!
//! ## Structure
//!
//! Each command module contains:
//! - An `Args` struct that defines the command-specific arguments and options,
//!   derived using `clap`.
//! - An `execute` function that takes the parsed `Args` and the shared
//!   [`Context`] and performs the command's logic.

pub mod completions;
pub mod decrypt;
pub mod encrypt;
pub mod fetch;
pub mod render;
pub mod resolve;
pub mod resource;

use std::path::{Path, PathBuf};

use anyhow::{Context as _, Result};

use config_hub::config::{self, Config};
use config_hub::crypto::CipherService;
use config_hub::defaults::CONFIG_FILE;
use config_hub::server::ConfigServer;

/// Loaded configuration shared by all commands.
#[derive(Debug, Default)]
pub struct Context {
    pub config: Config,
    pub basedir: Option<PathBuf>,
}

impl Context {
    /// Loads `path`, or `config-hub.yaml` in the current directory when it
    /// exists, or an empty configuration.
    pub fn load(path: Option<&Path>, basedir: Option<PathBuf>) -> Result<Self> {
        let config = match path {
            Some(path) => config::from_file(path)
                .with_context(|| format!("Failed to load config from {}", path.display()))?,
            None if Path::new(CONFIG_FILE).is_file() => config::from_file(CONFIG_FILE)
                .with_context(|| format!("Failed to load config from {}", CONFIG_FILE))?,
            None => Config::default(),
        };
        Ok(Self { config, basedir })
    }

    /// Builds the server from the `server` section.
    pub fn server(&self) -> Result<ConfigServer> {
        let server = ConfigServer::new(self.config.server.clone(), self.basedir.clone())
            .context("Failed to configure the server")?;
        server.warm_up()?;
        Ok(server)
    }

    /// The cipher service for the configured keys.
    pub fn cipher(&self) -> Result<CipherService> {
        let locator = config::locator(self.config.server.encrypt.as_ref())?;
        Ok(CipherService::new(locator))
    }
}
