//! CLI argument parsing and command dispatch

use std::path::PathBuf;

use anyhow::Result;
use clap::{Parser, Subcommand};

use crate::commands::{self, Context};
use config_hub::defaults::{BASEDIR_ENV, CONFIG_ENV};

/// Config Hub - Serve and fetch externalized configuration
#[derive(Parser, Debug)]
#[command(name = "config-hub")]
#[command(version, about, long_about = None)]
pub struct Cli {
    /// Subcommand to execute
    #[command(subcommand)]
    command: Commands,

    /// Path to the configuration file.
    ///
    /// Defaults to `config-hub.yaml` in the current directory when it exists.
    #[arg(long, global = true, value_name = "FILE", env = CONFIG_ENV)]
    config: Option<PathBuf>,

    /// Base directory for git workspaces.
    ///
    /// Defaults to the system cache directory (`~/.cache/config-hub` on Linux,
    /// `~/Library/Caches/config-hub` on macOS).
    #[arg(long, global = true, value_name = "DIR", env = BASEDIR_ENV)]
    basedir: Option<PathBuf>,

    /// Set log level (error, warn, info, debug, trace)
    #[arg(long, global = true, value_name = "LEVEL", default_value = "warn")]
    log_level: String,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Resolve the environment of an application
    Resolve(commands::resolve::ResolveArgs),

    /// Print one raw file from the backends
    Resource(commands::resource::ResourceArgs),

    /// Encrypt a value for use as a {cipher} property
    Encrypt(commands::encrypt::EncryptArgs),

    /// Decrypt a {cipher} value
    Decrypt(commands::decrypt::DecryptArgs),

    /// Fetch configuration from running config servers
    Fetch(commands::fetch::FetchArgs),

    /// Generate shell completion scripts
    Completions(commands::completions::CompletionsArgs),
}

impl Cli {
    /// Execute the CLI command
    pub fn execute(self) -> Result<()> {
        init_logging(&self.log_level);

        let context = || Context::load(self.config.as_deref(), self.basedir.clone());
        match self.command {
            Commands::Resolve(args) => commands::resolve::execute(args, &context()?),
            Commands::Resource(args) => commands::resource::execute(args, &context()?),
            Commands::Encrypt(args) => commands::encrypt::execute(args, &context()?),
            Commands::Decrypt(args) => commands::decrypt::execute(args, &context()?),
            Commands::Fetch(args) => commands::fetch::execute(args, &context()?),
            Commands::Completions(args) => commands::completions::execute(args),
        }
    }
}

/// `RUST_LOG` wins over `--log-level` when set.
fn init_logging(level: &str) {
    let env = env_logger::Env::default().default_filter_or(level);
    // a second initialization (tests) is harmless
    let _ = env_logger::Builder::from_env(env).try_init();
}
