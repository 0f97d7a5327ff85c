//! # Fetch Command Implementation
//!
//! This module implements the `fetch` subcommand, which behaves like an
//! application starting up: it asks the config servers listed under
//! `client.uris` for its configuration, failing over between them and, with
//! `--fail-fast`, retrying with backoff. The winning value of every key is
//! printed.
//!
//! Without `--fail-fast` an unreachable server is not an error; the output is
//! simply empty.

use anyhow::Result;
use clap::Args;
use indexmap::IndexMap;

use super::render::{self, OutputFormat};
use super::Context;
use config_hub::client::ConfigClient;

/// Fetch configuration from running config servers
#[derive(Args, Debug)]
pub struct FetchArgs {
    /// Config server URI; repeat to fail over (overrides client.uris)
    #[arg(long = "uri", value_name = "URI")]
    pub uris: Vec<String>,

    /// Application name (overrides client.name)
    #[arg(long)]
    pub name: Option<String>,

    /// Comma-separated profiles (overrides client.profile)
    #[arg(long)]
    pub profile: Option<String>,

    /// Comma-separated labels, tried in order (overrides client.label)
    #[arg(long)]
    pub label: Option<String>,

    /// Fail when no server answers, after retrying
    #[arg(long)]
    pub fail_fast: bool,

    /// Output format
    #[arg(long, value_enum, default_value_t = OutputFormat::Properties)]
    pub format: OutputFormat,
}

/// Execute the `fetch` command.
pub fn execute(args: FetchArgs, context: &Context) -> Result<()> {
    let mut settings = context.config.client.clone().unwrap_or_default();
    if !args.uris.is_empty() {
        settings.uris = args.uris;
    }
    if let Some(name) = args.name {
        settings.name = name;
    }
    if let Some(profile) = args.profile {
        settings.profile = profile;
    }
    if args.label.is_some() {
        settings.label = args.label;
    }
    settings.fail_fast |= args.fail_fast;

    let client = ConfigClient::new(settings)?;
    let values = client
        .load()?
        .map(|view| view.flatten())
        .unwrap_or_else(IndexMap::new);
    print!("{}", render::flat(&values, args.format)?);
    Ok(())
}
