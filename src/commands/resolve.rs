//! # Resolve Command Implementation
//!
//! This module implements the `resolve` subcommand, which answers a request
//! for an application, profiles and label through the configured backends,
//! exactly as a config server would, and prints the resulting environment.
//!
//! ## Example
//!
//! ```bash
//! config-hub --config config-hub.yaml resolve billing dev,mysql main --format properties
//! ```

use anyhow::Result;
use clap::Args;

use super::render::{self, OutputFormat};
use super::Context;

/// Resolve the environment of an application
#[derive(Args, Debug)]
pub struct ResolveArgs {
    /// Application name
    pub application: String,

    /// Comma-separated profiles (defaults to the configured default profile)
    pub profile: Option<String>,

    /// Branch, tag or commit (defaults to each backend's default label)
    pub label: Option<String>,

    /// Output format
    #[arg(long, value_enum, default_value_t = OutputFormat::Json)]
    pub format: OutputFormat,

    /// Record the file and line of every value
    #[arg(long)]
    pub include_origin: bool,

    /// Print {cipher} values as stored
    #[arg(long)]
    pub no_decrypt: bool,
}

/// Execute the `resolve` command.
pub fn execute(args: ResolveArgs, context: &Context) -> Result<()> {
    let server = context.server()?;
    let request = server
        .request(&args.application, args.profile.as_deref(), args.label.as_deref())
        .with_origin(args.include_origin);

    let environment = server.resolve(&request, !args.no_decrypt)?;
    print!("{}", render::environment(&environment, args.format)?);
    Ok(())
}
