//! # Resource Command Implementation
//!
//! This module implements the `resource` subcommand, which prints one plain
//! file (for example an `nginx.conf` kept next to the properties) from the
//! configured backends. A profile-specific variant such as
//! `nginx-dev.conf` wins over the plain file, and `{cipher}` values inside
//! properties, YAML and JSON files are decrypted.

use anyhow::Result;
use clap::Args;

use super::Context;

/// Print one raw file from the backends
#[derive(Args, Debug)]
pub struct ResourceArgs {
    /// Application name
    pub application: String,

    /// Comma-separated profiles
    pub profile: String,

    /// Branch, tag or commit
    pub label: String,

    /// Path of the file relative to the search paths
    pub path: String,
}

/// Execute the `resource` command.
pub fn execute(args: ResourceArgs, context: &Context) -> Result<()> {
    let server = context.server()?;
    let request = server.request(&args.application, Some(&args.profile), Some(&args.label));
    let resource = server.resource(&request, &args.path)?;
    print!("{}", resource.text);
    Ok(())
}
