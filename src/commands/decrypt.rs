//! # Decrypt Command Implementation
//!
//! Decrypts one `{cipher}` value with the keys under `server.encrypt`. The
//! `{cipher}` marker is optional.

use anyhow::Result;
use clap::Args;

use super::Context;
use config_hub::environment::{DEFAULT_APPLICATION, DEFAULT_PROFILE};

/// Decrypt a {cipher} value
#[derive(Args, Debug)]
pub struct DecryptArgs {
    /// Encrypted value, with or without the {cipher} marker
    pub value: String,

    /// Application the value belongs to; selects a key of the same name
    #[arg(long, default_value = DEFAULT_APPLICATION)]
    pub application: String,

    /// Profiles the value belongs to
    #[arg(long, default_value = DEFAULT_PROFILE)]
    pub profiles: String,
}

/// Execute the `decrypt` command.
pub fn execute(args: DecryptArgs, context: &Context) -> Result<()> {
    let cipher = context.cipher()?;
    let plain = cipher.decrypt(&args.value, &args.application, &args.profiles)?;
    println!("{}", plain);
    Ok(())
}
