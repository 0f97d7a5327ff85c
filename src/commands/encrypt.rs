//! # Encrypt Command Implementation
//!
//! Encrypts a value with the keys under `server.encrypt`. The output is ready
//! to be stored as a property value:
//!
//! ```bash
//! $ config-hub encrypt '{key:legacy}hunter2'
//! {cipher}{key:legacy}5f0a...
//! ```

use anyhow::Result;
use clap::Args;

use super::Context;
use config_hub::crypto::CIPHER_MARKER;
use config_hub::environment::{DEFAULT_APPLICATION, DEFAULT_PROFILE};

/// Encrypt a value for use as a {cipher} property
#[derive(Args, Debug)]
pub struct EncryptArgs {
    /// Plaintext, optionally preceded by tags such as {key:alias}
    pub value: String,

    /// Application the value belongs to; selects a key of the same name
    #[arg(long, default_value = DEFAULT_APPLICATION)]
    pub application: String,

    /// Profiles the value belongs to
    #[arg(long, default_value = DEFAULT_PROFILE)]
    pub profiles: String,

    /// Print the ciphertext without the {cipher} marker
    #[arg(long)]
    pub raw: bool,
}

/// Execute the `encrypt` command.
pub fn execute(args: EncryptArgs, context: &Context) -> Result<()> {
    let cipher = context.cipher()?;
    let sealed = cipher.encrypt(&args.value, &args.application, &args.profiles)?;
    if args.raw {
        println!("{}", sealed);
    } else {
        println!("{}{}", CIPHER_MARKER, sealed);
    }
    Ok(())
}
