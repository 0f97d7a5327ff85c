//! Path, pattern and URI helpers shared by the router and the workspaces

use crate::error::{Error, Result};
use glob::Pattern;
use sha2::{Digest, Sha256};
use url::Url;

/// Placeholder replaced by the application name.
pub const APPLICATION_PLACEHOLDER: &str = "{application}";
/// Placeholder replaced by a single profile.
pub const PROFILE_PLACEHOLDER: &str = "{profile}";
/// Placeholder replaced by the label.
pub const LABEL_PLACEHOLDER: &str = "{label}";

/// Match a string against a glob pattern
///
/// `*` also matches `/`, so `myapp*` matches `myapp/dev`.
pub fn glob_match(pattern: &str, path: &str) -> Result<bool> {
    let pattern = Pattern::new(pattern).map_err(Error::Glob)?;
    Ok(pattern.matches(path))
}

/// Whether a URI or search path template mentions any placeholder.
pub fn has_placeholders(template: &str) -> bool {
    template.contains(APPLICATION_PLACEHOLDER)
        || template.contains(PROFILE_PLACEHOLDER)
        || template.contains(LABEL_PLACEHOLDER)
}

/// Substitutes `{application}`, `{profile}` and `{label}`.
///
/// Placeholders whose value is `None` are left untouched.
pub fn resolve_placeholders(
    template: &str,
    application: Option<&str>,
    profile: Option<&str>,
    label: Option<&str>,
) -> String {
    let mut resolved = template.to_string();
    if let Some(application) = application {
        resolved = resolved.replace(APPLICATION_PLACEHOLDER, application);
    }
    if let Some(profile) = profile {
        resolved = resolved.replace(PROFILE_PLACEHOLDER, profile);
    }
    if let Some(label) = label {
        resolved = resolved.replace(LABEL_PLACEHOLDER, label);
    }
    resolved
}

/// Encode a URL path to be filesystem-safe
///
/// This converts URL characters that are problematic for filesystems
/// into safe alternatives.
pub fn encode_url_path(url: &str) -> String {
    url.chars()
        .map(|c| match c {
            '/' => '-',
            '\\' => '-',
            ':' => '_',
            // Keep alphanumeric, dots, dashes, underscores as-is
            c if c.is_alphanumeric() || c == '.' || c == '-' || c == '_' => c,
            _ => '_',
        })
        .collect()
}

/// Directory name for the workspace of one resolved URI.
///
/// The readable part is the last path segment of the URI; the suffix is a
/// SHA-256 prefix of the whole URI so distinct URIs never collide and the
/// same URI maps to the same directory across restarts.
pub fn workspace_dir_name(uri: &str) -> String {
    let digest = Sha256::digest(uri.as_bytes());
    let hash = hex::encode(&digest[..8]);
    let tail = uri
        .trim_end_matches('/')
        .rsplit(['/', ':'])
        .next()
        .unwrap_or_default()
        .trim_end_matches(".git");
    let tail = encode_url_path(tail);
    if tail.is_empty() {
        hash
    } else {
        format!("{}-{}", tail, hash)
    }
}

/// Replaces any password embedded in a URI so it can be logged.
pub fn redact_credentials(uri: &str) -> String {
    match Url::parse(uri) {
        Ok(mut url) if url.password().is_some() => {
            // set_password only fails for cannot-be-a-base URLs, which carry no password
            let _ = url.set_password(Some("****"));
            url.to_string()
        }
        _ => uri.to_string(),
    }
}

/// Encodes a label for use as a single URL path segment (`/` becomes `(_)`).
pub fn encode_label(label: &str) -> String {
    label.replace('/', "(_)")
}

/// Reverses [`encode_label`].
pub fn decode_label(label: &str) -> String {
    label.replace("(_)", "/")
}
