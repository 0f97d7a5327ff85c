//! Default values for config-hub configuration.

use std::path::PathBuf;

/// Environment variable naming the configuration file.
pub const CONFIG_ENV: &str = "CONFIG_HUB_CONFIG";
/// Environment variable overriding the workspace base directory.
pub const BASEDIR_ENV: &str = "CONFIG_HUB_BASEDIR";
/// Configuration file looked up in the current directory.
pub const CONFIG_FILE: &str = "config-hub.yaml";

/// Returns the default base directory for git workspaces.
///
/// Uses the platform-appropriate cache directory:
/// - Linux: `~/.cache/config-hub` (XDG Base Directory)
/// - macOS: `~/Library/Caches/config-hub`
/// - Windows: `{FOLDERID_LocalAppData}\config-hub`
///
/// Falls back to `.config-hub-cache` in the current directory if the
/// platform cache directory cannot be determined.
///
/// This can be overridden by `basedir` in the configuration file, the
/// `--basedir` CLI flag or the `CONFIG_HUB_BASEDIR` environment variable.
pub fn default_basedir() -> PathBuf {
    dirs::cache_dir()
        .unwrap_or_else(|| PathBuf::from(".config-hub-cache"))
        .join("config-hub")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_basedir_returns_path() {
        assert!(default_basedir().ends_with("config-hub"));
    }

    #[test]
    fn test_default_basedir_is_absolute_or_fallback() {
        let basedir = default_basedir();
        assert!(
            basedir.is_absolute() || basedir.starts_with(".config-hub-cache"),
            "Expected absolute path or fallback, got: {:?}",
            basedir
        );
    }
}
