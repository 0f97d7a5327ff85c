//! # Git Command Layer
//!
//! Thin wrappers around the system `git` binary. Using the real command line
//! means SSH keys, credential helpers and `~/.gitconfig` settings all work
//! without extra configuration.
//!
//! The [`GitOperations`] trait lists exactly the primitives the workspace
//! synchronization needs, so that the sync algorithm in
//! [`crate::workspace`] can be exercised against a mock. [`GitCli`] is the
//! real implementation.
//!
//! Every command runs with `GIT_TERMINAL_PROMPT=0` so a missing credential
//! fails the command instead of blocking the server on a prompt.

use std::fs;
use std::path::Path;
use std::process::Command;

use log::debug;

use crate::error::{Error, Result};
use crate::path::redact_credentials;

/// Name of the only remote a workspace ever has.
pub const ORIGIN: &str = "origin";

/// Connection settings applied to every command that talks to the remote.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RemoteOptions {
    /// Out-of-band username; takes precedence over one embedded in the URI.
    pub username: Option<String>,
    pub password: Option<String>,
    pub skip_ssl_validation: bool,
    /// Abort transfers that stall for this many seconds (0 disables).
    pub timeout_secs: u64,
}

/// A remote repository plus the options used to reach it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Remote {
    uri: String,
    options: RemoteOptions,
}

impl Remote {
    pub fn new(uri: &str, options: RemoteOptions) -> Self {
        let mut uri = normalize_file_uri(uri);
        if options.username.is_some() && is_http(&uri) {
            uri = strip_user_info(&uri);
        }
        Self { uri, options }
    }

    /// The URI passed to `git clone`.
    pub fn uri(&self) -> &str {
        &self.uri
    }

    /// The URI with any embedded password masked, for logs and errors.
    pub fn display_uri(&self) -> String {
        redact_credentials(&self.uri)
    }

    pub fn options(&self) -> &RemoteOptions {
        &self.options
    }

    /// `-c key=value` arguments carrying the connection settings.
    fn config_args(&self) -> Vec<String> {
        let mut args = Vec::new();
        if self.options.skip_ssl_validation {
            args.push("-c".to_string());
            args.push("http.sslVerify=false".to_string());
        }
        if self.options.timeout_secs > 0 {
            args.push("-c".to_string());
            args.push("http.lowSpeedLimit=1".to_string());
            args.push("-c".to_string());
            args.push(format!("http.lowSpeedTime={}", self.options.timeout_secs));
        }
        if let (Some(username), true) = (&self.options.username, is_http(&self.uri)) {
            let password = self.options.password.as_deref().unwrap_or_default();
            let token = base64::Engine::encode(
                &base64::engine::general_purpose::STANDARD,
                format!("{}:{}", username, password),
            );
            args.push("-c".to_string());
            args.push(format!("http.extraHeader=Authorization: Basic {}", token));
        }
        args
    }
}

fn is_http(uri: &str) -> bool {
    uri.starts_with("http://") || uri.starts_with("https://")
}

/// `file:/path` is accepted as a shorthand for `file:///path`.
fn normalize_file_uri(uri: &str) -> String {
    match uri.strip_prefix("file:") {
        Some(rest) if !rest.starts_with("//") => format!("file://{}", rest),
        _ => uri.to_string(),
    }
}

fn strip_user_info(uri: &str) -> String {
    match url::Url::parse(uri) {
        Ok(mut url) => {
            let _ = url.set_username("");
            let _ = url.set_password(None);
            url.to_string()
        }
        Err(_) => uri.to_string(),
    }
}

/// Git primitives used by the workspace synchronization - allows mocking in tests
pub trait GitOperations: Send + Sync {
    /// Clones the remote into `target_dir`, which must not exist yet.
    fn clone_repository(&self, remote: &Remote, target_dir: &Path) -> Result<()>;

    /// Fetches all branches and tags from origin, optionally pruning
    /// remote-tracking branches that no longer exist.
    fn fetch(&self, remote: &Remote, work_dir: &Path, prune: bool) -> Result<()>;

    /// Whether the working tree has no staged, unstaged or untracked changes.
    fn is_clean(&self, work_dir: &Path) -> Result<bool>;

    /// Branch names under `refs/remotes/origin`, without the prefix.
    fn remote_branches(&self, work_dir: &Path) -> Result<Vec<String>>;

    /// Local branch names.
    fn local_branches(&self, work_dir: &Path) -> Result<Vec<String>>;

    /// The checked-out branch, or `None` on a detached head.
    fn current_branch(&self, work_dir: &Path) -> Result<Option<String>>;

    /// Whether a fully qualified ref (or any revision) resolves to a commit.
    fn ref_exists(&self, work_dir: &Path, reference: &str) -> Result<bool>;

    /// Checks out an existing branch, tag or commit.
    fn checkout(&self, work_dir: &Path, label: &str) -> Result<()>;

    /// Creates a local branch tracking `origin/<branch>` and checks it out.
    fn checkout_tracking(&self, work_dir: &Path, branch: &str) -> Result<()>;

    /// Fast-forwards the current branch to `origin/<branch>`.
    ///
    /// Returns `false` when a fast-forward is impossible (local commits or
    /// conflicting local changes).
    fn merge_fast_forward(&self, work_dir: &Path, branch: &str) -> Result<bool>;

    /// Number of commits on `HEAD` that `origin/<branch>` does not have.
    fn commits_ahead(&self, work_dir: &Path, branch: &str) -> Result<usize>;

    /// Resets index and working tree to `target`, discarding untracked files.
    fn reset_hard(&self, work_dir: &Path, target: &str) -> Result<()>;

    fn delete_branch(&self, work_dir: &Path, branch: &str) -> Result<()>;

    /// The commit id of `HEAD`.
    fn head_commit(&self, work_dir: &Path) -> Result<String>;
}

/// The default implementation of `GitOperations`, which uses the system's
/// `git` command.
#[derive(Debug, Default, Clone, Copy)]
pub struct GitCli;

impl GitCli {
    fn run(
        &self,
        work_dir: Option<&Path>,
        remote: Option<&Remote>,
        args: &[&str],
    ) -> Result<std::process::Output> {
        let mut command = Command::new("git");
        command.env("GIT_TERMINAL_PROMPT", "0");
        if let Some(remote) = remote {
            command.args(remote.config_args());
        }
        if let Some(dir) = work_dir {
            command.current_dir(dir);
        }
        command.args(args);
        debug!("git {}", describe(args));

        command.output().map_err(|e| Error::GitCommand {
            command: describe(args),
            uri: display_target(work_dir, remote),
            stderr: e.to_string(),
        })
    }

    /// Runs a command that must succeed and returns its trimmed stdout.
    fn run_checked(
        &self,
        work_dir: Option<&Path>,
        remote: Option<&Remote>,
        args: &[&str],
    ) -> Result<String> {
        let output = self.run(work_dir, remote, args)?;
        if !output.status.success() {
            return Err(Error::GitCommand {
                command: describe(args),
                uri: display_target(work_dir, remote),
                stderr: String::from_utf8_lossy(&output.stderr).trim().to_string(),
            });
        }
        Ok(String::from_utf8_lossy(&output.stdout).trim().to_string())
    }

    fn list_refs(&self, work_dir: &Path, prefix: &str) -> Result<Vec<String>> {
        let stdout = self.run_checked(
            Some(work_dir),
            None,
            &["for-each-ref", "--format=%(refname)", prefix],
        )?;
        Ok(stdout
            .lines()
            .filter_map(|line| line.strip_prefix(prefix))
            .filter(|name| *name != "HEAD")
            .map(str::to_string)
            .collect())
    }
}

/// The command line with embedded passwords masked.
fn describe(args: &[&str]) -> String {
    args.iter()
        .map(|arg| redact_credentials(arg))
        .collect::<Vec<_>>()
        .join(" ")
}

fn display_target(work_dir: Option<&Path>, remote: Option<&Remote>) -> String {
    match (remote, work_dir) {
        (Some(remote), _) => remote.display_uri(),
        (None, Some(dir)) => dir.display().to_string(),
        (None, None) => String::new(),
    }
}

impl GitOperations for GitCli {
    fn clone_repository(&self, remote: &Remote, target_dir: &Path) -> Result<()> {
        if let Some(parent) = target_dir.parent() {
            fs::create_dir_all(parent)?;
        }
        let target = target_dir.to_string_lossy();
        let output = self.run(
            None,
            Some(remote),
            &["clone", "--quiet", remote.uri(), &target],
        )?;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            let message = if stderr.contains("Authentication failed")
                || stderr.contains("Permission denied")
                || stderr.contains("Could not read from remote repository")
            {
                format!(
                    "Authentication failed. Check the configured username/password \
                    or the SSH key available to the server. Error: {}",
                    stderr.trim()
                )
            } else {
                stderr.trim().to_string()
            };
            return Err(Error::NoSuchRepository {
                uri: remote.display_uri(),
                message,
            });
        }
        Ok(())
    }

    fn fetch(&self, remote: &Remote, work_dir: &Path, prune: bool) -> Result<()> {
        let mut args = vec!["fetch", "--tags", "--force"];
        if prune {
            args.push("--prune");
        }
        args.push(ORIGIN);
        self.run_checked(Some(work_dir), Some(remote), &args)?;
        Ok(())
    }

    fn is_clean(&self, work_dir: &Path) -> Result<bool> {
        let stdout = self.run_checked(Some(work_dir), None, &["status", "--porcelain"])?;
        Ok(stdout.is_empty())
    }

    fn remote_branches(&self, work_dir: &Path) -> Result<Vec<String>> {
        self.list_refs(work_dir, "refs/remotes/origin/")
    }

    fn local_branches(&self, work_dir: &Path) -> Result<Vec<String>> {
        self.list_refs(work_dir, "refs/heads/")
    }

    fn current_branch(&self, work_dir: &Path) -> Result<Option<String>> {
        let output = self.run(Some(work_dir), None, &["symbolic-ref", "--quiet", "--short", "HEAD"])?;
        if output.status.success() {
            Ok(Some(String::from_utf8_lossy(&output.stdout).trim().to_string()))
        } else {
            Ok(None)
        }
    }

    fn ref_exists(&self, work_dir: &Path, reference: &str) -> Result<bool> {
        let spec = format!("{}^{{commit}}", reference);
        let output = self.run(Some(work_dir), None, &["rev-parse", "--verify", "--quiet", &spec])?;
        Ok(output.status.success())
    }

    fn checkout(&self, work_dir: &Path, label: &str) -> Result<()> {
        self.run_checked(Some(work_dir), None, &["checkout", "--quiet", label])?;
        Ok(())
    }

    fn checkout_tracking(&self, work_dir: &Path, branch: &str) -> Result<()> {
        let upstream = format!("{}/{}", ORIGIN, branch);
        self.run_checked(
            Some(work_dir),
            None,
            &["checkout", "--quiet", "-b", branch, "--track", &upstream],
        )?;
        Ok(())
    }

    fn merge_fast_forward(&self, work_dir: &Path, branch: &str) -> Result<bool> {
        let upstream = format!("{}/{}", ORIGIN, branch);
        let output = self.run(
            Some(work_dir),
            None,
            &["merge", "--ff-only", "--quiet", &upstream],
        )?;
        Ok(output.status.success())
    }

    fn commits_ahead(&self, work_dir: &Path, branch: &str) -> Result<usize> {
        let range = format!("{}/{}..HEAD", ORIGIN, branch);
        let stdout = self.run_checked(Some(work_dir), None, &["rev-list", "--count", &range])?;
        stdout.parse().map_err(|_| Error::GitCommand {
            command: format!("rev-list --count {}", range),
            uri: work_dir.display().to_string(),
            stderr: format!("unexpected output: {}", stdout),
        })
    }

    fn reset_hard(&self, work_dir: &Path, target: &str) -> Result<()> {
        self.run_checked(Some(work_dir), None, &["reset", "--hard", "--quiet", target])?;
        self.run_checked(Some(work_dir), None, &["clean", "-fdq"])?;
        Ok(())
    }

    fn delete_branch(&self, work_dir: &Path, branch: &str) -> Result<()> {
        self.run_checked(Some(work_dir), None, &["branch", "-D", branch])?;
        Ok(())
    }

    fn head_commit(&self, work_dir: &Path) -> Result<String> {
        self.run_checked(Some(work_dir), None, &["rev-parse", "HEAD"])
    }
}
