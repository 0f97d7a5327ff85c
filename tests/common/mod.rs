//! Shared test utilities for integration and E2E tests.
//!
//! ## Usage
//!
//! ```rust,ignore
//! mod common;
//! use common::prelude::*;
//!
//! #[test]
//! fn test_example() {
//!     if !git_available() {
//!         return;
//!     }
//!     let remote = GitFixture::new().with_file("app.yml", "a: 1\n");
//!     remote.commit("initial");
//! }
//! ```

#![allow(dead_code)]

use assert_fs::prelude::*;
use std::path::{Path, PathBuf};
use std::process::Command;

/// Re-export commonly used test dependencies for convenience.
pub mod prelude {
    pub use assert_cmd::cargo::cargo_bin_cmd;
    pub use assert_fs::prelude::*;
    #[allow(unused_imports)]
    pub use assert_fs::TempDir;
    pub use predicates::prelude::*;

    #[allow(unused_imports)]
    pub use super::{git_available, GitFixture, TestFixture};
}

/// Whether a `git` executable is on the `PATH`.
pub fn git_available() -> bool {
    Command::new("git")
        .arg("--version")
        .output()
        .map(|output| output.status.success())
        .unwrap_or(false)
}

/// A throwaway git repository acting as the remote of a workspace.
///
/// The repository starts on an empty `main` branch; nothing is committed
/// until [`commit`](Self::commit) is called.
pub struct GitFixture {
    root: PathBuf,
    _temp_dir: Option<assert_fs::TempDir>,
}

impl GitFixture {
    pub fn new() -> Self {
        let temp_dir = assert_fs::TempDir::new().expect("Failed to create temp directory");
        Self::init(temp_dir.path().to_path_buf(), Some(temp_dir))
    }

    /// A repository at `path`, which the caller cleans up.
    pub fn at(path: &Path) -> Self {
        std::fs::create_dir_all(path).expect("Failed to create repository directory");
        Self::init(path.to_path_buf(), None)
    }

    fn init(root: PathBuf, temp_dir: Option<assert_fs::TempDir>) -> Self {
        let fixture = Self {
            root,
            _temp_dir: temp_dir,
        };
        fixture.git(&["init", "-q"]);
        fixture.git(&["symbolic-ref", "HEAD", "refs/heads/main"]);
        fixture
    }

    /// Run git in the repository and return its trimmed stdout.
    pub fn git(&self, args: &[&str]) -> String {
        let output = Command::new("git")
            .args(["-c", "user.name=Test", "-c", "user.email=test@example.com"])
            .args(["-c", "commit.gpgsign=false", "-c", "tag.gpgsign=false"])
            .args(args)
            .current_dir(&self.root)
            .output()
            .expect("Failed to run git");
        assert!(
            output.status.success(),
            "git {:?} failed: {}",
            args,
            String::from_utf8_lossy(&output.stderr)
        );
        String::from_utf8_lossy(&output.stdout).trim().to_string()
    }

    /// Write a file into the working tree.
    pub fn with_file(self, path: &str, content: &str) -> Self {
        self.write(path, content);
        self
    }

    pub fn write(&self, path: &str, content: &str) {
        let target = self.root.join(path);
        if let Some(parent) = target.parent() {
            std::fs::create_dir_all(parent).expect("Failed to create directory");
        }
        std::fs::write(target, content).expect("Failed to write file");
    }

    pub fn remove(&self, path: &str) {
        self.git(&["rm", "-q", path]);
    }

    /// Stage everything and commit; returns the new commit id.
    pub fn commit(&self, message: &str) -> String {
        self.git(&["add", "-A"]);
        self.git(&["commit", "-q", "--allow-empty", "-m", message]);
        self.head()
    }

    pub fn head(&self) -> String {
        self.git(&["rev-parse", "HEAD"])
    }

    /// Create `name` from the current commit and switch to it.
    pub fn branch(&self, name: &str) {
        self.git(&["checkout", "-q", "-b", name]);
    }

    pub fn checkout(&self, name: &str) {
        self.git(&["checkout", "-q", name]);
    }

    pub fn delete_branch(&self, name: &str) {
        self.git(&["branch", "-q", "-D", name]);
    }

    pub fn tag(&self, name: &str) {
        self.git(&["tag", name]);
    }

    /// Rename the current branch (e.g. to `master`).
    pub fn rename_branch(&self, name: &str) {
        self.git(&["branch", "-q", "-M", name]);
    }

    pub fn path(&self) -> &Path {
        &self.root
    }

    /// URI to configure as the remote.
    pub fn uri(&self) -> String {
        self.root.display().to_string()
    }
}

impl Default for GitFixture {
    fn default() -> Self {
        Self::new()
    }
}

/// A temporary working directory for the CLI with an optional
/// `config-hub.yaml`.
pub struct TestFixture {
    temp_dir: assert_fs::TempDir,
}

impl TestFixture {
    pub fn new() -> Self {
        Self {
            temp_dir: assert_fs::TempDir::new().expect("Failed to create temp directory"),
        }
    }

    /// Add a `config-hub.yaml` configuration file with the given content.
    pub fn with_config(self, content: &str) -> Self {
        self.temp_dir
            .child("config-hub.yaml")
            .write_str(content)
            .expect("Failed to write config file");
        self
    }

    /// Add a file with the given path and content.
    pub fn with_file(self, path: &str, content: &str) -> Self {
        self.temp_dir
            .child(path)
            .write_str(content)
            .expect("Failed to write file");
        self
    }

    pub fn path(&self) -> &Path {
        self.temp_dir.path()
    }

    pub fn child_path(&self, path: &str) -> PathBuf {
        self.temp_dir.path().join(path)
    }

    /// A `config-hub` command running in this directory, with workspaces
    /// kept inside it.
    pub fn command(&self) -> assert_cmd::Command {
        let mut cmd = assert_cmd::cargo::cargo_bin_cmd!("config-hub");
        cmd.current_dir(self.path())
            .env_remove("CONFIG_HUB_CONFIG")
            .env_remove("RUST_LOG")
            .env("CONFIG_HUB_BASEDIR", self.child_path("workspaces"));
        cmd
    }
}

impl Default for TestFixture {
    fn default() -> Self {
        Self::new()
    }
}
