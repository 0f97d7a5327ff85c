//! Integration tests for workspace synchronization against real git
//! repositories.
//!
//! The remotes are local repositories in temporary directories, so no network
//! access is needed, only a `git` executable. Run with:
//!
//! ```bash
//! cargo test --test git_sync_integration --features integration-tests
//! ```

mod common;

use std::fs;
use std::process::Command;

use common::{git_available, GitFixture};
use config_hub::error::Error;
use config_hub::workspace::{WorkspaceManager, WorkspaceSettings};
use tempfile::TempDir;

fn manager(remote: &GitFixture, workspaces: &TempDir) -> WorkspaceManager {
    WorkspaceManager::new(
        WorkspaceSettings::new(&remote.uri()),
        workspaces.path().join("work"),
    )
}

fn local_branches(manager: &WorkspaceManager) -> Vec<String> {
    let output = Command::new("git")
        .args(["for-each-ref", "--format=%(refname:short)", "refs/heads/"])
        .current_dir(manager.work_dir())
        .output()
        .unwrap();
    String::from_utf8_lossy(&output.stdout)
        .lines()
        .map(str::to_string)
        .collect()
}

#[test]
#[cfg_attr(not(feature = "integration-tests"), ignore)]
fn test_clone_reports_head_version_and_is_idempotent() {
    if !git_available() {
        return;
    }
    let remote = GitFixture::new().with_file("application.yml", "greeting: hello\n");
    let head = remote.commit("initial");
    let workspaces = TempDir::new().unwrap();
    let manager = manager(&remote, &workspaces);

    assert_eq!(manager.sync("main").unwrap(), head);
    assert_eq!(manager.sync("main").unwrap(), head);
    assert_eq!(
        fs::read_to_string(manager.work_dir().join("application.yml")).unwrap(),
        "greeting: hello\n"
    );
}

#[test]
#[cfg_attr(not(feature = "integration-tests"), ignore)]
fn test_new_commit_is_pulled() {
    if !git_available() {
        return;
    }
    let remote = GitFixture::new().with_file("application.yml", "greeting: hello\n");
    remote.commit("initial");
    let workspaces = TempDir::new().unwrap();
    let manager = manager(&remote, &workspaces);
    manager.sync("main").unwrap();

    remote.write("application.yml", "greeting: bonjour\n");
    let second = remote.commit("update");

    assert_eq!(manager.sync("main").unwrap(), second);
    assert_eq!(
        fs::read_to_string(manager.work_dir().join("application.yml")).unwrap(),
        "greeting: bonjour\n"
    );
}

#[test]
#[cfg_attr(not(feature = "integration-tests"), ignore)]
fn test_dirty_working_tree_is_reset() {
    if !git_available() {
        return;
    }
    let remote = GitFixture::new().with_file("application.yml", "greeting: hello\n");
    let head = remote.commit("initial");
    let workspaces = TempDir::new().unwrap();
    let manager = manager(&remote, &workspaces);
    manager.sync("main").unwrap();

    fs::write(manager.work_dir().join("application.yml"), "greeting: tampered\n").unwrap();
    fs::write(manager.work_dir().join("stray.yml"), "x: 1\n").unwrap();

    assert_eq!(manager.sync("main").unwrap(), head);
    assert_eq!(
        fs::read_to_string(manager.work_dir().join("application.yml")).unwrap(),
        "greeting: hello\n"
    );
    assert!(!manager.work_dir().join("stray.yml").exists());
}

#[test]
#[cfg_attr(not(feature = "integration-tests"), ignore)]
fn test_unknown_label() {
    if !git_available() {
        return;
    }
    let remote = GitFixture::new().with_file("application.yml", "a: 1\n");
    remote.commit("initial");
    let workspaces = TempDir::new().unwrap();
    let manager = manager(&remote, &workspaces);

    let err = manager.sync("no-such-branch").unwrap_err();
    assert!(matches!(err, Error::NoSuchLabel { .. }), "got {:?}", err);
    assert!(err.is_not_found());
}

#[test]
#[cfg_attr(not(feature = "integration-tests"), ignore)]
fn test_missing_repository_leaves_no_workspace() {
    if !git_available() {
        return;
    }
    let workspaces = TempDir::new().unwrap();
    let missing = workspaces.path().join("does-not-exist");
    let manager = WorkspaceManager::new(
        WorkspaceSettings::new(&missing.display().to_string()),
        workspaces.path().join("work"),
    );

    let err = manager.sync("main").unwrap_err();
    assert!(matches!(err, Error::NoSuchRepository { .. }), "got {:?}", err);
    assert!(!manager.work_dir().exists());
}

#[test]
#[cfg_attr(not(feature = "integration-tests"), ignore)]
fn test_master_fallback() {
    if !git_available() {
        return;
    }
    let remote = GitFixture::new().with_file("application.yml", "a: 1\n");
    let head = remote.commit("initial");
    remote.rename_branch("master");
    let workspaces = TempDir::new().unwrap();
    let manager = manager(&remote, &workspaces);

    let locations = manager.locations("app", "default", None).unwrap();
    assert_eq!(locations.label.as_deref(), Some("master"));
    assert_eq!(locations.version.as_deref(), Some(head.as_str()));
}

#[test]
#[cfg_attr(not(feature = "integration-tests"), ignore)]
fn test_tag_checkout() {
    if !git_available() {
        return;
    }
    let remote = GitFixture::new().with_file("application.yml", "release: one\n");
    let tagged = remote.commit("first release");
    remote.tag("v1.0");
    remote.write("application.yml", "release: two\n");
    remote.commit("second release");

    let workspaces = TempDir::new().unwrap();
    let manager = manager(&remote, &workspaces);

    assert_eq!(manager.sync("v1.0").unwrap(), tagged);
    assert_eq!(
        fs::read_to_string(manager.work_dir().join("application.yml")).unwrap(),
        "release: one\n"
    );
    assert_ne!(manager.sync("main").unwrap(), tagged);
}

#[test]
#[cfg_attr(not(feature = "integration-tests"), ignore)]
fn test_branch_deleted_on_remote_is_pruned() {
    if !git_available() {
        return;
    }
    let remote = GitFixture::new().with_file("application.yml", "a: 1\n");
    remote.commit("initial");
    remote.branch("feature");
    remote.write("application.yml", "a: 2\n");
    remote.commit("feature work");
    remote.checkout("main");

    let workspaces = TempDir::new().unwrap();
    let settings = WorkspaceSettings {
        delete_untracked_branches: true,
        ..WorkspaceSettings::new(&remote.uri())
    };
    let manager = WorkspaceManager::new(settings, workspaces.path().join("work"));

    manager.sync("feature").unwrap();
    manager.sync("main").unwrap();
    assert!(local_branches(&manager).contains(&"feature".to_string()));

    remote.delete_branch("feature");
    manager.sync("main").unwrap();
    assert_eq!(local_branches(&manager), vec!["main".to_string()]);
}

#[test]
#[cfg_attr(not(feature = "integration-tests"), ignore)]
fn test_search_paths_are_resolved_per_request() {
    if !git_available() {
        return;
    }
    let remote = GitFixture::new()
        .with_file("billing/application.yml", "owner: billing\n")
        .with_file("orders/application.yml", "owner: orders\n");
    remote.commit("initial");
    let workspaces = TempDir::new().unwrap();
    let settings = WorkspaceSettings {
        search_paths: vec!["{application}".to_string()],
        ..WorkspaceSettings::new(&remote.uri())
    };
    let manager = WorkspaceManager::new(settings, workspaces.path().join("work"));

    let locations = manager.locations("billing", "default", None).unwrap();
    assert_eq!(
        locations.search_paths,
        vec![manager.work_dir().join("billing")]
    );
}
