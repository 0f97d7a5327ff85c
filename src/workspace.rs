//! # Workspace Synchronization
//!
//! A [`WorkspaceManager`] owns the local working copy of one remote git
//! repository and keeps it in step with the remote. `sync(label)` is the only
//! mutating entry point:
//!
//! 1.  Open the workspace, cloning it first when it does not exist yet. A
//!     stale `.git/index.lock` left by a crashed process is removed, and a
//!     workspace git can no longer read is deleted and cloned again.
//! 2.  Decide whether to fetch. Fetching is skipped inside the refresh-rate
//!     window, and skipped for a dirty working tree unless `force_pull` is set.
//! 3.  Fetch branches and tags, optionally deleting local branches whose
//!     remote counterpart disappeared.
//! 4.  Check the label out, creating a tracking branch for remote branches
//!     that have no local branch yet.
//! 5.  For branches, fast-forward to `origin/<label>`. Anything that leaves the
//!     tree dirty, ahead or diverged is hard-reset to `origin/<label>`: local
//!     changes to a configuration repository are never authoritative.
//! 6.  Report the `HEAD` commit id as the version.
//!
//! ## Concurrency
//!
//! Every sync, and every read of the files it produced, happens while holding
//! the manager's mutex, so the working tree is never read mid-update and never
//! written by two requests at once. Different managers share nothing and run
//! in parallel.
//!
//! ## Stale Locks
//!
//! Removing `.git/index.lock` is best-effort recovery from a crashed process.
//! It is racy if two server processes share one base directory; there is no
//! cross-process lock.

use std::fs;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::{Duration, Instant};

use log::{debug, info, warn};

use crate::environment::{split_applications, split_profiles, Locations};
use crate::error::{Error, Result};
use crate::git::{GitCli, GitOperations, Remote, RemoteOptions, ORIGIN};
use crate::loader::expand_search_paths;
use crate::path::{has_placeholders, resolve_placeholders, PROFILE_PLACEHOLDER};

/// Default label of git-backed repositories.
pub const MAIN_LABEL: &str = "main";
/// Label tried when `main` does not exist.
pub const MASTER_LABEL: &str = "master";

/// Settings of one workspace.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WorkspaceSettings {
    /// Remote URI; may still contain placeholders when used as a template.
    pub uri: String,
    pub default_label: String,
    /// Directories inside the repository to read; may contain placeholders
    /// and glob wildcards. Empty means the repository root.
    pub search_paths: Vec<String>,
    /// Seconds between fetches: 0 fetches on every sync, negative never
    /// fetches after the initial clone.
    pub refresh_rate: i64,
    pub force_pull: bool,
    pub delete_untracked_branches: bool,
    pub try_master_branch: bool,
    pub clone_on_start: bool,
    /// Serve the last synchronized version when a fetch fails.
    pub serve_stale: bool,
    pub remote: RemoteOptions,
}

impl Default for WorkspaceSettings {
    fn default() -> Self {
        Self {
            uri: String::new(),
            default_label: MAIN_LABEL.to_string(),
            search_paths: Vec::new(),
            refresh_rate: 0,
            force_pull: false,
            delete_untracked_branches: false,
            try_master_branch: true,
            clone_on_start: false,
            serve_stale: true,
            remote: RemoteOptions::default(),
        }
    }
}

impl WorkspaceSettings {
    pub fn new(uri: &str) -> Self {
        Self {
            uri: uri.to_string(),
            ..Default::default()
        }
    }

    /// A copy of these settings pointing at a concrete URI.
    pub fn for_uri(&self, uri: &str) -> Self {
        Self {
            uri: uri.to_string(),
            ..self.clone()
        }
    }
}

#[derive(Debug, Default)]
struct SyncState {
    last_refresh: Option<Instant>,
}

/// Owner of one local working copy.
pub struct WorkspaceManager {
    settings: WorkspaceSettings,
    remote: Remote,
    work_dir: PathBuf,
    git: Arc<dyn GitOperations>,
    state: Mutex<SyncState>,
}

impl std::fmt::Debug for WorkspaceManager {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("WorkspaceManager")
            .field("uri", &self.remote.display_uri())
            .field("work_dir", &self.work_dir)
            .finish()
    }
}

impl WorkspaceManager {
    /// Creates a manager that uses the system `git` binary.
    pub fn new(settings: WorkspaceSettings, work_dir: PathBuf) -> Self {
        Self::with_operations(settings, work_dir, Arc::new(GitCli))
    }

    /// Creates a manager with a custom `GitOperations` implementation.
    pub fn with_operations(
        settings: WorkspaceSettings,
        work_dir: PathBuf,
        git: Arc<dyn GitOperations>,
    ) -> Self {
        let remote = Remote::new(&settings.uri, settings.remote.clone());
        Self {
            settings,
            remote,
            work_dir,
            git,
            state: Mutex::new(SyncState::default()),
        }
    }

    pub fn settings(&self) -> &WorkspaceSettings {
        &self.settings
    }

    pub fn uri(&self) -> &str {
        &self.settings.uri
    }

    /// The URI with credentials masked.
    pub fn display_uri(&self) -> String {
        self.remote.display_uri()
    }

    pub fn work_dir(&self) -> &Path {
        &self.work_dir
    }

    pub fn default_label(&self) -> &str {
        &self.settings.default_label
    }

    fn lock(&self) -> Result<MutexGuard<'_, SyncState>> {
        self.state.lock().map_err(|_| Error::LockPoisoned {
            context: format!("workspace {}", self.remote.display_uri()),
        })
    }

    /// Brings the workspace to `label` and returns the checked-out commit id.
    pub fn sync(&self, label: &str) -> Result<String> {
        let mut state = self.lock()?;
        self.sync_locked(&mut state, label).map(|(_, version)| version)
    }

    /// Clones the repository if it is not present yet.
    pub fn warm_up(&self) -> Result<()> {
        let _state = self.lock()?;
        if !self.is_initialized() {
            info!("Cloning {} on start", self.remote.display_uri());
            self.clone_fresh()?;
        }
        Ok(())
    }

    /// Syncs and describes where the files for a request live.
    pub fn locations(
        &self,
        application: &str,
        profile: &str,
        label: Option<&str>,
    ) -> Result<Locations> {
        self.with_locations(application, profile, label, |locations| Ok(locations.clone()))
    }

    /// Syncs, then runs `read` against the workspace while still holding the
    /// workspace lock.
    ///
    /// With `serve_stale` set, a failed fetch is logged and `read` runs
    /// against the last synchronized version.
    pub fn with_locations<T>(
        &self,
        application: &str,
        profile: &str,
        label: Option<&str>,
        read: impl FnOnce(&Locations) -> Result<T>,
    ) -> Result<T> {
        let mut state = self.lock()?;
        let label = label.unwrap_or(&self.settings.default_label).to_string();

        let (label, version) = match self.sync_locked(&mut state, &label) {
            Ok(synced) => synced,
            Err(Error::ScmUpdateFailed {
                label,
                fallback_version,
                message,
                ..
            }) if self.settings.serve_stale => {
                warn!(
                    "Serving {} at last known version {}: {}",
                    self.remote.display_uri(),
                    fallback_version,
                    message
                );
                (label, fallback_version)
            }
            Err(e) => return Err(e),
        };

        let locations = Locations {
            application: application.to_string(),
            profile: profile.to_string(),
            label: Some(label.clone()),
            version: Some(version),
            search_paths: self.search_paths(application, profile, &label),
        };
        read(&locations)
    }

    /// Directories to read for a request, most specific first.
    ///
    /// A template is expanded for every listed application and profile, last
    /// listed first.
    pub fn search_paths(&self, application: &str, profile: &str, label: &str) -> Vec<PathBuf> {
        let mut patterns = Vec::new();
        for template in &self.settings.search_paths {
            for app in split_applications(application).iter().rev() {
                let resolved = resolve_placeholders(template, Some(app), None, Some(label));
                if resolved.contains(PROFILE_PLACEHOLDER) {
                    for p in split_profiles(profile).iter().rev() {
                        patterns.push(resolved.replace(PROFILE_PLACEHOLDER, p));
                    }
                } else {
                    patterns.push(resolved);
                }
            }
        }
        expand_search_paths(&self.work_dir, &patterns)
    }

    /// Runs the sync, falling back from `main` to `master` when configured.
    fn sync_locked(&self, state: &mut SyncState, label: &str) -> Result<(String, String)> {
        match self.refresh(state, label) {
            Err(Error::NoSuchLabel { .. })
                if self.settings.try_master_branch
                    && label == MAIN_LABEL
                    && self.settings.default_label == MAIN_LABEL =>
            {
                info!(
                    "Cannot find {} branch in {}, falling back to {} branch",
                    MAIN_LABEL,
                    self.remote.display_uri(),
                    MASTER_LABEL
                );
                let version = self.refresh(state, MASTER_LABEL)?;
                Ok((MASTER_LABEL.to_string(), version))
            }
            result => result.map(|version| (label.to_string(), version)),
        }
    }

    fn refresh(&self, state: &mut SyncState, label: &str) -> Result<String> {
        if has_placeholders(&self.settings.uri) {
            return Err(Error::NoSuchRepository {
                uri: self.remote.display_uri(),
                message: "URI still contains unresolved placeholders".to_string(),
            });
        }

        let cloned = self.open_or_clone()?;
        if cloned {
            state.last_refresh = Some(Instant::now());
        }

        let mut fetch_error = None;
        if !cloned && self.should_pull(state)? {
            match self.fetch() {
                Ok(()) => state.last_refresh = Some(Instant::now()),
                Err(e) => {
                    warn!(
                        "Could not fetch remote for {} remote: {}: {}",
                        label,
                        self.remote.display_uri(),
                        e
                    );
                    fetch_error = Some(e);
                }
            }
        }

        if let Err(e) = self.checkout(label) {
            return match (e, fetch_error) {
                (Error::NoSuchLabel { .. }, Some(fetch_error)) => Err(Error::NoSuchRepository {
                    uri: self.remote.display_uri(),
                    message: fetch_error.to_string(),
                }),
                (e, _) => Err(e),
            };
        }
        self.try_merge(label)?;
        let version = self.git.head_commit(&self.work_dir)?;

        match fetch_error {
            Some(e) => Err(Error::ScmUpdateFailed {
                uri: self.remote.display_uri(),
                label: label.to_string(),
                fallback_version: version,
                message: e.to_string(),
            }),
            None => Ok(version),
        }
    }

    fn is_initialized(&self) -> bool {
        self.work_dir.join(".git").exists()
    }

    /// Opens the workspace, cloning when needed. Returns whether a clone ran.
    fn open_or_clone(&self) -> Result<bool> {
        if !self.is_initialized() {
            self.clone_fresh()?;
            return Ok(true);
        }

        let lock = self.work_dir.join(".git").join("index.lock");
        if lock.exists() {
            info!("Deleting stale git lock file at {}", lock.display());
            if let Err(e) = fs::remove_file(&lock) {
                warn!("Could not delete {}: {}", lock.display(), e);
            }
        }

        if let Err(e) = self.git.head_commit(&self.work_dir) {
            warn!(
                "Workspace {} is unusable, cloning it again: {}",
                self.work_dir.display(),
                e
            );
            self.clone_fresh()?;
            return Ok(true);
        }
        Ok(false)
    }

    fn clone_fresh(&self) -> Result<()> {
        if self.work_dir.exists() {
            info!("Deleting existing workspace contents at {}", self.work_dir.display());
            fs::remove_dir_all(&self.work_dir)?;
        }
        info!(
            "Cloning {} into {}",
            self.remote.display_uri(),
            self.work_dir.display()
        );
        match self.git.clone_repository(&self.remote, &self.work_dir) {
            Ok(()) => Ok(()),
            Err(e) => {
                if self.work_dir.exists() {
                    if let Err(cleanup) = fs::remove_dir_all(&self.work_dir) {
                        warn!(
                            "Could not remove partial clone at {}: {}",
                            self.work_dir.display(),
                            cleanup
                        );
                    }
                }
                Err(match e {
                    Error::NoSuchRepository { .. } => e,
                    other => Error::NoSuchRepository {
                        uri: self.remote.display_uri(),
                        message: other.to_string(),
                    },
                })
            }
        }
    }

    fn should_pull(&self, state: &SyncState) -> Result<bool> {
        let rate = self.settings.refresh_rate;
        if rate < 0 {
            return Ok(false);
        }
        if rate > 0 {
            if let Some(last) = state.last_refresh {
                if last.elapsed() < Duration::from_secs(rate as u64) {
                    debug!(
                        "Skipping fetch of {}, refreshed {:?} ago",
                        self.remote.display_uri(),
                        last.elapsed()
                    );
                    return Ok(false);
                }
            }
        }

        if self.git.is_clean(&self.work_dir)? {
            return Ok(true);
        }
        if self.settings.force_pull {
            info!(
                "Working tree of {} is dirty, fetching anyway (force-pull)",
                self.work_dir.display()
            );
            Ok(true)
        } else {
            info!(
                "Cannot pull from remote {}, the working tree is not clean.",
                self.remote.display_uri()
            );
            Ok(false)
        }
    }

    fn fetch(&self) -> Result<()> {
        let prune = self.settings.delete_untracked_branches;
        let before = if prune {
            self.git.remote_branches(&self.work_dir)?
        } else {
            Vec::new()
        };

        self.git.fetch(&self.remote, &self.work_dir, prune)?;

        if prune {
            let after = self.git.remote_branches(&self.work_dir)?;
            let deleted: Vec<String> = before.into_iter().filter(|b| !after.contains(b)).collect();
            self.delete_untracked_local_branches(&deleted);
        }
        Ok(())
    }

    fn delete_untracked_local_branches(&self, deleted: &[String]) {
        if deleted.is_empty() {
            return;
        }
        let local = match self.git.local_branches(&self.work_dir) {
            Ok(local) => local,
            Err(e) => {
                warn!("Could not list local branches: {}", e);
                return;
            }
        };

        for branch in deleted.iter().filter(|b| local.contains(b)) {
            if branch == &self.settings.default_label {
                continue;
            }
            let current = self.git.current_branch(&self.work_dir).ok().flatten();
            if current.as_deref() == Some(branch.as_str()) {
                if let Err(e) = self.checkout(&self.settings.default_label) {
                    warn!("Could not leave branch {} before deleting it: {}", branch, e);
                    continue;
                }
            }
            match self.git.delete_branch(&self.work_dir, branch) {
                Ok(()) => info!("Deleted local branch {} removed from origin", branch),
                Err(e) => warn!("Could not delete local branch {}: {}", branch, e),
            }
        }
    }

    fn checkout(&self, label: &str) -> Result<()> {
        let dir = &self.work_dir;
        let local = self.git.ref_exists(dir, &format!("refs/heads/{}", label))?;
        let remote = self.git.ref_exists(dir, &format!("refs/remotes/{}/{}", ORIGIN, label))?;

        let checkout = || -> Result<()> {
            if remote && !local {
                debug!("Creating local branch {} tracking {}/{}", label, ORIGIN, label);
                self.git.checkout_tracking(dir, label)
            } else if local
                || self.git.ref_exists(dir, &format!("refs/tags/{}", label))?
                || self.git.ref_exists(dir, label)?
            {
                self.git.checkout(dir, label)
            } else {
                Err(Error::NoSuchLabel {
                    label: label.to_string(),
                })
            }
        };

        match checkout() {
            Err(Error::GitCommand { stderr, .. }) if !self.git.is_clean(dir)? => {
                warn!(
                    "Checkout of {} blocked by local changes, discarding them: {}",
                    label, stderr
                );
                self.git.reset_hard(dir, "HEAD")?;
                checkout()
            }
            result => result,
        }
    }

    fn try_merge(&self, label: &str) -> Result<()> {
        let dir = &self.work_dir;
        let is_branch = self.git.ref_exists(dir, &format!("refs/remotes/{}/{}", ORIGIN, label))?;
        if !is_branch {
            return Ok(());
        }

        let merged = self.git.merge_fast_forward(dir, label)?;
        let clean = merged
            && self.git.is_clean(dir)?
            && self.git.commits_ahead(dir, label)? == 0;
        if !clean {
            warn!(
                "The local repository is dirty or ahead of origin. Resetting it to {}/{}.",
                ORIGIN, label
            );
            self.git.reset_hard(dir, &format!("{}/{}", ORIGIN, label))?;
        }
        Ok(())
    }
}
