//! Process-wide registry of workspace managers
//!
//! Placeholder URIs resolve to a different remote per application, profile
//! or label. Every distinct resolved URI gets exactly one
//! [`WorkspaceManager`] and one working directory, created lazily on first
//! use and kept for the life of the process.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};

use log::{debug, warn};

use crate::error::{Error, Result};
use crate::git::{GitCli, GitOperations};
use crate::path::workspace_dir_name;
use crate::workspace::{WorkspaceManager, WorkspaceSettings};

/// Managers keyed by resolved URI
pub struct WorkspaceRegistry {
    base_dir: PathBuf,
    git: Arc<dyn GitOperations>,
    managers: Mutex<HashMap<String, Arc<WorkspaceManager>>>,
}

impl std::fmt::Debug for WorkspaceRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("WorkspaceRegistry")
            .field("base_dir", &self.base_dir)
            .field("len", &self.len())
            .finish()
    }
}

impl WorkspaceRegistry {
    /// Create a registry whose workspaces live under `base_dir`
    pub fn new(base_dir: impl Into<PathBuf>) -> Self {
        Self::with_operations(base_dir, Arc::new(GitCli))
    }

    pub fn with_operations(base_dir: impl Into<PathBuf>, git: Arc<dyn GitOperations>) -> Self {
        Self {
            base_dir: base_dir.into(),
            git,
            managers: Mutex::new(HashMap::new()),
        }
    }

    pub fn base_dir(&self) -> &Path {
        &self.base_dir
    }

    /// Get the manager for `settings.uri`, or create and register one.
    ///
    /// The first caller's settings win; later callers with the same URI share
    /// that manager.
    pub fn get_or_create(&self, settings: &WorkspaceSettings) -> Result<Arc<WorkspaceManager>> {
        self.get_or_create_in(settings, None)
    }

    /// Like [`get_or_create`](Self::get_or_create) but with an explicit
    /// working directory for a newly created manager.
    ///
    /// Managers are keyed by URI alone. When two routes resolve to the same
    /// URI with different search paths or sync options, the manager keeps the
    /// settings it was registered with and a warning is logged; configure
    /// such routes identically.
    pub fn get_or_create_in(
        &self,
        settings: &WorkspaceSettings,
        work_dir: Option<PathBuf>,
    ) -> Result<Arc<WorkspaceManager>> {
        let mut managers = self.managers.lock().map_err(|_| Error::LockPoisoned {
            context: "workspace registry".to_string(),
        })?;

        if let Some(existing) = managers.get(&settings.uri) {
            if existing.settings() != settings {
                warn!(
                    "Workspace for {} is shared with settings from its first registration",
                    existing.display_uri()
                );
            }
            return Ok(existing.clone());
        }

        let work_dir =
            work_dir.unwrap_or_else(|| self.base_dir.join(workspace_dir_name(&settings.uri)));
        debug!("Registering workspace {} for {}", work_dir.display(), settings.uri);
        let manager = Arc::new(WorkspaceManager::with_operations(
            settings.clone(),
            work_dir,
            self.git.clone(),
        ));
        managers.insert(settings.uri.clone(), manager.clone());
        Ok(manager)
    }

    /// Number of registered managers
    pub fn len(&self) -> usize {
        self.managers.lock().map(|m| m.len()).unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
