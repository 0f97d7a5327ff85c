//! # Environment Repositories
//!
//! An environment repository turns an [`EnvironmentRequest`] into an
//! [`Environment`]. The server composes several of them:
//!
//! - **`GitEnvironmentRepository`** (this module): reads one synchronized git
//!   workspace.
//! - **`NativeEnvironmentRepository`** ([`crate::native`]): reads plain
//!   directories.
//! - **`RepositoryRouter`** ([`crate::router`]): picks a git workspace per
//!   request from pattern routes.
//! - **`CompositeEnvironmentRepository`** ([`crate::composite`]): merges an
//!   ordered list of the above.
//! - **`DecryptingRepository`** ([`crate::crypto`]): decrypts `{cipher}`
//!   values of whatever it wraps.
//!
//! All of them implement the [`EnvironmentRepository`] trait, so they nest
//! freely and tests can substitute mocks.

use std::fs;
use std::path::PathBuf;
use std::sync::Arc;

use crate::environment::{Environment, EnvironmentRequest};
use crate::error::{Error, Result};
use crate::loader;
use crate::workspace::WorkspaceManager;

/// Order of repositories that do not set one; they sort last.
pub const DEFAULT_ORDER: i32 = i32::MAX;

/// Source of environments - allows mocking in tests
pub trait EnvironmentRepository: Send + Sync {
    /// Resolves the property sources for one request.
    ///
    /// A missing label is reported as an error for which
    /// [`Error::is_not_found`] holds, so callers can tell "no data" from "the
    /// store is broken".
    fn find_one(&self, request: &EnvironmentRequest) -> Result<Environment>;

    /// Position in a composite; lower values come first.
    fn order(&self) -> i32 {
        DEFAULT_ORDER
    }

    /// Short description for logs and errors.
    fn describe(&self) -> String;
}

impl<R: EnvironmentRepository + ?Sized> EnvironmentRepository for Arc<R> {
    fn find_one(&self, request: &EnvironmentRequest) -> Result<Environment> {
        (**self).find_one(request)
    }

    fn order(&self) -> i32 {
        (**self).order()
    }

    fn describe(&self) -> String {
        (**self).describe()
    }
}

impl<R: EnvironmentRepository + ?Sized> EnvironmentRepository for Box<R> {
    fn find_one(&self, request: &EnvironmentRequest) -> Result<Environment> {
        (**self).find_one(request)
    }

    fn order(&self) -> i32 {
        (**self).order()
    }

    fn describe(&self) -> String {
        (**self).describe()
    }
}

/// A plain (non-property) file served from a repository.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Resource {
    /// Path relative to the repository root.
    pub name: String,
    pub path: PathBuf,
    pub text: String,
    pub label: Option<String>,
    pub version: Option<String>,
}

/// Source of plain resource files
pub trait ResourceRepository: Send + Sync {
    /// Finds `path` for a request; a profile-specific variant
    /// (`name-<profile>.ext`) wins over the plain file.
    fn find_resource(&self, request: &EnvironmentRequest, path: &str) -> Result<Resource>;
}

/// Environment repository reading one git workspace.
#[derive(Debug, Clone)]
pub struct GitEnvironmentRepository {
    manager: Arc<WorkspaceManager>,
    order: i32,
}

impl GitEnvironmentRepository {
    pub fn new(manager: Arc<WorkspaceManager>) -> Self {
        Self {
            manager,
            order: DEFAULT_ORDER,
        }
    }

    pub fn with_order(mut self, order: i32) -> Self {
        self.order = order;
        self
    }

    pub fn manager(&self) -> &Arc<WorkspaceManager> {
        &self.manager
    }
}

impl EnvironmentRepository for GitEnvironmentRepository {
    fn find_one(&self, request: &EnvironmentRequest) -> Result<Environment> {
        let manager = &self.manager;
        let name_prefix = manager.display_uri();
        manager.with_locations(
            &request.application,
            &request.profile,
            request.label.as_deref(),
            |locations| loader::load_environment(request, locations, manager.work_dir(), &name_prefix),
        )
    }

    fn order(&self) -> i32 {
        self.order
    }

    fn describe(&self) -> String {
        format!("git {}", self.manager.display_uri())
    }
}

impl ResourceRepository for GitEnvironmentRepository {
    fn find_resource(&self, request: &EnvironmentRequest, path: &str) -> Result<Resource> {
        let manager = &self.manager;
        manager.with_locations(
            &request.application,
            &request.profile,
            request.label.as_deref(),
            |locations| {
                let file = loader::find_resource(&locations.search_paths, &request.profiles(), path)
                    .ok_or_else(|| Error::NoSuchResource {
                        path: path.to_string(),
                    })?;
                let name = file
                    .strip_prefix(manager.work_dir())
                    .unwrap_or(&file)
                    .to_string_lossy()
                    .replace('\\', "/");
                Ok(Resource {
                    name,
                    text: fs::read_to_string(&file)?,
                    path: file,
                    label: locations.label.clone(),
                    version: locations.version.clone(),
                })
            },
        )
    }
}
