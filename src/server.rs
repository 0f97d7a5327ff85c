//! # Config Server
//!
//! Assembles the configured backends into one repository:
//!
//! ```text
//! DecryptingRepository
//!   └── CompositeEnvironmentRepository (ascending order)
//!         ├── RepositoryRouter (git: default repository + routes)
//!         └── NativeEnvironmentRepository
//! ```
//!
//! Raw resources are looked up in the same backends, in the same order, and
//! decrypted with the same keys.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use log::{debug, info, warn};

use crate::composite::CompositeEnvironmentRepository;
use crate::config::{self, BackendConfig, GitBackendConfig, NativeBackendConfig, ServerConfig};
use crate::crypto::{CipherService, DecryptingRepository, EnvironmentDecryptor, ResourceDecryptor};
use crate::defaults::default_basedir;
use crate::environment::{Environment, EnvironmentRequest};
use crate::error::{Error, Result};
use crate::format::FileFormat;
use crate::git::{GitCli, GitOperations};
use crate::native::NativeEnvironmentRepository;
use crate::path::decode_label;
use crate::registry::WorkspaceRegistry;
use crate::repository::{EnvironmentRepository, Resource, ResourceRepository, DEFAULT_ORDER};
use crate::router::{RepositoryRouter, RouteEntry, RouteTarget};

/// A constructed backend.
#[derive(Debug, Clone)]
pub enum Backend {
    Git(Arc<RepositoryRouter>),
    Native(Arc<NativeEnvironmentRepository>),
}

impl Backend {
    fn order(&self) -> i32 {
        match self {
            Backend::Git(router) => router.order(),
            Backend::Native(native) => native.order(),
        }
    }

    fn describe(&self) -> String {
        match self {
            Backend::Git(router) => router.describe(),
            Backend::Native(native) => native.describe(),
        }
    }

    fn environments(&self) -> Box<dyn EnvironmentRepository> {
        match self {
            Backend::Git(router) => Box::new(router.clone()),
            Backend::Native(native) => Box::new(native.clone()),
        }
    }

    fn find_resource(&self, request: &EnvironmentRequest, path: &str) -> Result<Resource> {
        match self {
            Backend::Git(router) => router.find_resource(request, path),
            Backend::Native(native) => native.find_resource(request, path),
        }
    }
}

pub struct ConfigServer {
    settings: ServerConfig,
    /// Sorted by ascending order.
    backends: Vec<Backend>,
    repository: DecryptingRepository<CompositeEnvironmentRepository>,
    resources: ResourceDecryptor,
    cipher: CipherService,
}

impl std::fmt::Debug for ConfigServer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ConfigServer")
            .field("backends", &self.backends)
            .finish()
    }
}

impl ConfigServer {
    /// Builds the server, keeping git workspaces under `basedir`.
    ///
    /// `basedir` falls back to the configured `basedir` and then to the
    /// platform cache directory. A git backend with its own `basedir` keeps
    /// its workspaces there.
    pub fn new(settings: ServerConfig, basedir: Option<PathBuf>) -> Result<Self> {
        Self::with_operations(settings, basedir, Arc::new(GitCli))
    }

    /// Like [`new`](Self::new) with custom git operations.
    pub fn with_operations(
        settings: ServerConfig,
        basedir: Option<PathBuf>,
        git: Arc<dyn GitOperations>,
    ) -> Result<Self> {
        if settings.backends.is_empty() {
            return Err(Error::InvalidConfig {
                message: "no backends configured under 'server.backends'".to_string(),
            });
        }
        let basedir = basedir
            .or_else(|| settings.basedir.clone())
            .unwrap_or_else(default_basedir);

        let mut backends = Vec::with_capacity(settings.backends.len());
        for backend in &settings.backends {
            let built = match backend {
                BackendConfig::Git(git_config) => {
                    Backend::Git(Arc::new(build_router(git_config, &basedir, git.clone())?))
                }
                BackendConfig::Native(native_config) => {
                    Backend::Native(Arc::new(build_native(native_config)))
                }
            };
            debug!("Configured backend {} (order {})", built.describe(), built.order());
            backends.push(built);
        }
        // stable: equal orders keep file order
        backends.sort_by_key(Backend::order);

        let cipher = CipherService::new(config::locator(settings.encrypt.as_ref())?);
        let composite = CompositeEnvironmentRepository::new(
            backends.iter().map(Backend::environments).collect(),
            settings.fail_on_error,
        );
        let repository =
            DecryptingRepository::new(composite, EnvironmentDecryptor::new(cipher.clone()));

        Ok(Self {
            settings,
            backends,
            repository,
            resources: ResourceDecryptor::new(cipher.clone()),
            cipher,
        })
    }

    pub fn settings(&self) -> &ServerConfig {
        &self.settings
    }

    pub fn backends(&self) -> &[Backend] {
        &self.backends
    }

    pub fn cipher(&self) -> &CipherService {
        &self.cipher
    }

    /// Clones every git workspace configured with `clone_on_start`.
    pub fn warm_up(&self) -> Result<()> {
        for backend in &self.backends {
            if let Backend::Git(router) = backend {
                router.warm_up()?;
            }
        }
        Ok(())
    }

    /// Fills in the default application and profile for blank request parts.
    ///
    /// A label in its URL form (`release(_)2.0`) is decoded to
    /// `release/2.0`.
    pub fn request(&self, application: &str, profile: Option<&str>, label: Option<&str>) -> EnvironmentRequest {
        let application = Some(application)
            .filter(|a| !a.trim().is_empty())
            .unwrap_or(&self.settings.default_application);
        let profile = profile
            .filter(|p| !p.trim().is_empty())
            .unwrap_or(&self.settings.default_profile);
        let label = label.map(decode_label);
        EnvironmentRequest::new(application, profile).with_label(label.as_deref())
    }

    /// Resolves an environment, decrypting `{cipher}` values unless
    /// `decrypt` is false.
    pub fn resolve(&self, request: &EnvironmentRequest, decrypt: bool) -> Result<Environment> {
        info!(
            "Resolving {}/{} label={:?}",
            request.application, request.profile, request.label
        );
        if decrypt {
            self.repository.find_one(request)
        } else {
            self.repository.inner().find_one(request)
        }
    }

    /// Serves one raw file with its `{cipher}` values decrypted.
    ///
    /// Backends are asked in order; the first one holding the file wins.
    pub fn resource(&self, request: &EnvironmentRequest, path: &str) -> Result<Resource> {
        let mut resource = self.find_resource(request, path)?;
        let format = FileFormat::from_path(&resource.path);
        resource.text = self.resources.decrypt(
            &resource.text,
            format,
            &request.application,
            &request.profile,
        )?;
        Ok(resource)
    }

    fn find_resource(&self, request: &EnvironmentRequest, path: &str) -> Result<Resource> {
        for backend in &self.backends {
            match backend.find_resource(request, path) {
                Ok(resource) => return Ok(resource),
                Err(e) if e.is_not_found() => {
                    debug!("{} has no {}: {}", backend.describe(), path, e)
                }
                Err(e) if self.settings.fail_on_error => return Err(e),
                Err(e) => warn!("{} failed to serve {}: {}", backend.describe(), path, e),
            }
        }
        Err(Error::NoSuchResource {
            path: path.to_string(),
        })
    }
}

fn build_router(
    git_config: &GitBackendConfig,
    basedir: &Path,
    git: Arc<dyn GitOperations>,
) -> Result<RepositoryRouter> {
    let registry = Arc::new(WorkspaceRegistry::with_operations(
        git_config.basedir.clone().unwrap_or_else(|| basedir.to_path_buf()),
        git,
    ));

    let default = RouteTarget::new(git_config.workspace_settings(), &registry)?;
    let mut routes = Vec::with_capacity(git_config.repos.len());
    for (name, route) in &git_config.repos {
        let settings = route.workspace_settings(git_config);
        let target = match &route.basedir {
            Some(work_dir) => RouteTarget::with_work_dir(settings, &registry, work_dir.clone())?,
            None => RouteTarget::new(settings, &registry)?,
        };
        routes.push(RouteEntry::new(
            name,
            &route.pattern.to_vec(),
            route.order.unwrap_or(DEFAULT_ORDER),
            target,
        ));
    }

    Ok(RepositoryRouter::new(default, routes, registry)
        .with_order(git_config.order.unwrap_or(DEFAULT_ORDER)))
}

fn build_native(native_config: &NativeBackendConfig) -> NativeEnvironmentRepository {
    NativeEnvironmentRepository::new(native_config.search_locations.clone())
        .with_default_label(native_config.default_label.clone())
        .with_order(native_config.order.unwrap_or(DEFAULT_ORDER))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::EncryptConfig;
    use std::fs;

    fn native(dir: &Path, order: Option<i32>) -> BackendConfig {
        BackendConfig::Native(NativeBackendConfig {
            order,
            search_locations: vec![dir.display().to_string()],
            default_label: None,
        })
    }

    fn encrypt() -> EncryptConfig {
        EncryptConfig {
            key: Some("s3cr3t".into()),
            ..Default::default()
        }
    }

    #[test]
    fn test_no_backends_rejected() {
        let err = ConfigServer::new(ServerConfig::default(), Some(PathBuf::from("/tmp"))).unwrap_err();
        assert!(matches!(err, Error::InvalidConfig { .. }));
    }

    #[test]
    fn test_backends_sorted_by_order() {
        let first = tempfile::tempdir().unwrap();
        let second = tempfile::tempdir().unwrap();
        fs::write(first.path().join("application.yml"), "who: first\n").unwrap();
        fs::write(second.path().join("application.yml"), "who: second\n").unwrap();

        let settings = ServerConfig {
            backends: vec![native(second.path(), Some(5)), native(first.path(), Some(1))],
            ..Default::default()
        };
        let server = ConfigServer::new(settings, None).unwrap();
        let env = server.resolve(&server.request("app", None, None), true).unwrap();

        assert_eq!(env.property_sources.len(), 2);
        assert_eq!(env.get("who").unwrap().as_str(), Some("first"));
    }

    #[test]
    fn test_resolve_decrypts_unless_disabled() {
        let dir = tempfile::tempdir().unwrap();
        let settings = ServerConfig {
            backends: vec![native(dir.path(), None)],
            encrypt: Some(encrypt()),
            ..Default::default()
        };
        let server = ConfigServer::new(settings, None).unwrap();
        let secret = server.cipher().encrypt("hunter2", "app", "default").unwrap();
        fs::write(
            dir.path().join("app.yml"),
            format!("db:\n  password: '{{cipher}}{}'\n", secret),
        )
        .unwrap();

        let request = server.request("app", None, None);
        let env = server.resolve(&request, true).unwrap();
        assert_eq!(env.get("db.password").unwrap().as_str(), Some("hunter2"));

        let raw = server.resolve(&request, false).unwrap();
        assert!(raw
            .get("db.password")
            .unwrap()
            .as_str()
            .unwrap()
            .starts_with("{cipher}"));
    }

    #[test]
    fn test_without_keys_values_are_quarantined() {
        let dir = tempfile::tempdir().unwrap();
        fs::write(dir.path().join("app.properties"), "token={cipher}abcdef\nplain=yes\n").unwrap();
        let settings = ServerConfig {
            backends: vec![native(dir.path(), None)],
            ..Default::default()
        };
        let server = ConfigServer::new(settings, None).unwrap();
        let env = server.resolve(&server.request("app", None, None), true).unwrap();

        assert_eq!(env.get("invalid.token").unwrap().as_str(), Some("<n/a>"));
        assert!(env.get("token").is_none());
        assert_eq!(env.get("plain").unwrap().as_str(), Some("yes"));
    }

    #[test]
    fn test_resource_is_decrypted() {
        let dir = tempfile::tempdir().unwrap();
        let settings = ServerConfig {
            backends: vec![native(dir.path(), None)],
            encrypt: Some(encrypt()),
            ..Default::default()
        };
        let server = ConfigServer::new(settings, None).unwrap();
        let secret = server.cipher().encrypt("hunter2", "app", "default").unwrap();
        fs::write(
            dir.path().join("nginx.properties"),
            format!("# proxy\npass={{cipher}}{}\n", secret),
        )
        .unwrap();

        let resource = server
            .resource(&server.request("app", None, None), "nginx.properties")
            .unwrap();
        assert_eq!(resource.text, "# proxy\npass=hunter2\n");
    }

    #[test]
    fn test_missing_resource() {
        let dir = tempfile::tempdir().unwrap();
        let settings = ServerConfig {
            backends: vec![native(dir.path(), None)],
            ..Default::default()
        };
        let server = ConfigServer::new(settings, None).unwrap();
        let err = server
            .resource(&server.request("app", None, None), "missing.txt")
            .unwrap_err();
        assert!(matches!(err, Error::NoSuchResource { .. }));
    }

    #[test]
    fn test_request_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let settings = ServerConfig {
            default_application: "fallback".into(),
            backends: vec![native(dir.path(), None)],
            ..Default::default()
        };
        let server = ConfigServer::new(settings, None).unwrap();
        let request = server.request("", Some(""), Some("v1"));
        assert_eq!(request.application, "fallback");
        assert_eq!(request.profile, "default");
        assert_eq!(request.label.as_deref(), Some("v1"));

        let request = server.request("app", None, Some("release(_)2.0"));
        assert_eq!(request.label.as_deref(), Some("release/2.0"));
    }

    #[test]
    fn test_git_backend_uses_configured_basedir() {
        let basedir = tempfile::tempdir().unwrap();
        let settings = ServerConfig {
            backends: vec![BackendConfig::Git(GitBackendConfig::new("https://example.com/repo.git"))],
            ..Default::default()
        };
        let server = ConfigServer::new(settings, Some(basedir.path().to_path_buf())).unwrap();
        match &server.backends()[0] {
            Backend::Git(router) => assert_eq!(router.registry().base_dir(), basedir.path()),
            other => panic!("Expected git backend, got {:?}", other),
        }
    }
}
