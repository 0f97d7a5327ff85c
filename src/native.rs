//! Environment repository backed by plain directories
//!
//! Search locations are directory paths that may contain `{application}`,
//! `{profile}` and `{label}` placeholders. A location using `{label}` is
//! skipped for requests without a label (and without a default label). A
//! request for several applications expands `{application}` once per
//! application, last listed first.
//! Property sources are named `file:<absolute path>`.

use std::fs;
use std::path::{Path, PathBuf};

use log::debug;

use crate::environment::{split_profiles, Environment, EnvironmentRequest, Locations};
use crate::error::{Error, Result};
use crate::loader;
use crate::path::{resolve_placeholders, LABEL_PLACEHOLDER, PROFILE_PLACEHOLDER};
use crate::repository::{EnvironmentRepository, Resource, ResourceRepository, DEFAULT_ORDER};

#[derive(Debug, Clone)]
pub struct NativeEnvironmentRepository {
    search_locations: Vec<String>,
    default_label: Option<String>,
    order: i32,
}

impl NativeEnvironmentRepository {
    pub fn new(search_locations: Vec<String>) -> Self {
        Self {
            search_locations,
            default_label: None,
            order: DEFAULT_ORDER,
        }
    }

    pub fn with_default_label(mut self, label: Option<String>) -> Self {
        self.default_label = label;
        self
    }

    pub fn with_order(mut self, order: i32) -> Self {
        self.order = order;
        self
    }

    fn label_for<'a>(&'a self, request: &'a EnvironmentRequest) -> Option<&'a str> {
        request.label.as_deref().or(self.default_label.as_deref())
    }

    /// Concrete directories for a request, most specific first.
    fn locations(&self, request: &EnvironmentRequest) -> Locations {
        let label = self.label_for(request);
        let mut search_paths = Vec::new();
        for template in &self.search_locations {
            if template.contains(LABEL_PLACEHOLDER) && label.is_none() {
                debug!("Skipping location {} for a request without label", template);
                continue;
            }
            let mut expanded: Vec<String> = Vec::new();
            for application in request.applications().iter().rev() {
                let resolved = resolve_placeholders(template, Some(application), None, label);
                if resolved.contains(PROFILE_PLACEHOLDER) {
                    for profile in split_profiles(&request.profile).iter().rev() {
                        expanded.push(resolved.replace(PROFILE_PLACEHOLDER, profile));
                    }
                } else {
                    expanded.push(resolved);
                }
            }
            for location in expanded {
                let dir = absolutize(strip_file_scheme(&location));
                if !search_paths.contains(&dir) {
                    search_paths.push(dir);
                }
            }
        }

        Locations {
            application: request.application.clone(),
            profile: request.profile.clone(),
            label: label.map(str::to_string),
            version: None,
            search_paths,
        }
    }
}

fn strip_file_scheme(location: &str) -> &str {
    location
        .strip_prefix("file://")
        .or_else(|| location.strip_prefix("file:"))
        .unwrap_or(location)
}

fn absolutize(location: &str) -> PathBuf {
    let path = Path::new(location);
    fs::canonicalize(path).unwrap_or_else(|_| match std::env::current_dir() {
        Ok(cwd) if path.is_relative() => cwd.join(path),
        _ => path.to_path_buf(),
    })
}

impl EnvironmentRepository for NativeEnvironmentRepository {
    fn find_one(&self, request: &EnvironmentRequest) -> Result<Environment> {
        let locations = self.locations(request);
        let mut environment = loader::load_environment(request, &locations, Path::new("/"), "file:")?;
        environment.label = locations.label;
        Ok(environment)
    }

    fn order(&self) -> i32 {
        self.order
    }

    fn describe(&self) -> String {
        format!("native [{}]", self.search_locations.join(", "))
    }
}

impl ResourceRepository for NativeEnvironmentRepository {
    fn find_resource(&self, request: &EnvironmentRequest, path: &str) -> Result<Resource> {
        let locations = self.locations(request);
        let file = loader::find_resource(&locations.search_paths, &request.profiles(), path)
            .ok_or_else(|| Error::NoSuchResource {
                path: path.to_string(),
            })?;
        let name = locations
            .search_paths
            .iter()
            .find_map(|dir| file.strip_prefix(dir).ok())
            .map(|relative| relative.to_string_lossy().replace('\\', "/"))
            .unwrap_or_else(|| path.to_string());
        Ok(Resource {
            name,
            text: fs::read_to_string(&file)?,
            path: file,
            label: locations.label,
            version: None,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn setup() -> TempDir {
        let dir = TempDir::new().unwrap();
        let root = dir.path();
        fs::create_dir_all(root.join("shared")).unwrap();
        fs::create_dir_all(root.join("apps/billing")).unwrap();
        fs::create_dir_all(root.join("v2")).unwrap();
        fs::write(root.join("shared/application.yml"), "region: eu\ntimeout: 5\n").unwrap();
        fs::write(root.join("apps/billing/billing.yml"), "timeout: 30\n").unwrap();
        fs::write(root.join("v2/billing.properties"), "timeout=60\n").unwrap();
        fs::write(root.join("shared/banner.txt"), "hello\n").unwrap();
        dir
    }

    #[test]
    fn test_find_one_across_locations() {
        let dir = setup();
        let root = dir.path().to_string_lossy().to_string();
        let repo = NativeEnvironmentRepository::new(vec![
            format!("{}/shared", root),
            format!("file:{}/apps/{{application}}", root),
        ]);

        let env = repo.find_one(&EnvironmentRequest::new("billing", "default")).unwrap();
        assert_eq!(env.get("timeout").unwrap().value(), &serde_json::json!(30));
        assert_eq!(env.get("region").unwrap().as_str(), Some("eu"));
        assert!(env.property_sources[0].name.starts_with("file:/"));
        assert!(env.property_sources[0].name.ends_with("apps/billing/billing.yml"));
        assert_eq!(env.version, None);
    }

    #[test]
    fn test_find_one_for_several_applications() {
        let dir = setup();
        let root = dir.path().to_string_lossy().to_string();
        fs::write(dir.path().join("shared/orders.yml"), "timeout: 10\nowner: orders\n").unwrap();
        let repo = NativeEnvironmentRepository::new(vec![
            format!("{}/shared", root),
            format!("{}/apps/{{application}}", root),
        ]);

        let env = repo
            .find_one(&EnvironmentRequest::new("orders,billing", "default"))
            .unwrap();
        assert!(env.property_sources[0].name.ends_with("apps/billing/billing.yml"));
        assert!(env.property_sources[1].name.ends_with("shared/orders.yml"));
        assert_eq!(env.get("timeout").unwrap().value(), &serde_json::json!(30));
        assert_eq!(env.get("owner").unwrap().as_str(), Some("orders"));
        assert_eq!(env.get("region").unwrap().as_str(), Some("eu"));
    }

    #[test]
    fn test_label_location_needs_label() {
        let dir = setup();
        let root = dir.path().to_string_lossy().to_string();
        let repo = NativeEnvironmentRepository::new(vec![format!("{}/{{label}}", root)]);

        let env = repo.find_one(&EnvironmentRequest::new("billing", "default")).unwrap();
        assert!(env.property_sources.is_empty());

        let request = EnvironmentRequest::new("billing", "default").with_label(Some("v2"));
        let env = repo.find_one(&request).unwrap();
        assert_eq!(env.get("timeout").unwrap().as_str(), Some("60"));
        assert_eq!(env.label.as_deref(), Some("v2"));

        let repo = repo.with_default_label(Some("v2".into()));
        let env = repo.find_one(&EnvironmentRequest::new("billing", "default")).unwrap();
        assert_eq!(env.label.as_deref(), Some("v2"));
    }

    #[test]
    fn test_find_resource() {
        let dir = setup();
        let root = dir.path().to_string_lossy().to_string();
        let repo = NativeEnvironmentRepository::new(vec![format!("{}/shared", root)]);

        let request = EnvironmentRequest::new("billing", "default");
        let resource = repo.find_resource(&request, "banner.txt").unwrap();
        assert_eq!(resource.name, "banner.txt");
        assert_eq!(resource.text, "hello\n");
        assert!(repo.find_resource(&request, "nope.txt").unwrap_err().is_not_found());
    }
}
