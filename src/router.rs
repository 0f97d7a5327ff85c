//! # Pattern Routing Across Git Repositories
//!
//! A git backend has one default repository plus any number of named routes.
//! Each route lists glob patterns matched against `application/profile` and a
//! URI template that may contain `{application}`, `{profile}` and `{label}`.
//!
//! ## Selection
//!
//! For a request, routes are visited in ascending `order`. A route matches
//! when any of its patterns matches `application/profile` for any requested
//! application and profile; both lists are tried last-listed first. A pattern
//! without `/` matches as if it were also written `pattern/*`.
//!
//! For a matching route every application and profile (again last first)
//! yields a candidate workspace: the URI template resolved for that pair. Candidates are
//! tried in turn. A candidate that fails is logged and skipped, because a
//! template like `.../{profile}.git` legitimately resolves to repositories
//! that do not exist. When no route produces an environment, the default
//! repository serves the request and its errors are returned as they are.
//!
//! ## Workspaces
//!
//! A template without placeholders is resolved once and its workspace is
//! built up front. Templated routes go through the shared
//! [`WorkspaceRegistry`], so each resolved URI gets exactly one workspace no
//! matter how many requests or routes lead to it.

use std::sync::Arc;

use log::{debug, warn};
use rayon::prelude::*;

use crate::environment::{Environment, EnvironmentRequest};
use crate::error::Result;
use crate::path::{glob_match, has_placeholders, resolve_placeholders};
use crate::registry::WorkspaceRegistry;
use crate::repository::{
    EnvironmentRepository, GitEnvironmentRepository, Resource, ResourceRepository, DEFAULT_ORDER,
};
use crate::workspace::{WorkspaceManager, WorkspaceSettings};

/// Where a route (or the default repository) leads.
#[derive(Debug, Clone)]
pub struct RouteTarget {
    /// Settings whose `uri` is the template.
    pub settings: WorkspaceSettings,
    /// Pre-built workspace for templates without placeholders.
    fixed: Option<Arc<WorkspaceManager>>,
}

impl RouteTarget {
    /// Builds a target, creating its workspace right away when the URI has no
    /// placeholders.
    pub fn new(settings: WorkspaceSettings, registry: &WorkspaceRegistry) -> Result<Self> {
        Self::build(settings, registry, None)
    }

    /// Like [`new`](Self::new), with an explicit working directory for a
    /// template without placeholders.
    pub fn with_work_dir(
        settings: WorkspaceSettings,
        registry: &WorkspaceRegistry,
        work_dir: std::path::PathBuf,
    ) -> Result<Self> {
        Self::build(settings, registry, Some(work_dir))
    }

    fn build(
        settings: WorkspaceSettings,
        registry: &WorkspaceRegistry,
        work_dir: Option<std::path::PathBuf>,
    ) -> Result<Self> {
        let fixed = if has_placeholders(&settings.uri) {
            None
        } else {
            Some(registry.get_or_create_in(&settings, work_dir)?)
        };
        Ok(Self { settings, fixed })
    }

    /// The workspace for one request.
    ///
    /// `{label}` resolves to the request label, or to the default label when
    /// the request has none.
    pub fn resolve(
        &self,
        registry: &WorkspaceRegistry,
        application: &str,
        profile: &str,
        label: Option<&str>,
    ) -> Result<Arc<WorkspaceManager>> {
        if let Some(fixed) = &self.fixed {
            return Ok(fixed.clone());
        }
        let label = label.unwrap_or(&self.settings.default_label);
        let uri = resolve_placeholders(&self.settings.uri, Some(application), Some(profile), Some(label));
        registry.get_or_create(&self.settings.for_uri(&uri))
    }

    pub fn fixed(&self) -> Option<&Arc<WorkspaceManager>> {
        self.fixed.as_ref()
    }
}

/// One named route.
#[derive(Debug, Clone)]
pub struct RouteEntry {
    pub name: String,
    /// Patterns after expansion (`app` also yields `app/*`).
    patterns: Vec<String>,
    pub order: i32,
    pub target: RouteTarget,
}

impl RouteEntry {
    /// Creates a route; an empty pattern list routes on the name alone.
    pub fn new(name: &str, patterns: &[String], order: i32, target: RouteTarget) -> Self {
        let source: Vec<String> = if patterns.is_empty() {
            vec![name.to_string()]
        } else {
            patterns.to_vec()
        };
        let mut expanded = Vec::new();
        for pattern in source.iter().map(|p| p.trim()).filter(|p| !p.is_empty()) {
            expanded.push(pattern.to_string());
            if !pattern.contains('/') {
                expanded.push(format!("{}/*", pattern));
            }
        }
        Self {
            name: name.to_string(),
            patterns: expanded,
            order,
            target,
        }
    }

    pub fn patterns(&self) -> &[String] {
        &self.patterns
    }

    /// Whether any pattern matches `application/profile` for any
    /// application and profile.
    pub fn matches(&self, applications: &[String], profiles: &[String]) -> bool {
        applications.iter().rev().any(|application| {
            profiles.iter().rev().any(|profile| {
                let subject = format!("{}/{}", application, profile);
                self.patterns.iter().any(|pattern| match glob_match(pattern, &subject) {
                    Ok(matched) => matched,
                    Err(e) => {
                        warn!("Ignoring invalid pattern {} of route {}: {}", pattern, self.name, e);
                        false
                    }
                })
            })
        })
    }
}

/// Candidate workspaces for one request, in the order they are tried.
#[derive(Debug)]
pub struct Route {
    /// Workspaces of matching routes; failures fall through to the next.
    pub candidates: Vec<(String, Arc<WorkspaceManager>)>,
    /// The default repository; its result is final.
    pub fallback: Arc<WorkspaceManager>,
}

/// Git backend that dispatches each request to a workspace.
#[derive(Debug)]
pub struct RepositoryRouter {
    default: RouteTarget,
    routes: Vec<RouteEntry>,
    registry: Arc<WorkspaceRegistry>,
    order: i32,
}

impl RepositoryRouter {
    pub fn new(default: RouteTarget, mut routes: Vec<RouteEntry>, registry: Arc<WorkspaceRegistry>) -> Self {
        routes.sort_by_key(|route| route.order);
        Self {
            default,
            routes,
            registry,
            order: DEFAULT_ORDER,
        }
    }

    pub fn with_order(mut self, order: i32) -> Self {
        self.order = order;
        self
    }

    pub fn routes(&self) -> &[RouteEntry] {
        &self.routes
    }

    pub fn registry(&self) -> &Arc<WorkspaceRegistry> {
        &self.registry
    }

    /// Selects the candidate workspaces for a request without touching git.
    pub fn route(&self, request: &EnvironmentRequest) -> Result<Route> {
        let applications = request.applications();
        let profiles = request.profiles();
        let mut candidates: Vec<(String, Arc<WorkspaceManager>)> = Vec::new();

        for route in self.routes.iter().filter(|r| r.matches(&applications, &profiles)) {
            debug!("Route {} matches {}/{}", route.name, request.application, request.profile);
            for application in applications.iter().rev() {
                for profile in profiles.iter().rev() {
                    let manager = match route.target.resolve(
                        &self.registry,
                        application,
                        profile,
                        request.label.as_deref(),
                    ) {
                        Ok(manager) => manager,
                        Err(e) => {
                            warn!("Cannot build workspace for route {}: {}", route.name, e);
                            continue;
                        }
                    };
                    if !candidates.iter().any(|(_, m)| Arc::ptr_eq(m, &manager)) {
                        candidates.push((route.name.clone(), manager));
                    }
                }
            }
        }

        // a templated default repository follows the highest-precedence application
        let primary = applications.last().map(String::as_str).unwrap_or(&request.application);
        let fallback = self.default.resolve(
            &self.registry,
            primary,
            &request.profile,
            request.label.as_deref(),
        )?;
        Ok(Route {
            candidates,
            fallback,
        })
    }

    /// Clones every workspace configured with `clone_on_start`, in parallel.
    ///
    /// Only workspaces with fixed URIs can be cloned ahead of time.
    pub fn warm_up(&self) -> Result<()> {
        let managers: Vec<Arc<WorkspaceManager>> = std::iter::once(&self.default)
            .chain(self.routes.iter().map(|route| &route.target))
            .filter(|target| target.settings.clone_on_start)
            .filter_map(|target| target.fixed().cloned())
            .collect();

        managers
            .par_iter()
            .map(|manager| manager.warm_up())
            .collect::<Result<Vec<()>>>()?;
        Ok(())
    }

    /// The request a candidate sees: the label defaults to the candidate's own
    /// default label.
    fn request_for(request: &EnvironmentRequest, manager: &WorkspaceManager) -> EnvironmentRequest {
        match &request.label {
            Some(_) => request.clone(),
            None => request.relabel(manager.default_label()),
        }
    }

    fn try_candidates<T>(
        &self,
        request: &EnvironmentRequest,
        lookup: impl Fn(&GitEnvironmentRepository, &EnvironmentRequest) -> Result<T>,
    ) -> Result<T> {
        let route = self.route(request)?;
        for (name, manager) in route.candidates {
            let repository = GitEnvironmentRepository::new(manager.clone());
            match lookup(&repository, &Self::request_for(request, &manager)) {
                Ok(found) => return Ok(found),
                Err(e) if e.is_not_found() => {
                    debug!("Route {} has no data for {}: {}", name, request.application, e)
                }
                Err(e) => warn!(
                    "Route {} ({}) failed for {}, trying next: {}",
                    name,
                    manager.display_uri(),
                    request.application,
                    e
                ),
            }
        }

        let fallback = route.fallback;
        let repository = GitEnvironmentRepository::new(fallback.clone());
        lookup(&repository, &Self::request_for(request, &fallback))
    }
}

impl EnvironmentRepository for RepositoryRouter {
    fn find_one(&self, request: &EnvironmentRequest) -> Result<Environment> {
        self.try_candidates(request, |repository, request| repository.find_one(request))
    }

    fn order(&self) -> i32 {
        self.order
    }

    fn describe(&self) -> String {
        format!("git {}", self.default.settings.uri)
    }
}

impl ResourceRepository for RepositoryRouter {
    fn find_resource(&self, request: &EnvironmentRequest, path: &str) -> Result<Resource> {
        self.try_candidates(request, |repository, request| {
            repository.find_resource(request, path)
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn registry() -> Arc<WorkspaceRegistry> {
        Arc::new(WorkspaceRegistry::new("/tmp/config-hub-router-test"))
    }

    fn target(uri: &str, registry: &WorkspaceRegistry) -> RouteTarget {
        RouteTarget::new(WorkspaceSettings::new(uri), registry).unwrap()
    }

    fn route(name: &str, patterns: &[&str], order: i32, uri: &str, registry: &WorkspaceRegistry) -> RouteEntry {
        let patterns: Vec<String> = patterns.iter().map(|s| s.to_string()).collect();
        RouteEntry::new(name, &patterns, order, target(uri, registry))
    }

    fn profiles(names: &[&str]) -> Vec<String> {
        names.iter().map(|s| s.to_string()).collect()
    }

    fn apps(names: &[&str]) -> Vec<String> {
        profiles(names)
    }

    #[test]
    fn test_pattern_without_slash_matches_any_profile() {
        let registry = registry();
        let entry = route("billing", &["billing*"], 0, "https://git.example.com/b.git", &registry);
        assert_eq!(entry.patterns(), &["billing*", "billing*/*"]);
        assert!(entry.matches(&apps(&["billing-api"]), &profiles(&["dev"])));
        assert!(!entry.matches(&apps(&["orders"]), &profiles(&["dev"])));
    }

    #[test]
    fn test_profile_pattern() {
        let registry = registry();
        let entry = route("staging", &["*/staging"], 0, "https://git.example.com/s.git", &registry);
        assert!(entry.matches(&apps(&["orders"]), &profiles(&["dev", "staging"])));
        assert!(!entry.matches(&apps(&["orders"]), &profiles(&["dev"])));
    }

    #[test]
    fn test_empty_patterns_use_name() {
        let registry = registry();
        let entry = RouteEntry::new("inventory", &[], 0, target("https://git.example.com/i.git", &registry));
        assert!(entry.matches(&apps(&["inventory"]), &profiles(&["default"])));
    }

    #[test]
    fn test_any_listed_application_can_match() {
        let registry = registry();
        let entry = route("bar", &["bar"], 0, "https://git.example.com/bar.git", &registry);
        assert!(entry.matches(&apps(&["foo", "bar"]), &profiles(&["dev"])));
        assert!(!entry.matches(&apps(&["foo", "baz"]), &profiles(&["dev"])));
    }

    #[test]
    fn test_several_applications_yield_candidates_last_first() {
        let registry = registry();
        let router = RepositoryRouter::new(
            target("https://git.example.com/{application}-default.git", &registry),
            vec![
                route("bar", &["bar"], 0, "https://git.example.com/bar.git", &registry),
                route("apps", &["*"], 1, "https://git.example.com/{application}.git", &registry),
            ],
            registry.clone(),
        );

        let route = router.route(&EnvironmentRequest::new("foo,bar", "dev")).unwrap();
        let uris: Vec<&str> = route.candidates.iter().map(|(_, m)| m.uri()).collect();
        assert_eq!(
            uris,
            vec![
                "https://git.example.com/bar.git",
                "https://git.example.com/foo.git"
            ]
        );
        assert_eq!(route.fallback.uri(), "https://git.example.com/bar-default.git");
    }

    #[test]
    fn test_unmatched_request_uses_default() {
        let registry = registry();
        let router = RepositoryRouter::new(
            target("https://git.example.com/default.git", &registry),
            vec![route("a", &["a*"], 0, "https://git.example.com/a.git", &registry)],
            registry.clone(),
        );

        let route = router.route(&EnvironmentRequest::new("orders", "default")).unwrap();
        assert!(route.candidates.is_empty());
        assert_eq!(route.fallback.uri(), "https://git.example.com/default.git");
    }

    #[test]
    fn test_routes_sorted_by_order() {
        let registry = registry();
        let router = RepositoryRouter::new(
            target("https://git.example.com/default.git", &registry),
            vec![
                route("late", &["app*"], 10, "https://git.example.com/late.git", &registry),
                route("early", &["app*"], 1, "https://git.example.com/early.git", &registry),
            ],
            registry.clone(),
        );

        let route = router.route(&EnvironmentRequest::new("app", "default")).unwrap();
        let names: Vec<&str> = route.candidates.iter().map(|(n, _)| n.as_str()).collect();
        assert_eq!(names, vec!["early", "late"]);
    }

    #[test]
    fn test_application_placeholder_gets_one_workspace_per_application() {
        let registry = registry();
        let router = RepositoryRouter::new(
            target("https://git.example.com/{application}.git", &registry),
            vec![],
            registry.clone(),
        );

        let app1 = router.route(&EnvironmentRequest::new("app1", "default")).unwrap();
        let app2 = router.route(&EnvironmentRequest::new("app2", "default")).unwrap();
        let again = router.route(&EnvironmentRequest::new("app1", "dev")).unwrap();

        assert_eq!(app1.fallback.uri(), "https://git.example.com/app1.git");
        assert_eq!(app2.fallback.uri(), "https://git.example.com/app2.git");
        assert_ne!(app1.fallback.work_dir(), app2.fallback.work_dir());
        assert!(Arc::ptr_eq(&app1.fallback, &again.fallback));
    }

    #[test]
    fn test_profile_placeholder_yields_candidate_per_profile() {
        let registry = registry();
        let router = RepositoryRouter::new(
            target("https://git.example.com/default.git", &registry),
            vec![route("env", &["*"], 0, "https://git.example.com/{profile}.git", &registry)],
            registry.clone(),
        );

        let route = router.route(&EnvironmentRequest::new("orders", "dev,prod")).unwrap();
        let uris: Vec<&str> = route.candidates.iter().map(|(_, m)| m.uri()).collect();
        assert_eq!(
            uris,
            vec!["https://git.example.com/prod.git", "https://git.example.com/dev.git"]
        );
    }

    #[test]
    fn test_label_placeholder_defaults_to_default_label() {
        let registry = registry();
        let router = RepositoryRouter::new(
            target("https://git.example.com/config-{label}.git", &registry),
            vec![],
            registry.clone(),
        );

        let route = router.route(&EnvironmentRequest::new("orders", "default")).unwrap();
        assert_eq!(route.fallback.uri(), "https://git.example.com/config-main.git");

        let request = EnvironmentRequest::new("orders", "default").with_label(Some("v2"));
        let route = router.route(&request).unwrap();
        assert_eq!(route.fallback.uri(), "https://git.example.com/config-v2.git");
    }

    #[test]
    fn test_fixed_uri_shares_prebuilt_workspace() {
        let registry = registry();
        let router = RepositoryRouter::new(
            target("https://git.example.com/default.git", &registry),
            vec![route("a", &["a*"], 0, "https://git.example.com/a.git", &registry)],
            registry.clone(),
        );
        assert_eq!(registry.len(), 2);

        let first = router.route(&EnvironmentRequest::new("a1", "default")).unwrap();
        let second = router.route(&EnvironmentRequest::new("a2", "dev")).unwrap();
        assert!(Arc::ptr_eq(&first.candidates[0].1, &second.candidates[0].1));
        assert_eq!(registry.len(), 2);
    }
}
