//! Loading property sources from a set of search locations
//!
//! Both file-backed repositories (git workspaces and plain directories) end up
//! here once they know which directories to read. For each location the
//! candidate file names are, highest precedence first:
//!
//! 1. for each requested profile, last to first: `{application}-{profile}`
//!    for each requested application (last to first), then
//!    `application-{profile}`
//! 2. each `{application}` (last to first), then `application`
//!
//! Each name is probed with the extensions in [`EXTENSIONS`] order. Names take
//! precedence over locations: every location is searched for the first name
//! before any location is searched for the second. Within a multi-document
//! file later documents override earlier ones, so they are emitted first.

use std::fs;
use std::path::{Path, PathBuf};

use log::debug;

use crate::environment::{
    Environment, EnvironmentRequest, Locations, PropertySource, DEFAULT_APPLICATION,
};
use crate::error::Result;
use crate::format::{self, FileFormat, EXTENSIONS};

/// Candidate base file names for a request, highest precedence first.
pub fn candidate_names(applications: &[String], profiles: &[String]) -> Vec<String> {
    let mut names = Vec::new();
    let mut push = |name: String| {
        if !names.contains(&name) {
            names.push(name);
        }
    };
    for profile in profiles.iter().rev() {
        for application in applications.iter().rev() {
            push(format!("{}-{}", application, profile));
        }
        push(format!("{}-{}", DEFAULT_APPLICATION, profile));
    }
    for application in applications.iter().rev() {
        push(application.to_string());
    }
    push(DEFAULT_APPLICATION.to_string());
    names
}

/// Reads every matching file under `locations.search_paths` into an
/// environment.
///
/// `root` is the directory file names are reported relative to and
/// `name_prefix` is prepended to them (for example the repository URI), so a
/// source is named `<name_prefix>/<relative path>`.
pub fn load_environment(
    request: &EnvironmentRequest,
    locations: &Locations,
    root: &Path,
    name_prefix: &str,
) -> Result<Environment> {
    let profiles = request.profiles();
    let mut environment = Environment::for_request(request);
    environment.label = locations.label.clone();
    environment.version = locations.version.clone();

    for name in candidate_names(&request.applications(), &profiles) {
        for search_path in &locations.search_paths {
            for extension in EXTENSIONS {
                let file = search_path.join(format!("{}.{}", name, extension));
                if !file.is_file() {
                    continue;
                }
                let sources = load_file(&file, root, name_prefix, &profiles, request.include_origin)?;
                environment.add_all(sources);
            }
        }
    }

    debug!(
        "Loaded {} property source(s) for {}/{} from {}",
        environment.property_sources.len(),
        request.application,
        request.profile,
        name_prefix
    );
    Ok(environment)
}

/// Loads one file into property sources, later documents first.
pub fn load_file(
    file: &Path,
    root: &Path,
    name_prefix: &str,
    profiles: &[String],
    include_origin: bool,
) -> Result<Vec<PropertySource>> {
    let format = match FileFormat::from_path(file) {
        Some(format) => format,
        None => return Ok(Vec::new()),
    };
    let relative = relative_name(file, root);
    let source_name = if name_prefix.is_empty() {
        relative.clone()
    } else {
        format!("{}/{}", name_prefix.trim_end_matches('/'), relative)
    };

    let text = fs::read_to_string(file)?;
    let documents = format::load_documents(&text, format, &relative, profiles, include_origin)?;
    Ok(documents
        .into_iter()
        .rev()
        .map(|document| {
            let name = if document.total > 1 {
                format!("{} (document #{})", source_name, document.index)
            } else {
                source_name.clone()
            };
            PropertySource::new(name, document.properties)
        })
        .collect())
}

fn relative_name(file: &Path, root: &Path) -> String {
    file.strip_prefix(root)
        .unwrap_or(file)
        .components()
        .map(|c| c.as_os_str().to_string_lossy())
        .collect::<Vec<_>>()
        .join("/")
}

/// Expands search path patterns relative to `root`.
///
/// Entries may contain glob wildcards (`config/*`); matches are sorted so the
/// order is stable. Entries that would escape `root` through `..` are dropped.
/// An empty list means `root` itself.
pub fn expand_search_paths(root: &Path, patterns: &[String]) -> Vec<PathBuf> {
    if patterns.is_empty() {
        return vec![root.to_path_buf()];
    }

    let mut paths = Vec::new();
    for pattern in patterns {
        let pattern = pattern.trim().trim_start_matches('/');
        if pattern.split('/').any(|segment| segment == "..") {
            debug!("Ignoring search path outside the repository: {}", pattern);
            continue;
        }
        if pattern.is_empty() || pattern == "." {
            push_unique(&mut paths, root.to_path_buf());
        } else if pattern.contains(['*', '?', '[']) {
            let full = root.join(pattern);
            let mut matches: Vec<PathBuf> = glob::glob(&full.to_string_lossy())
                .map(|entries| entries.filter_map(|e| e.ok()).filter(|p| p.is_dir()).collect())
                .unwrap_or_default();
            matches.sort();
            for found in matches {
                push_unique(&mut paths, found);
            }
        } else {
            push_unique(&mut paths, root.join(pattern));
        }
    }
    paths
}

fn push_unique(paths: &mut Vec<PathBuf>, path: PathBuf) {
    if !paths.contains(&path) {
        paths.push(path);
    }
}

/// Finds a plain resource file for a request.
///
/// For `nginx.conf` and profiles `dev,prod` every search path is probed for
/// `nginx-prod.conf`, `nginx-dev.conf` and then `nginx.conf`; the first
/// existing file wins. Absolute paths and paths containing `..` never match.
pub fn find_resource(search_paths: &[PathBuf], profiles: &[String], path: &str) -> Option<PathBuf> {
    let path = path.trim_start_matches('/');
    if path.is_empty() || path.split('/').any(|segment| segment == "..") {
        return None;
    }

    let (stem, extension) = match path.rsplit_once('.') {
        Some((stem, ext)) if !stem.is_empty() && !ext.contains('/') => (stem, Some(ext)),
        _ => (path, None),
    };
    let mut candidates: Vec<String> = profiles
        .iter()
        .rev()
        .map(|profile| match extension {
            Some(ext) => format!("{}-{}.{}", stem, profile, ext),
            None => format!("{}-{}", stem, profile),
        })
        .collect();
    candidates.push(path.to_string());

    search_paths.iter().find_map(|dir| {
        candidates
            .iter()
            .map(|candidate| dir.join(candidate))
            .find(|file| file.is_file())
    })
}
