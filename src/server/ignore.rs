//! Directory exclusion rules shared by file counting and live change filtering.
//!
//! Both call sites go through [`is_excluded_in`] so that the number of files
//! reported at watch time and the set of paths that produce change events
//! never drift apart.

use std::path::{Component, Path};

/// Directory names whose contents are never counted or reported.
pub const IGNORED_DIRS: &[&str] = &[
    ".git",
    "node_modules",
    "__pycache__",
    ".venv",
    "venv",
    "dist",
    "build",
    ".next",
    "target",
    ".pytest_cache",
];

/// Returns true if any segment of `path` is one of [`IGNORED_DIRS`].
///
/// Pure: no filesystem access, only the path's components are inspected.
pub fn should_ignore(path: &Path) -> bool {
    path.components().any(|component| match component {
        Component::Normal(name) => name
            .to_str()
            .is_some_and(|name| IGNORED_DIRS.contains(&name)),
        _ => false,
    })
}

/// Apply [`should_ignore`] to `path` relative to `project`.
///
/// A project that itself lives under e.g. `~/build/app` must not have all of
/// its files excluded, so only the segments below the project root count.
/// Paths outside the project are checked as-is.
pub fn is_excluded_in(project: &Path, path: &Path) -> bool {
    match path.strip_prefix(project) {
        Ok(relative) => should_ignore(relative),
        Err(_) => should_ignore(path),
    }
}
