//! Filesystem helpers for resolving and scanning watched projects
//!
//! - `normalize_path`: Strips Windows `\\?\` prefix from canonicalized paths
//! - `resolve_project_path`: Canonical key used by the watch registry
//! - `count_project_files`: File count reported when a project is first watched

use std::path::{Path, PathBuf};

use ignore::WalkBuilder;

use crate::error::{DaemonError, Result};
use crate::server::ignore::is_excluded_in;

/// Normalize Windows paths by removing the `\\?\` prefix if present.
///
/// On Windows, `Path::canonicalize()` returns extended-length paths
/// (`\\?\C:\...`) that would otherwise never compare equal to the paths
/// clients send. No-op on Unix.
///
/// # Examples
///
/// ```
/// use std::path::PathBuf;
/// use ghostwatch::fs_utils::normalize_path;
///
/// let path = PathBuf::from("/home/user/repo");
/// assert_eq!(normalize_path(&path), path);
/// ```
pub fn normalize_path(path: &Path) -> PathBuf {
    #[cfg(windows)]
    {
        let s = path.to_string_lossy();
        if let Some(stripped) = s.strip_prefix(r"\\?\UNC\") {
            return PathBuf::from(format!(r"\\{}", stripped));
        }
        if let Some(stripped) = s.strip_prefix(r"\\?\") {
            return PathBuf::from(stripped);
        }
    }
    path.to_path_buf()
}

/// Resolve a user-supplied project path to its canonical form.
///
/// Fails with [`DaemonError::InvalidPath`] if the path does not exist.
pub fn canonical_project_path(raw: &Path) -> Result<PathBuf> {
    match raw.canonicalize() {
        Ok(path) => Ok(normalize_path(&path)),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Err(DaemonError::InvalidPath {
            path: absolute_path(raw),
            reason: "Path does not exist".to_string(),
        }),
        Err(e) => Err(DaemonError::InvalidPath {
            path: absolute_path(raw),
            reason: e.to_string(),
        }),
    }
}

/// Best-effort resolution that never fails.
///
/// Used for lookups (e.g. unwatch) where the directory may already have been
/// deleted from disk but is still registered under its canonical key.
pub fn resolve_project_path(raw: &Path) -> PathBuf {
    canonical_project_path(raw).unwrap_or_else(|_| absolute_path(raw))
}

fn absolute_path(raw: &Path) -> PathBuf {
    if raw.is_absolute() {
        raw.to_path_buf()
    } else {
        std::env::current_dir()
            .map(|cwd| cwd.join(raw))
            .unwrap_or_else(|_| raw.to_path_buf())
    }
}

/// Count regular files under `project`, skipping excluded directories.
///
/// Uses the same exclusion rule as live change filtering. The walk does not
/// honor `.gitignore` or hidden-file rules: only [`IGNORED_DIRS`] apply.
///
/// [`IGNORED_DIRS`]: crate::server::ignore::IGNORED_DIRS
pub fn count_project_files(project: &Path) -> usize {
    let root = project.to_path_buf();
    WalkBuilder::new(project)
        .standard_filters(false)
        .follow_links(false)
        .filter_entry(move |entry| !is_excluded_in(&root, entry.path()))
        .build()
        .filter_map(|entry| entry.ok())
        .filter(|entry| entry.file_type().is_some_and(|t| t.is_file()))
        .count()
}
