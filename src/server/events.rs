//! Change records produced by watch sources.
//!
//! A [`ChangeRecord`] is created once on a watcher thread, handed across the
//! event queue, and from then on only read: by the context aggregator and by
//! the fanout when it serializes the `file_changed` message.
//!
//! # Wire Format
//!
//! Broadcast to subscribers as part of the `file_changed` event:
//! ```json
//! {"event":"file_changed","kind":"modified","path":"/p/a.txt","project":"/p","filename":"a.txt","timestamp":"..."}
//! ```

use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Kind of filesystem change carried by a record
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ChangeKind {
    Modified,
}

/// One qualifying filesystem modification
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChangeRecord {
    pub kind: ChangeKind,
    /// Absolute path of the modified file
    pub path: PathBuf,
    /// Canonical root of the project that owns the file
    pub project: PathBuf,
    /// Final path component of `path`
    pub filename: String,
    pub timestamp: DateTime<Utc>,
}

impl ChangeRecord {
    /// Build a `modified` record stamped with the current time
    pub fn modified(project: &Path, path: &Path) -> Self {
        Self::modified_at(project, path, Utc::now())
    }

    pub fn modified_at(project: &Path, path: &Path, timestamp: DateTime<Utc>) -> Self {
        let filename = path
            .file_name()
            .map(|name| name.to_string_lossy().into_owned())
            .unwrap_or_default();
        Self {
            kind: ChangeKind::Modified,
            path: path.to_path_buf(),
            project: project.to_path_buf(),
            filename,
            timestamp,
        }
    }
}
