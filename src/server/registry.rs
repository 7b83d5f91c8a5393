//! Watched project registry
//!
//! Maps each canonical project path to its active [`WatchSource`]. There is
//! at most one entry per canonical path. A watch request reserves its path
//! under the lock, then subscribes and counts files with the lock released,
//! so readers never wait on a directory walk. A second request for a
//! reserved path reports it as already watched.
//!
//! Watching and unwatching touch the filesystem (canonicalize, walk, native
//! subscription) and are meant to run on a blocking thread.

use std::collections::{BTreeMap, HashSet};
use std::path::{Path, PathBuf};
use std::sync::Arc;

use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use serde::Serialize;

use crate::error::{DaemonError, Result};
use crate::fs_utils::{canonical_project_path, count_project_files, resolve_project_path};

use super::metrics::Metrics;
use super::queue::EventSender;
use super::watcher::WatchSource;

/// Outcome of a watch request
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum WatchOutcome {
    AlreadyWatching { path: PathBuf, message: String },
    Watching { path: PathBuf, files: usize },
}

/// Outcome of an unwatch request
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum UnwatchOutcome {
    NotWatching { path: PathBuf },
    Unwatched { path: PathBuf },
}

/// One watched project
#[derive(Debug)]
struct WatchEntry {
    source: WatchSource,
    /// Qualifying files at the time the watch started
    file_count: usize,
    started_at: DateTime<Utc>,
}

/// Summary of a watched project
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ProjectInfo {
    pub path: PathBuf,
    pub files: usize,
    pub watching_since: DateTime<Utc>,
}

#[derive(Debug, Default)]
struct Watches {
    entries: BTreeMap<PathBuf, WatchEntry>,
    /// Paths whose watch is being set up outside the lock
    pending: HashSet<PathBuf>,
    /// Set by `stop_all`; no watch starts afterwards
    closed: bool,
}

/// Registry of watched projects
pub struct WatchRegistry {
    inner: Mutex<Watches>,
    queue: EventSender,
    metrics: Arc<Metrics>,
}

impl WatchRegistry {
    pub fn new(queue: EventSender, metrics: Arc<Metrics>) -> Self {
        Self {
            inner: Mutex::new(Watches::default()),
            queue,
            metrics,
        }
    }

    /// Start watching a project directory.
    ///
    /// Fails with `InvalidPath` if the path does not exist,
    /// `NativeSubscription` if notify cannot subscribe, or `ShuttingDown`
    /// once [`stop_all`](Self::stop_all) has run.
    pub fn watch(&self, raw: &Path) -> Result<WatchOutcome> {
        let path = canonical_project_path(raw)?;

        {
            let mut inner = self.inner.lock();
            if inner.closed {
                return Err(DaemonError::ShuttingDown);
            }
            if inner.entries.contains_key(&path) || !inner.pending.insert(path.clone()) {
                return Ok(WatchOutcome::AlreadyWatching {
                    path,
                    message: "Project already being watched".to_string(),
                });
            }
        }

        let started = WatchSource::start(path.clone(), self.queue.clone())
            .map(|source| (source, count_project_files(&path)));

        let mut inner = self.inner.lock();
        inner.pending.remove(&path);
        let (source, file_count) = started?;
        if inner.closed {
            drop(inner);
            drop(source);
            return Err(DaemonError::ShuttingDown);
        }

        self.metrics.record_files_watched(file_count);
        inner.entries.insert(
            path.clone(),
            WatchEntry {
                source,
                file_count,
                started_at: Utc::now(),
            },
        );
        drop(inner);

        tracing::info!("Now watching: {} ({} files)", path.display(), file_count);

        Ok(WatchOutcome::Watching {
            path,
            files: file_count,
        })
    }

    /// Stop watching a project. The native subscription is released before
    /// this returns.
    pub fn unwatch(&self, raw: &Path) -> UnwatchOutcome {
        let path = resolve_project_path(raw);

        let removed = self.inner.lock().entries.remove(&path);
        match removed {
            Some(mut entry) => {
                entry.source.stop();
                tracing::info!("Stopped watching: {}", path.display());
                UnwatchOutcome::Unwatched { path }
            }
            None => UnwatchOutcome::NotWatching { path },
        }
    }

    pub fn is_watching(&self, raw: &Path) -> bool {
        let path = resolve_project_path(raw);
        self.inner.lock().entries.contains_key(&path)
    }

    /// Canonical paths of all watched projects, sorted
    pub fn projects(&self) -> Vec<PathBuf> {
        self.inner.lock().entries.keys().cloned().collect()
    }

    pub fn project_info(&self) -> Vec<ProjectInfo> {
        self.inner
            .lock()
            .entries
            .iter()
            .map(|(path, entry)| ProjectInfo {
                path: path.clone(),
                files: entry.file_count,
                watching_since: entry.started_at,
            })
            .collect()
    }

    pub fn file_count(&self, raw: &Path) -> Option<usize> {
        let path = resolve_project_path(raw);
        self.inner
            .lock()
            .entries
            .get(&path)
            .map(|entry| entry.file_count)
    }

    pub fn len(&self) -> usize {
        self.inner.lock().entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.inner.lock().entries.is_empty()
    }

    /// Stop every watch source and refuse new ones. Used on daemon shutdown.
    pub fn stop_all(&self) -> usize {
        let drained = {
            let mut inner = self.inner.lock();
            inner.closed = true;
            std::mem::take(&mut inner.entries)
        };
        let count = drained.len();
        for (path, mut entry) in drained {
            entry.source.stop();
            tracing::debug!("Stopped watching: {}", path.display());
        }
        count
    }
}

impl std::fmt::Debug for WatchRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("WatchRegistry")
            .field("projects", &self.projects())
            .field("pending", &self.inner.lock().pending.len())
            .finish()
    }
}
