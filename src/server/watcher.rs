//! Per-project file system watcher
//!
//! Uses the `notify` crate to subscribe to native change notifications for
//! one project directory, recursively, and turns qualifying modifications into
//! [`ChangeRecord`]s on the shared event queue.
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────┐     ┌──────────────────┐     ┌─────────────┐
//! │   notify    │────>│  filter (dirs,   │────>│ EventQueue  │
//! │   thread    │     │  ignored paths)  │     │  (push)     │
//! └─────────────┘     └──────────────────┘     └─────────────┘
//! ```
//!
//! The notify callback runs on notify's own thread. Pushing is constant-time
//! so OS-level delivery is never held up by the dispatch side.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use notify::event::ModifyKind;
use notify::{Event, EventKind, RecommendedWatcher, RecursiveMode, Watcher};
use parking_lot::Mutex;

use crate::error::{DaemonError, Result};

use super::events::ChangeRecord;
use super::ignore::is_excluded_in;
use super::queue::EventSender;

/// Native subscription for a single project directory
pub struct WatchSource {
    /// Canonical project root
    project: PathBuf,
    /// The underlying notify watcher; `None` once stopped
    watcher: Option<RecommendedWatcher>,
    /// Open while the source may emit. The callback holds this lock across
    /// check-and-push, so once `stop` has flipped it no record can follow.
    gate: Arc<Mutex<bool>>,
}

impl WatchSource {
    /// Subscribe to `project` and start emitting records onto `queue`.
    ///
    /// `project` must be an existing, canonical directory.
    pub fn start(project: PathBuf, queue: EventSender) -> Result<Self> {
        if !project.is_dir() {
            let reason = if project.exists() {
                "Path is not a directory"
            } else {
                "Path does not exist"
            };
            return Err(DaemonError::InvalidPath {
                path: project,
                reason: reason.to_string(),
            });
        }

        let gate = Arc::new(Mutex::new(true));
        let handler_gate = Arc::clone(&gate);
        let handler_project = project.clone();

        let mut watcher = notify::recommended_watcher(move |res: notify::Result<Event>| match res {
            Ok(event) => handle_event(&handler_project, &handler_gate, &queue, event),
            Err(e) => {
                tracing::error!("[WATCHER] {}: {}", handler_project.display(), e);
            }
        })
        .map_err(|e| DaemonError::NativeSubscription {
            path: project.clone(),
            reason: e.to_string(),
        })?;

        watcher
            .watch(&project, RecursiveMode::Recursive)
            .map_err(|e| DaemonError::NativeSubscription {
                path: project.clone(),
                reason: e.to_string(),
            })?;

        tracing::debug!("[WATCHER] Subscribed to {}", project.display());

        Ok(Self {
            project,
            watcher: Some(watcher),
            gate,
        })
    }

    /// Check if the source is still emitting
    pub fn is_running(&self) -> bool {
        *self.gate.lock()
    }

    /// Release the native subscription.
    ///
    /// After this returns no further record from this source reaches the
    /// queue. Calling it more than once is harmless.
    pub fn stop(&mut self) {
        *self.gate.lock() = false;
        if let Some(mut watcher) = self.watcher.take() {
            if let Err(e) = watcher.unwatch(&self.project) {
                tracing::debug!("[WATCHER] unwatch {}: {}", self.project.display(), e);
            }
            drop(watcher);
            tracing::debug!("[WATCHER] Released {}", self.project.display());
        }
    }
}

impl Drop for WatchSource {
    fn drop(&mut self) {
        self.stop();
    }
}

impl std::fmt::Debug for WatchSource {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("WatchSource")
            .field("project", &self.project)
            .field("running", &self.is_running())
            .finish()
    }
}

/// Whether a notify event kind counts as a content modification
fn is_modification(kind: &EventKind) -> bool {
    matches!(kind, EventKind::Modify(modify) if !matches!(modify, ModifyKind::Name(_)))
}

fn handle_event(project: &Path, gate: &Mutex<bool>, queue: &EventSender, event: Event) {
    if !is_modification(&event.kind) {
        return;
    }

    for path in event.paths {
        if path.is_dir() || is_excluded_in(project, &path) {
            tracing::trace!("[WATCHER] Filtered out: {:?}", path);
            continue;
        }

        let record = ChangeRecord::modified(project, &path);
        let open = gate.lock();
        if !*open {
            return;
        }
        tracing::debug!("[WATCHER] File changed: {}", record.filename);
        if !queue.push(record) {
            tracing::debug!("[WATCHER] Queue closed, dropping change for {:?}", path);
        }
    }
}

// ============================================================================
// Tests
// ============================================================================
