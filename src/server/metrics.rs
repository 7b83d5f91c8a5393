//! Daemon-wide counters with point-in-time snapshots.
//!
//! All fields live behind one `parking_lot::Mutex`, so a reader never sees
//! `changes_detected` bumped without the matching `last_activity`. Counters
//! only ever grow; unwatching a project does not subtract its files.

use std::time::Duration;

use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};

/// Immutable copy of the counters at one instant
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MetricsSnapshot {
    /// Files counted across every project at the time it was watched
    pub files_watched: u64,
    /// Change records processed by the dispatch loop
    pub changes_detected: u64,
    /// Successful context preparations
    pub contexts_served: u64,
    pub started_at: DateTime<Utc>,
    /// Timestamp of the latest processed change, if any
    pub last_activity: Option<DateTime<Utc>>,
}

impl MetricsSnapshot {
    /// Time since the daemon started, as seen at `now`
    pub fn uptime(&self, now: DateTime<Utc>) -> Duration {
        (now - self.started_at).to_std().unwrap_or(Duration::ZERO)
    }
}

/// Render an uptime as `"{hours}h {minutes}m"`
pub fn format_uptime(uptime: Duration) -> String {
    let secs = uptime.as_secs();
    format!("{}h {}m", secs / 3600, (secs % 3600) / 60)
}

/// Shared metrics aggregator
#[derive(Debug)]
pub struct Metrics {
    inner: Mutex<MetricsSnapshot>,
}

impl Metrics {
    pub fn new() -> Self {
        Self::started_at(Utc::now())
    }

    pub fn started_at(started_at: DateTime<Utc>) -> Self {
        Self {
            inner: Mutex::new(MetricsSnapshot {
                files_watched: 0,
                changes_detected: 0,
                contexts_served: 0,
                started_at,
                last_activity: None,
            }),
        }
    }

    /// Add the file count of a newly watched project
    pub fn record_files_watched(&self, files: usize) {
        let mut inner = self.inner.lock();
        inner.files_watched = inner.files_watched.saturating_add(files as u64);
    }

    /// Count one processed change and advance `last_activity` in the same step.
    ///
    /// `last_activity` never moves backwards, even if records from different
    /// sources arrive with out-of-order timestamps.
    pub fn record_change(&self, at: DateTime<Utc>) {
        let mut inner = self.inner.lock();
        inner.changes_detected = inner.changes_detected.saturating_add(1);
        inner.last_activity = Some(match inner.last_activity {
            Some(previous) if previous > at => previous,
            _ => at,
        });
    }

    pub fn record_context_served(&self) {
        let mut inner = self.inner.lock();
        inner.contexts_served = inner.contexts_served.saturating_add(1);
    }

    pub fn snapshot(&self) -> MetricsSnapshot {
        self.inner.lock().clone()
    }
}

impl Default for Metrics {
    fn default() -> Self {
        Self::new()
    }
}
