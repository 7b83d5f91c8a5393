//! Context aggregation seam.
//!
//! The dispatch loop forwards every [`ChangeRecord`] to a [`ContextAggregator`]
//! and the `prepare_context` entry point asks it to turn the accumulated
//! change history plus a user prompt into a payload for an AI client. The
//! pipeline depends only on this trait.
//!
//! [`RecentChangesAggregator`] is the built-in implementation: a bounded ring
//! of recent changes rendered as a plain-text summary.

use std::collections::{HashSet, VecDeque};
use std::path::PathBuf;

use parking_lot::Mutex;
use serde_json::json;
use thiserror::Error;

use crate::server::events::ChangeRecord;

/// Errors raised by an aggregator. Never fatal to the pipeline.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum AggregatorError {
    #[error("Prompt is empty")]
    EmptyPrompt,

    #[error("Aggregator unavailable: {0}")]
    Unavailable(String),
}

/// Collaborator that consumes change records and prepares AI context.
///
/// `add_event` is called from the dispatch loop for every record and must
/// return quickly; anything slow belongs on the implementation's own task.
pub trait ContextAggregator: Send + Sync {
    fn add_event(&self, record: &ChangeRecord) -> Result<(), AggregatorError>;

    fn prepare_context(&self, prompt: &str, platform: &str) -> Result<String, AggregatorError>;

    /// Read-only view of what the aggregator currently believes about the user
    fn user_state(&self) -> serde_json::Value;
}

/// Keeps the last `capacity` changes in memory
pub struct RecentChangesAggregator {
    recent: Mutex<VecDeque<ChangeRecord>>,
    capacity: usize,
}

impl RecentChangesAggregator {
    pub fn new(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        Self {
            recent: Mutex::new(VecDeque::with_capacity(capacity)),
            capacity,
        }
    }

    pub fn len(&self) -> usize {
        self.recent.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.recent.lock().is_empty()
    }

    /// Most recent change first, one entry per distinct file
    fn distinct_recent(&self) -> Vec<ChangeRecord> {
        let recent = self.recent.lock();
        let mut seen: HashSet<&PathBuf> = HashSet::new();
        recent
            .iter()
            .rev()
            .filter(|record| seen.insert(&record.path))
            .cloned()
            .collect()
    }
}

impl Default for RecentChangesAggregator {
    fn default() -> Self {
        Self::new(200)
    }
}

impl ContextAggregator for RecentChangesAggregator {
    fn add_event(&self, record: &ChangeRecord) -> Result<(), AggregatorError> {
        let mut recent = self.recent.lock();
        if recent.len() == self.capacity {
            recent.pop_front();
        }
        recent.push_back(record.clone());
        Ok(())
    }

    fn prepare_context(&self, prompt: &str, platform: &str) -> Result<String, AggregatorError> {
        let prompt = prompt.trim();
        if prompt.is_empty() {
            return Err(AggregatorError::EmptyPrompt);
        }

        let files = self.distinct_recent();
        let prompt_lower = prompt.to_lowercase();
        let (mentioned, others): (Vec<_>, Vec<_>) = files
            .into_iter()
            .partition(|record| prompt_lower.contains(&record.filename.to_lowercase()));

        let mut out = format!("Platform: {platform}\nRequest: {prompt}\n");
        if mentioned.is_empty() && others.is_empty() {
            out.push_str("No recent file activity.\n");
            return Ok(out);
        }
        if !mentioned.is_empty() {
            out.push_str("Files referenced in the request:\n");
            for record in &mentioned {
                out.push_str(&format!(
                    "- {} (changed {})\n",
                    record.path.display(),
                    record.timestamp.to_rfc3339()
                ));
            }
        }
        if !others.is_empty() {
            out.push_str("Recently changed files:\n");
            for record in others.iter().take(10) {
                out.push_str(&format!(
                    "- {} (changed {})\n",
                    record.path.display(),
                    record.timestamp.to_rfc3339()
                ));
            }
        }
        Ok(out)
    }

    fn user_state(&self) -> serde_json::Value {
        let recent = self.recent.lock();
        match recent.back() {
            Some(last) => json!({
                "recent_changes": recent.len(),
                "active_project": last.project,
                "last_file": last.filename,
                "last_activity": last.timestamp,
            }),
            None => json!({
                "recent_changes": 0,
                "active_project": null,
                "last_file": null,
                "last_activity": null,
            }),
        }
    }
}
