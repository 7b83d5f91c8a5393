//! Socket server protocol message types
//!
//! Defines the JSON message format for client-server communication.
//! Besides JSON, a client may send the bare text `ping`, which is answered
//! with `{"event":"pong"}`.

use std::path::PathBuf;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::server::events::ChangeRecord;
use crate::server::metrics::MetricsSnapshot;

/// Client-to-server message
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ClientMessage {
    /// Call an entry point
    Query {
        id: u64,
        method: String,
        #[serde(default)]
        params: serde_json::Value,
    },
    /// Ping to check connection
    Ping,
}

/// Server-to-client message
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum ServerMessage {
    /// First message on every connection
    Connected {
        message: String,
        watched_projects: Vec<PathBuf>,
        metrics: MetricsSnapshot,
    },
    /// A watched file was modified
    FileChanged(ChangeRecord),
    /// A project started being watched
    ProjectAdded {
        path: PathBuf,
        files: usize,
        timestamp: DateTime<Utc>,
    },
    /// Query response
    Response {
        id: u64,
        result: serde_json::Value,
    },
    /// Error response
    Error {
        id: Option<u64>,
        code: String,
        message: String,
    },
    /// Pong response
    Pong,
}

/// Params of `watch` and `unwatch`
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PathParams {
    pub path: PathBuf,
}

/// Params of `prepare_context`
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PrepareContextParams {
    pub user_prompt: String,
    #[serde(default = "default_platform")]
    pub ai_platform: String,
}

fn default_platform() -> String {
    "Unknown".to_string()
}

/// Result of `health`
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HealthReport {
    pub status: String,
    pub version: String,
    pub uptime_seconds: f64,
    pub uptime_human: String,
    pub watched_projects: usize,
    pub active_connections: usize,
    pub metrics: MetricsSnapshot,
}

/// Result of `metrics`
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MetricsReport {
    #[serde(flatten)]
    pub metrics: MetricsSnapshot,
    pub watched_projects: usize,
    pub active_connections: usize,
    pub projects_list: Vec<PathBuf>,
    /// Change records waiting for the dispatch loop
    pub queue_depth: usize,
}

/// Result of `prepare_context`
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum ContextReport {
    Success {
        context: String,
        platform: String,
        user_state: serde_json::Value,
        length: usize,
    },
    Error {
        error: String,
    },
}
