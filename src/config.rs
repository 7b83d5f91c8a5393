//! Daemon configuration.
//!
//! Handles the optional configuration file at:
//! - Linux: ~/.config/ghostwatch/config.toml
//! - macOS: ~/Library/Application Support/ghostwatch/config.toml
//! - Windows: %APPDATA%\ghostwatch\config.toml
//!
//! Every key is optional. Command-line flags override whatever the file sets.

use std::fs;
use std::net::SocketAddr;
use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::{DaemonError, Result};
use crate::server::dispatch::DispatchConfig;

/// Daemon configuration
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct DaemonConfig {
    /// Host to bind the WebSocket server to
    pub host: String,
    pub port: u16,

    /// Dispatcher sleep when the queue is empty
    pub poll_interval_ms: u64,
    /// Dispatcher sleep after a failed cycle
    pub error_backoff_ms: u64,
    pub max_batch: usize,
    pub queue_warn_depth: usize,

    /// Outbox capacity per connected client
    pub subscriber_buffer: usize,
    /// Changes kept by the built-in context aggregator
    pub recent_events: usize,

    /// Projects to watch at startup
    pub projects: Vec<PathBuf>,

    /// Tracing filter used when RUST_LOG is unset
    pub log_filter: String,
}

impl Default for DaemonConfig {
    fn default() -> Self {
        Self {
            host: "127.0.0.1".to_string(),
            port: 7777,
            poll_interval_ms: 100,
            error_backoff_ms: 1000,
            max_batch: 1024,
            queue_warn_depth: 10_000,
            subscriber_buffer: 256,
            recent_events: 200,
            projects: Vec::new(),
            log_filter: "ghostwatch=info".to_string(),
        }
    }
}

impl DaemonConfig {
    /// Default config file location, if the platform has a config directory
    pub fn default_path() -> Option<PathBuf> {
        dirs::config_dir().map(|dir| dir.join("ghostwatch").join("config.toml"))
    }

    /// Load configuration.
    ///
    /// An explicit path must exist. Without one, the default location is
    /// used if present and built-in defaults otherwise.
    pub fn load(explicit: Option<&Path>) -> Result<Self> {
        match explicit {
            Some(path) => Self::load_from(path),
            None => match Self::default_path() {
                Some(path) if path.exists() => Self::load_from(&path),
                _ => Ok(Self::default()),
            },
        }
    }

    /// Load configuration from a specific file
    pub fn load_from(path: &Path) -> Result<Self> {
        let content = fs::read_to_string(path).map_err(|e| DaemonError::Config {
            message: format!("Failed to read {}: {}", path.display(), e),
        })?;
        Self::parse(&content)
    }

    pub fn parse(content: &str) -> Result<Self> {
        toml::from_str(content).map_err(|e| DaemonError::Config {
            message: format!("Failed to parse config: {}", e),
        })
    }

    /// Socket address to listen on
    pub fn addr(&self) -> Result<SocketAddr> {
        format!("{}:{}", self.host, self.port)
            .parse()
            .map_err(|e| DaemonError::Config {
                message: format!("Invalid listen address {}:{}: {}", self.host, self.port, e),
            })
    }

    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms)
    }

    pub fn error_backoff(&self) -> Duration {
        Duration::from_millis(self.error_backoff_ms)
    }

    pub fn dispatch_config(&self) -> DispatchConfig {
        DispatchConfig {
            poll_interval: self.poll_interval(),
            error_backoff: self.error_backoff(),
            max_batch: self.max_batch.max(1),
            queue_warn_depth: self.queue_warn_depth,
        }
    }
}
