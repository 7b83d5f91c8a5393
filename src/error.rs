//! Error types and exit codes for ghostwatch

use std::path::PathBuf;
use std::process::ExitCode;
use thiserror::Error;

use crate::context::AggregatorError;

/// Main error type for daemon operations
#[derive(Error, Debug)]
pub enum DaemonError {
    #[error("Invalid path {}: {reason}", path.display())]
    InvalidPath { path: PathBuf, reason: String },

    #[error("Failed to subscribe to {}: {reason}", path.display())]
    NativeSubscription { path: PathBuf, reason: String },

    #[error("Delivery to subscriber {subscriber} failed: {reason}")]
    Delivery { subscriber: String, reason: String },

    #[error("Context aggregator error: {0}")]
    Aggregator(#[from] AggregatorError),

    #[error("Unknown method: {method}")]
    UnknownMethod { method: String },

    #[error("Invalid params: {message}")]
    InvalidParams { message: String },

    #[error("Daemon is shutting down")]
    ShuttingDown,

    #[error("Configuration error: {message}")]
    Config { message: String },

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("Background task failed: {message}")]
    Join { message: String },

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl DaemonError {
    /// Stable code string reported to clients in error responses
    pub fn error_code(&self) -> &'static str {
        match self {
            Self::InvalidPath { .. } => "invalid_path",
            Self::NativeSubscription { .. } => "subscription_failed",
            Self::Delivery { .. } => "delivery_failed",
            Self::Aggregator(_) => "aggregator_error",
            Self::UnknownMethod { .. } => "unknown_method",
            Self::InvalidParams { .. } => "invalid_params",
            Self::ShuttingDown => "shutting_down",
            Self::Config { .. } => "config_error",
            Self::Serialization(_) => "serialization_error",
            Self::Join { .. } => "internal_error",
            Self::Io(_) => "io_error",
        }
    }

    /// Convert error to a process exit code:
    /// - 1: IO error / bind failure
    /// - 2: Configuration error
    /// - 3: Invalid path or native subscription failure
    /// - 4: Internal failure
    pub fn exit_code(&self) -> ExitCode {
        match self {
            Self::Io(_) => ExitCode::from(1),
            Self::Config { .. } => ExitCode::from(2),
            Self::InvalidPath { .. } | Self::NativeSubscription { .. } => ExitCode::from(3),
            Self::Delivery { .. }
            | Self::Aggregator(_)
            | Self::UnknownMethod { .. }
            | Self::InvalidParams { .. }
            | Self::ShuttingDown
            | Self::Serialization(_)
            | Self::Join { .. } => ExitCode::from(4),
        }
    }
}

impl From<tokio::task::JoinError> for DaemonError {
    fn from(e: tokio::task::JoinError) -> Self {
        DaemonError::Join {
            message: e.to_string(),
        }
    }
}

/// Result type alias for daemon operations
pub type Result<T> = std::result::Result<T, DaemonError>;
