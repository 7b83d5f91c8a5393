//! ghostwatch: live file-change events for AI context clients
//!
//! The daemon watches project directories, funnels every file modification
//! through a single dispatch loop, and hands each change to two consumers:
//! a [`ContextAggregator`] that builds prompt context, and every connected
//! WebSocket subscriber.
//!
//! # Example
//!
//! ```no_run
//! use std::path::PathBuf;
//! use std::sync::Arc;
//! use ghostwatch::config::DaemonConfig;
//! use ghostwatch::context::RecentChangesAggregator;
//! use ghostwatch::socket_server::{serve, Daemon};
//!
//! # async fn run() -> ghostwatch::Result<()> {
//! let daemon = Daemon::start(DaemonConfig::default(), Arc::new(RecentChangesAggregator::default()));
//! daemon.auto_watch(&[PathBuf::from("/home/user/project")]).await;
//! let listener = daemon.bind().await?;
//! serve(daemon.state(), listener, async {
//!     let _ = tokio::signal::ctrl_c().await;
//! })
//! .await?;
//! daemon.shutdown().await
//! # }
//! ```

pub mod config;
pub mod context;
pub mod error;
pub mod fs_utils;
pub mod server;
pub mod socket_server;

// Re-export commonly used types
pub use config::DaemonConfig;
pub use context::{AggregatorError, ContextAggregator, RecentChangesAggregator};
pub use error::{DaemonError, Result};
pub use server::{ChangeRecord, MetricsSnapshot, WatchOutcome, WatchRegistry};
pub use socket_server::{Daemon, DaemonState, SubscriberRegistry};
