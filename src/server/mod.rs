//! File-change pipeline
//!
//! Turns native file notifications from any number of watched projects into
//! one ordered stream of change records.
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────┐
//! │                         WatchRegistry                                │
//! │  ┌──────────────┐  ┌──────────────┐  ┌──────────────┐               │
//! │  │ WatchSource  │  │ WatchSource  │  │ WatchSource  │  notify       │
//! │  │  project A   │  │  project B   │  │     ...      │  threads      │
//! │  └──────┬───────┘  └──────┬───────┘  └──────┬───────┘               │
//! └─────────┼─────────────────┼─────────────────┼───────────────────────┘
//!           │ ignore filter   │                 │
//!           ▼                 ▼                 ▼
//!     ┌──────────────────────────────────────────────┐
//!     │        EventSender ──► EventReceiver         │  unbounded queue
//!     └──────────────────────┬───────────────────────┘
//!                            ▼
//!     ┌──────────────────────────────────────────────┐
//!     │                 Dispatcher                    │  tokio task
//!     │   Metrics ◄──┼──► ContextAggregator           │
//!     │              ▼                                │
//!     │      SubscriberRegistry::broadcast            │
//!     └──────────────────────────────────────────────┘
//! ```
//!
//! # Locking
//!
//! - `WatchRegistry` reserves a path under its lock and does the walk and
//!   subscription unlocked; readers never wait on a walk.
//! - `SubscriberRegistry` snapshots under its read lock and never sends while
//!   holding it.
//! - `Metrics` uses one mutex for all counters.
//!
//! # Modules
//!
//! - `ignore` - Excluded directory names
//! - `events` - Change records
//! - `queue` - Watcher-to-dispatcher bridge
//! - `watcher` - Per-project native subscription
//! - `registry` - Watched project registry
//! - `dispatch` - Single consumer loop
//! - `metrics` - Daemon counters

pub mod dispatch;
pub mod events;
pub mod ignore;
pub mod metrics;
pub mod queue;
pub mod registry;
pub mod watcher;

pub use dispatch::{DispatchConfig, Dispatcher, DrainOutcome};
pub use events::{ChangeKind, ChangeRecord};
pub use ignore::{should_ignore, IGNORED_DIRS};
pub use metrics::{Metrics, MetricsSnapshot};
pub use queue::{event_queue, EventReceiver, EventSender};
pub use registry::{ProjectInfo, UnwatchOutcome, WatchOutcome, WatchRegistry};
pub use watcher::WatchSource;
