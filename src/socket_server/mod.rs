//! ghostwatch Socket Server
//!
//! WebSocket front end of the daemon: every client is a subscriber to the
//! change stream and may call the query methods below.
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                    GHOSTWATCH DAEMON (ghostwatch-daemon)                │
//! ├─────────────────────────────────────────────────────────────────────────┤
//! │                                                                         │
//! │  ┌─────────────────────────────────────────────────────────────────┐   │
//! │  │                 SubscriberRegistry (RwLock)                      │   │
//! │  │                                                                  │   │
//! │  │  sub_1a2b3c4d ──► bounded outbox ──► ConnectionState task       │   │
//! │  │  sub_5e6f7a8b ──► bounded outbox ──► ConnectionState task       │   │
//! │  │                                                                  │   │
//! │  └─────────────────────────────────────────────────────────────────┘   │
//! │                                                                         │
//! │  WebSocket Server ──► ConnectionState per client                        │
//! │    - Outbox forwarding                                                  │
//! │    - Query handling                                                     │
//! │    - Literal "ping" keepalive                                           │
//! │                                                                         │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! # Protocol
//!
//! All messages are JSON over WebSocket:
//!
//! ```json
//! // Client -> Server
//! {"type": "query", "id": 1, "method": "watch", "params": {"path": "/path/to/project"}}
//! {"type": "query", "id": 2, "method": "prepare_context", "params": {"user_prompt": "..."}}
//! {"type": "ping"}
//!
//! // Server -> Client
//! {"event": "connected", "message": "...", "watched_projects": [...], "metrics": {...}}
//! {"event": "file_changed", "kind": "modified", "path": "...", "project": "...", ...}
//! {"event": "project_added", "path": "...", "files": 42, "timestamp": "..."}
//! {"event": "response", "id": 1, "result": {...}}
//! {"event": "error", "id": 1, "code": "invalid_path", "message": "..."}
//! ```
//!
//! Query methods: `watch`, `unwatch`, `metrics`, `health`, `prepare_context`,
//! `list_projects`.

pub mod connection;
pub mod daemon;
pub mod fanout;
pub mod protocol;

pub use connection::handle_connection;
pub use daemon::{serve, Daemon, DaemonState};
pub use fanout::{BroadcastReport, Outbox, SubscriberId, SubscriberRegistry};
pub use protocol::{ClientMessage, ContextReport, HealthReport, MetricsReport, ServerMessage};
