//! Subscriber registry and broadcast fanout
//!
//! Each connected client owns a bounded outbox channel; its connection task
//! drains the outbox into the WebSocket. A broadcast serializes the message
//! once and `try_send`s the same text to every outbox, so a slow or dead
//! socket only ever affects its own connection.
//!
//! A subscriber whose outbox is closed or full fails delivery and is removed
//! after the pass. Dropping its sender closes the outbox, which ends the
//! connection task.

use std::collections::HashMap;
use std::net::SocketAddr;
use std::sync::Arc;

use parking_lot::RwLock;
use serde::Serialize;
use tokio::sync::mpsc::{self, error::TrySendError};

use crate::error::{DaemonError, Result};

/// Identity of one subscriber connection
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct SubscriberId(String);

impl SubscriberId {
    fn generate() -> Self {
        let uuid = uuid::Uuid::new_v4().simple().to_string();
        Self(format!("sub_{}", &uuid[..8]))
    }
}

impl std::fmt::Display for SubscriberId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

/// Receiving end of a subscriber's outbox
pub type Outbox = mpsc::Receiver<Arc<str>>;

/// A registered subscriber
#[derive(Debug, Clone)]
struct Subscriber {
    peer: Option<SocketAddr>,
    outbox: mpsc::Sender<Arc<str>>,
}

/// Result of one broadcast pass
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct BroadcastReport {
    /// Subscribers whose outbox accepted the message
    pub delivered: usize,
    /// Subscribers removed by this pass
    pub pruned: usize,
}

/// Registry of live subscribers
#[derive(Debug)]
pub struct SubscriberRegistry {
    subscribers: RwLock<HashMap<SubscriberId, Subscriber>>,
    /// Outbox capacity per subscriber
    capacity: usize,
}

impl SubscriberRegistry {
    pub fn new(capacity: usize) -> Self {
        Self {
            subscribers: RwLock::new(HashMap::new()),
            capacity: capacity.max(1),
        }
    }

    /// Add a subscriber and hand back its id and outbox
    pub fn register(&self, peer: Option<SocketAddr>) -> (SubscriberId, Outbox) {
        let (tx, rx) = mpsc::channel(self.capacity);
        let id = SubscriberId::generate();
        self.subscribers
            .write()
            .insert(id.clone(), Subscriber { peer, outbox: tx });
        (id, rx)
    }

    /// Remove a subscriber. Returns false if it was already gone.
    pub fn unregister(&self, id: &SubscriberId) -> bool {
        self.subscribers.write().remove(id).is_some()
    }

    pub fn contains(&self, id: &SubscriberId) -> bool {
        self.subscribers.read().contains_key(id)
    }

    pub fn len(&self) -> usize {
        self.subscribers.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.subscribers.read().is_empty()
    }

    /// Serialize `message` and deliver it to every current subscriber.
    ///
    /// Only a serialization failure is returned; per-subscriber delivery
    /// failures are logged and the subscriber is pruned.
    pub fn broadcast<T: Serialize>(&self, message: &T) -> Result<BroadcastReport> {
        let text: Arc<str> = Arc::from(serde_json::to_string(message)?);
        Ok(self.broadcast_text(text))
    }

    /// Deliver pre-serialized text to every current subscriber
    pub fn broadcast_text(&self, text: Arc<str>) -> BroadcastReport {
        let targets: Vec<(SubscriberId, Option<SocketAddr>, mpsc::Sender<Arc<str>>)> = {
            let subscribers = self.subscribers.read();
            if subscribers.is_empty() {
                return BroadcastReport::default();
            }
            subscribers
                .iter()
                .map(|(id, sub)| (id.clone(), sub.peer, sub.outbox.clone()))
                .collect()
        };

        let mut delivered = 0;
        let mut failed = Vec::new();
        for (id, peer, outbox) in targets {
            match Self::deliver(&id, &outbox, Arc::clone(&text)) {
                Ok(()) => delivered += 1,
                Err(e) => {
                    tracing::debug!("[FANOUT] {} (peer {:?})", e, peer);
                    failed.push(id);
                }
            }
        }

        let pruned = if failed.is_empty() {
            0
        } else {
            let mut subscribers = self.subscribers.write();
            failed
                .iter()
                .filter(|id| subscribers.remove(*id).is_some())
                .count()
        };

        if pruned > 0 {
            tracing::info!("[FANOUT] Cleaned {} dead connections", pruned);
        }

        BroadcastReport { delivered, pruned }
    }

    fn deliver(id: &SubscriberId, outbox: &mpsc::Sender<Arc<str>>, text: Arc<str>) -> Result<()> {
        outbox.try_send(text).map_err(|e| {
            let reason = match e {
                TrySendError::Full(_) => "outbox full",
                TrySendError::Closed(_) => "connection closed",
            };
            DaemonError::Delivery {
                subscriber: id.to_string(),
                reason: reason.to_string(),
            }
        })
    }

    /// Drop every subscriber. Their outboxes close and the connection tasks
    /// end on their own.
    pub fn close_all(&self) -> usize {
        let drained = std::mem::take(&mut *self.subscribers.write());
        drained.len()
    }
}

impl Default for SubscriberRegistry {
    fn default() -> Self {
        Self::new(256)
    }
}
