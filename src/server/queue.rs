//! Event queue bridging watcher threads and the dispatch loop.
//!
//! Watch sources run on notify's native threads and must never stall OS-level
//! delivery, so the producer side is an unbounded channel whose `push` is
//! constant-time. The single consumer polls with [`EventReceiver::pop_if_available`]
//! from a tokio task.
//!
//! Records pushed from one source arrive in the order they were pushed; no
//! ordering is promised between different sources.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use tokio::sync::mpsc::{self, error::TryRecvError};

use super::events::ChangeRecord;

/// Create a connected producer/consumer pair
pub fn event_queue() -> (EventSender, EventReceiver) {
    let (tx, rx) = mpsc::unbounded_channel();
    let depth = Arc::new(AtomicUsize::new(0));
    (
        EventSender {
            tx,
            depth: Arc::clone(&depth),
        },
        EventReceiver {
            rx,
            depth,
            closed: false,
        },
    )
}

/// Producer handle. Cheap to clone, one per watch source.
#[derive(Debug, Clone)]
pub struct EventSender {
    tx: mpsc::UnboundedSender<ChangeRecord>,
    depth: Arc<AtomicUsize>,
}

impl EventSender {
    /// Enqueue a record without blocking.
    ///
    /// Returns false if the consumer has gone away; the record is dropped.
    pub fn push(&self, record: ChangeRecord) -> bool {
        self.depth.fetch_add(1, Ordering::SeqCst);
        match self.tx.send(record) {
            Ok(()) => true,
            Err(_) => {
                self.depth.fetch_sub(1, Ordering::SeqCst);
                false
            }
        }
    }

    /// Records pushed but not yet popped
    pub fn depth(&self) -> usize {
        self.depth.load(Ordering::SeqCst)
    }
}

/// Consumer handle owned by the dispatch loop
#[derive(Debug)]
pub struct EventReceiver {
    rx: mpsc::UnboundedReceiver<ChangeRecord>,
    depth: Arc<AtomicUsize>,
    closed: bool,
}

impl EventReceiver {
    /// Take the next record if one is ready. Never blocks.
    pub fn pop_if_available(&mut self) -> Option<ChangeRecord> {
        match self.rx.try_recv() {
            Ok(record) => {
                self.depth.fetch_sub(1, Ordering::SeqCst);
                Some(record)
            }
            Err(TryRecvError::Empty) => None,
            Err(TryRecvError::Disconnected) => {
                self.closed = true;
                None
            }
        }
    }

    /// True once every sender is dropped and the backlog is drained
    pub fn is_closed(&self) -> bool {
        self.closed
    }

    pub fn depth(&self) -> usize {
        self.depth.load(Ordering::SeqCst)
    }
}
