//! Dispatch loop: the single consumer of the event queue.
//!
//! Each cycle drains whatever records are available. Every record is counted
//! in the metrics, forwarded to the context aggregator, and broadcast to all
//! subscribers as a `file_changed` event. An idle cycle sleeps for the poll
//! interval.
//!
//! A cycle that fails, by returning an error or by panicking, is logged and
//! followed by a longer backoff. The loop itself only ends on shutdown or
//! once every producer is gone.

use std::panic::{self, AssertUnwindSafe};
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::watch;

use crate::context::ContextAggregator;
use crate::error::Result;
use crate::socket_server::fanout::SubscriberRegistry;
use crate::socket_server::protocol::ServerMessage;

use super::events::ChangeRecord;
use super::metrics::Metrics;
use super::queue::EventReceiver;

/// Timing knobs for the dispatch loop
#[derive(Debug, Clone)]
pub struct DispatchConfig {
    /// Sleep after a pass that emptied the queue
    pub poll_interval: Duration,
    /// Sleep after a failed pass
    pub error_backoff: Duration,
    /// Records handled per pass before yielding to other tasks
    pub max_batch: usize,
    /// Backlog size that triggers a warning
    pub queue_warn_depth: usize,
}

impl Default for DispatchConfig {
    fn default() -> Self {
        Self {
            poll_interval: Duration::from_millis(100),
            error_backoff: Duration::from_secs(1),
            max_batch: 1024,
            queue_warn_depth: 10_000,
        }
    }
}

/// What one drain pass observed
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DrainOutcome {
    /// Queue emptied after handling this many records
    Idle(usize),
    /// Batch limit reached with records still pending
    Saturated(usize),
    /// All producers dropped and nothing left to drain
    Closed,
}

/// Consumer side of the pipeline
pub struct Dispatcher {
    queue: EventReceiver,
    aggregator: Arc<dyn ContextAggregator>,
    fanout: Arc<SubscriberRegistry>,
    metrics: Arc<Metrics>,
    config: DispatchConfig,
}

impl Dispatcher {
    pub fn new(
        queue: EventReceiver,
        aggregator: Arc<dyn ContextAggregator>,
        fanout: Arc<SubscriberRegistry>,
        metrics: Arc<Metrics>,
        config: DispatchConfig,
    ) -> Self {
        Self {
            queue,
            aggregator,
            fanout,
            metrics,
            config,
        }
    }

    /// Run until `shutdown` flips to true (or its sender is dropped) or the
    /// queue closes
    pub async fn run(mut self, mut shutdown: watch::Receiver<bool>) {
        tracing::debug!("[DISPATCH] Started");
        let mut warned_depth = false;

        loop {
            if *shutdown.borrow() {
                break;
            }

            let pause = match panic::catch_unwind(AssertUnwindSafe(|| self.drain_once())) {
                Ok(Ok(DrainOutcome::Idle(_))) => Some(self.config.poll_interval),
                Ok(Ok(DrainOutcome::Saturated(_))) => None,
                Ok(Ok(DrainOutcome::Closed)) => {
                    tracing::info!("[DISPATCH] Event queue closed, stopping");
                    break;
                }
                Ok(Err(e)) => {
                    tracing::error!("Error processing event queue: {}", e);
                    Some(self.config.error_backoff)
                }
                Err(payload) => {
                    tracing::error!(
                        "Error processing event queue: panic: {}",
                        panic_message(payload.as_ref())
                    );
                    Some(self.config.error_backoff)
                }
            };

            let depth = self.queue.depth();
            if depth > self.config.queue_warn_depth {
                if !warned_depth {
                    tracing::warn!("[DISPATCH] Event backlog at {} records", depth);
                    warned_depth = true;
                }
            } else {
                warned_depth = false;
            }

            match pause {
                Some(pause) => {
                    tokio::select! {
                        _ = tokio::time::sleep(pause) => {}
                        changed = shutdown.changed() => {
                            // Sender dropped: nobody can signal us anymore
                            if changed.is_err() {
                                break;
                            }
                        }
                    }
                }
                None => tokio::task::yield_now().await,
            }
        }

        tracing::debug!("[DISPATCH] Stopped");
    }

    /// Handle up to `max_batch` available records
    pub fn drain_once(&mut self) -> Result<DrainOutcome> {
        let mut handled = 0;
        while handled < self.config.max_batch {
            match self.queue.pop_if_available() {
                Some(record) => {
                    self.process(record)?;
                    handled += 1;
                }
                None if self.queue.is_closed() => {
                    return Ok(if handled == 0 {
                        DrainOutcome::Closed
                    } else {
                        DrainOutcome::Idle(handled)
                    });
                }
                None => return Ok(DrainOutcome::Idle(handled)),
            }
        }
        Ok(DrainOutcome::Saturated(handled))
    }

    fn process(&self, record: ChangeRecord) -> Result<()> {
        self.metrics.record_change(record.timestamp);

        if let Err(e) = self.aggregator.add_event(&record) {
            tracing::warn!("[DISPATCH] Context aggregator rejected {}: {}", record.filename, e);
        }

        let report = self.fanout.broadcast(&ServerMessage::FileChanged(record))?;
        tracing::debug!(
            "[DISPATCH] Broadcast to {} subscribers ({} pruned)",
            report.delivered,
            report.pruned
        );
        Ok(())
    }
}

fn panic_message(payload: &(dyn std::any::Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        s.to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "unknown panic".to_string()
    }
}
