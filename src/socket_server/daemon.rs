//! Daemon assembly: shared state, the dispatch task and the accept loop.

use std::future::Future;
use std::path::PathBuf;
use std::sync::Arc;

use chrono::Utc;
use tokio::net::TcpListener;
use tokio::sync::watch;
use tokio::task::JoinHandle;

use crate::config::DaemonConfig;
use crate::context::ContextAggregator;
use crate::error::Result;
use crate::server::dispatch::Dispatcher;
use crate::server::metrics::{format_uptime, Metrics};
use crate::server::queue::{event_queue, EventSender};
use crate::server::registry::{ProjectInfo, UnwatchOutcome, WatchOutcome, WatchRegistry};
use crate::socket_server::connection::handle_connection;
use crate::socket_server::fanout::SubscriberRegistry;
use crate::socket_server::protocol::{ContextReport, HealthReport, MetricsReport, ServerMessage};

/// State shared by every connection task
pub struct DaemonState {
    config: DaemonConfig,
    watches: Arc<WatchRegistry>,
    subscribers: Arc<SubscriberRegistry>,
    metrics: Arc<Metrics>,
    aggregator: Arc<dyn ContextAggregator>,
    /// Kept for reporting queue depth
    queue: EventSender,
}

impl DaemonState {
    pub fn watches(&self) -> &Arc<WatchRegistry> {
        &self.watches
    }

    pub fn subscribers(&self) -> &Arc<SubscriberRegistry> {
        &self.subscribers
    }

    pub fn metrics(&self) -> &Arc<Metrics> {
        &self.metrics
    }

    /// Start watching a project and announce it to every subscriber
    pub async fn watch_project(&self, path: PathBuf) -> Result<WatchOutcome> {
        let watches = Arc::clone(&self.watches);
        let outcome = tokio::task::spawn_blocking(move || watches.watch(&path)).await??;

        if let WatchOutcome::Watching { path, files } = &outcome {
            let announce = ServerMessage::ProjectAdded {
                path: path.clone(),
                files: *files,
                timestamp: Utc::now(),
            };
            if let Err(e) = self.subscribers.broadcast(&announce) {
                tracing::warn!("Failed to announce {}: {}", path.display(), e);
            }
        }
        Ok(outcome)
    }

    pub async fn unwatch_project(&self, path: PathBuf) -> Result<UnwatchOutcome> {
        let watches = Arc::clone(&self.watches);
        Ok(tokio::task::spawn_blocking(move || watches.unwatch(&path)).await?)
    }

    pub fn list_projects(&self) -> Vec<ProjectInfo> {
        self.watches.project_info()
    }

    pub fn metrics_report(&self) -> MetricsReport {
        let projects_list = self.watches.projects();
        MetricsReport {
            metrics: self.metrics.snapshot(),
            watched_projects: projects_list.len(),
            active_connections: self.subscribers.len(),
            projects_list,
            queue_depth: self.queue.depth(),
        }
    }

    pub fn health_report(&self) -> HealthReport {
        let metrics = self.metrics.snapshot();
        let uptime = metrics.uptime(Utc::now());
        HealthReport {
            status: "alive".to_string(),
            version: env!("CARGO_PKG_VERSION").to_string(),
            uptime_seconds: uptime.as_secs_f64(),
            uptime_human: format_uptime(uptime),
            watched_projects: self.watches.len(),
            active_connections: self.subscribers.len(),
            metrics,
        }
    }

    /// Ask the aggregator for a context payload.
    ///
    /// Aggregator failures are reported in the result, not raised.
    /// `contexts_served` only counts successes.
    pub async fn prepare_context(&self, prompt: String, platform: String) -> Result<ContextReport> {
        let aggregator = Arc::clone(&self.aggregator);
        let platform_for_task = platform.clone();
        let prepared = tokio::task::spawn_blocking(move || {
            aggregator.prepare_context(&prompt, &platform_for_task)
        })
        .await?;

        Ok(match prepared {
            Ok(context) => {
                self.metrics.record_context_served();
                ContextReport::Success {
                    length: context.len(),
                    context,
                    platform,
                    user_state: self.aggregator.user_state(),
                }
            }
            Err(e) => {
                tracing::warn!("Context preparation failed: {}", e);
                ContextReport::Error {
                    error: e.to_string(),
                }
            }
        })
    }

    /// Greeting sent as the first message on a new connection
    pub fn connected_message(&self) -> ServerMessage {
        ServerMessage::Connected {
            message: "Connected to ghostwatch daemon".to_string(),
            watched_projects: self.watches.projects(),
            metrics: self.metrics.snapshot(),
        }
    }
}

/// A running daemon: shared state plus the dispatch task
pub struct Daemon {
    state: Arc<DaemonState>,
    shutdown_tx: watch::Sender<bool>,
    dispatcher: Option<JoinHandle<()>>,
}

impl Daemon {
    /// Build the pipeline and spawn the dispatch loop.
    ///
    /// Must be called from within a tokio runtime.
    pub fn start(config: DaemonConfig, aggregator: Arc<dyn ContextAggregator>) -> Self {
        let (queue_tx, queue_rx) = event_queue();
        let metrics = Arc::new(Metrics::new());
        let subscribers = Arc::new(SubscriberRegistry::new(config.subscriber_buffer));
        let watches = Arc::new(WatchRegistry::new(queue_tx.clone(), Arc::clone(&metrics)));

        let dispatcher = Dispatcher::new(
            queue_rx,
            Arc::clone(&aggregator),
            Arc::clone(&subscribers),
            Arc::clone(&metrics),
            config.dispatch_config(),
        );
        let (shutdown_tx, shutdown_rx) = watch::channel(false);
        let handle = tokio::spawn(dispatcher.run(shutdown_rx));

        let state = Arc::new(DaemonState {
            config,
            watches,
            subscribers,
            metrics,
            aggregator,
            queue: queue_tx,
        });

        Self {
            state,
            shutdown_tx,
            dispatcher: Some(handle),
        }
    }

    pub fn state(&self) -> Arc<DaemonState> {
        Arc::clone(&self.state)
    }

    /// Watch each project, logging failures. Returns how many started.
    pub async fn auto_watch(&self, projects: &[PathBuf]) -> usize {
        let mut started = 0;
        for project in projects {
            match self.state.watch_project(project.clone()).await {
                Ok(WatchOutcome::Watching { .. }) => started += 1,
                Ok(WatchOutcome::AlreadyWatching { .. }) => {}
                Err(e) => tracing::warn!("Could not watch {}: {}", project.display(), e),
            }
        }
        started
    }

    /// Bind the configured address
    pub async fn bind(&self) -> Result<TcpListener> {
        let addr = self.state.config.addr()?;
        Ok(TcpListener::bind(addr).await?)
    }

    /// Stop every watch source, then the dispatcher, then drop all clients.
    ///
    /// Watch requests still arriving from open connections are refused with
    /// `ShuttingDown` once the sources are stopped.
    pub async fn shutdown(mut self) -> Result<()> {
        let stopped = self.state.watches.stop_all();
        tracing::info!("Stopped {} watch sources", stopped);

        // Receiver may already be gone if the queue closed
        let _ = self.shutdown_tx.send(true);
        if let Some(handle) = self.dispatcher.take() {
            handle.await?;
        }

        let closed = self.state.subscribers.close_all();
        tracing::info!("Closed {} client connections", closed);
        Ok(())
    }
}

/// Accept WebSocket clients until `shutdown` resolves
pub async fn serve<F>(state: Arc<DaemonState>, listener: TcpListener, shutdown: F) -> Result<()>
where
    F: Future<Output = ()>,
{
    let local = listener.local_addr()?;
    tracing::info!("ghostwatch daemon listening on ws://{}", local);

    tokio::pin!(shutdown);
    loop {
        tokio::select! {
            accepted = listener.accept() => match accepted {
                Ok((stream, addr)) => {
                    tracing::info!("Accepted connection from {}", addr);
                    let state = Arc::clone(&state);
                    tokio::spawn(async move {
                        handle_connection(stream, state).await;
                    });
                }
                Err(e) => {
                    tracing::error!("Failed to accept connection: {}", e);
                }
            },
            _ = &mut shutdown => {
                tracing::info!("Shutting down listener on {}", local);
                break;
            }
        }
    }
    Ok(())
}

impl std::fmt::Debug for DaemonState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DaemonState")
            .field("config", &self.config)
            .field("watches", &self.watches)
            .field("subscribers", &self.subscribers.len())
            .finish()
    }
}
