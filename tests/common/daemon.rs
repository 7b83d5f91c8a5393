//! Daemon fixtures: a recording aggregator, a served daemon and client helpers

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use futures_util::{SinkExt, StreamExt};
use parking_lot::Mutex;
use serde_json::{json, Value};
use tokio::net::TcpStream;
use tokio::sync::oneshot;
use tokio::task::JoinHandle;
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::{connect_async, MaybeTlsStream, WebSocketStream};

use ghostwatch::config::DaemonConfig;
use ghostwatch::context::{AggregatorError, ContextAggregator, RecentChangesAggregator};
use ghostwatch::server::ChangeRecord;
use ghostwatch::socket_server::{serve, Daemon, Outbox};

/// How long to wait for something that should happen
pub const EVENT_TIMEOUT: Duration = Duration::from_secs(5);

/// How long to wait before concluding nothing more will arrive
pub const QUIET_PERIOD: Duration = Duration::from_millis(500);

/// Aggregator that keeps every record it is handed
#[derive(Default)]
pub struct RecordingAggregator {
    records: Mutex<Vec<ChangeRecord>>,
    inner: RecentChangesAggregator,
    /// Added to every `prepare_context` call
    prepare_delay: Duration,
}

impl RecordingAggregator {
    pub fn with_prepare_delay(prepare_delay: Duration) -> Self {
        Self {
            prepare_delay,
            ..Default::default()
        }
    }

    pub fn records(&self) -> Vec<ChangeRecord> {
        self.records.lock().clone()
    }

    pub fn filenames(&self) -> Vec<String> {
        self.records
            .lock()
            .iter()
            .map(|r| r.filename.clone())
            .collect()
    }
}

impl ContextAggregator for RecordingAggregator {
    fn add_event(&self, record: &ChangeRecord) -> Result<(), AggregatorError> {
        self.records.lock().push(record.clone());
        self.inner.add_event(record)
    }

    fn prepare_context(&self, prompt: &str, platform: &str) -> Result<String, AggregatorError> {
        std::thread::sleep(self.prepare_delay);
        self.inner.prepare_context(prompt, platform)
    }

    fn user_state(&self) -> Value {
        self.inner.user_state()
    }
}

/// Config with short timings and an ephemeral port
pub fn fast_config() -> DaemonConfig {
    DaemonConfig {
        port: 0,
        poll_interval_ms: 10,
        error_backoff_ms: 50,
        ..Default::default()
    }
}

/// Start a daemon without a listener
pub fn start_daemon() -> (Daemon, Arc<RecordingAggregator>) {
    let aggregator = Arc::new(RecordingAggregator::default());
    let daemon = Daemon::start(fast_config(), aggregator.clone());
    (daemon, aggregator)
}

/// A daemon accepting WebSocket clients on 127.0.0.1
pub struct TestServer {
    pub daemon: Daemon,
    pub addr: SocketAddr,
    pub aggregator: Arc<RecordingAggregator>,
    stop: oneshot::Sender<()>,
    server: JoinHandle<ghostwatch::Result<()>>,
}

impl TestServer {
    pub async fn start() -> Self {
        Self::start_with(fast_config(), Arc::new(RecordingAggregator::default())).await
    }

    pub async fn start_with(config: DaemonConfig, aggregator: Arc<RecordingAggregator>) -> Self {
        let daemon = Daemon::start(config, aggregator.clone());
        let listener = daemon.bind().await.expect("Failed to bind");
        let addr = listener.local_addr().expect("No local addr");
        let (stop, stopped) = oneshot::channel();
        let server = tokio::spawn(serve(daemon.state(), listener, async move {
            let _ = stopped.await;
        }));
        Self {
            daemon,
            addr,
            aggregator,
            stop,
            server,
        }
    }

    pub fn url(&self) -> String {
        format!("ws://{}", self.addr)
    }

    pub async fn shutdown(self) {
        let _ = self.stop.send(());
        self.server
            .await
            .expect("Server task panicked")
            .expect("Server failed");
        self.daemon.shutdown().await.expect("Shutdown failed");
    }
}

/// Wait for the next message on an outbox
pub async fn next_outbox_json(outbox: &mut Outbox, timeout: Duration) -> Option<Value> {
    match tokio::time::timeout(timeout, outbox.recv()).await {
        Ok(Some(text)) => Some(serde_json::from_str(&text).expect("Outbox text is not JSON")),
        _ => None,
    }
}

/// Wait until `predicate` matches a message, returning everything seen on
/// the way plus the match
pub async fn outbox_until<F>(outbox: &mut Outbox, predicate: F) -> Vec<Value>
where
    F: Fn(&Value) -> bool,
{
    let mut seen = Vec::new();
    let deadline = tokio::time::Instant::now() + EVENT_TIMEOUT;
    loop {
        let remaining = deadline.saturating_duration_since(tokio::time::Instant::now());
        let value = next_outbox_json(outbox, remaining)
            .await
            .unwrap_or_else(|| panic!("Timed out; seen so far: {:?}", seen));
        let done = predicate(&value);
        seen.push(value);
        if done {
            return seen;
        }
    }
}

/// Collect messages until the outbox stays quiet for [`QUIET_PERIOD`]
pub async fn drain_outbox(outbox: &mut Outbox) -> Vec<Value> {
    let mut seen = Vec::new();
    while let Some(value) = next_outbox_json(outbox, QUIET_PERIOD).await {
        seen.push(value);
    }
    seen
}

/// Connected WebSocket client
pub type Client = WebSocketStream<MaybeTlsStream<TcpStream>>;

pub async fn connect(url: &str) -> Client {
    let (client, _response) = connect_async(url).await.expect("Failed to connect");
    client
}

/// Next text frame as JSON
pub async fn recv_json(client: &mut Client) -> Value {
    loop {
        let msg = tokio::time::timeout(EVENT_TIMEOUT, client.next())
            .await
            .expect("Timed out waiting for message")
            .expect("Connection closed")
            .expect("WebSocket error");
        if let Message::Text(text) = msg {
            return serde_json::from_str(&text).expect("Server sent invalid JSON");
        }
    }
}

/// Skip messages until one with the given `event` tag arrives
pub async fn recv_event(client: &mut Client, event: &str) -> Value {
    loop {
        let value = recv_json(client).await;
        if value["event"] == event {
            return value;
        }
    }
}

pub async fn send_text(client: &mut Client, text: &str) {
    client
        .send(Message::Text(text.to_string()))
        .await
        .expect("Failed to send");
}

/// Send a query and wait for the response or error carrying its id
pub async fn query(client: &mut Client, id: u64, method: &str, params: Value) -> Value {
    let request = json!({"type": "query", "id": id, "method": method, "params": params});
    send_text(client, &request.to_string()).await;
    loop {
        let value = recv_json(client).await;
        let is_reply = value["event"] == "response" || value["event"] == "error";
        if is_reply && value["id"] == id {
            return value;
        }
    }
}
