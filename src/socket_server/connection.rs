//! WebSocket connection handler
//!
//! Each client is registered as a subscriber for the lifetime of its
//! connection. The connection task forwards broadcasts from the client's
//! outbox to the socket. Queries run on their own tasks and hand their
//! replies back over a per-connection channel, so the outbox keeps draining
//! while a slow `watch` or `prepare_context` is in flight.

use std::sync::Arc;

use futures_util::{SinkExt, StreamExt};
use tokio::net::TcpStream;
use tokio::sync::mpsc;
use tokio_tungstenite::{accept_async, tungstenite::Message, WebSocketStream};

use crate::error::{DaemonError, Result};
use crate::socket_server::daemon::DaemonState;
use crate::socket_server::fanout::{Outbox, SubscriberId};
use crate::socket_server::protocol::{
    ClientMessage, PathParams, PrepareContextParams, ServerMessage,
};

/// Handle a single WebSocket connection
pub async fn handle_connection(stream: TcpStream, state: Arc<DaemonState>) {
    let addr = stream.peer_addr().ok();

    let ws_stream = match accept_async(stream).await {
        Ok(ws) => ws,
        Err(e) => {
            tracing::error!("WebSocket handshake failed: {}", e);
            return;
        }
    };

    let (subscriber_id, outbox) = state.subscribers().register(addr);
    tracing::info!("Client {} connected from {:?}", subscriber_id, addr);

    let (reply_tx, replies) = mpsc::unbounded_channel();
    let mut conn = ConnectionState {
        ws: ws_stream,
        state,
        subscriber_id,
        outbox,
        reply_tx,
        replies,
    };
    conn.run().await;

    tracing::info!("Connection closed from {:?}", addr);
}

/// State for a single connection
struct ConnectionState {
    ws: WebSocketStream<TcpStream>,
    state: Arc<DaemonState>,
    subscriber_id: SubscriberId,
    outbox: Outbox,
    /// Handed to query tasks
    reply_tx: mpsc::UnboundedSender<ServerMessage>,
    replies: mpsc::UnboundedReceiver<ServerMessage>,
}

impl ConnectionState {
    async fn run(&mut self) {
        let greeting = self.state.connected_message();
        if let Err(e) = self.send(&greeting).await {
            tracing::debug!("Client {} gone before greeting: {}", self.subscriber_id, e);
            self.cleanup();
            return;
        }

        loop {
            tokio::select! {
                msg = self.ws.next() => {
                    match msg {
                        Some(Ok(Message::Text(text))) => {
                            if let Err(e) = self.handle_text(&text).await {
                                tracing::debug!("Client {} send failed: {}", self.subscriber_id, e);
                                break;
                            }
                        }
                        Some(Ok(Message::Close(_))) => {
                            tracing::info!("Client {} requested close", self.subscriber_id);
                            break;
                        }
                        Some(Ok(Message::Ping(data))) => {
                            let _ = self.ws.send(Message::Pong(data)).await;
                        }
                        Some(Err(e)) => {
                            tracing::error!("WebSocket error: {}", e);
                            break;
                        }
                        None => break,
                        _ => {}
                    }
                }

                pushed = self.outbox.recv() => {
                    match pushed {
                        Some(text) => {
                            if let Err(e) = self.ws.send(Message::Text(text.to_string())).await {
                                tracing::debug!("Client {} push failed: {}", self.subscriber_id, e);
                                break;
                            }
                        }
                        None => {
                            // Pruned by a broadcast or dropped on shutdown
                            let _ = self.ws.close(None).await;
                            break;
                        }
                    }
                }

                // Never `None`: the connection holds a sender
                Some(reply) = self.replies.recv() => {
                    if let Err(e) = self.send(&reply).await {
                        tracing::debug!("Client {} reply failed: {}", self.subscriber_id, e);
                        break;
                    }
                }
            }
        }

        self.cleanup();
    }

    /// Handle one text frame. Only a failed send is returned; queries are
    /// answered later through `replies`.
    async fn handle_text(&mut self, text: &str) -> Result<()> {
        if text.trim() == "ping" {
            return self.send(&ServerMessage::Pong).await;
        }

        let msg: ClientMessage = match serde_json::from_str(text) {
            Ok(msg) => msg,
            Err(e) => {
                tracing::debug!("Ignoring message from {}: {}", self.subscriber_id, e);
                return Ok(());
            }
        };

        match msg {
            ClientMessage::Query { id, method, params } => {
                let state = Arc::clone(&self.state);
                let reply_tx = self.reply_tx.clone();
                let subscriber_id = self.subscriber_id.clone();
                tokio::spawn(async move {
                    let reply = answer_query(&state, id, &method, params).await;
                    if reply_tx.send(reply).is_err() {
                        tracing::debug!(
                            "Client {} left before query {} finished",
                            subscriber_id,
                            id
                        );
                    }
                });
                Ok(())
            }
            ClientMessage::Ping => self.send(&ServerMessage::Pong).await,
        }
    }

    async fn send(&mut self, msg: &ServerMessage) -> Result<()> {
        let json = serde_json::to_string(msg)?;
        self.ws
            .send(Message::Text(json))
            .await
            .map_err(|e| DaemonError::Delivery {
                subscriber: self.subscriber_id.to_string(),
                reason: e.to_string(),
            })
    }

    fn cleanup(&mut self) {
        if self.state.subscribers().unregister(&self.subscriber_id) {
            tracing::debug!("Client {} unregistered", self.subscriber_id);
        }
    }
}

/// Run a query and wrap its outcome in the reply envelope
async fn answer_query(
    state: &DaemonState,
    id: u64,
    method: &str,
    params: serde_json::Value,
) -> ServerMessage {
    match handle_query(state, method, params).await {
        Ok(result) => ServerMessage::Response { id, result },
        Err(e) => {
            tracing::debug!("Query {} ({}) failed: {}", id, method, e);
            ServerMessage::Error {
                id: Some(id),
                code: e.error_code().to_string(),
                message: e.to_string(),
            }
        }
    }
}

/// Run one query method against the daemon state
async fn handle_query(
    state: &DaemonState,
    method: &str,
    params: serde_json::Value,
) -> Result<serde_json::Value> {
    match method {
        "watch" => {
            let PathParams { path } = parse_params(params)?;
            let outcome = state.watch_project(path).await?;
            Ok(serde_json::to_value(outcome)?)
        }

        "unwatch" => {
            let PathParams { path } = parse_params(params)?;
            let outcome = state.unwatch_project(path).await?;
            Ok(serde_json::to_value(outcome)?)
        }

        "metrics" => Ok(serde_json::to_value(state.metrics_report())?),

        "health" => Ok(serde_json::to_value(state.health_report())?),

        "prepare_context" => {
            let params: PrepareContextParams = parse_params(params)?;
            let report = state
                .prepare_context(params.user_prompt, params.ai_platform)
                .await?;
            Ok(serde_json::to_value(report)?)
        }

        "list_projects" => Ok(serde_json::json!({
            "projects": state.list_projects(),
        })),

        _ => Err(DaemonError::UnknownMethod {
            method: method.to_string(),
        }),
    }
}

fn parse_params<T: serde::de::DeserializeOwned>(params: serde_json::Value) -> Result<T> {
    serde_json::from_value(params).map_err(|e| DaemonError::InvalidParams {
        message: e.to_string(),
    })
}
