//! `WebSocket` handlers for real-time snapshot and message streaming.
//!
//! Clients connect to `GET /ws/snapshots` and receive every snapshot the
//! authoritative scheduler flushes, JSON-encoded in the wire shape
//! `{ timestamp, entities }`. `GET /ws/messages?client=<id>` streams
//! out-of-band channel messages addressed to everyone or to that client.
//!
//! If a client falls behind, lagged messages are skipped and the client
//! resumes from the most recent one. The client-side snapshot pipeline
//! tolerates the gap.

use std::sync::Arc;

use axum::extract::ws::{Message, WebSocket};
use axum::extract::{Query, State, WebSocketUpgrade};
use axum::response::IntoResponse;
use cadence_types::ClientId;
use futures::{SinkExt as _, StreamExt as _};
use serde::Serialize;
use tokio::sync::broadcast;
use tokio::sync::broadcast::error::RecvError;
use tracing::{debug, warn};

use crate::state::{AppState, ChannelMessage};

/// Query parameters for `GET /ws/messages`.
#[derive(Debug, serde::Deserialize)]
pub struct MessagesQuery {
    /// Only deliver broadcasts and messages targeted at this client.
    pub client: Option<String>,
}

/// Upgrade to a `WebSocket` streaming snapshots.
///
/// # Route
///
/// `GET /ws/snapshots`
pub async fn ws_snapshots(
    ws: WebSocketUpgrade,
    State(state): State<Arc<AppState>>,
) -> impl IntoResponse {
    let rx = state.subscribe();
    ws.on_upgrade(move |socket| forward(socket, rx, |_| true))
}

/// Upgrade to a `WebSocket` streaming channel messages.
///
/// # Route
///
/// `GET /ws/messages`
pub async fn ws_messages(
    ws: WebSocketUpgrade,
    State(state): State<Arc<AppState>>,
    Query(query): Query<MessagesQuery>,
) -> impl IntoResponse {
    let rx = state.subscribe_messages();
    let client = query.client.map(ClientId::from);
    ws.on_upgrade(move |socket| {
        forward(socket, rx, move |m: &ChannelMessage| {
            m.target.is_none() || m.target == client
        })
    })
}

/// Forward broadcast items as text frames until either side goes away.
async fn forward<T, F>(socket: WebSocket, mut rx: broadcast::Receiver<T>, mut keep: F)
where
    T: Serialize + Clone,
    F: FnMut(&T) -> bool,
{
    debug!("WebSocket client connected");
    let (mut sink, mut stream) = socket.split();

    loop {
        tokio::select! {
            result = rx.recv() => {
                match result {
                    Ok(item) => {
                        if !keep(&item) {
                            continue;
                        }
                        let json = match serde_json::to_string(&item) {
                            Ok(j) => j,
                            Err(e) => {
                                warn!("Failed to serialize broadcast item: {e}");
                                continue;
                            }
                        };
                        if sink.send(Message::Text(json.into())).await.is_err() {
                            debug!("WebSocket client disconnected (send failed)");
                            return;
                        }
                    }
                    Err(RecvError::Lagged(n)) => {
                        debug!(skipped = n, "WebSocket client lagged, skipping ahead");
                    }
                    Err(RecvError::Closed) => {
                        debug!("Broadcast channel closed, shutting down WebSocket");
                        return;
                    }
                }
            }
            msg = stream.next() => {
                match msg {
                    Some(Ok(Message::Close(_))) | None => {
                        debug!("WebSocket client disconnected");
                        return;
                    }
                    Some(Ok(Message::Ping(data))) => {
                        if sink.send(Message::Pong(data)).await.is_err() {
                            debug!("WebSocket client disconnected (pong failed)");
                            return;
                        }
                    }
                    Some(Err(e)) => {
                        debug!("WebSocket error: {e}");
                        return;
                    }
                    _ => {}
                }
            }
        }
    }
}
