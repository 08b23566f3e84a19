//! Snapshot transport backed by the observer's broadcast channels.
//!
//! The authoritative scheduler queues entity state during a logic tick and
//! flushes it once; [`BroadcastTransport`] fans the resulting snapshot out
//! to every `WebSocket` subscriber and to any in-process loopback client.

use std::sync::Arc;

use cadence_core::transport::{StreamQueue, Transport, TransportError};
use cadence_types::{ClientId, EntityId, EntityState};
use serde_json::Value;
use tracing::trace;

use crate::state::{AppState, ChannelMessage};

/// [`Transport`] publishing through an [`AppState`].
#[derive(Clone)]
pub struct BroadcastTransport {
    state: Arc<AppState>,
    queue: StreamQueue,
}

impl BroadcastTransport {
    /// Publish through `state`'s channels.
    pub const fn new(state: Arc<AppState>) -> Self {
        Self {
            state,
            queue: StreamQueue::new(),
        }
    }
}

impl Transport for BroadcastTransport {
    fn send(&mut self, channel: &str, payload: Value, target: Option<&ClientId>) -> Result<(), TransportError> {
        let message = ChannelMessage {
            channel: channel.to_owned(),
            payload,
            target: target.cloned(),
        };
        // Err only means nobody is subscribed.
        let receivers = self.state.messages.send(message).unwrap_or(0);
        trace!(channel, receivers, "Channel message sent");
        Ok(())
    }

    fn queue(&mut self, id: EntityId, state: EntityState) {
        self.queue.push(id, state);
    }

    fn send_queue(&mut self, timestamp_ms: f64) -> Result<usize, TransportError> {
        let snapshot = self.queue.take_snapshot(timestamp_ms);
        let sent = snapshot.entities.len();
        let receivers = self.state.broadcast(Arc::new(snapshot));
        trace!(timestamp_ms, entities = sent, receivers, "Snapshot broadcast");
        Ok(sent)
    }
}
