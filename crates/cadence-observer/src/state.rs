//! Shared application state for the Observer API server.
//!
//! [`AppState`] holds the broadcast channels fed by the
//! [`BroadcastTransport`](crate::transport::BroadcastTransport) and an
//! in-memory [`ObserverSnapshot`] of scheduler status that the REST
//! endpoints serve. The engine refreshes the snapshot after each logic
//! frame; handlers never touch the scheduler directly.

use std::sync::Arc;

use cadence_core::control::SchedulerControl;
use cadence_types::{ClientId, FrameTelemetry, SchedulerStatus, Snapshot, TelemetryRecord};
use serde_json::Value;
use tokio::sync::{RwLock, broadcast};

/// Default capacity of the broadcast channels.
///
/// A subscriber that falls behind by more than this many messages
/// receives [`broadcast::error::RecvError::Lagged`] and skips ahead.
pub const DEFAULT_CHANNEL_CAPACITY: usize = 64;

/// Maximum telemetry records kept in the observer snapshot.
pub const MAX_EVENTS: usize = 1_000;

/// An out-of-band message sent through the transport's `send`.
#[derive(Debug, Clone, PartialEq, serde::Serialize, serde::Deserialize)]
pub struct ChannelMessage {
    /// Logical channel name.
    pub channel: String,
    /// Message body.
    pub payload: Value,
    /// Recipient, or `None` for everyone.
    pub target: Option<ClientId>,
}

/// In-memory view of the scheduler served by the REST endpoints.
#[derive(Debug, Clone, Default)]
pub struct ObserverSnapshot {
    /// Latest status, once the scheduler has published one.
    pub status: Option<SchedulerStatus>,
    /// Telemetry of the latest logic frame.
    pub telemetry: FrameTelemetry,
    /// Recorded telemetry events, oldest first, capped at [`MAX_EVENTS`].
    pub events: Vec<TelemetryRecord>,
    /// Events evicted from the scheduler's own log before publication.
    pub dropped_events: u64,
}

impl ObserverSnapshot {
    /// Append new records, evicting the oldest beyond [`MAX_EVENTS`].
    pub fn extend_events(&mut self, records: impl IntoIterator<Item = TelemetryRecord>) {
        self.events.extend(records);
        let overflow = self.events.len().saturating_sub(MAX_EVENTS);
        if overflow > 0 {
            self.events.drain(..overflow);
        }
    }
}

/// Shared state for the Axum application.
///
/// Wrapped in [`Arc`] and injected via Axum's `State` extractor.
#[derive(Clone)]
pub struct AppState {
    /// Broadcast sender for world snapshots.
    pub snapshots: broadcast::Sender<Arc<Snapshot>>,
    /// Broadcast sender for out-of-band channel messages.
    pub messages: broadcast::Sender<ChannelMessage>,
    /// The current observer snapshot (updated each logic frame).
    pub snapshot: Arc<RwLock<ObserverSnapshot>>,
    /// Shared scheduler control (present when a scheduler is attached).
    pub control: Option<Arc<SchedulerControl>>,
}

impl AppState {
    /// Create a new application state with no scheduler attached.
    pub fn new(capacity: usize) -> Self {
        let (snapshots, _) = broadcast::channel(capacity.max(1));
        let (messages, _) = broadcast::channel(capacity.max(1));
        Self {
            snapshots,
            messages,
            snapshot: Arc::new(RwLock::new(ObserverSnapshot::default())),
            control: None,
        }
    }

    /// Create a new application state with scheduler control attached.
    pub fn with_control(capacity: usize, control: Arc<SchedulerControl>) -> Self {
        Self {
            control: Some(control),
            ..Self::new(capacity)
        }
    }

    /// Subscribe to the snapshot stream.
    pub fn subscribe(&self) -> broadcast::Receiver<Arc<Snapshot>> {
        self.snapshots.subscribe()
    }

    /// Subscribe to out-of-band channel messages.
    pub fn subscribe_messages(&self) -> broadcast::Receiver<ChannelMessage> {
        self.messages.subscribe()
    }

    /// Publish a snapshot to every subscriber.
    ///
    /// Returns the number of receivers. Zero subscribers is not an error.
    pub fn broadcast(&self, snapshot: Arc<Snapshot>) -> usize {
        self.snapshots.send(snapshot).unwrap_or(0)
    }
}

impl Default for AppState {
    fn default() -> Self {
        Self::new(DEFAULT_CHANNEL_CAPACITY)
    }
}
