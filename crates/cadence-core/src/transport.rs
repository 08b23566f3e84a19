//! Outgoing network seam for the authoritative side.
//!
//! During a logic tick the scheduler queues the streamed state of every
//! entity and then calls [`Transport::send_queue`] once with the tick's
//! simulation timestamp. The transport turns the queue into a
//! [`Snapshot`] and ships it.

use std::collections::BTreeMap;

use cadence_types::{ClientId, EntityId, EntityState, Snapshot};
use serde_json::Value;

use crate::snapshot::{SnapshotError, SnapshotSender};

/// Errors raised by transports.
#[derive(Debug, thiserror::Error)]
pub enum TransportError {
    /// Nobody is listening any more.
    #[error("transport closed")]
    Closed,

    /// The payload could not be encoded.
    #[error("failed to encode payload: {source}")]
    Encode {
        /// The underlying serialization error.
        #[from]
        source: serde_json::Error,
    },

    /// The receiving pipeline rejected the snapshot.
    #[error("snapshot rejected: {source}")]
    Rejected {
        /// The underlying pipeline error.
        #[from]
        source: SnapshotError,
    },
}

/// Outgoing network interface.
pub trait Transport: Send {
    /// Send an arbitrary message on `channel`, to one client or to all.
    ///
    /// # Errors
    ///
    /// Returns [`TransportError`] if the message cannot be delivered.
    fn send(&mut self, channel: &str, payload: Value, target: Option<&ClientId>) -> Result<(), TransportError>;

    /// Queue one entity's state for the next snapshot. Later calls for the
    /// same entity replace earlier ones.
    fn queue(&mut self, id: EntityId, state: EntityState);

    /// Flush the queue as one snapshot stamped `timestamp_ms`.
    ///
    /// Returns the number of entities sent.
    ///
    /// # Errors
    ///
    /// Returns [`TransportError`] if the snapshot cannot be delivered.
    fn send_queue(&mut self, timestamp_ms: f64) -> Result<usize, TransportError>;
}

/// Pending entity states waiting for the next flush.
#[derive(Debug, Clone, Default)]
pub struct StreamQueue {
    entities: BTreeMap<EntityId, EntityState>,
}

impl StreamQueue {
    /// Create an empty queue.
    pub const fn new() -> Self {
        Self {
            entities: BTreeMap::new(),
        }
    }

    /// Queue one entity's state.
    pub fn push(&mut self, id: EntityId, state: EntityState) {
        self.entities.insert(id, state);
    }

    /// Drain the queue into a snapshot.
    pub fn take_snapshot(&mut self, timestamp_ms: f64) -> Snapshot {
        Snapshot {
            timestamp: timestamp_ms,
            entities: std::mem::take(&mut self.entities),
        }
    }

    /// Number of queued entities.
    pub fn len(&self) -> usize {
        self.entities.len()
    }

    /// Whether nothing is queued.
    pub fn is_empty(&self) -> bool {
        self.entities.is_empty()
    }
}

/// Transport that discards everything. Used when nothing listens.
#[derive(Debug, Default)]
pub struct NullTransport {
    queue: StreamQueue,
    snapshots_sent: u64,
    messages_sent: u64,
}

impl NullTransport {
    /// Create a null transport.
    pub const fn new() -> Self {
        Self {
            queue: StreamQueue::new(),
            snapshots_sent: 0,
            messages_sent: 0,
        }
    }

    /// Snapshots flushed so far.
    pub const fn snapshots_sent(&self) -> u64 {
        self.snapshots_sent
    }

    /// Messages sent so far.
    pub const fn messages_sent(&self) -> u64 {
        self.messages_sent
    }
}

impl Transport for NullTransport {
    fn send(&mut self, _channel: &str, _payload: Value, _target: Option<&ClientId>) -> Result<(), TransportError> {
        self.messages_sent = self.messages_sent.saturating_add(1);
        Ok(())
    }

    fn queue(&mut self, id: EntityId, state: EntityState) {
        self.queue.push(id, state);
    }

    fn send_queue(&mut self, timestamp_ms: f64) -> Result<usize, TransportError> {
        let snapshot = self.queue.take_snapshot(timestamp_ms);
        self.snapshots_sent = self.snapshots_sent.saturating_add(1);
        Ok(snapshot.entities.len())
    }
}

/// Transport that feeds snapshots straight into an in-process client
/// pipeline.
#[derive(Debug)]
pub struct LoopbackTransport {
    queue: StreamQueue,
    sender: SnapshotSender,
}

impl LoopbackTransport {
    /// Deliver snapshots through `sender`.
    pub const fn new(sender: SnapshotSender) -> Self {
        Self {
            queue: StreamQueue::new(),
            sender,
        }
    }
}

impl Transport for LoopbackTransport {
    fn send(&mut self, _channel: &str, _payload: Value, _target: Option<&ClientId>) -> Result<(), TransportError> {
        if self.sender.is_closed() {
            return Err(TransportError::Closed);
        }
        Ok(())
    }

    fn queue(&mut self, id: EntityId, state: EntityState) {
        self.queue.push(id, state);
    }

    fn send_queue(&mut self, timestamp_ms: f64) -> Result<usize, TransportError> {
        let snapshot = self.queue.take_snapshot(timestamp_ms);
        let sent = snapshot.entities.len();
        self.sender.push(snapshot)?;
        Ok(sent)
    }
}
