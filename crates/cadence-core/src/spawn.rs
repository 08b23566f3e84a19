//! Queue of unborn entities waiting for their birth time.
//!
//! Entries are promoted in insertion order. An entry leaves the queue
//! exactly once: either mounted, or dropped because its mount target no
//! longer exists (reported as an orphan so the caller can record it).

use cadence_types::EntityId;
use tracing::warn;

use crate::entity::EntityRef;
use crate::scene::{SceneError, SceneGraph};

/// Errors raised when enqueueing.
#[derive(Debug, thiserror::Error)]
pub enum SpawnError {
    /// The entity is already waiting in the queue.
    #[error("entity {id} is already queued for spawn")]
    AlreadyQueued {
        /// The entity id.
        id: EntityId,
    },

    /// The entity is already born.
    #[error("entity {id} is already born")]
    AlreadyBorn {
        /// The entity id.
        id: EntityId,
    },
}

/// An unborn entity with its birth time and mount target.
#[derive(Debug, Clone)]
pub struct SpawnEntry {
    /// The entity to mount.
    pub entity: EntityRef,
    /// Simulation time at which the entity is born, in milliseconds.
    pub birth_time_ms: f64,
    /// Parent to mount under.
    pub mount_target: EntityId,
}

/// A due entry whose mount failed.
#[derive(Debug)]
pub struct OrphanedSpawn {
    /// The entry that could not be mounted.
    pub entry: SpawnEntry,
    /// Why mounting failed.
    pub error: SceneError,
}

/// Result of one [`SpawnQueue::promote_due`] pass.
#[derive(Debug, Default)]
pub struct Promotion {
    /// Entities mounted this pass, in insertion order.
    pub born: Vec<EntityRef>,
    /// Due entries that could not be mounted and were dropped.
    pub orphaned: Vec<OrphanedSpawn>,
}

/// Unborn entities tagged with birth time and mount target.
#[derive(Debug, Default)]
pub struct SpawnQueue {
    entries: Vec<SpawnEntry>,
}

impl SpawnQueue {
    /// Create an empty queue.
    pub const fn new() -> Self {
        Self {
            entries: Vec::new(),
        }
    }

    /// Queue `entity` to be born at `birth_time_ms` under `mount_target`.
    ///
    /// # Errors
    ///
    /// Returns [`SpawnError::AlreadyQueued`] if the entity is already in
    /// the queue, or [`SpawnError::AlreadyBorn`] if it has been mounted.
    pub fn enqueue(
        &mut self,
        entity: EntityRef,
        birth_time_ms: f64,
        mount_target: EntityId,
    ) -> Result<(), SpawnError> {
        if entity.is_born() {
            return Err(SpawnError::AlreadyBorn {
                id: entity.id().clone(),
            });
        }
        if self.entries.iter().any(|e| e.entity.id() == entity.id()) {
            return Err(SpawnError::AlreadyQueued {
                id: entity.id().clone(),
            });
        }
        self.entries.push(SpawnEntry {
            entity,
            birth_time_ms,
            mount_target,
        });
        Ok(())
    }

    /// Mount every entry whose birth time has arrived.
    ///
    /// Entries with `birth_time_ms <= now_ms` are removed and mounted in
    /// insertion order; the rest keep their relative order.
    pub fn promote_due(&mut self, now_ms: f64, scene: &mut dyn SceneGraph) -> Promotion {
        let (due, waiting): (Vec<_>, Vec<_>) = std::mem::take(&mut self.entries)
            .into_iter()
            .partition(|e| e.birth_time_ms <= now_ms);
        self.entries = waiting;

        let mut promotion = Promotion::default();
        for entry in due {
            match scene.mount(EntityRef::clone(&entry.entity), &entry.mount_target) {
                Ok(()) => promotion.born.push(entry.entity),
                Err(error) => {
                    warn!(
                        id = %entry.entity.id(),
                        mount_target = %entry.mount_target,
                        error = %error,
                        "Dropping spawn entry that could not be mounted"
                    );
                    promotion.orphaned.push(OrphanedSpawn { entry, error });
                }
            }
        }
        promotion
    }

    /// Remove a queued entity without mounting it.
    pub fn cancel(&mut self, id: &str) -> Option<SpawnEntry> {
        let index = self.entries.iter().position(|e| e.entity.id().as_str() == id)?;
        Some(self.entries.remove(index))
    }

    /// Whether `id` is waiting in the queue.
    pub fn contains(&self, id: &str) -> bool {
        self.entries.iter().any(|e| e.entity.id().as_str() == id)
    }

    /// Number of unborn entities.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Whether the queue is empty.
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}
