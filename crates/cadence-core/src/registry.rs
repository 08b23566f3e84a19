//! Entity registry: id, category and group lookups.
//!
//! The registry holds weak references only. The scene tree owns entity
//! lifetime; an entity dropped there reads as absent here.
//!
//! Registering an id that is already present is rejected and leaves the
//! original registration untouched. A weak reference whose entity has been
//! dropped does not count as present.

use std::collections::HashMap;
use std::sync::{Arc, Weak};

use cadence_types::{Controller, EntityId};
use tracing::{debug, warn};

use crate::entity::{Entity, EntityRef};

/// Errors raised by registry mutations.
#[derive(Debug, thiserror::Error)]
pub enum RegistryError {
    /// An entity with this id is already registered.
    #[error("entity id {id} is already registered")]
    DuplicateId {
        /// The colliding id.
        id: EntityId,
    },
}

/// id -> entity, plus secondary mappings by category and group.
#[derive(Debug, Default)]
pub struct Registry {
    by_id: HashMap<EntityId, Weak<Entity>>,
    by_category: HashMap<String, Vec<Weak<Entity>>>,
    by_group: HashMap<String, Vec<Weak<Entity>>>,
}

impl Registry {
    /// Create an empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert `entity` by id and into its category and group maps.
    ///
    /// # Errors
    ///
    /// Returns [`RegistryError::DuplicateId`] if a live entity with the
    /// same id is registered. Nothing is mutated in that case.
    pub fn register(&mut self, entity: &EntityRef) -> Result<(), RegistryError> {
        if self.lookup(entity.id().as_str()).is_some() {
            warn!(id = %entity.id(), "Rejected duplicate entity registration");
            return Err(RegistryError::DuplicateId {
                id: entity.id().clone(),
            });
        }

        let weak = Arc::downgrade(entity);
        self.by_id.insert(entity.id().clone(), weak.clone());

        if let Some(category) = entity.category() {
            let bucket = self.by_category.entry(category.to_owned()).or_default();
            bucket.retain(|w| w.strong_count() > 0);
            bucket.push(weak.clone());
        }
        for group in entity.groups() {
            let bucket = self.by_group.entry(group.clone()).or_default();
            bucket.retain(|w| w.strong_count() > 0);
            bucket.push(weak.clone());
        }

        entity.set_registered(
            true,
            entity.category().is_some(),
            !entity.groups().is_empty(),
        );
        debug!(id = %entity.id(), category = ?entity.category(), "Entity registered");
        Ok(())
    }

    /// Remove `entity` from every map it is in. No-op when absent.
    ///
    /// Only removes the id mapping if it points at this very entity, so a
    /// stale handle cannot evict a newer registration with the same id.
    pub fn unregister(&mut self, entity: &Entity) {
        let is_same = |w: &Weak<Entity>| std::ptr::eq(w.as_ptr(), entity);

        if self.by_id.get(entity.id()).is_some_and(is_same) {
            self.by_id.remove(entity.id());
        }
        if let Some(category) = entity.category() {
            if let Some(bucket) = self.by_category.get_mut(category) {
                bucket.retain(|w| !is_same(w) && w.strong_count() > 0);
                if bucket.is_empty() {
                    self.by_category.remove(category);
                }
            }
        }
        for group in entity.groups() {
            if let Some(bucket) = self.by_group.get_mut(group) {
                bucket.retain(|w| !is_same(w) && w.strong_count() > 0);
                if bucket.is_empty() {
                    self.by_group.remove(group);
                }
            }
        }
        entity.set_registered(false, false, false);
    }

    /// Entity registered under `id`, if it is still alive.
    pub fn lookup(&self, id: &str) -> Option<EntityRef> {
        self.by_id.get(id).and_then(Weak::upgrade)
    }

    /// Live entities tagged `name`, excluding those being removed.
    pub fn by_category(&self, name: &str) -> Vec<EntityRef> {
        self.by_category
            .get(name)
            .map(|bucket| {
                bucket
                    .iter()
                    .filter_map(Weak::upgrade)
                    .filter(|e| !e.is_being_removed())
                    .collect()
            })
            .unwrap_or_default()
    }

    /// Live entities in group `name`.
    pub fn by_group(&self, name: &str) -> Vec<EntityRef> {
        self.by_group
            .get(name)
            .map(|bucket| bucket.iter().filter_map(Weak::upgrade).collect())
            .unwrap_or_default()
    }

    /// Live entities in `category` currently driven by `controller`.
    pub fn count_controlled_by(&self, category: &str, controller: Controller) -> usize {
        self.by_category(category)
            .iter()
            .filter(|e| e.controller() == controller)
            .count()
    }

    /// Number of live registered entities.
    pub fn len(&self) -> usize {
        self.by_id.values().filter(|w| w.strong_count() > 0).count()
    }

    /// Whether no live entity is registered.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Id entries held, including ones whose entity has been dropped.
    pub fn tracked(&self) -> usize {
        self.by_id.len()
    }

    /// Drop map entries whose entities no longer exist. Returns the number
    /// of id entries removed.
    pub fn prune(&mut self) -> usize {
        let before = self.by_id.len();
        self.by_id.retain(|_, w| w.strong_count() > 0);
        for bucket in self.by_category.values_mut() {
            bucket.retain(|w| w.strong_count() > 0);
        }
        self.by_category.retain(|_, b| !b.is_empty());
        for bucket in self.by_group.values_mut() {
            bucket.retain(|w| w.strong_count() > 0);
        }
        self.by_group.retain(|_, b| !b.is_empty());
        before.saturating_sub(self.by_id.len())
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn duplicate_registration_keeps_first() {
        let mut reg = Registry::new();
        let first = Entity::with_id("u1").category("unit").build();
        let second = Entity::with_id("u1").category("projectile").build();

        reg.register(&first).unwrap();
        let err = reg.register(&second);
        assert!(matches!(err, Err(RegistryError::DuplicateId { ref id }) if id.as_str() == "u1"));

        let found = reg.lookup("u1").unwrap();
        assert!(Arc::ptr_eq(&found, &first));
        assert!(reg.by_category("projectile").is_empty());
        assert!(!second.is_id_registered());
        assert!(first.is_id_registered());
    }

    #[test]
    fn dropped_entity_reads_as_absent() {
        let mut reg = Registry::new();
        let e = Entity::with_id("ghost").category("unit").build();
        reg.register(&e).unwrap();
        drop(e);
        assert!(reg.lookup("ghost").is_none());
        assert!(reg.by_category("unit").is_empty());

        // The id is free again.
        let again = Entity::with_id("ghost").build();
        assert!(reg.register(&again).is_ok());
    }

    #[test]
    fn category_lookup_skips_entities_being_removed() {
        let mut reg = Registry::new();
        let a = Entity::builder()
            .category("player")
            .controller(Controller::Human)
            .build();
        let b = Entity::builder().category("player").build();
        reg.register(&a).unwrap();
        reg.register(&b).unwrap();

        b.mark_being_removed();
        let players = reg.by_category("player");
        assert_eq!(players.len(), 1);
        assert!(Arc::ptr_eq(players.first().unwrap(), &a));
    }

    #[test]
    fn counts_human_players() {
        let mut reg = Registry::new();
        let human = Entity::builder()
            .category("player")
            .controller(Controller::Human)
            .build();
        let bot = Entity::builder()
            .category("player")
            .controller(Controller::Ai)
            .build();
        reg.register(&human).unwrap();
        reg.register(&bot).unwrap();
        assert_eq!(reg.count_controlled_by("player", Controller::Human), 1);

        human.set_controller(Controller::None);
        assert_eq!(reg.count_controlled_by("player", Controller::Human), 0);
    }

    #[test]
    fn group_lookup_and_unregister() {
        let mut reg = Registry::new();
        let a = Entity::builder().group("red").group("tanks").build();
        let b = Entity::builder().group("red").build();
        reg.register(&a).unwrap();
        reg.register(&b).unwrap();
        assert_eq!(reg.by_group("red").len(), 2);
        assert_eq!(reg.by_group("tanks").len(), 1);

        reg.unregister(&a);
        assert_eq!(reg.by_group("red").len(), 1);
        assert!(reg.by_group("tanks").is_empty());
        assert!(reg.lookup(a.id().as_str()).is_none());
        assert!(!a.is_groups_registered());

        // Unregistering twice is a no-op.
        reg.unregister(&a);
        assert_eq!(reg.len(), 1);
    }

    #[test]
    fn stale_handle_does_not_evict_newer_registration() {
        let mut reg = Registry::new();
        let old = Entity::with_id("x").build();
        reg.register(&old).unwrap();
        reg.unregister(&old);
        let new = Entity::with_id("x").build();
        reg.register(&new).unwrap();

        reg.unregister(&old);
        assert!(reg.lookup("x").is_some());
    }

    #[test]
    fn prune_drops_dead_entries() {
        let mut reg = Registry::new();
        let kept = Entity::with_id("kept").category("unit").build();
        reg.register(&kept).unwrap();
        {
            let gone = Entity::with_id("gone").category("unit").group("red").build();
            reg.register(&gone).unwrap();
        }
        assert_eq!(reg.tracked(), 2);
        assert_eq!(reg.len(), 1);

        assert_eq!(reg.prune(), 1);
        assert_eq!(reg.tracked(), 1);
        assert!(reg.by_group("red").is_empty());
        assert_eq!(reg.by_category("unit").len(), 1);
        assert_eq!(reg.prune(), 0);
    }
}
