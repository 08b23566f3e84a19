//! Scene-graph entities.
//!
//! An [`Entity`] is shared as an [`EntityRef`] (`Arc<Entity>`). The scene
//! tree holds the owning references; the registry only keeps weak ones, so
//! an entity dropped from the tree disappears from every lookup without the
//! registry having to be told.
//!
//! Identity and tags are fixed when the entity is built. Lifecycle flags
//! are atomics so the scheduler and observers can read them through shared
//! references.

use std::sync::atomic::{AtomicBool, AtomicU8, Ordering};
use std::sync::{Arc, Mutex, PoisonError};

use cadence_types::{Controller, EntityId, EntityKind, EntityState};

/// Shared handle to an entity.
pub type EntityRef = Arc<Entity>;

/// A node of the scene graph.
#[derive(Debug)]
pub struct Entity {
    id: EntityId,
    category: Option<String>,
    groups: Vec<String>,
    kind: EntityKind,
    streamed: bool,
    controller: AtomicU8,
    being_removed: AtomicBool,
    born: AtomicBool,
    id_registered: AtomicBool,
    category_registered: AtomicBool,
    groups_registered: AtomicBool,
    state: Mutex<EntityState>,
}

impl Entity {
    /// Start building an entity with a fresh UUID v7 id.
    pub fn builder() -> EntityBuilder {
        EntityBuilder::new(EntityId::new())
    }

    /// Start building an entity with a well-known id.
    pub fn with_id(id: impl Into<EntityId>) -> EntityBuilder {
        EntityBuilder::new(id.into())
    }

    /// Unique id.
    pub const fn id(&self) -> &EntityId {
        &self.id
    }

    /// Category tag, if any.
    pub fn category(&self) -> Option<&str> {
        self.category.as_deref()
    }

    /// Group tags.
    pub fn groups(&self) -> &[String] {
        &self.groups
    }

    /// Structural kind.
    pub const fn kind(&self) -> EntityKind {
        self.kind
    }

    /// Whether the entity's state is streamed to clients.
    pub const fn is_streamed(&self) -> bool {
        self.streamed
    }

    /// Who currently drives the entity.
    pub fn controller(&self) -> Controller {
        controller_from_u8(self.controller.load(Ordering::Acquire))
    }

    /// Hand control to someone else (a player joins or leaves).
    pub fn set_controller(&self, controller: Controller) {
        self.controller
            .store(controller_to_u8(controller), Ordering::Release);
    }

    /// Whether the entity is being torn down.
    pub fn is_being_removed(&self) -> bool {
        self.being_removed.load(Ordering::Acquire)
    }

    /// Flag the entity as being torn down. Category lookups skip it from
    /// now on.
    pub fn mark_being_removed(&self) {
        self.being_removed.store(true, Ordering::Release);
    }

    /// Whether the entity has left the unborn state.
    pub fn is_born(&self) -> bool {
        self.born.load(Ordering::Acquire)
    }

    pub(crate) fn mark_born(&self) {
        self.born.store(true, Ordering::Release);
    }

    /// Whether the entity is in the id map of a registry.
    pub fn is_id_registered(&self) -> bool {
        self.id_registered.load(Ordering::Acquire)
    }

    /// Whether the entity is in the category map of a registry.
    pub fn is_category_registered(&self) -> bool {
        self.category_registered.load(Ordering::Acquire)
    }

    /// Whether the entity is in the group maps of a registry.
    pub fn is_groups_registered(&self) -> bool {
        self.groups_registered.load(Ordering::Acquire)
    }

    pub(crate) fn set_registered(&self, id: bool, category: bool, groups: bool) {
        self.id_registered.store(id, Ordering::Release);
        self.category_registered.store(category, Ordering::Release);
        self.groups_registered.store(groups, Ordering::Release);
    }

    /// Copy of the entity's current state.
    pub fn state(&self) -> EntityState {
        self.state
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    /// Mutate the entity's state in place.
    pub fn update_state<R>(&self, f: impl FnOnce(&mut EntityState) -> R) -> R {
        let mut guard = self.state.lock().unwrap_or_else(PoisonError::into_inner);
        f(&mut guard)
    }

    /// Replace the entity's state.
    pub fn set_state(&self, state: EntityState) {
        *self.state.lock().unwrap_or_else(PoisonError::into_inner) = state;
    }
}

const fn controller_to_u8(controller: Controller) -> u8 {
    match controller {
        Controller::None => 0,
        Controller::Human => 1,
        Controller::Ai => 2,
    }
}

const fn controller_from_u8(raw: u8) -> Controller {
    match raw {
        1 => Controller::Human,
        2 => Controller::Ai,
        _ => Controller::None,
    }
}

/// Builder for [`Entity`].
#[derive(Debug)]
pub struct EntityBuilder {
    id: EntityId,
    category: Option<String>,
    groups: Vec<String>,
    kind: EntityKind,
    controller: Controller,
    streamed: bool,
    state: EntityState,
}

impl EntityBuilder {
    fn new(id: EntityId) -> Self {
        Self {
            id,
            category: None,
            groups: Vec::new(),
            kind: EntityKind::Node,
            controller: Controller::None,
            streamed: false,
            state: EntityState::new(),
        }
    }

    /// Set the category tag.
    #[must_use]
    pub fn category(mut self, category: &str) -> Self {
        self.category = Some(category.to_owned());
        self
    }

    /// Add a group tag. Duplicate tags are ignored.
    #[must_use]
    pub fn group(mut self, group: &str) -> Self {
        if !self.groups.iter().any(|g| g == group) {
            self.groups.push(group.to_owned());
        }
        self
    }

    /// Set the structural kind.
    #[must_use]
    pub const fn kind(mut self, kind: EntityKind) -> Self {
        self.kind = kind;
        self
    }

    /// Set the initial controller.
    #[must_use]
    pub const fn controller(mut self, controller: Controller) -> Self {
        self.controller = controller;
        self
    }

    /// Include the entity in outgoing snapshots.
    #[must_use]
    pub const fn streamed(mut self, streamed: bool) -> Self {
        self.streamed = streamed;
        self
    }

    /// Set the initial state.
    #[must_use]
    pub fn state(mut self, state: EntityState) -> Self {
        self.state = state;
        self
    }

    /// Finish building.
    pub fn build(self) -> EntityRef {
        Arc::new(Entity {
            id: self.id,
            category: self.category,
            groups: self.groups,
            kind: self.kind,
            streamed: self.streamed,
            controller: AtomicU8::new(controller_to_u8(self.controller)),
            being_removed: AtomicBool::new(false),
            born: AtomicBool::new(false),
            id_registered: AtomicBool::new(false),
            category_registered: AtomicBool::new(false),
            groups_registered: AtomicBool::new(false),
            state: Mutex::new(self.state),
        })
    }
}
