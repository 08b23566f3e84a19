//! Scene-graph seam and the default tree implementation.
//!
//! The scheduler only needs a narrow view of the scene graph: the list of
//! root nodes (so traversals can be timed per root), a way to update and
//! render one root's subtree, a way to mount newly born entities, and the
//! streamed state of entities for outgoing snapshots. That view is the
//! [`SceneGraph`] trait.
//!
//! [`SceneTree`] is the in-process implementation. It owns every mounted
//! entity and runs optional per-node [`Behaviour`]s depth first.

use std::collections::HashMap;

use cadence_types::{EntityId, EntityKind, EntityState, ProcessRole};
use tracing::debug;

use crate::entity::{Entity, EntityRef};
use crate::registry::{Registry, RegistryError};
use crate::snapshot::InterpolationFrame;

/// Errors raised by scene-graph mutations.
#[derive(Debug, thiserror::Error)]
pub enum SceneError {
    /// The mount target does not exist in the tree.
    #[error("mount target {parent} not found for entity {id}")]
    MissingParent {
        /// Entity being mounted.
        id: EntityId,
        /// Missing parent.
        parent: EntityId,
    },

    /// The entity is already part of the tree.
    #[error("entity {id} is already mounted")]
    AlreadyMounted {
        /// Entity id.
        id: EntityId,
    },

    /// The node does not exist in the tree.
    #[error("entity {id} not found in scene")]
    NotFound {
        /// Entity id.
        id: EntityId,
    },

    /// Registering the entity failed.
    #[error("registry error: {source}")]
    Registry {
        /// The underlying registry error.
        #[from]
        source: RegistryError,
    },
}

/// Per-frame data handed to every traversal.
#[derive(Debug, Clone, Copy)]
pub struct FrameContext<'a> {
    /// Frame index.
    pub frame: u64,
    /// Process role of the scheduler running the traversal.
    pub role: ProcessRole,
    /// Simulation time in milliseconds.
    pub sim_time_ms: f64,
    /// Simulation time added this frame.
    pub delta_ms: f64,
    /// Current snapshot pair (client side only).
    pub interpolation: Option<&'a InterpolationFrame>,
}

/// The scheduler's view of the scene graph.
pub trait SceneGraph: Send {
    /// Ids of the root nodes, in traversal order.
    fn roots(&self) -> Vec<EntityId>;

    /// Roots the render traversal draws through. Defaults to every root.
    fn render_roots(&self) -> Vec<EntityId> {
        self.roots()
    }

    /// Update one root and its subtree.
    fn update_node(&mut self, root: &EntityId, ctx: &FrameContext<'_>);

    /// Render one root and its subtree.
    fn render_node(&mut self, root: &EntityId, ctx: &FrameContext<'_>);

    /// Attach `entity` under `parent`.
    ///
    /// # Errors
    ///
    /// Returns [`SceneError::MissingParent`] when `parent` is not in the
    /// graph, or [`SceneError::AlreadyMounted`] when `entity` already is.
    fn mount(&mut self, entity: EntityRef, parent: &EntityId) -> Result<(), SceneError>;

    /// Streamed state of every live entity, for outgoing snapshots.
    fn stream_states(&self) -> Vec<(EntityId, EntityState)> {
        Vec::new()
    }

    /// Update every root in order.
    fn update_traversal(&mut self, ctx: &FrameContext<'_>) {
        for root in self.roots() {
            self.update_node(&root, ctx);
        }
    }

    /// Render every render root in order.
    fn render_traversal(&mut self, ctx: &FrameContext<'_>) {
        for root in self.render_roots() {
            self.render_node(&root, ctx);
        }
    }
}

/// Per-node logic run during traversals.
pub trait Behaviour: Send {
    /// Called once per update traversal.
    fn update(&mut self, _entity: &Entity, _ctx: &FrameContext<'_>) {}

    /// Called once per render traversal.
    fn render(&mut self, _entity: &Entity, _ctx: &FrameContext<'_>) {}
}

struct Node {
    entity: EntityRef,
    parent: Option<EntityId>,
    children: Vec<EntityId>,
    behaviour: Option<Box<dyn Behaviour>>,
}

impl std::fmt::Debug for Node {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Node")
            .field("entity", &self.entity.id())
            .field("parent", &self.parent)
            .field("children", &self.children)
            .field("behaviour", &self.behaviour.is_some())
            .finish()
    }
}

/// In-process scene tree owning its entities.
#[derive(Debug, Default)]
pub struct SceneTree {
    nodes: HashMap<EntityId, Node>,
    roots: Vec<EntityId>,
}

impl SceneTree {
    /// Create an empty tree.
    pub fn new() -> Self {
        Self::default()
    }

    /// Register `entity` and add it as a root.
    ///
    /// # Errors
    ///
    /// Returns [`SceneError::AlreadyMounted`] if the id is already in the
    /// tree, or [`SceneError::Registry`] if registration fails.
    pub fn add_root(&mut self, entity: EntityRef, registry: &mut Registry) -> Result<(), SceneError> {
        if self.nodes.contains_key(entity.id()) {
            return Err(SceneError::AlreadyMounted {
                id: entity.id().clone(),
            });
        }
        registry.register(&entity)?;
        entity.mark_born();
        let id = entity.id().clone();
        self.roots.push(id.clone());
        self.nodes.insert(
            id,
            Node {
                entity,
                parent: None,
                children: Vec::new(),
                behaviour: None,
            },
        );
        Ok(())
    }

    /// Attach per-node logic to a mounted entity.
    ///
    /// # Errors
    ///
    /// Returns [`SceneError::NotFound`] if the node is not in the tree.
    pub fn set_behaviour(&mut self, id: &EntityId, behaviour: Box<dyn Behaviour>) -> Result<(), SceneError> {
        let node = self
            .nodes
            .get_mut(id)
            .ok_or_else(|| SceneError::NotFound { id: id.clone() })?;
        node.behaviour = Some(behaviour);
        Ok(())
    }

    /// Tear down `id` and its subtree.
    ///
    /// Every node is flagged as being removed, unregistered and dropped
    /// from the tree. Returns the number of nodes removed (0 when `id` is
    /// not mounted).
    pub fn destroy(&mut self, id: &EntityId, registry: &mut Registry) -> usize {
        let doomed = self.subtree(id);
        if doomed.is_empty() {
            return 0;
        }

        for node_id in &doomed {
            if let Some(node) = self.nodes.get(node_id) {
                node.entity.mark_being_removed();
            }
        }

        let parent = self.nodes.get(id).and_then(|n| n.parent.clone());
        match parent {
            Some(parent) => {
                if let Some(p) = self.nodes.get_mut(&parent) {
                    p.children.retain(|c| c != id);
                }
            }
            None => self.roots.retain(|r| r != id),
        }

        let mut removed = 0_usize;
        for node_id in &doomed {
            if let Some(node) = self.nodes.remove(node_id) {
                registry.unregister(&node.entity);
                removed = removed.saturating_add(1);
            }
        }
        debug!(id = %id, removed, "Destroyed subtree");
        removed
    }

    /// Mounted entity with this id.
    pub fn get(&self, id: &str) -> Option<&EntityRef> {
        self.nodes.get(id).map(|n| &n.entity)
    }

    /// Parent of a mounted entity.
    pub fn parent(&self, id: &str) -> Option<&EntityId> {
        self.nodes.get(id).and_then(|n| n.parent.as_ref())
    }

    /// Children of a mounted entity, in mount order.
    pub fn children(&self, id: &str) -> &[EntityId] {
        self.nodes.get(id).map_or(&[], |n| n.children.as_slice())
    }

    /// Number of mounted entities.
    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    /// Whether the tree is empty.
    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    /// Ids of `id` and its descendants, depth first, parents first.
    fn subtree(&self, id: &EntityId) -> Vec<EntityId> {
        let mut out = Vec::new();
        let mut stack = vec![id.clone()];
        while let Some(next) = stack.pop() {
            if let Some(node) = self.nodes.get(&next) {
                stack.extend(node.children.iter().rev().cloned());
                out.push(next);
            }
        }
        out
    }

    fn visit(&mut self, root: &EntityId, ctx: &FrameContext<'_>, render: bool) {
        for id in self.subtree(root) {
            let Some(node) = self.nodes.get_mut(&id) else {
                continue;
            };
            if node.entity.is_being_removed() {
                continue;
            }
            if let Some(behaviour) = node.behaviour.as_mut() {
                if render {
                    behaviour.render(&node.entity, ctx);
                } else {
                    behaviour.update(&node.entity, ctx);
                }
            }
        }
    }
}

impl SceneGraph for SceneTree {
    fn roots(&self) -> Vec<EntityId> {
        self.roots.clone()
    }

    /// Viewport roots when any are mounted, otherwise every root.
    fn render_roots(&self) -> Vec<EntityId> {
        let viewports: Vec<EntityId> = self
            .roots
            .iter()
            .filter(|id| {
                self.nodes
                    .get(*id)
                    .is_some_and(|n| n.entity.kind() == EntityKind::Viewport)
            })
            .cloned()
            .collect();
        if viewports.is_empty() {
            self.roots.clone()
        } else {
            viewports
        }
    }

    fn update_node(&mut self, root: &EntityId, ctx: &FrameContext<'_>) {
        self.visit(root, ctx, false);
    }

    fn render_node(&mut self, root: &EntityId, ctx: &FrameContext<'_>) {
        self.visit(root, ctx, true);
    }

    fn mount(&mut self, entity: EntityRef, parent: &EntityId) -> Result<(), SceneError> {
        if self.nodes.contains_key(entity.id()) {
            return Err(SceneError::AlreadyMounted {
                id: entity.id().clone(),
            });
        }
        let Some(parent_node) = self.nodes.get_mut(parent) else {
            return Err(SceneError::MissingParent {
                id: entity.id().clone(),
                parent: parent.clone(),
            });
        };
        let id = entity.id().clone();
        parent_node.children.push(id.clone());
        entity.mark_born();
        self.nodes.insert(
            id,
            Node {
                entity,
                parent: Some(parent.clone()),
                children: Vec::new(),
                behaviour: None,
            },
        );
        Ok(())
    }

    fn stream_states(&self) -> Vec<(EntityId, EntityState)> {
        let mut out: Vec<_> = self
            .nodes
            .values()
            .filter(|n| n.entity.is_streamed() && !n.entity.is_being_removed())
            .map(|n| (n.entity.id().clone(), n.entity.state()))
            .collect();
        out.sort_by(|a, b| a.0.cmp(&b.0));
        out
    }
}
