//! World-state snapshots streamed from the authoritative side.
//!
//! Wire shape (JSON):
//!
//! ```json
//! { "timestamp": 1200.0, "entities": { "<id>": { "attributes": { "x": 4.0 } } } }
//! ```
//!
//! Timestamps are authoritative simulation time in milliseconds.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use serde_json::Value;
use ts_rs::TS;

use crate::ids::EntityId;

/// Streamed state of a single entity.
///
/// Attributes are opaque to the scheduler. Numeric attributes can be
/// blended with [`EntityState::lerp`]; everything else is taken verbatim.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize, TS)]
#[ts(export, export_to = "bindings/")]
pub struct EntityState {
    /// Attribute name to value.
    pub attributes: BTreeMap<String, Value>,
}

impl EntityState {
    /// Create an empty state.
    pub const fn new() -> Self {
        Self {
            attributes: BTreeMap::new(),
        }
    }

    /// Builder-style attribute insertion.
    #[must_use]
    pub fn with(mut self, name: &str, value: impl Into<Value>) -> Self {
        self.attributes.insert(name.to_owned(), value.into());
        self
    }

    /// Read a numeric attribute.
    pub fn number(&self, name: &str) -> Option<f64> {
        self.attributes.get(name).and_then(Value::as_f64)
    }

    /// Blend `self` (the older state) towards `next` by `weight`.
    ///
    /// Attributes numeric on both sides are interpolated linearly; any other
    /// attribute present in `next` is copied from `next`. Attributes only
    /// `self` knows about are kept.
    pub fn lerp(&self, next: &Self, weight: f64) -> Self {
        let mut attributes = self.attributes.clone();
        for (name, to) in &next.attributes {
            let blended = match (self.attributes.get(name).and_then(Value::as_f64), to.as_f64()) {
                (Some(a), Some(b)) => serde_json::Number::from_f64((b - a).mul_add(weight, a))
                    .map_or_else(|| to.clone(), Value::Number),
                _ => to.clone(),
            };
            attributes.insert(name.clone(), blended);
        }
        Self { attributes }
    }
}

/// Immutable capture of world state at one authoritative timestamp.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize, TS)]
#[ts(export, export_to = "bindings/")]
pub struct Snapshot {
    /// Authoritative simulation time, in milliseconds.
    pub timestamp: f64,
    /// State of every streamed entity.
    pub entities: BTreeMap<EntityId, EntityState>,
}

impl Snapshot {
    /// Create an empty snapshot at `timestamp`.
    pub const fn new(timestamp: f64) -> Self {
        Self {
            timestamp,
            entities: BTreeMap::new(),
        }
    }

    /// Builder-style entity insertion.
    #[must_use]
    pub fn with_entity(mut self, id: EntityId, state: EntityState) -> Self {
        self.entities.insert(id, state);
        self
    }

    /// State of one entity, if it is part of the snapshot.
    pub fn entity(&self, id: &str) -> Option<&EntityState> {
        self.entities.get(id)
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn lerp_blends_numbers_and_copies_the_rest() {
        let a = EntityState::new().with("x", 0.0).with("anim", "idle");
        let b = EntityState::new().with("x", 10.0).with("anim", "run");
        let mid = a.lerp(&b, 0.25);
        assert!((mid.number("x").unwrap() - 2.5).abs() < 1e-9);
        assert_eq!(mid.attributes.get("anim"), Some(&Value::from("run")));
    }

    #[test]
    fn lerp_keeps_attributes_missing_from_next() {
        let a = EntityState::new().with("hp", 50);
        let b = EntityState::new().with("x", 1.0);
        let out = a.lerp(&b, 0.5);
        assert_eq!(out.number("hp"), Some(50.0));
        assert_eq!(out.number("x"), Some(1.0));
    }

    #[test]
    fn wire_shape_matches_clients() {
        let snap = Snapshot::new(100.0)
            .with_entity(EntityId::from("unit-1"), EntityState::new().with("x", 3.0));
        let json = serde_json::to_value(&snap).unwrap();
        assert_eq!(json["timestamp"], 100.0);
        assert_eq!(json["entities"]["unit-1"]["attributes"]["x"], 3.0);

        let back: Snapshot = serde_json::from_value(json).unwrap();
        assert_eq!(back, snap);
    }
}
