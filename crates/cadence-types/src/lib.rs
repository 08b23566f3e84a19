//! Shared type definitions for the Cadence scheduler.
//!
//! This crate holds the plain data that crosses process boundaries: entity
//! identifiers, world-state snapshots, lifecycle enums and telemetry
//! records. Types flow downstream to `TypeScript` via `ts-rs` for browser
//! clients and dashboards.
//!
//! # Modules
//!
//! - [`ids`] -- String-backed identifier newtypes
//! - [`enums`] -- Roles, lifecycle phases, policies and shutdown reasons
//! - [`snapshot`] -- Snapshot wire format and per-entity state
//! - [`telemetry`] -- Frame telemetry, events and scheduler status

pub mod enums;
pub mod ids;
pub mod snapshot;
pub mod telemetry;

// Re-export all public types at crate root for convenience.
pub use enums::{Controller, EntityKind, ProcessRole, SchedulerPhase, ShutdownReason, UnderflowPolicy};
pub use ids::{ClientId, EntityId};
pub use snapshot::{EntityState, Snapshot};
pub use telemetry::{
    FrameTelemetry, NodeTiming, SchedulerStatus, TelemetryEvent, TelemetryRecord,
};

#[cfg(test)]
mod tests {
    //! `TypeScript` binding generation.

    #[test]
    fn export_bindings() {
        // ts-rs writes the bindings relative to the crate root when the
        // exported types are touched here.
        use ts_rs::TS;

        let _ = crate::ids::EntityId::export_all();
        let _ = crate::ids::ClientId::export_all();
        let _ = crate::enums::ProcessRole::export_all();
        let _ = crate::enums::SchedulerPhase::export_all();
        let _ = crate::enums::UnderflowPolicy::export_all();
        let _ = crate::enums::ShutdownReason::export_all();
        let _ = crate::snapshot::Snapshot::export_all();
        let _ = crate::telemetry::SchedulerStatus::export_all();
        let _ = crate::telemetry::TelemetryRecord::export_all();
        let _ = crate::telemetry::FrameTelemetry::export_all();
    }
}
