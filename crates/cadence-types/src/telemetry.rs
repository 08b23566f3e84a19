//! Telemetry records published by the scheduler every frame.
//!
//! These structs are what the observer API serves and what dashboards
//! consume, so they only hold plain data.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use ts_rs::TS;

use crate::enums::{ProcessRole, SchedulerPhase, ShutdownReason};
use crate::ids::EntityId;

/// Timing of the most recent frame that ran the game-logic tick.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize, TS)]
#[ts(export, export_to = "bindings/")]
pub struct FrameTelemetry {
    /// Monotonic frame index (every frame, including sub-cadence frames).
    pub frame: u64,
    /// Wall-clock time since the previous frame, in milliseconds.
    pub frame_delta_ms: f64,
    /// Simulation time after this frame, in milliseconds.
    pub sim_time_ms: f64,
    /// Wall-clock duration of the whole frame, in milliseconds.
    pub tick_time_ms: f64,
    /// Time spent in the update traversal, in milliseconds.
    pub update_time_ms: f64,
    /// Time spent in the render traversal, in milliseconds.
    pub render_time_ms: f64,
    /// Whether the game-logic tick fired.
    pub game_loop_fired: bool,
    /// Whether the physics tick fired.
    pub physics_fired: bool,
    /// Entities born this frame.
    pub promoted: u32,
    /// Logic frames completed during the last full second.
    pub render_fps: u32,
    /// Physics ticks completed during the last full second.
    pub physics_fps: u32,
}

/// Per-node timing collected when debug timing is enabled.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize, TS)]
#[ts(export, export_to = "bindings/")]
pub struct NodeTiming {
    /// Accumulated time spent updating this node, in milliseconds.
    pub update_total_ms: f64,
    /// Time spent updating this node during the last traversal.
    pub update_last_ms: f64,
    /// Accumulated time spent rendering this node, in milliseconds.
    pub render_total_ms: f64,
    /// Time spent rendering this node during the last traversal.
    pub render_last_ms: f64,
}

/// Noteworthy, non-fatal or fatal, condition recorded for observers.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, TS)]
#[serde(tag = "kind", rename_all = "snake_case")]
#[ts(export, export_to = "bindings/")]
pub enum TelemetryEvent {
    /// A registration collided with an existing id.
    DuplicateId {
        /// The colliding id.
        id: EntityId,
    },
    /// A snapshot older than the newest known one was dropped.
    OutOfOrderSnapshot {
        /// Timestamp of the dropped snapshot.
        timestamp: f64,
        /// Newest timestamp the pipeline had already accepted.
        newest: f64,
    },
    /// Render time ran past every buffered snapshot.
    SnapshotStarvation {
        /// Render time when starvation was detected.
        render_time: f64,
        /// Timestamp playback is holding at.
        held_at: f64,
    },
    /// A spawn entry was due but its mount target could not be found.
    OrphanedSpawn {
        /// The entity that could not be mounted.
        id: EntityId,
        /// The missing mount target.
        mount_target: EntityId,
    },
    /// Consecutive over-budget frames crossed the warning threshold.
    LagWarning {
        /// Consecutive over-budget frames so far.
        consecutive: u32,
        /// Duration of the frame that triggered the warning.
        tick_time_ms: f64,
        /// The frame budget.
        budget_ms: f64,
    },
    /// The transport failed to send a snapshot.
    TransportFailure {
        /// Error description.
        message: String,
    },
    /// The scheduler shut down.
    Shutdown {
        /// Why it shut down.
        reason: ShutdownReason,
    },
}

/// A telemetry event stamped with when it happened.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, TS)]
#[ts(export, export_to = "bindings/")]
pub struct TelemetryRecord {
    /// Frame index the event was recorded in.
    pub frame: u64,
    /// Wall-clock time of the event.
    pub at: DateTime<Utc>,
    /// The event itself.
    pub event: TelemetryEvent,
}

/// Point-in-time status of a scheduler, served by `GET /api/status`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, TS)]
#[ts(export, export_to = "bindings/")]
pub struct SchedulerStatus {
    /// Process role.
    pub role: ProcessRole,
    /// Lifecycle phase.
    pub phase: SchedulerPhase,
    /// Frames executed so far.
    pub frames: u64,
    /// Game-logic ticks fired so far.
    pub logic_ticks: u64,
    /// Physics ticks fired so far.
    pub physics_ticks: u64,
    /// Simulation time, in milliseconds.
    pub sim_time_ms: f64,
    /// Current time-scale factor.
    pub time_scale: f64,
    /// Whether simulation time is paused.
    pub paused: bool,
    /// Consecutive over-budget frames (authoritative side only).
    pub consecutive_lag: u32,
    /// Registered entities.
    pub entities: u64,
    /// Entities still waiting for their birth time.
    pub unborn: u64,
    /// Snapshots buffered ahead of render time (client side only).
    pub buffered_snapshots: u64,
    /// When the scheduler reached `Running`, if it has.
    pub started_at: Option<DateTime<Utc>>,
    /// Why the scheduler stopped, if it has.
    pub shutdown: Option<ShutdownReason>,
}
