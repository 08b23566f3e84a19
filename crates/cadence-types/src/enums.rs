//! Enumeration types shared by the scheduler, the observer API and clients.

use serde::{Deserialize, Serialize};
use ts_rs::TS;

// ---------------------------------------------------------------------------
// Process role
// ---------------------------------------------------------------------------

/// Which side of the network a scheduler runs on.
///
/// The authoritative side owns the simulation and streams snapshots; the
/// client side plays those snapshots back through the interpolation
/// pipeline.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, TS)]
#[serde(rename_all = "snake_case")]
#[ts(export, export_to = "bindings/")]
pub enum ProcessRole {
    /// Server process: runs the watchdog and publishes snapshots.
    Authoritative,
    /// Client process: consumes snapshots and interpolates between them.
    Client,
}

// ---------------------------------------------------------------------------
// Scheduler lifecycle
// ---------------------------------------------------------------------------

/// Lifecycle phase of a scheduler.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, TS)]
#[serde(rename_all = "snake_case")]
#[ts(export, export_to = "bindings/")]
pub enum SchedulerPhase {
    /// Not running. Initial and terminal state.
    Stopped,
    /// Waiting for every start gate to pass.
    Starting,
    /// Executing frames.
    Running,
    /// A stop was requested; the in-flight frame finishes and no other runs.
    Stopping,
}

// ---------------------------------------------------------------------------
// Snapshot playback
// ---------------------------------------------------------------------------

/// What the snapshot pipeline does when render time runs past the newest
/// snapshot it holds.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize, TS)]
#[serde(rename_all = "snake_case")]
#[ts(export, export_to = "bindings/")]
pub enum UnderflowPolicy {
    /// Freeze on the newest snapshot until more data arrives.
    #[default]
    Hold,
    /// Keep the last pair and let the interpolation weight exceed 1.
    Extrapolate,
}

// ---------------------------------------------------------------------------
// Entities
// ---------------------------------------------------------------------------

/// Structural kind of a scene-graph entity, fixed when it is built.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize, TS)]
#[serde(rename_all = "snake_case")]
#[ts(export, export_to = "bindings/")]
pub enum EntityKind {
    /// A scene root that groups other nodes.
    Scene,
    /// A viewport: a top-level node the render traversal draws through.
    Viewport,
    /// Any other node.
    #[default]
    Node,
}

/// Who drives an entity. Idle detection counts [`Controller::Human`]
/// players only.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize, TS)]
#[serde(rename_all = "snake_case")]
#[ts(export, export_to = "bindings/")]
pub enum Controller {
    /// Controlled by a connected person.
    Human,
    /// Controlled by game logic.
    Ai,
    /// Not controlled at all (scenery, projectiles).
    #[default]
    None,
}

// ---------------------------------------------------------------------------
// Shutdown
// ---------------------------------------------------------------------------

/// Why a scheduler stopped for good.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, TS)]
#[serde(tag = "reason", rename_all = "snake_case")]
#[ts(export, export_to = "bindings/")]
pub enum ShutdownReason {
    /// Too many consecutive frames ran over their budget.
    LagFatal {
        /// Consecutive over-budget frames when the threshold was crossed.
        consecutive: u32,
        /// The configured fatal threshold.
        threshold: u32,
    },
    /// No human-controlled entity was present for too long.
    IdleTimeoutExceeded {
        /// How long the process had been idle, in milliseconds.
        idle_ms: f64,
        /// The configured idle timeout, in milliseconds.
        timeout_ms: f64,
    },
    /// The process outlived its maximum lifespan.
    LifespanExceeded {
        /// Process age, in milliseconds.
        age_ms: f64,
        /// Effective lifespan after the absolute ceiling was applied.
        lifespan_ms: f64,
    },
    /// An operator asked the scheduler to stop.
    OperatorStop,
    /// The frame source ran dry (fixed-step runs reaching their frame count).
    FramesExhausted,
}

impl ShutdownReason {
    /// Whether this reason comes from the watchdog's fail-fast policy.
    pub const fn is_fatal(&self) -> bool {
        matches!(
            self,
            Self::LagFatal { .. } | Self::IdleTimeoutExceeded { .. } | Self::LifespanExceeded { .. }
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn shutdown_reason_is_tagged() {
        let reason = ShutdownReason::LagFatal {
            consecutive: 101,
            threshold: 100,
        };
        let json = serde_json::to_value(&reason).ok();
        let tag = json
            .as_ref()
            .and_then(|v| v.get("reason"))
            .and_then(serde_json::Value::as_str);
        assert_eq!(tag, Some("lag_fatal"));
    }

    #[test]
    fn only_watchdog_reasons_are_fatal() {
        assert!(
            ShutdownReason::LifespanExceeded {
                age_ms: 2.0,
                lifespan_ms: 1.0
            }
            .is_fatal()
        );
        assert!(!ShutdownReason::OperatorStop.is_fatal());
        assert!(!ShutdownReason::FramesExhausted.is_fatal());
    }

    #[test]
    fn underflow_policy_parses_from_snake_case() {
        let policy: Result<UnderflowPolicy, _> = serde_json::from_str("\"extrapolate\"");
        assert_eq!(policy.ok(), Some(UnderflowPolicy::Extrapolate));
    }
}
