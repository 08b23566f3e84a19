//! Clocks, cadences, entity bookkeeping and the frame loop for Cadence.
//!
//! This crate owns the multi-rate scheduler: one wall-clock frame loop
//! driving a game-logic cadence and a physics cadence, with entity birth,
//! scene traversal, snapshot streaming and client-side interpolation
//! hanging off it.
//!
//! # Modules
//!
//! - [`cadence`] -- Fixed-rate cadences with drift-compensating remainders.
//! - [`clock`] -- Wall-clock sources and the scaled, pausable simulation
//!   clock.
//! - [`config`] -- Configuration loading from `cadence-config.yaml` into
//!   strongly-typed structs.
//! - [`control`] -- [`SchedulerControl`], the shared operator handle.
//! - [`entity`] -- Entities and their registration flags.
//! - [`frame_source`] -- Injected frame scheduling.
//! - [`physics`] -- The [`Physics`] seam.
//! - [`registry`] -- Id, category and group indexes.
//! - [`runner`] -- The async frame loop.
//! - [`scene`] -- The [`SceneGraph`] seam and the default [`SceneTree`].
//! - [`scheduler`] -- The [`Scheduler`] lifecycle and per-frame algorithm.
//! - [`snapshot`] -- Client snapshot buffer and interpolation pairs.
//! - [`spawn`] -- Deferred entity birth.
//! - [`telemetry`] -- Frame telemetry, events and per-node timing.
//! - [`transport`] -- The outgoing [`Transport`] seam.
//! - [`watchdog`] -- Lag, idle, lifespan and stall supervision.
//!
//! [`SchedulerControl`]: control::SchedulerControl
//! [`Physics`]: physics::Physics
//! [`SceneGraph`]: scene::SceneGraph
//! [`SceneTree`]: scene::SceneTree
//! [`Scheduler`]: scheduler::Scheduler
//! [`Transport`]: transport::Transport

pub mod cadence;
pub mod clock;
pub mod config;
pub mod control;
pub mod entity;
pub mod frame_source;
pub mod physics;
pub mod registry;
pub mod runner;
pub mod scene;
pub mod scheduler;
pub mod snapshot;
pub mod spawn;
pub mod telemetry;
pub mod transport;
pub mod watchdog;

pub use clock::{ClockSource, ManualClock, MonotonicClock};
pub use config::EngineConfig;
pub use control::SchedulerControl;
pub use entity::{Entity, EntityRef};
pub use frame_source::FrameSource;
pub use runner::{RunResult, TickCallback, run_scheduler};
pub use scene::{Behaviour, FrameContext, SceneGraph, SceneTree};
pub use scheduler::{FrameOutcome, Scheduler, SchedulerError};
pub use transport::Transport;
