//! The multi-rate tick scheduler.
//!
//! One [`Scheduler`] per process role owns the simulation clock, both
//! cadences, the entity registry, the spawn queue, the scene graph and its
//! collaborators. There is no global engine: everything a frame touches is
//! reachable from `&mut self`.
//!
//! # Lifecycle
//!
//! ```text
//! Stopped --start()--> Starting --gates pass--> Running
//!    ^                    |                        |
//!    +----gate timeout----+                        |
//!    +----------stop()--------------------------- -+
//!    +--Stopping <--control stop / watchdog fatal--+
//! ```
//!
//! # Frame
//!
//! Each [`Scheduler::step_frame`] call:
//!
//! 1. measures the frame delta and advances simulation (and render) time;
//! 2. polls the game-logic cadence;
//! 3. fires physics if the logic tick fired or its own cadence is due;
//! 4. on the client, advances the snapshot pipeline to render time;
//! 5. if the logic tick did not fire, stops here;
//! 6. promotes due spawns, runs the update and render traversals, records
//!    telemetry and, on the authoritative side, flushes one snapshot.
//!
//! The watchdog judges every frame's duration and checks liveness on logic
//! frames. Physics firing whenever logic fires keeps streamed positions
//! fresh even when the physics cadence was not due yet.

use std::sync::Arc;
use std::time::Duration;

use cadence_types::{
    ClientId, Controller, EntityId, FrameTelemetry, ProcessRole, SchedulerPhase, SchedulerStatus,
    ShutdownReason, TelemetryEvent,
};
use chrono::{DateTime, Utc};
use serde_json::Value;
use tracing::{debug, error, info, warn};

use crate::cadence::{Cadence, CadenceError};
use crate::clock::{ClockError, ClockSource, FrameTime, SimulationClock};
use crate::config::{ConfigError, EngineConfig, SchedulerConfig};
use crate::control::SchedulerControl;
use crate::entity::EntityRef;
use crate::physics::Physics;
use crate::registry::{Registry, RegistryError};
use crate::scene::{FrameContext, SceneError, SceneGraph, SceneTree};
use crate::snapshot::{InterpolationFrame, SnapshotError, SnapshotPipeline, SnapshotSender};
use crate::spawn::{SpawnError, SpawnQueue};
use crate::telemetry::TelemetryRecorder;
use crate::transport::{NullTransport, Transport};
use crate::watchdog::{Heartbeat, LagVerdict, Watchdog};

/// Errors raised by the scheduler.
#[derive(Debug, thiserror::Error)]
pub enum SchedulerError {
    /// Start gates did not all pass within the dependency timeout.
    #[error("startup timed out after {waited_ms} ms waiting for {pending:?}")]
    StartupTimeout {
        /// How long the scheduler waited.
        waited_ms: u64,
        /// Gates that were still not ready.
        pending: Vec<String>,
    },

    /// The operation is not allowed in the current phase.
    #[error("cannot {action} while {phase:?}")]
    InvalidPhase {
        /// Phase the scheduler was in.
        phase: SchedulerPhase,
        /// What was attempted.
        action: &'static str,
    },

    /// The configuration was rejected.
    #[error("config error: {source}")]
    Config {
        /// The underlying config error.
        #[from]
        source: ConfigError,
    },

    /// A cadence could not be built.
    #[error("cadence error: {source}")]
    Cadence {
        /// The underlying cadence error.
        #[from]
        source: CadenceError,
    },

    /// The time scale was rejected.
    #[error("clock error: {source}")]
    Clock {
        /// The underlying clock error.
        #[from]
        source: ClockError,
    },

    /// Registration failed.
    #[error("registry error: {source}")]
    Registry {
        /// The underlying registry error.
        #[from]
        source: RegistryError,
    },

    /// Spawn queueing failed.
    #[error("spawn error: {source}")]
    Spawn {
        /// The underlying spawn error.
        #[from]
        source: SpawnError,
    },

    /// A scene-graph mutation failed.
    #[error("scene error: {source}")]
    Scene {
        /// The underlying scene error.
        #[from]
        source: SceneError,
    },
}

/// Logic ticks between sweeps of dropped entities out of the registry.
const REGISTRY_PRUNE_TICKS: u64 = 100;

// ---------------------------------------------------------------------------
// Start gates
// ---------------------------------------------------------------------------

/// A dependency that must be ready before the scheduler runs.
pub trait StartGate: Send {
    /// Name used in logs and timeout errors.
    fn name(&self) -> &str;

    /// Whether the dependency is ready. Polled until it returns `true`.
    fn is_ready(&mut self) -> bool;
}

/// A [`StartGate`] backed by a closure.
pub struct FnGate<F> {
    name: String,
    check: F,
}

impl<F: FnMut() -> bool + Send> FnGate<F> {
    /// Wrap `check` as a gate called `name`.
    pub fn new(name: &str, check: F) -> Self {
        Self {
            name: name.to_owned(),
            check,
        }
    }
}

impl<F: FnMut() -> bool + Send> StartGate for FnGate<F> {
    fn name(&self) -> &str {
        &self.name
    }

    fn is_ready(&mut self) -> bool {
        (self.check)()
    }
}

/// A recorded lifecycle transition.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PhaseTransition {
    /// Phase left.
    pub from: SchedulerPhase,
    /// Phase entered.
    pub to: SchedulerPhase,
    /// Wall-clock time of the transition, in milliseconds.
    pub at_ms: f64,
}

/// What a frame did.
#[derive(Debug, Clone, PartialEq)]
pub enum FrameOutcome {
    /// The logic tick did not fire; only time, physics and playback moved.
    Idle,
    /// The logic tick fired and the frame ran to completion.
    Ticked(FrameTelemetry),
    /// The scheduler shut down during or before this frame.
    Shutdown(ShutdownReason),
}

// ---------------------------------------------------------------------------
// Scheduler
// ---------------------------------------------------------------------------

/// The central tick scheduler.
pub struct Scheduler<S: SceneGraph = SceneTree> {
    role: ProcessRole,
    config: SchedulerConfig,
    player_category: String,
    phase: SchedulerPhase,
    transitions: Vec<PhaseTransition>,
    wall: Arc<dyn ClockSource>,
    clock: SimulationClock,
    game_loop: Cadence,
    physics_cadence: Cadence,
    registry: Registry,
    spawn_queue: SpawnQueue,
    scene: S,
    physics: Option<Box<dyn Physics>>,
    transport: Box<dyn Transport>,
    pipeline: Option<SnapshotPipeline>,
    snapshot_sender: Option<SnapshotSender>,
    interpolation: InterpolationFrame,
    watchdog: Option<Watchdog>,
    telemetry: TelemetryRecorder,
    control: Arc<SchedulerControl>,
    heartbeat: Arc<Heartbeat>,
    gates: Vec<Box<dyn StartGate>>,
    frame: u64,
    logic_ticks: u64,
    physics_ticks: u64,
    started_at: Option<DateTime<Utc>>,
    shutdown: Option<ShutdownReason>,
}

impl<S: SceneGraph> std::fmt::Debug for Scheduler<S> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Scheduler")
            .field("role", &self.role)
            .field("phase", &self.phase)
            .field("frame", &self.frame)
            .field("sim_time_ms", &self.clock.sim_time_ms())
            .finish_non_exhaustive()
    }
}

impl<S: SceneGraph> Scheduler<S> {
    /// Build a scheduler for `role`.
    ///
    /// The configuration is validated here, once. The authoritative role
    /// gets a watchdog; the client role gets a snapshot pipeline whose
    /// sender is available from [`snapshot_sender`](Self::snapshot_sender).
    ///
    /// # Errors
    ///
    /// Returns [`SchedulerError::Config`] for an invalid configuration.
    pub fn new(
        config: &EngineConfig,
        role: ProcessRole,
        scene: S,
        wall: Arc<dyn ClockSource>,
    ) -> Result<Self, SchedulerError> {
        config.validate()?;
        let sched = &config.scheduler;

        let game_loop = Cadence::new("game_loop", f64::from(sched.game_loop_tick_rate))?;
        let physics_cadence = Cadence::new("physics", f64::from(sched.physics_tick_rate))?;

        let mut clock = SimulationClock::new(match role {
            ProcessRole::Client => config.interpolation.render_delay_ms,
            ProcessRole::Authoritative => 0.0,
        });
        clock.set_time_scale(sched.time_scale)?;
        let control = Arc::new(SchedulerControl::new(sched.time_scale)?);

        let (pipeline, snapshot_sender) = match role {
            ProcessRole::Client => {
                let (tx, pipeline) =
                    SnapshotPipeline::channel(config.interpolation.underflow_policy);
                (Some(pipeline), Some(tx))
            }
            ProcessRole::Authoritative => (None, None),
        };
        let watchdog = match role {
            ProcessRole::Authoritative => {
                Some(Watchdog::new(&config.watchdog, sched.frame_budget_ms()))
            }
            ProcessRole::Client => None,
        };

        Ok(Self {
            role,
            config: sched.clone(),
            player_category: config.watchdog.player_category.clone(),
            phase: SchedulerPhase::Stopped,
            transitions: Vec::new(),
            wall,
            clock,
            game_loop,
            physics_cadence,
            registry: Registry::new(),
            spawn_queue: SpawnQueue::new(),
            scene,
            physics: None,
            transport: Box::new(NullTransport::new()),
            pipeline,
            snapshot_sender,
            interpolation: InterpolationFrame::default(),
            watchdog,
            telemetry: TelemetryRecorder::new(sched.telemetry_event_capacity, sched.debug_timing),
            control,
            heartbeat: Arc::new(Heartbeat::new()),
            gates: Vec::new(),
            frame: 0,
            logic_ticks: 0,
            physics_ticks: 0,
            started_at: None,
            shutdown: None,
        })
    }

    /// Attach a physics engine.
    #[must_use]
    pub fn with_physics(mut self, physics: Box<dyn Physics>) -> Self {
        self.physics = Some(physics);
        self
    }

    /// Replace the outgoing transport.
    #[must_use]
    pub fn with_transport(mut self, transport: Box<dyn Transport>) -> Self {
        self.transport = transport;
        self
    }

    /// Add a start gate.
    #[must_use]
    pub fn with_gate(mut self, gate: Box<dyn StartGate>) -> Self {
        self.gates.push(gate);
        self
    }

    // -----------------------------------------------------------------------
    // Lifecycle
    // -----------------------------------------------------------------------

    /// Move to `Starting` and poll start gates until all pass.
    ///
    /// Gates are polled every `dependency_poll_interval_ms`. Once all pass
    /// the scheduler enters `Running`: simulation time and cadences restart
    /// from zero. Calling `start` while already running is a no-op.
    ///
    /// # Errors
    ///
    /// Returns [`SchedulerError::StartupTimeout`] if the gates do not pass
    /// within `dependency_timeout_ms`; the scheduler is back in `Stopped`.
    /// Returns [`SchedulerError::InvalidPhase`] when called while starting
    /// or stopping.
    pub async fn start(&mut self) -> Result<(), SchedulerError> {
        match self.phase {
            SchedulerPhase::Running => return Ok(()),
            SchedulerPhase::Stopped => {}
            phase => {
                return Err(SchedulerError::InvalidPhase {
                    phase,
                    action: "start",
                });
            }
        }

        self.transition(SchedulerPhase::Starting);
        let poll = Duration::from_millis(self.config.dependency_poll_interval_ms);
        let timeout = Duration::from_millis(self.config.dependency_timeout_ms);
        let began = tokio::time::Instant::now();

        loop {
            let pending: Vec<String> = self
                .gates
                .iter_mut()
                .filter_map(|g| (!g.is_ready()).then(|| g.name().to_owned()))
                .collect();
            if pending.is_empty() {
                break;
            }

            let waited = began.elapsed();
            if waited >= timeout {
                let waited_ms = u64::try_from(waited.as_millis()).unwrap_or(u64::MAX);
                error!(waited_ms, pending = ?pending, "Scheduler startup timed out");
                self.transition(SchedulerPhase::Stopped);
                return Err(SchedulerError::StartupTimeout { waited_ms, pending });
            }
            debug!(pending = ?pending, "Waiting for start gates");
            tokio::time::sleep(poll.min(timeout.saturating_sub(waited))).await;
        }

        self.enter_running();
        Ok(())
    }

    fn enter_running(&mut self) {
        let now = self.wall.now_ms();
        self.clock.restart();
        self.game_loop.reset();
        self.physics_cadence.reset();
        if let Some(watchdog) = self.watchdog.as_mut() {
            watchdog.start(now);
        }
        self.shutdown = None;
        self.started_at = Some(Utc::now());
        self.heartbeat.set_running(true, now);
        self.transition(SchedulerPhase::Running);
        info!(
            role = ?self.role,
            game_loop_tick_rate = self.game_loop.rate(),
            physics_tick_rate = self.physics_cadence.rate(),
            "Scheduler running"
        );
    }

    /// Stop immediately. Idempotent.
    pub fn stop(&mut self) {
        if self.phase == SchedulerPhase::Stopped {
            return;
        }
        self.heartbeat.set_running(false, self.wall.now_ms());
        self.transition(SchedulerPhase::Stopped);
        info!(role = ?self.role, frames = self.frame, "Scheduler stopped");
    }

    /// Orderly shutdown through `Stopping`, recording `reason`.
    ///
    /// Returns the outcome to hand back from the frame loop.
    pub fn shutdown_with(&mut self, reason: ShutdownReason) -> FrameOutcome {
        if self.phase == SchedulerPhase::Running {
            self.transition(SchedulerPhase::Stopping);
        }
        self.telemetry.record_event(
            self.frame,
            TelemetryEvent::Shutdown {
                reason: reason.clone(),
            },
        );
        if reason.is_fatal() {
            error!(reason = ?reason, frame = self.frame, "Scheduler shutting down");
        } else {
            info!(reason = ?reason, frame = self.frame, "Scheduler shutting down");
        }
        self.shutdown = Some(reason.clone());
        self.stop();
        FrameOutcome::Shutdown(reason)
    }

    fn transition(&mut self, to: SchedulerPhase) {
        let from = self.phase;
        if from == to {
            return;
        }
        self.phase = to;
        self.transitions.push(PhaseTransition {
            from,
            to,
            at_ms: self.wall.now_ms(),
        });
        debug!(from = ?from, to = ?to, "Scheduler phase change");
    }

    // -----------------------------------------------------------------------
    // Frame
    // -----------------------------------------------------------------------

    /// Run one frame.
    ///
    /// # Errors
    ///
    /// Returns [`SchedulerError::InvalidPhase`] unless the scheduler is
    /// running.
    pub fn step_frame(&mut self) -> Result<FrameOutcome, SchedulerError> {
        if self.phase != SchedulerPhase::Running {
            return Err(SchedulerError::InvalidPhase {
                phase: self.phase,
                action: "run a frame",
            });
        }
        if self.control.take_stop_request() {
            return Ok(self.shutdown_with(ShutdownReason::OperatorStop));
        }

        let now = self.wall.now_ms();
        self.frame = self.frame.saturating_add(1);
        self.sync_control();
        let frame_time = self.clock.advance(now);

        let logic = self.game_loop.poll(now);
        let physics_fired = self.tick_physics(now, logic.is_some());

        if let Some(pipeline) = self.pipeline.as_mut() {
            let advance = pipeline.advance(self.clock.render_time_ms());
            for rejected in advance.rejected {
                if let SnapshotError::OutOfOrder { timestamp, newest } = rejected {
                    self.telemetry.record_event(
                        self.frame,
                        TelemetryEvent::OutOfOrderSnapshot { timestamp, newest },
                    );
                }
            }
            if advance.starvation_began {
                let held_at = advance.frame.next.as_ref().map_or(0.0, |s| s.timestamp);
                warn!(
                    render_time_ms = advance.frame.render_time_ms,
                    held_at, "Snapshot starvation"
                );
                self.telemetry.record_event(
                    self.frame,
                    TelemetryEvent::SnapshotStarvation {
                        render_time: advance.frame.render_time_ms,
                        held_at,
                    },
                );
            }
            self.interpolation = advance.frame;
        }

        self.telemetry.count_frame(now, logic.is_some(), physics_fired);

        let outcome = if logic.is_some() {
            self.logic_ticks = self.logic_ticks.saturating_add(1);
            let telemetry = self.run_logic_frame(now, frame_time, physics_fired);
            FrameOutcome::Ticked(telemetry)
        } else {
            FrameOutcome::Idle
        };

        let end = self.wall.now_ms();
        self.heartbeat.beat(end);
        if let Some(reason) = self.judge_frame(end - now, end, logic.is_some()) {
            return Ok(self.shutdown_with(reason));
        }
        Ok(outcome)
    }

    fn sync_control(&mut self) {
        self.clock.set_paused(self.control.is_paused());
        let scale = self.control.time_scale();
        if let Err(e) = self.clock.set_time_scale(scale) {
            warn!(error = %e, "Ignoring invalid time scale");
        }
    }

    fn tick_physics(&mut self, now: f64, logic_fired: bool) -> bool {
        let Some(physics) = self.physics.as_mut() else {
            return false;
        };
        let fire = if logic_fired {
            Some(self.physics_cadence.fire(now))
        } else {
            self.physics_cadence.poll(now)
        };
        let Some(fire) = fire else {
            return false;
        };
        physics.update(fire.elapsed_ms);
        self.physics_ticks = self.physics_ticks.saturating_add(1);
        true
    }

    fn run_logic_frame(&mut self, started: f64, time: FrameTime, physics_fired: bool) -> FrameTelemetry {
        let sim_time = self.clock.sim_time_ms();

        if self.logic_ticks.checked_rem(REGISTRY_PRUNE_TICKS) == Some(0) {
            let pruned = self.registry.prune();
            if pruned > 0 {
                debug!(pruned, "Pruned dropped entities from the registry");
            }
        }

        let promotion = self.spawn_queue.promote_due(sim_time, &mut self.scene);
        for orphan in &promotion.orphaned {
            self.registry.unregister(&orphan.entry.entity);
            self.telemetry.record_event(
                self.frame,
                TelemetryEvent::OrphanedSpawn {
                    id: orphan.entry.entity.id().clone(),
                    mount_target: orphan.entry.mount_target.clone(),
                },
            );
        }
        let promoted = u32::try_from(promotion.born.len()).unwrap_or(u32::MAX);

        let ctx = FrameContext {
            frame: self.frame,
            role: self.role,
            sim_time_ms: sim_time,
            delta_ms: time.sim_delta_ms,
            interpolation: self.pipeline.is_some().then_some(&self.interpolation),
        };

        let mut update_time_ms = 0.0;
        if self.config.enable_updates {
            let t0 = self.wall.now_ms();
            if self.telemetry.debug_timing() {
                for root in self.scene.roots() {
                    let r0 = self.wall.now_ms();
                    self.scene.update_node(&root, &ctx);
                    self.telemetry.record_node_update(&root, self.wall.now_ms() - r0);
                }
            } else {
                self.scene.update_traversal(&ctx);
            }
            update_time_ms = self.wall.now_ms() - t0;
        }

        let mut render_time_ms = 0.0;
        let render = self.config.enable_renders
            && (!self.config.manual_render || self.control.take_render_request());
        if render {
            let t0 = self.wall.now_ms();
            if self.telemetry.debug_timing() {
                for root in self.scene.render_roots() {
                    let r0 = self.wall.now_ms();
                    self.scene.render_node(&root, &ctx);
                    self.telemetry.record_node_render(&root, self.wall.now_ms() - r0);
                }
            } else {
                self.scene.render_traversal(&ctx);
            }
            render_time_ms = self.wall.now_ms() - t0;
        }

        if self.role == ProcessRole::Authoritative {
            self.flush_snapshot(sim_time);
        }

        let telemetry = FrameTelemetry {
            frame: self.frame,
            frame_delta_ms: time.frame_delta_ms,
            sim_time_ms: sim_time,
            tick_time_ms: self.wall.now_ms() - started,
            update_time_ms,
            render_time_ms,
            game_loop_fired: true,
            physics_fired,
            promoted,
            render_fps: 0,
            physics_fps: 0,
        };
        self.telemetry.publish(telemetry);
        self.telemetry.latest().clone()
    }

    fn flush_snapshot(&mut self, sim_time: f64) {
        for (id, state) in self.scene.stream_states() {
            self.transport.queue(id, state);
        }
        if let Err(e) = self.transport.send_queue(sim_time) {
            warn!(error = %e, sim_time_ms = sim_time, "Failed to send snapshot");
            self.telemetry.record_event(
                self.frame,
                TelemetryEvent::TransportFailure {
                    message: e.to_string(),
                },
            );
        }
    }

    /// Send an arbitrary message through the transport, to one client or to
    /// all.
    ///
    /// A failure is logged and recorded as a transport failure event; it
    /// never stops the scheduler. Returns whether the message was handed
    /// off.
    pub fn send(&mut self, channel: &str, payload: Value, target: Option<&ClientId>) -> bool {
        match self.transport.send(channel, payload, target) {
            Ok(()) => true,
            Err(e) => {
                warn!(error = %e, channel, "Failed to send message");
                self.telemetry.record_event(
                    self.frame,
                    TelemetryEvent::TransportFailure {
                        message: e.to_string(),
                    },
                );
                false
            }
        }
    }

    fn judge_frame(
        &mut self,
        tick_time_ms: f64,
        now: f64,
        logic_fired: bool,
    ) -> Option<ShutdownReason> {
        let watchdog = self.watchdog.as_mut()?;

        match watchdog.record_frame(tick_time_ms) {
            LagVerdict::Fatal(reason) => return Some(reason),
            LagVerdict::Warning {
                consecutive,
                crossed: true,
            } => {
                let budget_ms = watchdog.budget_ms();
                self.telemetry.record_event(
                    self.frame,
                    TelemetryEvent::LagWarning {
                        consecutive,
                        tick_time_ms,
                        budget_ms,
                    },
                );
            }
            LagVerdict::OnTime | LagVerdict::Over { .. } | LagVerdict::Warning { .. } => {}
        }

        if !logic_fired {
            return None;
        }
        let humans = self
            .registry
            .count_controlled_by(&self.player_category, Controller::Human);
        self.watchdog.as_mut()?.check_liveness(now, humans)
    }

    // -----------------------------------------------------------------------
    // Entities
    // -----------------------------------------------------------------------

    /// Register an entity without mounting it.
    ///
    /// # Errors
    ///
    /// Returns [`SchedulerError::Registry`] on a duplicate id; the event is
    /// also recorded in telemetry.
    pub fn register(&mut self, entity: &EntityRef) -> Result<(), SchedulerError> {
        if let Err(e) = self.registry.register(entity) {
            self.telemetry.record_event(
                self.frame,
                TelemetryEvent::DuplicateId {
                    id: entity.id().clone(),
                },
            );
            return Err(e.into());
        }
        Ok(())
    }

    /// Register `entity` and queue it to be born at `birth_time_ms` under
    /// `mount_target`.
    ///
    /// # Errors
    ///
    /// Returns [`SchedulerError::Registry`] on a duplicate id, or
    /// [`SchedulerError::Spawn`] if the entity is already queued or born.
    pub fn spawn(
        &mut self,
        entity: EntityRef,
        birth_time_ms: f64,
        mount_target: EntityId,
    ) -> Result<(), SchedulerError> {
        self.register(&entity)?;
        if let Err(e) = self
            .spawn_queue
            .enqueue(EntityRef::clone(&entity), birth_time_ms, mount_target)
        {
            self.registry.unregister(&entity);
            return Err(e.into());
        }
        Ok(())
    }

    // -----------------------------------------------------------------------
    // Accessors
    // -----------------------------------------------------------------------

    /// Point-in-time status.
    pub fn status(&self) -> SchedulerStatus {
        SchedulerStatus {
            role: self.role,
            phase: self.phase,
            frames: self.frame,
            logic_ticks: self.logic_ticks,
            physics_ticks: self.physics_ticks,
            sim_time_ms: self.clock.sim_time_ms(),
            time_scale: self.clock.time_scale(),
            paused: self.clock.is_paused(),
            consecutive_lag: self.watchdog.as_ref().map_or(0, Watchdog::consecutive_lag),
            entities: u64::try_from(self.registry.len()).unwrap_or(u64::MAX),
            unborn: u64::try_from(self.spawn_queue.len()).unwrap_or(u64::MAX),
            buffered_snapshots: self
                .pipeline
                .as_ref()
                .map_or(0, |p| u64::try_from(p.buffered()).unwrap_or(u64::MAX)),
            started_at: self.started_at,
            shutdown: self.shutdown.clone(),
        }
    }

    /// Process role.
    pub const fn role(&self) -> ProcessRole {
        self.role
    }

    /// Lifecycle phase.
    pub const fn phase(&self) -> SchedulerPhase {
        self.phase
    }

    /// Every lifecycle transition so far, oldest first.
    pub fn transitions(&self) -> &[PhaseTransition] {
        &self.transitions
    }

    /// Shared control handle.
    pub fn control(&self) -> Arc<SchedulerControl> {
        Arc::clone(&self.control)
    }

    /// Shared heartbeat for a stall monitor.
    pub fn heartbeat(&self) -> Arc<Heartbeat> {
        Arc::clone(&self.heartbeat)
    }

    /// Wall-clock source.
    pub fn wall_clock(&self) -> Arc<dyn ClockSource> {
        Arc::clone(&self.wall)
    }

    /// Sender feeding the snapshot pipeline (client role only).
    pub fn snapshot_sender(&self) -> Option<SnapshotSender> {
        self.snapshot_sender.clone()
    }

    /// Current snapshot pair (client role; default on the authoritative
    /// side).
    pub const fn interpolation(&self) -> &InterpolationFrame {
        &self.interpolation
    }

    /// Simulation clock.
    pub const fn clock(&self) -> &SimulationClock {
        &self.clock
    }

    /// Game-logic cadence.
    pub const fn game_loop(&self) -> &Cadence {
        &self.game_loop
    }

    /// Physics cadence.
    pub const fn physics_cadence(&self) -> &Cadence {
        &self.physics_cadence
    }

    /// Entity registry.
    pub const fn registry(&self) -> &Registry {
        &self.registry
    }

    /// Spawn queue.
    pub const fn spawn_queue(&self) -> &SpawnQueue {
        &self.spawn_queue
    }

    /// Scene graph.
    pub const fn scene(&self) -> &S {
        &self.scene
    }

    /// Scene graph, mutably.
    pub const fn scene_mut(&mut self) -> &mut S {
        &mut self.scene
    }

    /// Telemetry recorder.
    pub const fn telemetry(&self) -> &TelemetryRecorder {
        &self.telemetry
    }

    /// Frames run so far.
    pub const fn frames(&self) -> u64 {
        self.frame
    }

    /// Logic ticks fired so far.
    pub const fn logic_ticks(&self) -> u64 {
        self.logic_ticks
    }

    /// Physics ticks fired so far.
    pub const fn physics_ticks(&self) -> u64 {
        self.physics_ticks
    }

    /// Why the scheduler last shut down.
    pub const fn shutdown_reason(&self) -> Option<&ShutdownReason> {
        self.shutdown.as_ref()
    }
}

impl Scheduler<SceneTree> {
    /// Register `entity` and add it as a scene root.
    ///
    /// # Errors
    ///
    /// Returns [`SchedulerError::Scene`] if the id is taken.
    pub fn add_root(&mut self, entity: EntityRef) -> Result<(), SchedulerError> {
        let id = entity.id().clone();
        if let Err(e) = self.scene.add_root(entity, &mut self.registry) {
            if matches!(e, SceneError::Registry { .. }) {
                self.telemetry
                    .record_event(self.frame, TelemetryEvent::DuplicateId { id });
            }
            return Err(e.into());
        }
        Ok(())
    }

    /// Tear down a mounted entity and its subtree, or cancel it if it is
    /// still unborn. Returns the number of entities removed.
    pub fn destroy(&mut self, id: &EntityId) -> usize {
        if let Some(entry) = self.spawn_queue.cancel(id.as_str()) {
            entry.entity.mark_being_removed();
            self.registry.unregister(&entry.entity);
            return 1;
        }
        self.scene.destroy(id, &mut self.registry)
    }
}
