//! Frame loop runner with operator controls.
//!
//! This module provides [`run_scheduler`], the top-level async function
//! that drives a [`Scheduler`] from a [`FrameSource`] with support for:
//!
//! - **Gated startup**: a stopped scheduler is started (and its gates
//!   polled) before the first frame
//! - **Pause/resume and time scale**: applied by the scheduler at the start
//!   of each frame from its shared control
//! - **Operator stop**: orderly stop through `Stopping` via REST or signal
//! - **Watchdog shutdown**: lag, idle and lifespan verdicts end the loop
//! - **Bounded runs**: a fixed-step source with a frame limit ends the run
//!   when it runs dry
//!
//! The runner owns no timing of its own. Awaiting the frame source is the
//! only yield point between frames.

use cadence_types::{FrameTelemetry, SchedulerPhase, ShutdownReason};
use tracing::{info, warn};

use crate::frame_source::FrameSource;
use crate::scene::SceneGraph;
use crate::scheduler::{FrameOutcome, Scheduler, SchedulerError};

/// Errors that can occur during a run.
#[derive(Debug, thiserror::Error)]
pub enum RunnerError {
    /// The scheduler failed to start or run a frame.
    #[error("scheduler error: {source}")]
    Scheduler {
        /// The underlying scheduler error.
        #[from]
        source: SchedulerError,
    },
}

/// Result of a run.
#[derive(Debug, Clone, PartialEq)]
pub struct RunResult {
    /// Why the run ended.
    pub end_reason: ShutdownReason,
    /// Telemetry of the last logic frame, if any ran.
    pub final_telemetry: Option<FrameTelemetry>,
    /// Total frames executed.
    pub frames: u64,
    /// Total game-logic ticks fired.
    pub logic_ticks: u64,
    /// Total physics ticks fired.
    pub physics_ticks: u64,
}

/// Callback invoked after each logic frame completes.
///
/// Implementations can use this to publish status to the observer, spawn
/// entities, or drive a loopback client. The callback receives the frame
/// telemetry and the scheduler itself.
pub trait TickCallback<S: SceneGraph>: Send {
    /// Called after a logic frame completes.
    fn on_tick(&mut self, telemetry: &FrameTelemetry, scheduler: &mut Scheduler<S>);
}

/// A no-op tick callback for testing.
pub struct NoOpCallback;

impl<S: SceneGraph> TickCallback<S> for NoOpCallback {
    fn on_tick(&mut self, _telemetry: &FrameTelemetry, _scheduler: &mut Scheduler<S>) {}
}

/// Run frames until the scheduler shuts down or the source runs dry.
///
/// # Errors
///
/// Returns [`RunnerError`] if the scheduler cannot start (for example when
/// a start gate times out).
pub async fn run_scheduler<S: SceneGraph>(
    scheduler: &mut Scheduler<S>,
    source: &mut FrameSource,
    callback: &mut dyn TickCallback<S>,
) -> Result<RunResult, RunnerError> {
    if scheduler.phase() == SchedulerPhase::Stopped {
        scheduler.start().await?;
    }

    let control = scheduler.control();
    let heartbeat = scheduler.heartbeat();
    let mut last_telemetry: Option<FrameTelemetry> = None;

    info!(role = ?scheduler.role(), "Frame loop starting");

    let end_reason = loop {
        if !source.next_frame().await {
            info!(frames = scheduler.frames(), "Frame source exhausted");
            scheduler.shutdown_with(ShutdownReason::FramesExhausted);
            break ShutdownReason::FramesExhausted;
        }

        match scheduler.step_frame()? {
            FrameOutcome::Idle => {}
            FrameOutcome::Ticked(telemetry) => {
                callback.on_tick(&telemetry, scheduler);
                last_telemetry = Some(telemetry);
            }
            FrameOutcome::Shutdown(reason) => break reason,
        }
    };

    control.set_end_reason(end_reason.clone()).await;
    heartbeat.finish();

    Ok(RunResult {
        end_reason,
        final_telemetry: last_telemetry,
        frames: scheduler.frames(),
        logic_ticks: scheduler.logic_ticks(),
        physics_ticks: scheduler.physics_ticks(),
    })
}

/// Log the end of a run.
///
/// Call after [`run_scheduler`] returns. The observer should keep serving
/// after this.
pub fn log_run_end(result: &RunResult) {
    info!(
        reason = ?result.end_reason,
        frames = result.frames,
        logic_ticks = result.logic_ticks,
        physics_ticks = result.physics_ticks,
        "Scheduler run ended"
    );

    if let Some(ref telemetry) = result.final_telemetry {
        info!(
            frame = telemetry.frame,
            sim_time_ms = telemetry.sim_time_ms,
            render_fps = telemetry.render_fps,
            physics_fps = telemetry.physics_fps,
            "Final frame telemetry"
        );
    } else {
        warn!("Run ended with no logic frames executed");
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use std::sync::Arc;

    use cadence_types::ProcessRole;

    use super::*;
    use crate::clock::{ClockSource, ManualClock};
    use crate::config::EngineConfig;
    use crate::entity::Entity;
    use crate::scene::SceneTree;

    fn make_scheduler() -> (Scheduler, Arc<ManualClock>) {
        let mut config = EngineConfig::default();
        config.watchdog.idle_timeout_ms = 0;
        let clock = Arc::new(ManualClock::new(0.0));
        let mut scheduler = Scheduler::new(
            &config,
            ProcessRole::Authoritative,
            SceneTree::new(),
            Arc::clone(&clock) as Arc<dyn ClockSource>,
        )
        .unwrap();
        scheduler.add_root(Entity::with_id("world").build()).unwrap();
        (scheduler, clock)
    }

    #[tokio::test]
    async fn bounded_by_frame_source() {
        let (mut scheduler, clock) = make_scheduler();
        let mut source = FrameSource::fixed_step(clock, 50.0, Some(5));
        let mut cb = NoOpCallback;

        let result = run_scheduler(&mut scheduler, &mut source, &mut cb)
            .await
            .unwrap();

        assert_eq!(result.end_reason, ShutdownReason::FramesExhausted);
        assert_eq!(result.frames, 5);
        assert_eq!(result.logic_ticks, 5);
        assert_eq!(scheduler.phase(), SchedulerPhase::Stopped);
        assert_eq!(
            scheduler.control().end_reason().await,
            Some(ShutdownReason::FramesExhausted)
        );
        assert!(scheduler.heartbeat().is_finished());
    }

    #[tokio::test]
    async fn operator_stop() {
        let (mut scheduler, clock) = make_scheduler();
        scheduler.control().request_stop();
        let mut source = FrameSource::fixed_step(clock, 50.0, None);
        let mut cb = NoOpCallback;

        let result = run_scheduler(&mut scheduler, &mut source, &mut cb)
            .await
            .unwrap();

        assert_eq!(result.end_reason, ShutdownReason::OperatorStop);
        assert_eq!(result.frames, 0);
        assert!(result.final_telemetry.is_none());
    }

    #[tokio::test]
    async fn tick_callback_is_called_per_logic_frame() {
        struct CountCallback {
            count: u64,
        }
        impl TickCallback<SceneTree> for CountCallback {
            fn on_tick(&mut self, _telemetry: &FrameTelemetry, _scheduler: &mut Scheduler) {
                self.count = self.count.saturating_add(1);
            }
        }

        let (mut scheduler, clock) = make_scheduler();
        // 25 ms frames against a 20 Hz logic cadence: every other frame.
        let mut source = FrameSource::fixed_step(clock, 25.0, Some(10));
        let mut cb = CountCallback { count: 0 };

        let result = run_scheduler(&mut scheduler, &mut source, &mut cb)
            .await
            .unwrap();

        assert_eq!(cb.count, 5);
        assert_eq!(result.logic_ticks, 5);
        assert_eq!(result.final_telemetry.map(|t| t.frame), Some(9));
    }

    #[tokio::test]
    async fn callback_can_stop_the_run() {
        struct StopAfter(u64);
        impl TickCallback<SceneTree> for StopAfter {
            fn on_tick(&mut self, telemetry: &FrameTelemetry, scheduler: &mut Scheduler) {
                if telemetry.frame >= self.0 {
                    scheduler.control().request_stop();
                }
            }
        }

        let (mut scheduler, clock) = make_scheduler();
        let mut source = FrameSource::fixed_step(clock, 50.0, None);
        let result = run_scheduler(&mut scheduler, &mut source, &mut StopAfter(3))
            .await
            .unwrap();

        assert_eq!(result.end_reason, ShutdownReason::OperatorStop);
        assert_eq!(result.frames, 3);
    }
}
