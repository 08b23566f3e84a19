//! Injected frame scheduling.
//!
//! The scheduler never decides when the next frame runs. The runner awaits
//! a [`FrameSource`] between frames; that await is the scheduler's only
//! yield point.

use std::sync::Arc;
use std::time::Duration;

use tokio::time::{Interval, MissedTickBehavior};

use crate::clock::ManualClock;
use crate::control::SchedulerControl;

/// Decides when the next frame runs.
#[derive(Debug)]
pub enum FrameSource {
    /// Frames at a fixed wall-clock interval.
    Interval(Interval),

    /// Frames only when [`SchedulerControl::request_frame`] is called.
    Manual(Arc<SchedulerControl>),

    /// Frames back to back, advancing a manual clock by a fixed step
    /// before each one. Deterministic; used for tests and replays.
    FixedStep {
        /// Clock the scheduler reads.
        clock: Arc<ManualClock>,
        /// Wall-clock milliseconds added before each frame.
        step_ms: f64,
        /// Frames left to run (`None` = unlimited).
        remaining: Option<u64>,
    },
}

impl FrameSource {
    /// Frames `frame_rate` times per second.
    pub fn interval(frame_rate: u32) -> Self {
        let period = Duration::from_secs_f64(1.0 / f64::from(frame_rate.max(1)));
        let mut interval = tokio::time::interval(period);
        interval.set_missed_tick_behavior(MissedTickBehavior::Delay);
        Self::Interval(interval)
    }

    /// Frames on explicit request.
    pub const fn manual(control: Arc<SchedulerControl>) -> Self {
        Self::Manual(control)
    }

    /// Fixed-step frames on a manual clock.
    pub const fn fixed_step(clock: Arc<ManualClock>, step_ms: f64, frames: Option<u64>) -> Self {
        Self::FixedStep {
            clock,
            step_ms,
            remaining: frames,
        }
    }

    /// Wait until the next frame should run.
    ///
    /// Returns `false` once the source is exhausted.
    pub async fn next_frame(&mut self) -> bool {
        match self {
            Self::Interval(interval) => {
                interval.tick().await;
                true
            }
            Self::Manual(control) => {
                control.wait_for_frame().await;
                true
            }
            Self::FixedStep {
                clock,
                step_ms,
                remaining,
            } => {
                if let Some(left) = remaining {
                    if *left == 0 {
                        return false;
                    }
                    *left = left.saturating_sub(1);
                }
                clock.advance_ms(*step_ms);
                tokio::task::yield_now().await;
                true
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::ClockSource;

    #[tokio::test]
    async fn fixed_step_advances_clock_and_runs_dry() {
        let clock = Arc::new(ManualClock::new(0.0));
        let mut source = FrameSource::fixed_step(Arc::clone(&clock), 10.0, Some(3));
        let mut frames = 0;
        while source.next_frame().await {
            frames += 1;
        }
        assert_eq!(frames, 3);
        assert!((clock.now_ms() - 30.0).abs() < 1e-9);
    }

    #[tokio::test(start_paused = true)]
    async fn interval_paces_frames() {
        let start = tokio::time::Instant::now();
        let mut source = FrameSource::interval(10);
        for _ in 0..4 {
            assert!(source.next_frame().await);
        }
        // First tick is immediate, then 100 ms apart.
        assert_eq!(start.elapsed(), Duration::from_millis(300));
    }

    #[tokio::test(start_paused = true)]
    async fn manual_source_waits_for_request() {
        let control = Arc::new(SchedulerControl::default());
        let mut source = FrameSource::manual(Arc::clone(&control));
        let waited =
            tokio::time::timeout(Duration::from_millis(100), source.next_frame()).await;
        assert!(waited.is_err());
        control.request_frame();
        assert!(source.next_frame().await);
    }
}
