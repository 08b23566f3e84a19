//! Clock sources and the scheduler's simulation clock.
//!
//! Two notions of time exist side by side:
//!
//! - **Wall-clock time** comes from a [`ClockSource`]. It is monotonic and
//!   measured in milliseconds since the source was created. Cadences, the
//!   watchdog and frame deltas all read it.
//! - **Simulation time** lives in [`SimulationClock`]. It advances once per
//!   frame by `frame_delta * time_scale`, stands still while paused, and is
//!   what birth times and snapshot timestamps are expressed in. On the
//!   client the render time advances by exactly the same amount.
//!
//! [`MonotonicClock`] reads `tokio::time::Instant`, so tests running with
//! a paused tokio clock see deterministic wall-clock time. [`ManualClock`]
//! is set explicitly and drives fixed-step runs.

use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};

use tokio::time::Instant;

/// Errors raised by clock configuration.
#[derive(Debug, thiserror::Error)]
pub enum ClockError {
    /// The time scale is negative, NaN or infinite.
    #[error("invalid time scale {value}: must be finite and non-negative")]
    InvalidTimeScale {
        /// The rejected value.
        value: f64,
    },
}

// ---------------------------------------------------------------------------
// Clock sources
// ---------------------------------------------------------------------------

/// A monotonic wall-clock time source in milliseconds.
pub trait ClockSource: Send + Sync + fmt::Debug {
    /// Current wall-clock time in milliseconds. Never decreases.
    fn now_ms(&self) -> f64;
}

/// Wall-clock source backed by `tokio::time::Instant`.
#[derive(Debug, Clone, Copy)]
pub struct MonotonicClock {
    origin: Instant,
}

impl MonotonicClock {
    /// Start a clock whose zero is now.
    pub fn new() -> Self {
        Self {
            origin: Instant::now(),
        }
    }
}

impl Default for MonotonicClock {
    fn default() -> Self {
        Self::new()
    }
}

impl ClockSource for MonotonicClock {
    fn now_ms(&self) -> f64 {
        self.origin.elapsed().as_secs_f64() * 1000.0
    }
}

/// Wall-clock source that only moves when told to.
///
/// Shared through an `Arc` between a fixed-step frame source (which
/// advances it) and the scheduler (which reads it).
#[derive(Debug, Default)]
pub struct ManualClock {
    /// Current time in milliseconds, stored as `f64` bits.
    now_bits: AtomicU64,
}

impl ManualClock {
    /// Create a manual clock reading `start_ms`.
    pub fn new(start_ms: f64) -> Self {
        Self {
            now_bits: AtomicU64::new(start_ms.to_bits()),
        }
    }

    /// Move the clock forward by `delta_ms`. Negative deltas are ignored.
    pub fn advance_ms(&self, delta_ms: f64) {
        if delta_ms.is_nan() || delta_ms <= 0.0 {
            return;
        }
        let _ = self
            .now_bits
            .fetch_update(Ordering::AcqRel, Ordering::Acquire, |bits| {
                Some((f64::from_bits(bits) + delta_ms).to_bits())
            });
    }

    /// Jump to `now_ms` if it is ahead of the current reading.
    pub fn set_ms(&self, now_ms: f64) {
        let _ = self
            .now_bits
            .fetch_update(Ordering::AcqRel, Ordering::Acquire, |bits| {
                (now_ms > f64::from_bits(bits)).then_some(now_ms.to_bits())
            });
    }
}

impl ClockSource for ManualClock {
    fn now_ms(&self) -> f64 {
        f64::from_bits(self.now_bits.load(Ordering::Acquire))
    }
}

// ---------------------------------------------------------------------------
// Simulation clock
// ---------------------------------------------------------------------------

/// Time deltas produced by one [`SimulationClock::advance`] call.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct FrameTime {
    /// Wall-clock time since the previous frame (0 on the first frame).
    pub frame_delta_ms: f64,
    /// Simulation time added this frame.
    pub sim_delta_ms: f64,
}

/// Process-wide simulation time.
///
/// Owned by the scheduler and advanced exactly once per frame.
#[derive(Debug, Clone, PartialEq)]
pub struct SimulationClock {
    sim_time_ms: f64,
    render_time_ms: f64,
    initial_render_time_ms: f64,
    time_scale: f64,
    paused: bool,
    last_frame_ms: Option<f64>,
}

impl SimulationClock {
    /// Create a clock at simulation time zero.
    ///
    /// Render time starts `render_delay_ms` behind simulation time so that
    /// a client plays back snapshots that have already arrived.
    pub fn new(render_delay_ms: f64) -> Self {
        let initial_render_time_ms = -render_delay_ms.max(0.0);
        Self {
            sim_time_ms: 0.0,
            render_time_ms: initial_render_time_ms,
            initial_render_time_ms,
            time_scale: 1.0,
            paused: false,
            last_frame_ms: None,
        }
    }

    /// Advance by the wall-clock time elapsed since the previous call.
    ///
    /// The first call after construction or [`restart`](Self::restart)
    /// yields a zero delta. Simulation and render time stand still while
    /// paused; the frame delta is still reported.
    pub fn advance(&mut self, now_ms: f64) -> FrameTime {
        let frame_delta_ms = self
            .last_frame_ms
            .map_or(0.0, |last| (now_ms - last).max(0.0));
        self.last_frame_ms = Some(now_ms);

        let sim_delta_ms = if self.paused {
            0.0
        } else {
            frame_delta_ms * self.time_scale
        };
        self.sim_time_ms += sim_delta_ms;
        self.render_time_ms += sim_delta_ms;

        FrameTime {
            frame_delta_ms,
            sim_delta_ms,
        }
    }

    /// Reset simulation and render time to their initial values.
    pub const fn restart(&mut self) {
        self.sim_time_ms = 0.0;
        self.render_time_ms = self.initial_render_time_ms;
        self.last_frame_ms = None;
    }

    /// Set the time-scale factor applied to frame deltas.
    ///
    /// # Errors
    ///
    /// Returns [`ClockError::InvalidTimeScale`] for negative or non-finite
    /// values; simulation time must never run backwards.
    pub fn set_time_scale(&mut self, scale: f64) -> Result<(), ClockError> {
        validate_time_scale(scale)?;
        self.time_scale = scale;
        Ok(())
    }

    /// Freeze or unfreeze simulation time.
    pub const fn set_paused(&mut self, paused: bool) {
        self.paused = paused;
    }

    /// Current simulation time in milliseconds.
    pub const fn sim_time_ms(&self) -> f64 {
        self.sim_time_ms
    }

    /// Current render time in milliseconds.
    pub const fn render_time_ms(&self) -> f64 {
        self.render_time_ms
    }

    /// Current time-scale factor.
    pub const fn time_scale(&self) -> f64 {
        self.time_scale
    }

    /// Whether simulation time is frozen.
    pub const fn is_paused(&self) -> bool {
        self.paused
    }
}

impl Default for SimulationClock {
    fn default() -> Self {
        Self::new(0.0)
    }
}

/// Check that `scale` is usable as a time-scale factor.
///
/// # Errors
///
/// Returns [`ClockError::InvalidTimeScale`] for negative or non-finite
/// values.
pub fn validate_time_scale(scale: f64) -> Result<(), ClockError> {
    if scale.is_finite() && scale >= 0.0 {
        Ok(())
    } else {
        Err(ClockError::InvalidTimeScale { value: scale })
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    fn approx(a: f64, b: f64) -> bool {
        (a - b).abs() < 1e-9
    }

    #[test]
    fn first_frame_has_zero_delta() {
        let mut clock = SimulationClock::new(0.0);
        let t = clock.advance(500.0);
        assert!(approx(t.frame_delta_ms, 0.0));
        assert!(approx(clock.sim_time_ms(), 0.0));

        let t = clock.advance(516.0);
        assert!(approx(t.frame_delta_ms, 16.0));
        assert!(approx(clock.sim_time_ms(), 16.0));
    }

    #[test]
    fn time_scale_applies_to_sim_and_render_time() {
        let mut clock = SimulationClock::new(100.0);
        clock.set_time_scale(0.5).unwrap();
        clock.advance(0.0);
        clock.advance(40.0);
        assert!(approx(clock.sim_time_ms(), 20.0));
        assert!(approx(clock.render_time_ms(), -80.0));
    }

    #[test]
    fn pause_freezes_sim_time_but_reports_frame_delta() {
        let mut clock = SimulationClock::new(0.0);
        clock.advance(0.0);
        clock.advance(10.0);
        clock.set_paused(true);
        let t = clock.advance(30.0);
        assert!(approx(t.frame_delta_ms, 20.0));
        assert!(approx(t.sim_delta_ms, 0.0));
        assert!(approx(clock.sim_time_ms(), 10.0));

        clock.set_paused(false);
        clock.advance(35.0);
        assert!(approx(clock.sim_time_ms(), 15.0));
    }

    #[test]
    fn restart_resets_to_origin() {
        let mut clock = SimulationClock::new(50.0);
        clock.advance(0.0);
        clock.advance(1000.0);
        clock.restart();
        assert!(approx(clock.sim_time_ms(), 0.0));
        assert!(approx(clock.render_time_ms(), -50.0));
        let t = clock.advance(5000.0);
        assert!(approx(t.frame_delta_ms, 0.0));
    }

    #[test]
    fn rejects_negative_and_nan_time_scale() {
        let mut clock = SimulationClock::default();
        assert!(clock.set_time_scale(-1.0).is_err());
        assert!(clock.set_time_scale(f64::NAN).is_err());
        assert!(clock.set_time_scale(0.0).is_ok());
    }

    #[test]
    fn manual_clock_only_moves_forward() {
        let clock = ManualClock::new(10.0);
        clock.advance_ms(5.0);
        assert!(approx(clock.now_ms(), 15.0));
        clock.advance_ms(-3.0);
        clock.set_ms(12.0);
        assert!(approx(clock.now_ms(), 15.0));
        clock.set_ms(40.0);
        assert!(approx(clock.now_ms(), 40.0));
    }

    #[tokio::test(start_paused = true)]
    async fn monotonic_clock_follows_tokio_time() {
        let clock = MonotonicClock::new();
        tokio::time::advance(std::time::Duration::from_millis(250)).await;
        assert!(approx(clock.now_ms(), 250.0));
    }
}
