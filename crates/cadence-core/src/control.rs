//! Shared control handle for a running scheduler.
//!
//! The scheduler task and the operator API share one [`SchedulerControl`]
//! behind an `Arc`. Every hot-path field is an atomic so the scheduler reads
//! it once per frame without locking. Requests take effect at the start of
//! the next frame.

use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};

use cadence_types::ShutdownReason;
use tokio::sync::{Mutex, Notify};

use crate::clock::{ClockError, validate_time_scale};

/// Runtime controls shared between the scheduler and its operators.
#[derive(Debug)]
pub struct SchedulerControl {
    /// Simulation time is frozen while set.
    paused: AtomicBool,

    /// Time-scale factor, stored as `f64` bits.
    time_scale_bits: AtomicU64,

    /// A stop has been requested.
    stop_requested: AtomicBool,

    /// A render was requested since the last manual render.
    render_requested: AtomicBool,

    /// Wakes a manual frame source. Holds at most one pending permit, so
    /// requests made while one is pending coalesce.
    frame_notify: Notify,

    /// Why the scheduler ended, once it has.
    end_reason: Mutex<Option<ShutdownReason>>,
}

impl SchedulerControl {
    /// Create a control handle with an initial time scale.
    ///
    /// # Errors
    ///
    /// Returns [`ClockError::InvalidTimeScale`] for negative or non-finite
    /// scales.
    pub fn new(time_scale: f64) -> Result<Self, ClockError> {
        validate_time_scale(time_scale)?;
        Ok(Self {
            paused: AtomicBool::new(false),
            time_scale_bits: AtomicU64::new(time_scale.to_bits()),
            stop_requested: AtomicBool::new(false),
            render_requested: AtomicBool::new(false),
            frame_notify: Notify::new(),
            end_reason: Mutex::new(None),
        })
    }

    // -----------------------------------------------------------------------
    // Pause / Resume
    // -----------------------------------------------------------------------

    /// Check whether simulation time is frozen.
    pub fn is_paused(&self) -> bool {
        self.paused.load(Ordering::Acquire)
    }

    /// Freeze simulation time. Frames keep running.
    pub fn pause(&self) {
        self.paused.store(true, Ordering::Release);
    }

    /// Unfreeze simulation time.
    pub fn resume(&self) {
        self.paused.store(false, Ordering::Release);
    }

    // -----------------------------------------------------------------------
    // Time scale
    // -----------------------------------------------------------------------

    /// Current time-scale factor.
    pub fn time_scale(&self) -> f64 {
        f64::from_bits(self.time_scale_bits.load(Ordering::Acquire))
    }

    /// Set the time-scale factor, returning the previous one.
    ///
    /// # Errors
    ///
    /// Returns [`ClockError::InvalidTimeScale`] for negative or non-finite
    /// scales; the current scale is kept.
    pub fn set_time_scale(&self, scale: f64) -> Result<f64, ClockError> {
        validate_time_scale(scale)?;
        let prev = self.time_scale_bits.swap(scale.to_bits(), Ordering::AcqRel);
        Ok(f64::from_bits(prev))
    }

    // -----------------------------------------------------------------------
    // Stop
    // -----------------------------------------------------------------------

    /// Request an orderly stop. Also wakes a manual frame source.
    ///
    /// The request stays pending until a running scheduler consumes it, so
    /// a stop requested before start ends the run on its first frame.
    pub fn request_stop(&self) {
        self.stop_requested.store(true, Ordering::Release);
        self.frame_notify.notify_one();
    }

    /// Check whether a stop is pending.
    pub fn is_stop_requested(&self) -> bool {
        self.stop_requested.load(Ordering::Acquire)
    }

    /// Consume a pending stop request.
    pub fn take_stop_request(&self) -> bool {
        self.stop_requested.swap(false, Ordering::AcqRel)
    }

    /// Record why the scheduler ended.
    pub async fn set_end_reason(&self, reason: ShutdownReason) {
        let mut guard = self.end_reason.lock().await;
        *guard = Some(reason);
    }

    /// Why the scheduler ended, if it has.
    pub async fn end_reason(&self) -> Option<ShutdownReason> {
        self.end_reason.lock().await.clone()
    }

    // -----------------------------------------------------------------------
    // Manual frames and renders
    // -----------------------------------------------------------------------

    /// Ask for one render in manual-render mode.
    pub fn request_render(&self) {
        self.render_requested.store(true, Ordering::Release);
    }

    /// Consume a pending render request.
    pub fn take_render_request(&self) -> bool {
        self.render_requested.swap(false, Ordering::AcqRel)
    }

    /// Ask for one frame in manual-tick mode.
    pub fn request_frame(&self) {
        self.frame_notify.notify_one();
    }

    /// Wait for a frame request (or a stop request).
    pub async fn wait_for_frame(&self) {
        self.frame_notify.notified().await;
    }
}

impl Default for SchedulerControl {
    fn default() -> Self {
        Self {
            paused: AtomicBool::new(false),
            time_scale_bits: AtomicU64::new(1.0_f64.to_bits()),
            stop_requested: AtomicBool::new(false),
            render_requested: AtomicBool::new(false),
            frame_notify: Notify::new(),
            end_reason: Mutex::new(None),
        }
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use std::sync::Arc;
    use std::time::Duration;

    use super::*;

    #[test]
    fn initial_state_is_not_paused() {
        let control = SchedulerControl::default();
        assert!(!control.is_paused());
        assert!(!control.is_stop_requested());
        assert!((control.time_scale() - 1.0).abs() < f64::EPSILON);
    }

    #[test]
    fn pause_and_resume() {
        let control = SchedulerControl::default();
        control.pause();
        assert!(control.is_paused());
        control.resume();
        assert!(!control.is_paused());
    }

    #[test]
    fn set_time_scale_returns_previous() {
        let control = SchedulerControl::new(2.0).unwrap();
        let prev = control.set_time_scale(0.5).unwrap();
        assert!((prev - 2.0).abs() < f64::EPSILON);
        assert!(control.set_time_scale(-1.0).is_err());
        assert!((control.time_scale() - 0.5).abs() < f64::EPSILON);
    }

    #[test]
    fn render_requests_coalesce() {
        let control = SchedulerControl::default();
        control.request_render();
        control.request_render();
        assert!(control.take_render_request());
        assert!(!control.take_render_request());
    }

    #[test]
    fn stop_request_is_consumed_once() {
        let control = SchedulerControl::default();
        control.request_stop();
        assert!(control.is_stop_requested());
        assert!(control.take_stop_request());
        assert!(!control.is_stop_requested());
        assert!(!control.take_stop_request());
    }

    #[tokio::test]
    async fn end_reason_is_recorded() {
        let control = SchedulerControl::default();
        assert!(control.end_reason().await.is_none());
        control.set_end_reason(ShutdownReason::OperatorStop).await;
        assert_eq!(
            control.end_reason().await,
            Some(ShutdownReason::OperatorStop)
        );
    }

    #[tokio::test(start_paused = true)]
    async fn frame_requests_coalesce_while_pending() {
        let control = Arc::new(SchedulerControl::default());
        control.request_frame();
        control.request_frame();
        control.wait_for_frame().await;
        // The second request was folded into the first.
        let second = tokio::time::timeout(Duration::from_millis(50), control.wait_for_frame()).await;
        assert!(second.is_err());
    }

    #[tokio::test(start_paused = true)]
    async fn stop_wakes_frame_waiter() {
        let control = Arc::new(SchedulerControl::default());
        let waiter = {
            let control = Arc::clone(&control);
            tokio::spawn(async move { control.wait_for_frame().await })
        };
        tokio::task::yield_now().await;
        control.request_stop();
        assert!(waiter.await.is_ok());
    }
}
