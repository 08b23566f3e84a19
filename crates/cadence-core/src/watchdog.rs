//! Liveness policy for the authoritative scheduler.
//!
//! [`Watchdog`] runs inside the frame: it compares each frame's duration
//! against the frame budget and periodically checks idle time and process
//! age. Any fatal verdict is signalled exactly once.
//!
//! [`Heartbeat`] and [`monitor_stalls`] run outside it: the scheduler beats
//! once per frame, and an independent task notices when beats stop, which
//! the in-frame watchdog cannot do for a frame that never finishes.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::time::Duration;

use cadence_types::ShutdownReason;
use tracing::{error, info, warn};

use crate::clock::ClockSource;
use crate::config::WatchdogConfig;

/// Hard upper bound on process lifespan: six hours.
pub const ABSOLUTE_LIFESPAN_CEILING_MS: f64 = 6.0 * 60.0 * 60.0 * 1000.0;

/// Verdict on one frame's duration.
#[derive(Debug, Clone, PartialEq)]
pub enum LagVerdict {
    /// The frame finished within budget; the lag counter was reset.
    OnTime,
    /// Over budget, below the warning threshold.
    Over {
        /// Consecutive over-budget frames.
        consecutive: u32,
    },
    /// Over budget and above the warning threshold.
    Warning {
        /// Consecutive over-budget frames.
        consecutive: u32,
        /// This frame crossed the threshold.
        crossed: bool,
    },
    /// Over budget past the fatal threshold. Returned once.
    Fatal(ShutdownReason),
}

/// In-frame lag, idle and lifespan policy.
#[derive(Debug, Clone)]
pub struct Watchdog {
    budget_ms: f64,
    lag_warning_threshold: u32,
    lag_fatal_threshold: u32,
    idle_timeout_ms: f64,
    lifespan_ms: f64,
    check_interval_ms: f64,
    consecutive_lag: u32,
    started_at_ms: Option<f64>,
    last_check_ms: Option<f64>,
    idle_since_ms: Option<f64>,
    tripped: bool,
}

impl Watchdog {
    /// Create a watchdog for frames budgeted at `budget_ms`.
    #[allow(clippy::cast_precision_loss)]
    pub fn new(config: &WatchdogConfig, budget_ms: f64) -> Self {
        let configured = config.max_lifespan_ms as f64;
        let lifespan_ms = if configured <= 0.0 {
            ABSOLUTE_LIFESPAN_CEILING_MS
        } else {
            configured.min(ABSOLUTE_LIFESPAN_CEILING_MS)
        };
        Self {
            budget_ms,
            lag_warning_threshold: config.lag_warning_threshold,
            lag_fatal_threshold: config.lag_fatal_threshold,
            idle_timeout_ms: config.idle_timeout_ms as f64,
            lifespan_ms,
            check_interval_ms: config.liveness_check_interval_ms as f64,
            consecutive_lag: 0,
            started_at_ms: None,
            last_check_ms: None,
            idle_since_ms: None,
            tripped: false,
        }
    }

    /// Begin a run at `now_ms`.
    ///
    /// Lag, idle and lifespan state from any earlier run is discarded, and
    /// the watchdog may signal fatal again.
    pub const fn start(&mut self, now_ms: f64) {
        self.started_at_ms = Some(now_ms);
        self.consecutive_lag = 0;
        self.last_check_ms = None;
        self.idle_since_ms = None;
        self.tripped = false;
    }

    /// Judge one frame's wall-clock duration.
    pub fn record_frame(&mut self, tick_time_ms: f64) -> LagVerdict {
        if tick_time_ms <= self.budget_ms {
            self.consecutive_lag = 0;
            return LagVerdict::OnTime;
        }

        self.consecutive_lag = self.consecutive_lag.saturating_add(1);
        let consecutive = self.consecutive_lag;

        if consecutive > self.lag_fatal_threshold {
            if let Some(reason) = self.trip(ShutdownReason::LagFatal {
                consecutive,
                threshold: self.lag_fatal_threshold,
            }) {
                return LagVerdict::Fatal(reason);
            }
        }
        if consecutive > self.lag_warning_threshold {
            warn!(
                tick_time_ms,
                budget_ms = self.budget_ms,
                consecutive,
                fatal_threshold = self.lag_fatal_threshold,
                "Frame is taking too long"
            );
            return LagVerdict::Warning {
                consecutive,
                crossed: consecutive == self.lag_warning_threshold.saturating_add(1),
            };
        }
        LagVerdict::Over { consecutive }
    }

    /// Check idle time and process age, at most once per check interval.
    ///
    /// `humans` is the number of human-controlled players currently
    /// present.
    pub fn check_liveness(&mut self, now_ms: f64, humans: usize) -> Option<ShutdownReason> {
        if self
            .last_check_ms
            .is_some_and(|last| now_ms - last < self.check_interval_ms)
        {
            return None;
        }
        self.last_check_ms = Some(now_ms);
        let started_at = *self.started_at_ms.get_or_insert(now_ms);

        if humans == 0 {
            let idle_since = *self.idle_since_ms.get_or_insert(now_ms);
            let idle_ms = now_ms - idle_since;
            if self.idle_timeout_ms > 0.0 && idle_ms > self.idle_timeout_ms {
                return self.trip(ShutdownReason::IdleTimeoutExceeded {
                    idle_ms,
                    timeout_ms: self.idle_timeout_ms,
                });
            }
        } else {
            self.idle_since_ms = None;
        }

        let age_ms = now_ms - started_at;
        if age_ms > self.lifespan_ms {
            return self.trip(ShutdownReason::LifespanExceeded {
                age_ms,
                lifespan_ms: self.lifespan_ms,
            });
        }
        None
    }

    fn trip(&mut self, reason: ShutdownReason) -> Option<ShutdownReason> {
        if self.tripped {
            return None;
        }
        self.tripped = true;
        error!(reason = ?reason, "Watchdog shutting down the scheduler");
        Some(reason)
    }

    /// Consecutive over-budget frames so far.
    pub const fn consecutive_lag(&self) -> u32 {
        self.consecutive_lag
    }

    /// Whether a fatal verdict has been issued.
    pub const fn is_tripped(&self) -> bool {
        self.tripped
    }

    /// Frame budget in milliseconds.
    pub const fn budget_ms(&self) -> f64 {
        self.budget_ms
    }

    /// Effective lifespan after the ceiling.
    pub const fn lifespan_ms(&self) -> f64 {
        self.lifespan_ms
    }
}

// ---------------------------------------------------------------------------
// Heartbeat and stall monitor
// ---------------------------------------------------------------------------

/// Frame heartbeat shared between the scheduler and the stall monitor.
#[derive(Debug)]
pub struct Heartbeat {
    frames: AtomicU64,
    last_beat_bits: AtomicU64,
    running: AtomicBool,
    finished: AtomicBool,
}

impl Heartbeat {
    /// Create a heartbeat that has not beaten yet.
    pub const fn new() -> Self {
        Self {
            frames: AtomicU64::new(0),
            last_beat_bits: AtomicU64::new(0),
            running: AtomicBool::new(false),
            finished: AtomicBool::new(false),
        }
    }

    /// Record a completed frame at `now_ms`.
    pub fn beat(&self, now_ms: f64) {
        self.last_beat_bits.store(now_ms.to_bits(), Ordering::Release);
        self.frames.fetch_add(1, Ordering::AcqRel);
    }

    /// Mark the scheduler as running (stalls only count while running).
    pub fn set_running(&self, running: bool, now_ms: f64) {
        if running {
            self.last_beat_bits.store(now_ms.to_bits(), Ordering::Release);
        }
        self.running.store(running, Ordering::Release);
    }

    /// Mark the scheduler as gone for good; the monitor exits.
    pub fn finish(&self) {
        self.running.store(false, Ordering::Release);
        self.finished.store(true, Ordering::Release);
    }

    /// Frames completed so far.
    pub fn frames(&self) -> u64 {
        self.frames.load(Ordering::Acquire)
    }

    /// Time of the last beat.
    pub fn last_beat_ms(&self) -> f64 {
        f64::from_bits(self.last_beat_bits.load(Ordering::Acquire))
    }

    /// Whether the scheduler is running.
    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::Acquire)
    }

    /// Whether the scheduler has finished.
    pub fn is_finished(&self) -> bool {
        self.finished.load(Ordering::Acquire)
    }
}

impl Default for Heartbeat {
    fn default() -> Self {
        Self::new()
    }
}

/// Watch `heartbeat` until the scheduler finishes, logging stalls.
///
/// A stall is a running scheduler that has not completed a frame for
/// longer than `threshold_ms`. Each stall is logged once when detected and
/// once when frames resume. Returns the number of stalls seen.
pub async fn monitor_stalls(
    heartbeat: Arc<Heartbeat>,
    clock: Arc<dyn ClockSource>,
    threshold_ms: f64,
) -> u64 {
    let poll_ms = (threshold_ms / 2.0).max(1.0);
    let mut interval = tokio::time::interval(Duration::from_secs_f64(poll_ms / 1000.0));
    interval.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);

    let mut stalls: u64 = 0;
    let mut stalled = false;
    loop {
        interval.tick().await;
        if heartbeat.is_finished() {
            return stalls;
        }
        if !heartbeat.is_running() {
            stalled = false;
            continue;
        }

        let silent_ms = clock.now_ms() - heartbeat.last_beat_ms();
        if silent_ms > threshold_ms {
            if !stalled {
                stalled = true;
                stalls = stalls.saturating_add(1);
                error!(
                    silent_ms,
                    threshold_ms,
                    frames = heartbeat.frames(),
                    "Scheduler stalled: no frame completed"
                );
            }
        } else if stalled {
            stalled = false;
            info!(frames = heartbeat.frames(), "Scheduler recovered from stall");
        }
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use crate::clock::ManualClock;

    fn config(warn: u32, fatal: u32) -> WatchdogConfig {
        WatchdogConfig {
            lag_warning_threshold: warn,
            lag_fatal_threshold: fatal,
            ..WatchdogConfig::default()
        }
    }

    #[test]
    fn hundred_and_one_slow_frames_trip_exactly_once() {
        let mut dog = Watchdog::new(&config(50, 100), 16.0);
        let mut fatal = 0;
        for _ in 0..101 {
            if matches!(dog.record_frame(40.0), LagVerdict::Fatal(_)) {
                fatal += 1;
            }
        }
        assert_eq!(fatal, 1);
        // Further slow frames never signal again.
        for _ in 0..50 {
            assert!(!matches!(dog.record_frame(40.0), LagVerdict::Fatal(_)));
        }
        assert!(dog.is_tripped());
    }

    #[test]
    fn restart_rearms_lag_and_idle() {
        let cfg = WatchdogConfig {
            lag_warning_threshold: 2,
            lag_fatal_threshold: 5,
            idle_timeout_ms: 5_000,
            ..WatchdogConfig::default()
        };
        let mut dog = Watchdog::new(&cfg, 16.0);
        for round in 0..2 {
            dog.start(0.0);
            assert!(!dog.is_tripped());
            let fatal = (1..=10_u32).find(|_| matches!(dog.record_frame(40.0), LagVerdict::Fatal(_)));
            assert_eq!(fatal, Some(6), "round {round}");
            assert!(dog.is_tripped());
        }

        // Idle time from the previous run does not count toward the next.
        dog.start(0.0);
        assert!(dog.check_liveness(0.0, 0).is_none());
        assert!(dog.check_liveness(4_000.0, 0).is_none());
        dog.start(10_000.0);
        assert!(dog.check_liveness(10_000.0, 0).is_none());
        assert!(dog.check_liveness(12_000.0, 0).is_none());
        assert!(dog.check_liveness(16_000.0, 0).is_some());
    }

    #[test]
    fn on_time_frame_resets_counter() {
        let mut dog = Watchdog::new(&config(50, 100), 16.0);
        for _ in 0..99 {
            assert!(!matches!(dog.record_frame(40.0), LagVerdict::Fatal(_)));
        }
        assert_eq!(dog.record_frame(10.0), LagVerdict::OnTime);
        assert_eq!(dog.consecutive_lag(), 0);
        for _ in 0..100 {
            assert!(!matches!(dog.record_frame(40.0), LagVerdict::Fatal(_)));
        }
        assert!(!dog.is_tripped());
    }

    #[test]
    fn warning_crosses_once() {
        let mut dog = Watchdog::new(&config(2, 10), 16.0);
        assert_eq!(dog.record_frame(20.0), LagVerdict::Over { consecutive: 1 });
        assert_eq!(dog.record_frame(20.0), LagVerdict::Over { consecutive: 2 });
        assert_eq!(
            dog.record_frame(20.0),
            LagVerdict::Warning {
                consecutive: 3,
                crossed: true
            }
        );
        assert_eq!(
            dog.record_frame(20.0),
            LagVerdict::Warning {
                consecutive: 4,
                crossed: false
            }
        );
    }

    #[test]
    fn idle_timeout_fires_after_continuous_idleness() {
        let cfg = WatchdogConfig {
            idle_timeout_ms: 5_000,
            ..WatchdogConfig::default()
        };
        let mut dog = Watchdog::new(&cfg, 16.0);
        dog.start(0.0);
        assert!(dog.check_liveness(0.0, 0).is_none());
        assert!(dog.check_liveness(3_000.0, 0).is_none());
        // A human shows up and resets the idle window.
        assert!(dog.check_liveness(4_000.0, 1).is_none());
        assert!(dog.check_liveness(5_000.0, 0).is_none());
        assert!(dog.check_liveness(9_000.0, 0).is_none());
        let reason = dog.check_liveness(10_500.0, 0);
        assert!(matches!(
            reason,
            Some(ShutdownReason::IdleTimeoutExceeded { .. })
        ));
        assert!(dog.check_liveness(20_000.0, 0).is_none());
    }

    #[test]
    fn checks_are_rate_limited() {
        let cfg = WatchdogConfig {
            idle_timeout_ms: 10,
            liveness_check_interval_ms: 1000,
            ..WatchdogConfig::default()
        };
        let mut dog = Watchdog::new(&cfg, 16.0);
        dog.start(0.0);
        assert!(dog.check_liveness(0.0, 0).is_none());
        // Idle for longer than the timeout, but inside the check interval.
        assert!(dog.check_liveness(500.0, 0).is_none());
        assert!(dog.check_liveness(1000.0, 0).is_some());
    }

    #[test]
    fn lifespan_is_capped_at_six_hours() {
        let cfg = WatchdogConfig {
            max_lifespan_ms: 24 * 60 * 60 * 1000,
            idle_timeout_ms: 0,
            ..WatchdogConfig::default()
        };
        let mut dog = Watchdog::new(&cfg, 16.0);
        assert!((dog.lifespan_ms() - ABSOLUTE_LIFESPAN_CEILING_MS).abs() < 1e-9);
        dog.start(0.0);
        assert!(dog.check_liveness(ABSOLUTE_LIFESPAN_CEILING_MS, 1).is_none());
        assert!(matches!(
            dog.check_liveness(ABSOLUTE_LIFESPAN_CEILING_MS + 1000.0, 1),
            Some(ShutdownReason::LifespanExceeded { .. })
        ));
    }

    #[tokio::test(start_paused = true)]
    async fn stall_monitor_reports_silent_scheduler() {
        let heartbeat = Arc::new(Heartbeat::new());
        let clock = Arc::new(ManualClock::new(0.0));
        heartbeat.set_running(true, 0.0);

        let task = tokio::spawn(monitor_stalls(
            Arc::clone(&heartbeat),
            Arc::clone(&clock) as Arc<dyn ClockSource>,
            100.0,
        ));

        // Frames keep coming for a while.
        for _ in 0..10 {
            clock.advance_ms(20.0);
            heartbeat.beat(clock.now_ms());
            tokio::time::sleep(Duration::from_millis(20)).await;
        }
        // Then nothing for half a second.
        clock.advance_ms(500.0);
        tokio::time::sleep(Duration::from_millis(200)).await;

        heartbeat.finish();
        tokio::time::sleep(Duration::from_millis(100)).await;
        let stalls = task.await.unwrap();
        assert_eq!(stalls, 1);
    }
}
