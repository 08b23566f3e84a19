//! Tick callback that updates the Observer API state.
//!
//! After each logic frame, this callback copies the scheduler's status,
//! latest telemetry and any new telemetry events into the in-memory
//! [`ObserverSnapshot`](cadence_observer::ObserverSnapshot). Snapshots are
//! not handled here; they reach `WebSocket` clients through the
//! scheduler's transport.

use std::sync::Arc;

use cadence_core::runner::TickCallback;
use cadence_core::scene::SceneGraph;
use cadence_core::scheduler::Scheduler;
use cadence_observer::state::AppState;
use cadence_types::FrameTelemetry;
use tracing::debug;

/// Callback that bridges the frame loop to the Observer API.
pub struct ObserverCallback {
    state: Arc<AppState>,
    /// Events the recorder had produced (kept or evicted) at the last
    /// successful publish.
    published_total: u64,
}

impl ObserverCallback {
    /// Create a new observer callback backed by the given app state.
    pub const fn new(state: Arc<AppState>) -> Self {
        Self {
            state,
            published_total: 0,
        }
    }

    /// Copy the scheduler's current view into the observer snapshot.
    ///
    /// Uses `try_write` so the frame loop never waits on a REST handler.
    /// A skipped publish is caught up by the next one. Returns whether the
    /// snapshot was updated.
    pub fn publish<S: SceneGraph>(&mut self, scheduler: &Scheduler<S>) -> bool {
        let Ok(mut snap) = self.state.snapshot.try_write() else {
            debug!(frame = scheduler.frames(), "Observer snapshot busy, skipping publish");
            return false;
        };

        let recorder = scheduler.telemetry();
        let kept = recorder.events().count();
        let total = recorder
            .dropped_events()
            .saturating_add(u64::try_from(kept).unwrap_or(u64::MAX));
        let fresh = usize::try_from(total.saturating_sub(self.published_total)).unwrap_or(usize::MAX);
        if fresh > 0 {
            snap.extend_events(recorder.recent_events(fresh.min(kept)));
        }
        self.published_total = total;

        snap.status = Some(scheduler.status());
        snap.telemetry = recorder.latest().clone();
        snap.dropped_events = recorder.dropped_events();
        true
    }
}

impl<S: SceneGraph> TickCallback<S> for ObserverCallback {
    fn on_tick(&mut self, telemetry: &FrameTelemetry, scheduler: &mut Scheduler<S>) {
        if self.publish(scheduler) {
            debug!(frame = telemetry.frame, "Observer snapshot updated");
        }
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use cadence_core::clock::{ClockSource, ManualClock};
    use cadence_core::config::EngineConfig;
    use cadence_core::entity::Entity;
    use cadence_core::scene::SceneTree;
    use cadence_types::{ProcessRole, SchedulerPhase, TelemetryEvent};

    use super::*;

    fn scheduler() -> Scheduler {
        let mut config = EngineConfig::default();
        config.watchdog.idle_timeout_ms = 0;
        let clock: Arc<dyn ClockSource> = Arc::new(ManualClock::new(0.0));
        Scheduler::new(&config, ProcessRole::Authoritative, SceneTree::new(), clock).unwrap()
    }

    #[tokio::test]
    async fn publish_copies_status_and_new_events_once() {
        let state = Arc::new(AppState::default());
        let mut callback = ObserverCallback::new(Arc::clone(&state));
        let mut scheduler = scheduler();

        let a = Entity::with_id("a").build();
        scheduler.register(&a).unwrap();
        assert!(scheduler.register(&Entity::with_id("a").build()).is_err());

        assert!(callback.publish(&scheduler));
        assert!(callback.publish(&scheduler));

        let snap = state.snapshot.read().await;
        let status = snap.status.as_ref().unwrap();
        assert_eq!(status.phase, SchedulerPhase::Stopped);
        assert_eq!(status.entities, 1);
        assert_eq!(snap.events.len(), 1);
        assert!(matches!(
            snap.events.first().unwrap().event,
            TelemetryEvent::DuplicateId { .. }
        ));
    }

    #[tokio::test]
    async fn busy_snapshot_is_skipped_then_caught_up() {
        let state = Arc::new(AppState::default());
        let mut callback = ObserverCallback::new(Arc::clone(&state));
        let mut scheduler = scheduler();
        let a = Entity::with_id("a").build();
        scheduler.register(&a).unwrap();
        assert!(scheduler.register(&Entity::with_id("a").build()).is_err());

        {
            let _reader = state.snapshot.read().await;
            assert!(!callback.publish(&scheduler));
        }
        assert!(callback.publish(&scheduler));
        assert_eq!(state.snapshot.read().await.events.len(), 1);
    }
}
