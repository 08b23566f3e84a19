//! In-process client scheduler fed by the observer's snapshot stream.
//!
//! The client subscribes to the same broadcast channel `WebSocket` clients
//! read from, so it sees exactly what a remote client would. It does not
//! start until the first snapshot has arrived.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use cadence_core::clock::{ClockSource, MonotonicClock};
use cadence_core::config::EngineConfig;
use cadence_core::control::SchedulerControl;
use cadence_core::entity::Entity;
use cadence_core::frame_source::FrameSource;
use cadence_core::runner::{self, NoOpCallback, RunResult, RunnerError};
use cadence_core::scene::{Behaviour, FrameContext, SceneTree};
use cadence_core::scheduler::{FnGate, Scheduler};
use cadence_core::snapshot::SnapshotSender;
use cadence_observer::state::AppState;
use cadence_types::{EntityId, EntityKind, ProcessRole, Snapshot};
use tokio::sync::broadcast;
use tokio::sync::broadcast::error::RecvError;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use crate::error::EngineError;

/// How long to wait for the client to stop after the server has ended.
const STOP_TIMEOUT: Duration = Duration::from_secs(2);

/// Id of the viewport root the client renders through.
const CLIENT_VIEW: &str = "client-view";

/// Render frames between view log lines.
const LOG_VIEW_EVERY: u64 = 20;

/// A running loopback client.
pub struct LoopbackClient {
    control: Arc<SchedulerControl>,
    run: JoinHandle<Result<RunResult, RunnerError>>,
    feed: JoinHandle<()>,
}

impl LoopbackClient {
    /// Spawn a client scheduler reading snapshots from `state`.
    ///
    /// `watch` names a streamed entity whose blended state is logged at
    /// debug level.
    ///
    /// # Errors
    ///
    /// Returns [`EngineError::Scheduler`] if the client scheduler cannot be
    /// built.
    pub fn spawn(
        config: &EngineConfig,
        state: &AppState,
        watch: Option<EntityId>,
    ) -> Result<Self, EngineError> {
        let clock: Arc<dyn ClockSource> = Arc::new(MonotonicClock::new());
        let mut scheduler = Scheduler::new(config, ProcessRole::Client, SceneTree::new(), clock)?;

        if let Some(target) = watch {
            let view = Entity::with_id(CLIENT_VIEW).kind(EntityKind::Viewport).build();
            scheduler.add_root(view)?;
            scheduler
                .scene_mut()
                .set_behaviour(&EntityId::from(CLIENT_VIEW), Box::new(ViewLogger { target }))?;
        }

        let received = Arc::new(AtomicBool::new(false));
        let gate_flag = Arc::clone(&received);
        let mut scheduler = scheduler.with_gate(Box::new(FnGate::new("first-snapshot", move || {
            gate_flag.load(Ordering::Acquire)
        })));

        let sender = scheduler.snapshot_sender().ok_or_else(|| EngineError::UnsupportedRole {
            role: ProcessRole::Client,
            message: "scheduler has no snapshot pipeline".to_owned(),
        })?;
        let feed = tokio::spawn(feed_snapshots(state.subscribe(), sender, received));

        let control = scheduler.control();
        let frame_rate = config.scheduler.frame_rate;
        let run = tokio::spawn(async move {
            let mut source = FrameSource::interval(frame_rate);
            runner::run_scheduler(&mut scheduler, &mut source, &mut NoOpCallback).await
        });

        info!("Loopback client started");
        Ok(Self { control, run, feed })
    }

    /// Stop the client and wait briefly for its frame loop to end.
    pub async fn stop(self) {
        self.control.request_stop();
        match tokio::time::timeout(STOP_TIMEOUT, self.run).await {
            Ok(Ok(Ok(result))) => info!(
                reason = ?result.end_reason,
                frames = result.frames,
                logic_ticks = result.logic_ticks,
                "Loopback client stopped"
            ),
            Ok(Ok(Err(e))) => warn!(error = %e, "Loopback client failed"),
            Ok(Err(e)) => warn!(error = %e, "Loopback client task panicked"),
            Err(_elapsed) => warn!("Loopback client did not stop in time"),
        }
        self.feed.abort();
    }
}

/// Forward broadcast snapshots into the client pipeline until either end
/// goes away.
async fn feed_snapshots(
    mut rx: broadcast::Receiver<Arc<Snapshot>>,
    sender: SnapshotSender,
    received: Arc<AtomicBool>,
) {
    loop {
        match rx.recv().await {
            Ok(snapshot) => {
                received.store(true, Ordering::Release);
                if sender.push(snapshot).is_err() {
                    debug!("Client pipeline closed, stopping snapshot feed");
                    return;
                }
            }
            Err(RecvError::Lagged(n)) => {
                debug!(skipped = n, "Loopback client lagged, skipping ahead");
            }
            Err(RecvError::Closed) => return,
        }
    }
}

/// Logs the interpolated state of one entity now and then.
struct ViewLogger {
    target: EntityId,
}

impl Behaviour for ViewLogger {
    fn render(&mut self, _entity: &Entity, ctx: &FrameContext<'_>) {
        if ctx.frame.checked_rem(LOG_VIEW_EVERY) != Some(0) {
            return;
        }
        let Some(frame) = ctx.interpolation else {
            return;
        };
        if let Some(state) = frame.blend(self.target.as_str()) {
            debug!(
                id = %self.target,
                x = state.number("x"),
                y = state.number("y"),
                render_time_ms = frame.render_time_ms,
                weight = frame.weight,
                starved = frame.starved,
                "Client view"
            );
        }
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use cadence_types::ShutdownReason;

    use super::*;

    #[tokio::test]
    async fn feed_opens_gate_and_fills_pipeline() {
        let state = AppState::default();
        let mut config = EngineConfig::default();
        config.scheduler.dependency_poll_interval_ms = 10;
        let clock: Arc<dyn ClockSource> = Arc::new(MonotonicClock::new());
        let scheduler = Scheduler::new(&config, ProcessRole::Client, SceneTree::new(), clock).unwrap();
        let sender = scheduler.snapshot_sender().unwrap();
        let received = Arc::new(AtomicBool::new(false));
        let feed = tokio::spawn(feed_snapshots(state.subscribe(), sender, Arc::clone(&received)));

        assert!(!received.load(Ordering::Acquire));
        state.broadcast(Arc::new(Snapshot::new(50.0)));
        tokio::time::timeout(Duration::from_secs(1), async {
            while !received.load(Ordering::Acquire) {
                tokio::task::yield_now().await;
            }
        })
        .await
        .unwrap();

        feed.abort();
    }

    #[tokio::test]
    async fn client_starts_on_first_snapshot_and_stops_on_request() {
        let state = AppState::default();
        let mut config = EngineConfig::default();
        config.scheduler.dependency_poll_interval_ms = 10;
        let client = LoopbackClient::spawn(&config, &state, Some(EntityId::from("p"))).unwrap();

        tokio::time::sleep(Duration::from_millis(30)).await;
        state.broadcast(Arc::new(Snapshot::new(0.0)));
        tokio::time::sleep(Duration::from_millis(100)).await;

        let control = Arc::clone(&client.control);
        client.stop().await;
        assert_eq!(control.end_reason().await, Some(ShutdownReason::OperatorStop));
        assert!(!control.is_stop_requested());
    }
}
