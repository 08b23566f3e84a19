//! Client-side snapshot synchronization pipeline.
//!
//! Snapshots arrive from the network task through a [`SnapshotSender`]
//! (an unbounded `tokio::sync::mpsc` channel) and are drained by the
//! scheduler at the start of every [`SnapshotPipeline::advance`]. Playback
//! keeps a `previous`/`next` pair bracketing the local render time:
//!
//! ```text
//! while head.ts <= render_time || render_time > next.ts:
//!     previous = next; next = pop(head)
//! ```
//!
//! Once playback has started `previous.ts <= render_time <= next.ts`
//! holds, except on underflow: when the buffer is empty and render time
//! has run past `next`, the pipeline reports starvation and either holds
//! on `next` or extrapolates along the last pair, per [`UnderflowPolicy`].

use std::collections::VecDeque;
use std::sync::Arc;

use cadence_types::{EntityState, Snapshot, UnderflowPolicy};
use tokio::sync::mpsc;
use tracing::{debug, warn};

/// Errors raised by the snapshot pipeline.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum SnapshotError {
    /// The snapshot is older than the newest one already accepted.
    #[error("out-of-order snapshot at {timestamp} ms (newest is {newest} ms)")]
    OutOfOrder {
        /// Timestamp of the rejected snapshot.
        timestamp: f64,
        /// Newest accepted timestamp.
        newest: f64,
    },

    /// The pipeline has been dropped.
    #[error("snapshot pipeline is closed")]
    Closed,
}

/// Producer half handed to the network task.
#[derive(Debug, Clone)]
pub struct SnapshotSender {
    tx: mpsc::UnboundedSender<Arc<Snapshot>>,
}

impl SnapshotSender {
    /// Deliver a snapshot to the pipeline.
    ///
    /// Ordering is checked when the scheduler drains the channel; an
    /// out-of-order snapshot is dropped there and reported to telemetry.
    ///
    /// # Errors
    ///
    /// Returns [`SnapshotError::Closed`] once the pipeline is gone.
    pub fn push(&self, snapshot: impl Into<Arc<Snapshot>>) -> Result<(), SnapshotError> {
        self.tx
            .send(snapshot.into())
            .map_err(|_closed| SnapshotError::Closed)
    }

    /// Whether the pipeline is gone.
    pub fn is_closed(&self) -> bool {
        self.tx.is_closed()
    }
}

/// The snapshot pair bracketing render time, with its blend weight.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct InterpolationFrame {
    /// Older snapshot of the pair.
    pub previous: Option<Arc<Snapshot>>,
    /// Newer snapshot of the pair.
    pub next: Option<Arc<Snapshot>>,
    /// Blend weight from `previous` towards `next`. In `[0, 1]` unless
    /// extrapolating.
    pub weight: f64,
    /// Render time the pair was computed for.
    pub render_time_ms: f64,
    /// Render time ran past every buffered snapshot.
    pub starved: bool,
}

impl InterpolationFrame {
    /// Interpolated state of one entity.
    ///
    /// Numeric attributes are blended between the pair; everything else
    /// comes from `next`. An entity missing from `previous` is taken
    /// verbatim from `next`.
    pub fn blend(&self, entity_id: &str) -> Option<EntityState> {
        let next = self.next.as_ref()?.entity(entity_id)?;
        match self.previous.as_ref().and_then(|p| p.entity(entity_id)) {
            Some(previous) => Some(previous.lerp(next, self.weight)),
            None => Some(next.clone()),
        }
    }

    /// Whether playback has started.
    pub const fn is_playing(&self) -> bool {
        self.next.is_some()
    }
}

/// What one [`SnapshotPipeline::advance`] call did.
#[derive(Debug, Clone, Default)]
pub struct PipelineAdvance {
    /// The pair for this render time.
    pub frame: InterpolationFrame,
    /// Snapshots popped from the buffer this call.
    pub consumed: usize,
    /// Snapshots drained from the channel and rejected as out of order.
    pub rejected: Vec<SnapshotError>,
    /// Starvation began this call (it was not starved on the previous one).
    pub starvation_began: bool,
}

/// Ordered buffer of pending snapshots plus the playback pair.
#[derive(Debug)]
pub struct SnapshotPipeline {
    policy: UnderflowPolicy,
    inbox: mpsc::UnboundedReceiver<Arc<Snapshot>>,
    pending: VecDeque<Arc<Snapshot>>,
    previous: Option<Arc<Snapshot>>,
    next: Option<Arc<Snapshot>>,
    newest_ms: Option<f64>,
    starved: bool,
    accepted: u64,
    rejected: u64,
}

impl SnapshotPipeline {
    /// Create a pipeline and the sender feeding it.
    pub fn channel(policy: UnderflowPolicy) -> (SnapshotSender, Self) {
        let (tx, inbox) = mpsc::unbounded_channel();
        let pipeline = Self {
            policy,
            inbox,
            pending: VecDeque::new(),
            previous: None,
            next: None,
            newest_ms: None,
            starved: false,
            accepted: 0,
            rejected: 0,
        };
        (SnapshotSender { tx }, pipeline)
    }

    /// Append a snapshot directly.
    ///
    /// # Errors
    ///
    /// Returns [`SnapshotError::OutOfOrder`] when the timestamp is lower
    /// than the newest accepted one. The snapshot is dropped and playback
    /// is unaffected.
    pub fn push(&mut self, snapshot: impl Into<Arc<Snapshot>>) -> Result<(), SnapshotError> {
        let snapshot = snapshot.into();
        if let Some(newest) = self.newest_ms {
            if snapshot.timestamp < newest {
                self.rejected = self.rejected.saturating_add(1);
                warn!(
                    timestamp = snapshot.timestamp,
                    newest, "Dropping out-of-order snapshot"
                );
                return Err(SnapshotError::OutOfOrder {
                    timestamp: snapshot.timestamp,
                    newest,
                });
            }
        }
        self.newest_ms = Some(snapshot.timestamp);
        self.accepted = self.accepted.saturating_add(1);
        self.pending.push_back(snapshot);
        Ok(())
    }

    /// Move playback forward to `render_time_ms`.
    pub fn advance(&mut self, render_time_ms: f64) -> PipelineAdvance {
        let mut rejected = Vec::new();
        while let Ok(snapshot) = self.inbox.try_recv() {
            if let Err(e) = self.push(snapshot) {
                rejected.push(e);
            }
        }

        let mut consumed = 0_usize;
        while let Some(head) = self.pending.front() {
            let past_next = self
                .next
                .as_ref()
                .is_some_and(|n| render_time_ms > n.timestamp);
            if head.timestamp > render_time_ms && !past_next {
                break;
            }
            let popped = self.pending.pop_front();
            self.previous = self.next.take();
            self.next = popped;
            consumed = consumed.saturating_add(1);
        }

        let starved = self.pending.is_empty()
            && self
                .next
                .as_ref()
                .is_some_and(|n| render_time_ms > n.timestamp);
        let starvation_began = starved && !self.starved;
        self.starved = starved;
        if starvation_began {
            debug!(render_time_ms, "Snapshot buffer starved");
        }

        PipelineAdvance {
            frame: self.frame_for(render_time_ms, starved),
            consumed,
            rejected,
            starvation_began,
        }
    }

    fn frame_for(&self, render_time_ms: f64, starved: bool) -> InterpolationFrame {
        let (previous, next) = if starved && self.policy == UnderflowPolicy::Hold {
            (self.next.clone(), self.next.clone())
        } else {
            (self.previous.clone(), self.next.clone())
        };

        let weight = match (&previous, &next) {
            (Some(p), Some(n)) => {
                let span = n.timestamp - p.timestamp;
                if span > 0.0 {
                    let raw = (render_time_ms - p.timestamp) / span;
                    if starved && self.policy == UnderflowPolicy::Extrapolate {
                        raw.max(0.0)
                    } else {
                        raw.clamp(0.0, 1.0)
                    }
                } else {
                    1.0
                }
            }
            (None, Some(_)) => 1.0,
            _ => 0.0,
        };

        InterpolationFrame {
            previous,
            next,
            weight,
            render_time_ms,
            starved,
        }
    }

    /// Snapshots waiting ahead of the playback pair.
    pub fn buffered(&self) -> usize {
        self.pending.len()
    }

    /// Whether the last advance was starved.
    pub const fn is_starved(&self) -> bool {
        self.starved
    }

    /// Newest accepted timestamp.
    pub const fn newest_ms(&self) -> Option<f64> {
        self.newest_ms
    }

    /// Snapshots accepted so far.
    pub const fn accepted(&self) -> u64 {
        self.accepted
    }

    /// Snapshots rejected as out of order so far.
    pub const fn rejected(&self) -> u64 {
        self.rejected
    }

    /// The underflow policy in force.
    pub const fn policy(&self) -> UnderflowPolicy {
        self.policy
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use cadence_types::EntityId;

    use super::*;

    fn ts(snapshot: Option<&Arc<Snapshot>>) -> Option<f64> {
        snapshot.map(|s| s.timestamp)
    }

    fn pair(frame: &InterpolationFrame) -> (Option<f64>, Option<f64>) {
        (ts(frame.previous.as_ref()), ts(frame.next.as_ref()))
    }

    fn pipeline_with(policy: UnderflowPolicy, stamps: &[f64]) -> SnapshotPipeline {
        let (_tx, mut pipeline) = SnapshotPipeline::channel(policy);
        for &t in stamps {
            pipeline.push(Snapshot::new(t)).unwrap();
        }
        pipeline
    }

    #[test]
    fn reference_trace() {
        let mut p = pipeline_with(UnderflowPolicy::Hold, &[0.0, 100.0, 200.0]);

        let a = p.advance(0.0);
        assert_eq!(pair(&a.frame), (None, Some(0.0)));
        assert!(!a.frame.starved);

        let b = p.advance(50.0);
        assert_eq!(pair(&b.frame), (Some(0.0), Some(100.0)));
        assert!((b.frame.weight - 0.5).abs() < 1e-9);

        let c = p.advance(150.0);
        assert_eq!(pair(&c.frame), (Some(100.0), Some(200.0)));

        let d = p.advance(250.0);
        assert_eq!(pair(&d.frame), (Some(200.0), Some(200.0)));
        assert!(d.frame.starved);
        assert!(d.starvation_began);
        assert!((d.frame.weight - 1.0).abs() < 1e-9);
    }

    #[test]
    fn starvation_is_reported_once_per_episode() {
        let mut p = pipeline_with(UnderflowPolicy::Hold, &[0.0]);
        p.advance(0.0);
        assert!(p.advance(10.0).starvation_began);
        assert!(!p.advance(20.0).starvation_began);
        assert!(p.is_starved());

        p.push(Snapshot::new(100.0)).unwrap();
        let resumed = p.advance(30.0);
        assert!(!resumed.frame.starved);
        assert_eq!(pair(&resumed.frame), (Some(0.0), Some(100.0)));
    }

    #[test]
    fn extrapolate_keeps_pair_and_unclamped_weight() {
        let mut p = pipeline_with(UnderflowPolicy::Extrapolate, &[0.0, 100.0, 200.0]);
        p.advance(150.0);
        let frame = p.advance(250.0).frame;
        assert!(frame.starved);
        assert_eq!(pair(&frame), (Some(100.0), Some(200.0)));
        assert!((frame.weight - 1.5).abs() < 1e-9);
    }

    #[test]
    fn out_of_order_push_is_rejected_without_affecting_playback() {
        let mut p = pipeline_with(UnderflowPolicy::Hold, &[0.0, 100.0]);
        let err = p.push(Snapshot::new(50.0));
        assert_eq!(
            err,
            Err(SnapshotError::OutOfOrder {
                timestamp: 50.0,
                newest: 100.0
            })
        );
        // Equal timestamps are fine.
        assert!(p.push(Snapshot::new(100.0)).is_ok());
        assert_eq!(p.rejected(), 1);
        assert_eq!(pair(&p.advance(20.0).frame), (Some(0.0), Some(100.0)));
    }

    #[test]
    fn channel_is_drained_on_advance() {
        let (tx, mut p) = SnapshotPipeline::channel(UnderflowPolicy::Hold);
        tx.push(Snapshot::new(0.0)).unwrap();
        tx.push(Snapshot::new(100.0)).unwrap();
        tx.push(Snapshot::new(40.0)).unwrap();
        let adv = p.advance(60.0);
        assert_eq!(adv.rejected.len(), 1);
        assert_eq!(adv.consumed, 2);
        assert_eq!(pair(&adv.frame), (Some(0.0), Some(100.0)));

        drop(p);
        assert_eq!(tx.push(Snapshot::new(200.0)), Err(SnapshotError::Closed));
    }

    #[test]
    fn invariant_holds_for_bursty_arrivals() {
        let (_tx, mut p) = SnapshotPipeline::channel(UnderflowPolicy::Hold);
        let mut next_ts = 0.0;
        let mut render = -100.0;
        for step in 0..400_u32 {
            // Bursts of three snapshots every fifth step.
            if step % 5 == 0 {
                for _ in 0..3 {
                    p.push(Snapshot::new(next_ts)).unwrap();
                    next_ts += 50.0;
                }
            }
            render += 16.0;
            let frame = p.advance(render).frame;
            if let (Some(prev), Some(next)) = (&frame.previous, &frame.next) {
                assert!(prev.timestamp <= next.timestamp);
                if !frame.starved {
                    assert!(prev.timestamp <= render || frame.previous.is_none());
                    assert!(render <= next.timestamp);
                } else {
                    assert!(render > next.timestamp);
                }
                assert!((0.0..=1.0).contains(&frame.weight));
            }
        }
    }

    #[test]
    fn blend_interpolates_entity_attributes() {
        let id = EntityId::from("u");
        let mut p = SnapshotPipeline::channel(UnderflowPolicy::Hold).1;
        p.push(Snapshot::new(0.0).with_entity(id.clone(), EntityState::new().with("x", 0.0)))
            .unwrap();
        p.push(Snapshot::new(100.0).with_entity(id, EntityState::new().with("x", 10.0)))
            .unwrap();
        p.advance(0.0);
        let frame = p.advance(25.0).frame;
        let state = frame.blend("u").unwrap();
        assert!((state.number("x").unwrap() - 2.5).abs() < 1e-9);
        assert!(frame.blend("missing").is_none());
    }
}
