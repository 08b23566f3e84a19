//! Frame telemetry recorder.
//!
//! Keeps the latest [`FrameTelemetry`], per-second frame and physics rates,
//! optional per-root timing, and a bounded log of [`TelemetryEvent`]s. The
//! oldest event is dropped once the log is full.

use std::collections::{BTreeMap, VecDeque};

use cadence_types::{EntityId, FrameTelemetry, NodeTiming, TelemetryEvent, TelemetryRecord};
use chrono::Utc;
use tracing::warn;

/// Length of the rate window in milliseconds.
const RATE_WINDOW_MS: f64 = 1000.0;

/// Collects telemetry for one scheduler.
#[derive(Debug, Clone)]
pub struct TelemetryRecorder {
    capacity: usize,
    events: VecDeque<TelemetryRecord>,
    dropped_events: u64,
    latest: FrameTelemetry,
    debug_timing: bool,
    node_timings: BTreeMap<EntityId, NodeTiming>,
    window_started_ms: Option<f64>,
    logic_frames_in_window: u32,
    physics_ticks_in_window: u32,
    render_fps: u32,
    physics_fps: u32,
}

impl TelemetryRecorder {
    /// Create a recorder keeping at most `capacity` events.
    pub fn new(capacity: usize, debug_timing: bool) -> Self {
        Self {
            capacity: capacity.max(1),
            events: VecDeque::new(),
            dropped_events: 0,
            latest: FrameTelemetry::default(),
            debug_timing,
            node_timings: BTreeMap::new(),
            window_started_ms: None,
            logic_frames_in_window: 0,
            physics_ticks_in_window: 0,
            render_fps: 0,
            physics_fps: 0,
        }
    }

    /// Append an event, evicting the oldest when full.
    pub fn record_event(&mut self, frame: u64, event: TelemetryEvent) {
        if self.events.len() >= self.capacity {
            self.events.pop_front();
            self.dropped_events = self.dropped_events.saturating_add(1);
        }
        self.events.push_back(TelemetryRecord {
            frame,
            at: Utc::now(),
            event,
        });
    }

    /// Count one frame towards the per-second rates.
    ///
    /// When a full second has passed since the window opened, the counts
    /// roll into [`render_fps`](Self::render_fps) and
    /// [`physics_fps`](Self::physics_fps) before this frame is counted.
    pub fn count_frame(&mut self, now_ms: f64, logic_fired: bool, physics_fired: bool) {
        let started = *self.window_started_ms.get_or_insert(now_ms);
        if now_ms - started >= RATE_WINDOW_MS {
            self.render_fps = self.logic_frames_in_window;
            self.physics_fps = self.physics_ticks_in_window;
            self.logic_frames_in_window = 0;
            self.physics_ticks_in_window = 0;
            self.window_started_ms = Some(now_ms);
        }
        if logic_fired {
            self.logic_frames_in_window = self.logic_frames_in_window.saturating_add(1);
        }
        if physics_fired {
            self.physics_ticks_in_window = self.physics_ticks_in_window.saturating_add(1);
        }
    }

    /// Store the telemetry of a completed logic frame.
    pub fn publish(&mut self, mut telemetry: FrameTelemetry) {
        telemetry.render_fps = self.render_fps;
        telemetry.physics_fps = self.physics_fps;
        self.latest = telemetry;
    }

    /// Add update time spent on one root.
    pub fn record_node_update(&mut self, id: &EntityId, elapsed_ms: f64) {
        let timing = self.node_timings.entry(id.clone()).or_default();
        timing.update_last_ms = elapsed_ms;
        timing.update_total_ms += elapsed_ms;
    }

    /// Add render time spent on one root.
    pub fn record_node_render(&mut self, id: &EntityId, elapsed_ms: f64) {
        let timing = self.node_timings.entry(id.clone()).or_default();
        timing.render_last_ms = elapsed_ms;
        timing.render_total_ms += elapsed_ms;
    }

    /// Per-root timing, slowest total update first.
    ///
    /// Returns `None` (and logs a warning) when debug timing is disabled.
    pub fn analyse_timing(&self) -> Option<Vec<(EntityId, NodeTiming)>> {
        if !self.debug_timing {
            warn!("Debug timing is disabled; enable scheduler.debug_timing to analyse frame timing");
            return None;
        }
        let mut rows: Vec<_> = self
            .node_timings
            .iter()
            .map(|(id, t)| (id.clone(), t.clone()))
            .collect();
        rows.sort_by(|a, b| b.1.update_total_ms.total_cmp(&a.1.update_total_ms));
        Some(rows)
    }

    /// Whether per-root timing is being recorded.
    pub const fn debug_timing(&self) -> bool {
        self.debug_timing
    }

    /// Telemetry of the last completed logic frame.
    pub const fn latest(&self) -> &FrameTelemetry {
        &self.latest
    }

    /// Recorded events, oldest first.
    pub fn events(&self) -> impl Iterator<Item = &TelemetryRecord> {
        self.events.iter()
    }

    /// Up to `limit` most recent events, oldest first.
    pub fn recent_events(&self, limit: usize) -> Vec<TelemetryRecord> {
        let skip = self.events.len().saturating_sub(limit);
        self.events.iter().skip(skip).cloned().collect()
    }

    /// Events evicted because the log was full.
    pub const fn dropped_events(&self) -> u64 {
        self.dropped_events
    }

    /// Logic frames completed during the last full second.
    pub const fn render_fps(&self) -> u32 {
        self.render_fps
    }

    /// Physics ticks completed during the last full second.
    pub const fn physics_fps(&self) -> u32 {
        self.physics_fps
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn event_log_is_bounded() {
        let mut rec = TelemetryRecorder::new(2, false);
        for frame in 0..5 {
            rec.record_event(
                frame,
                TelemetryEvent::DuplicateId {
                    id: EntityId::from("x"),
                },
            );
        }
        let frames: Vec<u64> = rec.events().map(|r| r.frame).collect();
        assert_eq!(frames, [3, 4]);
        assert_eq!(rec.dropped_events(), 3);
        assert_eq!(rec.recent_events(1).len(), 1);
    }

    #[test]
    fn rates_roll_once_per_second() {
        let mut rec = TelemetryRecorder::new(8, false);
        // 60 frames over one second; logic fires every third frame.
        for i in 0..60_u32 {
            let now = f64::from(i) * (1000.0 / 60.0);
            rec.count_frame(now, i % 3 == 0, true);
        }
        assert_eq!(rec.render_fps(), 0);
        rec.count_frame(1000.0, true, true);
        assert_eq!(rec.render_fps(), 20);
        assert_eq!(rec.physics_fps(), 60);

        rec.publish(FrameTelemetry::default());
        assert_eq!(rec.latest().render_fps, 20);
    }

    #[test]
    fn analyse_timing_requires_debug_timing() {
        let mut rec = TelemetryRecorder::new(8, false);
        rec.record_node_update(&EntityId::from("root"), 1.0);
        assert!(rec.analyse_timing().is_none());

        let mut rec = TelemetryRecorder::new(8, true);
        rec.record_node_update(&EntityId::from("fast"), 1.0);
        rec.record_node_update(&EntityId::from("slow"), 3.0);
        rec.record_node_update(&EntityId::from("slow"), 2.0);
        rec.record_node_render(&EntityId::from("slow"), 4.0);
        let rows = rec.analyse_timing().unwrap_or_default();
        let (id, timing) = rows.first().cloned().unwrap_or_default();
        assert_eq!(id.as_str(), "slow");
        assert!((timing.update_total_ms - 5.0).abs() < 1e-9);
        assert!((timing.update_last_ms - 2.0).abs() < 1e-9);
        assert!((timing.render_last_ms - 4.0).abs() < 1e-9);
    }
}
