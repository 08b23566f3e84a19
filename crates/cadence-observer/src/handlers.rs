//! REST API endpoint handlers for the Observer server.
//!
//! All handlers read from the in-memory [`ObserverSnapshot`] via the
//! shared [`AppState`].
//!
//! # Endpoints
//!
//! | Method | Path | Description |
//! |--------|------|-------------|
//! | `GET` | `/` | Minimal HTML status page |
//! | `GET` | `/health` | Liveness probe |
//! | `GET` | `/api/status` | Scheduler status and uptime |
//! | `GET` | `/api/telemetry` | Latest frame telemetry and recent events |
//!
//! [`ObserverSnapshot`]: crate::state::ObserverSnapshot

use std::sync::Arc;

use axum::Json;
use axum::extract::{Query, State};
use axum::response::{Html, IntoResponse};
use cadence_types::{FrameTelemetry, SchedulerStatus, TelemetryRecord};
use chrono::Utc;

use crate::error::ObserverError;
use crate::state::AppState;

/// Default number of events returned by `GET /api/telemetry`.
const DEFAULT_EVENT_LIMIT: usize = 100;

// ---------------------------------------------------------------------------
// Query parameter and response structs
// ---------------------------------------------------------------------------

/// Query parameters for the `GET /api/telemetry` endpoint.
#[derive(Debug, serde::Deserialize)]
pub struct TelemetryQuery {
    /// Maximum number of events to return (default 100).
    pub limit: Option<usize>,
}

/// Response body for `GET /api/status`.
#[derive(Debug, serde::Serialize)]
pub struct StatusResponse {
    /// Scheduler status.
    #[serde(flatten)]
    pub status: SchedulerStatus,
    /// Milliseconds since the scheduler entered `Running`.
    pub uptime_ms: Option<i64>,
    /// Whether an operator stop is pending.
    pub stop_requested: bool,
}

/// Response body for `GET /api/telemetry`.
#[derive(Debug, serde::Serialize)]
pub struct TelemetryResponse {
    /// Telemetry of the latest logic frame.
    pub latest: FrameTelemetry,
    /// Most recent events, newest first.
    pub events: Vec<TelemetryRecord>,
    /// Events evicted before they could be published.
    pub dropped_events: u64,
}

// ---------------------------------------------------------------------------
// GET / -- minimal HTML status page
// ---------------------------------------------------------------------------

/// Serve a minimal HTML page showing scheduler status and API links.
pub async fn index(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    let snapshot = state.snapshot.read().await;
    let (phase, frames, sim_time) = snapshot.status.as_ref().map_or_else(
        || (String::from("Unknown"), 0, 0.0),
        |s| (format!("{:?}", s.phase), s.frames, s.sim_time_ms),
    );
    let render_fps = snapshot.telemetry.render_fps;
    let event_count = snapshot.events.len();

    Html(format!(
        r#"<!DOCTYPE html>
<html lang="en">
<head>
    <meta charset="utf-8">
    <title>Cadence Observer</title>
    <style>
        body {{ background: #0d1117; color: #c9d1d9; font-family: monospace; padding: 2rem; }}
        h1 {{ color: #58a6ff; }}
        .metric {{ display: inline-block; border: 1px solid #30363d; padding: 1rem; margin: 0.5rem 0.5rem 0.5rem 0; }}
        a {{ color: #58a6ff; }}
    </style>
</head>
<body>
    <h1>Cadence Observer</h1>
    <div class="metric">Phase<br><b>{phase}</b></div>
    <div class="metric">Frames<br><b>{frames}</b></div>
    <div class="metric">Sim time (ms)<br><b>{sim_time:.0}</b></div>
    <div class="metric">Logic fps<br><b>{render_fps}</b></div>
    <div class="metric">Events<br><b>{event_count}</b></div>
    <ul>
        <li><a href="/health">/health</a></li>
        <li><a href="/api/status">/api/status</a></li>
        <li><a href="/api/telemetry">/api/telemetry</a></li>
        <li>/ws/snapshots (WebSocket)</li>
    </ul>
</body>
</html>"#
    ))
}

// ---------------------------------------------------------------------------
// GET /health
// ---------------------------------------------------------------------------

/// Liveness probe. Always succeeds while the server is up.
pub async fn health() -> impl IntoResponse {
    Json(serde_json::json!({ "status": "ok" }))
}

// ---------------------------------------------------------------------------
// GET /api/status
// ---------------------------------------------------------------------------

/// Return the latest scheduler status.
///
/// Returns 503 until the scheduler has published its first status.
pub async fn status(
    State(state): State<Arc<AppState>>,
) -> Result<Json<StatusResponse>, ObserverError> {
    let snapshot = state.snapshot.read().await;
    let status = snapshot.status.clone().ok_or_else(|| {
        ObserverError::Unavailable("scheduler has not published status yet".to_owned())
    })?;

    let uptime_ms = status
        .started_at
        .map(|started| Utc::now().signed_duration_since(started).num_milliseconds());
    let stop_requested = state
        .control
        .as_ref()
        .is_some_and(|c| c.is_stop_requested());

    Ok(Json(StatusResponse {
        status,
        uptime_ms,
        stop_requested,
    }))
}

// ---------------------------------------------------------------------------
// GET /api/telemetry
// ---------------------------------------------------------------------------

/// Return the latest frame telemetry and the most recent events.
pub async fn telemetry(
    State(state): State<Arc<AppState>>,
    Query(query): Query<TelemetryQuery>,
) -> Json<TelemetryResponse> {
    let limit = query.limit.unwrap_or(DEFAULT_EVENT_LIMIT);
    let snapshot = state.snapshot.read().await;

    Json(TelemetryResponse {
        latest: snapshot.telemetry.clone(),
        events: snapshot.events.iter().rev().take(limit).cloned().collect(),
        dropped_events: snapshot.dropped_events,
    })
}

// ---------------------------------------------------------------------------
// Fallback
// ---------------------------------------------------------------------------

/// Answer unknown routes with a JSON 404.
pub async fn not_found(uri: axum::http::Uri) -> ObserverError {
    ObserverError::NotFound(format!("no route for {uri}"))
}
