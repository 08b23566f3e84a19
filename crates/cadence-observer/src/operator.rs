//! Operator REST API handlers for runtime scheduler control.
//!
//! These endpoints are separate from the read-only observer API. They act
//! on the shared [`SchedulerControl`]; every request takes effect at the
//! start of the scheduler's next frame.
//!
//! # Endpoints
//!
//! | Method | Path | Description |
//! |--------|------|-------------|
//! | `POST` | `/api/operator/pause` | Freeze simulation time |
//! | `POST` | `/api/operator/resume` | Unfreeze simulation time |
//! | `POST` | `/api/operator/time-scale` | Set the time-scale factor |
//! | `POST` | `/api/operator/render` | Request one render (manual render mode) |
//! | `POST` | `/api/operator/frame` | Request one frame (manual tick mode) |
//! | `POST` | `/api/operator/stop` | Trigger an orderly shutdown |
//!
//! [`SchedulerControl`]: cadence_core::control::SchedulerControl

use std::sync::Arc;

use axum::Json;
use axum::extract::State;
use axum::response::IntoResponse;
use cadence_core::control::SchedulerControl;

use crate::error::ObserverError;
use crate::state::AppState;

// ---------------------------------------------------------------------------
// Request / response types
// ---------------------------------------------------------------------------

/// Request body for `POST /api/operator/time-scale`.
#[derive(Debug, serde::Deserialize)]
pub struct SetTimeScaleRequest {
    /// New time-scale factor (finite, non-negative).
    pub time_scale: f64,
}

/// Generic success response.
#[derive(Debug, serde::Serialize)]
struct OperatorResponse {
    /// Whether the operation succeeded.
    ok: bool,
    /// Human-readable message.
    message: String,
}

fn control(state: &AppState) -> Result<&Arc<SchedulerControl>, ObserverError> {
    state
        .control
        .as_ref()
        .ok_or_else(|| ObserverError::Unavailable("scheduler control not available".to_owned()))
}

fn ok(message: &str) -> Json<OperatorResponse> {
    Json(OperatorResponse {
        ok: true,
        message: message.to_owned(),
    })
}

// ---------------------------------------------------------------------------
// POST /api/operator/pause
// ---------------------------------------------------------------------------

/// Freeze simulation time. Frames keep running so the process stays
/// responsive and playback keeps its position.
pub async fn pause(
    State(state): State<Arc<AppState>>,
) -> Result<impl IntoResponse, ObserverError> {
    control(&state)?.pause();
    Ok(ok("Simulation time paused"))
}

// ---------------------------------------------------------------------------
// POST /api/operator/resume
// ---------------------------------------------------------------------------

/// Unfreeze simulation time after a pause.
pub async fn resume(
    State(state): State<Arc<AppState>>,
) -> Result<impl IntoResponse, ObserverError> {
    control(&state)?.resume();
    Ok(ok("Simulation time resumed"))
}

// ---------------------------------------------------------------------------
// POST /api/operator/time-scale
// ---------------------------------------------------------------------------

/// Change the time-scale factor at runtime.
pub async fn set_time_scale(
    State(state): State<Arc<AppState>>,
    Json(body): Json<SetTimeScaleRequest>,
) -> Result<impl IntoResponse, ObserverError> {
    let prev = control(&state)?
        .set_time_scale(body.time_scale)
        .map_err(|e| ObserverError::InvalidRequest(e.to_string()))?;

    Ok(Json(serde_json::json!({
        "ok": true,
        "message": format!("Time scale changed from {prev} to {}", body.time_scale),
        "previous_time_scale": prev,
        "new_time_scale": body.time_scale,
    })))
}

// ---------------------------------------------------------------------------
// POST /api/operator/render
// ---------------------------------------------------------------------------

/// Request one render traversal. Requests made before the next logic
/// frame coalesce into one render.
pub async fn request_render(
    State(state): State<Arc<AppState>>,
) -> Result<impl IntoResponse, ObserverError> {
    control(&state)?.request_render();
    Ok(ok("Render requested"))
}

// ---------------------------------------------------------------------------
// POST /api/operator/frame
// ---------------------------------------------------------------------------

/// Request one frame when the scheduler runs on manual ticks.
pub async fn request_frame(
    State(state): State<Arc<AppState>>,
) -> Result<impl IntoResponse, ObserverError> {
    control(&state)?.request_frame();
    Ok(ok("Frame requested"))
}

// ---------------------------------------------------------------------------
// POST /api/operator/stop
// ---------------------------------------------------------------------------

/// Trigger an orderly shutdown.
///
/// The scheduler moves through `Stopping` to `Stopped` at the start of its
/// next frame. The HTTP server keeps running so the final status can still
/// be queried.
pub async fn stop(
    State(state): State<Arc<AppState>>,
) -> Result<impl IntoResponse, ObserverError> {
    control(&state)?.request_stop();
    Ok(ok("Stop requested -- scheduler will stop before its next frame"))
}
