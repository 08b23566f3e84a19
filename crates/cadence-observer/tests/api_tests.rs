//! Integration tests for the Observer API endpoints.
//!
//! Tests use Axum's `Router` directly via `tower::ServiceExt` without
//! starting a TCP server. This validates handler logic and routing
//! without needing a live network connection.

#![allow(clippy::unwrap_used)]

use std::sync::Arc;

use axum::body::Body;
use axum::http::{Request, StatusCode};
use cadence_core::control::SchedulerControl;
use cadence_observer::router::build_router;
use cadence_observer::state::AppState;
use cadence_types::{
    FrameTelemetry, ProcessRole, SchedulerPhase, SchedulerStatus, ShutdownReason, TelemetryEvent,
    TelemetryRecord,
};
use chrono::Utc;
use serde_json::Value;
use tower::ServiceExt;

fn make_status() -> SchedulerStatus {
    SchedulerStatus {
        role: ProcessRole::Authoritative,
        phase: SchedulerPhase::Running,
        frames: 120,
        logic_ticks: 40,
        physics_ticks: 40,
        sim_time_ms: 1_983.0,
        time_scale: 1.0,
        paused: false,
        consecutive_lag: 0,
        entities: 9,
        unborn: 0,
        buffered_snapshots: 0,
        started_at: Some(Utc::now()),
        shutdown: None,
    }
}

async fn make_test_state() -> (Arc<AppState>, Arc<SchedulerControl>) {
    let control = Arc::new(SchedulerControl::default());
    let state = Arc::new(AppState::with_control(16, Arc::clone(&control)));

    {
        let mut snap = state.snapshot.write().await;
        snap.status = Some(make_status());
        snap.telemetry = FrameTelemetry {
            frame: 120,
            sim_time_ms: 1_983.0,
            game_loop_fired: true,
            physics_fired: true,
            render_fps: 20,
            physics_fps: 20,
            ..FrameTelemetry::default()
        };
        snap.extend_events((1..=3).map(|frame| TelemetryRecord {
            frame,
            at: Utc::now(),
            event: TelemetryEvent::LagWarning {
                consecutive: 51,
                tick_time_ms: 20.0,
                budget_ms: 16.7,
            },
        }));
        snap.extend_events([TelemetryRecord {
            frame: 4,
            at: Utc::now(),
            event: TelemetryEvent::Shutdown {
                reason: ShutdownReason::OperatorStop,
            },
        }]);
    }

    (state, control)
}

async fn body_to_json(body: Body) -> Value {
    let bytes = axum::body::to_bytes(body, usize::MAX).await.unwrap();
    serde_json::from_slice(&bytes).unwrap()
}

fn get(uri: &str) -> Request<Body> {
    Request::builder().uri(uri).body(Body::empty()).unwrap()
}

fn post(uri: &str, body: &Value) -> Request<Body> {
    Request::builder()
        .method("POST")
        .uri(uri)
        .header("content-type", "application/json")
        .body(Body::from(body.to_string()))
        .unwrap()
}

fn post_empty(uri: &str) -> Request<Body> {
    Request::builder()
        .method("POST")
        .uri(uri)
        .body(Body::empty())
        .unwrap()
}

// =========================================================================
// Read-only endpoints
// =========================================================================

#[tokio::test]
async fn health_is_ok() {
    let app = build_router(Arc::new(AppState::default()));
    let response = app.oneshot(get("/health")).await.unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    let json = body_to_json(response.into_body()).await;
    assert_eq!(json["status"], "ok");
}

#[tokio::test]
async fn index_returns_html() {
    let (state, _) = make_test_state().await;
    let response = build_router(state).oneshot(get("/")).await.unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap();
    let html = String::from_utf8(bytes.to_vec()).unwrap();
    assert!(html.contains("Cadence Observer"));
    assert!(html.contains("Running"));
}

#[tokio::test]
async fn status_reports_scheduler_state() {
    let (state, _) = make_test_state().await;
    let response = build_router(state).oneshot(get("/api/status")).await.unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    let json = body_to_json(response.into_body()).await;
    assert_eq!(json["phase"], "running");
    assert_eq!(json["role"], "authoritative");
    assert_eq!(json["frames"], 120);
    assert_eq!(json["entities"], 9);
    assert_eq!(json["stop_requested"], false);
    assert!(json["uptime_ms"].as_i64().unwrap() >= 0);
}

#[tokio::test]
async fn status_is_unavailable_before_first_publish() {
    let app = build_router(Arc::new(AppState::default()));
    let response = app.oneshot(get("/api/status")).await.unwrap();

    assert_eq!(response.status(), StatusCode::SERVICE_UNAVAILABLE);
    let json = body_to_json(response.into_body()).await;
    assert_eq!(json["status"], 503);
}

#[tokio::test]
async fn telemetry_returns_newest_events_first() {
    let (state, _) = make_test_state().await;
    let response = build_router(state)
        .oneshot(get("/api/telemetry?limit=2"))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    let json = body_to_json(response.into_body()).await;
    assert_eq!(json["latest"]["frame"], 120);
    assert_eq!(json["latest"]["render_fps"], 20);

    let events = json["events"].as_array().unwrap();
    assert_eq!(events.len(), 2);
    let newest = events.first().unwrap();
    assert_eq!(newest["frame"], 4);
    assert_eq!(newest["event"]["kind"], "shutdown");
    assert_eq!(events.get(1).unwrap()["event"]["kind"], "lag_warning");
}

#[tokio::test]
async fn unknown_route_is_json_404() {
    let app = build_router(Arc::new(AppState::default()));
    let response = app.oneshot(get("/api/nope")).await.unwrap();

    assert_eq!(response.status(), StatusCode::NOT_FOUND);
    let json = body_to_json(response.into_body()).await;
    assert_eq!(json["status"], 404);
}

// =========================================================================
// Operator endpoints
// =========================================================================

#[tokio::test]
async fn pause_and_resume() {
    let (state, control) = make_test_state().await;
    let app = build_router(state);

    let response = app
        .clone()
        .oneshot(post_empty("/api/operator/pause"))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    assert!(control.is_paused());

    let response = app
        .oneshot(post_empty("/api/operator/resume"))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    assert!(!control.is_paused());
}

#[tokio::test]
async fn time_scale_is_validated() {
    let (state, control) = make_test_state().await;
    let app = build_router(state);

    let response = app
        .clone()
        .oneshot(post(
            "/api/operator/time-scale",
            &serde_json::json!({ "time_scale": 2.5 }),
        ))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let json = body_to_json(response.into_body()).await;
    assert_eq!(json["previous_time_scale"], 1.0);
    assert_eq!(json["new_time_scale"], 2.5);
    assert!((control.time_scale() - 2.5).abs() < f64::EPSILON);

    let response = app
        .oneshot(post(
            "/api/operator/time-scale",
            &serde_json::json!({ "time_scale": -1.0 }),
        ))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    assert!((control.time_scale() - 2.5).abs() < f64::EPSILON);
}

#[tokio::test]
async fn render_and_frame_requests_reach_control() {
    let (state, control) = make_test_state().await;
    let app = build_router(state);

    let response = app
        .clone()
        .oneshot(post_empty("/api/operator/render"))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    assert!(control.take_render_request());

    let response = app
        .oneshot(post_empty("/api/operator/frame"))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    // The pending permit is consumed without waiting.
    tokio::time::timeout(std::time::Duration::from_secs(1), control.wait_for_frame())
        .await
        .unwrap();
}

#[tokio::test]
async fn stop_sets_flag() {
    let (state, control) = make_test_state().await;
    let app = build_router(Arc::clone(&state));

    let response = app
        .clone()
        .oneshot(post_empty("/api/operator/stop"))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    assert!(control.is_stop_requested());

    let response = app.oneshot(get("/api/status")).await.unwrap();
    let json = body_to_json(response.into_body()).await;
    assert_eq!(json["stop_requested"], true);
}

#[tokio::test]
async fn operator_without_control_is_unavailable() {
    let app = build_router(Arc::new(AppState::default()));
    let response = app
        .oneshot(post_empty("/api/operator/pause"))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::SERVICE_UNAVAILABLE);
}
