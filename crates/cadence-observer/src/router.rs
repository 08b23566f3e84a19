//! Axum router construction for the Observer API.
//!
//! Assembles all routes (REST + `WebSocket`) into a single [`Router`]
//! with CORS middleware enabled for cross-origin dashboard access.

use std::sync::Arc;

use axum::Router;
use axum::routing::{get, post};
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;

use crate::handlers;
use crate::operator;
use crate::state::AppState;
use crate::ws;

/// Build the complete Axum router for the Observer server.
///
/// The router includes:
/// - `GET /` -- minimal HTML status page
/// - `GET /health` -- liveness probe
/// - `GET /api/status` -- scheduler status
/// - `GET /api/telemetry` -- frame telemetry and recent events
/// - `POST /api/operator/{pause,resume,time-scale,render,frame,stop}`
/// - `GET /ws/snapshots` -- `WebSocket` snapshot stream
/// - `GET /ws/messages` -- `WebSocket` channel message stream
///
/// CORS is configured to allow any origin for development.
pub fn build_router(state: Arc<AppState>) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    Router::new()
        // Status page
        .route("/", get(handlers::index))
        .route("/health", get(handlers::health))
        // WebSocket
        .route("/ws/snapshots", get(ws::ws_snapshots))
        .route("/ws/messages", get(ws::ws_messages))
        // REST API
        .route("/api/status", get(handlers::status))
        .route("/api/telemetry", get(handlers::telemetry))
        // Operator controls
        .route("/api/operator/pause", post(operator::pause))
        .route("/api/operator/resume", post(operator::resume))
        .route("/api/operator/time-scale", post(operator::set_time_scale))
        .route("/api/operator/render", post(operator::request_render))
        .route("/api/operator/frame", post(operator::request_frame))
        .route("/api/operator/stop", post(operator::stop))
        .fallback(handlers::not_found)
        .layer(cors)
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}
