//! Observer API server for the Cadence engine.
//!
//! This crate provides an Axum HTTP server that exposes:
//!
//! - **`WebSocket` endpoints** (`/ws/snapshots`, `/ws/messages`) streaming
//!   the snapshots and channel messages the authoritative scheduler sends,
//!   via [`tokio::sync::broadcast`]
//! - **REST endpoints** for scheduler status and frame telemetry
//! - **Operator REST endpoints** for runtime control (pause, resume,
//!   time scale, manual render and frame requests, stop)
//! - **Minimal HTML status page** (`GET /`)
//!
//! # Architecture
//!
//! The scheduler never waits on the observer. It publishes snapshots
//! through [`BroadcastTransport`] and the engine refreshes the in-memory
//! [`ObserverSnapshot`] after each logic frame with a non-blocking write.
//! Operator requests go through the shared
//! [`SchedulerControl`](cadence_core::control::SchedulerControl) atomics
//! and take effect at the next frame.
//!
//! [`BroadcastTransport`]: transport::BroadcastTransport
//! [`ObserverSnapshot`]: state::ObserverSnapshot

pub mod error;
pub mod handlers;
pub mod operator;
pub mod router;
pub mod server;
pub mod startup;
pub mod state;
pub mod transport;
pub mod ws;

// Re-export primary types for convenience.
pub use router::build_router;
pub use server::{ServerConfig, ServerError, start_server};
pub use state::{AppState, ChannelMessage, ObserverSnapshot};
pub use transport::BroadcastTransport;
