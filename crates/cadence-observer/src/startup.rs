//! Observer server startup helper for embedding in the engine binary.
//!
//! Provides [`spawn_observer`] which binds the Observer HTTP + `WebSocket`
//! server and serves it on a background Tokio task, so the API runs
//! concurrently with the frame loop.
//!
//! # Usage
//!
//! ```rust,ignore
//! use cadence_observer::startup::spawn_observer;
//! use cadence_observer::state::AppState;
//! use std::sync::Arc;
//!
//! let state = Arc::new(AppState::default());
//! let handle = spawn_observer(8080, state).await?;
//! // The server is now running. The handle can be aborted on shutdown.
//! ```

use std::sync::Arc;

use tokio::task::JoinHandle;

use crate::server::{self, ServerConfig, ServerError};
use crate::state::AppState;

/// Errors that can occur when spawning the Observer server.
#[derive(Debug, thiserror::Error)]
pub enum StartupError {
    /// The server failed to bind or start.
    #[error("server start error: {0}")]
    Server(#[from] ServerError),
}

/// Spawn the Observer HTTP server on a background Tokio task.
///
/// Binds to `0.0.0.0:{port}` before spawning, so a taken port is reported
/// to the caller instead of only being logged from the task. Returns a
/// [`JoinHandle`] so the caller can manage the server's lifecycle alongside
/// the frame loop.
///
/// # Errors
///
/// Returns [`StartupError::Server`] if the server cannot bind to the
/// requested address.
pub async fn spawn_observer(
    port: u16,
    state: Arc<AppState>,
) -> Result<JoinHandle<()>, StartupError> {
    let config = ServerConfig {
        host: String::from("0.0.0.0"),
        port,
    };
    let listener = server::bind(&config).await?;

    let handle = tokio::spawn(async move {
        if let Err(e) = server::serve(listener, state).await {
            tracing::error!(error = %e, "Observer server exited with error");
        }
    });

    tracing::info!(port, "Observer server spawned on background task");

    Ok(handle)
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn spawned_server_answers_health() {
        let listener = server::bind(&ServerConfig {
            host: String::from("127.0.0.1"),
            port: 0,
        })
        .await
        .unwrap();
        let addr = listener.local_addr().unwrap();
        let task = tokio::spawn(server::serve(listener, Arc::new(AppState::default())));

        let mut stream = tokio::net::TcpStream::connect(addr).await.unwrap();
        tokio::io::AsyncWriteExt::write_all(
            &mut stream,
            b"GET /health HTTP/1.1\r\nHost: localhost\r\nConnection: close\r\n\r\n",
        )
        .await
        .unwrap();
        let mut response = String::new();
        tokio::io::AsyncReadExt::read_to_string(&mut stream, &mut response)
            .await
            .unwrap();
        assert!(response.starts_with("HTTP/1.1 200"));
        assert!(response.contains("\"ok\""));
        task.abort();
    }
}
