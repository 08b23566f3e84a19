//! Error types for the Cadence engine binary.
//!
//! [`EngineError`] is the top-level error type that wraps all possible
//! failure modes during engine startup and the frame loop.

use cadence_types::ProcessRole;

/// Top-level error for the Cadence engine binary.
///
/// Each variant wraps a specific subsystem error, providing a single
/// error type that `main` can propagate with `?`.
#[derive(Debug, thiserror::Error)]
pub enum EngineError {
    /// Configuration loading or validation failed.
    #[error("config error: {source}")]
    Config {
        /// The underlying config error.
        #[from]
        source: cadence_core::config::ConfigError,
    },

    /// Scheduler construction or world setup failed.
    #[error("scheduler error: {source}")]
    Scheduler {
        /// The underlying scheduler error.
        #[from]
        source: cadence_core::scheduler::SchedulerError,
    },

    /// Building the client scene failed.
    #[error("scene error: {source}")]
    Scene {
        /// The underlying scene error.
        #[from]
        source: cadence_core::scene::SceneError,
    },

    /// The frame loop failed.
    #[error("runner error: {source}")]
    Runner {
        /// The underlying runner error.
        #[from]
        source: cadence_core::runner::RunnerError,
    },

    /// Observer API server failed to start.
    #[error("observer error: {message}")]
    Observer {
        /// Description of the observer failure.
        message: String,
    },

    /// The configured role cannot run as the primary scheduler.
    #[error("role {role:?} cannot run standalone: {message}")]
    UnsupportedRole {
        /// Configured role.
        role: ProcessRole,
        /// Why it is unsupported.
        message: String,
    },
}
