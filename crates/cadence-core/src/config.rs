//! Configuration loading and typed config structures for the Cadence engine.
//!
//! The canonical configuration lives in `cadence-config.yaml` at the project
//! root. This module defines strongly-typed structs that mirror the YAML
//! structure, a loader, and [`EngineConfig::validate`], which the scheduler
//! runs once at construction.

use std::path::Path;

use cadence_types::{ProcessRole, UnderflowPolicy};
use serde::Deserialize;

/// Errors that can occur when loading configuration.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    /// Failed to read the configuration file from disk.
    #[error("failed to read config file: {source}")]
    Io {
        /// The underlying I/O error.
        #[from]
        source: std::io::Error,
    },

    /// Failed to parse YAML content.
    #[error("failed to parse config YAML: {source}")]
    Yaml {
        /// The underlying YAML parse error.
        source: serde_yml::Error,
    },

    /// A value is out of range.
    #[error("invalid config value for {field}: {reason}")]
    Invalid {
        /// Dotted path of the offending field.
        field: &'static str,
        /// What is wrong with it.
        reason: String,
    },
}

impl From<serde_yml::Error> for ConfigError {
    fn from(source: serde_yml::Error) -> Self {
        Self::Yaml { source }
    }
}

/// Top-level engine configuration.
///
/// Mirrors the structure of `cadence-config.yaml`. Every field has a
/// default, so an empty file is a valid configuration.
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct EngineConfig {
    /// Role of the primary scheduler in this process.
    #[serde(default = "default_role")]
    pub role: ProcessRole,

    /// Tick rates, start gating and frame behaviour.
    #[serde(default)]
    pub scheduler: SchedulerConfig,

    /// Lag, idle and lifespan policy (authoritative role).
    #[serde(default)]
    pub watchdog: WatchdogConfig,

    /// Snapshot playback (client role).
    #[serde(default)]
    pub interpolation: InterpolationConfig,

    /// Observer HTTP API.
    #[serde(default)]
    pub observer: ObserverConfig,

    /// Logging configuration.
    #[serde(default)]
    pub logging: LoggingConfig,

    /// Demo world built by the engine binary.
    #[serde(default)]
    pub demo: DemoConfig,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            role: default_role(),
            scheduler: SchedulerConfig::default(),
            watchdog: WatchdogConfig::default(),
            interpolation: InterpolationConfig::default(),
            observer: ObserverConfig::default(),
            logging: LoggingConfig::default(),
            demo: DemoConfig::default(),
        }
    }
}

impl EngineConfig {
    /// Load configuration from a YAML file at the given path.
    ///
    /// Environment variables override YAML values:
    /// - `CADENCE_OBSERVER_PORT` overrides `observer.port`
    /// - `CADENCE_LOG_LEVEL` overrides `logging.level`
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::Io`] if the file cannot be read, or
    /// [`ConfigError::Yaml`] if the content is not valid YAML.
    pub fn from_file(path: &Path) -> Result<Self, ConfigError> {
        let contents = std::fs::read_to_string(path)?;
        let mut config = Self::parse(&contents)?;
        config.apply_env_overrides();
        Ok(config)
    }

    /// Parse configuration from a YAML string.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::Yaml`] if the string is not valid YAML.
    pub fn parse(yaml: &str) -> Result<Self, ConfigError> {
        if yaml.trim().is_empty() {
            return Ok(Self::default());
        }
        let config: Self = serde_yml::from_str(yaml)?;
        Ok(config)
    }

    /// Override values with environment variables when set.
    ///
    /// Unparseable values are ignored.
    pub fn apply_env_overrides(&mut self) {
        if let Some(port) = std::env::var("CADENCE_OBSERVER_PORT")
            .ok()
            .and_then(|v| v.parse().ok())
        {
            self.observer.port = port;
        }
        if let Ok(level) = std::env::var("CADENCE_LOG_LEVEL") {
            self.logging.level = level;
        }
    }

    /// Reject configurations the scheduler cannot run with.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::Invalid`] naming the first bad field.
    pub fn validate(&self) -> Result<(), ConfigError> {
        let s = &self.scheduler;
        positive("scheduler.game_loop_tick_rate", s.game_loop_tick_rate)?;
        positive("scheduler.physics_tick_rate", s.physics_tick_rate)?;
        positive("scheduler.frame_rate", s.frame_rate)?;
        positive_u64("scheduler.dependency_poll_interval_ms", s.dependency_poll_interval_ms)?;
        if !s.time_scale.is_finite() || s.time_scale < 0.0 {
            return Err(ConfigError::Invalid {
                field: "scheduler.time_scale",
                reason: format!("{} must be finite and non-negative", s.time_scale),
            });
        }
        if s.telemetry_event_capacity == 0 {
            return Err(ConfigError::Invalid {
                field: "scheduler.telemetry_event_capacity",
                reason: "must be at least 1".to_owned(),
            });
        }

        let w = &self.watchdog;
        positive("watchdog.lag_warning_threshold", w.lag_warning_threshold)?;
        positive("watchdog.lag_fatal_threshold", w.lag_fatal_threshold)?;
        if w.lag_warning_threshold >= w.lag_fatal_threshold {
            return Err(ConfigError::Invalid {
                field: "watchdog.lag_warning_threshold",
                reason: format!(
                    "{} must be below lag_fatal_threshold ({})",
                    w.lag_warning_threshold, w.lag_fatal_threshold
                ),
            });
        }
        positive_u64("watchdog.liveness_check_interval_ms", w.liveness_check_interval_ms)?;
        positive("watchdog.stall_threshold_frames", w.stall_threshold_frames)?;

        if !self.interpolation.render_delay_ms.is_finite() || self.interpolation.render_delay_ms < 0.0 {
            return Err(ConfigError::Invalid {
                field: "interpolation.render_delay_ms",
                reason: "must be finite and non-negative".to_owned(),
            });
        }
        if self.observer.snapshot_channel_capacity == 0 {
            return Err(ConfigError::Invalid {
                field: "observer.snapshot_channel_capacity",
                reason: "must be at least 1".to_owned(),
            });
        }
        Ok(())
    }
}

fn positive(field: &'static str, value: u32) -> Result<(), ConfigError> {
    if value == 0 {
        return Err(ConfigError::Invalid {
            field,
            reason: "must be at least 1".to_owned(),
        });
    }
    Ok(())
}

fn positive_u64(field: &'static str, value: u64) -> Result<(), ConfigError> {
    if value == 0 {
        return Err(ConfigError::Invalid {
            field,
            reason: "must be at least 1".to_owned(),
        });
    }
    Ok(())
}

/// Scheduler settings.
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct SchedulerConfig {
    /// Game-logic ticks per second.
    #[serde(default = "default_tick_rate")]
    pub game_loop_tick_rate: u32,

    /// Physics ticks per second.
    #[serde(default = "default_tick_rate")]
    pub physics_tick_rate: u32,

    /// Target frames per second. Sets the frame interval and the
    /// watchdog's frame budget (`1000 / frame_rate`).
    #[serde(default = "default_frame_rate")]
    pub frame_rate: u32,

    /// How often start gates are polled, in milliseconds.
    #[serde(default = "default_dependency_poll_interval_ms")]
    pub dependency_poll_interval_ms: u64,

    /// How long start gates may take before startup fails.
    #[serde(default = "default_dependency_timeout_ms")]
    pub dependency_timeout_ms: u64,

    /// Initial time-scale factor.
    #[serde(default = "default_time_scale")]
    pub time_scale: f64,

    /// Only run frames on an explicit frame request.
    #[serde(default)]
    pub manual_ticks: bool,

    /// Only render when a render was requested since the last render.
    #[serde(default)]
    pub manual_render: bool,

    /// Run the update traversal.
    #[serde(default = "default_true")]
    pub enable_updates: bool,

    /// Run the render traversal.
    #[serde(default = "default_true")]
    pub enable_renders: bool,

    /// Record per-root update and render timing.
    #[serde(default)]
    pub debug_timing: bool,

    /// How many telemetry events are kept for observers.
    #[serde(default = "default_telemetry_event_capacity")]
    pub telemetry_event_capacity: usize,
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            game_loop_tick_rate: default_tick_rate(),
            physics_tick_rate: default_tick_rate(),
            frame_rate: default_frame_rate(),
            dependency_poll_interval_ms: default_dependency_poll_interval_ms(),
            dependency_timeout_ms: default_dependency_timeout_ms(),
            time_scale: default_time_scale(),
            manual_ticks: false,
            manual_render: false,
            enable_updates: true,
            enable_renders: true,
            debug_timing: false,
            telemetry_event_capacity: default_telemetry_event_capacity(),
        }
    }
}

impl SchedulerConfig {
    /// Frame budget in milliseconds.
    pub fn frame_budget_ms(&self) -> f64 {
        1000.0 / f64::from(self.frame_rate.max(1))
    }
}

/// Liveness policy for the authoritative role.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct WatchdogConfig {
    /// Consecutive over-budget frames above which a warning is logged.
    #[serde(default = "default_lag_warning_threshold")]
    pub lag_warning_threshold: u32,

    /// Consecutive over-budget frames above which the process shuts down.
    #[serde(default = "default_lag_fatal_threshold")]
    pub lag_fatal_threshold: u32,

    /// How long the process may run with no human player (0 = never
    /// shut down for idleness).
    #[serde(default = "default_idle_timeout_ms")]
    pub idle_timeout_ms: u64,

    /// Maximum process age. Capped at six hours; 0 means the cap.
    #[serde(default = "default_max_lifespan_ms")]
    pub max_lifespan_ms: u64,

    /// Minimum wall-clock time between idle and lifespan checks.
    #[serde(default = "default_liveness_check_interval_ms")]
    pub liveness_check_interval_ms: u64,

    /// Frames without a heartbeat before the stall monitor complains.
    #[serde(default = "default_stall_threshold_frames")]
    pub stall_threshold_frames: u32,

    /// Category whose human-controlled members keep the process alive.
    #[serde(default = "default_player_category")]
    pub player_category: String,
}

impl Default for WatchdogConfig {
    fn default() -> Self {
        Self {
            lag_warning_threshold: default_lag_warning_threshold(),
            lag_fatal_threshold: default_lag_fatal_threshold(),
            idle_timeout_ms: default_idle_timeout_ms(),
            max_lifespan_ms: default_max_lifespan_ms(),
            liveness_check_interval_ms: default_liveness_check_interval_ms(),
            stall_threshold_frames: default_stall_threshold_frames(),
            player_category: default_player_category(),
        }
    }
}

/// Snapshot playback settings.
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct InterpolationConfig {
    /// What to do when render time outruns the snapshot buffer.
    #[serde(default)]
    pub underflow_policy: UnderflowPolicy,

    /// How far render time trails simulation time, in milliseconds.
    #[serde(default = "default_render_delay_ms")]
    pub render_delay_ms: f64,
}

impl Default for InterpolationConfig {
    fn default() -> Self {
        Self {
            underflow_policy: UnderflowPolicy::default(),
            render_delay_ms: default_render_delay_ms(),
        }
    }
}

/// Observer API settings.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct ObserverConfig {
    /// Whether the observer API is served.
    #[serde(default = "default_true")]
    pub enabled: bool,

    /// Listen port.
    #[serde(default = "default_observer_port")]
    pub port: u16,

    /// Snapshots buffered per `WebSocket` subscriber before it lags.
    #[serde(default = "default_snapshot_channel_capacity")]
    pub snapshot_channel_capacity: usize,
}

impl Default for ObserverConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            port: default_observer_port(),
            snapshot_channel_capacity: default_snapshot_channel_capacity(),
        }
    }
}

/// Logging configuration.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct LoggingConfig {
    /// Log level (trace, debug, info, warn, error) or a full filter
    /// directive. `RUST_LOG` takes precedence.
    #[serde(default = "default_log_level")]
    pub level: String,

    /// Output format: `pretty` or `json`.
    #[serde(default = "default_log_format")]
    pub format: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            format: default_log_format(),
        }
    }
}

/// Demo world settings used by the engine binary.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct DemoConfig {
    /// Number of wandering units spawned at start.
    #[serde(default = "default_demo_units")]
    pub units: u32,

    /// Units are born at a random time up to this far in the future.
    #[serde(default = "default_spawn_jitter_ms")]
    pub spawn_jitter_ms: u64,

    /// Seed for the spawn jitter.
    #[serde(default = "default_seed")]
    pub seed: u64,

    /// Run a client-role scheduler in-process fed by the snapshot stream.
    #[serde(default = "default_true")]
    pub loopback_client: bool,

    /// Add a human-controlled player so the idle timeout does not fire.
    #[serde(default = "default_true")]
    pub human_player: bool,
}

impl Default for DemoConfig {
    fn default() -> Self {
        Self {
            units: default_demo_units(),
            spawn_jitter_ms: default_spawn_jitter_ms(),
            seed: default_seed(),
            loopback_client: true,
            human_player: true,
        }
    }
}

// ---------------------------------------------------------------------------
// Default value functions (serde default requires named functions)
// ---------------------------------------------------------------------------

const fn default_role() -> ProcessRole {
    ProcessRole::Authoritative
}

const fn default_tick_rate() -> u32 {
    20
}

const fn default_frame_rate() -> u32 {
    60
}

const fn default_dependency_poll_interval_ms() -> u64 {
    200
}

const fn default_dependency_timeout_ms() -> u64 {
    30_000
}

const fn default_time_scale() -> f64 {
    1.0
}

const fn default_telemetry_event_capacity() -> usize {
    256
}

const fn default_lag_warning_threshold() -> u32 {
    50
}

const fn default_lag_fatal_threshold() -> u32 {
    100
}

const fn default_idle_timeout_ms() -> u64 {
    5 * 60 * 1000
}

const fn default_max_lifespan_ms() -> u64 {
    6 * 60 * 60 * 1000
}

const fn default_liveness_check_interval_ms() -> u64 {
    1000
}

const fn default_stall_threshold_frames() -> u32 {
    30
}

fn default_player_category() -> String {
    "player".to_owned()
}

const fn default_render_delay_ms() -> f64 {
    100.0
}

const fn default_observer_port() -> u16 {
    8080
}

const fn default_snapshot_channel_capacity() -> usize {
    64
}

fn default_log_level() -> String {
    "info".to_owned()
}

fn default_log_format() -> String {
    "pretty".to_owned()
}

const fn default_demo_units() -> u32 {
    8
}

const fn default_spawn_jitter_ms() -> u64 {
    2000
}

const fn default_seed() -> u64 {
    42
}

const fn default_true() -> bool {
    true
}
