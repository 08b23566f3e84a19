//! Engine binary for the Cadence scheduler.
//!
//! Wires the authoritative scheduler to the demo world, the Observer API
//! and an optional in-process client, then runs the frame loop until the
//! watchdog, an operator or Ctrl-C stops it.
//!
//! # Startup Sequence
//!
//! 1. Load configuration from `$CADENCE_CONFIG` or `cadence-config.yaml`
//! 2. Initialize structured logging (tracing)
//! 3. Create the observer state and start the Observer API server
//! 4. Create the authoritative scheduler and build the demo world
//! 5. Start the loopback client
//! 6. Start the stall monitor and the Ctrl-C handler
//! 7. Run the frame loop
//! 8. Notify clients, publish the final state and log the result

mod client;
mod error;
mod observer_callback;
mod world;

use std::path::PathBuf;
use std::sync::Arc;

use cadence_core::clock::{ClockSource, MonotonicClock};
use cadence_core::config::{EngineConfig, LoggingConfig};
use cadence_core::frame_source::FrameSource;
use cadence_core::runner;
use cadence_core::scene::SceneTree;
use cadence_core::scheduler::Scheduler;
use cadence_core::watchdog;
use cadence_observer::state::AppState;
use cadence_observer::transport::BroadcastTransport;
use cadence_types::ProcessRole;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

use crate::client::LoopbackClient;
use crate::error::EngineError;
use crate::observer_callback::ObserverCallback;
use crate::world::Kinematics;

/// Message channel for server lifecycle notices.
const SERVER_CHANNEL: &str = "server";

/// Config file read when `CADENCE_CONFIG` is unset.
const DEFAULT_CONFIG_PATH: &str = "cadence-config.yaml";

/// Application entry point for the Cadence engine.
///
/// # Errors
///
/// Returns an error if any initialization step or the frame loop fails.
#[tokio::main]
#[allow(clippy::too_many_lines)]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // 1. Load configuration.
    let config = load_config()?;

    // 2. Initialize structured logging.
    init_tracing(&config.logging);
    info!("cadence-engine starting");
    info!(
        role = ?config.role,
        game_loop_tick_rate = config.scheduler.game_loop_tick_rate,
        physics_tick_rate = config.scheduler.physics_tick_rate,
        frame_rate = config.scheduler.frame_rate,
        time_scale = config.scheduler.time_scale,
        manual_ticks = config.scheduler.manual_ticks,
        "Configuration loaded"
    );

    if config.role != ProcessRole::Authoritative {
        return Err(EngineError::UnsupportedRole {
            role: config.role,
            message: "a standalone client needs a snapshot feed; \
                      run authoritative with demo.loopback_client instead"
                .to_owned(),
        }
        .into());
    }

    // 3. Observer state, shared by the transport and the API.
    let clock: Arc<dyn ClockSource> = Arc::new(MonotonicClock::new());
    let scheduler = Scheduler::new(
        &config,
        ProcessRole::Authoritative,
        SceneTree::new(),
        Arc::clone(&clock),
    )?;
    let control = scheduler.control();
    let app_state = Arc::new(AppState::with_control(
        config.observer.snapshot_channel_capacity,
        Arc::clone(&control),
    ));

    let _observer_handle = if config.observer.enabled {
        let handle = cadence_observer::startup::spawn_observer(
            config.observer.port,
            Arc::clone(&app_state),
        )
        .await
        .map_err(|e| EngineError::Observer {
            message: format!("{e}"),
        })?;
        info!(port = config.observer.port, "Observer API server started");
        Some(handle)
    } else {
        info!("Observer API disabled");
        None
    };

    // 4. Scheduler and demo world.
    let mut scheduler =
        scheduler.with_transport(Box::new(BroadcastTransport::new(Arc::clone(&app_state))));
    let demo = world::build(&mut scheduler, &config.demo)?;
    let mut scheduler = scheduler.with_physics(Box::new(Kinematics::new(demo.movers())));

    // 5. Loopback client.
    let client = if config.demo.loopback_client {
        let watch = demo.player.as_ref().map(|p| p.id().clone());
        Some(LoopbackClient::spawn(&config, &app_state, watch)?)
    } else {
        None
    };

    // 6. Stall monitor and Ctrl-C.
    let threshold_ms = f64::from(config.watchdog.stall_threshold_frames)
        * config.scheduler.frame_budget_ms();
    let stall_monitor = tokio::spawn(watchdog::monitor_stalls(
        scheduler.heartbeat(),
        Arc::clone(&clock),
        threshold_ms,
    ));

    {
        let control = Arc::clone(&control);
        tokio::spawn(async move {
            if tokio::signal::ctrl_c().await.is_ok() {
                info!("Ctrl-C received, requesting stop");
                control.request_stop();
            }
        });
    }

    // 7. Run.
    let mut source = if config.scheduler.manual_ticks {
        info!("Manual ticks: frames run on POST /api/operator/frame");
        FrameSource::manual(Arc::clone(&control))
    } else {
        FrameSource::interval(config.scheduler.frame_rate)
    };
    let mut callback = ObserverCallback::new(Arc::clone(&app_state));

    info!("Entering frame loop");
    let result = runner::run_scheduler(&mut scheduler, &mut source, &mut callback).await;

    // 8. Final state.
    if let Ok(run) = &result {
        let notice = serde_json::json!({ "event": "shutdown", "reason": run.end_reason });
        if scheduler.send(SERVER_CHANNEL, notice, None) {
            info!(channel = SERVER_CHANNEL, "Shutdown notice sent to clients");
        }
    }
    callback.publish(&scheduler);
    if let Some(client) = client {
        client.stop().await;
    }
    let result = result.map_err(EngineError::from)?;
    runner::log_run_end(&result);

    match stall_monitor.await {
        Ok(stalls) if stalls > 0 => warn!(stalls, "Frame loop stalled during the run"),
        Ok(_) => {}
        Err(e) => warn!(error = %e, "Stall monitor task failed"),
    }

    info!(
        end_reason = ?result.end_reason,
        frames = result.frames,
        "cadence-engine shutdown complete"
    );

    Ok(())
}

/// Install the global tracing subscriber.
///
/// `RUST_LOG` wins over the configured level. `format: json` switches to
/// one JSON object per line.
fn init_tracing(logging: &LoggingConfig) {
    let filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(&logging.level))
        .unwrap_or_else(|_| EnvFilter::new("info"));

    if logging.format.eq_ignore_ascii_case("json") {
        tracing_subscriber::fmt()
            .json()
            .with_env_filter(filter)
            .with_target(true)
            .init();
    } else {
        tracing_subscriber::fmt()
            .with_env_filter(filter)
            .with_target(true)
            .init();
    }
}

/// Load the engine configuration.
///
/// Reads `$CADENCE_CONFIG` if set, otherwise `cadence-config.yaml` in the
/// working directory. A missing default file means defaults. Environment
/// overrides apply either way.
fn load_config() -> Result<EngineConfig, EngineError> {
    let explicit = std::env::var_os("CADENCE_CONFIG").map(PathBuf::from);
    let path = explicit
        .clone()
        .unwrap_or_else(|| PathBuf::from(DEFAULT_CONFIG_PATH));

    let config = if explicit.is_some() || path.exists() {
        EngineConfig::from_file(&path)?
    } else {
        let mut config = EngineConfig::default();
        config.apply_env_overrides();
        config
    };
    config.validate()?;
    Ok(config)
}
