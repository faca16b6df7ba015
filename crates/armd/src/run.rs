// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Top-level daemon runner — builds the full [`Store`], spawns every
//! background task, binds the HTTP listener, and waits for shutdown.

use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::atomic::AtomicBool;
use std::sync::Arc;
use std::time::Duration;

use tokio::net::TcpListener;
use tokio::sync::{broadcast, RwLock};
use tokio_util::sync::CancellationToken;
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

use crate::aggregator::Aggregator;
use crate::backend::mock::{MockArm, MockBase, MockCamera, MockGripper};
use crate::backend::{ArmBackend, BaseBackend, CameraBackend, GripperBackend};
use crate::config::Config;
use crate::crash_monitor::{CrashMonitor, CrashMonitorConfig, ErrorRecovery};
use crate::envelope::SafetyEnvelope;
use crate::gateway::CommandGateway;
use crate::lease::{LeaseHook, LeaseManager};
use crate::rewind::{RewindConfig, RewindOrchestrator};
use crate::safety_monitor::{SafetyMonitor, SafetyMonitorConfig};
use crate::sandbox::SandboxManager;
use crate::supervisor::{ProcessSupervisor, Supervisor};
use crate::trajectory::TrajectoryLog;
use crate::transport::build_router;
use crate::transport::state::Store;

/// The Franka-specific `automatic_error_recovery` RPC that would clear a
/// protective stop is out of scope; recovery here relies on the driver
/// restart performed by [`Supervisor::restart_service`] plus a reconnect.
struct NoopErrorRecovery;

impl ErrorRecovery for NoopErrorRecovery {
    fn recover(&self) -> crate::backend::BoxFut<'_, anyhow::Result<()>> {
        Box::pin(async { Ok(()) })
    }
}

/// Driver-crash monitor tick rate. Not exposed as a config flag — the grace
/// and cooldown periods that actually govern its behavior are.
const CRASH_MONITOR_TICK: Duration = Duration::from_millis(500);

/// Initialize tracing/logging from config.
///
/// Uses `try_init` so it's safe to call multiple times (e.g. from tests).
pub fn init_tracing(config: &Config) {
    use tracing_subscriber::fmt;

    let filter = EnvFilter::try_new(&config.log_level).unwrap_or_else(|_| EnvFilter::new("info"));
    let result = match config.log_format.as_str() {
        "json" => fmt::fmt().with_env_filter(filter).json().try_init(),
        _ => fmt::fmt().with_env_filter(filter).try_init(),
    };
    drop(result);
}

/// Build the full [`Store`] and spawn every background task. Returns before
/// the HTTP listener is bound so callers (tests) can inspect the store first.
pub async fn prepare(config: Config) -> anyhow::Result<Arc<Store>> {
    let shutdown = CancellationToken::new();

    let arm: Arc<dyn ArmBackend> = Arc::new(MockArm::default());
    let base: Arc<dyn BaseBackend> = Arc::new(MockBase::default());
    let gripper: Arc<dyn GripperBackend> = Arc::new(MockGripper::default());
    let cameras: Arc<dyn CameraBackend> = Arc::new(MockCamera::default());

    let trajectory = Arc::new(RwLock::new(TrajectoryLog::new(
        config.max_waypoints,
        config.record_interval_secs,
        config.position_threshold,
        config.orientation_threshold,
    )));

    let aggregator = Arc::new(Aggregator::new(
        Arc::clone(&arm),
        Arc::clone(&base),
        Arc::clone(&gripper),
        Arc::clone(&trajectory),
        config.reconnect_interval(),
    ));

    let rewind_config = RewindConfig {
        chunk_size: config.rewind_chunk_size,
        chunk_duration: config.rewind_chunk_duration(),
        command_hz: config.rewind_command_hz,
        safety_margin: config.rewind_safety_margin,
        ..RewindConfig::default()
    };
    let rewind = Arc::new(RewindOrchestrator::new(
        Arc::clone(&trajectory),
        Arc::clone(&arm),
        Arc::clone(&base),
        rewind_config,
    ));

    let crash_recovering = Arc::new(AtomicBool::new(false));

    let safety_config = SafetyMonitorConfig {
        auto_rewind_enabled: config.auto_rewind_enabled,
        auto_rewind_percentage: config.auto_rewind_percentage as f64,
        workspace_bounds: (config.base_x_min, config.base_x_max, config.base_y_min, config.base_y_max),
        collision_min_cmd_speed: config.collision_min_cmd_speed,
        collision_velocity_threshold: config.collision_velocity_threshold,
        collision_grace_period: config.collision_grace_period(),
        cooldown: config.monitor_cooldown(),
    };
    let safety_monitor = Arc::new(SafetyMonitor::new(
        safety_config,
        Arc::clone(&aggregator),
        Arc::clone(&base),
        Arc::clone(&rewind),
        Arc::clone(&crash_recovering),
    ));

    let (events_tx, _) = broadcast::channel(256);

    let lease = Arc::new(LeaseManager::new(
        events_tx.clone(),
        Some(Arc::clone(&rewind) as Arc<dyn LeaseHook>),
        Arc::clone(&trajectory),
        config.reset_on_release,
        config.idle_timeout(),
        config.warning_grace(),
        config.max_lease_duration(),
    ));

    let envelope = SafetyEnvelope::from(&config);
    let gateway = CommandGateway::new(
        Arc::clone(&lease),
        envelope,
        Arc::clone(&arm),
        Arc::clone(&base),
        Arc::clone(&gripper),
        Arc::clone(&rewind),
        events_tx.clone(),
    );

    let sandbox = Arc::new(SandboxManager::new(
        config.sandbox_interpreter.clone(),
        config.sandbox_kill_grace(),
        100,
    ));

    let supervisor: Arc<dyn Supervisor> =
        Arc::new(ProcessSupervisor::new(HashMap::new(), PathBuf::from(&config.pid_file)));

    let crash_monitor_config = CrashMonitorConfig {
        arm_down_grace: config.arm_down_grace(),
        recovery_cooldown: config.recovery_cooldown(),
        server_start_timeout: config.server_start_timeout(),
        auto_rewind_enabled: config.auto_rewind_enabled,
        auto_rewind_percentage: config.auto_rewind_percentage as f64,
    };
    let crash_monitor = Arc::new(CrashMonitor::new(
        crash_monitor_config,
        Arc::clone(&arm),
        Arc::clone(&rewind),
        Arc::clone(&supervisor),
        Arc::clone(&sandbox) as Arc<_>,
        Arc::new(NoopErrorRecovery),
        Arc::clone(&crash_recovering),
    ));

    let store = Arc::new(Store::new(
        config.clone(),
        Arc::clone(&lease),
        Arc::clone(&trajectory),
        Arc::clone(&aggregator),
        Arc::clone(&rewind),
        Arc::clone(&safety_monitor),
        Arc::clone(&crash_monitor),
        Arc::clone(&sandbox),
        Arc::clone(&supervisor),
        gateway,
        arm,
        base,
        gripper,
        cameras,
        events_tx,
        shutdown,
    ));

    aggregator.spawn(config.base_poll_interval(), store.shutdown.clone());
    safety_monitor.spawn(config.monitor_interval(), store.shutdown.clone());
    crash_monitor.spawn(CRASH_MONITOR_TICK, store.shutdown.clone());
    lease.spawn_idle_checker(
        Arc::clone(&aggregator) as Arc<dyn crate::lease::MotionClock>,
        config.lease_check_interval(),
        store.shutdown.clone(),
    );
    store.spawn_log_subscriber();
    let observer_interval = Duration::from_secs_f64(1.0 / config.observer_state_hz.max(0.001));
    store.spawn_state_broadcaster(observer_interval);

    Ok(store)
}

/// Run the daemon to completion: prepare the store, bind the HTTP listener,
/// and block until shutdown (via `POST /shutdown` or SIGTERM/SIGINT).
pub async fn run(config: Config) -> anyhow::Result<()> {
    init_tracing(&config);

    let store = prepare(config.clone()).await?;
    let router = build_router(Arc::clone(&store));

    let addr = format!("{}:{}", config.host, config.port);
    let listener = TcpListener::bind(&addr).await?;
    info!("HTTP listening on {}", listener.local_addr()?);

    let shutdown = store.shutdown.clone();
    let server_shutdown = shutdown.clone();
    let server = tokio::spawn(async move {
        let result =
            axum::serve(listener, router).with_graceful_shutdown(server_shutdown.cancelled_owned()).await;
        if let Err(e) = result {
            error!("HTTP server error: {e}");
        }
    });

    spawn_signal_handler(shutdown.clone());

    shutdown.cancelled().await;
    let _ = server.await;
    Ok(())
}

fn spawn_signal_handler(shutdown: CancellationToken) {
    tokio::spawn(async move {
        let mut sigterm = tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()).ok();
        let mut sigint = tokio::signal::unix::signal(tokio::signal::unix::SignalKind::interrupt()).ok();

        tokio::select! {
            _ = async { if let Some(ref mut s) = sigterm { s.recv().await } else { std::future::pending().await } } => {
                info!("received SIGTERM");
            }
            _ = async { if let Some(ref mut s) = sigint { s.recv().await } else { std::future::pending().await } } => {
                info!("received SIGINT");
            }
        }
        shutdown.cancel();

        tokio::select! {
            _ = async { if let Some(ref mut s) = sigterm { s.recv().await } else { std::future::pending().await } } => {
                info!("received SIGTERM again, forcing exit");
            }
            _ = async { if let Some(ref mut s) = sigint { s.recv().await } else { std::future::pending().await } } => {
                info!("received SIGINT again, forcing exit");
            }
        }
        std::process::exit(130);
    });
}

#[cfg(test)]
#[path = "run_tests.rs"]
mod tests;
