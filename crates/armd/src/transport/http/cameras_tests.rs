// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use std::collections::HashMap;
use std::sync::atomic::AtomicBool;
use std::sync::Arc;
use std::time::Duration;

use clap::Parser;
use tokio::sync::{broadcast, RwLock};
use tokio_util::sync::CancellationToken;

use super::*;
use crate::aggregator::Aggregator;
use crate::backend::mock::{MockArm, MockBase, MockCamera, MockGripper};
use crate::backend::BoxFut;
use crate::backend::{ArmBackend, BaseBackend, GripperBackend};
use crate::config::Config;
use crate::crash_monitor::{CrashMonitor, CrashMonitorConfig, ErrorRecovery};
use crate::envelope::SafetyEnvelope;
use crate::gateway::CommandGateway;
use crate::lease::{LeaseHook, LeaseManager};
use crate::rewind::{RewindConfig, RewindOrchestrator};
use crate::safety_monitor::{SafetyMonitor, SafetyMonitorConfig};
use crate::sandbox::SandboxManager;
use crate::supervisor::ProcessSupervisor;
use crate::trajectory::TrajectoryLog;

struct NoopErrorRecovery;

impl ErrorRecovery for NoopErrorRecovery {
    fn recover(&self) -> BoxFut<'_, anyhow::Result<()>> {
        Box::pin(async { Ok(()) })
    }
}

fn test_store() -> Arc<Store> {
    let config = Config::parse_from(["armd"]);
    let trajectory = Arc::new(RwLock::new(TrajectoryLog::new(100, 0.1, 0.05, 0.1)));
    let arm: Arc<dyn ArmBackend> = Arc::new(MockArm::default());
    let base: Arc<dyn BaseBackend> = Arc::new(MockBase::default());
    let gripper: Arc<dyn GripperBackend> = Arc::new(MockGripper::default());
    let cameras: Arc<dyn CameraBackend> = Arc::new(MockCamera::default());

    let aggregator =
        Arc::new(Aggregator::new(arm.clone(), base.clone(), gripper.clone(), trajectory.clone(), Duration::from_secs(5)));
    let rewind =
        Arc::new(RewindOrchestrator::new(trajectory.clone(), arm.clone(), base.clone(), RewindConfig::default()));

    let (events, _rx) = broadcast::channel(64);
    let lease = Arc::new(LeaseManager::new(
        events.clone(),
        Some(rewind.clone() as Arc<dyn LeaseHook>),
        trajectory.clone(),
        true,
        Duration::from_secs(120),
        Duration::from_secs(15),
        Duration::from_secs(1800),
    ));

    let crash_recovering = Arc::new(AtomicBool::new(false));
    let safety_monitor = Arc::new(SafetyMonitor::new(
        SafetyMonitorConfig {
            auto_rewind_enabled: true,
            auto_rewind_percentage: 10.0,
            workspace_bounds: (-5.0, 5.0, -5.0, 5.0),
            collision_min_cmd_speed: 0.02,
            collision_velocity_threshold: 0.2,
            collision_grace_period: Duration::from_millis(500),
            cooldown: Duration::from_secs(3),
        },
        aggregator.clone(),
        base.clone(),
        rewind.clone(),
        crash_recovering.clone(),
    ));

    let supervisor: Arc<dyn crate::supervisor::Supervisor> = Arc::new(ProcessSupervisor::new(HashMap::new(), tempfile::NamedTempFile::new().unwrap().path().to_path_buf()));
    let sandbox = Arc::new(SandboxManager::new("python3".to_owned(), Duration::from_secs(2), 50));
    let crash_monitor = Arc::new(CrashMonitor::new(
        CrashMonitorConfig {
            arm_down_grace: Duration::from_secs(3),
            recovery_cooldown: Duration::from_secs(10),
            server_start_timeout: Duration::from_secs(15),
            auto_rewind_enabled: true,
            auto_rewind_percentage: 10.0,
        },
        arm.clone(),
        rewind.clone(),
        supervisor.clone(),
        sandbox.clone(),
        Arc::new(NoopErrorRecovery),
        crash_recovering,
    ));

    let gateway = CommandGateway::new(
        lease.clone(),
        SafetyEnvelope::from(&config),
        arm.clone(),
        base.clone(),
        gripper.clone(),
        rewind.clone(),
        events.clone(),
    );

    Arc::new(Store::new(
        config,
        lease,
        trajectory,
        aggregator,
        rewind,
        safety_monitor,
        crash_monitor,
        sandbox,
        supervisor,
        gateway,
        arm,
        base,
        gripper,
        cameras,
        events,
        CancellationToken::new(),
    ))
}

#[tokio::test]
async fn list_returns_the_mock_cameras_ids() {
    let store = test_store();
    let response = list(State(store)).await.into_response();
    assert_eq!(response.status(), axum::http::StatusCode::OK);
}

#[tokio::test]
async fn frame_of_known_camera_succeeds() {
    let store = test_store();
    let ids = store.cameras.list_ids();
    let id = ids.first().cloned().expect("mock camera exposes at least one id");
    let response = frame(State(store), Path(id)).await.into_response();
    assert_eq!(response.status(), axum::http::StatusCode::OK);
}

#[tokio::test]
async fn frame_of_unknown_camera_is_backend_unavailable() {
    let store = test_store();
    let response = frame(State(store), Path("does-not-exist".to_owned())).await.into_response();
    assert_eq!(response.status(), axum::http::StatusCode::SERVICE_UNAVAILABLE);
}

#[tokio::test]
async fn intrinsics_of_known_camera_succeeds() {
    let store = test_store();
    let ids = store.cameras.list_ids();
    let id = ids.first().cloned().expect("mock camera exposes at least one id");
    let response = intrinsics(State(store), Path(id)).await.into_response();
    assert_eq!(response.status(), axum::http::StatusCode::OK);
}
