// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use std::collections::HashMap;
use std::sync::atomic::AtomicBool;
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::{broadcast, RwLock};
use tokio_util::sync::CancellationToken;

use super::*;
use crate::backend::mock::{MockArm, MockBase, MockCamera, MockGripper};
use crate::backend::BoxFut;
use crate::crash_monitor::{CrashMonitorConfig, ErrorRecovery};
use crate::envelope::SafetyEnvelope;
use crate::lease::LeaseHook;
use crate::rewind::RewindConfig;
use crate::safety_monitor::SafetyMonitorConfig;
use crate::supervisor::ProcessSupervisor;
use clap::Parser;

struct NoopErrorRecovery;

impl ErrorRecovery for NoopErrorRecovery {
    fn recover(&self) -> BoxFut<'_, anyhow::Result<()>> {
        Box::pin(async { Ok(()) })
    }
}

fn store() -> Arc<Store> {
    let config = Config::parse_from(["armd"]);
    let trajectory = Arc::new(RwLock::new(TrajectoryLog::new(100, 0.1, 0.05, 0.1)));
    let arm: Arc<dyn ArmBackend> = Arc::new(MockArm::default());
    let base: Arc<dyn BaseBackend> = Arc::new(MockBase::default());
    let gripper: Arc<dyn GripperBackend> = Arc::new(MockGripper::default());
    let cameras: Arc<dyn CameraBackend> = Arc::new(MockCamera::default());

    let aggregator = Arc::new(Aggregator::new(
        arm.clone(),
        base.clone(),
        gripper.clone(),
        trajectory.clone(),
        Duration::from_secs(5),
    ));
    let rewind = Arc::new(RewindOrchestrator::new(
        trajectory.clone(),
        arm.clone(),
        base.clone(),
        RewindConfig::default(),
    ));

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

    let supervisor: Arc<dyn Supervisor> = Arc::new(ProcessSupervisor::new(HashMap::new(), tempfile::NamedTempFile::new().unwrap().path().to_path_buf()));
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
async fn log_history_is_bounded() {
    let store = store();
    for i in 0..(EVENT_HISTORY_CAPACITY + 50) {
        store.push_log(FeedbackEvent::CmdAck { cmd_id: i.to_string() }).await;
    }
    assert_eq!(store.recent_logs().await.len(), EVENT_HISTORY_CAPACITY);
    let logs = store.recent_logs().await;
    assert_eq!(logs.first(), Some(&FeedbackEvent::CmdAck { cmd_id: "50".to_owned() }));
}

#[tokio::test]
async fn log_subscriber_drains_broadcast_events() {
    let store = store();
    store.spawn_log_subscriber();
    store.events.send(FeedbackEvent::ResettingToHome).unwrap();
    tokio::time::sleep(Duration::from_millis(50)).await;
    let logs = store.recent_logs().await;
    assert!(logs.iter().any(|e| matches!(e, FeedbackEvent::ResettingToHome)));
}

#[test]
fn debug_impl_omits_auth_token_value() {
    let store = store();
    let rendered = format!("{store:?}");
    assert!(rendered.contains("auth_enabled"));
    assert!(!rendered.contains("ARMD_AUTH_TOKEN"));
}

#[tokio::test]
async fn manual_rewind_percentage_defaults() {
    let store = store();
    assert_eq!(*store.manual_rewind_percentage.read().await, 5.0);
}
