// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use std::sync::atomic::AtomicBool;
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::RwLock;

use super::*;
use crate::backend::mock::{MockArm, MockBase};
use crate::backend::Frame;
use crate::trajectory::TrajectoryLog;

fn config() -> SafetyMonitorConfig {
    SafetyMonitorConfig {
        auto_rewind_enabled: true,
        auto_rewind_percentage: 10.0,
        workspace_bounds: (-1.0, 1.0, -1.0, 1.0),
        collision_min_cmd_speed: 0.05,
        collision_velocity_threshold: 0.5,
        collision_grace_period: Duration::from_millis(20),
        cooldown: Duration::from_millis(50),
    }
}

async fn monitor() -> (Arc<SafetyMonitor>, Arc<MockBase>) {
    let base = Arc::new(MockBase::default());
    let arm: Arc<dyn crate::backend::ArmBackend> = Arc::new(MockArm::default());
    let base_dyn: Arc<dyn BaseBackend> = base.clone();
    let trajectory = Arc::new(RwLock::new(TrajectoryLog::new(1000, 0.1, 0.05, 0.1)));
    let aggregator = Arc::new(Aggregator::new(
        arm,
        base_dyn.clone(),
        Arc::new(crate::backend::mock::MockGripper::default()),
        trajectory.clone(),
        Duration::from_secs(5),
    ));
    let rewind = Arc::new(RewindOrchestrator::new(
        trajectory,
        Arc::new(MockArm::default()),
        Arc::new(MockBase::default()),
        crate::rewind::RewindConfig::default(),
    ));
    let sm = Arc::new(SafetyMonitor::new(
        config(),
        aggregator,
        base_dyn,
        rewind,
        Arc::new(AtomicBool::new(false)),
    ));
    (sm, base)
}

#[tokio::test]
async fn boundary_violation_latches_and_triggers() {
    let (sm, base) = monitor().await;
    base.execute_action(50.0, 0.0, 0.0).await.unwrap();
    sm.tick().await;
    let status = sm.status().await;
    assert!(status.boundary_latched);
    assert_eq!(status.last_trigger_reason, Some(TriggerReason::Boundary));
    assert_eq!(status.auto_rewind_count, 1);
}

#[tokio::test]
async fn in_bounds_does_not_latch() {
    let (sm, _base) = monitor().await;
    sm.tick().await;
    let status = sm.status().await;
    assert!(!status.boundary_latched);
    assert_eq!(status.auto_rewind_count, 0);
}

#[tokio::test]
async fn disabled_auto_rewind_skips_tick() {
    let (sm, base) = monitor().await;
    sm.set_config(SafetyMonitorConfig { auto_rewind_enabled: false, ..config() }).await;
    base.execute_action(50.0, 0.0, 0.0).await.unwrap();
    sm.tick().await;
    assert_eq!(sm.status().await.auto_rewind_count, 0);
}

#[tokio::test]
async fn cooldown_prevents_back_to_back_triggers() {
    let (sm, base) = monitor().await;
    base.execute_action(50.0, 0.0, 0.0).await.unwrap();
    sm.tick().await;
    sm.tick().await;
    assert_eq!(sm.status().await.auto_rewind_count, 1);
}

#[tokio::test]
async fn collision_requires_velocity_mode_and_recent_command() {
    let (sm, base) = monitor().await;
    // Position-mode command; collision check must not fire off it.
    base.execute_action(0.0, 0.0, 0.0).await.unwrap();
    sm.tick().await;
    assert!(!sm.status().await.collision_latched);
}

#[tokio::test]
async fn collision_does_not_latch_when_actual_tracks_commanded() {
    // MockBase's measured velocity mirrors the commanded one, so ratio == 1.0
    // stays above the threshold and never latches.
    let (sm, base) = monitor().await;
    base.set_target_velocity(1.0, 0.0, 0.0, Frame::Global).await.unwrap();
    sm.tick().await;
    assert!(!sm.status().await.collision_latched);
}
