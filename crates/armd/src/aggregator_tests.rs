// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::RwLock;

use super::*;
use crate::backend::mock::{MockArm, MockBase, MockGripper};

fn aggregator() -> Arc<Aggregator> {
    let trajectory = Arc::new(RwLock::new(TrajectoryLog::new(1000, 0.1, 0.05, 0.1)));
    Arc::new(Aggregator::new(
        Arc::new(MockArm::default()),
        Arc::new(MockBase::default()),
        Arc::new(MockGripper::default()),
        trajectory,
        Duration::from_secs(5),
    ))
}

#[test]
fn world_ee_pose_at_identity_base_matches_arm_frame() {
    let base_ee = ArmState::default().ee_pose;
    let world = world_ee_pose((0.0, 0.0, 0.0), base_ee);
    assert_eq!(world, base_ee);
}

#[test]
fn world_ee_pose_translates_by_base_position() {
    let mut base_ee = StateSnapshot::identity();
    base_ee[12] = 1.0;
    base_ee[13] = 2.0;
    let world = world_ee_pose((3.0, 4.0, 0.0), base_ee);
    assert!((world[12] - 4.0).abs() < 1e-9);
    assert!((world[13] - 6.0).abs() < 1e-9);
}

#[test]
fn world_ee_pose_rotates_by_base_heading() {
    // 90-degree base rotation maps base-frame +x to world-frame +y.
    let mut base_ee = StateSnapshot::identity();
    base_ee[12] = 1.0;
    let world = world_ee_pose((0.0, 0.0, std::f64::consts::FRAC_PI_2), base_ee);
    assert!(world[12].abs() < 1e-9);
    assert!((world[13] - 1.0).abs() < 1e-9);
}

#[tokio::test]
async fn tick_publishes_snapshot_and_records_first_waypoint() {
    let agg = aggregator();
    agg.tick().await;
    let snap = agg.snapshot().await;
    assert!(!snap.arm.ee_pose.iter().all(|v| *v == 0.0));
    assert_eq!(agg.trajectory_sequence(), 1);
}

#[tokio::test]
async fn tick_skips_disconnected_backend_without_panicking() {
    let base = Arc::new(MockBase::default());
    base.disconnect().await;
    let trajectory = Arc::new(RwLock::new(TrajectoryLog::new(1000, 0.1, 0.05, 0.1)));
    let agg = Arc::new(Aggregator::new(
        Arc::new(MockArm::default()),
        base,
        Arc::new(MockGripper::default()),
        trajectory,
        Duration::from_millis(10),
    ));
    agg.tick().await;
    let snap = agg.snapshot().await;
    assert_eq!(snap.base.pose, (0.0, 0.0, 0.0));
}

#[tokio::test]
async fn reconnect_gate_limits_attempts_per_interval() {
    let gate = ReconnectGate::new();
    assert!(gate.should_attempt(BackendKind::Arm, Duration::from_secs(60)).await);
    assert!(!gate.should_attempt(BackendKind::Arm, Duration::from_secs(60)).await);
    assert!(gate.should_attempt(BackendKind::Base, Duration::from_secs(60)).await);
}

#[tokio::test]
async fn motors_moving_updates_last_moved_at() {
    let agg = aggregator();
    assert!(agg.last_moved_at().is_none());
    let base = Arc::new(MockBase::default());
    base.set_target_velocity(1.0, 0.0, 0.0, crate::backend::Frame::Global).await.unwrap();
    let trajectory = Arc::new(RwLock::new(TrajectoryLog::new(1000, 0.1, 0.05, 0.1)));
    let agg2 = Aggregator::new(
        Arc::new(MockArm::default()),
        base,
        Arc::new(MockGripper::default()),
        trajectory,
        Duration::from_secs(5),
    );
    agg2.tick().await;
    assert!(agg2.last_moved_at().is_some());
}
