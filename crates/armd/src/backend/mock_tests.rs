// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use super::*;

#[tokio::test]
async fn arm_reports_home_state_and_tracks_publish_count() {
    let arm = MockArm::default();
    let before = arm.state_count();
    let state = arm.get_state().await.unwrap();
    assert_eq!(state.q, ARM_HOME_Q);
    assert_eq!(arm.state_count(), before + 1);
}

#[tokio::test]
async fn arm_joint_position_updates_state() {
    let arm = MockArm::default();
    arm.send_joint_position([1.0; 7]).await.unwrap();
    let state = arm.get_state().await.unwrap();
    assert_eq!(state.q, [1.0; 7]);
}

#[tokio::test]
async fn base_execute_action_sets_pose_and_mode() {
    let base = MockBase::default();
    base.execute_action(1.0, 2.0, 0.5).await.unwrap();
    let state = base.get_state().await.unwrap();
    assert_eq!(state.pose, (1.0, 2.0, 0.5));
    assert_eq!(base.last_command_mode(), Some(BaseCommandMode::Position));
}

#[tokio::test]
async fn base_velocity_command_tracked_for_collision_check() {
    let base = MockBase::default();
    base.set_target_velocity(0.5, 0.0, 0.0, Frame::Global).await.unwrap();
    assert_eq!(base.last_command_mode(), Some(BaseCommandMode::Velocity));
    assert_eq!(base.last_commanded_velocity(), Some((0.5, 0.0, 0.0)));
    assert!(base.last_command_at().is_some());
}

#[tokio::test]
async fn gripper_close_sets_width_near_zero() {
    let gripper = MockGripper::default();
    gripper.close().await.unwrap();
    let state = gripper.get_state().await.unwrap();
    assert_eq!(state.position, 255);
    assert!(state.width < 0.01);
}

#[tokio::test]
async fn backend_disconnect_is_observable() {
    let arm = MockArm::default();
    assert!(arm.is_connected());
    arm.disconnect().await;
    assert!(!arm.is_connected());
    arm.connect().await.unwrap();
    assert!(arm.is_connected());
}

#[tokio::test]
async fn camera_lists_and_serves_known_ids() {
    let camera = MockCamera::default();
    let ids = camera.list_ids();
    assert_eq!(ids, vec!["front".to_owned()]);

    let frame = camera.get_frame("front").await.unwrap();
    assert_eq!(frame.content_type, "image/jpeg");
    assert!(!frame.data.is_empty());

    let intrinsics = camera.get_intrinsics("front").await.unwrap();
    assert_eq!(intrinsics.width, 640);
}

#[tokio::test]
async fn camera_rejects_unknown_id() {
    let camera = MockCamera::default();
    assert!(camera.get_frame("nonexistent").await.is_err());
}
