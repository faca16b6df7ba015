// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::RwLock;

use super::*;
use crate::backend::mock::{MockArm, MockBase};

fn populated_log(count: usize) -> Arc<RwLock<TrajectoryLog>> {
    let mut log = TrajectoryLog::new(1000, 0.0, 0.0, 0.0);
    for i in 0..count {
        log.append(Waypoint {
            t: i as f64,
            base_pose: (0.05 * i as f64, 0.0, 0.0),
            arm_q: [i as f64 * 0.01; 7],
            gripper_width: 0.08,
        });
    }
    Arc::new(RwLock::new(log))
}

fn fast_config() -> RewindConfig {
    RewindConfig {
        chunk_size: 5,
        chunk_duration: Duration::from_millis(20),
        command_hz: 200.0,
        settle_time: Duration::from_millis(1),
        safety_margin: 0.05,
        joint_tolerance: 0.05,
        joint_velocity_quiescent: 0.5,
        rewind_base: true,
        rewind_arm: true,
        rewind_gripper: false,
    }
}

fn orchestrator(log: Arc<RwLock<TrajectoryLog>>) -> RewindOrchestrator {
    RewindOrchestrator::new(log, Arc::new(MockArm::default()), Arc::new(MockBase::default()), fast_config())
}

#[tokio::test]
async fn rewind_percentage_truncates_log_and_counts_steps() {
    let log = populated_log(20);
    let orch = orchestrator(log.clone());

    let result = orch
        .rewind(RewindRequest {
            components: vec![Component::Base, Component::Arm],
            target: RewindTarget::Percentage(50.0),
            dry_run: false,
        })
        .await;

    assert!(result.success);
    assert_eq!(result.steps_rewound, 10);
    assert_eq!(log.read().await.len(), 10);
}

#[tokio::test]
async fn dry_run_does_not_mutate_log() {
    let log = populated_log(20);
    let orch = orchestrator(log.clone());

    let result = orch
        .rewind(RewindRequest {
            components: vec![Component::Base, Component::Arm],
            target: RewindTarget::Steps(5),
            dry_run: true,
        })
        .await;

    assert!(result.success);
    assert_eq!(result.steps_rewound, 5);
    assert_eq!(log.read().await.len(), 20);
}

#[tokio::test]
async fn empty_log_is_a_successful_noop() {
    let log = populated_log(0);
    let orch = orchestrator(log);
    let result = orch
        .rewind(RewindRequest { target: RewindTarget::Percentage(50.0), ..Default::default() })
        .await;
    assert!(result.success);
    assert_eq!(result.steps_rewound, 0);
}

#[tokio::test]
async fn rewind_to_last_index_is_a_successful_noop() {
    let log = populated_log(5);
    let orch = orchestrator(log.clone());
    let result = orch
        .rewind(RewindRequest { target: RewindTarget::Steps(0), ..Default::default() })
        .await;
    assert!(result.success);
    assert_eq!(result.steps_rewound, 0);
    assert_eq!(log.read().await.len(), 5);
}

#[tokio::test]
async fn to_safe_fails_when_no_waypoint_in_bounds() {
    let log = populated_log(5);
    let orch = orchestrator(log);
    let result = orch
        .rewind(RewindRequest {
            target: RewindTarget::ToSafe { bounds: (100.0, 200.0, 100.0, 200.0) },
            ..Default::default()
        })
        .await;
    assert!(!result.success);
    assert!(result.error.unwrap().contains("no safe waypoint"));
}

#[tokio::test]
async fn is_rewinding_flag_clears_after_completion() {
    let log = populated_log(10);
    let orch = orchestrator(log);
    assert!(!orch.is_rewinding());
    orch.rewind(RewindRequest { target: RewindTarget::Steps(3), ..Default::default() }).await;
    assert!(!orch.is_rewinding());
}

#[test]
fn smoothstep_is_monotonic_and_clamped() {
    assert_eq!(smoothstep(-1.0), 0.0);
    assert_eq!(smoothstep(2.0), 1.0);
    assert!(smoothstep(0.25) < smoothstep(0.75));
}
