// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! State aggregator: polls backends at a fixed rate, publishes an atomic
//! unified snapshot, and feeds the trajectory log.

use std::collections::HashMap;
use std::sync::atomic::{AtomicI64, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use serde::{Deserialize, Serialize};
use tokio::sync::RwLock;
use tokio_util::sync::CancellationToken;
use tracing::warn;

use crate::backend::{ArmBackend, ArmState, BaseBackend, BaseState, GripperBackend, GripperState};
use crate::lease::MotionClock;
use crate::trajectory::{TrajectoryLog, Waypoint};

const MOTION_EPSILON: f64 = 0.01;

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct StateSnapshot {
    /// Seconds since the aggregator started, monotonic.
    pub timestamp: f64,
    pub base: BaseState,
    pub arm: ArmState,
    /// End-effector pose in the world frame, column-major 4x4.
    pub arm_ee_pose_world: [f64; 16],
    pub gripper: GripperState,
    pub motors_moving: bool,
}

impl StateSnapshot {
    fn identity() -> [f64; 16] {
        let mut m = [0.0; 16];
        m[0] = 1.0;
        m[5] = 1.0;
        m[10] = 1.0;
        m[15] = 1.0;
        m
    }
}

/// Which backend a reconnect attempt targets, for rate limiting.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
enum BackendKind {
    Arm,
    Base,
    Gripper,
}

/// Compose `T_world_base · T_base_EE` where `T_world_base` is the 2-D pose
/// `(x, y, theta)` lifted into a column-major 4x4 homogeneous transform.
fn world_ee_pose(base_pose: (f64, f64, f64), base_ee: [f64; 16]) -> [f64; 16] {
    let (x, y, theta) = base_pose;
    let (c, s) = (theta.cos(), theta.sin());
    // Column-major T_world_base.
    #[rustfmt::skip]
    let t_world_base: [f64; 16] = [
        c,    s,   0.0, 0.0,
        -s,   c,   0.0, 0.0,
        0.0,  0.0, 1.0, 0.0,
        x,    y,   0.0, 1.0,
    ];
    mat4_mul(&t_world_base, &base_ee)
}

/// Multiply two column-major 4x4 matrices: `a · b`.
fn mat4_mul(a: &[f64; 16], b: &[f64; 16]) -> [f64; 16] {
    let mut out = [0.0; 16];
    for col in 0..4 {
        for row in 0..4 {
            let mut acc = 0.0;
            for k in 0..4 {
                acc += a[k * 4 + row] * b[col * 4 + k];
            }
            out[col * 4 + row] = acc;
        }
    }
    out
}

struct ReconnectGate {
    last_attempt: RwLock<HashMap<BackendKind, Instant>>,
}

impl ReconnectGate {
    fn new() -> Self {
        Self { last_attempt: RwLock::new(HashMap::new()) }
    }

    async fn should_attempt(&self, kind: BackendKind, interval: Duration) -> bool {
        let mut guard = self.last_attempt.write().await;
        match guard.get(&kind) {
            Some(last) if last.elapsed() < interval => false,
            _ => {
                guard.insert(kind, Instant::now());
                true
            }
        }
    }
}

pub struct Aggregator {
    arm: Arc<dyn ArmBackend>,
    base: Arc<dyn BaseBackend>,
    gripper: Arc<dyn GripperBackend>,
    snapshot: RwLock<StateSnapshot>,
    trajectory: Arc<RwLock<TrajectoryLog>>,
    reconnect: ReconnectGate,
    reconnect_interval: Duration,
    last_moved_at: RwLock<Option<Instant>>,
    started_at: Instant,
    sequence: AtomicI64,
}

impl Aggregator {
    pub fn new(
        arm: Arc<dyn ArmBackend>,
        base: Arc<dyn BaseBackend>,
        gripper: Arc<dyn GripperBackend>,
        trajectory: Arc<RwLock<TrajectoryLog>>,
        reconnect_interval: Duration,
    ) -> Self {
        Self {
            arm,
            base,
            gripper,
            snapshot: RwLock::new(StateSnapshot {
                arm_ee_pose_world: StateSnapshot::identity(),
                ..Default::default()
            }),
            trajectory,
            reconnect: ReconnectGate::new(),
            reconnect_interval,
            last_moved_at: RwLock::new(None),
            started_at: Instant::now(),
            sequence: AtomicI64::new(0),
        }
    }

    pub async fn snapshot(&self) -> StateSnapshot {
        self.snapshot.read().await.clone()
    }

    /// Monotonically increasing count of trajectory waypoints recorded so
    /// far, for cheap change detection by readers.
    pub fn trajectory_sequence(&self) -> i64 {
        self.sequence.load(Ordering::Relaxed)
    }

    /// Run a single poll tick: reconnect if needed, read backend states,
    /// publish a snapshot, and feed the trajectory log.
    pub async fn tick(&self) {
        self.maybe_reconnect().await;

        let base = self.read_base().await;
        let arm = self.read_arm().await;
        let gripper = self.read_gripper().await;

        let motors_moving = arm.dq.iter().any(|d| d.abs() > MOTION_EPSILON)
            || [base.velocity.0, base.velocity.1, base.velocity.2]
                .iter()
                .any(|v| v.abs() > MOTION_EPSILON)
            || gripper.is_moving;

        if motors_moving {
            *self.last_moved_at.write().await = Some(Instant::now());
        }

        let arm_ee_pose_world = world_ee_pose(base.pose, arm.ee_pose);
        let timestamp = self.started_at.elapsed().as_secs_f64();

        let snap = StateSnapshot {
            timestamp,
            base,
            arm,
            arm_ee_pose_world,
            gripper,
            motors_moving,
        };
        *self.snapshot.write().await = snap.clone();
        self.maybe_record(snap).await;
    }

    async fn maybe_reconnect(&self) {
        if !self.arm.is_connected() && self.reconnect.should_attempt(BackendKind::Arm, self.reconnect_interval).await {
            if let Err(e) = self.arm.connect().await {
                warn!("arm reconnect failed: {e:#}");
            }
        }
        if !self.base.is_connected() && self.reconnect.should_attempt(BackendKind::Base, self.reconnect_interval).await {
            if let Err(e) = self.base.connect().await {
                warn!("base reconnect failed: {e:#}");
            }
        }
        if !self.gripper.is_connected() && self.reconnect.should_attempt(BackendKind::Gripper, self.reconnect_interval).await {
            if let Err(e) = self.gripper.connect().await {
                warn!("gripper reconnect failed: {e:#}");
            }
        }
    }

    async fn read_base(&self) -> BaseState {
        if !self.base.is_connected() {
            return BaseState::default();
        }
        match self.base.get_state().await {
            Ok(s) => s,
            Err(e) => {
                warn!("base get_state failed: {e:#}");
                BaseState::default()
            }
        }
    }

    async fn read_arm(&self) -> ArmState {
        if !self.arm.is_connected() {
            return ArmState::default();
        }
        match self.arm.get_state().await {
            Ok(s) => s,
            Err(e) => {
                warn!("arm get_state failed: {e:#}");
                ArmState::default()
            }
        }
    }

    async fn read_gripper(&self) -> GripperState {
        if !self.gripper.is_connected() {
            return GripperState::default();
        }
        match self.gripper.get_state().await {
            Ok(s) => s,
            Err(e) => {
                warn!("gripper get_state failed: {e:#}");
                GripperState::default()
            }
        }
    }

    async fn maybe_record(&self, snap: StateSnapshot) {
        let candidate = Waypoint {
            t: snap.timestamp,
            base_pose: snap.base.pose,
            arm_q: snap.arm.q,
            gripper_width: snap.gripper.width,
        };

        let mut log = self.trajectory.write().await;
        if log.should_record(&candidate) {
            log.append(candidate);
            self.sequence.fetch_add(1, Ordering::Relaxed);
        }
    }

    /// Spawn the poll loop; stops when `shutdown` is cancelled.
    pub fn spawn(self: &Arc<Self>, poll_interval: Duration, shutdown: CancellationToken) {
        let this = Arc::clone(self);
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(poll_interval);
            loop {
                tokio::select! {
                    _ = shutdown.cancelled() => break,
                    _ = ticker.tick() => this.tick().await,
                }
            }
        });
    }
}

impl MotionClock for Aggregator {
    fn last_moved_at(&self) -> Option<Instant> {
        self.last_moved_at.try_read().ok().and_then(|g| *g)
    }
}

#[cfg(test)]
#[path = "aggregator_tests.rs"]
mod tests;
