// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Rewind orchestrator: drives the robot backward along the recorded
//! trajectory, keeping the base and arm in time-lock.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tokio::sync::{Mutex, RwLock};
use tracing::warn;

use crate::backend::{ArmBackend, BaseBackend};
use crate::lease::LeaseHook;
use crate::trajectory::{TrajectoryLog, Waypoint};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Component {
    Base,
    Arm,
    Gripper,
}

/// How the caller specifies how far back to rewind.
#[derive(Debug, Clone, Copy)]
pub enum RewindTarget {
    Steps(usize),
    Percentage(f64),
    ToSafe { bounds: (f64, f64, f64, f64) },
    ToIndex(usize),
}

#[derive(Debug, Clone)]
pub struct RewindRequest {
    /// `Gripper` is accepted and echoed back in the result for API parity,
    /// but the replay itself only actuates `base` and `arm`.
    pub components: Vec<Component>,
    pub target: RewindTarget,
    pub dry_run: bool,
}

impl Default for RewindRequest {
    fn default() -> Self {
        Self {
            components: vec![Component::Base, Component::Arm],
            target: RewindTarget::Percentage(10.0),
            dry_run: false,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RewindResult {
    pub success: bool,
    pub steps_rewound: usize,
    pub start_waypoint_idx: usize,
    pub end_waypoint_idx: usize,
    pub waypoints_executed: Vec<usize>,
    pub components_rewound: Vec<Component>,
    pub error: Option<String>,
}

impl RewindResult {
    fn noop(idx: usize) -> Self {
        Self {
            success: true,
            steps_rewound: 0,
            start_waypoint_idx: idx,
            end_waypoint_idx: idx,
            waypoints_executed: vec![],
            components_rewound: vec![],
            error: None,
        }
    }
}

#[derive(Debug, Clone, Copy)]
pub struct RewindConfig {
    pub chunk_size: usize,
    pub chunk_duration: Duration,
    pub command_hz: f64,
    pub settle_time: Duration,
    pub safety_margin: f64,
    pub joint_tolerance: f64,
    pub joint_velocity_quiescent: f64,
    /// Default component toggles, used to resolve a request whose
    /// `components` list is omitted entirely.
    pub rewind_base: bool,
    pub rewind_arm: bool,
    pub rewind_gripper: bool,
}

impl Default for RewindConfig {
    fn default() -> Self {
        Self {
            chunk_size: 5,
            chunk_duration: Duration::from_secs_f64(1.0),
            command_hz: 50.0,
            settle_time: Duration::from_millis(200),
            safety_margin: 0.05,
            joint_tolerance: 0.05,
            joint_velocity_quiescent: 0.05,
            rewind_base: true,
            rewind_arm: true,
            rewind_gripper: false,
        }
    }
}

impl RewindConfig {
    /// The component list implied by the default toggles, for requests that
    /// omit `components` entirely.
    pub fn default_components(&self) -> Vec<Component> {
        let mut components = Vec::new();
        if self.rewind_base {
            components.push(Component::Base);
        }
        if self.rewind_arm {
            components.push(Component::Arm);
        }
        if self.rewind_gripper {
            components.push(Component::Gripper);
        }
        components
    }
}

/// Cubic ease-in/ease-out interpolation factor for `t ∈ [0, 1]`.
fn smoothstep(t: f64) -> f64 {
    let t = t.clamp(0.0, 1.0);
    t * t * (3.0 - 2.0 * t)
}

fn lerp_q(a: [f64; 7], b: [f64; 7], s: f64) -> [f64; 7] {
    std::array::from_fn(|i| a[i] + (b[i] - a[i]) * s)
}

pub struct RewindOrchestrator {
    trajectory: Arc<RwLock<TrajectoryLog>>,
    arm: Arc<dyn ArmBackend>,
    base: Arc<dyn BaseBackend>,
    serial: Mutex<()>,
    is_rewinding: AtomicBool,
    config: RwLock<RewindConfig>,
}

impl RewindOrchestrator {
    pub fn new(
        trajectory: Arc<RwLock<TrajectoryLog>>,
        arm: Arc<dyn ArmBackend>,
        base: Arc<dyn BaseBackend>,
        config: RewindConfig,
    ) -> Self {
        Self {
            trajectory,
            arm,
            base,
            serial: Mutex::new(()),
            is_rewinding: AtomicBool::new(false),
            config: RwLock::new(config),
        }
    }

    pub fn is_rewinding(&self) -> bool {
        self.is_rewinding.load(Ordering::Acquire)
    }

    /// Current hot-reloadable knobs, read fresh by `PUT /rewind/config`'s GET sibling.
    pub async fn config(&self) -> RewindConfig {
        *self.config.read().await
    }

    /// Mutate the hot-reloadable knobs; picked up by the next rewind call.
    pub async fn set_config(&self, config: RewindConfig) {
        *self.config.write().await = config;
    }

    /// Rewind the log to the origin and clear it. The canonical
    /// `reset_on_release` lease hook.
    pub async fn rewind_to_origin_and_clear(&self) -> anyhow::Result<()> {
        let result = self
            .rewind(RewindRequest {
                components: vec![Component::Base, Component::Arm],
                target: RewindTarget::ToIndex(0),
                dry_run: false,
            })
            .await;
        self.trajectory.write().await.clear();
        if result.success {
            Ok(())
        } else {
            anyhow::bail!(result.error.unwrap_or_else(|| "rewind failed".to_owned()))
        }
    }

    pub async fn rewind(&self, req: RewindRequest) -> RewindResult {
        // Only one replay at a time; concurrent callers queue on this mutex.
        let _guard = self.serial.lock().await;
        self.is_rewinding.store(true, Ordering::Release);
        let result = self.rewind_locked(req).await;
        self.is_rewinding.store(false, Ordering::Release);
        result
    }

    async fn rewind_locked(&self, req: RewindRequest) -> RewindResult {
        let snapshot = self.trajectory.read().await.snapshot();
        let n = snapshot.len();
        if n == 0 {
            return RewindResult::noop(0);
        }
        let last_idx = n - 1;

        let k = match self.resolve_target(req.target, &snapshot) {
            Ok(k) => k,
            Err(e) => {
                let mut r = RewindResult::noop(last_idx);
                r.success = false;
                r.error = Some(e);
                return r;
            }
        };

        if k >= last_idx {
            return RewindResult::noop(last_idx);
        }

        // Replay order is newest to oldest: log[n-1], log[n-2], ..., log[k].
        let replay: Vec<(usize, Waypoint)> =
            (k..=last_idx).rev().map(|i| (i, snapshot[i])).collect();
        let waypoints_executed: Vec<usize> = replay.iter().map(|(i, _)| *i).collect();

        if req.dry_run {
            return RewindResult {
                success: true,
                steps_rewound: last_idx - k,
                start_waypoint_idx: last_idx,
                end_waypoint_idx: k,
                waypoints_executed,
                components_rewound: req.components.clone(),
                error: None,
            };
        }

        let use_base = req.components.contains(&Component::Base);
        let use_arm = req.components.contains(&Component::Arm);
        let config = self.config().await;

        let mut executed = Vec::new();
        let mut last_wp = replay.first().map(|(_, wp)| *wp);
        let mut failure = None;

        for chunk in replay.chunks(config.chunk_size) {
            match self.run_chunk(chunk, use_base, use_arm, last_wp, &config).await {
                Ok(()) => {
                    executed.extend(chunk.iter().map(|(i, _)| *i));
                    last_wp = chunk.last().map(|(_, wp)| *wp);
                }
                Err(e) => {
                    warn!("rewind chunk failed: {e:#}");
                    failure = Some(e.to_string());
                    break;
                }
            }
        }

        if let Some(error) = failure {
            return RewindResult {
                success: false,
                steps_rewound: executed.len(),
                start_waypoint_idx: last_idx,
                end_waypoint_idx: executed.last().copied().unwrap_or(last_idx),
                waypoints_executed: executed,
                components_rewound: req.components,
                error: Some(error),
            };
        }

        self.trajectory.write().await.truncate(k + 1);

        RewindResult {
            success: true,
            steps_rewound: last_idx - k,
            start_waypoint_idx: last_idx,
            end_waypoint_idx: k,
            waypoints_executed,
            components_rewound: req.components,
            error: None,
        }
    }

    fn resolve_target(&self, target: RewindTarget, snapshot: &[Waypoint]) -> Result<usize, String> {
        let n = snapshot.len();
        let last_idx = n - 1;
        match target {
            RewindTarget::Steps(s) => Ok(last_idx.saturating_sub(s)),
            RewindTarget::Percentage(p) => {
                let steps = ((p / 100.0) * n as f64).round() as usize;
                Ok(last_idx.saturating_sub(steps))
            }
            RewindTarget::ToSafe { bounds } => {
                let log_idx = snapshot
                    .iter()
                    .enumerate()
                    .rev()
                    .find_map(|(idx, wp)| {
                        let (x, y, _) = wp.base_pose;
                        let (x_min, x_max, y_min, y_max) = bounds;
                        (x >= x_min && x <= x_max && y >= y_min && y <= y_max).then_some(idx)
                    });
                log_idx.ok_or_else(|| "no safe waypoint in trajectory log".to_owned())
            }
            RewindTarget::ToIndex(idx) => Ok(idx.min(last_idx)),
        }
    }

    /// Execute one chunk: base teleports (position mode) to the chunk's final
    /// waypoint; arm streams an interpolated joint trajectory across the
    /// chunk's waypoints at `command_hz`, preceded by a short establishing
    /// burst at the starting pose to avoid a step at the join.
    async fn run_chunk(
        &self,
        chunk: &[(usize, Waypoint)],
        use_base: bool,
        use_arm: bool,
        prior_wp: Option<Waypoint>,
        config: &RewindConfig,
    ) -> anyhow::Result<()> {
        let Some((_, final_wp)) = chunk.last() else {
            anyhow::bail!("rewind chunk was empty");
        };
        let final_wp = *final_wp;

        let base_fut = async {
            if use_base {
                self.base.execute_action(final_wp.base_pose.0, final_wp.base_pose.1, final_wp.base_pose.2).await
            } else {
                Ok(())
            }
        };

        let arm_fut = async {
            if use_arm {
                self.stream_arm_interpolation(chunk, prior_wp, config).await
            } else {
                Ok(())
            }
        };

        let (base_res, arm_res) = tokio::join!(base_fut, arm_fut);
        base_res?;
        arm_res?;

        tokio::time::sleep(config.settle_time).await;
        self.verify_arrival(final_wp, use_base, use_arm, config).await;
        Ok(())
    }

    async fn stream_arm_interpolation(
        &self,
        chunk: &[(usize, Waypoint)],
        prior_wp: Option<Waypoint>,
        config: &RewindConfig,
    ) -> anyhow::Result<()> {
        let command_period = Duration::from_secs_f64(1.0 / config.command_hz);
        let steps_per_segment = ((config.chunk_duration.as_secs_f64() / chunk.len().max(1) as f64)
            / command_period.as_secs_f64())
        .round()
        .max(1.0) as usize;

        let start_q = prior_wp.map(|w| w.arm_q).unwrap_or(chunk[0].1.arm_q);

        // Establishing burst: re-send the current joint target a few times
        // so the interpolation doesn't begin with a discontinuous step.
        for _ in 0..3 {
            self.arm.send_joint_position(start_q).await?;
            tokio::time::sleep(command_period).await;
        }

        let mut from_q = start_q;
        for (_, wp) in chunk {
            let to_q = wp.arm_q;
            for step in 1..=steps_per_segment {
                let s = smoothstep(step as f64 / steps_per_segment as f64);
                let q = lerp_q(from_q, to_q, s);
                self.arm.send_joint_position(q).await?;
                tokio::time::sleep(command_period).await;
            }
            from_q = to_q;
        }
        Ok(())
    }

    /// Non-fatal arrival check: records a warning on deviation but never
    /// aborts the replay — it is best-effort.
    async fn verify_arrival(&self, target: Waypoint, use_base: bool, use_arm: bool, config: &RewindConfig) {
        if use_base {
            if let Ok(state) = self.base.get_state().await {
                let (x, y, _) = state.pose;
                let (tx, ty, _) = target.base_pose;
                let err = ((x - tx).powi(2) + (y - ty).powi(2)).sqrt();
                if err > config.safety_margin {
                    warn!("rewind base arrival deviation: {err:.3}m beyond safety margin");
                }
            }
        }
        if use_arm {
            if let Ok(state) = self.arm.get_state().await {
                let max_err = state
                    .q
                    .iter()
                    .zip(target.arm_q.iter())
                    .map(|(a, b)| (a - b).abs())
                    .fold(0.0_f64, f64::max);
                let max_vel = state.dq.iter().cloned().fold(0.0_f64, |acc, v| acc.max(v.abs()));
                if max_err > config.joint_tolerance || max_vel > config.joint_velocity_quiescent {
                    warn!("rewind arm arrival deviation: {max_err:.3} rad, {max_vel:.3} rad/s residual");
                }
            }
        }
    }
}

impl LeaseHook for RewindOrchestrator {
    fn run(&self) -> std::pin::Pin<Box<dyn std::future::Future<Output = anyhow::Result<()>> + Send + '_>> {
        Box::pin(self.rewind_to_origin_and_clear())
    }
}

#[cfg(test)]
#[path = "rewind_tests.rs"]
mod tests;
