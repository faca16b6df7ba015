// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Adapters to external hardware driver processes (arm, base, gripper).
//!
//! Drivers themselves are out of scope; this module defines the contract the
//! core uses to talk to them and a mock implementation for tests and local
//! runs without hardware attached.
//!
//! Trait methods return a boxed future rather than using `async fn in trait`
//! so `Arc<dyn ArmBackend>` etc. remain object-safe — the core holds backends
//! behind a trait object to stay agnostic to which physical driver is wired
//! up.

pub mod mock;

use std::future::Future;
use std::pin::Pin;
use std::time::Instant;

use serde::{Deserialize, Serialize};

pub(crate) type BoxFut<'a, T> = Pin<Box<dyn Future<Output = T> + Send + 'a>>;

/// Velocity command frame.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Frame {
    Global,
    Local,
}

/// Base driver control mode, tracked so the safety monitor knows whether the
/// most recent command was a velocity command (collision-relevant) or not.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BaseCommandMode {
    Position,
    Velocity,
}

#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize)]
pub struct BaseState {
    pub pose: (f64, f64, f64),
    pub velocity: (f64, f64, f64),
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct ArmState {
    pub q: [f64; 7],
    pub dq: [f64; 7],
    /// End-effector pose relative to the base, column-major 4x4.
    pub ee_pose: [f64; 16],
    pub ee_wrench: [f64; 6],
    pub mode: u8,
}

impl Default for ArmState {
    fn default() -> Self {
        let mut ee_pose = [0.0; 16];
        ee_pose[0] = 1.0;
        ee_pose[5] = 1.0;
        ee_pose[10] = 1.0;
        ee_pose[15] = 1.0;
        Self { q: [0.0; 7], dq: [0.0; 7], ee_pose, ee_wrench: [0.0; 6], mode: 0 }
    }
}

#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize)]
pub struct GripperState {
    pub position: u8,
    pub width: f64,
    pub is_moving: bool,
    pub object_detected: bool,
}

/// Home joint configuration, radians.
pub const ARM_HOME_Q: [f64; 7] = [0.0, -0.785, 0.0, -2.356, 0.0, 1.571, 0.785];

/// Common lifecycle surface shared by every backend.
pub trait Backend: Send + Sync {
    fn connect(&self) -> BoxFut<'_, anyhow::Result<()>>;
    fn disconnect(&self) -> BoxFut<'_, ()>;
    fn is_connected(&self) -> bool;
}

pub trait ArmBackend: Backend {
    fn get_state(&self) -> BoxFut<'_, anyhow::Result<ArmState>>;
    fn send_joint_position(&self, q: [f64; 7]) -> BoxFut<'_, anyhow::Result<()>>;
    fn send_cartesian_pose(&self, pose16: [f64; 16]) -> BoxFut<'_, anyhow::Result<()>>;
    fn send_joint_velocity(&self, dq: [f64; 7]) -> BoxFut<'_, anyhow::Result<()>>;
    fn send_cartesian_velocity(&self, vel6: [f64; 6]) -> BoxFut<'_, anyhow::Result<()>>;
    fn emergency_stop(&self) -> BoxFut<'_, anyhow::Result<()>>;
    /// Free-running counter incremented once per received state publication.
    /// Used by the driver-crash monitor to detect a stalled driver.
    fn state_count(&self) -> u64;
}

pub trait BaseBackend: Backend {
    fn get_state(&self) -> BoxFut<'_, anyhow::Result<BaseState>>;
    fn execute_action(&self, x: f64, y: f64, theta: f64) -> BoxFut<'_, anyhow::Result<()>>;
    fn set_target_velocity(
        &self,
        vx: f64,
        vy: f64,
        omega: f64,
        frame: Frame,
    ) -> BoxFut<'_, anyhow::Result<()>>;
    fn stop(&self) -> BoxFut<'_, anyhow::Result<()>>;
    fn reset(&self) -> BoxFut<'_, anyhow::Result<()>>;
    /// Which mode the most recent command was issued in, for the collision check.
    fn last_command_mode(&self) -> Option<BaseCommandMode>;
    fn last_command_at(&self) -> Option<Instant>;
    fn last_commanded_velocity(&self) -> Option<(f64, f64, f64)>;
}

pub trait GripperBackend: Backend {
    fn get_state(&self) -> BoxFut<'_, anyhow::Result<GripperState>>;
    fn activate(&self) -> BoxFut<'_, anyhow::Result<()>>;
    fn move_to(&self, position: u8, speed: u8, force: u8) -> BoxFut<'_, anyhow::Result<(u8, bool)>>;
    fn open(&self) -> BoxFut<'_, anyhow::Result<()>>;
    fn close(&self) -> BoxFut<'_, anyhow::Result<()>>;
    fn grasp(&self) -> BoxFut<'_, anyhow::Result<()>>;
    fn stop(&self) -> BoxFut<'_, anyhow::Result<()>>;
    fn calibrate(&self) -> BoxFut<'_, anyhow::Result<()>>;
}

/// A single decoded camera frame, ready to be written straight onto the wire.
#[derive(Debug, Clone)]
pub struct CameraFrame {
    pub content_type: &'static str,
    pub data: Vec<u8>,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct CameraIntrinsics {
    pub fx: f64,
    pub fy: f64,
    pub cx: f64,
    pub cy: f64,
    pub width: u32,
    pub height: u32,
}

/// Camera passthrough: the core relays frames verbatim, it never inspects
/// or processes them. Orthogonal to the rest of the backend set — cameras
/// have no bearing on safety, leases, or the trajectory log.
pub trait CameraBackend: Backend {
    fn list_ids(&self) -> Vec<String>;
    fn get_frame(&self, id: &str) -> BoxFut<'_, anyhow::Result<CameraFrame>>;
    fn get_intrinsics(&self, id: &str) -> BoxFut<'_, anyhow::Result<CameraIntrinsics>>;
}

#[cfg(test)]
#[path = "mod_tests.rs"]
mod tests;
