// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Static safety envelope: pure admissibility checks for commands.
//!
//! None of these mutate or clamp a command — they only accept or reject it
//! with a structured reason describing the failing axis.

use crate::config::Config;
use crate::error::ErrorCode;

/// A rejected command, carrying the machine-readable reason and a detail string.
#[derive(Debug, Clone, PartialEq)]
pub struct Rejection {
    pub reason: ErrorCode,
    pub detail: String,
}

pub type CheckResult = Result<(), Rejection>;

/// Pure safety checks against the configured workspace and limits.
#[derive(Debug, Clone)]
pub struct SafetyEnvelope {
    pub base_x: (f64, f64),
    pub base_y: (f64, f64),
    pub base_linear_vel_max: f64,
    pub base_angular_vel_max: f64,
    pub arm_x: (f64, f64),
    pub arm_y: (f64, f64),
    pub arm_z: (f64, f64),
    pub arm_joint_vel_max: f64,
    pub gripper_force_max: f64,
}

impl From<&Config> for SafetyEnvelope {
    fn from(c: &Config) -> Self {
        Self {
            base_x: (c.base_x_min, c.base_x_max),
            base_y: (c.base_y_min, c.base_y_max),
            base_linear_vel_max: c.base_linear_vel_max,
            base_angular_vel_max: c.base_angular_vel_max,
            arm_x: (c.arm_x_min, c.arm_x_max),
            arm_y: (c.arm_y_min, c.arm_y_max),
            arm_z: (c.arm_z_min, c.arm_z_max),
            arm_joint_vel_max: c.arm_joint_vel_max,
            gripper_force_max: c.gripper_force_max,
        }
    }
}

impl SafetyEnvelope {
    pub fn check_base_pose(&self, x: f64, y: f64, _theta: f64) -> CheckResult {
        if x < self.base_x.0 || x > self.base_x.1 || y < self.base_y.0 || y > self.base_y.1 {
            return Err(Rejection {
                reason: ErrorCode::OutOfBounds,
                detail: format!(
                    "base pose ({x:.3}, {y:.3}) outside workspace x={:?} y={:?}",
                    self.base_x, self.base_y
                ),
            });
        }
        Ok(())
    }

    pub fn check_base_velocity(&self, vx: f64, vy: f64, omega: f64) -> CheckResult {
        let speed = (vx * vx + vy * vy).sqrt();
        if speed > self.base_linear_vel_max {
            return Err(Rejection {
                reason: ErrorCode::VelocityLimit,
                detail: format!(
                    "base linear speed {speed:.3} exceeds cap {:.3}",
                    self.base_linear_vel_max
                ),
            });
        }
        if omega.abs() > self.base_angular_vel_max {
            return Err(Rejection {
                reason: ErrorCode::VelocityLimit,
                detail: format!(
                    "base angular speed {:.3} exceeds cap {:.3}",
                    omega.abs(),
                    self.base_angular_vel_max
                ),
            });
        }
        Ok(())
    }

    /// `pose16` is a column-major 4x4 homogeneous transform; translation is
    /// at indices 12, 13, 14.
    pub fn check_arm_cartesian(&self, pose16: &[f64; 16]) -> CheckResult {
        let (x, y, z) = (pose16[12], pose16[13], pose16[14]);
        if x < self.arm_x.0
            || x > self.arm_x.1
            || y < self.arm_y.0
            || y > self.arm_y.1
            || z < self.arm_z.0
            || z > self.arm_z.1
        {
            return Err(Rejection {
                reason: ErrorCode::OutOfBounds,
                detail: format!(
                    "arm end-effector ({x:.3}, {y:.3}, {z:.3}) outside workspace"
                ),
            });
        }
        Ok(())
    }

    pub fn check_arm_joint_velocity(&self, dq: &[f64; 7]) -> CheckResult {
        if let Some((i, v)) = dq
            .iter()
            .enumerate()
            .find(|(_, v)| v.abs() > self.arm_joint_vel_max)
        {
            return Err(Rejection {
                reason: ErrorCode::VelocityLimit,
                detail: format!(
                    "joint {i} velocity {:.3} exceeds cap {:.3}",
                    v.abs(),
                    self.arm_joint_vel_max
                ),
            });
        }
        Ok(())
    }

    pub fn check_gripper_force(&self, force: f64) -> CheckResult {
        if force > self.gripper_force_max {
            return Err(Rejection {
                reason: ErrorCode::ForceLimit,
                detail: format!(
                    "gripper force {force:.3} exceeds cap {:.3}",
                    self.gripper_force_max
                ),
            });
        }
        Ok(())
    }
}

#[cfg(test)]
#[path = "envelope_tests.rs"]
mod tests;
