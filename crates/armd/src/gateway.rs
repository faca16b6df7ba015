// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Command gateway: lease check, connected check, safety envelope check,
//! dispatch — in that order, for every command.

use std::sync::Arc;

use tokio::sync::broadcast;
use tracing::warn;

use crate::backend::{ArmBackend, BaseBackend, Frame, GripperBackend};
use crate::envelope::{Rejection, SafetyEnvelope};
use crate::error::ErrorCode;
use crate::event::FeedbackEvent;
use crate::lease::LeaseManager;
use crate::rewind::{Component, RewindOrchestrator, RewindRequest, RewindResult, RewindTarget};

#[derive(Debug, Clone, Copy)]
pub enum BaseMoveCommand {
    Position { x: f64, y: f64, theta: f64 },
    Velocity { vx: f64, vy: f64, omega: f64, frame: Frame },
}

#[derive(Debug, Clone, Copy)]
pub enum ArmMoveCommand {
    JointPosition([f64; 7]),
    CartesianPose([f64; 16]),
    JointVelocity([f64; 7]),
    CartesianVelocity([f64; 6]),
}

#[derive(Debug, Clone, Copy)]
pub enum GripperCommand {
    Activate,
    /// Raw 0-255 position, or a calibrated width in meters — exactly one is set.
    Move { position: Option<u8>, width: Option<f64>, speed: u8, force: u8 },
    Open,
    Close,
    Grasp,
    Stop,
    Calibrate,
}

/// Meters at fully-open (position 0); used to convert a calibrated width
/// request into the backend's raw 0-255 position range.
const GRIPPER_MAX_WIDTH_M: f64 = 0.085;

pub struct CommandGateway {
    lease: Arc<LeaseManager>,
    envelope: SafetyEnvelope,
    arm: Arc<dyn ArmBackend>,
    base: Arc<dyn BaseBackend>,
    gripper: Arc<dyn GripperBackend>,
    rewind: Arc<RewindOrchestrator>,
    events: broadcast::Sender<FeedbackEvent>,
}

impl CommandGateway {
    pub fn new(
        lease: Arc<LeaseManager>,
        envelope: SafetyEnvelope,
        arm: Arc<dyn ArmBackend>,
        base: Arc<dyn BaseBackend>,
        gripper: Arc<dyn GripperBackend>,
        rewind: Arc<RewindOrchestrator>,
        events: broadcast::Sender<FeedbackEvent>,
    ) -> Self {
        Self { lease, envelope, arm, base, gripper, rewind, events }
    }

    fn emit(&self, event: FeedbackEvent) {
        let _ = self.events.send(event);
    }

    async fn check_lease<'a>(&self, lease_id: Option<&'a str>) -> Result<&'a str, Rejection> {
        let Some(id) = lease_id else {
            return Err(Rejection { reason: ErrorCode::NoLease, detail: "no lease id supplied".to_owned() });
        };
        if !self.lease.validate_lease(id).await {
            return Err(Rejection {
                reason: ErrorCode::InvalidLease,
                detail: "lease id does not match the current holder".to_owned(),
            });
        }
        Ok(id)
    }

    async fn reject(&self, cmd_id: &str, rejection: Rejection) -> Rejection {
        self.emit(FeedbackEvent::CmdRejected {
            cmd_id: cmd_id.to_owned(),
            reason: rejection.reason.as_str().to_owned(),
            detail: rejection.detail.clone(),
        });
        rejection
    }

    async fn succeed(&self, cmd_id: &str, lease_id: &str) {
        self.lease.record_command(lease_id).await;
        self.emit(FeedbackEvent::CmdResult { cmd_id: cmd_id.to_owned() });
    }

    fn backend_unavailable(detail: impl Into<String>) -> Rejection {
        Rejection { reason: ErrorCode::BackendUnavailable, detail: detail.into() }
    }

    pub async fn base_move(
        &self,
        lease_id: Option<&str>,
        cmd_id: &str,
        cmd: BaseMoveCommand,
    ) -> Result<(), Rejection> {
        let lease_id = match self.check_lease(lease_id).await {
            Ok(id) => id,
            Err(r) => return Err(self.reject(cmd_id, r).await),
        };

        if !self.base.is_connected() {
            let r = Self::backend_unavailable("base driver not connected");
            return Err(self.reject(cmd_id, r).await);
        }

        self.emit(FeedbackEvent::CmdAck { cmd_id: cmd_id.to_owned() });

        let check = match cmd {
            BaseMoveCommand::Position { x, y, theta } => self.envelope.check_base_pose(x, y, theta),
            BaseMoveCommand::Velocity { vx, vy, omega, .. } => self.envelope.check_base_velocity(vx, vy, omega),
        };
        if let Err(r) = check {
            return Err(self.reject(cmd_id, r).await);
        }

        let dispatch = match cmd {
            BaseMoveCommand::Position { x, y, theta } => self.base.execute_action(x, y, theta).await,
            BaseMoveCommand::Velocity { vx, vy, omega, frame } => {
                self.base.set_target_velocity(vx, vy, omega, frame).await
            }
        };
        if let Err(e) = dispatch {
            self.base.disconnect().await;
            warn!("base move dispatch failed: {e:#}");
            let r = Self::backend_unavailable(e.to_string());
            return Err(self.reject(cmd_id, r).await);
        }

        self.succeed(cmd_id, lease_id).await;
        Ok(())
    }

    pub async fn base_stop(&self, lease_id: Option<&str>, cmd_id: &str) -> Result<(), Rejection> {
        let lease_id = match self.check_lease(lease_id).await {
            Ok(id) => id,
            Err(r) => return Err(self.reject(cmd_id, r).await),
        };
        if !self.base.is_connected() {
            let r = Self::backend_unavailable("base driver not connected");
            return Err(self.reject(cmd_id, r).await);
        }
        if let Err(e) = self.base.stop().await {
            self.base.disconnect().await;
            let r = Self::backend_unavailable(e.to_string());
            return Err(self.reject(cmd_id, r).await);
        }
        self.succeed(cmd_id, lease_id).await;
        Ok(())
    }

    pub async fn arm_move(
        &self,
        lease_id: Option<&str>,
        cmd_id: &str,
        cmd: ArmMoveCommand,
    ) -> Result<(), Rejection> {
        let lease_id = match self.check_lease(lease_id).await {
            Ok(id) => id,
            Err(r) => return Err(self.reject(cmd_id, r).await),
        };

        if !self.arm.is_connected() {
            let r = Self::backend_unavailable("arm driver not connected");
            return Err(self.reject(cmd_id, r).await);
        }

        self.emit(FeedbackEvent::CmdAck { cmd_id: cmd_id.to_owned() });

        let check = match cmd {
            ArmMoveCommand::CartesianPose(pose16) => self.envelope.check_arm_cartesian(&pose16),
            ArmMoveCommand::JointVelocity(dq) => self.envelope.check_arm_joint_velocity(&dq),
            ArmMoveCommand::JointPosition(_) | ArmMoveCommand::CartesianVelocity(_) => Ok(()),
        };
        if let Err(r) = check {
            return Err(self.reject(cmd_id, r).await);
        }

        let dispatch = match cmd {
            ArmMoveCommand::JointPosition(q) => self.arm.send_joint_position(q).await,
            ArmMoveCommand::CartesianPose(pose16) => self.arm.send_cartesian_pose(pose16).await,
            ArmMoveCommand::JointVelocity(dq) => self.arm.send_joint_velocity(dq).await,
            ArmMoveCommand::CartesianVelocity(vel6) => self.arm.send_cartesian_velocity(vel6).await,
        };
        if let Err(e) = dispatch {
            self.arm.disconnect().await;
            warn!("arm move dispatch failed: {e:#}");
            let r = Self::backend_unavailable(e.to_string());
            return Err(self.reject(cmd_id, r).await);
        }

        self.succeed(cmd_id, lease_id).await;
        Ok(())
    }

    pub async fn arm_stop(&self, lease_id: Option<&str>, cmd_id: &str) -> Result<(), Rejection> {
        let lease_id = match self.check_lease(lease_id).await {
            Ok(id) => id,
            Err(r) => return Err(self.reject(cmd_id, r).await),
        };
        if !self.arm.is_connected() {
            let r = Self::backend_unavailable("arm driver not connected");
            return Err(self.reject(cmd_id, r).await);
        }
        if let Err(e) = self.arm.emergency_stop().await {
            self.arm.disconnect().await;
            let r = Self::backend_unavailable(e.to_string());
            return Err(self.reject(cmd_id, r).await);
        }
        self.succeed(cmd_id, lease_id).await;
        Ok(())
    }

    pub async fn gripper(
        &self,
        lease_id: Option<&str>,
        cmd_id: &str,
        cmd: GripperCommand,
    ) -> Result<(), Rejection> {
        let lease_id = match self.check_lease(lease_id).await {
            Ok(id) => id,
            Err(r) => return Err(self.reject(cmd_id, r).await),
        };

        if !self.gripper.is_connected() {
            let r = Self::backend_unavailable("gripper driver not connected");
            return Err(self.reject(cmd_id, r).await);
        }

        self.emit(FeedbackEvent::CmdAck { cmd_id: cmd_id.to_owned() });

        if let GripperCommand::Move { force, .. } = cmd {
            if let Err(r) = self.envelope.check_gripper_force(force as f64) {
                return Err(self.reject(cmd_id, r).await);
            }
        }

        let dispatch = match cmd {
            GripperCommand::Activate => self.gripper.activate().await,
            GripperCommand::Move { position, width, speed, force } => {
                let pos = position.unwrap_or_else(|| {
                    let w = width.unwrap_or(0.0).clamp(0.0, GRIPPER_MAX_WIDTH_M);
                    (255.0 - (w / GRIPPER_MAX_WIDTH_M) * 255.0).round() as u8
                });
                self.gripper.move_to(pos, speed, force).await.map(|_| ())
            }
            GripperCommand::Open => self.gripper.open().await,
            GripperCommand::Close => self.gripper.close().await,
            GripperCommand::Grasp => self.gripper.grasp().await,
            GripperCommand::Stop => self.gripper.stop().await,
            GripperCommand::Calibrate => self.gripper.calibrate().await,
        };
        if let Err(e) = dispatch {
            self.gripper.disconnect().await;
            warn!("gripper dispatch failed: {e:#}");
            let r = Self::backend_unavailable(e.to_string());
            return Err(self.reject(cmd_id, r).await);
        }

        self.succeed(cmd_id, lease_id).await;
        Ok(())
    }

    /// Thin alternative to the full rewind orchestrator API: a fractional
    /// reverse replay of base and arm, driven by percentage of the log.
    pub async fn reset(
        &self,
        lease_id: Option<&str>,
        cmd_id: &str,
        percentage: f64,
    ) -> Result<RewindResult, Rejection> {
        let lease_id = match self.check_lease(lease_id).await {
            Ok(id) => id,
            Err(r) => return Err(self.reject(cmd_id, r).await),
        };

        let result = self
            .rewind
            .rewind(RewindRequest {
                components: vec![Component::Base, Component::Arm],
                target: RewindTarget::Percentage(percentage),
                dry_run: false,
            })
            .await;

        if !result.success {
            let r = Rejection {
                reason: ErrorCode::BackendUnavailable,
                detail: result.error.clone().unwrap_or_else(|| "reset failed".to_owned()),
            };
            return Err(self.reject(cmd_id, r).await);
        }

        self.succeed(cmd_id, lease_id).await;
        Ok(result)
    }
}

#[cfg(test)]
#[path = "gateway_tests.rs"]
mod tests;
