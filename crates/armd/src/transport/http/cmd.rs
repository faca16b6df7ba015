// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Command dispatch HTTP handlers — lease + safety-envelope checked, then
//! forwarded to [`crate::gateway::CommandGateway`].
//!
//! The lease id travels in the `X-Lease-Id` header rather than the request
//! body; `cmd_id` is server-generated (first 8 hex characters of a v4 uuid)
//! rather than supplied by the caller.

use std::sync::Arc;

use axum::extract::State;
use axum::http::HeaderMap;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde::{Deserialize, Serialize};

use crate::backend::Frame;
use crate::envelope::Rejection;
use crate::error::ErrorCode;
use crate::gateway::{ArmMoveCommand, BaseMoveCommand, GripperCommand};
use crate::transport::state::Store;

fn cmd_id() -> String {
    uuid::Uuid::new_v4().to_string()[..8].to_owned()
}

fn lease_id(headers: &HeaderMap) -> Option<&str> {
    headers.get("x-lease-id")?.to_str().ok()
}

fn rejected(r: Rejection) -> Response {
    r.reason.to_http_response(r.detail).into_response()
}

#[derive(Serialize)]
pub struct CmdResponse {
    pub cmd_id: String,
    pub status: &'static str,
}

fn completed(cmd_id: String) -> Response {
    Json(CmdResponse { cmd_id, status: "completed" }).into_response()
}

#[derive(Deserialize)]
pub struct BaseMoveRequest {
    pub x: Option<f64>,
    pub y: Option<f64>,
    pub theta: Option<f64>,
    pub vx: Option<f64>,
    pub vy: Option<f64>,
    pub wz: Option<f64>,
    #[serde(default = "default_frame")]
    pub frame: String,
}

fn default_frame() -> String {
    "global".to_owned()
}

pub async fn base_move(
    State(s): State<Arc<Store>>,
    headers: HeaderMap,
    Json(req): Json<BaseMoveRequest>,
) -> impl IntoResponse {
    let id = cmd_id();
    let cmd = if req.vx.is_some() || req.vy.is_some() || req.wz.is_some() {
        let frame = if req.frame == "local" { Frame::Local } else { Frame::Global };
        BaseMoveCommand::Velocity {
            vx: req.vx.unwrap_or(0.0),
            vy: req.vy.unwrap_or(0.0),
            omega: req.wz.unwrap_or(0.0),
            frame,
        }
    } else {
        BaseMoveCommand::Position { x: req.x.unwrap_or(0.0), y: req.y.unwrap_or(0.0), theta: req.theta.unwrap_or(0.0) }
    };

    match s.gateway.base_move(lease_id(&headers), &id, cmd).await {
        Ok(()) => completed(id),
        Err(r) => rejected(r),
    }
}

pub async fn base_stop(State(s): State<Arc<Store>>, headers: HeaderMap) -> impl IntoResponse {
    let id = cmd_id();
    match s.gateway.base_stop(lease_id(&headers), &id).await {
        Ok(()) => completed(id),
        Err(r) => rejected(r),
    }
}

#[derive(Deserialize)]
pub struct ArmMoveRequest {
    pub mode: String,
    pub values: Vec<f64>,
}

fn to_array7(values: &[f64]) -> Option<[f64; 7]> {
    values.try_into().ok()
}

fn to_array16(values: &[f64]) -> Option<[f64; 16]> {
    values.try_into().ok()
}

fn to_array6(values: &[f64]) -> Option<[f64; 6]> {
    values.try_into().ok()
}

pub async fn arm_move(
    State(s): State<Arc<Store>>,
    headers: HeaderMap,
    Json(req): Json<ArmMoveRequest>,
) -> impl IntoResponse {
    let id = cmd_id();
    let cmd = match req.mode.as_str() {
        "joint_position" => match to_array7(&req.values) {
            Some(q) => ArmMoveCommand::JointPosition(q),
            None => return invalid_input(&id, "joint_position requires 7 values"),
        },
        "cartesian_pose" => match to_array16(&req.values) {
            Some(pose) => ArmMoveCommand::CartesianPose(pose),
            None => return invalid_input(&id, "cartesian_pose requires 16 values"),
        },
        "joint_velocity" => match to_array7(&req.values) {
            Some(dq) => ArmMoveCommand::JointVelocity(dq),
            None => return invalid_input(&id, "joint_velocity requires 7 values"),
        },
        "cartesian_velocity" => match to_array6(&req.values) {
            Some(vel) => ArmMoveCommand::CartesianVelocity(vel),
            None => return invalid_input(&id, "cartesian_velocity requires 6 values"),
        },
        other => return invalid_mode(&id, other),
    };

    match s.gateway.arm_move(lease_id(&headers), &id, cmd).await {
        Ok(()) => completed(id),
        Err(r) => rejected(r),
    }
}

fn invalid_input(cmd_id: &str, detail: &str) -> Response {
    ErrorCode::InvalidInput.to_http_response(format!("cmd {cmd_id}: {detail}")).into_response()
}

fn invalid_mode(cmd_id: &str, mode: &str) -> Response {
    ErrorCode::InvalidMode.to_http_response(format!("cmd {cmd_id}: unknown mode: {mode}")).into_response()
}

pub async fn arm_stop(State(s): State<Arc<Store>>, headers: HeaderMap) -> impl IntoResponse {
    let id = cmd_id();
    match s.gateway.arm_stop(lease_id(&headers), &id).await {
        Ok(()) => completed(id),
        Err(r) => rejected(r),
    }
}

#[derive(Deserialize)]
pub struct GripperRequest {
    pub action: String,
    pub position: Option<u8>,
    #[serde(default = "default_u8_max")]
    pub speed: u8,
    #[serde(default = "default_u8_max")]
    pub force: u8,
    pub width: Option<f64>,
}

fn default_u8_max() -> u8 {
    255
}

pub async fn gripper(
    State(s): State<Arc<Store>>,
    headers: HeaderMap,
    Json(req): Json<GripperRequest>,
) -> impl IntoResponse {
    let id = cmd_id();
    let cmd = match req.action.as_str() {
        "activate" => GripperCommand::Activate,
        "move" => {
            if req.position.is_none() && req.width.is_none() {
                return invalid_input(&id, "move requires position or width");
            }
            GripperCommand::Move { position: req.position, width: req.width, speed: req.speed, force: req.force }
        }
        "open" => GripperCommand::Open,
        "close" => GripperCommand::Close,
        "grasp" => GripperCommand::Grasp,
        "stop" => GripperCommand::Stop,
        "calibrate" => GripperCommand::Calibrate,
        other => {
            return ErrorCode::InvalidAction.to_http_response(format!("cmd {id}: unknown action: {other}")).into_response()
        }
    };

    match s.gateway.gripper(lease_id(&headers), &id, cmd).await {
        Ok(()) => completed(id),
        Err(r) => rejected(r),
    }
}

#[derive(Deserialize)]
pub struct ResetRequest {
    #[serde(default = "default_fraction")]
    pub fraction: f64,
}

fn default_fraction() -> f64 {
    1.0
}

#[derive(Serialize)]
pub struct ResetResponse {
    pub cmd_id: String,
    pub status: &'static str,
    pub reversed: usize,
}

pub async fn reset(
    State(s): State<Arc<Store>>,
    headers: HeaderMap,
    Json(req): Json<ResetRequest>,
) -> impl IntoResponse {
    let id = cmd_id();
    let fraction = req.fraction.clamp(0.0, 1.0);
    match s.gateway.reset(lease_id(&headers), &id, fraction * 100.0).await {
        Ok(result) => {
            Json(ResetResponse { cmd_id: id, status: "completed", reversed: result.steps_rewound }).into_response()
        }
        Err(r) => rejected(r),
    }
}
