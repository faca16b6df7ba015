// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Top-level state HTTP handlers: health, the unified state snapshot, the
//! raw trajectory log, recent feedback history, and shutdown.

use std::sync::Arc;

use axum::extract::State;
use axum::response::IntoResponse;
use axum::Json;
use serde::Serialize;

use crate::aggregator::StateSnapshot;
use crate::trajectory::Waypoint;
use crate::transport::state::Store;

#[derive(Serialize)]
pub struct HealthResponse {
    pub status: &'static str,
    pub arm_connected: bool,
    pub base_connected: bool,
    pub gripper_connected: bool,
    pub cameras_connected: bool,
}

pub async fn health(State(s): State<Arc<Store>>) -> impl IntoResponse {
    Json(HealthResponse {
        status: "ok",
        arm_connected: s.arm.is_connected(),
        base_connected: s.base.is_connected(),
        gripper_connected: s.gripper.is_connected(),
        cameras_connected: s.cameras.is_connected(),
    })
}

pub async fn state(State(s): State<Arc<Store>>) -> Json<StateSnapshot> {
    Json(s.aggregator.snapshot().await)
}

#[derive(Serialize)]
pub struct TrajectoryResponse {
    pub sequence: i64,
    pub waypoints: Vec<Waypoint>,
}

pub async fn trajectory(State(s): State<Arc<Store>>) -> impl IntoResponse {
    Json(TrajectoryResponse {
        sequence: s.aggregator.trajectory_sequence(),
        waypoints: s.trajectory.read().await.snapshot(),
    })
}

pub async fn logs(State(s): State<Arc<Store>>) -> impl IntoResponse {
    Json(s.recent_logs().await)
}

#[derive(Serialize)]
pub struct ShutdownResponse {
    pub ok: bool,
}

pub async fn shutdown(State(s): State<Arc<Store>>) -> impl IntoResponse {
    s.shutdown.cancel();
    Json(ShutdownResponse { ok: true })
}

#[cfg(test)]
#[path = "state_tests.rs"]
mod tests;
