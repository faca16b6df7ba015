// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Rewind HTTP handlers.
//!
//! Mutating endpoints only check the `X-Lease-Id` header when `dry_run` is
//! false — a dry run is read-only and costs nothing, so it is open to any
//! caller. `GET` endpoints and the config/monitor `PUT` handlers never
//! require a lease. The boundary/check endpoints live-compute against the
//! current state snapshot and the safety monitor's workspace bounds rather
//! than reading the periodically-ticked latch, matching how a dashboard
//! polling these endpoints expects an always-fresh answer.
//!
//! `monitor_interval` is reported but not settable here — it is fixed at
//! startup via configuration rather than hot-reloadable.
//!
//! The dashboard-compatibility `manual_rewind_percentage` knob lives on
//! [`Store`] rather than on [`RewindConfig`] or [`SafetyMonitorConfig`], kept
//! deliberately separate from both.

use std::sync::Arc;

use axum::extract::{Path, Query, State};
use axum::http::HeaderMap;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde::{Deserialize, Serialize};

use crate::crash_monitor::CrashMonitorStatus;
use crate::error::ErrorCode;
use crate::rewind::{Component, RewindConfig, RewindRequest, RewindResult, RewindTarget};
use crate::safety_monitor::{SafetyMonitorConfig, SafetyMonitorStatus};
use crate::transport::state::Store;

fn lease_id(headers: &HeaderMap) -> Option<&str> {
    headers.get("x-lease-id")?.to_str().ok()
}

/// Require a valid lease unless `dry_run` is set.
async fn check_lease(s: &Store, headers: &HeaderMap, dry_run: bool) -> Result<(), Response> {
    if dry_run {
        return Ok(());
    }
    let Some(id) = lease_id(headers) else {
        return Err(ErrorCode::NoLease.to_http_response("missing X-Lease-Id header").into_response());
    };
    if !s.lease.validate_lease(id).await {
        return Err(ErrorCode::InvalidLease.to_http_response("lease not valid or expired").into_response());
    }
    Ok(())
}

fn rewind_result_response(result: RewindResult) -> Response {
    if result.success {
        Json(result).into_response()
    } else {
        let detail = result.error.clone().unwrap_or_else(|| "rewind failed".to_owned());
        ErrorCode::Internal.to_http_response(detail).into_response()
    }
}

// -- status / trajectory / boundary / check -----------------------------------------------------

#[derive(Serialize)]
pub struct StatusResponse {
    pub is_rewinding: bool,
    pub trajectory_len: usize,
    pub boundary_latched: bool,
    pub collision_detected: bool,
    pub out_of_bounds: bool,
    pub arm_recovering: bool,
}

pub async fn status(State(s): State<Arc<Store>>) -> impl IntoResponse {
    let snapshot = s.aggregator.snapshot().await;
    let config = s.safety_monitor.config().await;
    let out_of_bounds = is_out_of_bounds(snapshot.base.pose, config.workspace_bounds);
    let monitor_status = s.safety_monitor.status().await;
    Json(StatusResponse {
        is_rewinding: s.rewind.is_rewinding(),
        trajectory_len: s.trajectory.read().await.len(),
        boundary_latched: monitor_status.boundary_latched,
        collision_detected: monitor_status.collision_latched,
        out_of_bounds,
        arm_recovering: s.crash_monitor.is_recovering(),
    })
}

fn is_out_of_bounds(pose: (f64, f64, f64), bounds: (f64, f64, f64, f64)) -> bool {
    let (x, y, _) = pose;
    let (x_min, x_max, y_min, y_max) = bounds;
    x < x_min || x > x_max || y < y_min || y > y_max
}

pub async fn trajectory(State(s): State<Arc<Store>>) -> impl IntoResponse {
    Json(s.trajectory.read().await.snapshot())
}

pub async fn trajectory_at(State(s): State<Arc<Store>>, Path(idx): Path<usize>) -> impl IntoResponse {
    match s.trajectory.read().await.get(idx) {
        Some(wp) => Json(wp).into_response(),
        None => ErrorCode::NotFound.to_http_response(format!("no waypoint at index {idx}")).into_response(),
    }
}

#[derive(Serialize)]
pub struct BoundaryResponse {
    pub bounds: (f64, f64, f64, f64),
    pub base_pose: (f64, f64, f64),
    pub out_of_bounds: bool,
}

pub async fn boundary(State(s): State<Arc<Store>>) -> impl IntoResponse {
    let snapshot = s.aggregator.snapshot().await;
    let config = s.safety_monitor.config().await;
    Json(BoundaryResponse {
        bounds: config.workspace_bounds,
        base_pose: snapshot.base.pose,
        out_of_bounds: is_out_of_bounds(snapshot.base.pose, config.workspace_bounds),
    })
}

#[derive(Serialize)]
pub struct CheckResponse {
    pub safe: bool,
    pub out_of_bounds: bool,
    pub collision_detected: bool,
    pub last_safe_waypoint_idx: Option<usize>,
}

pub async fn check(State(s): State<Arc<Store>>) -> impl IntoResponse {
    let snapshot = s.aggregator.snapshot().await;
    let config = s.safety_monitor.config().await;
    let out_of_bounds = is_out_of_bounds(snapshot.base.pose, config.workspace_bounds);
    let collision_detected = s.safety_monitor.status().await.collision_latched;
    let last_safe_waypoint_idx = s.trajectory.read().await.find_last_safe(config.workspace_bounds);
    Json(CheckResponse {
        safe: !out_of_bounds && !collision_detected,
        out_of_bounds,
        collision_detected,
        last_safe_waypoint_idx,
    })
}

pub async fn logs(State(s): State<Arc<Store>>) -> impl IntoResponse {
    Json(s.recent_logs().await)
}

// -- rewind config --------------------------------------------------------------------------

#[derive(Serialize)]
pub struct RewindConfigResponse {
    pub chunk_size: usize,
    pub chunk_duration_secs: f64,
    pub command_hz: f64,
    pub settle_time_secs: f64,
    pub safety_margin: f64,
    pub joint_tolerance: f64,
    pub joint_velocity_quiescent: f64,
    pub rewind_base: bool,
    pub rewind_arm: bool,
    pub rewind_gripper: bool,
}

impl From<RewindConfig> for RewindConfigResponse {
    fn from(c: RewindConfig) -> Self {
        Self {
            chunk_size: c.chunk_size,
            chunk_duration_secs: c.chunk_duration.as_secs_f64(),
            command_hz: c.command_hz,
            settle_time_secs: c.settle_time.as_secs_f64(),
            safety_margin: c.safety_margin,
            joint_tolerance: c.joint_tolerance,
            joint_velocity_quiescent: c.joint_velocity_quiescent,
            rewind_base: c.rewind_base,
            rewind_arm: c.rewind_arm,
            rewind_gripper: c.rewind_gripper,
        }
    }
}

pub async fn get_config(State(s): State<Arc<Store>>) -> impl IntoResponse {
    Json(RewindConfigResponse::from(s.rewind.config().await))
}

#[derive(Deserialize, Default)]
pub struct RewindConfigUpdate {
    pub chunk_size: Option<usize>,
    pub chunk_duration_secs: Option<f64>,
    pub command_hz: Option<f64>,
    pub settle_time_secs: Option<f64>,
    pub safety_margin: Option<f64>,
    pub joint_tolerance: Option<f64>,
    pub joint_velocity_quiescent: Option<f64>,
    pub rewind_base: Option<bool>,
    pub rewind_arm: Option<bool>,
    pub rewind_gripper: Option<bool>,
}

pub async fn set_config(
    State(s): State<Arc<Store>>,
    Json(update): Json<RewindConfigUpdate>,
) -> impl IntoResponse {
    let mut config = s.rewind.config().await;
    if let Some(v) = update.chunk_size {
        config.chunk_size = v;
    }
    if let Some(v) = update.chunk_duration_secs {
        config.chunk_duration = std::time::Duration::from_secs_f64(v.max(0.001));
    }
    if let Some(v) = update.command_hz {
        config.command_hz = v;
    }
    if let Some(v) = update.settle_time_secs {
        config.settle_time = std::time::Duration::from_secs_f64(v.max(0.0));
    }
    if let Some(v) = update.safety_margin {
        config.safety_margin = v;
    }
    if let Some(v) = update.joint_tolerance {
        config.joint_tolerance = v;
    }
    if let Some(v) = update.joint_velocity_quiescent {
        config.joint_velocity_quiescent = v;
    }
    if let Some(v) = update.rewind_base {
        config.rewind_base = v;
    }
    if let Some(v) = update.rewind_arm {
        config.rewind_arm = v;
    }
    if let Some(v) = update.rewind_gripper {
        config.rewind_gripper = v;
    }
    s.rewind.set_config(config).await;
    Json(RewindConfigResponse::from(config))
}

// -- monitor (dashboard-compatibility) ------------------------------------------------------

#[derive(Serialize)]
pub struct MonitorStatusResponse {
    #[serde(flatten)]
    pub status: SafetyMonitorStatus,
    pub auto_rewind_enabled: bool,
    pub auto_rewind_percentage: f64,
    pub monitor_interval_secs: f64,
    pub manual_rewind_percentage: f64,
    pub arm_monitor: CrashMonitorStatus,
}

pub async fn monitor_status(State(s): State<Arc<Store>>) -> impl IntoResponse {
    let status = s.safety_monitor.status().await;
    let config = s.safety_monitor.config().await;
    Json(MonitorStatusResponse {
        status,
        auto_rewind_enabled: config.auto_rewind_enabled,
        auto_rewind_percentage: config.auto_rewind_percentage,
        monitor_interval_secs: s.config.monitor_interval_secs,
        manual_rewind_percentage: *s.manual_rewind_percentage.read().await,
        arm_monitor: s.crash_monitor.status(),
    })
}

/// `monitor_interval` is deliberately absent: it is fixed at startup.
#[derive(Deserialize, Default)]
pub struct MonitorConfigUpdate {
    pub auto_rewind_enabled: Option<bool>,
    pub auto_rewind_percentage: Option<f64>,
    pub workspace_bounds: Option<(f64, f64, f64, f64)>,
    pub collision_min_cmd_speed: Option<f64>,
    pub collision_velocity_threshold: Option<f64>,
    pub collision_grace_period_secs: Option<f64>,
    pub cooldown_secs: Option<f64>,
    pub manual_rewind_percentage: Option<f64>,
}

pub async fn set_monitor_config(
    State(s): State<Arc<Store>>,
    Json(update): Json<MonitorConfigUpdate>,
) -> impl IntoResponse {
    let mut config: SafetyMonitorConfig = s.safety_monitor.config().await;
    if let Some(v) = update.auto_rewind_enabled {
        config.auto_rewind_enabled = v;
    }
    if let Some(v) = update.auto_rewind_percentage {
        config.auto_rewind_percentage = v;
    }
    if let Some(v) = update.workspace_bounds {
        config.workspace_bounds = v;
    }
    if let Some(v) = update.collision_min_cmd_speed {
        config.collision_min_cmd_speed = v;
    }
    if let Some(v) = update.collision_velocity_threshold {
        config.collision_velocity_threshold = v;
    }
    if let Some(v) = update.collision_grace_period_secs {
        config.collision_grace_period = std::time::Duration::from_secs_f64(v.max(0.0));
    }
    if let Some(v) = update.cooldown_secs {
        config.cooldown = std::time::Duration::from_secs_f64(v.max(0.0));
    }
    s.safety_monitor.set_config(config.clone()).await;
    if let Some(v) = update.manual_rewind_percentage {
        *s.manual_rewind_percentage.write().await = v.clamp(0.0, 100.0);
    }
    Json(MonitorStatusResponse {
        status: s.safety_monitor.status().await,
        auto_rewind_enabled: config.auto_rewind_enabled,
        auto_rewind_percentage: config.auto_rewind_percentage,
        monitor_interval_secs: s.config.monitor_interval_secs,
        manual_rewind_percentage: *s.manual_rewind_percentage.read().await,
        arm_monitor: s.crash_monitor.status(),
    })
}

pub async fn monitor_enable(State(s): State<Arc<Store>>) -> impl IntoResponse {
    let mut config = s.safety_monitor.config().await;
    config.auto_rewind_enabled = true;
    s.safety_monitor.set_config(config).await;
    Json(super::lease::OkResponse { ok: true })
}

pub async fn monitor_disable(State(s): State<Arc<Store>>) -> impl IntoResponse {
    let mut config = s.safety_monitor.config().await;
    config.auto_rewind_enabled = false;
    s.safety_monitor.set_config(config).await;
    Json(super::lease::OkResponse { ok: true })
}

// -- rewind actions --------------------------------------------------------------------------

fn default_components(c: &RewindConfig) -> Vec<Component> {
    c.default_components()
}

#[derive(Deserialize)]
pub struct StepsRequest {
    pub steps: usize,
    pub components: Option<Vec<Component>>,
    #[serde(default)]
    pub dry_run: bool,
}

pub async fn steps(
    State(s): State<Arc<Store>>,
    headers: HeaderMap,
    Json(req): Json<StepsRequest>,
) -> impl IntoResponse {
    if let Err(resp) = check_lease(&s, &headers, req.dry_run).await {
        return resp;
    }
    let components = req.components.unwrap_or_else(|| default_components(&s.rewind.config().await));
    let result = s
        .rewind
        .rewind(RewindRequest { components, target: RewindTarget::Steps(req.steps), dry_run: req.dry_run })
        .await;
    rewind_result_response(result)
}

#[derive(Deserialize)]
pub struct PercentageRequest {
    pub percentage: f64,
    pub components: Option<Vec<Component>>,
    #[serde(default)]
    pub dry_run: bool,
}

pub async fn percentage(
    State(s): State<Arc<Store>>,
    headers: HeaderMap,
    Json(req): Json<PercentageRequest>,
) -> impl IntoResponse {
    if let Err(resp) = check_lease(&s, &headers, req.dry_run).await {
        return resp;
    }
    let components = req.components.unwrap_or_else(|| default_components(&s.rewind.config().await));
    let result = s
        .rewind
        .rewind(RewindRequest {
            components,
            target: RewindTarget::Percentage(req.percentage.clamp(0.0, 100.0)),
            dry_run: req.dry_run,
        })
        .await;
    rewind_result_response(result)
}

#[derive(Deserialize)]
pub struct ToSafeRequest {
    pub components: Option<Vec<Component>>,
    #[serde(default)]
    pub dry_run: bool,
}

pub async fn to_safe(
    State(s): State<Arc<Store>>,
    headers: HeaderMap,
    Json(req): Json<ToSafeRequest>,
) -> impl IntoResponse {
    if let Err(resp) = check_lease(&s, &headers, req.dry_run).await {
        return resp;
    }
    let components = req.components.unwrap_or_else(|| default_components(&s.rewind.config().await));
    let bounds = s.safety_monitor.config().await.workspace_bounds;
    let result = s
        .rewind
        .rewind(RewindRequest { components, target: RewindTarget::ToSafe { bounds }, dry_run: req.dry_run })
        .await;
    rewind_result_response(result)
}

#[derive(Deserialize)]
pub struct ToWaypointRequest {
    pub idx: usize,
    pub components: Option<Vec<Component>>,
    #[serde(default)]
    pub dry_run: bool,
}

pub async fn to_waypoint(
    State(s): State<Arc<Store>>,
    headers: HeaderMap,
    Json(req): Json<ToWaypointRequest>,
) -> impl IntoResponse {
    if let Err(resp) = check_lease(&s, &headers, req.dry_run).await {
        return resp;
    }
    let components = req.components.unwrap_or_else(|| default_components(&s.rewind.config().await));
    let result = s
        .rewind
        .rewind(RewindRequest { components, target: RewindTarget::ToIndex(req.idx), dry_run: req.dry_run })
        .await;
    rewind_result_response(result)
}

#[derive(Deserialize, Default)]
pub struct ResetToHomeRequest {
    #[serde(default)]
    pub dry_run: bool,
}

pub async fn reset_to_home(
    State(s): State<Arc<Store>>,
    headers: HeaderMap,
    Json(req): Json<ResetToHomeRequest>,
) -> impl IntoResponse {
    if let Err(resp) = check_lease(&s, &headers, req.dry_run).await {
        return resp;
    }
    let components = vec![Component::Base, Component::Arm];
    let result = s
        .rewind
        .rewind(RewindRequest { components, target: RewindTarget::ToIndex(0), dry_run: req.dry_run })
        .await;
    rewind_result_response(result)
}

pub async fn clear_trajectory(State(s): State<Arc<Store>>, headers: HeaderMap) -> impl IntoResponse {
    if let Err(resp) = check_lease(&s, &headers, false).await {
        return resp;
    }
    s.trajectory.write().await.clear();
    Json(super::lease::OkResponse { ok: true }).into_response()
}

#[derive(Deserialize, Default)]
pub struct ManualQuery {
    #[serde(default)]
    pub dry_run: bool,
}

/// Dashboard-compatibility endpoint: rewind by `Store::manual_rewind_percentage`.
pub async fn manual(
    State(s): State<Arc<Store>>,
    headers: HeaderMap,
    Query(q): Query<ManualQuery>,
) -> impl IntoResponse {
    if let Err(resp) = check_lease(&s, &headers, q.dry_run).await {
        return resp;
    }
    let components = default_components(&s.rewind.config().await);
    let pct = *s.manual_rewind_percentage.read().await;
    let result = s
        .rewind
        .rewind(RewindRequest { components, target: RewindTarget::Percentage(pct), dry_run: q.dry_run })
        .await;
    rewind_result_response(result)
}

#[cfg(test)]
#[path = "rewind_tests.rs"]
mod tests;
