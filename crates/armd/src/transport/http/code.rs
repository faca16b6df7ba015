// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Code sandbox HTTP handlers.
//!
//! Deviates from a fire-and-forget execution model: `POST /code/execute`
//! awaits the run to completion and returns the full [`ExecutionRecord`]
//! inline, rather than handing back a bare execution id for the caller to
//! poll via `/code/status`. `/code/status`, `/code/result`, and
//! `/code/history` remain for callers that still want to watch it land.

use std::sync::Arc;
use std::time::Duration;

use axum::extract::State;
use axum::http::HeaderMap;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde::{Deserialize, Serialize};

use crate::crash_monitor::ExecutionStopper;
use crate::error::ErrorCode;
use crate::event::StopReason;
use crate::sandbox::{ExecutionRecord, ValidationReport};
use crate::transport::state::Store;

fn lease_id(headers: &HeaderMap) -> Option<&str> {
    headers.get("x-lease-id")?.to_str().ok()
}

async fn require_lease<'a>(s: &Store, headers: &'a HeaderMap) -> Result<&'a str, Response> {
    let Some(id) = lease_id(headers) else {
        return Err(ErrorCode::NoLease.to_http_response("missing X-Lease-Id header").into_response());
    };
    if !s.lease.validate_lease(id).await {
        return Err(ErrorCode::InvalidLease.to_http_response("lease not valid or expired").into_response());
    }
    s.lease.record_command(id).await;
    Ok(id)
}

#[derive(Deserialize)]
pub struct ExecuteRequest {
    pub code: String,
    pub timeout: Option<f64>,
}

#[derive(Serialize)]
pub struct ExecuteResponse {
    pub success: bool,
    pub record: Option<ExecutionRecord>,
    pub message: String,
    pub validation_errors: Option<Vec<String>>,
}

pub async fn execute(
    State(s): State<Arc<Store>>,
    headers: HeaderMap,
    Json(req): Json<ExecuteRequest>,
) -> impl IntoResponse {
    let lease_id = match require_lease(&s, &headers).await {
        Ok(id) => id,
        Err(resp) => return resp,
    };

    if s.sandbox.is_running().await {
        return ErrorCode::Conflict
            .to_http_response("code is already running, stop it first with POST /code/stop")
            .into_response();
    }

    let report = crate::sandbox::SandboxManager::validate(&req.code);
    if !report.accepted {
        let message =
            report.issues.iter().map(|i| format!("line {}: {}", i.line, i.reason)).collect::<Vec<_>>().join("; ");
        return Json(ExecuteResponse {
            success: false,
            record: None,
            message,
            validation_errors: Some(report.issues.into_iter().map(|i| i.reason).collect()),
        })
        .into_response();
    }

    let mut budget = Duration::from_secs_f64(req.timeout.unwrap_or(300.0).max(0.0));
    if let Some(remaining) = s.lease.remaining_duration(lease_id).await {
        budget = budget.min(remaining);
    }
    let server_url = format!("http://127.0.0.1:{}", s.config.port);

    match s.sandbox.execute(&req.code, lease_id, &server_url, budget).await {
        Ok(record) => Json(ExecuteResponse {
            success: true,
            record: Some(record),
            message: "code execution finished".to_owned(),
            validation_errors: None,
        })
        .into_response(),
        Err(e) => ErrorCode::Internal.to_http_response(e.to_string()).into_response(),
    }
}

#[derive(Deserialize)]
pub struct ValidateRequest {
    pub code: String,
}

pub async fn validate(Json(req): Json<ValidateRequest>) -> impl IntoResponse {
    let report: ValidationReport = crate::sandbox::SandboxManager::validate(&req.code);
    Json(report)
}

#[derive(Serialize)]
pub struct StopResponse {
    pub success: bool,
    pub message: &'static str,
}

pub async fn stop(State(s): State<Arc<Store>>, headers: HeaderMap) -> impl IntoResponse {
    if let Err(resp) = require_lease(&s, &headers).await {
        return resp;
    }
    if !s.sandbox.is_running().await {
        return Json(StopResponse { success: false, message: "no code is currently running" }).into_response();
    }
    s.sandbox.stop(StopReason::Manual).await;
    Json(StopResponse { success: true, message: "code execution stopped" }).into_response()
}

#[derive(Serialize)]
pub struct StatusResponse {
    pub is_running: bool,
    pub tail_stdout: Option<String>,
}

pub async fn status(State(s): State<Arc<Store>>) -> impl IntoResponse {
    Json(StatusResponse { is_running: s.sandbox.is_running().await, tail_stdout: s.sandbox.tail_stdout().await })
}

#[derive(Serialize)]
pub struct ResultResponse {
    pub success: bool,
    pub result: Option<ExecutionRecord>,
    pub error: String,
}

pub async fn result(State(s): State<Arc<Store>>) -> impl IntoResponse {
    match s.sandbox.history().await.into_iter().next_back() {
        Some(record) => Json(ResultResponse { success: true, result: Some(record), error: String::new() }),
        None => Json(ResultResponse { success: false, result: None, error: "no execution result available".to_owned() }),
    }
}

pub async fn history(State(s): State<Arc<Store>>) -> impl IntoResponse {
    Json(s.sandbox.history().await)
}
