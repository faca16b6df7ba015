// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Lease arbitration HTTP handlers.
//!
//! - `POST /lease/acquire`      — join the queue or be granted immediately
//! - `POST /lease/release`      — release a held lease
//! - `POST /lease/extend`       — refresh the idle timer
//! - `POST /lease/clear-queue`  — drop every queued holder and revoke the current one
//! - `POST /lease/pause-queue`  — stop admitting new holders
//! - `POST /lease/resume-queue` — resume admitting new holders
//! - `GET  /lease/status`       — current holder, queue, resetting/paused flags

use std::sync::Arc;

use axum::extract::State;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde::{Deserialize, Serialize};

use crate::error::ErrorCode;
use crate::lease::{AcquireOutcome, QueuePosition};
use crate::transport::state::Store;

#[derive(Deserialize)]
pub struct AcquireRequest {
    pub holder: String,
}

#[derive(Serialize)]
pub struct AcquireResponse {
    pub lease_id: String,
    pub already_held: bool,
}

#[derive(Deserialize)]
pub struct LeaseIdRequest {
    pub lease_id: String,
}

#[derive(Serialize)]
pub struct OkResponse {
    pub ok: bool,
}

#[derive(Serialize)]
pub struct StatusResponse {
    pub holder: Option<String>,
    pub granted_at_secs_ago: Option<f64>,
    pub resetting: bool,
    pub paused: bool,
    pub queue: Vec<QueuePositionDto>,
}

#[derive(Serialize)]
pub struct QueuePositionDto {
    pub position: usize,
    pub holder: String,
}

impl From<QueuePosition> for QueuePositionDto {
    fn from(q: QueuePosition) -> Self {
        Self { position: q.position, holder: q.holder }
    }
}

pub async fn acquire(State(s): State<Arc<Store>>, Json(req): Json<AcquireRequest>) -> impl IntoResponse {
    match s.lease.acquire(req.holder).await {
        AcquireOutcome::Granted { lease_id } => Json(AcquireResponse { lease_id, already_held: false }).into_response(),
        AcquireOutcome::AlreadyHeld { lease_id } => {
            Json(AcquireResponse { lease_id, already_held: true }).into_response()
        }
    }
}

pub async fn release(State(s): State<Arc<Store>>, Json(req): Json<LeaseIdRequest>) -> impl IntoResponse {
    let ok = s.lease.release(&req.lease_id).await;
    if ok {
        Json(OkResponse { ok: true }).into_response()
    } else {
        not_the_holder().into_response()
    }
}

pub async fn extend(State(s): State<Arc<Store>>, Json(req): Json<LeaseIdRequest>) -> impl IntoResponse {
    let ok = s.lease.extend(&req.lease_id).await;
    if ok {
        Json(OkResponse { ok: true }).into_response()
    } else {
        not_the_holder().into_response()
    }
}

pub async fn clear_queue(State(s): State<Arc<Store>>) -> impl IntoResponse {
    s.lease.clear_queue().await;
    Json(OkResponse { ok: true })
}

pub async fn pause_queue(State(s): State<Arc<Store>>) -> impl IntoResponse {
    s.lease.pause_queue().await;
    Json(OkResponse { ok: true })
}

pub async fn resume_queue(State(s): State<Arc<Store>>) -> impl IntoResponse {
    s.lease.resume_queue().await;
    Json(OkResponse { ok: true })
}

pub async fn status(State(s): State<Arc<Store>>) -> impl IntoResponse {
    let status = s.lease.status().await;
    Json(StatusResponse {
        holder: status.holder,
        granted_at_secs_ago: status.granted_at.map(|t| t.elapsed().as_secs_f64()),
        resetting: status.resetting,
        paused: status.paused,
        queue: status.queue.into_iter().map(QueuePositionDto::from).collect(),
    })
}

fn not_the_holder() -> Response {
    ErrorCode::InvalidLease.to_http_response("lease id does not match the current holder").into_response()
}
