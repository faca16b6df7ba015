// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Camera passthrough HTTP handlers: listing, a still frame, and intrinsics.
//! Live streaming goes through `/ws/cameras` instead.

use std::sync::Arc;

use axum::extract::{Path, State};
use axum::http::header;
use axum::response::IntoResponse;
use axum::Json;

use crate::error::ErrorCode;
use crate::transport::state::Store;

pub async fn list(State(s): State<Arc<Store>>) -> impl IntoResponse {
    Json(s.cameras.list_ids())
}

pub async fn frame(State(s): State<Arc<Store>>, Path(id): Path<String>) -> impl IntoResponse {
    match s.cameras.get_frame(&id).await {
        Ok(frame) => ([(header::CONTENT_TYPE, frame.content_type)], frame.data).into_response(),
        Err(e) => ErrorCode::BackendUnavailable.to_http_response(e.to_string()).into_response(),
    }
}

pub async fn intrinsics(State(s): State<Arc<Store>>, Path(id): Path<String>) -> impl IntoResponse {
    match s.cameras.get_intrinsics(&id).await {
        Ok(intrinsics) => Json(intrinsics).into_response(),
        Err(e) => ErrorCode::BackendUnavailable.to_http_response(e.to_string()).into_response(),
    }
}

#[cfg(test)]
#[path = "cameras_tests.rs"]
mod tests;
