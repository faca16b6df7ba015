// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use std::sync::Arc;

use axum::extract::State;
use axum::http::{HeaderMap, Request, StatusCode};
use axum::middleware::Next;
use axum::response::{IntoResponse, Response};

use crate::error::{ErrorCode, ErrorResponse};
use crate::transport::state::Store;

/// Constant-time string comparison to prevent timing side-channel attacks.
fn constant_time_eq(a: &str, b: &str) -> bool {
    let a = a.as_bytes();
    let b = b.as_bytes();
    if a.len() != b.len() {
        return false;
    }
    let mut acc = 0u8;
    for (x, y) in a.iter().zip(b.iter()) {
        acc |= x ^ y;
    }
    acc == 0
}

/// Validate a Bearer token from HTTP headers.
///
/// Returns `Ok(())` when `expected` is `None` (auth disabled) or when the
/// header matches. A missing header is `NoLease`-coded (401); a present but
/// wrong token is `InvalidLease`-coded (403) — this crate has no dedicated
/// `Unauthorized` variant, so auth failures reuse the lease error codes.
pub fn validate_bearer(headers: &HeaderMap, expected: Option<&str>) -> Result<(), ErrorCode> {
    let expected = match expected {
        Some(tok) => tok,
        None => return Ok(()),
    };

    let header = headers.get("authorization").and_then(|v| v.to_str().ok()).ok_or(ErrorCode::NoLease)?;

    let token = header.strip_prefix("Bearer ").ok_or(ErrorCode::NoLease)?;
    if constant_time_eq(token, expected) {
        Ok(())
    } else {
        Err(ErrorCode::InvalidLease)
    }
}

/// Validate a token from a WebSocket upgrade query string (`?token=...`).
pub fn validate_ws_query(query: &str, expected: Option<&str>) -> Result<(), ErrorCode> {
    let expected = match expected {
        Some(tok) => tok,
        None => return Ok(()),
    };

    for pair in query.split('&') {
        if let Some(value) = pair.strip_prefix("token=") {
            if constant_time_eq(value, expected) {
                return Ok(());
            }
        }
    }

    Err(ErrorCode::NoLease)
}

/// Validate a token from the WebSocket `Auth` message.
pub fn validate_ws_auth(token: &str, expected: Option<&str>) -> Result<(), ErrorCode> {
    match expected {
        None => Ok(()),
        Some(tok) if constant_time_eq(tok, token) => Ok(()),
        Some(_) => Err(ErrorCode::InvalidLease),
    }
}

/// Axum middleware enforcing Bearer token auth on every route except
/// `/health` and the WS upgrades, which authenticate by query param or an
/// `Auth` message instead.
///
/// When `auth_token` is `None` on the `Store`, all requests pass through.
pub async fn auth_layer(State(store): State<Arc<Store>>, req: Request<axum::body::Body>, next: Next) -> Response {
    let path = req.uri().path();

    if path == "/health"
        || path == "/ws/state"
        || path == "/ws/feedback"
        || path == "/ws/display"
        || path == "/ws/cameras"
    {
        return next.run(req).await;
    }

    if let Err(code) = validate_bearer(req.headers(), store.config.auth_token.as_deref()) {
        let body = ErrorResponse { error: code.to_error_body("unauthorized") };
        return (StatusCode::from_u16(code.http_status()).unwrap_or(StatusCode::UNAUTHORIZED), axum::Json(body))
            .into_response();
    }

    next.run(req).await
}

#[cfg(test)]
#[path = "auth_tests.rs"]
mod tests;
