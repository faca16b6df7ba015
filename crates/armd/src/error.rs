// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use std::fmt;

use axum::http::StatusCode;
use axum::Json;
use serde::{Deserialize, Serialize};

/// Unified error codes shared across command rejection, lease errors, and
/// the HTTP/WebSocket transports.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorCode {
    NoLease,
    InvalidLease,
    BackendUnavailable,
    OutOfBounds,
    VelocityLimit,
    ForceLimit,
    InvalidInput,
    InvalidMode,
    InvalidAction,
    Conflict,
    NotFound,
    Internal,
}

impl ErrorCode {
    pub fn http_status(&self) -> u16 {
        match self {
            Self::NoLease => 401,
            Self::InvalidLease => 403,
            Self::BackendUnavailable => 503,
            Self::OutOfBounds => 422,
            Self::VelocityLimit => 422,
            Self::ForceLimit => 422,
            Self::InvalidInput => 400,
            Self::InvalidMode => 400,
            Self::InvalidAction => 400,
            Self::Conflict => 409,
            Self::NotFound => 404,
            Self::Internal => 500,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::NoLease => "no_lease",
            Self::InvalidLease => "invalid_lease",
            Self::BackendUnavailable => "backend_unavailable",
            Self::OutOfBounds => "out_of_bounds",
            Self::VelocityLimit => "velocity_limit",
            Self::ForceLimit => "force_limit",
            Self::InvalidInput => "invalid_input",
            Self::InvalidMode => "invalid_mode",
            Self::InvalidAction => "invalid_action",
            Self::Conflict => "conflict",
            Self::NotFound => "not_found",
            Self::Internal => "internal",
        }
    }

    /// Convert this error code into an axum JSON error response.
    pub fn to_http_response(
        &self,
        detail: impl Into<String>,
    ) -> (StatusCode, Json<ErrorResponse>) {
        let status =
            StatusCode::from_u16(self.http_status()).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);
        (status, Json(ErrorResponse { error: self.to_error_body(detail) }))
    }

    pub fn to_error_body(&self, detail: impl Into<String>) -> ErrorBody {
        ErrorBody { reason: self.as_str().to_owned(), detail: detail.into() }
    }
}

impl fmt::Display for ErrorCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Top-level error response envelope shared across HTTP and command rejection.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ErrorResponse {
    pub error: ErrorBody,
}

/// Machine-readable reason plus a human-readable detail string.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ErrorBody {
    pub reason: String,
    pub detail: String,
}

#[cfg(test)]
#[path = "error_tests.rs"]
mod tests;
