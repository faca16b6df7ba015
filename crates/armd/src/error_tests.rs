// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use yare::parameterized;

use super::*;

#[parameterized(
    no_lease = { ErrorCode::NoLease, 401, "no_lease" },
    invalid_lease = { ErrorCode::InvalidLease, 403, "invalid_lease" },
    backend_unavailable = { ErrorCode::BackendUnavailable, 503, "backend_unavailable" },
    out_of_bounds = { ErrorCode::OutOfBounds, 422, "out_of_bounds" },
    conflict = { ErrorCode::Conflict, 409, "conflict" },
    internal = { ErrorCode::Internal, 500, "internal" },
)]
fn maps_status_and_wire_string(code: ErrorCode, status: u16, wire: &str) {
    assert_eq!(code.http_status(), status);
    assert_eq!(code.as_str(), wire);
    assert_eq!(code.to_string(), wire);
}

#[test]
fn to_http_response_carries_detail() {
    let (status, Json(body)) = ErrorCode::OutOfBounds.to_http_response("x out of range");
    assert_eq!(status.as_u16(), 422);
    assert_eq!(body.error.reason, "out_of_bounds");
    assert_eq!(body.error.detail, "x out of range");
}
