// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use axum::http::HeaderMap;

use super::*;

fn headers_with_bearer(token: &str) -> HeaderMap {
    let mut headers = HeaderMap::new();
    headers.insert("authorization", format!("Bearer {token}").parse().unwrap());
    headers
}

#[test]
fn bearer_passes_when_auth_disabled() {
    assert!(validate_bearer(&HeaderMap::new(), None).is_ok());
}

#[test]
fn bearer_rejects_missing_header_as_no_lease() {
    let err = validate_bearer(&HeaderMap::new(), Some("secret")).unwrap_err();
    assert_eq!(err, ErrorCode::NoLease);
}

#[test]
fn bearer_rejects_wrong_token_as_invalid_lease() {
    let headers = headers_with_bearer("wrong");
    let err = validate_bearer(&headers, Some("secret")).unwrap_err();
    assert_eq!(err, ErrorCode::InvalidLease);
}

#[test]
fn bearer_accepts_matching_token() {
    let headers = headers_with_bearer("secret");
    assert!(validate_bearer(&headers, Some("secret")).is_ok());
}

#[test]
fn ws_query_accepts_matching_token_among_pairs() {
    assert!(validate_ws_query("foo=bar&token=secret", Some("secret")).is_ok());
}

#[test]
fn ws_query_rejects_missing_token() {
    let err = validate_ws_query("foo=bar", Some("secret")).unwrap_err();
    assert_eq!(err, ErrorCode::NoLease);
}

#[test]
fn ws_auth_message_validates_like_bearer() {
    assert!(validate_ws_auth("secret", Some("secret")).is_ok());
    assert_eq!(validate_ws_auth("nope", Some("secret")).unwrap_err(), ErrorCode::InvalidLease);
    assert!(validate_ws_auth("anything", None).is_ok());
}
