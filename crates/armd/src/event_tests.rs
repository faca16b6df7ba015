// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use super::*;

#[test]
fn lease_revoked_serializes_with_tagged_reason() {
    let event = FeedbackEvent::LeaseRevoked { reason: RevocationReason::IdleTimeout };
    let json = serde_json::to_value(&event).unwrap();
    assert_eq!(json["type"], "lease_revoked");
    assert_eq!(json["reason"], "idle_timeout");
}

#[test]
fn cmd_rejected_carries_reason_and_detail() {
    let event = FeedbackEvent::CmdRejected {
        cmd_id: "c1".to_owned(),
        reason: "out_of_bounds".to_owned(),
        detail: "x too large".to_owned(),
    };
    let json = serde_json::to_value(&event).unwrap();
    assert_eq!(json["type"], "cmd_rejected");
    assert_eq!(json["reason"], "out_of_bounds");
}
