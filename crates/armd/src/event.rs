// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Feedback events pushed to `/ws/feedback` subscribers.

use serde::{Deserialize, Serialize};

/// Reason a lease was revoked or a sandbox execution was stopped.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RevocationReason {
    MaxDuration,
    IdleTimeout,
    QueueCleared,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StopReason {
    Manual,
    ArmError,
    IdleTimeout,
    MaxDuration,
    QueueCleared,
    Released,
}

/// Internally-tagged feedback event, one variant per §6 event name.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum FeedbackEvent {
    LeaseGranted { holder: String },
    LeaseWarning { seconds_remaining: f64 },
    LeaseRevoked { reason: RevocationReason },
    ResettingToHome,
    ResetComplete,
    ResetFailed { detail: String },
    CmdAck { cmd_id: String },
    CmdRejected { cmd_id: String, reason: String, detail: String },
    CmdResult { cmd_id: String },
    ServiceStarted { name: String },
    ServiceStopped { name: String },
    ServiceCrashed { name: String },
}

#[cfg(test)]
#[path = "event_tests.rs"]
mod tests;
