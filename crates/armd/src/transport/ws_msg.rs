// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! WebSocket message types shared by the four `/ws/*` endpoints.
//!
//! `/ws/state` and `/ws/feedback` push their own already-tagged payload
//! types ([`crate::aggregator::StateSnapshot`], [`crate::event::FeedbackEvent`])
//! directly; this module only covers the small client-to-server control
//! vocabulary (auth, ping) common to every endpoint, plus the WS query
//! params and the shared error/pong replies.

use serde::{Deserialize, Serialize};

use crate::error::ErrorCode;

#[derive(Debug, Clone, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ClientMessage {
    Auth { token: String },
    Ping {},
}

#[derive(Debug, Clone, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ServerMessage {
    Error { code: String, message: String },
    Pong {},
}

pub fn ws_error(code: ErrorCode, message: &str) -> ServerMessage {
    ServerMessage::Error { code: code.as_str().to_owned(), message: message.to_owned() }
}

/// Query parameters accepted on any `/ws/*` upgrade.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct WsQuery {
    pub token: Option<String>,
    /// Camera id to stream; only consulted by `/ws/cameras`.
    pub camera: Option<String>,
}
