// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! WebSocket endpoints: `/ws/state`, `/ws/feedback`, `/ws/display`,
//! `/ws/cameras`. Each is a single-purpose broadcast relay rather than a
//! multiplexed stream — the split mirrors the distinct consumers (state
//! observers, feedback/log tailers, the face-display renderer, camera
//! viewers) named in the route table.

use std::sync::Arc;
use std::time::Duration;

use axum::extract::ws::{Message, WebSocket};
use axum::extract::{Query, State, WebSocketUpgrade};
use axum::response::IntoResponse;
use bytes::Bytes;
use futures_util::{SinkExt, StreamExt};
use serde::Serialize;
use tokio::sync::broadcast;

use crate::error::ErrorCode;
use crate::transport::auth;
use crate::transport::state::Store;
use crate::transport::ws_msg::{ws_error, ClientMessage, ServerMessage, WsQuery};

/// Poll rate for `/ws/cameras` when a camera id is subscribed.
const CAMERA_STREAM_INTERVAL: Duration = Duration::from_millis(100);

fn reject_upgrade(code: ErrorCode) -> axum::response::Response {
    let status =
        axum::http::StatusCode::from_u16(code.http_status()).unwrap_or(axum::http::StatusCode::UNAUTHORIZED);
    (status, code.as_str()).into_response()
}

/// If a token is present on the query string, it must validate now; if
/// absent, the connection is admitted but withholds data until an `Auth`
/// message arrives, matching the HTTP bearer-token failure modes.
fn needs_deferred_auth(store: &Store, query: &WsQuery) -> Result<bool, ErrorCode> {
    let Some(expected) = store.config.auth_token.as_deref() else { return Ok(false) };
    match &query.token {
        Some(token) => auth::validate_ws_auth(token, Some(expected)).map(|()| false),
        None => Ok(true),
    }
}

async fn send_json<S>(tx: &mut S, msg: &(impl Serialize + ?Sized)) -> Result<(), ()>
where
    S: SinkExt<Message> + Unpin,
{
    let text = serde_json::to_string(msg).map_err(|_| ())?;
    tx.send(Message::Text(text.into())).await.map_err(|_| ())
}

/// Handle the client-to-server control vocabulary (`auth`, `ping`) common to
/// every endpoint. Returns `Some(reply)` when the caller should send one
/// back, and updates `authed` in place.
fn handle_control_message(text: &str, expected: Option<&str>, authed: &mut bool) -> Option<ServerMessage> {
    let msg: ClientMessage = match serde_json::from_str(text) {
        Ok(m) => m,
        Err(_) => return Some(ws_error(ErrorCode::InvalidInput, "invalid message")),
    };
    match msg {
        ClientMessage::Auth { token } => match auth::validate_ws_auth(&token, expected) {
            Ok(()) => {
                *authed = true;
                None
            }
            Err(code) => Some(ws_error(code, "auth rejected")),
        },
        ClientMessage::Ping {} => Some(ServerMessage::Pong {}),
    }
}

pub async fn state(
    State(store): State<Arc<Store>>,
    Query(query): Query<WsQuery>,
    ws: WebSocketUpgrade,
) -> impl IntoResponse {
    let needs_auth = match needs_deferred_auth(&store, &query) {
        Ok(needs) => needs,
        Err(code) => return reject_upgrade(code),
    };
    ws.on_upgrade(move |socket| handle_state(store, socket, needs_auth)).into_response()
}

async fn handle_state(store: Arc<Store>, socket: WebSocket, needs_auth: bool) {
    let (mut tx, mut rx) = socket.split();
    let mut state_rx = store.state_tx.subscribe();
    let mut authed = !needs_auth;

    loop {
        tokio::select! {
            snapshot = state_rx.recv() => {
                match snapshot {
                    Ok(snapshot) if authed => {
                        if send_json(&mut tx, &snapshot).await.is_err() { break }
                    }
                    Ok(_) => {}
                    Err(broadcast::error::RecvError::Lagged(_)) => continue,
                    Err(broadcast::error::RecvError::Closed) => break,
                }
            }
            msg = rx.next() => {
                match msg {
                    Some(Ok(Message::Text(text))) => {
                        if let Some(reply) = handle_control_message(
                            &text, store.config.auth_token.as_deref(), &mut authed,
                        ) {
                            if send_json(&mut tx, &reply).await.is_err() { break }
                        }
                    }
                    Some(Ok(Message::Close(_))) | None | Some(Err(_)) => break,
                    _ => {}
                }
            }
        }
    }
}

pub async fn feedback(
    State(store): State<Arc<Store>>,
    Query(query): Query<WsQuery>,
    ws: WebSocketUpgrade,
) -> impl IntoResponse {
    let needs_auth = match needs_deferred_auth(&store, &query) {
        Ok(needs) => needs,
        Err(code) => return reject_upgrade(code),
    };
    ws.on_upgrade(move |socket| handle_feedback(store, socket, needs_auth)).into_response()
}

async fn handle_feedback(store: Arc<Store>, socket: WebSocket, needs_auth: bool) {
    let (mut tx, mut rx) = socket.split();
    let mut events_rx = store.events.subscribe();
    let mut authed = !needs_auth;

    loop {
        tokio::select! {
            event = events_rx.recv() => {
                match event {
                    Ok(event) if authed => {
                        if send_json(&mut tx, &event).await.is_err() { break }
                    }
                    Ok(_) => {}
                    Err(broadcast::error::RecvError::Lagged(_)) => continue,
                    Err(broadcast::error::RecvError::Closed) => break,
                }
            }
            msg = rx.next() => {
                match msg {
                    Some(Ok(Message::Text(text))) => {
                        if let Some(reply) = handle_control_message(
                            &text, store.config.auth_token.as_deref(), &mut authed,
                        ) {
                            if send_json(&mut tx, &reply).await.is_err() { break }
                        }
                    }
                    Some(Ok(Message::Close(_))) | None | Some(Err(_)) => break,
                    _ => {}
                }
            }
        }
    }
}

/// Thin relay for the face-display renderer: any text message a publisher
/// sends is broadcast verbatim to every other subscriber and kept as the
/// last snapshot replayed to new joiners. Payloads are opaque to the core.
pub async fn display(
    State(store): State<Arc<Store>>,
    Query(query): Query<WsQuery>,
    ws: WebSocketUpgrade,
) -> impl IntoResponse {
    let needs_auth = match needs_deferred_auth(&store, &query) {
        Ok(needs) => needs,
        Err(code) => return reject_upgrade(code),
    };
    ws.on_upgrade(move |socket| handle_display(store, socket, needs_auth)).into_response()
}

async fn handle_display(store: Arc<Store>, socket: WebSocket, needs_auth: bool) {
    let (mut tx, mut rx) = socket.split();
    let mut display_rx = store.display_tx.subscribe();
    let mut authed = !needs_auth;

    if authed {
        if let Some(last) = store.last_display.read().await.clone() {
            if tx.send(Message::Text(last.into())).await.is_err() {
                return;
            }
        }
    }

    loop {
        tokio::select! {
            relayed = display_rx.recv() => {
                match relayed {
                    Ok(text) if authed => {
                        if tx.send(Message::Text(text.into())).await.is_err() { break }
                    }
                    Ok(_) => {}
                    Err(broadcast::error::RecvError::Lagged(_)) => continue,
                    Err(broadcast::error::RecvError::Closed) => break,
                }
            }
            msg = rx.next() => {
                match msg {
                    Some(Ok(Message::Text(text))) => {
                        if !authed {
                            if let Some(reply) = handle_control_message(
                                &text, store.config.auth_token.as_deref(), &mut authed,
                            ) {
                                if send_json(&mut tx, &reply).await.is_err() { break }
                            }
                            continue;
                        }
                        *store.last_display.write().await = Some(text.to_string());
                        let _ = store.display_tx.send(text.to_string());
                    }
                    Some(Ok(Message::Close(_))) | None | Some(Err(_)) => break,
                    _ => {}
                }
            }
        }
    }
}

pub async fn cameras(
    State(store): State<Arc<Store>>,
    Query(query): Query<WsQuery>,
    ws: WebSocketUpgrade,
) -> impl IntoResponse {
    let needs_auth = match needs_deferred_auth(&store, &query) {
        Ok(needs) => needs,
        Err(code) => return reject_upgrade(code),
    };
    ws.on_upgrade(move |socket| handle_cameras(store, socket, query.camera, needs_auth)).into_response()
}

/// Binary frame: a 4-byte big-endian length prefix covering the JSON header,
/// followed immediately by the header and then the raw image payload in the
/// same message.
fn encode_camera_frame(content_type: &str, payload: &[u8]) -> Vec<u8> {
    let header = serde_json::json!({ "content_type": content_type, "bytes": payload.len() }).to_string();
    let header_bytes = header.as_bytes();
    let mut out = Vec::with_capacity(4 + header_bytes.len() + payload.len());
    out.extend_from_slice(&(header_bytes.len() as u32).to_be_bytes());
    out.extend_from_slice(header_bytes);
    out.extend_from_slice(payload);
    out
}

async fn handle_cameras(store: Arc<Store>, socket: WebSocket, camera_id: Option<String>, needs_auth: bool) {
    let (mut tx, mut rx) = socket.split();
    let mut authed = !needs_auth;
    let mut ticker = tokio::time::interval(CAMERA_STREAM_INTERVAL);

    loop {
        tokio::select! {
            _ = ticker.tick() => {
                if !authed { continue }
                let Some(id) = camera_id.as_deref() else { continue };
                match store.cameras.get_frame(id).await {
                    Ok(frame) => {
                        let bytes = encode_camera_frame(frame.content_type, &frame.data);
                        if tx.send(Message::Binary(Bytes::from(bytes))).await.is_err() { break }
                    }
                    Err(e) => {
                        let err = ws_error(ErrorCode::BackendUnavailable, &e.to_string());
                        if send_json(&mut tx, &err).await.is_err() { break }
                    }
                }
            }
            msg = rx.next() => {
                match msg {
                    Some(Ok(Message::Text(text))) => {
                        if let Some(reply) = handle_control_message(
                            &text, store.config.auth_token.as_deref(), &mut authed,
                        ) {
                            if send_json(&mut tx, &reply).await.is_err() { break }
                        }
                    }
                    Some(Ok(Message::Close(_))) | None | Some(Err(_)) => break,
                    _ => {}
                }
            }
        }
    }
}

#[cfg(test)]
#[path = "ws_tests.rs"]
mod tests;
