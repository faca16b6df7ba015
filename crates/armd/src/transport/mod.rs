// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! HTTP/WebSocket transport: router assembly, auth middleware, and the
//! shared [`state::Store`].

pub mod auth;
pub mod http;
pub mod state;
pub mod ws;
pub mod ws_msg;

use std::sync::Arc;

use axum::http::{header, Method};
use axum::routing::{get, post, put};
use axum::Router;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;

use state::Store;

/// Assemble the full router: every HTTP route, the four WS endpoints, the
/// auth middleware, and a permissive CORS layer (no browser credentials are
/// involved — auth is a bearer token, not a cookie).
pub fn build_router(store: Arc<Store>) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods([Method::GET, Method::POST, Method::PUT])
        .allow_headers([header::AUTHORIZATION, header::CONTENT_TYPE]);

    Router::new()
        .route("/health", get(http::state::health))
        .route("/state", get(http::state::state))
        .route("/trajectory", get(http::state::trajectory))
        .route("/logs", get(http::state::logs))
        .route("/cameras", get(http::cameras::list))
        .route("/cameras/{id}/frame", get(http::cameras::frame))
        .route("/cameras/{id}/intrinsics", get(http::cameras::intrinsics))
        .route("/lease/acquire", post(http::lease::acquire))
        .route("/lease/release", post(http::lease::release))
        .route("/lease/extend", post(http::lease::extend))
        .route("/lease/clear-queue", post(http::lease::clear_queue))
        .route("/lease/pause-queue", post(http::lease::pause_queue))
        .route("/lease/resume-queue", post(http::lease::resume_queue))
        .route("/lease/status", get(http::lease::status))
        .route("/cmd/base/move", post(http::cmd::base_move))
        .route("/cmd/base/stop", post(http::cmd::base_stop))
        .route("/cmd/arm/move", post(http::cmd::arm_move))
        .route("/cmd/arm/stop", post(http::cmd::arm_stop))
        .route("/cmd/gripper", post(http::cmd::gripper))
        .route("/cmd/reset", post(http::cmd::reset))
        .route("/code/execute", post(http::code::execute))
        .route("/code/stop", post(http::code::stop))
        .route("/code/validate", post(http::code::validate))
        .route("/code/status", get(http::code::status))
        .route("/code/result", get(http::code::result))
        .route("/code/history", get(http::code::history))
        .route("/rewind/status", get(http::rewind::status))
        .route("/rewind/trajectory", get(http::rewind::trajectory))
        .route("/rewind/trajectory/{idx}", get(http::rewind::trajectory_at))
        .route("/rewind/boundary", get(http::rewind::boundary))
        .route("/rewind/check", get(http::rewind::check))
        .route("/rewind/config", get(http::rewind::get_config).put(http::rewind::set_config))
        .route("/rewind/logs", get(http::rewind::logs))
        .route("/rewind/monitor/status", get(http::rewind::monitor_status))
        .route("/rewind/monitor/config", put(http::rewind::set_monitor_config))
        .route("/rewind/monitor/enable", post(http::rewind::monitor_enable))
        .route("/rewind/monitor/disable", post(http::rewind::monitor_disable))
        .route("/rewind/steps", post(http::rewind::steps))
        .route("/rewind/percentage", post(http::rewind::percentage))
        .route("/rewind/to-safe", post(http::rewind::to_safe))
        .route("/rewind/to-waypoint", post(http::rewind::to_waypoint))
        .route("/rewind/reset-to-home", post(http::rewind::reset_to_home))
        .route("/rewind/trajectory/clear", post(http::rewind::clear_trajectory))
        .route("/rewind/manual", post(http::rewind::manual))
        .route("/shutdown", post(http::state::shutdown))
        .route("/ws/state", get(ws::state))
        .route("/ws/feedback", get(ws::feedback))
        .route("/ws/display", get(ws::display))
        .route("/ws/cameras", get(ws::cameras))
        .layer(axum::middleware::from_fn_with_state(Arc::clone(&store), auth::auth_layer))
        .layer(TraceLayer::new_for_http())
        .layer(cors)
        .with_state(store)
}
