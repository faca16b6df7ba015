// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use axum_test::TestServer;
use clap::Parser;

use super::*;
use crate::config::Config;

fn test_config(port: u16) -> Config {
    let mut config = Config::parse_from(["armd"]);
    config.port = port;
    config
}

#[tokio::test]
async fn prepare_wires_every_component_without_panicking() {
    let store = prepare(test_config(0)).await.expect("prepare should succeed with mock backends");
    assert!(!store.shutdown.is_cancelled());
    assert!(!store.cameras.list_ids().is_empty());
}

#[tokio::test]
async fn router_serves_health_state_and_rewind_routes() {
    let store = prepare(test_config(0)).await.expect("prepare should succeed");
    let router = build_router(store);
    let server = TestServer::new(router).expect("test server should build from the router");

    let health = server.get("/health").await;
    health.assert_status_ok();

    let state = server.get("/state").await;
    state.assert_status_ok();

    let rewind_status = server.get("/rewind/status").await;
    rewind_status.assert_status_ok();

    let cameras = server.get("/cameras").await;
    cameras.assert_status_ok();
}

#[tokio::test]
async fn shutdown_endpoint_cancels_the_shared_token() {
    let store = prepare(test_config(0)).await.expect("prepare should succeed");
    let shutdown = store.shutdown.clone();
    let router = build_router(store);
    let server = TestServer::new(router).expect("test server should build from the router");

    server.post("/shutdown").await.assert_status_ok();
    assert!(shutdown.is_cancelled());
}
