// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use std::time::Duration;

use super::*;

fn manager() -> SandboxManager {
    SandboxManager::new("python3".to_owned(), Duration::from_millis(100), 5)
}

#[tokio::test]
async fn rejects_source_that_fails_validation() {
    let mgr = manager();
    let result = mgr.execute("import subprocess\n", "lease-1", "http://localhost", Duration::from_secs(5)).await;
    assert!(result.is_err());
    assert!(!mgr.is_running().await);
}

#[tokio::test]
async fn executes_accepted_source_and_records_history() {
    let mgr = manager();
    let record = mgr
        .execute("print('hi from sandbox')\n", "lease-1", "http://localhost:8080", Duration::from_secs(10))
        .await
        .unwrap();

    assert_eq!(record.exit_code, Some(0));
    assert!(record.stdout.contains("hi from sandbox"));
    assert!(!mgr.is_running().await);

    let history = mgr.history().await;
    assert_eq!(history.len(), 1);
    assert_eq!(history[0].id, record.id);
}

#[tokio::test]
async fn wrapped_source_exposes_lease_and_server_url_env_vars() {
    let mgr = manager();
    let record = mgr
        .execute(
            "import os\nprint(os.environ['LEASE_ID'], os.environ['SERVER_URL'])\n",
            "lease-77",
            "http://127.0.0.1:9",
            Duration::from_secs(10),
        )
        .await
        .unwrap();
    assert!(record.stdout.contains("lease-77 http://127.0.0.1:9"));
}

#[tokio::test]
async fn second_execute_while_running_is_rejected() {
    let mgr = Arc::new(manager());
    let first = Arc::clone(&mgr);
    let handle = tokio::spawn(async move {
        first.execute("import time\ntime.sleep(0.3)\n", "lease-1", "http://x", Duration::from_secs(5)).await
    });

    tokio::time::sleep(Duration::from_millis(50)).await;
    let conflict = mgr.execute("print('second')\n", "lease-2", "http://x", Duration::from_secs(5)).await;
    assert!(conflict.is_err());

    handle.await.unwrap().unwrap();
}

#[tokio::test]
async fn stop_terminates_a_long_running_execution() {
    let mgr = Arc::new(manager());
    let runner = Arc::clone(&mgr);
    let handle = tokio::spawn(async move {
        runner.execute("import time\ntime.sleep(30)\n", "lease-1", "http://x", Duration::from_secs(60)).await
    });

    tokio::time::sleep(Duration::from_millis(100)).await;
    ExecutionStopper::stop(mgr.as_ref(), StopReason::ArmError).await;

    let record = handle.await.unwrap().unwrap();
    assert_ne!(record.exit_code, Some(0));
}
