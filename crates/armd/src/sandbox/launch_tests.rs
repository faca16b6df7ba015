// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use std::time::Duration;

use serial_test::serial;

use super::*;

#[tokio::test]
#[serial]
async fn captures_stdout_of_a_quick_command() {
    let tmp = tempfile::Builder::new().suffix(".sh").tempfile().unwrap();
    tokio::fs::write(tmp.path(), "echo hello-from-sandbox\n").await.unwrap();

    let child = SandboxChild::spawn("sh", tmp.path(), "lease-1", "http://localhost:8080").unwrap();
    let outcome = child.wait(Duration::from_secs(5), Duration::from_millis(50)).await;

    assert!(!outcome.timed_out);
    assert_eq!(outcome.exit_code, Some(0));
    assert!(outcome.stdout.contains("hello-from-sandbox"));
}

#[tokio::test]
#[serial]
async fn timeout_stops_a_long_running_command() {
    let tmp = tempfile::Builder::new().suffix(".sh").tempfile().unwrap();
    tokio::fs::write(tmp.path(), "sleep 30\n").await.unwrap();

    let child = SandboxChild::spawn("sh", tmp.path(), "lease-1", "http://localhost:8080").unwrap();
    let outcome = child.wait(Duration::from_millis(100), Duration::from_millis(50)).await;

    assert!(outcome.timed_out);
    assert!(outcome.exit_code.is_none() || outcome.exit_code != Some(0));
}

#[tokio::test]
#[serial]
async fn env_vars_are_visible_to_the_child() {
    let tmp = tempfile::Builder::new().suffix(".sh").tempfile().unwrap();
    tokio::fs::write(tmp.path(), "echo \"$LEASE_ID:$SERVER_URL\"\n").await.unwrap();

    let child = SandboxChild::spawn("sh", tmp.path(), "lease-42", "http://host:9").unwrap();
    let outcome = child.wait(Duration::from_secs(5), Duration::from_millis(50)).await;

    assert!(outcome.stdout.contains("lease-42:http://host:9"));
}
