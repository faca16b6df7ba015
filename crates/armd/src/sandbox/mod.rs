// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Code sandbox: deny-list validation, single-execution-at-a-time child
//! process launch, and a bounded history of past executions.

pub mod launch;
pub mod validate;

use std::collections::VecDeque;
use std::sync::Arc;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tokio::sync::{Mutex, RwLock};
use tracing::info;
use uuid::Uuid;

use crate::backend::BoxFut;
use crate::crash_monitor::ExecutionStopper;
use crate::event::StopReason;
use launch::SandboxChild;
pub use validate::ValidationReport;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExecutionRecord {
    pub id: String,
    pub exit_code: Option<i32>,
    pub signal: Option<i32>,
    pub timed_out: bool,
    pub stop_reason: Option<StopReason>,
    pub stdout: String,
    pub stderr: String,
}

struct RunningExecution {
    id: String,
    child: Arc<SandboxChild>,
}

pub struct SandboxManager {
    interpreter: String,
    kill_grace: Duration,
    history_limit: usize,
    current: Mutex<Option<RunningExecution>>,
    history: RwLock<VecDeque<ExecutionRecord>>,
}

impl SandboxManager {
    pub fn new(interpreter: String, kill_grace: Duration, history_limit: usize) -> Self {
        Self {
            interpreter,
            kill_grace,
            history_limit,
            current: Mutex::new(None),
            history: RwLock::new(VecDeque::new()),
        }
    }

    pub fn validate(source: &str) -> ValidationReport {
        validate::validate(source)
    }

    pub async fn is_running(&self) -> bool {
        self.current.lock().await.is_some()
    }

    pub async fn tail_stdout(&self) -> Option<String> {
        let guard = self.current.lock().await;
        match &*guard {
            Some(running) => Some(running.child.tail_stdout().await),
            None => None,
        }
    }

    pub async fn history(&self) -> Vec<ExecutionRecord> {
        self.history.read().await.iter().cloned().collect()
    }

    /// Validates, wraps, and runs `source`; rejects with a conflict if an
    /// execution is already in progress.
    pub async fn execute(
        &self,
        source: &str,
        lease_id: &str,
        server_url: &str,
        budget: Duration,
    ) -> anyhow::Result<ExecutionRecord> {
        let report = Self::validate(source);
        if !report.accepted {
            anyhow::bail!(
                "rejected by sandbox validator: {}",
                report
                    .issues
                    .iter()
                    .map(|i| format!("line {}: {}", i.line, i.reason))
                    .collect::<Vec<_>>()
                    .join("; ")
            );
        }

        let mut guard = self.current.lock().await;
        if guard.is_some() {
            anyhow::bail!("an execution is already running");
        }

        let id = Uuid::new_v4().to_string();
        let wrapped = wrap_source(source, lease_id, server_url);
        let file = tempfile::Builder::new().prefix("armd-exec-").suffix(".py").tempfile()?;
        tokio::fs::write(file.path(), &wrapped).await?;

        let child = Arc::new(SandboxChild::spawn(&self.interpreter, file.path(), lease_id, server_url)?);
        *guard = Some(RunningExecution { id: id.clone(), child: Arc::clone(&child) });
        drop(guard);

        let outcome = child.wait(budget, self.kill_grace).await;
        drop(file); // kept alive for the duration of the run

        *self.current.lock().await = None;

        let record = ExecutionRecord {
            id,
            exit_code: outcome.exit_code,
            signal: outcome.signal,
            timed_out: outcome.timed_out,
            stop_reason: outcome.timed_out.then_some(StopReason::MaxDuration),
            stdout: outcome.stdout,
            stderr: outcome.stderr,
        };
        self.push_history(record.clone()).await;
        Ok(record)
    }

    async fn push_history(&self, record: ExecutionRecord) {
        let mut history = self.history.write().await;
        history.push_back(record);
        while history.len() > self.history_limit {
            history.pop_front();
        }
    }
}

impl ExecutionStopper for SandboxManager {
    fn stop(&self, reason: StopReason) -> BoxFut<'_, ()> {
        Box::pin(async move {
            let guard = self.current.lock().await;
            if let Some(running) = &*guard {
                info!("sandbox: stopping execution {} (reason: {:?})", running.id, reason);
                running.child.stop(self.kill_grace).await;
            }
        })
    }
}

/// Initializes the SDK's env-based singletons before the user's own source
/// runs, so its rewind API can call back into the core over HTTP.
fn wrap_source(source: &str, lease_id: &str, server_url: &str) -> String {
    format!(
        "import os\nos.environ.setdefault(\"LEASE_ID\", {lease_id:?})\nos.environ.setdefault(\"SERVER_URL\", {server_url:?})\n\n{source}\n"
    )
}

#[cfg(test)]
#[path = "mod_tests.rs"]
mod tests;
