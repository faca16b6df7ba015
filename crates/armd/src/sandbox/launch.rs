// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Sandbox child-process lifecycle: spawn into a new process group, capture
//! stdout/stderr, enforce a timeout, and terminate gracefully-then-hard.
//!
//! Adapted from `NativePty`'s spawn/kill shape: a PTY is unneeded here since
//! the sandboxed program talks to the core over HTTP, not a terminal, so
//! stdio is plain piped text instead of a forked PTY master.

use std::os::unix::process::{CommandExt, ExitStatusExt};
use std::path::Path;
use std::process::Stdio;
use std::sync::Arc;
use std::time::Duration;

use nix::sys::signal::{kill, Signal};
use nix::unistd::Pid;
use tokio::io::{AsyncBufReadExt, AsyncRead, BufReader};
use tokio::process::{Child, Command};
use tokio::sync::Mutex;
use tokio::time::timeout;
use tracing::warn;

#[derive(Debug, Clone, Default)]
pub struct ExecutionOutcome {
    pub exit_code: Option<i32>,
    pub signal: Option<i32>,
    pub timed_out: bool,
    pub stdout: String,
    pub stderr: String,
}

/// A running sandbox child. Stdio is drained into in-memory buffers by two
/// background tasks so a slow consumer of the live-tail endpoint can never
/// block the child's own progress.
pub struct SandboxChild {
    child: Mutex<Child>,
    pgid: Pid,
    stdout_buf: Arc<Mutex<String>>,
    stderr_buf: Arc<Mutex<String>>,
}

impl SandboxChild {
    pub fn spawn(
        interpreter: &str,
        source_path: &Path,
        lease_id: &str,
        server_url: &str,
    ) -> anyhow::Result<Self> {
        let mut child = Command::new(interpreter)
            .arg(source_path)
            .env("LEASE_ID", lease_id)
            .env("SERVER_URL", server_url)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .process_group(0)
            .spawn()?;

        let raw_pid = child.id().ok_or_else(|| anyhow::anyhow!("sandbox child has no pid"))?;
        let pgid = Pid::from_raw(raw_pid as i32);

        let stdout_buf = Arc::new(Mutex::new(String::new()));
        let stderr_buf = Arc::new(Mutex::new(String::new()));

        if let Some(stdout) = child.stdout.take() {
            let buf = Arc::clone(&stdout_buf);
            tokio::spawn(async move { drain_lines(stdout, buf).await });
        }
        if let Some(stderr) = child.stderr.take() {
            let buf = Arc::clone(&stderr_buf);
            tokio::spawn(async move { drain_lines(stderr, buf).await });
        }

        Ok(Self { child: Mutex::new(child), pgid, stdout_buf, stderr_buf })
    }

    pub async fn tail_stdout(&self) -> String {
        self.stdout_buf.lock().await.clone()
    }

    /// Awaits completion up to `budget`; on timeout, stops the child (with
    /// `kill_grace` between the graceful and hard signal) and reports
    /// `timed_out`.
    pub async fn wait(&self, budget: Duration, kill_grace: Duration) -> ExecutionOutcome {
        let waited = timeout(budget, async {
            let mut child = self.child.lock().await;
            child.wait().await
        })
        .await;

        match waited {
            Ok(Ok(status)) => ExecutionOutcome {
                exit_code: status.code(),
                signal: status.signal(),
                timed_out: false,
                stdout: self.stdout_buf.lock().await.clone(),
                stderr: self.stderr_buf.lock().await.clone(),
            },
            Ok(Err(e)) => {
                warn!("sandbox child wait failed: {e:#}");
                ExecutionOutcome {
                    stdout: self.stdout_buf.lock().await.clone(),
                    stderr: self.stderr_buf.lock().await.clone(),
                    ..Default::default()
                }
            }
            Err(_) => {
                self.stop(kill_grace).await;
                ExecutionOutcome {
                    timed_out: true,
                    stdout: self.stdout_buf.lock().await.clone(),
                    stderr: self.stderr_buf.lock().await.clone(),
                    ..Default::default()
                }
            }
        }
    }

    /// Graceful-then-hard kill of the whole process group, mirroring
    /// `NativePty`'s `Drop`-based SIGHUP-then-SIGKILL sequence.
    pub async fn stop(&self, grace: Duration) {
        let group = Pid::from_raw(-self.pgid.as_raw());
        let _ = kill(group, Signal::SIGTERM);
        tokio::time::sleep(grace).await;
        if kill(group, None).is_ok() {
            let _ = kill(group, Signal::SIGKILL);
        }
        let mut child = self.child.lock().await;
        let _ = child.start_kill();
        let _ = child.wait().await;
    }
}

async fn drain_lines(io: impl AsyncRead + Unpin, buf: Arc<Mutex<String>>) {
    let mut reader = BufReader::new(io);
    let mut line = String::new();
    loop {
        line.clear();
        match reader.read_line(&mut line).await {
            Ok(0) | Err(_) => break,
            Ok(_) => buf.lock().await.push_str(&line),
        }
    }
}

#[cfg(test)]
#[path = "launch_tests.rs"]
mod tests;
