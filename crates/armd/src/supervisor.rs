// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Capability interface to the external driver-process supervisor, plus a
//! concrete implementation that manages real child processes by pid.
//!
//! The core only ever calls `start_service`/`stop_service`/`restart_service`/
//! `get_status` — this is the seam the driver-crash monitor drives recovery
//! through; a production deployment may instead wire a remote supervisor
//! behind the same trait.

use std::collections::HashMap;
use std::path::PathBuf;
use std::process::Stdio;
use std::sync::Arc;
use std::time::Duration;

use nix::sys::signal::{kill, Signal};
use nix::unistd::Pid;
use serde::{Deserialize, Serialize};
use tokio::process::Command;
use tokio::sync::Mutex;
use tokio::time::sleep;
use tracing::warn;

use crate::backend::BoxFut;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ServiceName {
    Unlock,
    BaseServer,
    FrankaServer,
    Controller,
    GripperServer,
    CameraServer,
}

impl ServiceName {
    /// Declared dependencies that must already be running before this
    /// service may be started.
    fn dependencies(self) -> &'static [ServiceName] {
        match self {
            Self::Unlock | Self::BaseServer | Self::CameraServer => &[],
            Self::FrankaServer => &[Self::Unlock],
            Self::Controller => &[Self::FrankaServer],
            Self::GripperServer => &[Self::FrankaServer],
        }
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct ServiceStatus {
    pub running: bool,
    pub pid: Option<u32>,
}

pub trait Supervisor: Send + Sync {
    fn start_service(&self, name: ServiceName) -> BoxFut<'_, anyhow::Result<ServiceStatus>>;
    fn stop_service(&self, name: ServiceName) -> BoxFut<'_, anyhow::Result<()>>;
    fn restart_service(&self, name: ServiceName) -> BoxFut<'_, anyhow::Result<ServiceStatus>>;
    fn get_status(&self, name: ServiceName) -> BoxFut<'_, anyhow::Result<ServiceStatus>>;
}

struct Managed {
    pid: Pid,
}

/// Scans `/proc` for processes whose cmdline contains `pattern`. Linux-only,
/// used as the stop-service fallback when a pid isn't tracked (e.g. after the
/// core itself restarted and lost its in-memory table).
fn find_pids_by_command(pattern: &str) -> Vec<Pid> {
    let mut pids = Vec::new();
    let Ok(entries) = std::fs::read_dir("/proc") else { return pids };
    for entry in entries.flatten() {
        let Ok(raw_pid) = entry.file_name().to_string_lossy().parse::<i32>() else { continue };
        let Ok(cmdline) = std::fs::read(entry.path().join("cmdline")) else { continue };
        if String::from_utf8_lossy(&cmdline).contains(pattern) {
            pids.push(Pid::from_raw(raw_pid));
        }
    }
    pids
}

/// Launches and tracks driver processes, matching liveness by sending
/// signal 0 to the tracked pid (the same idiom the PTY backend uses to
/// reap its own child).
///
/// The pid-file at `pid_file` is the only state that survives a restart of
/// the core itself: on construction any pid it names is checked for
/// liveness and, if still running, terminated as an orphan of the previous
/// run rather than silently adopted.
pub struct ProcessSupervisor {
    commands: HashMap<ServiceName, Vec<String>>,
    children: Mutex<HashMap<ServiceName, Managed>>,
    pid_file: PathBuf,
}

impl ProcessSupervisor {
    pub fn new(commands: HashMap<ServiceName, Vec<String>>, pid_file: PathBuf) -> Self {
        Self::cull_orphans(&pid_file);
        Self { commands, children: Mutex::new(HashMap::new()), pid_file }
    }

    /// Reads any pid-file left behind by a previous run and terminates
    /// whichever recorded pids are still alive — the core's own restart
    /// doesn't imply the driver processes it spawned exited too.
    fn cull_orphans(pid_file: &PathBuf) {
        let Ok(raw) = std::fs::read_to_string(pid_file) else { return };
        let Ok(recorded) = serde_json::from_str::<HashMap<ServiceName, u32>>(&raw) else { return };
        for (name, raw_pid) in recorded {
            let pid = Pid::from_raw(raw_pid as i32);
            if Self::is_alive(pid) {
                warn!("culling orphaned {name:?} process from a previous run, pid {raw_pid}");
                let _ = kill(pid, Signal::SIGTERM);
            }
        }
    }

    /// Persists the current pid table so a future restart can cull orphans.
    async fn persist(&self) {
        let snapshot: HashMap<ServiceName, u32> = {
            let children = self.children.lock().await;
            children.iter().map(|(name, managed)| (*name, managed.pid.as_raw() as u32)).collect()
        };
        let Ok(encoded) = serde_json::to_string(&snapshot) else { return };
        if let Err(e) = tokio::fs::write(&self.pid_file, encoded).await {
            warn!("failed to persist pid-file at {}: {e}", self.pid_file.display());
        }
    }

    fn is_alive(pid: Pid) -> bool {
        kill(pid, None).is_ok()
    }

    async fn spawn_tracked(&self, name: ServiceName) -> anyhow::Result<ServiceStatus> {
        let argv = self
            .commands
            .get(&name)
            .ok_or_else(|| anyhow::anyhow!("no command configured for {name:?}"))?;
        let (program, args) =
            argv.split_first().ok_or_else(|| anyhow::anyhow!("empty command for {name:?}"))?;
        let mut child = Command::new(program)
            .args(args)
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(Stdio::null())
            .spawn()?;
        let raw_pid = child.id().ok_or_else(|| anyhow::anyhow!("spawned child has no pid"))?;
        // Detach: liveness is tracked by pid via `kill(pid, None)`, not by
        // awaiting this handle, which would otherwise try to reap the child
        // when dropped.
        std::mem::forget(child);
        let pid = Pid::from_raw(raw_pid as i32);
        self.children.lock().await.insert(name, Managed { pid });
        self.persist().await;
        Ok(ServiceStatus { running: true, pid: Some(raw_pid) })
    }

    async fn kill_matching_command(&self, name: ServiceName) {
        let Some(argv) = self.commands.get(&name).cloned() else { return };
        let Some(pattern) = argv.first().cloned() else { return };
        let pids =
            tokio::task::spawn_blocking(move || find_pids_by_command(&pattern)).await.unwrap_or_default();
        if pids.is_empty() {
            return;
        }
        warn!("{name:?} not tracked, found {} matching process(es) to terminate", pids.len());
        for pid in pids {
            let _ = kill(pid, Signal::SIGTERM);
        }
    }
}

impl Supervisor for ProcessSupervisor {
    fn start_service(&self, name: ServiceName) -> BoxFut<'_, anyhow::Result<ServiceStatus>> {
        Box::pin(async move {
            for dep in name.dependencies() {
                let status = self.get_status(*dep).await?;
                if !status.running {
                    anyhow::bail!("cannot start {name:?}: dependency {dep:?} is not running");
                }
            }
            self.spawn_tracked(name).await
        })
    }

    fn stop_service(&self, name: ServiceName) -> BoxFut<'_, anyhow::Result<()>> {
        Box::pin(async move {
            let managed = self.children.lock().await.remove(&name);
            match managed {
                Some(managed) if Self::is_alive(managed.pid) => {
                    let _ = kill(managed.pid, Signal::SIGTERM);
                    sleep(Duration::from_millis(500)).await;
                    if Self::is_alive(managed.pid) {
                        warn!("{name:?} did not exit after SIGTERM, sending SIGKILL");
                        let _ = kill(managed.pid, Signal::SIGKILL);
                    }
                }
                _ => self.kill_matching_command(name).await,
            }
            self.persist().await;
            Ok(())
        })
    }

    fn restart_service(&self, name: ServiceName) -> BoxFut<'_, anyhow::Result<ServiceStatus>> {
        Box::pin(async move {
            self.stop_service(name).await?;
            self.start_service(name).await
        })
    }

    fn get_status(&self, name: ServiceName) -> BoxFut<'_, anyhow::Result<ServiceStatus>> {
        Box::pin(async move {
            let children = self.children.lock().await;
            Ok(match children.get(&name) {
                Some(managed) if Self::is_alive(managed.pid) => {
                    ServiceStatus { running: true, pid: Some(managed.pid.as_raw() as u32) }
                }
                _ => ServiceStatus { running: false, pid: None },
            })
        })
    }
}

#[cfg(test)]
#[path = "supervisor_tests.rs"]
mod tests;
