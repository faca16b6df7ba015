// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Driver-crash monitor: detects an arm driver that has stopped publishing
//! state and runs a cancel/disconnect/restart/reconnect recovery sequence.

use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use serde::{Deserialize, Serialize};
use tokio::sync::{Mutex, RwLock};
use tokio::time::timeout;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use crate::backend::{ArmBackend, BoxFut};
use crate::event::StopReason;
use crate::rewind::{Component, RewindOrchestrator, RewindRequest, RewindTarget};
use crate::supervisor::{ServiceName, Supervisor};

/// Cancels whatever sandbox execution is currently running. Decouples the
/// crash monitor from the sandbox module the same way `lease::LeaseHook`
/// decouples the lease manager from the rewind orchestrator.
pub trait ExecutionStopper: Send + Sync {
    fn stop(&self, reason: StopReason) -> BoxFut<'_, ()>;
}

/// Clears the arm's protective-stop state. A thin seam over whatever
/// driver-specific recovery call sits beyond the common `ArmBackend`
/// contract (e.g. a Franka `automatic_error_recovery` RPC).
pub trait ErrorRecovery: Send + Sync {
    fn recover(&self) -> BoxFut<'_, anyhow::Result<()>>;
}

#[derive(Debug, Clone, Copy)]
pub struct CrashMonitorConfig {
    pub arm_down_grace: Duration,
    pub recovery_cooldown: Duration,
    pub server_start_timeout: Duration,
    pub auto_rewind_enabled: bool,
    pub auto_rewind_percentage: f64,
}

struct CounterState {
    last_seen_count: u64,
    last_advance_at: Instant,
    ever_advanced: bool,
}

pub struct CrashMonitor {
    config: CrashMonitorConfig,
    arm: Arc<dyn ArmBackend>,
    rewind: Arc<RewindOrchestrator>,
    supervisor: Arc<dyn Supervisor>,
    execution_stopper: Arc<dyn ExecutionStopper>,
    error_recovery: Arc<dyn ErrorRecovery>,
    counter: Mutex<CounterState>,
    last_attempt_at: RwLock<Option<Instant>>,
    is_recovering: AtomicBool,
    recovery_suppressed: AtomicBool,
    /// Shared with the safety monitor, which skips its own tick while this
    /// is set — the two sides of the mutual pre-emption policy.
    crash_recovering: Arc<AtomicBool>,
    recovery_count: AtomicU32,
}

/// Snapshot of the crash monitor suitable for exposing over the status API.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct CrashMonitorStatus {
    pub recovering: bool,
    pub recovery_count: u32,
}

impl CrashMonitor {
    pub fn new(
        config: CrashMonitorConfig,
        arm: Arc<dyn ArmBackend>,
        rewind: Arc<RewindOrchestrator>,
        supervisor: Arc<dyn Supervisor>,
        execution_stopper: Arc<dyn ExecutionStopper>,
        error_recovery: Arc<dyn ErrorRecovery>,
        crash_recovering: Arc<AtomicBool>,
    ) -> Self {
        Self {
            config,
            counter: Mutex::new(CounterState {
                last_seen_count: arm.state_count(),
                last_advance_at: Instant::now(),
                ever_advanced: false,
            }),
            arm,
            rewind,
            supervisor,
            execution_stopper,
            error_recovery,
            last_attempt_at: RwLock::new(None),
            is_recovering: AtomicBool::new(false),
            recovery_suppressed: AtomicBool::new(false),
            crash_recovering,
            recovery_count: AtomicU32::new(0),
        }
    }

    pub fn is_recovering(&self) -> bool {
        self.is_recovering.load(Ordering::Acquire)
    }

    pub fn status(&self) -> CrashMonitorStatus {
        CrashMonitorStatus {
            recovering: self.is_recovering(),
            recovery_count: self.recovery_count.load(Ordering::Relaxed),
        }
    }

    /// Tells the monitor the user is intentionally stopping the driver —
    /// don't fight them with an automatic recovery attempt.
    pub fn suppress_recovery(&self) {
        self.recovery_suppressed.store(true, Ordering::Release);
        info!("driver-crash monitor: recovery suppressed");
    }

    pub fn allow_recovery(&self) {
        self.recovery_suppressed.store(false, Ordering::Release);
        info!("driver-crash monitor: recovery re-armed");
    }

    pub async fn tick(self: &Arc<Self>) {
        if self.is_recovering.load(Ordering::Acquire)
            || self.recovery_suppressed.load(Ordering::Acquire)
            || self.rewind.is_rewinding()
        {
            return;
        }

        let stalled = {
            let current = self.arm.state_count();
            let mut state = self.counter.lock().await;
            if current != state.last_seen_count {
                state.last_seen_count = current;
                state.last_advance_at = Instant::now();
                state.ever_advanced = true;
                false
            } else {
                state.ever_advanced && state.last_advance_at.elapsed() >= self.config.arm_down_grace
            }
        };
        if !stalled {
            return;
        }

        {
            let last = self.last_attempt_at.read().await;
            if let Some(t) = *last {
                if t.elapsed() < self.config.recovery_cooldown {
                    return;
                }
            }
        }
        *self.last_attempt_at.write().await = Some(Instant::now());

        warn!("driver-crash monitor: arm driver stalled, starting recovery");
        self.is_recovering.store(true, Ordering::SeqCst);
        self.crash_recovering.store(true, Ordering::SeqCst);
        let this = Arc::clone(self);
        tokio::spawn(async move { this.run_recovery().await });
    }

    async fn run_recovery(self: Arc<Self>) {
        self.execution_stopper.stop(StopReason::ArmError).await;

        if timeout(Duration::from_secs(5), self.arm.disconnect()).await.is_err() {
            warn!("driver-crash monitor: arm disconnect timed out after 5s");
        }

        if let Err(e) = self.supervisor.stop_service(ServiceName::FrankaServer).await {
            warn!("driver-crash monitor: stop_service failed: {e:#}");
        }

        if let Err(e) = self.error_recovery.recover().await {
            warn!("driver-crash monitor: external error-recovery step failed: {e:#}");
        }

        match timeout(
            self.config.server_start_timeout,
            self.supervisor.restart_service(ServiceName::FrankaServer),
        )
        .await
        {
            Ok(Ok(_)) => {}
            Ok(Err(e)) => warn!("driver-crash monitor: restart_service failed: {e:#}"),
            Err(_) => warn!(
                "driver-crash monitor: restart_service timed out after {:?}",
                self.config.server_start_timeout
            ),
        }

        if let Err(e) = self.arm.connect().await {
            warn!("driver-crash monitor: arm reconnect failed: {e:#}");
        }
        self.reset_baseline().await;

        if !self.wait_for_valid_reading(Duration::from_secs(10)).await {
            warn!("driver-crash monitor: no valid joint reading within 10s of recovery");
        }

        if self.config.auto_rewind_enabled {
            let rewind = Arc::clone(&self.rewind);
            let percentage = self.config.auto_rewind_percentage;
            tokio::spawn(async move {
                let _ = rewind
                    .rewind(RewindRequest {
                        components: vec![Component::Base, Component::Arm],
                        target: RewindTarget::Percentage(percentage),
                        dry_run: false,
                    })
                    .await;
            });
        }

        self.crash_recovering.store(false, Ordering::SeqCst);
        self.is_recovering.store(false, Ordering::SeqCst);
        self.recovery_count.fetch_add(1, Ordering::Relaxed);
        info!("driver-crash monitor: recovery complete");
    }

    async fn reset_baseline(&self) {
        let mut state = self.counter.lock().await;
        state.last_seen_count = self.arm.state_count();
        state.last_advance_at = Instant::now();
        state.ever_advanced = false;
    }

    async fn wait_for_valid_reading(&self, budget: Duration) -> bool {
        let deadline = Instant::now() + budget;
        loop {
            if self.arm.get_state().await.is_ok() {
                return true;
            }
            if Instant::now() >= deadline {
                return false;
            }
            tokio::time::sleep(Duration::from_millis(200)).await;
        }
    }

    pub fn spawn(self: &Arc<Self>, interval: Duration, shutdown: CancellationToken) {
        let this = Arc::clone(self);
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(interval);
            loop {
                tokio::select! {
                    _ = shutdown.cancelled() => break,
                    _ = ticker.tick() => this.tick().await,
                }
            }
        });
        info!("driver-crash monitor running");
    }
}

#[cfg(test)]
#[path = "crash_monitor_tests.rs"]
mod tests;
