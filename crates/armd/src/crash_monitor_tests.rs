// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::RwLock;

use super::*;
use crate::backend::mock::MockArm;
use crate::trajectory::TrajectoryLog;

#[derive(Default)]
struct FakeSupervisor {
    stops: AtomicUsize,
    restarts: AtomicUsize,
}

impl Supervisor for FakeSupervisor {
    fn start_service(&self, _name: ServiceName) -> BoxFut<'_, anyhow::Result<crate::supervisor::ServiceStatus>> {
        Box::pin(async { Ok(crate::supervisor::ServiceStatus { running: true, pid: Some(1) }) })
    }

    fn stop_service(&self, _name: ServiceName) -> BoxFut<'_, anyhow::Result<()>> {
        self.stops.fetch_add(1, Ordering::SeqCst);
        Box::pin(async { Ok(()) })
    }

    fn restart_service(&self, _name: ServiceName) -> BoxFut<'_, anyhow::Result<crate::supervisor::ServiceStatus>> {
        self.restarts.fetch_add(1, Ordering::SeqCst);
        Box::pin(async { Ok(crate::supervisor::ServiceStatus { running: true, pid: Some(1) }) })
    }

    fn get_status(&self, _name: ServiceName) -> BoxFut<'_, anyhow::Result<crate::supervisor::ServiceStatus>> {
        Box::pin(async { Ok(crate::supervisor::ServiceStatus { running: true, pid: Some(1) }) })
    }
}

#[derive(Default)]
struct FakeStopper {
    calls: AtomicUsize,
}

impl ExecutionStopper for FakeStopper {
    fn stop(&self, _reason: StopReason) -> BoxFut<'_, ()> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        Box::pin(async {})
    }
}

#[derive(Default)]
struct FakeRecovery {
    calls: AtomicUsize,
}

impl ErrorRecovery for FakeRecovery {
    fn recover(&self) -> BoxFut<'_, anyhow::Result<()>> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        Box::pin(async { Ok(()) })
    }
}

fn config() -> CrashMonitorConfig {
    CrashMonitorConfig {
        arm_down_grace: Duration::from_millis(20),
        recovery_cooldown: Duration::from_millis(500),
        server_start_timeout: Duration::from_secs(1),
        auto_rewind_enabled: true,
        auto_rewind_percentage: 10.0,
    }
}

fn harness() -> (Arc<CrashMonitor>, Arc<MockArm>, Arc<FakeSupervisor>, Arc<FakeStopper>, Arc<FakeRecovery>) {
    let arm = Arc::new(MockArm::default());
    let arm_dyn: Arc<dyn ArmBackend> = arm.clone();
    let trajectory = Arc::new(RwLock::new(TrajectoryLog::new(1000, 0.1, 0.05, 0.1)));
    let rewind = Arc::new(RewindOrchestrator::new(
        trajectory,
        Arc::new(MockArm::default()),
        Arc::new(crate::backend::mock::MockBase::default()),
        crate::rewind::RewindConfig::default(),
    ));
    let supervisor = Arc::new(FakeSupervisor::default());
    let stopper = Arc::new(FakeStopper::default());
    let recovery = Arc::new(FakeRecovery::default());
    let monitor = Arc::new(CrashMonitor::new(
        config(),
        arm_dyn,
        rewind,
        supervisor.clone() as Arc<dyn Supervisor>,
        stopper.clone() as Arc<dyn ExecutionStopper>,
        recovery.clone() as Arc<dyn ErrorRecovery>,
        Arc::new(AtomicBool::new(false)),
    ));
    (monitor, arm, supervisor, stopper, recovery)
}

async fn wait_until_idle(monitor: &Arc<CrashMonitor>) {
    for _ in 0..100 {
        if !monitor.is_recovering() {
            return;
        }
        tokio::time::sleep(Duration::from_millis(20)).await;
    }
    panic!("crash monitor never finished recovering");
}

#[tokio::test]
async fn fresh_monitor_with_no_prior_activity_does_not_trigger() {
    let (monitor, _arm, supervisor, _stopper, _recovery) = harness();
    tokio::time::sleep(Duration::from_millis(30)).await;
    monitor.tick().await;
    assert!(!monitor.is_recovering());
    assert_eq!(supervisor.stops.load(Ordering::SeqCst), 0);
}

#[tokio::test]
async fn stall_after_advancing_triggers_full_recovery() {
    let (monitor, arm, supervisor, stopper, recovery) = harness();
    arm.get_state().await.unwrap();
    monitor.tick().await; // observes the advance, establishes ever_advanced

    tokio::time::sleep(Duration::from_millis(30)).await;
    monitor.tick().await; // no further advance past arm_down_grace -> stall
    assert!(monitor.is_recovering());

    wait_until_idle(&monitor).await;
    assert_eq!(stopper.calls.load(Ordering::SeqCst), 1);
    assert_eq!(supervisor.stops.load(Ordering::SeqCst), 1);
    assert_eq!(supervisor.restarts.load(Ordering::SeqCst), 1);
    assert_eq!(recovery.calls.load(Ordering::SeqCst), 1);
    assert!(arm.is_connected());
}

#[tokio::test]
async fn suppressed_monitor_skips_stall_detection() {
    let (monitor, arm, supervisor, _stopper, _recovery) = harness();
    arm.get_state().await.unwrap();
    monitor.tick().await;
    monitor.suppress_recovery();

    tokio::time::sleep(Duration::from_millis(30)).await;
    monitor.tick().await;
    assert!(!monitor.is_recovering());
    assert_eq!(supervisor.stops.load(Ordering::SeqCst), 0);
}

#[tokio::test]
async fn cooldown_blocks_a_second_trigger_right_away() {
    let (monitor, arm, supervisor, _stopper, _recovery) = harness();
    arm.get_state().await.unwrap();
    monitor.tick().await;

    tokio::time::sleep(Duration::from_millis(30)).await;
    monitor.tick().await;
    wait_until_idle(&monitor).await;
    assert_eq!(supervisor.restarts.load(Ordering::SeqCst), 1);

    // Immediately stalled again, but still within recovery_cooldown.
    monitor.tick().await;
    assert!(!monitor.is_recovering());
    assert_eq!(supervisor.restarts.load(Ordering::SeqCst), 1);
}
