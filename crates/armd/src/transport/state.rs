// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Shared application state handed to every axum handler via the `State`
//! extractor.

use std::collections::VecDeque;
use std::fmt;
use std::sync::Arc;

use tokio::sync::{broadcast, RwLock};
use tokio_util::sync::CancellationToken;

use crate::aggregator::{Aggregator, StateSnapshot};
use crate::backend::{ArmBackend, BaseBackend, CameraBackend, GripperBackend};
use crate::config::Config;
use crate::crash_monitor::CrashMonitor;
use crate::event::FeedbackEvent;
use crate::gateway::CommandGateway;
use crate::lease::LeaseManager;
use crate::rewind::RewindOrchestrator;
use crate::safety_monitor::SafetyMonitor;
use crate::sandbox::SandboxManager;
use crate::supervisor::Supervisor;
use crate::trajectory::TrajectoryLog;

/// Number of past feedback events kept for `/logs` and `/rewind/logs`.
const EVENT_HISTORY_CAPACITY: usize = 200;

/// Default replay percentage for the dashboard-compatibility `/rewind/manual`
/// endpoint when the caller never overrides it via `PUT /rewind/config`.
const DEFAULT_MANUAL_REWIND_PERCENTAGE: f64 = 5.0;

pub struct Store {
    pub config: Config,
    pub lease: Arc<LeaseManager>,
    pub trajectory: Arc<RwLock<TrajectoryLog>>,
    pub aggregator: Arc<Aggregator>,
    pub rewind: Arc<RewindOrchestrator>,
    pub safety_monitor: Arc<SafetyMonitor>,
    pub crash_monitor: Arc<CrashMonitor>,
    pub sandbox: Arc<SandboxManager>,
    pub supervisor: Arc<dyn Supervisor>,
    pub gateway: CommandGateway,
    pub arm: Arc<dyn ArmBackend>,
    pub base: Arc<dyn BaseBackend>,
    pub gripper: Arc<dyn GripperBackend>,
    pub cameras: Arc<dyn CameraBackend>,

    /// Every feedback event, fanned out to `/ws/feedback` subscribers.
    pub events: broadcast::Sender<FeedbackEvent>,
    /// Periodic unified state snapshots, fanned out to `/ws/state` subscribers.
    pub state_tx: broadcast::Sender<StateSnapshot>,
    /// Thin relay for the external face-display feed: whatever a publisher
    /// sends on `/ws/display` is broadcast verbatim to every other subscriber.
    pub display_tx: broadcast::Sender<String>,
    /// Last message relayed on `/ws/display`, replayed to newly-connected
    /// subscribers so a late joiner doesn't see a blank display.
    pub last_display: RwLock<Option<String>>,

    /// Bounded tail of recent feedback events, backing `GET /logs` and
    /// `GET /rewind/logs`.
    pub logs: RwLock<VecDeque<FeedbackEvent>>,
    /// Replay percentage used by the dashboard-compatibility
    /// `POST /rewind/manual` endpoint.
    pub manual_rewind_percentage: RwLock<f64>,

    /// Cancelled on `POST /shutdown` or SIGTERM/SIGINT; every spawned loop
    /// and the HTTP server itself select on this.
    pub shutdown: CancellationToken,
}

impl Store {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        config: Config,
        lease: Arc<LeaseManager>,
        trajectory: Arc<RwLock<TrajectoryLog>>,
        aggregator: Arc<Aggregator>,
        rewind: Arc<RewindOrchestrator>,
        safety_monitor: Arc<SafetyMonitor>,
        crash_monitor: Arc<CrashMonitor>,
        sandbox: Arc<SandboxManager>,
        supervisor: Arc<dyn Supervisor>,
        gateway: CommandGateway,
        arm: Arc<dyn ArmBackend>,
        base: Arc<dyn BaseBackend>,
        gripper: Arc<dyn GripperBackend>,
        cameras: Arc<dyn CameraBackend>,
        events: broadcast::Sender<FeedbackEvent>,
        shutdown: CancellationToken,
    ) -> Self {
        let (state_tx, _) = broadcast::channel(64);
        let (display_tx, _) = broadcast::channel(64);
        Self {
            config,
            lease,
            trajectory,
            aggregator,
            rewind,
            safety_monitor,
            crash_monitor,
            sandbox,
            supervisor,
            gateway,
            arm,
            base,
            gripper,
            cameras,
            events,
            state_tx,
            display_tx,
            last_display: RwLock::new(None),
            logs: RwLock::new(VecDeque::with_capacity(EVENT_HISTORY_CAPACITY)),
            manual_rewind_percentage: RwLock::new(DEFAULT_MANUAL_REWIND_PERCENTAGE),
            shutdown,
        }
    }

    /// Append an event to the bounded history, dropping the oldest entry
    /// once at capacity. Driven by a background task subscribed to `events`.
    pub async fn push_log(&self, event: FeedbackEvent) {
        let mut logs = self.logs.write().await;
        logs.push_back(event);
        while logs.len() > EVENT_HISTORY_CAPACITY {
            logs.pop_front();
        }
    }

    pub async fn recent_logs(&self) -> Vec<FeedbackEvent> {
        self.logs.read().await.iter().cloned().collect()
    }

    /// Spawn the task that drains `events` into the bounded history buffer.
    pub fn spawn_log_subscriber(self: &Arc<Self>) {
        let this = Arc::clone(self);
        let mut rx = this.events.subscribe();
        let shutdown = this.shutdown.clone();
        tokio::spawn(async move {
            loop {
                tokio::select! {
                    _ = shutdown.cancelled() => break,
                    event = rx.recv() => {
                        match event {
                            Ok(event) => this.push_log(event).await,
                            Err(broadcast::error::RecvError::Lagged(_)) => continue,
                            Err(broadcast::error::RecvError::Closed) => break,
                        }
                    }
                }
            }
        });
    }

    /// Spawn the task that publishes periodic `/ws/state` snapshots at the
    /// configured observer rate.
    pub fn spawn_state_broadcaster(self: &Arc<Self>, interval: std::time::Duration) {
        let this = Arc::clone(self);
        let shutdown = this.shutdown.clone();
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(interval);
            loop {
                tokio::select! {
                    _ = shutdown.cancelled() => break,
                    _ = ticker.tick() => {
                        let snapshot = this.aggregator.snapshot().await;
                        let _ = this.state_tx.send(snapshot);
                    }
                }
            }
        });
    }
}

impl fmt::Debug for Store {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Store")
            .field("port", &self.config.port)
            .field("auth_enabled", &self.config.auth_token.is_some())
            .finish()
    }
}

#[cfg(test)]
#[path = "state_tests.rs"]
mod tests;
