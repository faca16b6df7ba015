// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Safety monitor: periodic boundary and collision checks with a latched
//! status and a cooldown-gated automatic rewind trigger.

use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use serde::{Deserialize, Serialize};
use tokio::sync::RwLock;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use crate::aggregator::Aggregator;
use crate::backend::BaseBackend;
use crate::rewind::{Component, RewindOrchestrator, RewindRequest, RewindTarget};

/// Mutable, hot-reloadable knobs; read atomically each tick.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SafetyMonitorConfig {
    pub auto_rewind_enabled: bool,
    pub auto_rewind_percentage: f64,
    pub workspace_bounds: (f64, f64, f64, f64),
    pub collision_min_cmd_speed: f64,
    pub collision_velocity_threshold: f64,
    pub collision_grace_period: Duration,
    pub cooldown: Duration,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TriggerReason {
    Boundary,
    Collision,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SafetyMonitorStatus {
    pub boundary_latched: bool,
    pub collision_latched: bool,
    pub auto_rewind_count: u32,
    pub last_trigger_reason: Option<TriggerReason>,
}

pub struct SafetyMonitor {
    config: RwLock<SafetyMonitorConfig>,
    aggregator: Arc<Aggregator>,
    base: Arc<dyn BaseBackend>,
    rewind: Arc<RewindOrchestrator>,
    boundary_latched: AtomicBool,
    collision_latched: AtomicBool,
    collision_bad_since: RwLock<Option<Instant>>,
    auto_rewind_count: AtomicU32,
    last_trigger_at: RwLock<Option<Instant>>,
    last_trigger_reason: RwLock<Option<TriggerReason>>,
    /// Suppressed while the driver-crash monitor is actively recovering —
    /// see the pre-emption policy coordinating these two monitors.
    crash_recovering: Arc<AtomicBool>,
}

impl SafetyMonitor {
    pub fn new(
        config: SafetyMonitorConfig,
        aggregator: Arc<Aggregator>,
        base: Arc<dyn BaseBackend>,
        rewind: Arc<RewindOrchestrator>,
        crash_recovering: Arc<AtomicBool>,
    ) -> Self {
        Self {
            config: RwLock::new(config),
            aggregator,
            base,
            rewind,
            boundary_latched: AtomicBool::new(false),
            collision_latched: AtomicBool::new(false),
            collision_bad_since: RwLock::new(None),
            auto_rewind_count: AtomicU32::new(0),
            last_trigger_at: RwLock::new(None),
            last_trigger_reason: RwLock::new(None),
            crash_recovering,
        }
    }

    /// Current hot-reloadable knobs, read fresh by the monitor-status endpoint.
    pub async fn config(&self) -> SafetyMonitorConfig {
        self.config.read().await.clone()
    }

    pub async fn set_config(&self, config: SafetyMonitorConfig) {
        *self.config.write().await = config;
    }

    pub async fn status(&self) -> SafetyMonitorStatus {
        SafetyMonitorStatus {
            boundary_latched: self.boundary_latched.load(Ordering::Relaxed),
            collision_latched: self.collision_latched.load(Ordering::Relaxed),
            auto_rewind_count: self.auto_rewind_count.load(Ordering::Relaxed),
            last_trigger_reason: *self.last_trigger_reason.read().await,
        }
    }

    pub async fn tick(&self) {
        let config = self.config.read().await.clone();
        if !config.auto_rewind_enabled || self.rewind.is_rewinding() || self.crash_recovering.load(Ordering::Acquire) {
            return;
        }

        let snapshot = self.aggregator.snapshot().await;
        let (x, y, _) = snapshot.base.pose;
        let (x_min, x_max, y_min, y_max) = config.workspace_bounds;
        let out_of_bounds = x < x_min || x > x_max || y < y_min || y > y_max;
        self.boundary_latched.store(out_of_bounds, Ordering::Relaxed);

        let collision = self.check_collision(&config, &snapshot).await;
        self.collision_latched.store(collision, Ordering::Relaxed);

        let trigger = if out_of_bounds {
            Some(TriggerReason::Boundary)
        } else if collision {
            Some(TriggerReason::Collision)
        } else {
            None
        };

        if let Some(reason) = trigger {
            self.maybe_trigger(reason, config.auto_rewind_percentage, config.cooldown).await;
        }
    }

    async fn check_collision(
        &self,
        config: &SafetyMonitorConfig,
        snapshot: &crate::aggregator::StateSnapshot,
    ) -> bool {
        let Some(mode) = self.base.last_command_mode() else { return false };
        if mode != crate::backend::BaseCommandMode::Velocity {
            self.reset_collision_timer().await;
            return false;
        }
        let Some(cmd_at) = self.base.last_command_at() else {
            self.reset_collision_timer().await;
            return false;
        };
        if cmd_at.elapsed() >= Duration::from_secs(1) {
            self.reset_collision_timer().await;
            return false;
        }
        let Some((cmd_vx, cmd_vy, _)) = self.base.last_commanded_velocity() else {
            self.reset_collision_timer().await;
            return false;
        };
        let cmd_speed = (cmd_vx * cmd_vx + cmd_vy * cmd_vy).sqrt();
        if cmd_speed < config.collision_min_cmd_speed {
            self.reset_collision_timer().await;
            return false;
        }
        let (avx, avy, _) = snapshot.base.velocity;
        let actual_speed = (avx * avx + avy * avy).sqrt();
        let ratio = actual_speed / cmd_speed;

        if ratio < config.collision_velocity_threshold {
            let mut since = self.collision_bad_since.write().await;
            let started = *since.get_or_insert_with(Instant::now);
            started.elapsed() >= config.collision_grace_period
        } else {
            self.reset_collision_timer().await;
            false
        }
    }

    async fn reset_collision_timer(&self) {
        *self.collision_bad_since.write().await = None;
    }

    async fn maybe_trigger(&self, reason: TriggerReason, percentage: f64, cooldown: Duration) {
        {
            let last = self.last_trigger_at.read().await;
            if let Some(t) = *last {
                if t.elapsed() < cooldown {
                    return;
                }
            }
        }
        *self.last_trigger_at.write().await = Some(Instant::now());
        *self.last_trigger_reason.write().await = Some(reason);

        warn!("safety monitor triggered: {reason:?}");
        if let Err(e) = self.base.stop().await {
            warn!("safety monitor base stop failed: {e:#}");
        }

        let rewind = Arc::clone(&self.rewind);
        self.auto_rewind_count.fetch_add(1, Ordering::Relaxed);
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
        info!("safety monitor running");
    }
}

#[cfg(test)]
#[path = "safety_monitor_tests.rs"]
mod tests;
