// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Exclusive-access lease manager: FIFO queue, idle/max-duration revocation,
//! and a `RESETTING` lifecycle hook run before the next holder is admitted.

use std::collections::VecDeque;
use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;
use std::time::{Duration, Instant};

use rand::RngCore;
use tokio::sync::{broadcast, oneshot, Mutex, RwLock};
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use crate::event::{FeedbackEvent, RevocationReason};
use crate::trajectory::TrajectoryLog;

/// Runs when the current lease ends and `reset_on_release` is configured.
/// Canonically: rewind to origin and clear the trajectory log.
///
/// Returns a boxed future rather than using `async fn in trait` so
/// `Arc<dyn LeaseHook>` remains object-safe, matching the `backend` module's
/// `BoxFut` pattern.
pub trait LeaseHook: Send + Sync {
    fn run(&self) -> Pin<Box<dyn Future<Output = anyhow::Result<()>> + Send + '_>>;
}

/// Capability the lease manager uses to learn the last time the robot moved,
/// decoupling it from the state aggregator (see design note on cyclic
/// references between monitors).
pub trait MotionClock: Send + Sync {
    fn last_moved_at(&self) -> Option<Instant>;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Phase {
    Free,
    Held,
    Resetting,
}

struct CurrentLease {
    lease_id: String,
    holder: String,
    granted_at: Instant,
    last_cmd_at: Instant,
    warned: bool,
}

struct QueueEntry {
    holder: String,
    tx: oneshot::Sender<AcquireOutcome>,
}

struct Inner {
    phase: Phase,
    current: Option<CurrentLease>,
    queue: VecDeque<QueueEntry>,
    paused: bool,
}

/// Outcome delivered to a caller of [`LeaseManager::acquire`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AcquireOutcome {
    Granted { lease_id: String },
    AlreadyHeld { lease_id: String },
}

/// Public status, deliberately excluding the lease id.
#[derive(Debug, Clone)]
pub struct LeaseStatus {
    pub holder: Option<String>,
    pub granted_at: Option<Instant>,
    pub resetting: bool,
    pub paused: bool,
    pub queue: Vec<QueuePosition>,
}

#[derive(Debug, Clone)]
pub struct QueuePosition {
    pub position: usize,
    pub holder: String,
}

pub struct LeaseManager {
    inner: Mutex<Inner>,
    events: broadcast::Sender<FeedbackEvent>,
    hook: Option<Arc<dyn LeaseHook>>,
    /// Cleared on every lease grant, per the trajectory log's documented
    /// lifecycle — a new holder never inherits the previous holder's replay.
    trajectory: Arc<RwLock<TrajectoryLog>>,
    reset_on_release: bool,
    idle_timeout: Duration,
    warning_grace: Duration,
    max_duration: Duration,
}

impl LeaseManager {
    pub fn new(
        events: broadcast::Sender<FeedbackEvent>,
        hook: Option<Arc<dyn LeaseHook>>,
        trajectory: Arc<RwLock<TrajectoryLog>>,
        reset_on_release: bool,
        idle_timeout: Duration,
        warning_grace: Duration,
        max_duration: Duration,
    ) -> Self {
        Self {
            inner: Mutex::new(Inner {
                phase: Phase::Free,
                current: None,
                queue: VecDeque::new(),
                paused: false,
            }),
            events,
            hook,
            trajectory,
            reset_on_release,
            idle_timeout,
            warning_grace,
            max_duration,
        }
    }

    fn emit(&self, event: FeedbackEvent) {
        let _ = self.events.send(event);
    }

    fn new_lease_id() -> String {
        let mut bytes = [0u8; 16];
        rand::rng().fill_bytes(&mut bytes);
        bytes.iter().map(|b| format!("{b:02x}")).collect()
    }

    /// Acquire the lease for `holder`. Resolves once granted; queues (and
    /// suspends) if the lease is held, resetting, or paused.
    pub async fn acquire(self: &Arc<Self>, holder: String) -> AcquireOutcome {
        let rx = {
            let mut inner = self.inner.lock().await;

            if let Some(ref current) = inner.current {
                if current.holder == holder {
                    return AcquireOutcome::AlreadyHeld { lease_id: current.lease_id.clone() };
                }
            }

            if inner.phase == Phase::Free && !inner.paused {
                let lease_id = Self::new_lease_id();
                let now = Instant::now();
                inner.current = Some(CurrentLease {
                    lease_id: lease_id.clone(),
                    holder: holder.clone(),
                    granted_at: now,
                    last_cmd_at: now,
                    warned: false,
                });
                inner.phase = Phase::Held;
                drop(inner);
                self.trajectory.write().await.clear();
                self.emit(FeedbackEvent::LeaseGranted { holder });
                return AcquireOutcome::Granted { lease_id };
            }

            let (tx, rx) = oneshot::channel();
            inner.queue.push_back(QueueEntry { holder, tx });
            rx
        };

        // Lock released before awaiting — a queued acquire never holds the
        // mutex while it waits for admission.
        rx.await.unwrap_or(AcquireOutcome::AlreadyHeld { lease_id: String::new() })
    }

    /// Release a held lease. Enters `RESETTING` if a hook is configured and
    /// `reset_on_release` is set; otherwise admits the queue head directly.
    pub async fn release(self: &Arc<Self>, lease_id: &str) -> bool {
        let should_reset = {
            let mut inner = self.inner.lock().await;
            let Some(ref current) = inner.current else { return false };
            if current.lease_id != lease_id {
                return false;
            }
            inner.current = None;
            let reset = self.reset_on_release && self.hook.is_some();
            inner.phase = if reset { Phase::Resetting } else { Phase::Free };
            reset
        };

        if should_reset {
            self.run_reset_then_admit().await;
        } else {
            self.admit_next().await;
        }
        true
    }

    /// Refresh the activity timestamp for the current lease.
    pub async fn extend(&self, lease_id: &str) -> bool {
        let mut inner = self.inner.lock().await;
        match inner.current.as_mut() {
            Some(current) if current.lease_id == lease_id => {
                current.last_cmd_at = Instant::now();
                current.warned = false;
                true
            }
            _ => false,
        }
    }

    /// Called by the command gateway on every successful command.
    pub async fn record_command(&self, lease_id: &str) {
        self.extend(lease_id).await;
    }

    pub async fn validate_lease(&self, lease_id: &str) -> bool {
        let inner = self.inner.lock().await;
        inner.current.as_ref().is_some_and(|c| c.lease_id == lease_id)
    }

    /// Time left before `lease_id` hits `max_duration`, or `None` if it isn't
    /// the current holder. Used to cap long-running work (sandbox execution)
    /// to what's left on the lease rather than letting it outlive it.
    pub async fn remaining_duration(&self, lease_id: &str) -> Option<Duration> {
        let inner = self.inner.lock().await;
        let current = inner.current.as_ref()?;
        if current.lease_id != lease_id {
            return None;
        }
        Some(self.max_duration.saturating_sub(current.granted_at.elapsed()))
    }

    pub async fn status(&self) -> LeaseStatus {
        let inner = self.inner.lock().await;
        LeaseStatus {
            holder: inner.current.as_ref().map(|c| c.holder.clone()),
            granted_at: inner.current.as_ref().map(|c| c.granted_at),
            resetting: inner.phase == Phase::Resetting,
            paused: inner.paused,
            queue: inner
                .queue
                .iter()
                .enumerate()
                .map(|(i, e)| QueuePosition { position: i + 1, holder: e.holder.clone() })
                .collect(),
        }
    }

    /// Cancel all queued entries and revoke the current lease, if any.
    pub async fn clear_queue(self: &Arc<Self>) {
        let had_current = {
            let mut inner = self.inner.lock().await;
            inner.queue.clear();
            inner.current.is_some()
        };
        if had_current {
            self.revoke(RevocationReason::QueueCleared).await;
        }
    }

    pub async fn pause_queue(&self) {
        self.inner.lock().await.paused = true;
    }

    pub async fn resume_queue(self: &Arc<Self>) {
        {
            self.inner.lock().await.paused = false;
        }
        self.admit_next().await;
    }

    /// Revoke the current lease (idle timeout, max duration, or queue clear).
    pub async fn revoke(self: &Arc<Self>, reason: RevocationReason) {
        let should_reset = {
            let mut inner = self.inner.lock().await;
            if inner.current.is_none() {
                return;
            }
            inner.current = None;
            let reset = self.reset_on_release && self.hook.is_some();
            inner.phase = if reset { Phase::Resetting } else { Phase::Free };
            reset
        };
        self.emit(FeedbackEvent::LeaseRevoked { reason });
        if should_reset {
            self.run_reset_then_admit().await;
        } else {
            self.admit_next().await;
        }
    }

    async fn run_reset_then_admit(self: &Arc<Self>) {
        self.emit(FeedbackEvent::ResettingToHome);
        let Some(hook) = self.hook.clone() else {
            self.finish_resetting().await;
            return;
        };
        let this = Arc::clone(self);
        tokio::spawn(async move {
            match hook.run().await {
                Ok(()) => this.emit(FeedbackEvent::ResetComplete),
                Err(e) => {
                    warn!("lease reset hook failed: {e:#}");
                    this.emit(FeedbackEvent::ResetFailed { detail: e.to_string() });
                }
            }
            // Admit the next holder even on hook failure — see design note:
            // never deadlock the queue behind a failed reset.
            this.finish_resetting().await;
        });
    }

    async fn finish_resetting(self: &Arc<Self>) {
        {
            let mut inner = self.inner.lock().await;
            inner.phase = Phase::Free;
        }
        self.admit_next().await;
    }

    async fn admit_next(self: &Arc<Self>) {
        loop {
            let mut inner = self.inner.lock().await;
            if inner.phase != Phase::Free || inner.paused {
                return;
            }
            let Some(entry) = inner.queue.pop_front() else { return };
            let lease_id = Self::new_lease_id();
            let now = Instant::now();
            inner.current = Some(CurrentLease {
                lease_id: lease_id.clone(),
                holder: entry.holder.clone(),
                granted_at: now,
                last_cmd_at: now,
                warned: false,
            });
            inner.phase = Phase::Held;
            drop(inner);

            match entry.tx.send(AcquireOutcome::Granted { lease_id: lease_id.clone() }) {
                Ok(()) => {
                    self.trajectory.write().await.clear();
                    self.emit(FeedbackEvent::LeaseGranted { holder: entry.holder });
                    return;
                }
                Err(_) => {
                    // Caller went away (request cancelled); revoke and try the
                    // next queue entry instead of leaving an orphaned lease.
                    let mut inner = self.inner.lock().await;
                    inner.current = None;
                    inner.phase = Phase::Free;
                    continue;
                }
            }
        }
    }

    /// Periodic idle/max-duration check. Spawn as a task at `check_interval`.
    pub async fn check_idle(self: &Arc<Self>, motion: &dyn MotionClock) {
        let (warn_now, revoke_now) = {
            let mut inner = self.inner.lock().await;
            let Some(current) = inner.current.as_mut() else { return };

            if current.granted_at.elapsed() >= self.max_duration {
                (false, true)
            } else {
                let last_activity =
                    current.last_cmd_at.max(motion.last_moved_at().unwrap_or(current.last_cmd_at));
                let idle = last_activity.elapsed();
                if idle >= self.idle_timeout + self.warning_grace {
                    (false, true)
                } else if idle >= self.idle_timeout && !current.warned {
                    current.warned = true;
                    (true, false)
                } else {
                    (false, false)
                }
            }
        };

        if warn_now {
            let remaining = self.warning_grace.as_secs_f64();
            info!("lease idle warning, {remaining}s until revocation");
            self.emit(FeedbackEvent::LeaseWarning { seconds_remaining: remaining });
        }
        if revoke_now {
            let reason = {
                let inner = self.inner.lock().await;
                let elapsed_duration =
                    inner.current.as_ref().map(|c| c.granted_at.elapsed()).unwrap_or_default();
                if elapsed_duration >= self.max_duration {
                    RevocationReason::MaxDuration
                } else {
                    RevocationReason::IdleTimeout
                }
            };
            self.revoke(reason).await;
        }
    }

    /// Spawn the periodic idle checker; stops when `shutdown` is cancelled.
    pub fn spawn_idle_checker(
        self: &Arc<Self>,
        motion: Arc<dyn MotionClock>,
        interval: Duration,
        shutdown: CancellationToken,
    ) {
        let this = Arc::clone(self);
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(interval);
            loop {
                tokio::select! {
                    _ = shutdown.cancelled() => break,
                    _ = ticker.tick() => this.check_idle(motion.as_ref()).await,
                }
            }
        });
    }
}

#[cfg(test)]
#[path = "lease_tests.rs"]
mod tests;
