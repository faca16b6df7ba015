// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! In-memory backend implementations, used by tests and by `--mock` local runs.

use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Mutex as SyncMutex, PoisonError};
use std::time::Instant;

use tokio::sync::Mutex;

use super::{
    ArmBackend, ArmState, Backend, BaseBackend, BaseCommandMode, BaseState, CameraBackend,
    CameraFrame, CameraIntrinsics, Frame, GripperBackend, GripperState, ARM_HOME_Q,
};

/// Recovers a std [`SyncMutex`] guard across a poison rather than panicking —
/// used only for the handful of fields the [`BaseBackend`] trait requires
/// synchronous (non-async) access to; everywhere else uses `tokio::sync::Mutex`.
fn recover<T>(result: Result<T, std::sync::PoisonError<T>>) -> T {
    result.unwrap_or_else(PoisonError::into_inner)
}

/// A trivial kinematic arm simulator: commands are applied instantaneously.
pub struct MockArm {
    connected: AtomicBool,
    state: Mutex<ArmState>,
    state_count: AtomicU64,
}

impl Default for MockArm {
    fn default() -> Self {
        let mut state = ArmState { q: ARM_HOME_Q, ..Default::default() };
        state.ee_pose[12] = 0.3;
        state.ee_pose[14] = 0.4;
        Self {
            connected: AtomicBool::new(true),
            state: Mutex::new(state),
            state_count: AtomicU64::new(0),
        }
    }
}

impl Backend for MockArm {
    fn connect(&self) -> super::BoxFut<'_, anyhow::Result<()>> {
        Box::pin(async {
            self.connected.store(true, Ordering::Release);
            Ok(())
        })
    }

    fn disconnect(&self) -> super::BoxFut<'_, ()> {
        Box::pin(async { self.connected.store(false, Ordering::Release) })
    }

    fn is_connected(&self) -> bool {
        self.connected.load(Ordering::Acquire)
    }
}

impl ArmBackend for MockArm {
    fn get_state(&self) -> super::BoxFut<'_, anyhow::Result<ArmState>> {
        Box::pin(async {
            self.state_count.fetch_add(1, Ordering::Relaxed);
            Ok(*self.state.lock().await)
        })
    }

    fn send_joint_position(&self, q: [f64; 7]) -> super::BoxFut<'_, anyhow::Result<()>> {
        Box::pin(async move {
            let mut state = self.state.lock().await;
            state.dq = std::array::from_fn(|i| q[i] - state.q[i]);
            state.q = q;
            Ok(())
        })
    }

    fn send_cartesian_pose(&self, pose16: [f64; 16]) -> super::BoxFut<'_, anyhow::Result<()>> {
        Box::pin(async move {
            let mut state = self.state.lock().await;
            state.ee_pose = pose16;
            Ok(())
        })
    }

    fn send_joint_velocity(&self, dq: [f64; 7]) -> super::BoxFut<'_, anyhow::Result<()>> {
        Box::pin(async move {
            let mut state = self.state.lock().await;
            state.dq = dq;
            Ok(())
        })
    }

    fn send_cartesian_velocity(&self, _vel6: [f64; 6]) -> super::BoxFut<'_, anyhow::Result<()>> {
        Box::pin(async { Ok(()) })
    }

    fn emergency_stop(&self) -> super::BoxFut<'_, anyhow::Result<()>> {
        Box::pin(async {
            let mut state = self.state.lock().await;
            state.dq = [0.0; 7];
            Ok(())
        })
    }

    fn state_count(&self) -> u64 {
        self.state_count.load(Ordering::Relaxed)
    }
}

/// A trivial base simulator: `execute_action` teleports, velocity is tracked only.
pub struct MockBase {
    connected: AtomicBool,
    state: Mutex<BaseState>,
    last_mode: SyncMutex<Option<BaseCommandMode>>,
    last_cmd_at: SyncMutex<Option<Instant>>,
    last_cmd_velocity: SyncMutex<Option<(f64, f64, f64)>>,
}

impl Default for MockBase {
    fn default() -> Self {
        Self {
            connected: AtomicBool::new(true),
            state: Mutex::new(BaseState::default()),
            last_mode: SyncMutex::new(None),
            last_cmd_at: SyncMutex::new(None),
            last_cmd_velocity: SyncMutex::new(None),
        }
    }
}

impl Backend for MockBase {
    fn connect(&self) -> super::BoxFut<'_, anyhow::Result<()>> {
        Box::pin(async {
            self.connected.store(true, Ordering::Release);
            Ok(())
        })
    }

    fn disconnect(&self) -> super::BoxFut<'_, ()> {
        Box::pin(async { self.connected.store(false, Ordering::Release) })
    }

    fn is_connected(&self) -> bool {
        self.connected.load(Ordering::Acquire)
    }
}

impl BaseBackend for MockBase {
    fn get_state(&self) -> super::BoxFut<'_, anyhow::Result<BaseState>> {
        Box::pin(async { Ok(*self.state.lock().await) })
    }

    fn execute_action(&self, x: f64, y: f64, theta: f64) -> super::BoxFut<'_, anyhow::Result<()>> {
        Box::pin(async move {
            self.state.lock().await.pose = (x, y, theta);
            *recover(self.last_mode.lock()) = Some(BaseCommandMode::Position);
            *recover(self.last_cmd_at.lock()) = Some(Instant::now());
            Ok(())
        })
    }

    fn set_target_velocity(
        &self,
        vx: f64,
        vy: f64,
        omega: f64,
        _frame: Frame,
    ) -> super::BoxFut<'_, anyhow::Result<()>> {
        Box::pin(async move {
            self.state.lock().await.velocity = (vx, vy, omega);
            *recover(self.last_mode.lock()) = Some(BaseCommandMode::Velocity);
            *recover(self.last_cmd_at.lock()) = Some(Instant::now());
            *recover(self.last_cmd_velocity.lock()) = Some((vx, vy, omega));
            Ok(())
        })
    }

    fn stop(&self) -> super::BoxFut<'_, anyhow::Result<()>> {
        Box::pin(async {
            self.state.lock().await.velocity = (0.0, 0.0, 0.0);
            Ok(())
        })
    }

    fn reset(&self) -> super::BoxFut<'_, anyhow::Result<()>> {
        Box::pin(async {
            *self.state.lock().await = BaseState::default();
            Ok(())
        })
    }

    fn last_command_mode(&self) -> Option<BaseCommandMode> {
        *recover(self.last_mode.lock())
    }

    fn last_command_at(&self) -> Option<Instant> {
        *recover(self.last_cmd_at.lock())
    }

    fn last_commanded_velocity(&self) -> Option<(f64, f64, f64)> {
        *recover(self.last_cmd_velocity.lock())
    }
}

/// A trivial gripper simulator.
pub struct MockGripper {
    connected: AtomicBool,
    state: Mutex<GripperState>,
}

impl Default for MockGripper {
    fn default() -> Self {
        Self {
            connected: AtomicBool::new(true),
            state: Mutex::new(GripperState { position: 0, width: 0.085, ..Default::default() }),
        }
    }
}

impl Backend for MockGripper {
    fn connect(&self) -> super::BoxFut<'_, anyhow::Result<()>> {
        Box::pin(async {
            self.connected.store(true, Ordering::Release);
            Ok(())
        })
    }

    fn disconnect(&self) -> super::BoxFut<'_, ()> {
        Box::pin(async { self.connected.store(false, Ordering::Release) })
    }

    fn is_connected(&self) -> bool {
        self.connected.load(Ordering::Acquire)
    }
}

impl GripperBackend for MockGripper {
    fn get_state(&self) -> super::BoxFut<'_, anyhow::Result<GripperState>> {
        Box::pin(async { Ok(*self.state.lock().await) })
    }

    fn activate(&self) -> super::BoxFut<'_, anyhow::Result<()>> {
        Box::pin(async { Ok(()) })
    }

    fn move_to(&self, position: u8, _speed: u8, _force: u8) -> super::BoxFut<'_, anyhow::Result<(u8, bool)>> {
        Box::pin(async move {
            let mut state = self.state.lock().await;
            state.position = position;
            state.width = (255 - position) as f64 / 255.0 * 0.085;
            Ok((state.position, state.object_detected))
        })
    }

    fn open(&self) -> super::BoxFut<'_, anyhow::Result<()>> {
        Box::pin(async { self.move_to(0, 255, 0).await.map(|_| ()) })
    }

    fn close(&self) -> super::BoxFut<'_, anyhow::Result<()>> {
        Box::pin(async { self.move_to(255, 255, 0).await.map(|_| ()) })
    }

    fn grasp(&self) -> super::BoxFut<'_, anyhow::Result<()>> {
        Box::pin(async {
            self.state.lock().await.object_detected = true;
            Ok(())
        })
    }

    fn stop(&self) -> super::BoxFut<'_, anyhow::Result<()>> {
        Box::pin(async { Ok(()) })
    }

    fn calibrate(&self) -> super::BoxFut<'_, anyhow::Result<()>> {
        Box::pin(async { Ok(()) })
    }
}

/// A fixed one-camera passthrough: returns a tiny static JPEG-shaped blob.
pub struct MockCamera {
    connected: AtomicBool,
    ids: Vec<String>,
}

impl Default for MockCamera {
    fn default() -> Self {
        Self { connected: AtomicBool::new(true), ids: vec!["front".to_owned()] }
    }
}

impl Backend for MockCamera {
    fn connect(&self) -> super::BoxFut<'_, anyhow::Result<()>> {
        Box::pin(async {
            self.connected.store(true, Ordering::Release);
            Ok(())
        })
    }

    fn disconnect(&self) -> super::BoxFut<'_, ()> {
        Box::pin(async { self.connected.store(false, Ordering::Release) })
    }

    fn is_connected(&self) -> bool {
        self.connected.load(Ordering::Acquire)
    }
}

impl CameraBackend for MockCamera {
    fn list_ids(&self) -> Vec<String> {
        self.ids.clone()
    }

    fn get_frame(&self, id: &str) -> super::BoxFut<'_, anyhow::Result<CameraFrame>> {
        let id = id.to_owned();
        Box::pin(async move {
            if !self.ids.contains(&id) {
                anyhow::bail!("no such camera: {id}");
            }
            Ok(CameraFrame { content_type: "image/jpeg", data: vec![0xff, 0xd8, 0xff, 0xd9] })
        })
    }

    fn get_intrinsics(&self, id: &str) -> super::BoxFut<'_, anyhow::Result<CameraIntrinsics>> {
        let id = id.to_owned();
        Box::pin(async move {
            if !self.ids.contains(&id) {
                anyhow::bail!("no such camera: {id}");
            }
            Ok(CameraIntrinsics { fx: 600.0, fy: 600.0, cx: 320.0, cy: 240.0, width: 640, height: 480 })
        })
    }
}

#[cfg(test)]
#[path = "mock_tests.rs"]
mod tests;
