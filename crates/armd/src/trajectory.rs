// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Bounded, time- and displacement-gated log of recorded robot waypoints.

use std::collections::VecDeque;

use serde::{Deserialize, Serialize};

/// A single recorded snapshot of base pose and arm joint angles.
///
/// Immutable once recorded. `t` is a monotonic seconds-since-start timestamp,
/// not a wall-clock time.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Waypoint {
    pub t: f64,
    pub base_pose: (f64, f64, f64),
    pub arm_q: [f64; 7],
    pub gripper_width: f64,
}

/// Fixed-capacity FIFO log of waypoints, gated by elapsed time or displacement.
#[derive(Debug)]
pub struct TrajectoryLog {
    buf: VecDeque<Waypoint>,
    capacity: usize,
    record_interval: f64,
    position_threshold: f64,
    orientation_threshold: f64,
}

impl TrajectoryLog {
    pub fn new(
        capacity: usize,
        record_interval: f64,
        position_threshold: f64,
        orientation_threshold: f64,
    ) -> Self {
        Self {
            buf: VecDeque::with_capacity(capacity.min(1024)),
            capacity,
            record_interval,
            position_threshold,
            orientation_threshold,
        }
    }

    /// Whether a new waypoint should be recorded given the last one.
    pub fn should_record(&self, candidate: &Waypoint) -> bool {
        let Some(last) = self.buf.back() else {
            return true;
        };
        if candidate.t - last.t >= self.record_interval {
            return true;
        }
        let (x0, y0, th0) = last.base_pose;
        let (x1, y1, th1) = candidate.base_pose;
        let dpos = ((x1 - x0).powi(2) + (y1 - y0).powi(2)).sqrt();
        let dth = angle_diff(th1, th0).abs();
        dpos > self.position_threshold || dth > self.orientation_threshold
    }

    /// Append a waypoint, discarding the oldest entry if at capacity.
    ///
    /// Caller is responsible for the gating decision via [`should_record`].
    pub fn append(&mut self, waypoint: Waypoint) {
        if self.buf.len() >= self.capacity {
            self.buf.pop_front();
        }
        self.buf.push_back(waypoint);
    }

    pub fn len(&self) -> usize {
        self.buf.len()
    }

    pub fn is_empty(&self) -> bool {
        self.buf.is_empty()
    }

    pub fn get(&self, idx: usize) -> Option<Waypoint> {
        self.buf.get(idx).copied()
    }

    /// Immutable snapshot of the full log, oldest first.
    pub fn snapshot(&self) -> Vec<Waypoint> {
        self.buf.iter().copied().collect()
    }

    /// Keep only the first `keep_n` waypoints.
    pub fn truncate(&mut self, keep_n: usize) {
        self.buf.truncate(keep_n);
    }

    pub fn clear(&mut self) {
        self.buf.clear();
    }

    /// Largest index whose base pose lies inside `bounds` (x_min, x_max, y_min, y_max).
    pub fn find_last_safe(&self, bounds: (f64, f64, f64, f64)) -> Option<usize> {
        let (x_min, x_max, y_min, y_max) = bounds;
        self.buf.iter().enumerate().rev().find_map(|(idx, wp)| {
            let (x, y, _) = wp.base_pose;
            (x >= x_min && x <= x_max && y >= y_min && y <= y_max).then_some(idx)
        })
    }
}

fn angle_diff(a: f64, b: f64) -> f64 {
    let mut d = a - b;
    while d > std::f64::consts::PI {
        d -= 2.0 * std::f64::consts::PI;
    }
    while d < -std::f64::consts::PI {
        d += 2.0 * std::f64::consts::PI;
    }
    d
}

#[cfg(test)]
#[path = "trajectory_tests.rs"]
mod tests;
