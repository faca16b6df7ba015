// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use proptest::prelude::*;

use super::*;

fn wp(t: f64, x: f64, y: f64) -> Waypoint {
    Waypoint { t, base_pose: (x, y, 0.0), arm_q: [0.0; 7], gripper_width: 0.0 }
}

#[test]
fn bounded_by_capacity() {
    let mut log = TrajectoryLog::new(3, 0.0, 0.0, 0.0);
    for i in 0..10 {
        let w = wp(i as f64, i as f64, 0.0);
        if log.should_record(&w) {
            log.append(w);
        }
    }
    assert_eq!(log.len(), 3);
    assert_eq!(log.get(0).unwrap().t, 7.0);
    assert_eq!(log.get(2).unwrap().t, 9.0);
}

#[test]
fn gated_by_time_interval() {
    let mut log = TrajectoryLog::new(100, 1.0, 100.0, 100.0);
    log.append(wp(0.0, 0.0, 0.0));
    assert!(!log.should_record(&wp(0.5, 0.0, 0.0)));
    assert!(log.should_record(&wp(1.2, 0.0, 0.0)));
}

#[test]
fn gated_by_displacement() {
    let mut log = TrajectoryLog::new(100, 1000.0, 0.05, 0.1);
    log.append(wp(0.0, 0.0, 0.0));
    assert!(!log.should_record(&wp(0.01, 0.01, 0.0)));
    assert!(log.should_record(&wp(0.01, 0.2, 0.0)));
}

#[test]
fn find_last_safe_returns_newest_inside_bounds() {
    let mut log = TrajectoryLog::new(100, 0.0, 0.0, 0.0);
    for i in 0..5 {
        log.append(wp(i as f64, i as f64 * 0.5, 0.0));
    }
    // bounds admit x in [0, 1.0]; waypoints at x=0,0.5,1.0,1.5,2.0
    let idx = log.find_last_safe((0.0, 1.0, -1.0, 1.0));
    assert_eq!(idx, Some(2));
}

#[test]
fn find_last_safe_none_when_all_outside() {
    let mut log = TrajectoryLog::new(10, 0.0, 0.0, 0.0);
    log.append(wp(0.0, 10.0, 10.0));
    assert_eq!(log.find_last_safe((-1.0, 1.0, -1.0, 1.0)), None);
}

#[test]
fn truncate_and_clear() {
    let mut log = TrajectoryLog::new(10, 0.0, 0.0, 0.0);
    for i in 0..5 {
        log.append(wp(i as f64, 0.0, 0.0));
    }
    log.truncate(2);
    assert_eq!(log.len(), 2);
    log.clear();
    assert!(log.is_empty());
}

proptest! {
    #[test]
    fn never_exceeds_capacity(cap in 1usize..20, n in 0usize..200) {
        let mut log = TrajectoryLog::new(cap, 0.0, 0.0, 0.0);
        for i in 0..n {
            log.append(wp(i as f64, 0.0, 0.0));
            prop_assert!(log.len() <= cap);
        }
    }
}
