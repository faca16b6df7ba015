// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use clap::Parser;

use super::*;

fn base_args() -> Vec<&'static str> {
    vec!["armd"]
}

#[test]
fn defaults_validate() {
    let cfg = Config::parse_from(base_args());
    assert!(cfg.validate().is_ok());
}

#[test]
fn rejects_inverted_base_bounds() {
    let mut cfg = Config::parse_from(base_args());
    cfg.base_x_min = 5.0;
    cfg.base_x_max = -5.0;
    assert!(cfg.validate().is_err());
}

#[test]
fn rejects_out_of_range_rewind_percentage() {
    let mut cfg = Config::parse_from(base_args());
    cfg.auto_rewind_percentage = 150;
    assert!(cfg.validate().is_err());
}

#[test]
fn rejects_zero_max_waypoints() {
    let mut cfg = Config::parse_from(base_args());
    cfg.max_waypoints = 0;
    assert!(cfg.validate().is_err());
}

#[test]
fn durations_convert_without_panicking() {
    let cfg = Config::parse_from(base_args());
    assert!(cfg.record_interval().as_secs_f64() > 0.0);
    assert!(cfg.base_poll_interval().as_secs_f64() > 0.0);
    assert!(cfg.rewind_command_interval().as_secs_f64() > 0.0);
}
