// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use std::time::Duration;

use clap::Parser;

/// Robot control plane: lease arbitration, trajectory rewind, safety monitoring.
#[derive(Debug, Clone, Parser)]
#[command(name = "armd", version, about)]
pub struct Config {
    /// HTTP port to listen on.
    #[arg(long, env = "ARMD_PORT", default_value = "8080")]
    pub port: u16,

    /// Host address to bind to.
    #[arg(long, env = "ARMD_HOST", default_value = "0.0.0.0")]
    pub host: String,

    /// Bearer token for API authentication. Auth is disabled if unset.
    #[arg(long, env = "ARMD_AUTH_TOKEN")]
    pub auth_token: Option<String>,

    /// Log format (json or text).
    #[arg(long, env = "ARMD_LOG_FORMAT", default_value = "json")]
    pub log_format: String,

    /// Log level (trace, debug, info, warn, error).
    #[arg(long, env = "ARMD_LOG_LEVEL", default_value = "info")]
    pub log_level: String,

    // -- Trajectory log -----------------------------------------------------
    /// Maximum number of waypoints retained in the trajectory log.
    #[arg(long, env = "ARMD_MAX_WAYPOINTS", default_value = "10000")]
    pub max_waypoints: usize,

    /// Minimum seconds between recorded waypoints.
    #[arg(long, env = "ARMD_RECORD_INTERVAL_SECS", default_value = "0.1")]
    pub record_interval_secs: f64,

    /// Base position delta (meters) that forces a waypoint even before the interval elapses.
    #[arg(long, env = "ARMD_POSITION_THRESHOLD", default_value = "0.05")]
    pub position_threshold: f64,

    /// Base orientation delta (radians) that forces a waypoint.
    #[arg(long, env = "ARMD_ORIENTATION_THRESHOLD", default_value = "0.1")]
    pub orientation_threshold: f64,

    // -- State aggregator -----------------------------------------------------
    /// State poll rate in Hz.
    #[arg(long, env = "ARMD_BASE_POLL_HZ", default_value = "10")]
    pub base_poll_hz: f64,

    /// Minimum seconds between reconnect attempts per backend.
    #[arg(long, env = "ARMD_RECONNECT_INTERVAL_SECS", default_value = "5")]
    pub reconnect_interval_secs: f64,

    /// Observer `/ws/state` broadcast rate in Hz.
    #[arg(long, env = "ARMD_OBSERVER_STATE_HZ", default_value = "10")]
    pub observer_state_hz: f64,

    // -- Lease manager -----------------------------------------------------
    /// Seconds of inactivity before a lease is warned, then revoked.
    #[arg(long, env = "ARMD_IDLE_TIMEOUT_SECS", default_value = "120")]
    pub idle_timeout_secs: f64,

    /// Grace period after the idle warning before revocation.
    #[arg(long, env = "ARMD_WARNING_GRACE_SECS", default_value = "15")]
    pub warning_grace_secs: f64,

    /// Maximum lease duration regardless of activity.
    #[arg(long, env = "ARMD_MAX_LEASE_DURATION_SECS", default_value = "1800")]
    pub max_lease_duration_secs: f64,

    /// Idle/max-duration check interval.
    #[arg(long, env = "ARMD_LEASE_CHECK_INTERVAL_SECS", default_value = "1")]
    pub lease_check_interval_secs: f64,

    /// Reset the robot to home and clear the trajectory log on lease release.
    #[arg(long, env = "ARMD_RESET_ON_RELEASE", default_value = "true")]
    pub reset_on_release: bool,

    // -- Rewind orchestrator -----------------------------------------------------
    /// Waypoints replayed per rewind chunk.
    #[arg(long, env = "ARMD_REWIND_CHUNK_SIZE", default_value = "5")]
    pub rewind_chunk_size: usize,

    /// Seconds allotted to execute each rewind chunk.
    #[arg(long, env = "ARMD_REWIND_CHUNK_DURATION_SECS", default_value = "1.0")]
    pub rewind_chunk_duration_secs: f64,

    /// Arm joint-position command rate during rewind interpolation, in Hz.
    #[arg(long, env = "ARMD_REWIND_COMMAND_HZ", default_value = "50")]
    pub rewind_command_hz: f64,

    /// Base arrival tolerance during rewind chunk verification.
    #[arg(long, env = "ARMD_REWIND_SAFETY_MARGIN", default_value = "0.05")]
    pub rewind_safety_margin: f64,

    // -- Safety monitor -----------------------------------------------------
    /// Safety monitor tick interval.
    #[arg(long, env = "ARMD_MONITOR_INTERVAL_SECS", default_value = "0.5")]
    pub monitor_interval_secs: f64,

    /// Enable automatic rewind on boundary/collision detection.
    #[arg(long, env = "ARMD_AUTO_REWIND_ENABLED", default_value = "true")]
    pub auto_rewind_enabled: bool,

    /// Percentage of the trajectory log replayed by an automatic rewind.
    #[arg(long, env = "ARMD_AUTO_REWIND_PERCENTAGE", default_value = "10")]
    pub auto_rewind_percentage: u8,

    /// Minimum cooldown between automatic rewind triggers.
    #[arg(long, env = "ARMD_MONITOR_COOLDOWN_SECS", default_value = "3")]
    pub monitor_cooldown_secs: f64,

    /// Minimum commanded speed (m/s) considered for collision detection.
    #[arg(long, env = "ARMD_COLLISION_MIN_CMD_SPEED", default_value = "0.02")]
    pub collision_min_cmd_speed: f64,

    /// actual/commanded speed ratio below which collision is suspected.
    #[arg(long, env = "ARMD_COLLISION_VELOCITY_THRESHOLD", default_value = "0.2")]
    pub collision_velocity_threshold: f64,

    /// Seconds the ratio must stay low before a collision trigger fires.
    #[arg(long, env = "ARMD_COLLISION_GRACE_PERIOD_SECS", default_value = "0.5")]
    pub collision_grace_period_secs: f64,

    // -- Workspace / safety envelope -----------------------------------------------------
    #[arg(long, env = "ARMD_BASE_X_MIN", default_value = "-5.0")]
    pub base_x_min: f64,
    #[arg(long, env = "ARMD_BASE_X_MAX", default_value = "5.0")]
    pub base_x_max: f64,
    #[arg(long, env = "ARMD_BASE_Y_MIN", default_value = "-5.0")]
    pub base_y_min: f64,
    #[arg(long, env = "ARMD_BASE_Y_MAX", default_value = "5.0")]
    pub base_y_max: f64,
    #[arg(long, env = "ARMD_BASE_LINEAR_VEL_MAX", default_value = "1.0")]
    pub base_linear_vel_max: f64,
    #[arg(long, env = "ARMD_BASE_ANGULAR_VEL_MAX", default_value = "1.5")]
    pub base_angular_vel_max: f64,
    #[arg(long, env = "ARMD_ARM_X_MIN", default_value = "-1.0")]
    pub arm_x_min: f64,
    #[arg(long, env = "ARMD_ARM_X_MAX", default_value = "1.0")]
    pub arm_x_max: f64,
    #[arg(long, env = "ARMD_ARM_Y_MIN", default_value = "-1.0")]
    pub arm_y_min: f64,
    #[arg(long, env = "ARMD_ARM_Y_MAX", default_value = "1.0")]
    pub arm_y_max: f64,
    #[arg(long, env = "ARMD_ARM_Z_MIN", default_value = "0.0")]
    pub arm_z_min: f64,
    #[arg(long, env = "ARMD_ARM_Z_MAX", default_value = "1.5")]
    pub arm_z_max: f64,
    #[arg(long, env = "ARMD_ARM_JOINT_VEL_MAX", default_value = "2.0")]
    pub arm_joint_vel_max: f64,
    #[arg(long, env = "ARMD_GRIPPER_FORCE_MAX", default_value = "140.0")]
    pub gripper_force_max: f64,

    // -- Driver-crash monitor -----------------------------------------------------
    /// Seconds without a state publication before the arm driver is considered down.
    #[arg(long, env = "ARMD_ARM_DOWN_GRACE_SECS", default_value = "3")]
    pub arm_down_grace_secs: f64,

    /// Minimum seconds between recovery attempts.
    #[arg(long, env = "ARMD_RECOVERY_COOLDOWN_SECS", default_value = "10")]
    pub recovery_cooldown_secs: f64,

    /// Seconds to wait for the driver process to restart.
    #[arg(long, env = "ARMD_SERVER_START_TIMEOUT_SECS", default_value = "15")]
    pub server_start_timeout_secs: f64,

    // -- Code sandbox -----------------------------------------------------
    /// Default sandbox execution timeout in seconds.
    #[arg(long, env = "ARMD_SANDBOX_TIMEOUT_SECS", default_value = "300")]
    pub sandbox_timeout_secs: u64,

    /// Grace period between graceful and hard termination of a sandbox execution.
    #[arg(long, env = "ARMD_SANDBOX_KILL_GRACE_SECS", default_value = "2")]
    pub sandbox_kill_grace_secs: f64,

    /// Interpreter used to run submitted sandbox source.
    #[arg(long, env = "ARMD_SANDBOX_INTERPRETER", default_value = "python3")]
    pub sandbox_interpreter: String,

    // -- Process supervisor -----------------------------------------------------
    /// Path to the pid-file recording managed driver processes across restarts.
    #[arg(long, env = "ARMD_PID_FILE", default_value = "armd.pids.json")]
    pub pid_file: String,
}

impl Config {
    /// Validate the configuration after parsing.
    pub fn validate(&self) -> anyhow::Result<()> {
        if self.base_x_min >= self.base_x_max || self.base_y_min >= self.base_y_max {
            anyhow::bail!("base workspace bounds must be non-empty (min < max)");
        }
        if self.arm_x_min >= self.arm_x_max
            || self.arm_y_min >= self.arm_y_max
            || self.arm_z_min >= self.arm_z_max
        {
            anyhow::bail!("arm workspace bounds must be non-empty (min < max)");
        }
        if self.auto_rewind_percentage > 100 {
            anyhow::bail!("--auto-rewind-percentage must be within 0..=100");
        }
        if self.max_waypoints == 0 {
            anyhow::bail!("--max-waypoints must be at least 1");
        }
        if self.rewind_chunk_size == 0 {
            anyhow::bail!("--rewind-chunk-size must be at least 1");
        }
        if self.pid_file.trim().is_empty() {
            anyhow::bail!("--pid-file must not be empty");
        }
        Ok(())
    }

    pub fn record_interval(&self) -> Duration {
        Duration::from_secs_f64(self.record_interval_secs.max(0.0))
    }

    pub fn reconnect_interval(&self) -> Duration {
        Duration::from_secs_f64(self.reconnect_interval_secs.max(0.0))
    }

    pub fn base_poll_interval(&self) -> Duration {
        Duration::from_secs_f64((1.0 / self.base_poll_hz.max(0.001)).max(0.0))
    }

    pub fn idle_timeout(&self) -> Duration {
        Duration::from_secs_f64(self.idle_timeout_secs.max(0.0))
    }

    pub fn warning_grace(&self) -> Duration {
        Duration::from_secs_f64(self.warning_grace_secs.max(0.0))
    }

    pub fn max_lease_duration(&self) -> Duration {
        Duration::from_secs_f64(self.max_lease_duration_secs.max(0.0))
    }

    pub fn lease_check_interval(&self) -> Duration {
        Duration::from_secs_f64(self.lease_check_interval_secs.max(0.001))
    }

    pub fn rewind_chunk_duration(&self) -> Duration {
        Duration::from_secs_f64(self.rewind_chunk_duration_secs.max(0.001))
    }

    pub fn rewind_command_interval(&self) -> Duration {
        Duration::from_secs_f64(1.0 / self.rewind_command_hz.max(0.001))
    }

    pub fn monitor_interval(&self) -> Duration {
        Duration::from_secs_f64(self.monitor_interval_secs.max(0.001))
    }

    pub fn monitor_cooldown(&self) -> Duration {
        Duration::from_secs_f64(self.monitor_cooldown_secs.max(0.0))
    }

    pub fn collision_grace_period(&self) -> Duration {
        Duration::from_secs_f64(self.collision_grace_period_secs.max(0.0))
    }

    pub fn arm_down_grace(&self) -> Duration {
        Duration::from_secs_f64(self.arm_down_grace_secs.max(0.0))
    }

    pub fn recovery_cooldown(&self) -> Duration {
        Duration::from_secs_f64(self.recovery_cooldown_secs.max(0.0))
    }

    pub fn server_start_timeout(&self) -> Duration {
        Duration::from_secs_f64(self.server_start_timeout_secs.max(0.0))
    }

    pub fn sandbox_timeout(&self) -> Duration {
        Duration::from_secs(self.sandbox_timeout_secs)
    }

    pub fn sandbox_kill_grace(&self) -> Duration {
        Duration::from_secs_f64(self.sandbox_kill_grace_secs.max(0.0))
    }
}

#[cfg(test)]
#[path = "config_tests.rs"]
mod tests;
