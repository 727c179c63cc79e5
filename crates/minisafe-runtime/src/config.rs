//! [`SupervisorConfig`] – tunables for one control session.
//!
//! All fields carry serde defaults, so an empty `[safety]` table (or none at
//! all) yields the stock behaviour.  Durations are stored as fractional
//! seconds to keep the TOML readable.

use std::time::Duration;

use minisafe_hal::{AttitudeSensor, DistanceSensor};
use minisafe_perception::{ProximitySource, Thresholds, TiltSource};
use minisafe_types::{Direction, SafetyError};
use serde::{Deserialize, Serialize};

/// Which sensor drives hazard evaluation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum HazardSourceKind {
    /// Forward distance sensor, obstacle avoidance.
    #[default]
    Proximity,
    /// Attitude sensor, posture recovery.
    Posture,
}

/// One leg of the return-to-dock route.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct RouteStep {
    pub direction: Direction,
    pub steps: u32,
}

impl RouteStep {
    pub const fn new(direction: Direction, steps: u32) -> Self {
        Self { direction, steps }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SupervisorConfig {
    #[serde(default)]
    pub hazard_source: HazardSourceKind,

    // Proximity thresholds.
    #[serde(default = "default_soft_distance_cm")]
    pub soft_distance_cm: f32,
    #[serde(default = "default_hard_distance_cm")]
    pub hard_distance_cm: f32,

    // Posture thresholds.
    #[serde(default = "default_warn_deg")]
    pub warn_deg: f32,
    #[serde(default = "default_hard_stop_trip_deg")]
    pub hard_stop_trip_deg: f32,

    // Filtering and debounce.
    #[serde(default = "default_filter_window_size")]
    pub filter_window_size: usize,
    #[serde(default = "default_confirm_count")]
    pub confirm_count: u32,
    /// When `true`, a hard reading must be confirmed like any other level
    /// before tripping.
    #[serde(default)]
    pub debounce_hard: bool,
    #[serde(default = "default_sensor_failure_limit")]
    pub sensor_failure_limit: u32,
    #[serde(default = "default_sensor_timeout_s")]
    pub sensor_timeout_s: f64,

    // Motion gateway.
    #[serde(default = "default_min_step")]
    pub min_step: u8,
    #[serde(default = "default_max_step")]
    pub max_step: u8,
    #[serde(default = "default_min_command_interval_s")]
    pub min_command_interval_s: f64,

    // Loop and maneuvers.
    #[serde(default = "default_tick_period_s")]
    pub tick_period_s: f64,
    #[serde(default = "default_cruise_steps")]
    pub cruise_steps: u32,
    #[serde(default = "default_avoid_backoff_steps")]
    pub avoid_backoff_steps: u32,
    #[serde(default = "default_avoid_turn_steps")]
    pub avoid_turn_steps: u32,
    #[serde(default = "default_hard_stop_backoff_steps")]
    pub hard_stop_backoff_steps: u32,
    /// Posture trip recovery: back off this far, then step forward
    /// `posture_settle_steps` to regain footing.
    #[serde(default = "default_posture_backoff_steps")]
    pub posture_backoff_steps: u32,
    #[serde(default = "default_posture_settle_steps")]
    pub posture_settle_steps: u32,
    #[serde(default = "default_max_recovery_attempts")]
    pub max_recovery_attempts: u32,

    // Battery and return.
    #[serde(default = "default_battery_low_percent")]
    pub battery_low_percent: u8,
    #[serde(default = "default_battery_check_interval_s")]
    pub battery_check_interval_s: f64,
    #[serde(default = "default_return_route")]
    pub return_route: Vec<RouteStep>,
}

fn default_soft_distance_cm() -> f32 {
    20.0
}
fn default_hard_distance_cm() -> f32 {
    8.0
}
fn default_warn_deg() -> f32 {
    10.0
}
fn default_hard_stop_trip_deg() -> f32 {
    18.0
}
fn default_filter_window_size() -> usize {
    3
}
fn default_confirm_count() -> u32 {
    2
}
fn default_sensor_failure_limit() -> u32 {
    5
}
fn default_sensor_timeout_s() -> f64 {
    1.0
}
fn default_min_step() -> u8 {
    1
}
fn default_max_step() -> u8 {
    6
}
fn default_min_command_interval_s() -> f64 {
    0.4
}
fn default_tick_period_s() -> f64 {
    0.5
}
fn default_cruise_steps() -> u32 {
    1
}
fn default_avoid_backoff_steps() -> u32 {
    2
}
fn default_avoid_turn_steps() -> u32 {
    2
}
fn default_hard_stop_backoff_steps() -> u32 {
    2
}
fn default_posture_backoff_steps() -> u32 {
    1
}
fn default_posture_settle_steps() -> u32 {
    1
}
fn default_max_recovery_attempts() -> u32 {
    3
}
fn default_battery_low_percent() -> u8 {
    20
}
fn default_battery_check_interval_s() -> f64 {
    5.0
}
fn default_return_route() -> Vec<RouteStep> {
    vec![
        RouteStep::new(Direction::Forward, 4),
        RouteStep::new(Direction::Left, 2),
        RouteStep::new(Direction::Forward, 6),
        RouteStep::new(Direction::Right, 2),
        RouteStep::new(Direction::Forward, 4),
    ]
}

impl Default for SupervisorConfig {
    fn default() -> Self {
        Self {
            hazard_source: HazardSourceKind::default(),
            soft_distance_cm: default_soft_distance_cm(),
            hard_distance_cm: default_hard_distance_cm(),
            warn_deg: default_warn_deg(),
            hard_stop_trip_deg: default_hard_stop_trip_deg(),
            filter_window_size: default_filter_window_size(),
            confirm_count: default_confirm_count(),
            debounce_hard: false,
            sensor_failure_limit: default_sensor_failure_limit(),
            sensor_timeout_s: default_sensor_timeout_s(),
            min_step: default_min_step(),
            max_step: default_max_step(),
            min_command_interval_s: default_min_command_interval_s(),
            tick_period_s: default_tick_period_s(),
            cruise_steps: default_cruise_steps(),
            avoid_backoff_steps: default_avoid_backoff_steps(),
            avoid_turn_steps: default_avoid_turn_steps(),
            hard_stop_backoff_steps: default_hard_stop_backoff_steps(),
            posture_backoff_steps: default_posture_backoff_steps(),
            posture_settle_steps: default_posture_settle_steps(),
            max_recovery_attempts: default_max_recovery_attempts(),
            battery_low_percent: default_battery_low_percent(),
            battery_check_interval_s: default_battery_check_interval_s(),
            return_route: default_return_route(),
        }
    }
}

fn seconds(name: &str, value: f64, allow_zero: bool) -> Result<Duration, SafetyError> {
    let ok = value.is_finite() && (value > 0.0 || (allow_zero && value == 0.0));
    if !ok {
        return Err(SafetyError::Config(format!(
            "{name} must be a {} number of seconds, got {value}",
            if allow_zero { "non-negative" } else { "positive" }
        )));
    }
    Duration::try_from_secs_f64(value)
        .map_err(|e| SafetyError::Config(format!("{name} out of range: {e}")))
}

impl SupervisorConfig {
    /// Reject configurations the supervisor cannot run with.
    ///
    /// # Errors
    ///
    /// [`SafetyError::Config`] naming the first offending field.
    pub fn validate(&self) -> Result<(), SafetyError> {
        if self.max_step < self.min_step {
            return Err(SafetyError::Config(format!(
                "max_step ({}) is below min_step ({})",
                self.max_step, self.min_step
            )));
        }
        if self.min_step == 0 {
            return Err(SafetyError::Config("min_step must be at least 1".into()));
        }
        if self.filter_window_size == 0 {
            return Err(SafetyError::Config(
                "filter_window_size must be at least 1".into(),
            ));
        }
        if self.confirm_count == 0 {
            return Err(SafetyError::Config("confirm_count must be at least 1".into()));
        }
        if self.sensor_failure_limit == 0 {
            return Err(SafetyError::Config(
                "sensor_failure_limit must be at least 1".into(),
            ));
        }
        self.proximity_thresholds()
            .validate()
            .map_err(SafetyError::Config)?;
        self.tilt_thresholds().validate().map_err(SafetyError::Config)?;
        if self.battery_low_percent > 100 {
            return Err(SafetyError::Config(format!(
                "battery_low_percent ({}) exceeds 100",
                self.battery_low_percent
            )));
        }
        seconds("tick_period_s", self.tick_period_s, false)?;
        seconds("sensor_timeout_s", self.sensor_timeout_s, false)?;
        seconds("battery_check_interval_s", self.battery_check_interval_s, false)?;
        seconds("min_command_interval_s", self.min_command_interval_s, true)?;
        Ok(())
    }

    pub fn proximity_thresholds(&self) -> Thresholds {
        Thresholds::Proximity {
            soft_cm: self.soft_distance_cm,
            hard_cm: self.hard_distance_cm,
        }
    }

    pub fn tilt_thresholds(&self) -> Thresholds {
        Thresholds::Tilt {
            warn_deg: self.warn_deg,
            trip_deg: self.hard_stop_trip_deg,
        }
    }

    /// Obstacle hazard source over `sensor`, tuned by this config.
    pub fn proximity_source(&self, sensor: Box<dyn DistanceSensor>) -> ProximitySource {
        ProximitySource::new(
            sensor,
            self.soft_distance_cm,
            self.hard_distance_cm,
            self.filter_window_size,
            self.confirm_count,
            self.sensor_failure_limit,
            self.sensor_timeout(),
        )
    }

    /// Posture hazard source over `sensor`, tuned by this config.
    pub fn tilt_source(&self, sensor: Box<dyn AttitudeSensor>) -> TiltSource {
        TiltSource::new(
            sensor,
            self.warn_deg,
            self.hard_stop_trip_deg,
            self.filter_window_size,
            self.confirm_count,
            self.sensor_failure_limit,
            self.sensor_timeout(),
        )
    }

    // The accessors below fall back to defaults for values `validate` rejects.

    pub fn tick_period(&self) -> Duration {
        seconds("tick_period_s", self.tick_period_s, false)
            .unwrap_or(Duration::from_millis(500))
    }

    pub fn sensor_timeout(&self) -> Duration {
        seconds("sensor_timeout_s", self.sensor_timeout_s, false)
            .unwrap_or(Duration::from_secs(1))
    }

    pub fn min_command_interval(&self) -> Duration {
        seconds("min_command_interval_s", self.min_command_interval_s, true)
            .unwrap_or(Duration::from_millis(400))
    }

    pub fn battery_check_interval(&self) -> Duration {
        seconds("battery_check_interval_s", self.battery_check_interval_s, false)
            .unwrap_or(Duration::from_secs(5))
    }
}
