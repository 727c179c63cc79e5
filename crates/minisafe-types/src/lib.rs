use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use uuid::Uuid;

/// Direction of a single stepped move, as understood by the robot's walking
/// controller.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Direction {
    Forward,
    Backward,
    Left,
    Right,
}

impl fmt::Display for Direction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Direction::Forward => write!(f, "forward"),
            Direction::Backward => write!(f, "backward"),
            Direction::Left => write!(f, "left"),
            Direction::Right => write!(f, "right"),
        }
    }
}

/// The unit of communication with the actuator adapter: a direction plus a
/// step count that has already been clamped by the motion gateway.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct CommandEnvelope {
    pub direction: Direction,
    pub steps: u8,
}

impl CommandEnvelope {
    pub fn new(direction: Direction, steps: u8) -> Self {
        Self { direction, steps }
    }
}

/// Hazard classification of a filtered sensor value.
///
/// Variants are ordered by severity, so `Hard > Soft > Clear`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum HazardLevel {
    /// Nothing within the soft threshold.
    Clear,
    /// Within the soft (warning) threshold.
    Soft,
    /// Within the hard (trip) threshold.
    Hard,
}

impl HazardLevel {
    /// All levels, in severity order.
    pub const ALL: [HazardLevel; 3] = [HazardLevel::Clear, HazardLevel::Soft, HazardLevel::Hard];

    /// Dense index used by per-level counters.
    pub fn index(self) -> usize {
        match self {
            HazardLevel::Clear => 0,
            HazardLevel::Soft => 1,
            HazardLevel::Hard => 2,
        }
    }
}

/// The supervisor's safety state.  Exactly one instance exists per control
/// session and only the supervisor writes it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum SafetyState {
    /// Autonomous operation, path clear.
    Normal,
    /// Executing an avoidance maneuver after a confirmed soft hazard.
    Avoiding,
    /// Tripped by a hard hazard; recovery maneuver in progress.
    HardStopped,
    /// Operator holds manual control; autonomous hazard evaluation suspended.
    Overridden,
    /// Driving the fixed return route to the dock.
    Returning,
    /// Terminal: no further motion is dispatched.
    EStopped,
}

impl SafetyState {
    /// `true` for the only state the supervisor cannot leave on its own.
    pub fn is_terminal(self) -> bool {
        matches!(self, SafetyState::EStopped)
    }

    /// `true` for states in which the supervisor evaluates hazards.
    pub fn is_autonomous(self) -> bool {
        matches!(
            self,
            SafetyState::Normal | SafetyState::Avoiding | SafetyState::HardStopped
        )
    }
}

impl fmt::Display for SafetyState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            SafetyState::Normal => "NORMAL",
            SafetyState::Avoiding => "AVOIDING",
            SafetyState::HardStopped => "HARD-STOP",
            SafetyState::Overridden => "OVERRIDE",
            SafetyState::Returning => "RETURNING",
            SafetyState::EStopped => "E-STOP",
        };
        f.write_str(name)
    }
}

/// A single raw reading captured from a sensor adapter.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub enum Reading {
    /// Proximity in centimetres.
    DistanceCm(f32),
    /// Body attitude in degrees.
    Attitude { pitch_deg: f32, roll_deg: f32 },
}

/// A timestamped, immutable sensor reading.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct SensorSample {
    pub captured_at: DateTime<Utc>,
    pub reading: Reading,
}

impl SensorSample {
    /// Capture `reading` with the current wall-clock time.
    pub fn now(reading: Reading) -> Self {
        Self {
            captured_at: Utc::now(),
            reading,
        }
    }

    /// The scalar the filter operates on: the distance itself, or the larger
    /// of `|pitch|` and `|roll|` for attitude readings.
    pub fn magnitude(&self) -> f32 {
        match self.reading {
            Reading::DistanceCm(cm) => cm,
            Reading::Attitude {
                pitch_deg,
                roll_deg,
            } => {
                if pitch_deg.is_nan() || roll_deg.is_nan() {
                    f32::NAN
                } else {
                    pitch_deg.abs().max(roll_deg.abs())
                }
            }
        }
    }
}

/// Observable record of a supervisor state change.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TransitionEvent {
    pub id: Uuid,
    pub timestamp: DateTime<Utc>,
    pub from: SafetyState,
    pub to: SafetyState,
    /// Short human-readable reason, e.g. `"confirmed soft hazard"`.
    pub cause: String,
}

impl TransitionEvent {
    pub fn new(from: SafetyState, to: SafetyState, cause: impl Into<String>) -> Self {
        Self {
            id: Uuid::new_v4(),
            timestamp: Utc::now(),
            from,
            to,
            cause: cause.into(),
        }
    }
}

/// Errors reported by sensor adapters.
#[derive(Error, Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum SensorError {
    #[error("sensor read timed out")]
    Timeout,

    #[error("sensor unavailable: {0}")]
    Unavailable(String),

    #[error("malformed sensor payload: {0}")]
    Malformed(String),
}

/// Errors reported by the actuator adapter.
#[derive(Error, Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum ActuatorError {
    #[error("move {direction} x{steps} rejected: {details}")]
    Rejected {
        direction: Direction,
        steps: u8,
        details: String,
    },

    #[error("actuator link error: {0}")]
    Link(String),

    #[error("actuator command timed out")]
    Timeout,
}

/// Umbrella error type for the safety stack.
#[derive(Error, Debug, Serialize, Deserialize)]
pub enum SafetyError {
    #[error("Invalid configuration: {0}")]
    Config(String),

    #[error("Sensor Error: {0}")]
    Sensor(#[from] SensorError),

    #[error("Actuator Error: {0}")]
    Actuator(#[from] ActuatorError),

    #[error("Channel Error: {0}")]
    Channel(String),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn direction_serializes_lowercase() {
        let json = serde_json::to_string(&Direction::Backward).unwrap();
        assert_eq!(json, "\"backward\"");
        let back: Direction = serde_json::from_str("\"left\"").unwrap();
        assert_eq!(back, Direction::Left);
    }

    #[test]
    fn hazard_levels_are_ordered_by_severity() {
        assert!(HazardLevel::Hard > HazardLevel::Soft);
        assert!(HazardLevel::Soft > HazardLevel::Clear);
        let indices: Vec<usize> = HazardLevel::ALL.iter().map(|l| l.index()).collect();
        assert_eq!(indices, vec![0, 1, 2]);
    }

    #[test]
    fn only_estop_is_terminal() {
        assert!(SafetyState::EStopped.is_terminal());
        assert!(!SafetyState::HardStopped.is_terminal());
        assert!(!SafetyState::Returning.is_terminal());
    }

    #[test]
    fn autonomous_states() {
        assert!(SafetyState::Normal.is_autonomous());
        assert!(SafetyState::HardStopped.is_autonomous());
        assert!(!SafetyState::Overridden.is_autonomous());
        assert!(!SafetyState::Returning.is_autonomous());
    }

    #[test]
    fn attitude_magnitude_is_largest_tilt() {
        let sample = SensorSample::now(Reading::Attitude {
            pitch_deg: -12.0,
            roll_deg: 4.0,
        });
        assert!((sample.magnitude() - 12.0).abs() < f32::EPSILON);

        let nan = SensorSample::now(Reading::Attitude {
            pitch_deg: f32::NAN,
            roll_deg: 4.0,
        });
        assert!(nan.magnitude().is_nan());
    }

    #[test]
    fn transition_event_roundtrip() {
        let event = TransitionEvent::new(
            SafetyState::Normal,
            SafetyState::HardStopped,
            "hard trip at 5.0 cm",
        );
        let json = serde_json::to_string(&event).unwrap();
        let back: TransitionEvent = serde_json::from_str(&json).unwrap();
        assert_eq!(back.id, event.id);
        assert_eq!(back.to, SafetyState::HardStopped);
    }

    #[test]
    fn safety_error_display() {
        let err = SafetyError::from(SensorError::Timeout);
        assert!(err.to_string().contains("timed out"));

        let err = SafetyError::from(ActuatorError::Rejected {
            direction: Direction::Forward,
            steps: 3,
            details: "fell over".to_string(),
        });
        assert!(err.to_string().contains("forward x3"));
    }
}
