//! [`HazardSource`] – the pluggable "what could hurt the robot" capability.
//!
//! The obstacle-avoidance and posture-recovery behaviours only differ in
//! where the hazard signal comes from.  Each source owns its sensor adapter,
//! a [`SensorFilter`] and a [`DebounceClassifier`], and exposes a single
//! [`sample_and_classify`][HazardSource::sample_and_classify] call to the
//! supervisor.
//!
//! Sensor reads are bounded by a timeout; a read that times out counts as a
//! failed sample.

use std::time::Duration;

use async_trait::async_trait;
use minisafe_hal::{AttitudeSensor, DistanceSensor};
use minisafe_types::{HazardLevel, Reading, SensorError, SensorSample};
use tokio::time::timeout;
use tracing::{debug, warn};

use crate::debounce::{DebounceClassifier, Thresholds};
use crate::filter::{FilterOutput, SensorFailure, SensorFilter, ValidRange};

/// What one tick of sampling produced.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Assessment {
    /// A valid sample was folded into the window.
    Reading {
        /// Filtered (median) value.
        value: f32,
        /// Instantaneous classification of `value`.
        level: HazardLevel,
        /// Set on the tick a level becomes confirmed.
        confirmed: Option<HazardLevel>,
    },
    /// No usable sample this tick; below the failure limit.
    Stale { consecutive_failures: u32 },
}

impl Assessment {
    /// Instantaneous level, if a reading was taken.
    pub fn level(&self) -> Option<HazardLevel> {
        match self {
            Assessment::Reading { level, .. } => Some(*level),
            Assessment::Stale { .. } => None,
        }
    }
}

/// What a source watches for.  The supervisor picks its recovery moves from
/// this.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HazardKind {
    /// Something in the robot's path.
    Obstacle,
    /// The robot itself leaning too far.
    Posture,
}

/// A source of hazard assessments for the supervisor.
#[async_trait]
pub trait HazardSource: Send {
    /// Short label used in logs and transition causes, e.g. `"proximity"`.
    fn name(&self) -> &str;

    fn kind(&self) -> HazardKind;

    /// Read the sensor once, filter, classify and debounce.
    ///
    /// # Errors
    ///
    /// Returns [`SensorFailure::Persistent`] once consecutive failed reads
    /// reach the configured limit.
    async fn sample_and_classify(&mut self) -> Result<Assessment, SensorFailure>;
}

/// Filter plus debounce, shared by every concrete source.
#[derive(Debug, Clone)]
struct Pipeline {
    filter: SensorFilter,
    debounce: DebounceClassifier,
}

impl Pipeline {
    fn fold(&mut self, sample: &SensorSample) -> Result<Assessment, SensorFailure> {
        match self.filter.ingest(sample)? {
            FilterOutput::Filtered(value) => {
                let (level, confirmed) = self.debounce.observe(value);
                Ok(Assessment::Reading {
                    value,
                    level,
                    confirmed,
                })
            }
            FilterOutput::Rejected {
                consecutive_failures,
            } => Ok(Assessment::Stale {
                consecutive_failures,
            }),
        }
    }

    fn fail(&mut self, source: &str, err: &SensorError) -> Result<Assessment, SensorFailure> {
        let outcome = self.filter.record_failure();
        warn!(
            source,
            error = %err,
            consecutive = self.filter.consecutive_failures(),
            "sensor read failed"
        );
        match outcome? {
            FilterOutput::Rejected {
                consecutive_failures,
            } => Ok(Assessment::Stale {
                consecutive_failures,
            }),
            // record_failure never yields a filtered value.
            FilterOutput::Filtered(_) => Ok(Assessment::Stale {
                consecutive_failures: self.filter.consecutive_failures(),
            }),
        }
    }
}

// ────────────────────────────────────────────────────────────────────────────
// Proximity
// ────────────────────────────────────────────────────────────────────────────

/// Obstacle hazard from a forward distance sensor.
pub struct ProximitySource {
    sensor: Box<dyn DistanceSensor>,
    pipeline: Pipeline,
    read_timeout: Duration,
}

impl ProximitySource {
    pub fn new(
        sensor: Box<dyn DistanceSensor>,
        soft_cm: f32,
        hard_cm: f32,
        window: usize,
        confirm_count: u32,
        failure_limit: u32,
        read_timeout: Duration,
    ) -> Self {
        Self {
            sensor,
            pipeline: Pipeline {
                filter: SensorFilter::new(window, ValidRange::distance(), failure_limit),
                debounce: DebounceClassifier::new(
                    Thresholds::Proximity { soft_cm, hard_cm },
                    confirm_count,
                ),
            },
            read_timeout,
        }
    }
}

#[async_trait]
impl HazardSource for ProximitySource {
    fn name(&self) -> &str {
        "proximity"
    }

    fn kind(&self) -> HazardKind {
        HazardKind::Obstacle
    }

    async fn sample_and_classify(&mut self) -> Result<Assessment, SensorFailure> {
        let read = match timeout(self.read_timeout, self.sensor.read_distance()).await {
            Ok(result) => result,
            Err(_) => Err(SensorError::Timeout),
        };
        match read {
            Ok(cm) => {
                let assessment = self
                    .pipeline
                    .fold(&SensorSample::now(Reading::DistanceCm(cm)))?;
                debug!(raw_cm = cm, ?assessment, "proximity sample");
                Ok(assessment)
            }
            Err(e) => self.pipeline.fail("proximity", &e),
        }
    }
}

// ────────────────────────────────────────────────────────────────────────────
// Tilt
// ────────────────────────────────────────────────────────────────────────────

/// Posture hazard from an attitude sensor; the filtered value is the larger
/// of `|pitch|` and `|roll|`.
pub struct TiltSource {
    sensor: Box<dyn AttitudeSensor>,
    pipeline: Pipeline,
    read_timeout: Duration,
}

impl TiltSource {
    pub fn new(
        sensor: Box<dyn AttitudeSensor>,
        warn_deg: f32,
        trip_deg: f32,
        window: usize,
        confirm_count: u32,
        failure_limit: u32,
        read_timeout: Duration,
    ) -> Self {
        Self {
            sensor,
            pipeline: Pipeline {
                filter: SensorFilter::new(window, ValidRange::angle(), failure_limit),
                debounce: DebounceClassifier::new(
                    Thresholds::Tilt { warn_deg, trip_deg },
                    confirm_count,
                ),
            },
            read_timeout,
        }
    }
}

#[async_trait]
impl HazardSource for TiltSource {
    fn name(&self) -> &str {
        "tilt"
    }

    fn kind(&self) -> HazardKind {
        HazardKind::Posture
    }

    async fn sample_and_classify(&mut self) -> Result<Assessment, SensorFailure> {
        let read = match timeout(self.read_timeout, self.sensor.read_attitude()).await {
            Ok(result) => result,
            Err(_) => Err(SensorError::Timeout),
        };
        match read {
            Ok((pitch_deg, roll_deg)) => {
                let assessment = self.pipeline.fold(&SensorSample::now(Reading::Attitude {
                    pitch_deg,
                    roll_deg,
                }))?;
                debug!(pitch_deg, roll_deg, ?assessment, "tilt sample");
                Ok(assessment)
            }
            Err(e) => self.pipeline.fail("tilt", &e),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use minisafe_hal::sim::{SimAttitudeSensor, SimDistanceSensor};

    fn proximity(sensor: SimDistanceSensor) -> ProximitySource {
        ProximitySource::new(
            Box::new(sensor),
            20.0,
            8.0,
            3,
            2,
            5,
            Duration::from_millis(500),
        )
    }

    #[tokio::test]
    async fn soft_obstacle_confirms_on_second_reading() {
        let sensor = SimDistanceSensor::new(15.0);
        let mut source = proximity(sensor);
        let first = source.sample_and_classify().await.unwrap();
        assert_eq!(first.level(), Some(HazardLevel::Soft));
        assert!(matches!(first, Assessment::Reading { confirmed: None, .. }));
        let second = source.sample_and_classify().await.unwrap();
        assert!(matches!(
            second,
            Assessment::Reading {
                confirmed: Some(HazardLevel::Soft),
                ..
            }
        ));
    }

    #[tokio::test]
    async fn read_errors_are_stale_until_limit() {
        let sensor = SimDistanceSensor::new(100.0);
        for _ in 0..5 {
            sensor.push_error(SensorError::Unavailable("ir offline".into()));
        }
        let mut source = proximity(sensor);
        for n in 1..5 {
            assert_eq!(
                source.sample_and_classify().await,
                Ok(Assessment::Stale {
                    consecutive_failures: n
                })
            );
        }
        assert_eq!(
            source.sample_and_classify().await,
            Err(SensorFailure::Persistent {
                consecutive_failures: 5
            })
        );
    }

    #[tokio::test(start_paused = true)]
    async fn slow_read_counts_as_failure() {
        let sensor = SimDistanceSensor::new(100.0).with_latency(Duration::from_secs(2));
        let mut source = proximity(sensor);
        assert_eq!(
            source.sample_and_classify().await,
            Ok(Assessment::Stale {
                consecutive_failures: 1
            })
        );
    }

    #[tokio::test]
    async fn spike_does_not_move_filtered_value() {
        let sensor = SimDistanceSensor::new(50.0);
        sensor.push_reading(50.0);
        sensor.push_reading(51.0);
        sensor.push_reading(-3.0);
        sensor.push_reading(52.0);
        let mut source = proximity(sensor);
        source.sample_and_classify().await.unwrap();
        source.sample_and_classify().await.unwrap();
        assert!(matches!(
            source.sample_and_classify().await.unwrap(),
            Assessment::Stale { .. }
        ));
        assert!(matches!(
            source.sample_and_classify().await.unwrap(),
            Assessment::Reading { value, .. } if (value - 51.0).abs() < f32::EPSILON
        ));
    }

    #[tokio::test]
    async fn tilt_source_trips_on_large_roll() {
        let sensor = SimAttitudeSensor::new();
        sensor.set(2.0, -25.0);
        let mut source = TiltSource::new(
            Box::new(sensor),
            10.0,
            18.0,
            3,
            3,
            5,
            Duration::from_millis(500),
        );
        let assessment = source.sample_and_classify().await.unwrap();
        assert_eq!(assessment.level(), Some(HazardLevel::Hard));
        assert_eq!(source.name(), "tilt");
        assert_eq!(source.kind(), HazardKind::Posture);
        assert_eq!(
            proximity(SimDistanceSensor::new(100.0)).kind(),
            HazardKind::Obstacle
        );
    }
}
