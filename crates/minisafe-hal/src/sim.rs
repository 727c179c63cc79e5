//! In-process simulated drivers for running the safety stack without a robot.
//!
//! Every simulator is a cheap, cloneable handle over shared state: hand one
//! clone to the supervisor and keep another to script readings or inspect the
//! commands that reached the "hardware".
//!
//! # Example
//!
//! ```rust
//! use minisafe_hal::sim::SimActuator;
//! use minisafe_hal::MotionActuator;
//! use minisafe_types::Direction;
//!
//! # tokio_test_block(async {
//! let actuator = SimActuator::new();
//! let handle = actuator.clone();
//! actuator.send_move(Direction::Forward, 2).await.unwrap();
//! assert_eq!(handle.commands().len(), 1);
//! # });
//! # fn tokio_test_block<F: std::future::Future>(f: F) -> F::Output {
//! #     tokio::runtime::Builder::new_current_thread().enable_all().build().unwrap().block_on(f)
//! # }
//! ```

use std::collections::VecDeque;
use std::sync::atomic::{AtomicU8, AtomicU32, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;

use async_trait::async_trait;
use minisafe_types::{ActuatorError, CommandEnvelope, Direction, SensorError};
use tracing::debug;

use crate::actuator::{Ack, MotionActuator};
use crate::sensor::{AttitudeSensor, BatteryGauge, DistanceSensor};

/// Lock a simulator mutex, recovering the data if a test thread panicked
/// while holding it.
fn lock<T>(m: &Mutex<T>) -> MutexGuard<'_, T> {
    m.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

// ────────────────────────────────────────────────────────────────────────────
// Actuator
// ────────────────────────────────────────────────────────────────────────────

/// A simulated walking controller that records every accepted command.
///
/// Optionally injects latency (to model an in-flight command) and a number of
/// upcoming failures.
#[derive(Clone, Default)]
pub struct SimActuator {
    log: Arc<Mutex<Vec<CommandEnvelope>>>,
    failures_pending: Arc<AtomicU32>,
    latency: Duration,
}

impl SimActuator {
    pub fn new() -> Self {
        Self::default()
    }

    /// Make every command take `latency` to complete.
    pub fn with_latency(mut self, latency: Duration) -> Self {
        self.latency = latency;
        self
    }

    /// Reject the next `count` commands.
    pub fn fail_next(&self, count: u32) {
        self.failures_pending.store(count, Ordering::SeqCst);
    }

    /// Snapshot of all commands accepted so far, oldest first.
    pub fn commands(&self) -> Vec<CommandEnvelope> {
        lock(&self.log).clone()
    }
}

#[async_trait]
impl MotionActuator for SimActuator {
    async fn send_move(&self, direction: Direction, steps: u8) -> Result<Ack, ActuatorError> {
        if !self.latency.is_zero() {
            tokio::time::sleep(self.latency).await;
        }
        let failing = self
            .failures_pending
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
            .is_ok();
        if failing {
            return Err(ActuatorError::Rejected {
                direction,
                steps,
                details: "simulated failure".to_string(),
            });
        }
        let envelope = CommandEnvelope::new(direction, steps);
        debug!(%direction, steps, "sim actuator accepted move");
        lock(&self.log).push(envelope);
        Ok(Ack { envelope })
    }
}

// ────────────────────────────────────────────────────────────────────────────
// Distance sensor
// ────────────────────────────────────────────────────────────────────────────

/// A simulated proximity sensor.
///
/// Scripted results are returned first, in order.  Once the script is
/// exhausted the sensor keeps reporting the steady-state distance set with
/// [`SimDistanceSensor::set_distance`].
#[derive(Clone)]
pub struct SimDistanceSensor {
    script: Arc<Mutex<VecDeque<Result<f32, SensorError>>>>,
    steady_cm: Arc<Mutex<f32>>,
    latency: Duration,
}

impl SimDistanceSensor {
    /// A sensor that reports `steady_cm` once its script is empty.
    pub fn new(steady_cm: f32) -> Self {
        Self {
            script: Arc::new(Mutex::new(VecDeque::new())),
            steady_cm: Arc::new(Mutex::new(steady_cm)),
            latency: Duration::ZERO,
        }
    }

    /// Make every read take `latency` to complete.
    pub fn with_latency(mut self, latency: Duration) -> Self {
        self.latency = latency;
        self
    }

    /// Queue a successful reading.
    pub fn push_reading(&self, cm: f32) {
        lock(&self.script).push_back(Ok(cm));
    }

    /// Queue a failed read.
    pub fn push_error(&self, err: SensorError) {
        lock(&self.script).push_back(Err(err));
    }

    /// Change the steady-state distance.
    pub fn set_distance(&self, cm: f32) {
        *lock(&self.steady_cm) = cm;
    }
}

#[async_trait]
impl DistanceSensor for SimDistanceSensor {
    async fn read_distance(&self) -> Result<f32, SensorError> {
        if !self.latency.is_zero() {
            tokio::time::sleep(self.latency).await;
        }
        let scripted = lock(&self.script).pop_front();
        match scripted {
            Some(result) => result,
            None => Ok(*lock(&self.steady_cm)),
        }
    }
}

// ────────────────────────────────────────────────────────────────────────────
// Attitude sensor
// ────────────────────────────────────────────────────────────────────────────

/// Console adjustments understood by [`SimAttitudeSensor::adjust`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SimTiltCommand {
    PitchUp,
    PitchDown,
    RollUp,
    RollDown,
    Reset,
}

impl SimTiltCommand {
    /// Degrees added per adjustment.
    pub const STEP_DEG: f32 = 5.0;

    /// Parse the console tokens `tp`, `tm`, `rp`, `rm` and `r0`.
    pub fn parse(token: &str) -> Option<Self> {
        match token {
            "tp" => Some(SimTiltCommand::PitchUp),
            "tm" => Some(SimTiltCommand::PitchDown),
            "rp" => Some(SimTiltCommand::RollUp),
            "rm" => Some(SimTiltCommand::RollDown),
            "r0" => Some(SimTiltCommand::Reset),
            _ => None,
        }
    }
}

/// A simulated posture provider whose attitude is nudged from the console.
#[derive(Clone, Default)]
pub struct SimAttitudeSensor {
    attitude: Arc<Mutex<(f32, f32)>>,
}

impl SimAttitudeSensor {
    pub fn new() -> Self {
        Self::default()
    }

    /// Set `(pitch, roll)` directly.
    pub fn set(&self, pitch_deg: f32, roll_deg: f32) {
        *lock(&self.attitude) = (pitch_deg, roll_deg);
    }

    /// Apply a console adjustment and return the new `(pitch, roll)`.
    pub fn adjust(&self, cmd: SimTiltCommand) -> (f32, f32) {
        let mut att = lock(&self.attitude);
        match cmd {
            SimTiltCommand::PitchUp => att.0 += SimTiltCommand::STEP_DEG,
            SimTiltCommand::PitchDown => att.0 -= SimTiltCommand::STEP_DEG,
            SimTiltCommand::RollUp => att.1 += SimTiltCommand::STEP_DEG,
            SimTiltCommand::RollDown => att.1 -= SimTiltCommand::STEP_DEG,
            SimTiltCommand::Reset => *att = (0.0, 0.0),
        }
        *att
    }
}

#[async_trait]
impl AttitudeSensor for SimAttitudeSensor {
    async fn read_attitude(&self) -> Result<(f32, f32), SensorError> {
        Ok(*lock(&self.attitude))
    }
}

// ────────────────────────────────────────────────────────────────────────────
// Battery
// ────────────────────────────────────────────────────────────────────────────

/// A battery that drains by a fixed amount on every poll.
///
/// Stands in for robot builds whose SDK exposes no fuel gauge.
#[derive(Clone)]
pub struct MockBattery {
    percent: Arc<AtomicU8>,
    drain_per_poll: u8,
    latency: Duration,
}

impl MockBattery {
    pub fn new(start_percent: u8, drain_per_poll: u8) -> Self {
        Self {
            percent: Arc::new(AtomicU8::new(start_percent.min(100))),
            drain_per_poll,
            latency: Duration::ZERO,
        }
    }

    /// Make every poll take `latency` to answer.
    pub fn with_latency(mut self, latency: Duration) -> Self {
        self.latency = latency;
        self
    }

    /// Current charge without draining.
    pub fn peek(&self) -> u8 {
        self.percent.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl BatteryGauge for MockBattery {
    async fn battery_percent(&self) -> Result<u8, SensorError> {
        if !self.latency.is_zero() {
            tokio::time::sleep(self.latency).await;
        }
        let drain = self.drain_per_poll;
        let previous = self
            .percent
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |p| {
                Some(p.saturating_sub(drain))
            })
            .unwrap_or_else(|p| p);
        Ok(previous.saturating_sub(drain))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn actuator_records_accepted_moves() {
        let act = SimActuator::new();
        let handle = act.clone();
        act.send_move(Direction::Forward, 1).await.unwrap();
        act.send_move(Direction::Right, 2).await.unwrap();
        assert_eq!(
            handle.commands(),
            vec![
                CommandEnvelope::new(Direction::Forward, 1),
                CommandEnvelope::new(Direction::Right, 2)
            ]
        );
    }

    #[tokio::test]
    async fn actuator_fails_requested_number_of_times() {
        let act = SimActuator::new();
        act.fail_next(2);
        assert!(act.send_move(Direction::Forward, 1).await.is_err());
        assert!(act.send_move(Direction::Forward, 1).await.is_err());
        assert!(act.send_move(Direction::Forward, 1).await.is_ok());
        assert_eq!(act.commands().len(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn actuator_latency_delays_completion() {
        let act = SimActuator::new().with_latency(Duration::from_millis(200));
        let start = tokio::time::Instant::now();
        act.send_move(Direction::Left, 1).await.unwrap();
        assert!(start.elapsed() >= Duration::from_millis(200));
    }

    #[tokio::test]
    async fn distance_script_then_steady_state() {
        let sensor = SimDistanceSensor::new(100.0);
        sensor.push_reading(15.0);
        sensor.push_error(SensorError::Timeout);
        assert_eq!(sensor.read_distance().await, Ok(15.0));
        assert_eq!(sensor.read_distance().await, Err(SensorError::Timeout));
        assert_eq!(sensor.read_distance().await, Ok(100.0));
        sensor.set_distance(42.0);
        assert_eq!(sensor.read_distance().await, Ok(42.0));
    }

    #[tokio::test]
    async fn attitude_adjustments_accumulate() {
        let sensor = SimAttitudeSensor::new();
        sensor.adjust(SimTiltCommand::PitchUp);
        sensor.adjust(SimTiltCommand::PitchUp);
        let (pitch, roll) = sensor.adjust(SimTiltCommand::RollDown);
        assert_eq!((pitch, roll), (10.0, -5.0));
        assert_eq!(sensor.read_attitude().await, Ok((10.0, -5.0)));
        assert_eq!(sensor.adjust(SimTiltCommand::Reset), (0.0, 0.0));
    }

    #[test]
    fn tilt_command_parsing() {
        assert_eq!(SimTiltCommand::parse("tp"), Some(SimTiltCommand::PitchUp));
        assert_eq!(SimTiltCommand::parse("r0"), Some(SimTiltCommand::Reset));
        assert_eq!(SimTiltCommand::parse("zz"), None);
    }

    #[tokio::test]
    async fn battery_drains_per_poll_and_saturates() {
        let battery = MockBattery::new(7, 3);
        assert_eq!(battery.battery_percent().await, Ok(4));
        assert_eq!(battery.battery_percent().await, Ok(1));
        assert_eq!(battery.battery_percent().await, Ok(0));
        assert_eq!(battery.peek(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn battery_latency_delays_the_reading() {
        let battery = MockBattery::new(50, 1).with_latency(Duration::from_secs(2));
        let start = tokio::time::Instant::now();
        assert_eq!(battery.battery_percent().await, Ok(49));
        assert!(start.elapsed() >= Duration::from_secs(2));
    }
}
