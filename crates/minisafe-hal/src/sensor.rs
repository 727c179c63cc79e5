//! Sensor adapter traits.
//!
//! Each adapter call may block on I/O.  Callers wrap reads in a timeout and
//! treat [`SensorError::Timeout`] like any other failed read.

use async_trait::async_trait;
use minisafe_types::SensorError;

/// A forward-facing proximity sensor (infrared or ultrasonic).
#[async_trait]
pub trait DistanceSensor: Send + Sync {
    /// Return the distance to the nearest obstacle in centimetres.
    async fn read_distance(&self) -> Result<f32, SensorError>;
}

/// An IMU or posture provider.
#[async_trait]
pub trait AttitudeSensor: Send + Sync {
    /// Return `(pitch, roll)` in degrees.
    async fn read_attitude(&self) -> Result<(f32, f32), SensorError>;
}

/// A battery fuel gauge.
#[async_trait]
pub trait BatteryGauge: Send + Sync {
    /// Return the remaining charge in percent (0–100).
    async fn battery_percent(&self) -> Result<u8, SensorError>;
}

/// Estimate `(pitch, roll)` in degrees from a raw accelerometer vector.
///
/// Only valid while the robot is quasi-static, i.e. gravity dominates the
/// measured acceleration.  A zero vector yields `(0, 0)`.
pub fn attitude_from_accel(ax: f32, ay: f32, az: f32) -> (f32, f32) {
    let g = (ax * ax + ay * ay + az * az).sqrt();
    if g <= f32::EPSILON {
        return (0.0, 0.0);
    }
    let (axn, ayn, azn) = (ax / g, ay / g, az / g);
    let pitch = (-axn).atan2((ayn * ayn + azn * azn).sqrt()).to_degrees();
    let roll = ayn.atan2(azn).to_degrees();
    (pitch, roll)
}
