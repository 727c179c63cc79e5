//! `minisafe-hal` – Hardware Abstraction Layer
//!
//! The abstract boundary to the robot vendor SDK.  Nothing above this crate
//! knows how a move is transmitted or how a distance is measured; it only
//! talks to the traits defined here.
//!
//! # Modules
//!
//! - [`actuator`] – [`MotionActuator`][actuator::MotionActuator]: the
//!   `send_move(direction, steps)` adapter every motion command funnels into.
//! - [`sensor`] – [`DistanceSensor`][sensor::DistanceSensor],
//!   [`AttitudeSensor`][sensor::AttitudeSensor] and
//!   [`BatteryGauge`][sensor::BatteryGauge] adapters, plus
//!   [`attitude_from_accel`][sensor::attitude_from_accel] for boards that only
//!   expose a raw accelerometer.
//! - [`announce`] – [`Announcer`][announce::Announcer]: fire-and-forget
//!   speech/notification sink.  The core works with the no-op implementation.
//! - [`sim`] – in-process simulated drivers used by the CLI when no robot is
//!   attached and by every test in the workspace.

pub mod actuator;
pub mod announce;
pub mod sensor;
pub mod sim;

pub use actuator::{Ack, MotionActuator};
pub use announce::{Announcer, LogAnnouncer, NoopAnnouncer};
pub use sensor::{AttitudeSensor, BatteryGauge, DistanceSensor, attitude_from_accel};
pub use sim::{MockBattery, SimActuator, SimAttitudeSensor, SimDistanceSensor, SimTiltCommand};
