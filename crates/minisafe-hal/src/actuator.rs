//! The `MotionActuator` adapter trait.
//!
//! Drivers implement this trait and hand a boxed instance to the motion
//! gateway in `minisafe-kernel`.  The gateway is the only caller, so drivers
//! never see an unclamped or un-rate-limited command.

use async_trait::async_trait;
use minisafe_types::{ActuatorError, CommandEnvelope, Direction};

/// Acknowledgement returned by a driver for a move it accepted.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Ack {
    pub envelope: CommandEnvelope,
}

/// A stepped locomotion actuator (the robot's walking controller).
///
/// Implementations must be cheap to call repeatedly and must report failures
/// as [`ActuatorError`] values rather than panicking.
#[async_trait]
pub trait MotionActuator: Send + Sync {
    /// Walk `steps` steps in `direction`.
    ///
    /// # Errors
    ///
    /// Returns [`ActuatorError`] when the robot rejects the command or the
    /// link to it fails.
    async fn send_move(&self, direction: Direction, steps: u8) -> Result<Ack, ActuatorError>;
}
