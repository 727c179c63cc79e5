//! `minisafe-kernel` – Safety arbitration primitives
//!
//! Everything in here is small, synchronous where it can be, and owns no
//! policy about *where* hazards come from.  The supervisor in
//! `minisafe-runtime` composes these pieces into the control loop.
//!
//! # Modules
//!
//! - [`cancel`] – [`CancelFlag`][cancel::CancelFlag]: the out-of-band
//!   emergency-stop flag.  Cloneable, settable from any thread, awaitable from
//!   any task.
//! - [`state`] – [`StateWriter`][state::StateWriter] /
//!   [`StateReader`][state::StateReader]: the session's single
//!   [`SafetyState`][minisafe_types::SafetyState] cell.  Exactly one writer
//!   exists; readers are cheap clones.
//! - [`state_machine`] – [`SafetyStateMachine`][state_machine::SafetyStateMachine]:
//!   pure transition rules from [`SupervisorEvent`][state_machine::SupervisorEvent]s
//!   to state changes.  No I/O, no clocks.
//! - [`gateway`] – [`MotionGateway`][gateway::MotionGateway]: the only path to
//!   the actuator.  Clamps step counts, rate-limits, and suppresses motion once
//!   an e-stop is in effect.

pub mod cancel;
pub mod gateway;
pub mod state;
pub mod state_machine;

pub use cancel::CancelFlag;
pub use gateway::{DispatchResult, GatewayStats, MotionGateway, RateLimiter, StepLimits};
pub use state::{StateReader, StateWriter, state_cell};
pub use state_machine::{EStopCause, SafetyStateMachine, SupervisorEvent, Transition};
