//! `minisafe-runtime` – The Safety Supervisor
//!
//! Owns the control loop that turns hazard assessments into motion, and the
//! process-wide tracing setup.
//!
//! # Modules
//!
//! - [`config`] – [`SupervisorConfig`][config::SupervisorConfig]: every
//!   threshold, timing and maneuver parameter, with defaults and a
//!   [`validate`][config::SupervisorConfig::validate] check that is the only
//!   startup failure path.
//! - [`supervisor`] – [`Supervisor`][supervisor::Supervisor]: the tick-based
//!   loop.  Each tick checks the cancel flag and battery, samples the
//!   [`HazardSource`][minisafe_perception::HazardSource], feeds the
//!   [`SafetyStateMachine`][minisafe_kernel::SafetyStateMachine], and sends at
//!   most one command through the
//!   [`MotionGateway`][minisafe_kernel::MotionGateway].  State changes are
//!   broadcast as [`TransitionEvent`][minisafe_types::TransitionEvent]s.
//! - [`telemetry`] – [`init_tracing`][telemetry::init_tracing]: initialises
//!   the global `tracing` subscriber with an optional OTLP span exporter.

pub mod config;
pub mod supervisor;
pub mod telemetry;

pub use config::{HazardSourceKind, RouteStep, SupervisorConfig};
pub use supervisor::{OperatorCommand, Supervisor, SupervisorParts, TickReport};
pub use telemetry::{LogFormat, TracerProviderGuard, init_tracing};

// Callers wiring a supervisor need the kernel handles too.
pub use minisafe_kernel::{CancelFlag, DispatchResult, StateReader};
