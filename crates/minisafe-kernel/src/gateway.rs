//! [`MotionGateway`] – the single path from the supervisor to the actuator.
//!
//! Every outbound move passes three checks, in order:
//!
//! 1. **Suppression**: if the [`CancelFlag`] is set or the shared
//!    [`SafetyState`] is `EStopped`, nothing is sent.
//! 2. **Clamping**: the requested step count is forced into
//!    `[min_step, max_step]`.
//! 3. **Rate limiting**: if the previous command finished less than
//!    `min_interval` ago, the gateway waits out the remainder.  The wait is
//!    raced against the cancel flag and suppression is re-checked afterwards.
//!
//! A command already handed to the actuator is never aborted; its result is
//! reported as-is.  [`MotionGateway::dispatch`] takes `&mut self`, so at most
//! one command is in flight per gateway.
//!
//! # Example
//!
//! ```
//! use std::time::Duration;
//! use minisafe_hal::SimActuator;
//! use minisafe_kernel::{CancelFlag, DispatchResult, MotionGateway, StepLimits, state_cell};
//! use minisafe_types::{Direction, SafetyState};
//!
//! # tokio::runtime::Builder::new_current_thread().enable_all().build().unwrap().block_on(async {
//! let (_writer, reader) = state_cell(SafetyState::Normal);
//! let mut gateway = MotionGateway::new(
//!     Box::new(SimActuator::new()),
//!     StepLimits::new(1, 6),
//!     Duration::ZERO,
//!     CancelFlag::new(),
//!     reader,
//! );
//! match gateway.dispatch(Direction::Forward, 40).await {
//!     DispatchResult::Success(env) => assert_eq!(env.steps, 6),
//!     other => panic!("unexpected {other:?}"),
//! }
//! # });
//! ```

use std::time::Duration;

use minisafe_hal::MotionActuator;
use minisafe_types::{ActuatorError, CommandEnvelope, Direction, SafetyState};
use tokio::time::Instant;
use tracing::{debug, info, warn};

use crate::cancel::CancelFlag;
use crate::state::StateReader;

// ────────────────────────────────────────────────────────────────────────────
// Public types
// ────────────────────────────────────────────────────────────────────────────

/// Outcome of one [`MotionGateway::dispatch`] call.
#[derive(Debug, Clone, PartialEq)]
pub enum DispatchResult {
    /// The actuator accepted the (clamped) command.
    Success(CommandEnvelope),
    /// The actuator rejected the command or the link failed.
    Failed {
        envelope: CommandEnvelope,
        reason: ActuatorError,
    },
    /// Nothing was sent because an e-stop is in effect.
    Suppressed,
}

impl DispatchResult {
    pub fn is_success(&self) -> bool {
        matches!(self, DispatchResult::Success(_))
    }
}

/// Inclusive step-count bounds.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StepLimits {
    pub min_step: u8,
    pub max_step: u8,
}

impl StepLimits {
    /// Bounds are reordered if given backwards, and `min_step` is at least 1.
    pub fn new(min_step: u8, max_step: u8) -> Self {
        let lo = min_step.min(max_step).max(1);
        let hi = min_step.max(max_step).max(lo);
        Self {
            min_step: lo,
            max_step: hi,
        }
    }

    pub fn clamp(&self, requested: u32) -> u8 {
        let clamped = requested.clamp(u32::from(self.min_step), u32::from(self.max_step));
        // Bounded by max_step, which is a u8.
        u8::try_from(clamped).unwrap_or(self.max_step)
    }
}

/// Minimum spacing between consecutive actuator commands.
#[derive(Debug, Clone)]
pub struct RateLimiter {
    min_interval: Duration,
    last: Option<Instant>,
}

impl RateLimiter {
    pub fn new(min_interval: Duration) -> Self {
        Self {
            min_interval,
            last: None,
        }
    }

    pub fn min_interval(&self) -> Duration {
        self.min_interval
    }

    /// Time still to wait before the next command may go out.
    pub fn remaining(&self, now: Instant) -> Duration {
        match self.last {
            Some(last) => (last + self.min_interval).saturating_duration_since(now),
            None => Duration::ZERO,
        }
    }

    /// Record that a command completed at `at`.
    pub fn mark(&mut self, at: Instant) {
        self.last = Some(at);
    }
}

/// Running totals kept by the gateway.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct GatewayStats {
    pub dispatched: u64,
    pub failed: u64,
    pub suppressed: u64,
}

// ────────────────────────────────────────────────────────────────────────────
// MotionGateway
// ────────────────────────────────────────────────────────────────────────────

pub struct MotionGateway {
    actuator: Box<dyn MotionActuator>,
    limits: StepLimits,
    limiter: RateLimiter,
    cancel: CancelFlag,
    state: StateReader,
    stats: GatewayStats,
}

impl MotionGateway {
    pub fn new(
        actuator: Box<dyn MotionActuator>,
        limits: StepLimits,
        min_interval: Duration,
        cancel: CancelFlag,
        state: StateReader,
    ) -> Self {
        Self {
            actuator,
            limits,
            limiter: RateLimiter::new(min_interval),
            cancel,
            state,
            stats: GatewayStats::default(),
        }
    }

    pub fn limits(&self) -> StepLimits {
        self.limits
    }

    pub fn stats(&self) -> GatewayStats {
        self.stats
    }

    fn suppressed(&self) -> bool {
        self.cancel.is_set() || self.state.get() == SafetyState::EStopped
    }

    fn suppress(&mut self, direction: Direction) -> DispatchResult {
        self.stats.suppressed += 1;
        info!(%direction, "motion suppressed: e-stop in effect");
        DispatchResult::Suppressed
    }

    /// Clamp, rate-limit and send one move.
    ///
    /// Never retries.  Failures are logged and returned, not raised.
    pub async fn dispatch(&mut self, direction: Direction, requested_step: u32) -> DispatchResult {
        if self.suppressed() {
            return self.suppress(direction);
        }

        let steps = self.limits.clamp(requested_step);
        if u32::from(steps) != requested_step {
            debug!(%direction, requested_step, steps, "step count clamped");
        }

        let wait = self.limiter.remaining(Instant::now());
        if !wait.is_zero() {
            debug!(?wait, "rate limit: holding command");
            let cancelled = tokio::select! {
                _ = self.cancel.cancelled() => true,
                _ = tokio::time::sleep(wait) => false,
            };
            if cancelled {
                return self.suppress(direction);
            }
        }
        if self.suppressed() {
            return self.suppress(direction);
        }

        let result = self.actuator.send_move(direction, steps).await;
        self.limiter.mark(Instant::now());

        match result {
            Ok(ack) => {
                self.stats.dispatched += 1;
                debug!(%direction, steps, "move dispatched");
                DispatchResult::Success(ack.envelope)
            }
            Err(reason) => {
                self.stats.failed += 1;
                warn!(%direction, steps, error = %reason, "move failed");
                DispatchResult::Failed {
                    envelope: CommandEnvelope::new(direction, steps),
                    reason,
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::state::{StateWriter, state_cell};
    use minisafe_hal::SimActuator;

    fn gateway(
        interval: Duration,
        actuator: SimActuator,
    ) -> (MotionGateway, StateWriter, CancelFlag) {
        let (writer, reader) = state_cell(SafetyState::Normal);
        let cancel = CancelFlag::new();
        let gw = MotionGateway::new(
            Box::new(actuator),
            StepLimits::new(1, 6),
            interval,
            cancel.clone(),
            reader,
        );
        (gw, writer, cancel)
    }

    #[test]
    fn clamp_into_bounds() {
        let limits = StepLimits::new(1, 6);
        assert_eq!(limits.clamp(0), 1);
        assert_eq!(limits.clamp(3), 3);
        assert_eq!(limits.clamp(6), 6);
        assert_eq!(limits.clamp(1_000_000), 6);
    }

    #[test]
    fn step_limits_normalise() {
        assert_eq!(StepLimits::new(6, 2), StepLimits::new(2, 6));
        assert_eq!(StepLimits::new(0, 0).min_step, 1);
    }

    #[tokio::test]
    async fn oversized_request_is_clamped() {
        let act = SimActuator::new();
        let (mut gw, _w, _c) = gateway(Duration::ZERO, act.clone());
        let result = gw.dispatch(Direction::Forward, 99).await;
        assert_eq!(
            result,
            DispatchResult::Success(CommandEnvelope::new(Direction::Forward, 6))
        );
        assert_eq!(act.commands()[0].steps, 6);
    }

    #[tokio::test(start_paused = true)]
    async fn back_to_back_commands_are_spaced() {
        let act = SimActuator::new();
        let (mut gw, _w, _c) = gateway(Duration::from_millis(400), act);
        let start = Instant::now();
        assert!(gw.dispatch(Direction::Forward, 1).await.is_success());
        let first_done = Instant::now();
        assert!(gw.dispatch(Direction::Forward, 1).await.is_success());
        assert!(Instant::now() - first_done >= Duration::from_millis(400));
        assert!(Instant::now() - start >= Duration::from_millis(400));
    }

    #[tokio::test(start_paused = true)]
    async fn spacing_counts_from_command_completion() {
        let act = SimActuator::new().with_latency(Duration::from_millis(300));
        let (mut gw, _w, _c) = gateway(Duration::from_millis(400), act);
        gw.dispatch(Direction::Left, 1).await;
        let done = Instant::now();
        gw.dispatch(Direction::Left, 1).await;
        // 400 ms gap plus 300 ms of actuator latency on the second command.
        assert!(Instant::now() - done >= Duration::from_millis(700));
    }

    #[tokio::test]
    async fn cancel_flag_suppresses_without_actuation() {
        let act = SimActuator::new();
        let (mut gw, _w, cancel) = gateway(Duration::ZERO, act.clone());
        cancel.trigger();
        assert_eq!(
            gw.dispatch(Direction::Forward, 1).await,
            DispatchResult::Suppressed
        );
        assert!(act.commands().is_empty());
        assert_eq!(gw.stats().suppressed, 1);
    }

    #[tokio::test]
    async fn estopped_state_suppresses() {
        let act = SimActuator::new();
        let (mut gw, writer, _c) = gateway(Duration::ZERO, act.clone());
        writer.set(SafetyState::EStopped);
        assert_eq!(
            gw.dispatch(Direction::Backward, 2).await,
            DispatchResult::Suppressed
        );
        assert!(act.commands().is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn cancel_during_rate_limit_wait_suppresses() {
        let act = SimActuator::new();
        let (mut gw, _w, cancel) = gateway(Duration::from_secs(5), act.clone());
        gw.dispatch(Direction::Forward, 1).await;

        let trigger = {
            let cancel = cancel.clone();
            tokio::spawn(async move {
                tokio::time::sleep(Duration::from_millis(100)).await;
                cancel.trigger();
            })
        };
        let start = Instant::now();
        assert_eq!(
            gw.dispatch(Direction::Forward, 1).await,
            DispatchResult::Suppressed
        );
        assert!(Instant::now() - start < Duration::from_secs(5));
        trigger.await.unwrap();
        assert_eq!(act.commands().len(), 1);
    }

    #[tokio::test]
    async fn actuator_failure_is_reported_not_retried() {
        let act = SimActuator::new();
        act.fail_next(1);
        let (mut gw, _w, _c) = gateway(Duration::ZERO, act.clone());
        let result = gw.dispatch(Direction::Right, 2).await;
        assert!(matches!(
            result,
            DispatchResult::Failed {
                envelope: CommandEnvelope {
                    direction: Direction::Right,
                    steps: 2
                },
                ..
            }
        ));
        assert!(act.commands().is_empty());
        assert_eq!(
            gw.stats(),
            GatewayStats {
                dispatched: 0,
                failed: 1,
                suppressed: 0
            }
        );
    }

    #[test]
    fn rate_limiter_remaining() {
        let mut rl = RateLimiter::new(Duration::from_millis(400));
        let t0 = Instant::now();
        assert_eq!(rl.remaining(t0), Duration::ZERO);
        rl.mark(t0);
        assert_eq!(
            rl.remaining(t0 + Duration::from_millis(100)),
            Duration::from_millis(300)
        );
        assert_eq!(rl.remaining(t0 + Duration::from_secs(1)), Duration::ZERO);
    }
}
