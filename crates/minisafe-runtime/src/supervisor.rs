//! [`Supervisor`] – the safety-supervised control loop.
//!
//! One supervisor runs per session and is the only writer of the shared
//! [`SafetyState`].  Each [`tick`][Supervisor::tick]:
//!
//! 1. **E-stop check** – a set [`CancelFlag`] forces `EStopped`.
//! 2. **Battery** – when due, poll the gauge (an e-stop abandons the read);
//!    at or below the low threshold the one-shot latch fires and the robot
//!    heads home.
//! 3. **Assess** – in the autonomous states (`Normal`, `Avoiding`,
//!    `HardStopped`) sample the [`HazardSource`].  A single instantaneous hard
//!    reading trips immediately unless `debounce_hard` is set; confirmed
//!    levels become [`SupervisorEvent::Hazard`]s.  A posture source never
//!    avoids: a soft tilt only warns and holds position.
//! 4. **Act** – the current state picks at most one command (cruise, the next
//!    maneuver step, or the next return-route leg) and sends it through the
//!    [`MotionGateway`].
//!
//! [`run`][Supervisor::run] repeats this every `tick_period`, handling
//! [`OperatorCommand`]s during the wait and waking early on cancellation.
//!
//! Every state change is logged and broadcast as a [`TransitionEvent`].

use std::collections::VecDeque;

use minisafe_hal::{Announcer, BatteryGauge, MotionActuator};
use minisafe_kernel::{
    CancelFlag, DispatchResult, EStopCause, GatewayStats, MotionGateway, SafetyStateMachine,
    StateReader, StateWriter, StepLimits, SupervisorEvent, Transition, state_cell,
};
use minisafe_perception::{Assessment, HazardKind, HazardSource};
use minisafe_types::{Direction, HazardLevel, SafetyError, SafetyState, TransitionEvent};
use tokio::sync::{broadcast, mpsc};
use tokio::time::Instant;
use tracing::{debug, error, info, warn};

use crate::config::{RouteStep, SupervisorConfig};

/// Capacity of the transition broadcast channel.
const EVENT_CAPACITY: usize = 64;

pub const DOCKED_ANNOUNCEMENT: &str = "Docking complete. Entering low-power standby.";
pub const ESTOP_ANNOUNCEMENT: &str = "Emergency stop.";
pub const HARD_STOP_ANNOUNCEMENT: &str = "Obstacle too close. Backing away.";
pub const TILT_TRIP_ANNOUNCEMENT: &str = "Unsafe tilt. Recovering posture.";

fn low_battery_announcement(percent: u8) -> String {
    format!("Battery low at {percent} percent. Returning to charging station.")
}

// ────────────────────────────────────────────────────────────────────────────
// Public types
// ────────────────────────────────────────────────────────────────────────────

/// Operator input delivered to the loop (everything except e-stop, which
/// goes through the [`CancelFlag`]).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OperatorCommand {
    /// Engage override, or release it if engaged.
    ToggleOverride,
    /// One manual move; honoured only while overridden.
    Step(Direction),
    /// Hold position.
    Stop,
    /// Leave the loop without an e-stop.
    Quit,
}

/// The hardware and plumbing a supervisor drives.
pub struct SupervisorParts {
    pub actuator: Box<dyn MotionActuator>,
    pub hazard: Box<dyn HazardSource>,
    /// `None` on robots without a fuel gauge; the low-battery path is then
    /// never taken.
    pub battery: Option<Box<dyn BatteryGauge>>,
    pub announcer: Box<dyn Announcer>,
    pub cancel: CancelFlag,
}

/// What happened during one tick.
#[derive(Debug, Clone, PartialEq)]
pub struct TickReport {
    /// State at the end of the tick.
    pub state: SafetyState,
    /// `None` when the hazard source was not sampled.
    pub assessment: Option<Assessment>,
    /// `None` when the state chose no command.
    pub dispatch: Option<DispatchResult>,
}

// ────────────────────────────────────────────────────────────────────────────
// Recovery
// ────────────────────────────────────────────────────────────────────────────

/// How the supervisor reacts to the hazards of one [`HazardKind`].
#[derive(Debug, Clone, PartialEq)]
struct RecoveryPlan {
    /// Confirmed soft hazards start an avoidance maneuver.  When unset the
    /// robot warns and holds position until the level clears.
    avoid_soft: bool,
    /// Moves queued on every hard-stop recovery attempt.
    hard_stop: Vec<(Direction, u32)>,
    announcement: &'static str,
}

impl RecoveryPlan {
    fn for_kind(kind: HazardKind, config: &SupervisorConfig) -> Self {
        match kind {
            HazardKind::Obstacle => Self {
                avoid_soft: true,
                hard_stop: vec![(Direction::Backward, config.hard_stop_backoff_steps)],
                announcement: HARD_STOP_ANNOUNCEMENT,
            },
            HazardKind::Posture => Self {
                avoid_soft: false,
                hard_stop: vec![
                    (Direction::Backward, config.posture_backoff_steps),
                    (Direction::Forward, config.posture_settle_steps),
                ],
                announcement: TILT_TRIP_ANNOUNCEMENT,
            },
        }
    }
}

// ────────────────────────────────────────────────────────────────────────────
// Supervisor
// ────────────────────────────────────────────────────────────────────────────

pub struct Supervisor {
    config: SupervisorConfig,
    machine: SafetyStateMachine,
    writer: StateWriter,
    gateway: MotionGateway,
    hazard: Box<dyn HazardSource>,
    battery: Option<Box<dyn BatteryGauge>>,
    announcer: Box<dyn Announcer>,
    cancel: CancelFlag,
    events: broadcast::Sender<TransitionEvent>,
    recovery: RecoveryPlan,

    maneuver: VecDeque<(Direction, u32)>,
    recovery_attempts: u32,
    last_level: Option<HazardLevel>,
    route: VecDeque<RouteStep>,
    route_loaded: bool,
    route_failures: u32,
    next_battery_check: Option<Instant>,
    quit: bool,
}

impl Supervisor {
    /// Validate `config` and assemble a supervisor in `Normal`.
    ///
    /// # Errors
    ///
    /// [`SafetyError::Config`] if the configuration is unusable.
    pub fn new(config: SupervisorConfig, parts: SupervisorParts) -> Result<Self, SafetyError> {
        config.validate()?;
        let (writer, reader) = state_cell(SafetyState::Normal);
        let gateway = MotionGateway::new(
            parts.actuator,
            StepLimits::new(config.min_step, config.max_step),
            config.min_command_interval(),
            parts.cancel.clone(),
            reader,
        );
        let (events, _) = broadcast::channel(EVENT_CAPACITY);
        let recovery = RecoveryPlan::for_kind(parts.hazard.kind(), &config);
        info!(
            source = parts.hazard.name(),
            battery = parts.battery.is_some(),
            "safety supervisor ready"
        );
        Ok(Self {
            config,
            machine: SafetyStateMachine::new(),
            writer,
            gateway,
            hazard: parts.hazard,
            battery: parts.battery,
            announcer: parts.announcer,
            cancel: parts.cancel,
            events,
            recovery,
            maneuver: VecDeque::new(),
            recovery_attempts: 0,
            last_level: None,
            route: VecDeque::new(),
            route_loaded: false,
            route_failures: 0,
            next_battery_check: None,
            quit: false,
        })
    }

    pub fn state(&self) -> SafetyState {
        self.machine.state()
    }

    /// Read-only handle onto the shared state.
    pub fn state_reader(&self) -> StateReader {
        self.writer.reader()
    }

    /// Receive every subsequent [`TransitionEvent`].
    pub fn subscribe(&self) -> broadcast::Receiver<TransitionEvent> {
        self.events.subscribe()
    }

    pub fn cancel_flag(&self) -> CancelFlag {
        self.cancel.clone()
    }

    pub fn gateway_stats(&self) -> GatewayStats {
        self.gateway.stats()
    }

    /// `true` once a [`OperatorCommand::Quit`] has been handled.
    pub fn quit_requested(&self) -> bool {
        self.quit
    }

    // ── Loop ────────────────────────────────────────────────────────────────

    /// Run ticks until e-stop or quit.  Returns the final state.
    pub async fn run(&mut self, mut commands: mpsc::Receiver<OperatorCommand>) -> SafetyState {
        let period = self.config.tick_period();
        let mut commands_open = true;
        info!(?period, "control loop started");

        loop {
            self.tick().await;
            if self.state().is_terminal() || self.quit {
                break;
            }

            let deadline = Instant::now() + period;
            loop {
                let cancel = self.cancel.clone();
                tokio::select! {
                    _ = cancel.cancelled() => break,
                    _ = tokio::time::sleep_until(deadline) => break,
                    cmd = commands.recv(), if commands_open => match cmd {
                        Some(cmd) => {
                            self.handle_operator(cmd).await;
                            if self.quit {
                                break;
                            }
                        }
                        None => {
                            debug!("operator channel closed");
                            commands_open = false;
                        }
                    },
                }
            }
            if self.quit {
                break;
            }
        }

        info!(state = %self.state(), quit = self.quit, "control loop stopped");
        self.state()
    }

    /// One pass of check, assess and act.
    pub async fn tick(&mut self) -> TickReport {
        if self.cancel.is_set() {
            self.apply(SupervisorEvent::EStop(EStopCause::Operator));
        }
        if self.state().is_terminal() {
            return TickReport {
                state: self.state(),
                assessment: None,
                dispatch: None,
            };
        }

        self.check_battery().await;

        let mut assessment = None;
        if self.state().is_autonomous() {
            let cancel = self.cancel.clone();
            let sampled = tokio::select! {
                _ = cancel.cancelled() => None,
                result = self.hazard.sample_and_classify() => Some(result),
            };
            match sampled {
                None => self.apply(SupervisorEvent::EStop(EStopCause::Operator)),
                Some(Err(failure)) => {
                    error!(source = self.hazard.name(), %failure, "hazard source failed");
                    self.apply(SupervisorEvent::EStop(EStopCause::SensorFailure));
                }
                Some(Ok(a)) => {
                    self.assess(&a);
                    assessment = Some(a);
                }
            }
        }

        let fresh = matches!(assessment, Some(Assessment::Reading { .. }));
        let chosen_in = self.state();
        let dispatch = match self.next_command(fresh) {
            Some((direction, steps)) => {
                let result = self.gateway.dispatch(direction, steps).await;
                self.after_dispatch(chosen_in, &result);
                Some(result)
            }
            None => None,
        };

        TickReport {
            state: self.state(),
            assessment,
            dispatch,
        }
    }

    /// Handle one operator command.  Returns the dispatch result for manual
    /// steps.
    pub async fn handle_operator(&mut self, cmd: OperatorCommand) -> Option<DispatchResult> {
        match cmd {
            OperatorCommand::ToggleOverride => {
                if self.state() == SafetyState::Overridden {
                    self.apply(SupervisorEvent::OverrideReleased);
                } else {
                    self.apply(SupervisorEvent::OverrideEngaged);
                }
                None
            }
            OperatorCommand::Step(direction) => {
                if self.state() != SafetyState::Overridden {
                    info!(%direction, state = %self.state(), "manual step ignored: override not engaged");
                    return None;
                }
                Some(self.gateway.dispatch(direction, self.config.cruise_steps).await)
            }
            OperatorCommand::Stop => {
                info!(state = %self.state(), "operator stop: holding position");
                None
            }
            OperatorCommand::Quit => {
                info!("quit requested");
                self.quit = true;
                None
            }
        }
    }

    // ── Per-tick steps ──────────────────────────────────────────────────────

    async fn check_battery(&mut self) {
        if self.machine.battery_latched() {
            return;
        }
        let Some(gauge) = self.battery.as_ref() else {
            return;
        };
        let now = Instant::now();
        if self.next_battery_check.is_some_and(|due| now < due) {
            return;
        }
        self.next_battery_check = Some(now + self.config.battery_check_interval());

        let poll = tokio::time::timeout(self.config.sensor_timeout(), gauge.battery_percent());
        let cancel = self.cancel.clone();
        let read = tokio::select! {
            _ = cancel.cancelled() => None,
            result = poll => Some(result),
        };
        let percent = match read {
            Some(Ok(Ok(percent))) => percent,
            Some(Ok(Err(e))) => {
                warn!(error = %e, "battery read failed");
                return;
            }
            Some(Err(_)) => {
                warn!("battery read timed out");
                return;
            }
            None => {
                self.apply(SupervisorEvent::EStop(EStopCause::Operator));
                return;
            }
        };
        debug!(percent, "battery polled");
        if percent <= self.config.battery_low_percent {
            warn!(
                percent,
                threshold = self.config.battery_low_percent,
                "battery low"
            );
            self.announcer.announce(&low_battery_announcement(percent));
            self.apply(SupervisorEvent::LowBattery);
        }
    }

    fn assess(&mut self, assessment: &Assessment) {
        let Assessment::Reading {
            level, confirmed, ..
        } = *assessment
        else {
            return;
        };
        self.last_level = Some(level);

        if level == HazardLevel::Hard
            && !self.config.debounce_hard
            && matches!(self.state(), SafetyState::Normal | SafetyState::Avoiding)
        {
            self.apply(SupervisorEvent::HardTrip);
        }
        match confirmed {
            Some(HazardLevel::Soft) if !self.recovery.avoid_soft => {
                warn!(source = self.hazard.name(), "soft hazard confirmed; holding position");
            }
            Some(level) => self.apply(SupervisorEvent::Hazard(level)),
            None => {}
        }
    }

    /// A source that never avoids holds still while anything is in range.
    fn holding(&self) -> bool {
        !self.recovery.avoid_soft
            && matches!(
                self.last_level,
                Some(HazardLevel::Soft | HazardLevel::Hard)
            )
    }

    /// Pick this tick's command.  `fresh` is false when no valid sample
    /// arrived, in which case the robot does not cruise blind.
    fn next_command(&mut self, fresh: bool) -> Option<(Direction, u32)> {
        match self.state() {
            SafetyState::Normal => (fresh && !self.holding())
                .then_some((Direction::Forward, self.config.cruise_steps)),
            SafetyState::Avoiding => self.maneuver.pop_front(),
            SafetyState::HardStopped => {
                if self.maneuver.is_empty() {
                    if self.last_level != Some(HazardLevel::Hard) {
                        self.apply(SupervisorEvent::RecoveryComplete);
                        return None;
                    }
                    self.recovery_attempts += 1;
                    if self.recovery_attempts > self.config.max_recovery_attempts {
                        error!(
                            attempts = self.config.max_recovery_attempts,
                            "hazard persists after recovery attempts"
                        );
                        self.apply(SupervisorEvent::RecoveryFailed);
                        return None;
                    }
                    warn!(attempt = self.recovery_attempts, "hazard persists; backing off again");
                    self.maneuver.extend(self.recovery.hard_stop.iter().copied());
                }
                self.maneuver.pop_front()
            }
            SafetyState::Returning => match self.route.front() {
                Some(step) => Some((step.direction, step.steps)),
                None => {
                    self.apply(SupervisorEvent::DockReached);
                    None
                }
            },
            SafetyState::Overridden | SafetyState::EStopped => None,
        }
    }

    fn after_dispatch(&mut self, chosen_in: SafetyState, result: &DispatchResult) {
        match chosen_in {
            SafetyState::Avoiding => {
                if self.maneuver.is_empty() && self.state() == SafetyState::Avoiding {
                    self.apply(SupervisorEvent::ManeuverComplete);
                }
            }
            SafetyState::Returning => match result {
                DispatchResult::Success(_) => {
                    self.route.pop_front();
                    self.route_failures = 0;
                    debug!(remaining = self.route.len(), "return leg complete");
                    if self.route.is_empty() {
                        self.apply(SupervisorEvent::DockReached);
                    }
                }
                DispatchResult::Failed { .. } => {
                    self.route_failures += 1;
                    if self.route_failures > self.config.max_recovery_attempts {
                        error!(failures = self.route_failures, "return leg keeps failing");
                        self.apply(SupervisorEvent::EStop(EStopCause::ReturnAborted));
                    } else {
                        warn!(failures = self.route_failures, "return leg failed; retrying");
                    }
                }
                DispatchResult::Suppressed => {}
            },
            _ => {}
        }
    }

    // ── Transitions ─────────────────────────────────────────────────────────

    fn apply(&mut self, event: SupervisorEvent) {
        let Some(transition) = self.machine.handle_event(event) else {
            return;
        };
        self.writer.set(transition.to);
        self.on_enter(&transition, event);

        if transition.is_reentry() {
            debug!(state = %transition.to, cause = %transition.cause, "maneuver restarted");
            return;
        }
        let Transition { from, to, cause } = transition;
        match to {
            SafetyState::HardStopped | SafetyState::EStopped => {
                warn!(%from, %to, %cause, "safety transition")
            }
            SafetyState::Overridden | SafetyState::Returning => {
                info!(%from, %to, %cause, "safety transition")
            }
            SafetyState::Normal | SafetyState::Avoiding => {
                debug!(%from, %to, %cause, "safety transition")
            }
        }
        // No subscribers is fine.
        let _ = self.events.send(TransitionEvent::new(from, to, cause));
    }

    fn on_enter(&mut self, transition: &Transition, event: SupervisorEvent) {
        let resumed = transition.from == SafetyState::Overridden;
        match transition.to {
            SafetyState::Normal => {
                self.maneuver.clear();
                self.recovery_attempts = 0;
            }
            SafetyState::Avoiding => {
                self.maneuver.clear();
                self.maneuver
                    .push_back((Direction::Backward, self.config.avoid_backoff_steps));
                self.maneuver
                    .push_back((Direction::Right, self.config.avoid_turn_steps));
            }
            SafetyState::HardStopped => {
                if !resumed {
                    self.recovery_attempts = 1;
                    self.announcer.announce(self.recovery.announcement);
                }
                self.maneuver.clear();
                self.maneuver.extend(self.recovery.hard_stop.iter().copied());
            }
            SafetyState::Overridden => self.maneuver.clear(),
            SafetyState::Returning => {
                self.maneuver.clear();
                if !self.route_loaded {
                    self.route = self.config.return_route.iter().copied().collect();
                    self.route_loaded = true;
                    self.route_failures = 0;
                }
            }
            SafetyState::EStopped => {
                self.maneuver.clear();
                if event == SupervisorEvent::DockReached {
                    self.announcer.announce(DOCKED_ANNOUNCEMENT);
                } else {
                    self.announcer.announce(ESTOP_ANNOUNCEMENT);
                }
            }
        }
    }
}
