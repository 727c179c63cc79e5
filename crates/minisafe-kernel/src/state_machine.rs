//! [`SafetyStateMachine`] – the supervisor's transition rules, with no I/O.
//!
//! The supervisor turns sensor assessments, battery polls, maneuver progress
//! and operator input into [`SupervisorEvent`]s and feeds them here one at a
//! time.  The machine answers with an optional [`Transition`]; the supervisor
//! then performs the entry actions (queueing maneuvers, announcing, writing
//! the shared state cell).
//!
//! | From | Event | To |
//! |------|-------|----|
//! | Normal | `Hazard(Soft)` | Avoiding |
//! | Normal, Avoiding | `Hazard(Hard)`, `HardTrip` | HardStopped |
//! | Avoiding | `Hazard(Soft)` | Avoiding (re-entry, maneuver restarts) |
//! | Avoiding | `Hazard(Clear)` once the maneuver is complete | Normal |
//! | HardStopped | `RecoveryComplete` | Normal |
//! | HardStopped | `RecoveryFailed` | EStopped |
//! | any but EStopped/Overridden | `OverrideEngaged` | Overridden |
//! | Overridden | `OverrideReleased` | prior state, or Returning if the battery latched meanwhile |
//! | any but EStopped | `LowBattery` (first time only) | Returning (deferred while Overridden) |
//! | Returning | `DockReached` | EStopped |
//! | any but EStopped | `EStop(_)` | EStopped |
//!
//! `EStopped` is terminal: every event is ignored there.
//!
//! # Example
//!
//! ```
//! use minisafe_kernel::state_machine::{SafetyStateMachine, SupervisorEvent};
//! use minisafe_types::{HazardLevel, SafetyState};
//!
//! let mut sm = SafetyStateMachine::new();
//! let t = sm.handle_event(SupervisorEvent::Hazard(HazardLevel::Soft)).unwrap();
//! assert_eq!(t.to, SafetyState::Avoiding);
//! assert!(sm.handle_event(SupervisorEvent::Hazard(HazardLevel::Clear)).is_none());
//! ```

use std::fmt;

use minisafe_types::{HazardLevel, SafetyState};

/// Why an emergency stop was entered.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EStopCause {
    /// Console `e` key or Ctrl-C.
    Operator,
    /// The hazard source hit its consecutive-failure limit.
    SensorFailure,
    /// A return-route step kept failing.
    ReturnAborted,
}

impl fmt::Display for EStopCause {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            EStopCause::Operator => write!(f, "operator e-stop"),
            EStopCause::SensorFailure => write!(f, "persistent sensor failure"),
            EStopCause::ReturnAborted => write!(f, "return route aborted"),
        }
    }
}

/// Inputs to the state machine.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SupervisorEvent {
    /// A debounced, confirmed hazard level.
    Hazard(HazardLevel),
    /// A single instantaneous hard reading (immediate trip).
    HardTrip,
    /// The current avoidance maneuver has been fully dispatched.
    ManeuverComplete,
    /// The hard-stop back-off finished and the hazard is gone.
    RecoveryComplete,
    /// The hard-stop back-off was retried too often without clearing.
    RecoveryFailed,
    OverrideEngaged,
    OverrideReleased,
    /// Battery at or below the low threshold.
    LowBattery,
    /// The last return-route step completed.
    DockReached,
    EStop(EStopCause),
}

/// A state change decided by the machine.
///
/// `from == to` marks a re-entry: the state is unchanged but its entry
/// action (e.g. the avoidance maneuver) must run again.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Transition {
    pub from: SafetyState,
    pub to: SafetyState,
    pub cause: String,
}

impl Transition {
    fn new(from: SafetyState, to: SafetyState, cause: impl Into<String>) -> Self {
        Self {
            from,
            to,
            cause: cause.into(),
        }
    }

    pub fn is_reentry(&self) -> bool {
        self.from == self.to
    }
}

/// Pure safety state machine.
#[derive(Debug, Clone)]
pub struct SafetyStateMachine {
    state: SafetyState,
    /// State to resume when override is released.
    resume: Option<SafetyState>,
    battery_latched: bool,
    /// Low battery fired while the operator held override.
    return_pending: bool,
    maneuver_done: bool,
    clear_seen: bool,
}

impl Default for SafetyStateMachine {
    fn default() -> Self {
        Self::new()
    }
}

impl SafetyStateMachine {
    /// A machine in [`SafetyState::Normal`].
    pub fn new() -> Self {
        Self {
            state: SafetyState::Normal,
            resume: None,
            battery_latched: false,
            return_pending: false,
            maneuver_done: false,
            clear_seen: false,
        }
    }

    pub fn state(&self) -> SafetyState {
        self.state
    }

    /// The state that releasing override would resume, if overridden.
    pub fn resume_state(&self) -> Option<SafetyState> {
        if self.state != SafetyState::Overridden {
            return None;
        }
        if self.return_pending {
            Some(SafetyState::Returning)
        } else {
            self.resume
        }
    }

    /// `true` once the low-battery latch has fired.
    pub fn battery_latched(&self) -> bool {
        self.battery_latched
    }

    /// Apply one event.  Returns the transition taken, if any.
    pub fn handle_event(&mut self, event: SupervisorEvent) -> Option<Transition> {
        use HazardLevel as L;
        use SafetyState as S;
        use SupervisorEvent as E;

        let from = self.state;
        let (to, cause) = match (from, event) {
            (S::EStopped, _) => return None,

            (_, E::EStop(cause)) => (S::EStopped, cause.to_string()),

            (S::Overridden, E::LowBattery) => {
                if self.battery_latched {
                    return None;
                }
                self.battery_latched = true;
                self.return_pending = true;
                return None;
            }
            (_, E::LowBattery) => {
                if self.battery_latched {
                    return None;
                }
                self.battery_latched = true;
                (S::Returning, "battery low".to_string())
            }

            (S::Overridden, E::OverrideEngaged) => return None,
            (_, E::OverrideEngaged) => {
                self.resume = Some(from);
                (S::Overridden, "operator override engaged".to_string())
            }
            (S::Overridden, E::OverrideReleased) => {
                let to = if self.return_pending {
                    self.return_pending = false;
                    S::Returning
                } else {
                    self.resume.unwrap_or(S::Normal)
                };
                self.resume = None;
                (to, "operator override released".to_string())
            }

            (S::Normal, E::Hazard(L::Soft)) => (S::Avoiding, "confirmed soft hazard".to_string()),
            (S::Avoiding, E::Hazard(L::Soft)) => {
                (S::Avoiding, "soft hazard persists".to_string())
            }
            (S::Normal | S::Avoiding, E::Hazard(L::Hard)) => {
                (S::HardStopped, "confirmed hard hazard".to_string())
            }
            (S::Normal | S::Avoiding, E::HardTrip) => {
                (S::HardStopped, "hard trip".to_string())
            }

            (S::Avoiding, E::Hazard(L::Clear)) => {
                self.clear_seen = true;
                if !self.maneuver_done {
                    return None;
                }
                (S::Normal, "path clear".to_string())
            }
            (S::Avoiding, E::ManeuverComplete) => {
                self.maneuver_done = true;
                if !self.clear_seen {
                    return None;
                }
                (S::Normal, "path clear".to_string())
            }

            (S::HardStopped, E::RecoveryComplete) => {
                (S::Normal, "recovery complete".to_string())
            }
            (S::HardStopped, E::RecoveryFailed) => (S::EStopped, "recovery failed".to_string()),

            (S::Returning, E::DockReached) => (S::EStopped, "dock reached".to_string()),

            _ => return None,
        };

        self.enter(to);
        Some(Transition::new(from, to, cause))
    }

    fn enter(&mut self, to: SafetyState) {
        if to == SafetyState::Avoiding {
            self.maneuver_done = false;
            self.clear_seen = false;
        }
        self.state = to;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use HazardLevel as L;
    use SafetyState as S;
    use SupervisorEvent as E;

    fn to(sm: &mut SafetyStateMachine, event: SupervisorEvent) -> Option<SafetyState> {
        sm.handle_event(event).map(|t| t.to)
    }

    #[test]
    fn initial_state_is_normal() {
        assert_eq!(SafetyStateMachine::new().state(), S::Normal);
    }

    #[test]
    fn soft_then_clear_after_maneuver() {
        let mut sm = SafetyStateMachine::new();
        assert_eq!(to(&mut sm, E::Hazard(L::Soft)), Some(S::Avoiding));
        // Clear before the maneuver finished is remembered, not acted on.
        assert_eq!(to(&mut sm, E::Hazard(L::Clear)), None);
        assert_eq!(sm.state(), S::Avoiding);
        assert_eq!(to(&mut sm, E::ManeuverComplete), Some(S::Normal));
    }

    #[test]
    fn maneuver_complete_then_clear() {
        let mut sm = SafetyStateMachine::new();
        to(&mut sm, E::Hazard(L::Soft));
        assert_eq!(to(&mut sm, E::ManeuverComplete), None);
        assert_eq!(to(&mut sm, E::Hazard(L::Clear)), Some(S::Normal));
    }

    #[test]
    fn repeated_soft_reenters_avoiding() {
        let mut sm = SafetyStateMachine::new();
        to(&mut sm, E::Hazard(L::Soft));
        to(&mut sm, E::ManeuverComplete);
        let t = sm.handle_event(E::Hazard(L::Soft)).unwrap();
        assert!(t.is_reentry());
        // Re-entry resets maneuver progress.
        assert_eq!(to(&mut sm, E::Hazard(L::Clear)), None);
    }

    #[test]
    fn hard_trip_from_normal_and_avoiding() {
        let mut sm = SafetyStateMachine::new();
        assert_eq!(to(&mut sm, E::HardTrip), Some(S::HardStopped));

        let mut sm = SafetyStateMachine::new();
        to(&mut sm, E::Hazard(L::Soft));
        assert_eq!(to(&mut sm, E::Hazard(L::Hard)), Some(S::HardStopped));
    }

    #[test]
    fn hard_stop_ignores_hazards_until_recovery() {
        let mut sm = SafetyStateMachine::new();
        to(&mut sm, E::HardTrip);
        assert_eq!(to(&mut sm, E::Hazard(L::Clear)), None);
        assert_eq!(to(&mut sm, E::HardTrip), None);
        assert_eq!(to(&mut sm, E::RecoveryComplete), Some(S::Normal));
    }

    #[test]
    fn failed_recovery_is_terminal() {
        let mut sm = SafetyStateMachine::new();
        to(&mut sm, E::HardTrip);
        assert_eq!(to(&mut sm, E::RecoveryFailed), Some(S::EStopped));
        assert_eq!(to(&mut sm, E::OverrideEngaged), None);
        assert_eq!(to(&mut sm, E::Hazard(L::Soft)), None);
        assert_eq!(sm.state(), S::EStopped);
    }

    #[test]
    fn override_suspends_and_resumes_prior_state() {
        let mut sm = SafetyStateMachine::new();
        to(&mut sm, E::HardTrip);
        assert_eq!(to(&mut sm, E::OverrideEngaged), Some(S::Overridden));
        assert_eq!(sm.resume_state(), Some(S::HardStopped));
        assert_eq!(to(&mut sm, E::Hazard(L::Hard)), None);
        assert_eq!(to(&mut sm, E::OverrideEngaged), None);
        assert_eq!(to(&mut sm, E::OverrideReleased), Some(S::HardStopped));
        assert_eq!(sm.resume_state(), None);
    }

    #[test]
    fn release_without_override_is_ignored() {
        let mut sm = SafetyStateMachine::new();
        assert_eq!(to(&mut sm, E::OverrideReleased), None);
    }

    #[test]
    fn low_battery_latches_once() {
        let mut sm = SafetyStateMachine::new();
        assert_eq!(to(&mut sm, E::LowBattery), Some(S::Returning));
        assert!(sm.battery_latched());
        assert_eq!(to(&mut sm, E::LowBattery), None);
        assert_eq!(to(&mut sm, E::Hazard(L::Hard)), None);
        assert_eq!(to(&mut sm, E::DockReached), Some(S::EStopped));
    }

    #[test]
    fn low_battery_during_override_defers_return() {
        let mut sm = SafetyStateMachine::new();
        to(&mut sm, E::OverrideEngaged);
        assert_eq!(to(&mut sm, E::LowBattery), None);
        assert_eq!(sm.state(), S::Overridden);
        assert_eq!(sm.resume_state(), Some(S::Returning));
        assert_eq!(to(&mut sm, E::OverrideReleased), Some(S::Returning));
    }

    #[test]
    fn override_during_return_resumes_return() {
        let mut sm = SafetyStateMachine::new();
        to(&mut sm, E::LowBattery);
        to(&mut sm, E::OverrideEngaged);
        assert_eq!(to(&mut sm, E::OverrideReleased), Some(S::Returning));
    }

    #[test]
    fn estop_from_every_live_state() {
        let setups: [&[SupervisorEvent]; 5] = [
            &[],
            &[E::Hazard(L::Soft)],
            &[E::HardTrip],
            &[E::OverrideEngaged],
            &[E::LowBattery],
        ];
        for setup in setups {
            let mut sm = SafetyStateMachine::new();
            for event in setup {
                sm.handle_event(*event);
            }
            let t = sm
                .handle_event(E::EStop(EStopCause::Operator))
                .expect("e-stop must always transition");
            assert_eq!(t.to, S::EStopped);
            assert_eq!(t.cause, "operator e-stop");
        }
    }

    #[test]
    fn dock_reached_outside_return_is_ignored() {
        let mut sm = SafetyStateMachine::new();
        assert_eq!(to(&mut sm, E::DockReached), None);
        assert_eq!(to(&mut sm, E::RecoveryComplete), None);
    }
}
