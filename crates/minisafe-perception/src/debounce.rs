//! [`DebounceClassifier`] – threshold classification with consecutive-reading
//! confirmation.
//!
//! A filtered value sitting right on a threshold flickers between two levels
//! from one tick to the next.  The classifier keeps one counter per
//! [`HazardLevel`]; observing a level bumps its counter and zeroes the others.
//! When a counter reaches `confirm_count` the level is emitted once and the
//! counter starts over, so a persistent condition re-confirms every
//! `confirm_count` ticks instead of every tick.
//!
//! # Example
//!
//! ```rust
//! use minisafe_perception::debounce::{DebounceClassifier, Thresholds};
//! use minisafe_types::HazardLevel;
//!
//! let thresholds = Thresholds::Proximity { soft_cm: 20.0, hard_cm: 8.0 };
//! let mut debounce = DebounceClassifier::new(thresholds, 2);
//!
//! assert_eq!(debounce.observe(15.0), (HazardLevel::Soft, None));
//! assert_eq!(debounce.observe(15.0), (HazardLevel::Soft, Some(HazardLevel::Soft)));
//! ```

use minisafe_types::HazardLevel;

/// Classification thresholds for one kind of sensor.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Thresholds {
    /// Closer is worse: `value <= hard_cm` is hard, `value <= soft_cm` is soft.
    Proximity { soft_cm: f32, hard_cm: f32 },
    /// Larger magnitude is worse: `|value| >= trip_deg` is hard,
    /// `|value| >= warn_deg` is soft.
    Tilt { warn_deg: f32, trip_deg: f32 },
}

impl Thresholds {
    /// Check that both thresholds are finite and the soft one sits on the
    /// safe side of the hard one.
    pub fn validate(&self) -> Result<(), String> {
        match *self {
            Thresholds::Proximity { soft_cm, hard_cm } => {
                if !soft_cm.is_finite() || !hard_cm.is_finite() {
                    return Err(format!(
                        "soft_distance_cm ({soft_cm}) and hard_distance_cm ({hard_cm}) must be finite"
                    ));
                }
                if soft_cm <= hard_cm {
                    return Err(format!(
                        "soft_distance_cm ({soft_cm}) must be greater than hard_distance_cm ({hard_cm})"
                    ));
                }
                if hard_cm <= 0.0 {
                    return Err(format!("hard_distance_cm ({hard_cm}) must be positive"));
                }
            }
            Thresholds::Tilt { warn_deg, trip_deg } => {
                if !warn_deg.is_finite() || !trip_deg.is_finite() {
                    return Err(format!(
                        "warn_deg ({warn_deg}) and hard_stop_trip_deg ({trip_deg}) must be finite"
                    ));
                }
                if warn_deg >= trip_deg {
                    return Err(format!(
                        "warn_deg ({warn_deg}) must be less than hard_stop_trip_deg ({trip_deg})"
                    ));
                }
                if warn_deg <= 0.0 {
                    return Err(format!("warn_deg ({warn_deg}) must be positive"));
                }
            }
        }
        Ok(())
    }

    /// Map a filtered value onto a hazard level.
    pub fn classify(&self, value: f32) -> HazardLevel {
        match *self {
            Thresholds::Proximity { soft_cm, hard_cm } => {
                if value <= hard_cm {
                    HazardLevel::Hard
                } else if value <= soft_cm {
                    HazardLevel::Soft
                } else {
                    HazardLevel::Clear
                }
            }
            Thresholds::Tilt { warn_deg, trip_deg } => {
                let magnitude = value.abs();
                if magnitude >= trip_deg {
                    HazardLevel::Hard
                } else if magnitude >= warn_deg {
                    HazardLevel::Soft
                } else {
                    HazardLevel::Clear
                }
            }
        }
    }
}

/// Threshold classifier with per-level consecutive-occurrence counters.
#[derive(Debug, Clone)]
pub struct DebounceClassifier {
    thresholds: Thresholds,
    confirm_count: u32,
    counters: [u32; 3],
}

impl DebounceClassifier {
    /// `confirm_count` of zero is treated as one (confirm on first sight).
    pub fn new(thresholds: Thresholds, confirm_count: u32) -> Self {
        Self {
            thresholds,
            confirm_count: confirm_count.max(1),
            counters: [0; 3],
        }
    }

    pub fn thresholds(&self) -> Thresholds {
        self.thresholds
    }

    /// Classify without touching the counters.
    pub fn classify(&self, value: f32) -> HazardLevel {
        self.thresholds.classify(value)
    }

    /// Record one observation of `level`.
    ///
    /// Returns `Some(level)` exactly on the observation that brings its
    /// counter to `confirm_count`; the counter then restarts from zero.
    pub fn confirm(&mut self, level: HazardLevel) -> Option<HazardLevel> {
        for other in HazardLevel::ALL {
            if other != level {
                self.counters[other.index()] = 0;
            }
        }
        let counter = &mut self.counters[level.index()];
        *counter += 1;
        if *counter >= self.confirm_count {
            *counter = 0;
            Some(level)
        } else {
            None
        }
    }

    /// Classify `value` and feed the result to [`confirm`][Self::confirm].
    pub fn observe(&mut self, value: f32) -> (HazardLevel, Option<HazardLevel>) {
        let level = self.classify(value);
        (level, self.confirm(level))
    }

    /// Current consecutive count for `level`.
    pub fn counter(&self, level: HazardLevel) -> u32 {
        self.counters[level.index()]
    }

    pub fn reset(&mut self) {
        self.counters = [0; 3];
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn proximity(confirm: u32) -> DebounceClassifier {
        DebounceClassifier::new(
            Thresholds::Proximity {
                soft_cm: 20.0,
                hard_cm: 8.0,
            },
            confirm,
        )
    }

    fn tilt(confirm: u32) -> DebounceClassifier {
        DebounceClassifier::new(
            Thresholds::Tilt {
                warn_deg: 10.0,
                trip_deg: 18.0,
            },
            confirm,
        )
    }

    #[test]
    fn proximity_classification_boundaries() {
        let d = proximity(2);
        assert_eq!(d.classify(5.0), HazardLevel::Hard);
        assert_eq!(d.classify(8.0), HazardLevel::Hard);
        assert_eq!(d.classify(8.5), HazardLevel::Soft);
        assert_eq!(d.classify(20.0), HazardLevel::Soft);
        assert_eq!(d.classify(20.1), HazardLevel::Clear);
    }

    #[test]
    fn tilt_classification_is_symmetric() {
        let d = tilt(3);
        assert_eq!(d.classify(-18.0), HazardLevel::Hard);
        assert_eq!(d.classify(18.0), HazardLevel::Hard);
        assert_eq!(d.classify(-10.0), HazardLevel::Soft);
        assert_eq!(d.classify(9.9), HazardLevel::Clear);
    }

    #[test]
    fn confirmation_is_edge_triggered() {
        let mut d = proximity(2);
        assert_eq!(d.confirm(HazardLevel::Soft), None);
        assert_eq!(d.confirm(HazardLevel::Soft), Some(HazardLevel::Soft));
        // Counter restarted: the next observation alone does not re-confirm.
        assert_eq!(d.confirm(HazardLevel::Soft), None);
        assert_eq!(d.confirm(HazardLevel::Soft), Some(HazardLevel::Soft));
    }

    #[test]
    fn level_change_resets_other_counters() {
        let mut d = proximity(3);
        d.confirm(HazardLevel::Soft);
        d.confirm(HazardLevel::Soft);
        assert_eq!(d.counter(HazardLevel::Soft), 2);
        // confirm_count - 1 observations followed by a different level …
        assert_eq!(d.confirm(HazardLevel::Clear), None);
        assert_eq!(d.counter(HazardLevel::Soft), 0);
        // … never confirms the original level on its next sighting.
        assert_eq!(d.confirm(HazardLevel::Soft), None);
        assert_eq!(d.confirm(HazardLevel::Soft), None);
        assert_eq!(d.confirm(HazardLevel::Soft), Some(HazardLevel::Soft));
    }

    #[test]
    fn interleaved_levels_never_confirm() {
        let mut d = proximity(2);
        for _ in 0..10 {
            assert_eq!(d.confirm(HazardLevel::Soft), None);
            assert_eq!(d.confirm(HazardLevel::Clear), None);
        }
    }

    #[test]
    fn three_soft_readings_confirm_after_two() {
        let mut d = proximity(2);
        let results: Vec<_> = (0..3).map(|_| d.observe(15.0)).collect();
        assert_eq!(results[0], (HazardLevel::Soft, None));
        assert_eq!(results[1], (HazardLevel::Soft, Some(HazardLevel::Soft)));
        assert_eq!(results[2], (HazardLevel::Soft, None));
    }

    #[test]
    fn zero_confirm_count_confirms_immediately() {
        let mut d = proximity(0);
        assert_eq!(d.confirm(HazardLevel::Hard), Some(HazardLevel::Hard));
    }

    #[test]
    fn threshold_validation() {
        assert!(
            Thresholds::Proximity {
                soft_cm: 20.0,
                hard_cm: 8.0
            }
            .validate()
            .is_ok()
        );
        assert!(
            Thresholds::Proximity {
                soft_cm: 8.0,
                hard_cm: 20.0
            }
            .validate()
            .is_err()
        );
        assert!(
            Thresholds::Tilt {
                warn_deg: 18.0,
                trip_deg: 10.0
            }
            .validate()
            .is_err()
        );
    }

    #[test]
    fn non_finite_thresholds_are_rejected() {
        let bad = [
            Thresholds::Proximity {
                soft_cm: f32::NAN,
                hard_cm: f32::NAN,
            },
            Thresholds::Proximity {
                soft_cm: 20.0,
                hard_cm: f32::NAN,
            },
            Thresholds::Proximity {
                soft_cm: f32::INFINITY,
                hard_cm: 8.0,
            },
            Thresholds::Tilt {
                warn_deg: f32::NAN,
                trip_deg: 18.0,
            },
            Thresholds::Tilt {
                warn_deg: 10.0,
                trip_deg: f32::INFINITY,
            },
        ];
        for thresholds in bad {
            let err = thresholds.validate().unwrap_err();
            assert!(err.contains("must be finite"), "{thresholds:?}: {err}");
        }
    }

    #[test]
    fn reset_zeroes_all_counters() {
        let mut d = tilt(3);
        d.observe(12.0);
        d.reset();
        for level in HazardLevel::ALL {
            assert_eq!(d.counter(level), 0);
        }
    }
}
