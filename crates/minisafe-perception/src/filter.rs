//! [`SensorFilter`] – range check plus sliding-window median.
//!
//! Single-sample spikes are common on cheap IR and ultrasonic sensors.  The
//! median of a short window ignores them where a mean would be dragged along.
//! Samples outside the physically sane range never enter the window at all.
//!
//! # Example
//!
//! ```rust
//! use minisafe_perception::filter::{FilterOutput, SensorFilter, ValidRange};
//!
//! let mut filter = SensorFilter::new(3, ValidRange::distance(), 5);
//! filter.ingest_value(30.0).unwrap();
//! filter.ingest_value(31.0).unwrap();
//! // A spike is outvoted by its neighbours.
//! assert_eq!(filter.ingest_value(4000.0).unwrap(), FilterOutput::Filtered(31.0));
//! // A non-positive reading is rejected outright.
//! assert!(matches!(filter.ingest_value(-1.0).unwrap(), FilterOutput::Rejected { .. }));
//! ```

use std::collections::VecDeque;

use minisafe_types::SensorSample;
use thiserror::Error;
use tracing::debug;

/// Upper bound for a believable distance reading, in centimetres.
pub const MAX_DISTANCE_CM: f32 = 5000.0;

/// Upper bound for a believable tilt magnitude, in degrees.
pub const MAX_TILT_DEG: f32 = 180.0;

/// The physically sane range for a sensor's scalar output.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum ValidRange {
    /// `0 < value <= max_cm`.
    Distance { max_cm: f32 },
    /// `|value| <= max_abs_deg`.
    Angle { max_abs_deg: f32 },
}

impl ValidRange {
    pub fn distance() -> Self {
        ValidRange::Distance {
            max_cm: MAX_DISTANCE_CM,
        }
    }

    pub fn angle() -> Self {
        ValidRange::Angle {
            max_abs_deg: MAX_TILT_DEG,
        }
    }

    /// `true` if `value` is finite and inside the range.
    pub fn accepts(&self, value: f32) -> bool {
        if !value.is_finite() {
            return false;
        }
        match *self {
            ValidRange::Distance { max_cm } => value > 0.0 && value <= max_cm,
            ValidRange::Angle { max_abs_deg } => value.abs() <= max_abs_deg,
        }
    }
}

/// Result of feeding one sample (or one failed read) to the filter.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum FilterOutput {
    /// The median of the window after the new sample was added.
    Filtered(f32),
    /// The sample was discarded; the window is unchanged.
    Rejected { consecutive_failures: u32 },
}

/// Escalated sensor failure.  The supervisor treats this as fatal.
#[derive(Error, Debug, Clone, Copy, PartialEq, Eq)]
pub enum SensorFailure {
    #[error("persistent sensor failure after {consecutive_failures} consecutive bad reads")]
    Persistent { consecutive_failures: u32 },
}

/// Median of `values`: the middle element for odd lengths, the mean of the
/// two middle elements for even lengths.  `None` when empty.
pub fn median(values: &[f32]) -> Option<f32> {
    if values.is_empty() {
        return None;
    }
    let mut sorted = values.to_vec();
    sorted.sort_by(f32::total_cmp);
    let mid = sorted.len() / 2;
    if sorted.len() % 2 == 1 {
        Some(sorted[mid])
    } else {
        Some(0.5 * (sorted[mid - 1] + sorted[mid]))
    }
}

/// Range-checking median filter with a consecutive-failure counter.
#[derive(Debug, Clone)]
pub struct SensorFilter {
    window: VecDeque<f32>,
    capacity: usize,
    range: ValidRange,
    failure_limit: u32,
    consecutive_failures: u32,
}

impl SensorFilter {
    /// Create a filter holding at most `capacity` samples.
    ///
    /// A `capacity` of zero is treated as one.
    pub fn new(capacity: usize, range: ValidRange, failure_limit: u32) -> Self {
        let capacity = capacity.max(1);
        Self {
            window: VecDeque::with_capacity(capacity),
            capacity,
            range,
            failure_limit,
            consecutive_failures: 0,
        }
    }

    /// Fold a captured sample into the window.
    pub fn ingest(&mut self, sample: &SensorSample) -> Result<FilterOutput, SensorFailure> {
        self.ingest_value(sample.magnitude())
    }

    /// Fold a raw scalar into the window.
    ///
    /// # Errors
    ///
    /// Returns [`SensorFailure::Persistent`] when this rejection brings the
    /// consecutive-failure count to the configured limit.
    pub fn ingest_value(&mut self, value: f32) -> Result<FilterOutput, SensorFailure> {
        if !self.range.accepts(value) {
            debug!(value, "discarding out-of-range sample");
            return self.record_failure();
        }
        self.consecutive_failures = 0;
        if self.window.len() == self.capacity {
            self.window.pop_front();
        }
        self.window.push_back(value);
        let values: Vec<f32> = self.window.iter().copied().collect();
        // The window is non-empty here, so the median always exists.
        Ok(FilterOutput::Filtered(median(&values).unwrap_or(value)))
    }

    /// Count a failed adapter read (error or timeout) without touching the
    /// window.
    ///
    /// # Errors
    ///
    /// Returns [`SensorFailure::Persistent`] once the limit is reached.
    pub fn record_failure(&mut self) -> Result<FilterOutput, SensorFailure> {
        self.consecutive_failures = self.consecutive_failures.saturating_add(1);
        if self.consecutive_failures >= self.failure_limit {
            return Err(SensorFailure::Persistent {
                consecutive_failures: self.consecutive_failures,
            });
        }
        Ok(FilterOutput::Rejected {
            consecutive_failures: self.consecutive_failures,
        })
    }

    /// Number of samples currently held.
    pub fn window_len(&self) -> usize {
        self.window.len()
    }

    /// Maximum number of samples held.
    pub fn capacity(&self) -> usize {
        self.capacity
    }

    pub fn consecutive_failures(&self) -> u32 {
        self.consecutive_failures
    }

    /// Current median without adding a sample.
    pub fn current(&self) -> Option<f32> {
        let values: Vec<f32> = self.window.iter().copied().collect();
        median(&values)
    }

    /// Drop all samples and clear the failure counter.
    pub fn reset(&mut self) {
        self.window.clear();
        self.consecutive_failures = 0;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use minisafe_types::Reading;

    fn distance_filter(capacity: usize) -> SensorFilter {
        SensorFilter::new(capacity, ValidRange::distance(), 5)
    }

    #[test]
    fn median_odd_and_even() {
        assert_eq!(median(&[]), None);
        assert_eq!(median(&[7.0]), Some(7.0));
        assert_eq!(median(&[3.0, 1.0, 2.0]), Some(2.0));
        assert_eq!(median(&[4.0, 1.0, 3.0, 2.0]), Some(2.5));
    }

    #[test]
    fn window_never_exceeds_capacity() {
        let mut f = distance_filter(3);
        for i in 1..=50 {
            f.ingest_value(i as f32).unwrap();
            assert!(f.window_len() <= 3);
        }
        assert_eq!(f.window_len(), 3);
        // Holds the three most recent samples: 48, 49, 50.
        assert_eq!(f.current(), Some(49.0));
    }

    #[test]
    fn even_window_averages_middle_pair() {
        let mut f = distance_filter(4);
        f.ingest_value(10.0).unwrap();
        f.ingest_value(20.0).unwrap();
        f.ingest_value(30.0).unwrap();
        assert_eq!(f.ingest_value(40.0).unwrap(), FilterOutput::Filtered(25.0));
    }

    #[test]
    fn out_of_range_sample_is_excluded_from_median() {
        let mut with_bad = distance_filter(3);
        let mut clean = distance_filter(3);
        for v in [30.0, 32.0] {
            with_bad.ingest_value(v).unwrap();
            clean.ingest_value(v).unwrap();
        }
        assert!(matches!(
            with_bad.ingest_value(0.0).unwrap(),
            FilterOutput::Rejected {
                consecutive_failures: 1
            }
        ));
        assert!(matches!(
            with_bad.ingest_value(6000.0).unwrap(),
            FilterOutput::Rejected {
                consecutive_failures: 2
            }
        ));
        assert_eq!(with_bad.window_len(), 2);
        assert_eq!(with_bad.ingest_value(31.0), clean.ingest_value(31.0));
    }

    #[test]
    fn valid_sample_resets_failure_counter() {
        let mut f = distance_filter(3);
        f.record_failure().unwrap();
        f.record_failure().unwrap();
        assert_eq!(f.consecutive_failures(), 2);
        f.ingest_value(50.0).unwrap();
        assert_eq!(f.consecutive_failures(), 0);
    }

    #[test]
    fn failures_escalate_at_limit() {
        let mut f = distance_filter(3);
        for n in 1..5 {
            assert_eq!(
                f.record_failure(),
                Ok(FilterOutput::Rejected {
                    consecutive_failures: n
                })
            );
        }
        assert_eq!(
            f.ingest_value(f32::NAN),
            Err(SensorFailure::Persistent {
                consecutive_failures: 5
            })
        );
    }

    #[test]
    fn angle_range_rejects_nan_and_absurd_tilt() {
        let mut f = SensorFilter::new(3, ValidRange::angle(), 5);
        assert!(matches!(
            f.ingest_value(f32::NAN).unwrap(),
            FilterOutput::Rejected { .. }
        ));
        assert!(matches!(
            f.ingest_value(270.0).unwrap(),
            FilterOutput::Rejected { .. }
        ));
        assert_eq!(f.ingest_value(0.0).unwrap(), FilterOutput::Filtered(0.0));
    }

    #[test]
    fn ingest_sample_uses_tilt_magnitude() {
        let mut f = SensorFilter::new(3, ValidRange::angle(), 5);
        let sample = SensorSample::now(Reading::Attitude {
            pitch_deg: 3.0,
            roll_deg: -14.0,
        });
        assert_eq!(f.ingest(&sample).unwrap(), FilterOutput::Filtered(14.0));
    }

    #[test]
    fn zero_capacity_is_clamped_to_one() {
        let mut f = distance_filter(0);
        assert_eq!(f.capacity(), 1);
        f.ingest_value(10.0).unwrap();
        assert_eq!(f.ingest_value(90.0).unwrap(), FilterOutput::Filtered(90.0));
    }

    #[test]
    fn reset_clears_window_and_failures() {
        let mut f = distance_filter(3);
        f.ingest_value(10.0).unwrap();
        f.record_failure().unwrap();
        f.reset();
        assert_eq!(f.window_len(), 0);
        assert_eq!(f.consecutive_failures(), 0);
        assert_eq!(f.current(), None);
    }
}
