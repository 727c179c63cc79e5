//! `minisafe-perception` – turning noisy readings into hazard signals.
//!
//! # Modules
//!
//! - [`filter`] – [`SensorFilter`][filter::SensorFilter]: range-checks raw
//!   samples, keeps a small ring window and reports its median.  Counts
//!   consecutive failures and escalates to
//!   [`SensorFailure::Persistent`][filter::SensorFailure::Persistent].
//! - [`debounce`] – [`DebounceClassifier`][debounce::DebounceClassifier]:
//!   maps a filtered value onto a [`HazardLevel`][minisafe_types::HazardLevel]
//!   and only confirms a level after `confirm_count` consecutive observations.
//! - [`hazard`] – the pluggable [`HazardSource`][hazard::HazardSource]
//!   capability, its proximity and tilt implementations, and the
//!   [`HazardKind`][hazard::HazardKind] that tells them apart.

pub mod debounce;
pub mod filter;
pub mod hazard;

pub use debounce::{DebounceClassifier, Thresholds};
pub use filter::{FilterOutput, SensorFailure, SensorFilter, ValidRange, median};
pub use hazard::{Assessment, HazardKind, HazardSource, ProximitySource, TiltSource};
