//! Ambience State
//!
//! Turns the game's telemetry feed into a debounced [`DiscreteState`],
//! a submerged flag and the current in-game time of day, published as
//! [`TrackerEvent`]s.
//!
//! [`DiscreteState`]: ambience_core::types::DiscreteState

#![forbid(unsafe_code)]

pub mod clock;
pub mod events;
pub mod lock_probe;
pub mod tracker;

pub use clock::{Clock, ManualClock, SystemClock};
pub use events::{TrackerEvent, TrackerSnapshot};
pub use lock_probe::{FileLockProbe, LockProbe, NeverLocked};
pub use tracker::{StateTracker, TrackerSettings};
