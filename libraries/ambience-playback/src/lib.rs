//! Ambience Playback
//!
//! Turns tracker events into music: per-context track selection with
//! day-cycle gating, resolution through an external resolver, crossfade
//! handoff between sessions, host-game ducking and resume after an
//! interruption.
//!
//! # Example
//!
//! ```rust,no_run
//! use ambience_core::ModuleConfig;
//! use ambience_playback::{Collaborators, Orchestrator};
//! # async fn wire(deps: Collaborators, tracker: ambience_state::StateTracker) {
//! let orchestrator = Orchestrator::new(deps, ModuleConfig::default());
//! tokio::spawn(orchestrator.run(tracker.subscribe(), tracker.watch()));
//! # }
//! ```

#![forbid(unsafe_code)]

pub mod ducking;
pub mod error;
pub mod orchestrator;
pub mod selection;

pub use ducking::EasedHostVolume;
pub use error::{PlaybackError, Result};
pub use orchestrator::{Collaborators, Orchestrator, SavedPlayback};
