//! Ambience Core
//!
//! Platform-agnostic types, collaborator traits and error handling shared by
//! the state tracker, the audio pipeline and the orchestrator.
//!
//! # Architecture
//!
//! - **Domain Types**: `Track`, `Playlist`, `DiscreteState`, `DayCycle`
//! - **Collaborator Traits**: `PersistenceStore`, `MetadataResolver`,
//!   `TelemetrySource`, `HostDucking`, `PlaybackPipeline`, `PipelineFactory`
//! - **Configuration**: `ModuleConfig`, loaded with the `config` crate
//! - **Scheduling**: `ScheduledTask` for cancellable deferred teardown
//!
//! # Example
//!
//! ```rust
//! use ambience_core::types::{DayCycle, TimeOfDay, Track};
//! use std::time::Duration;
//!
//! let mut track = Track::new("id", "Title", "https://example.com/id", Duration::from_secs(90));
//! track.day_cycles = DayCycle::NIGHT;
//! assert!(track.day_cycles.allows(TimeOfDay::Dusk));
//! ```

#![forbid(unsafe_code)]

pub mod config;
pub mod error;
pub mod pipeline;
pub mod schedule;
pub mod storage;
pub mod traits;
pub mod types;

// Re-export commonly used types
pub use config::ModuleConfig;
pub use error::{Error, ResolutionError, Result};
pub use pipeline::{Levels, PipelineFactory, PlaybackPipeline, Session, SessionSetup};
pub use schedule::ScheduledTask;
pub use storage::InMemoryStore;
pub use traits::{HostDucking, MetadataResolver, PersistenceStore, TelemetrySource};
