//! Playback pipeline seam
//!
//! A [`PlaybackPipeline`] owns one streaming track bound to an output device.
//! The orchestrator only sees this trait; the desktop crate implements it on
//! top of cpal.

use crate::schedule::ScheduledTask;
use crate::types::Track;
use async_trait::async_trait;
use std::time::Duration;

/// Inputs of the volume model that come from configuration
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Levels {
    pub master_volume: f32,
    pub muted: bool,
    /// Host game's own output level, applied as a final scale
    pub host_output_scale: f32,
}

impl Default for Levels {
    fn default() -> Self {
        Self {
            master_volume: 0.25,
            muted: false,
            host_output_scale: 1.0,
        }
    }
}

/// Per-session parameters fixed at construction
#[derive(Debug, Clone, PartialEq)]
pub struct SessionSetup {
    pub levels: Levels,
    pub submerged: bool,
    pub camera_z: f32,
    /// How long before the true end the ended latch fires
    pub end_offset: Duration,
    /// Output device name; `None` selects the default device
    pub device: Option<String>,
}

impl Default for SessionSetup {
    fn default() -> Self {
        Self {
            levels: Levels::default(),
            submerged: false,
            camera_z: 1.0,
            end_offset: Duration::from_secs(3),
            device: None,
        }
    }
}

/// One streaming track bound to a device
///
/// Every operation is infallible at this boundary: failures are logged by
/// the implementation and surface as `false` from [`play`](Self::play) or
/// through [`take_failure`](Self::take_failure).
#[async_trait]
pub trait PlaybackPipeline: Send + Sync {
    fn track(&self) -> &Track;

    /// Start output with a fade-in. Device initialization happens once per
    /// instance; later calls only restart the fade.
    async fn play(&self, fade_in: Duration) -> bool;

    fn pause(&self);

    fn resume(&self);

    fn seek(&self, position: Duration);

    fn position(&self) -> Duration;

    /// True while the source is waiting on network data
    fn is_buffering(&self) -> bool;

    /// Returns `true` exactly once, when playback crosses the early end offset
    fn poll_ended(&self) -> bool;

    /// Whether the ended latch has fired
    fn has_ended(&self) -> bool;

    /// Toggle underwater muffling. Idempotent.
    fn set_submerged(&self, submerged: bool);

    fn set_camera_depth(&self, camera_z: f32);

    fn set_levels(&self, levels: Levels);

    /// Asynchronous device failure, if one was reported since the last call
    fn take_failure(&self) -> Option<String>;

    /// Fade out over `fade_out`, then release the device after a small
    /// margin. Idempotent: later calls return the first teardown.
    fn dispose(&self, fade_out: Duration) -> ScheduledTask;

    fn is_disposing(&self) -> bool;
}

/// Opens sessions for tracks
#[async_trait]
pub trait PipelineFactory: Send + Sync {
    /// Acquire a device and stream for `track`. Transient device failures are
    /// retried internally; exhausting retries yields [`Session::Idle`].
    async fn open(&self, track: &Track, setup: SessionSetup) -> Session;
}

/// A live session or nothing
#[derive(Default)]
pub enum Session {
    Active(Box<dyn PlaybackPipeline>),
    #[default]
    Idle,
}

impl Session {
    pub fn is_idle(&self) -> bool {
        matches!(self, Self::Idle)
    }

    pub fn as_active(&self) -> Option<&dyn PlaybackPipeline> {
        match self {
            Self::Active(p) => Some(p.as_ref()),
            Self::Idle => None,
        }
    }

    /// Take the session out, leaving `Idle` behind
    pub fn take(&mut self) -> Option<Box<dyn PlaybackPipeline>> {
        match std::mem::replace(self, Self::Idle) {
            Self::Active(p) => Some(p),
            Self::Idle => None,
        }
    }
}

impl std::fmt::Debug for Session {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Active(p) => f
                .debug_tuple("Active")
                .field(&p.track().external_id)
                .finish(),
            Self::Idle => f.write_str("Idle"),
        }
    }
}
