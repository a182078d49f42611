//! Collaborator traits
//!
//! Every external dependency of the orchestrator is reached through one of
//! these seams so it can be injected explicitly and faked in tests.

use crate::error::{ResolutionError, Result};
use crate::types::{ContextKey, Playlist, PlaylistRecord, ResolvedMetadata, TelemetrySample, Track};
use async_trait::async_trait;

/// Track and playlist persistence
///
/// Upserts are last-write-wins. Loading a playlist expands its referenced
/// tracks; ids that no longer resolve to a track are dropped.
#[async_trait]
pub trait PersistenceStore: Send + Sync {
    async fn get_track(&self, external_id: &str) -> Result<Option<Track>>;

    async fn upsert_track(&self, track: Track) -> Result<()>;

    async fn remove_track(&self, external_id: &str) -> Result<()>;

    async fn get_playlist(&self, key: ContextKey) -> Result<Option<Playlist>>;

    async fn upsert_playlist(&self, playlist: PlaylistRecord) -> Result<()>;

    async fn remove_playlist(&self, key: ContextKey) -> Result<()>;

    /// Forget every resolved stream URL (they expire between sessions)
    async fn clear_resolved_urls(&self) -> Result<()>;
}

/// Resolves a page URL into a direct stream URL and metadata
///
/// Implementations (an external tool invocation) do no rate limiting of
/// their own; callers throttle.
#[async_trait]
pub trait MetadataResolver: Send + Sync {
    async fn resolve(&self, page_url: &str) -> std::result::Result<ResolvedMetadata, ResolutionError>;
}

/// Read-only game telemetry feed
pub trait TelemetrySource: Send + Sync {
    /// Sample the feed. `None` means the read failed this tick.
    fn sample(&self) -> Option<TelemetrySample>;
}

/// Process-level output volume control of the host game
pub trait HostDucking: Send + Sync {
    /// Set `process_id`'s output volume to `level` in [0, 1]
    fn set_volume(&self, process_id: u32, level: f32) -> Result<()>;

    /// Current output volume of `process_id`, if readable
    fn volume(&self, process_id: u32) -> Option<f32>;
}
