//! Error types for orchestration

use ambience_core::types::ContextKey;
use ambience_core::ResolutionError;
use thiserror::Error;

/// Orchestration errors
#[derive(Debug, Error)]
pub enum PlaybackError {
    /// A load is already in flight; the request was dropped
    #[error("A load is already in flight")]
    Busy,

    /// Playlist missing, disabled, or nothing eligible in it
    #[error("No playable track for {0}")]
    NoCandidate(ContextKey),

    /// The resolver could not produce a stream URL
    #[error("Resolving {track} failed: {source}")]
    Resolution {
        track: String,
        #[source]
        source: ResolutionError,
    },

    /// Device or codec failure while opening or starting a session
    #[error("Pipeline error: {0}")]
    Pipeline(String),

    /// Store access failed
    #[error(transparent)]
    Core(#[from] ambience_core::Error),
}

/// Result type for orchestration
pub type Result<T> = std::result::Result<T, PlaybackError>;
