/// Core error types for Ambience
use thiserror::Error;

/// Result type alias using [`Error`]
pub type Result<T> = std::result::Result<T, Error>;

/// Classified failure returned by a [`MetadataResolver`](crate::traits::MetadataResolver)
#[derive(Error, Debug, Clone, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub enum ResolutionError {
    /// The media was removed by its uploader or the host
    #[error("media was deleted")]
    Deleted,

    /// The media is private or was taken down
    #[error("media was depublished")]
    Depublished,

    /// The media is not available in this region
    #[error("media is geoblocked")]
    Geoblocked,

    /// The remote end is throttling us; try again later
    #[error("rate limited by remote host")]
    RateLimited,

    /// Anything the resolver could not classify
    #[error("unknown resolution failure: {0}")]
    Unknown(String),
}

impl ResolutionError {
    /// Whether this failure should be written back onto the track
    pub fn is_persistent(&self) -> bool {
        !matches!(self, Self::RateLimited)
    }

    /// Whether the track should be excluded for the rest of the session
    pub fn skips_track(&self) -> bool {
        matches!(self, Self::Deleted | Self::Depublished | Self::Geoblocked)
    }

    pub fn is_rate_limited(&self) -> bool {
        matches!(self, Self::RateLimited)
    }
}

/// Core error type for Ambience
#[derive(Error, Debug)]
pub enum Error {
    /// Configuration could not be loaded or deserialized
    #[error("Configuration error: {0}")]
    Config(#[from] config::ConfigError),

    /// Persistence store failure
    #[error("Store error: {0}")]
    Store(String),

    /// Track is missing data required for the requested operation
    #[error("Invalid track {id}: {reason}")]
    InvalidTrack { id: String, reason: String },

    /// Metadata resolution failed
    #[error(transparent)]
    Resolution(#[from] ResolutionError),

    /// I/O errors
    #[error(transparent)]
    Io(#[from] std::io::Error),
}

impl Error {
    /// Create a store error
    pub fn store(msg: impl Into<String>) -> Self {
        Self::Store(msg.into())
    }

    /// Create an invalid track error
    pub fn invalid_track(id: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::InvalidTrack {
            id: id.into(),
            reason: reason.into(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_rate_limited_is_not_persisted() {
        assert!(!ResolutionError::RateLimited.is_persistent());
        assert!(!ResolutionError::RateLimited.skips_track());
        assert!(ResolutionError::RateLimited.is_rate_limited());
    }

    #[test]
    fn test_classified_errors_skip_track() {
        for err in [
            ResolutionError::Deleted,
            ResolutionError::Depublished,
            ResolutionError::Geoblocked,
        ] {
            assert!(err.is_persistent());
            assert!(err.skips_track());
        }
    }

    #[test]
    fn test_unknown_is_persisted_but_not_skipped() {
        let err = ResolutionError::Unknown("exit code 1".into());
        assert!(err.is_persistent());
        assert!(!err.skips_track());
    }
}
