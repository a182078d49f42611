/// Track domain types
use crate::error::{Error, ResolutionError, Result};
use crate::types::DayCycle;
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// One streamable audio item
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Track {
    /// Identifier assigned by the hosting site
    pub external_id: String,

    pub title: String,

    pub uploader: String,

    /// Human-facing page the stream is resolved from
    pub page_url: String,

    /// Direct audio URL; expires, so it is empty until resolved each session
    #[serde(default)]
    pub resolved_stream_url: Option<String>,

    pub duration: Duration,

    /// Per-track loudness, compared against the master volume
    pub volume: f32,

    #[serde(default)]
    pub day_cycles: DayCycle,

    #[serde(default)]
    pub last_error: Option<ResolutionError>,
}

/// Result of a successful resolution
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ResolvedMetadata {
    pub external_id: String,
    pub title: String,
    pub uploader: String,
    pub duration: Duration,
    pub stream_url: String,
}

impl Track {
    /// Create a track that still needs resolving
    pub fn new(
        external_id: impl Into<String>,
        title: impl Into<String>,
        page_url: impl Into<String>,
        duration: Duration,
    ) -> Self {
        Self {
            external_id: external_id.into(),
            title: title.into(),
            uploader: String::new(),
            page_url: page_url.into(),
            resolved_stream_url: None,
            duration,
            volume: 1.0,
            day_cycles: DayCycle::default(),
            last_error: None,
        }
    }

    /// The resolved stream URL, if present and non-empty
    pub fn stream_url(&self) -> Option<&str> {
        self.resolved_stream_url
            .as_deref()
            .filter(|url| !url.is_empty())
    }

    pub fn is_resolved(&self) -> bool {
        self.stream_url().is_some()
    }

    /// Apply a successful resolution, clearing any previous error
    pub fn apply_resolution(&mut self, meta: ResolvedMetadata) {
        if !meta.title.is_empty() {
            self.title = meta.title;
        }
        if !meta.uploader.is_empty() {
            self.uploader = meta.uploader;
        }
        if !meta.duration.is_zero() {
            self.duration = meta.duration;
        }
        self.resolved_stream_url = Some(meta.stream_url);
        self.last_error = None;
    }

    /// Check the fields every stored track must carry
    pub fn validate(&self) -> Result<()> {
        if self.external_id.trim().is_empty() {
            return Err(Error::invalid_track(&self.external_id, "empty external id"));
        }
        let is_web_link = url::Url::parse(&self.page_url)
            .map(|u| matches!(u.scheme(), "http" | "https"))
            .unwrap_or(false);
        if !is_web_link {
            return Err(Error::invalid_track(
                &self.external_id,
                format!("page url is not a web link: {}", self.page_url),
            ));
        }
        if self.duration.is_zero() {
            return Err(Error::invalid_track(&self.external_id, "zero duration"));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample() -> Track {
        Track::new(
            "abc123",
            "Rain Over Lion's Arch",
            "https://example.com/watch?v=abc123",
            Duration::from_secs(180),
        )
    }

    #[test]
    fn test_new_track_is_unresolved() {
        let track = sample();
        assert!(!track.is_resolved());
        assert!(track.validate().is_ok());
    }

    #[test]
    fn test_empty_stream_url_is_unresolved() {
        let mut track = sample();
        track.resolved_stream_url = Some(String::new());
        assert!(track.stream_url().is_none());
    }

    #[test]
    fn test_apply_resolution_clears_error() {
        let mut track = sample();
        track.last_error = Some(ResolutionError::Unknown("boom".into()));
        track.apply_resolution(ResolvedMetadata {
            external_id: "abc123".into(),
            title: String::new(),
            uploader: "someone".into(),
            duration: Duration::from_secs(200),
            stream_url: "https://cdn.example.com/a.webm".into(),
        });
        assert!(track.is_resolved());
        assert!(track.last_error.is_none());
        assert_eq!(track.title, "Rain Over Lion's Arch");
        assert_eq!(track.duration, Duration::from_secs(200));
    }

    #[test]
    fn test_validate_rejects_bad_tracks() {
        let mut track = sample();
        track.page_url = "file:///tmp/a.mp3".into();
        assert!(track.validate().is_err());

        let mut track = sample();
        track.duration = Duration::ZERO;
        assert!(track.validate().is_err());

        let mut track = sample();
        track.external_id = "  ".into();
        assert!(track.validate().is_err());
    }
}
