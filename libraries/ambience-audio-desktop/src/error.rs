/// Desktop audio errors
use thiserror::Error;

/// Result type for audio operations
pub type Result<T> = std::result::Result<T, AudioError>;

/// Why an output device could not be acquired
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DeviceFailureKind {
    /// The device refuses shared-mode streams (0x88890008)
    SharedModeUnsupported,
    /// The audio subsystem class is not registered (0x80040154)
    NotRegistered,
    /// No such device, or it went away (0x80070490)
    NotFound,
    /// Access denied (0x80070005)
    AccessDenied,
    /// Another application holds the device exclusively (0x8889000A)
    ExclusiveModeInUse,
    /// Device temporarily busy
    Busy,
    Other,
}

impl DeviceFailureKind {
    /// Classify a backend error message
    pub fn classify(message: &str) -> Self {
        let m = message.to_ascii_lowercase();
        let has = |needles: &[&str]| needles.iter().any(|n| m.contains(n));

        if has(&["0x88890008", "shared mode", "not supported"]) {
            Self::SharedModeUnsupported
        } else if has(&["0x80040154", "not registered"]) {
            Self::NotRegistered
        } else if has(&["0x80070490", "not found", "no longer available"]) {
            Self::NotFound
        } else if has(&["0x80070005", "access denied", "permission"]) {
            Self::AccessDenied
        } else if has(&["0x8889000a", "exclusive"]) {
            Self::ExclusiveModeInUse
        } else if has(&["busy", "in use", "resource temporarily unavailable"]) {
            Self::Busy
        } else {
            Self::Other
        }
    }

    /// Failures worth retrying after a short delay
    pub fn is_transient(self) -> bool {
        matches!(self, Self::Busy | Self::AccessDenied | Self::ExclusiveModeInUse)
    }

    pub fn describe(self) -> &'static str {
        match self {
            Self::SharedModeUnsupported => "device does not support shared mode",
            Self::NotRegistered => "audio subsystem not registered",
            Self::NotFound => "device not found",
            Self::AccessDenied => "access to device denied",
            Self::ExclusiveModeInUse => "device is in exclusive use by another application",
            Self::Busy => "device is busy",
            Self::Other => "unclassified device failure",
        }
    }
}

/// Audio errors
#[derive(Debug, Error)]
pub enum AudioError {
    /// Output device could not be opened or started
    #[error("Device error ({}): {message}", kind.describe())]
    DeviceAcquisition {
        kind: DeviceFailureKind,
        message: String,
    },

    /// Decoding failed; fatal to the session
    #[error("Codec error: {0}")]
    Codec(String),

    /// Stream download failed
    #[error("HTTP error: {0}")]
    Http(String),

    /// Stream body exceeds the in-memory limit (size, max)
    #[error("Stream too large: {0} bytes (max {1})")]
    TooLarge(u64, u64),

    /// Track has no resolved stream URL
    #[error("Track {0} has no resolved stream URL")]
    NoResolvedUrl(String),

    /// The audio host thread is gone
    #[error("Audio host thread is not running")]
    HostGone,

    /// Unknown session id on the host thread
    #[error("Unknown session {0}")]
    UnknownSession(u64),
}

impl AudioError {
    pub fn device(message: impl Into<String>) -> Self {
        let message = message.into();
        Self::DeviceAcquisition {
            kind: DeviceFailureKind::classify(&message),
            message,
        }
    }

    /// Transient device failures warrant a retry
    pub fn is_transient(&self) -> bool {
        match self {
            Self::DeviceAcquisition { kind, .. } => kind.is_transient(),
            _ => false,
        }
    }
}

impl From<cpal::BuildStreamError> for AudioError {
    fn from(err: cpal::BuildStreamError) -> Self {
        AudioError::device(err.to_string())
    }
}

impl From<cpal::PlayStreamError> for AudioError {
    fn from(err: cpal::PlayStreamError) -> Self {
        AudioError::device(err.to_string())
    }
}

impl From<cpal::DefaultStreamConfigError> for AudioError {
    fn from(err: cpal::DefaultStreamConfigError) -> Self {
        AudioError::device(err.to_string())
    }
}

impl From<cpal::DevicesError> for AudioError {
    fn from(err: cpal::DevicesError) -> Self {
        AudioError::device(err.to_string())
    }
}

impl From<symphonia::core::errors::Error> for AudioError {
    fn from(err: symphonia::core::errors::Error) -> Self {
        AudioError::Codec(err.to_string())
    }
}

impl From<reqwest::Error> for AudioError {
    fn from(err: reqwest::Error) -> Self {
        AudioError::Http(err.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_classify_hresults() {
        assert_eq!(
            DeviceFailureKind::classify("HRESULT 0x88890008"),
            DeviceFailureKind::SharedModeUnsupported
        );
        assert_eq!(
            DeviceFailureKind::classify("0x80040154 class"),
            DeviceFailureKind::NotRegistered
        );
        assert_eq!(
            DeviceFailureKind::classify("error 0x80070490"),
            DeviceFailureKind::NotFound
        );
        assert_eq!(
            DeviceFailureKind::classify("0x80070005"),
            DeviceFailureKind::AccessDenied
        );
        assert_eq!(
            DeviceFailureKind::classify("0x8889000A"),
            DeviceFailureKind::ExclusiveModeInUse
        );
    }

    #[test]
    fn test_classify_backend_messages() {
        assert_eq!(
            DeviceFailureKind::classify("The requested device is no longer available"),
            DeviceFailureKind::NotFound
        );
        assert_eq!(
            DeviceFailureKind::classify("Device or resource busy"),
            DeviceFailureKind::Busy
        );
        assert_eq!(
            DeviceFailureKind::classify("something odd"),
            DeviceFailureKind::Other
        );
    }

    #[test]
    fn test_transient_kinds() {
        assert!(AudioError::device("device busy").is_transient());
        assert!(AudioError::device("0x8889000A").is_transient());
        assert!(!AudioError::device("0x80070490").is_transient());
        assert!(!AudioError::Codec("bad frame".into()).is_transient());
    }
}
