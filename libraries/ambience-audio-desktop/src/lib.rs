//! Ambience Audio Desktop
//!
//! cpal-backed [`PlaybackPipeline`] for desktop platforms. Each session
//! streams a track over HTTP, decodes it with symphonia on a worker thread,
//! resamples to the device rate with rubato and renders it through the
//! shared [`SignalChain`] inside the cpal callback.
//!
//! All cpal streams live on one [`AudioHost`] thread.
//!
//! [`PlaybackPipeline`]: ambience_core::PlaybackPipeline
//! [`SignalChain`]: ambience_audio::SignalChain

#![forbid(unsafe_code)]

pub mod decoder;
pub mod device;
pub mod error;
pub mod factory;
pub mod host;
pub mod http_source;
pub mod renderer;
pub mod resample;
pub mod retry;
pub mod session;

pub use decoder::DecodeWorker;
pub use device::{find_output_device, list_devices, AudioDeviceInfo};
pub use error::{AudioError, DeviceFailureKind, Result};
pub use factory::DesktopPipelineFactory;
pub use host::{AudioHost, StreamFormat};
pub use http_source::{ProgressiveSource, SourceHandle, MAX_STREAM_BYTES};
pub use renderer::{DecodedChunk, Playhead, Renderer};
pub use retry::{retry_transient, RetryPolicy};
pub use session::DesktopSession;
