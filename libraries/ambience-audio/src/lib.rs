//! Ambience Audio
//!
//! Platform-free DSP for one playback session: the volume model, fade
//! envelope, underwater low-pass, 10-band equalizer and the early
//! end-of-stream latch, assembled into a fixed [`SignalChain`].

#![forbid(unsafe_code)]

mod atomic;
pub mod chain;
pub mod effect;
pub mod end_of_stream;
pub mod fade;
pub mod gain;
pub mod graphic_eq;
pub mod lowpass;

pub use chain::{ChainControls, SignalChain};
pub use effect::AudioEffect;
pub use end_of_stream::EndOfStreamLatch;
pub use fade::{FadeCurve, FadeEnvelope};
pub use gain::{effective_gain, normalized_volume, submerged_volume, GainInputs};
pub use graphic_eq::GraphicEq;
pub use lowpass::LowPass;
