//! Fixed per-track signal chain
//!
//! decode → volume → fade → low-pass → 10-band EQ → sink
//!
//! [`SignalChain`] runs on the audio callback thread. Everything the control
//! side changes goes through [`ChainControls`], which is lock-free so the
//! callback never blocks.

use crate::atomic::AtomicF32;
use crate::effect::AudioEffect;
use crate::fade::FadeEnvelope;
use crate::gain::{effective_gain, GainInputs, VolumeStage};
use crate::graphic_eq::GraphicEq;
use crate::lowpass::{LowPass, UNDERWATER_CUTOFF_HZ};
use ambience_core::Levels;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

/// EQ band boosted in bass while submerged (63 Hz)
pub const SUBMERGED_BASS_BAND: usize = 1;
pub const SUBMERGED_BASS_DB: f32 = 19.5;

/// EQ band boosted in treble while submerged (16 kHz)
pub const SUBMERGED_TREBLE_BAND: usize = 9;
pub const SUBMERGED_TREBLE_DB: f32 = 13.4;

/// Shared, thread-safe knobs of one session's chain
#[derive(Debug)]
pub struct ChainControls {
    track_volume: AtomicF32,
    master_volume: AtomicF32,
    muted: AtomicBool,
    host_output_scale: AtomicF32,
    submerged: AtomicBool,
    camera_z: AtomicF32,

    // Fade requests; `fade_seq` is bumped after the parameters are written
    fade_seq: AtomicU64,
    fade_target: AtomicF32,
    fade_ms: AtomicU64,

    /// Envelope level as last reported by the callback
    fade_level: AtomicF32,
}

impl ChainControls {
    pub fn new(track_volume: f32, levels: Levels, submerged: bool, camera_z: f32) -> Self {
        Self {
            track_volume: AtomicF32::new(track_volume),
            master_volume: AtomicF32::new(levels.master_volume),
            muted: AtomicBool::new(levels.muted),
            host_output_scale: AtomicF32::new(levels.host_output_scale),
            submerged: AtomicBool::new(submerged),
            camera_z: AtomicF32::new(camera_z),
            fade_seq: AtomicU64::new(0),
            fade_target: AtomicF32::new(0.0),
            fade_ms: AtomicU64::new(0),
            fade_level: AtomicF32::new(0.0),
        }
    }

    /// Returns whether the value changed
    pub fn set_submerged(&self, submerged: bool) -> bool {
        self.submerged.swap(submerged, Ordering::AcqRel) != submerged
    }

    pub fn is_submerged(&self) -> bool {
        self.submerged.load(Ordering::Acquire)
    }

    pub fn set_camera_depth(&self, camera_z: f32) {
        self.camera_z.store(camera_z);
    }

    pub fn set_levels(&self, levels: Levels) {
        self.master_volume.store(levels.master_volume);
        self.muted.store(levels.muted, Ordering::Release);
        self.host_output_scale.store(levels.host_output_scale);
    }

    pub fn set_track_volume(&self, volume: f32) {
        self.track_volume.store(volume);
    }

    pub fn gain_inputs(&self) -> GainInputs {
        GainInputs {
            track_volume: self.track_volume.load(),
            levels: Levels {
                master_volume: self.master_volume.load(),
                muted: self.muted.load(Ordering::Acquire),
                host_output_scale: self.host_output_scale.load(),
            },
            submerged: self.is_submerged(),
            camera_z: self.camera_z.load(),
        }
    }

    /// Target gain of the volume stage
    pub fn target_gain(&self) -> f32 {
        effective_gain(&self.gain_inputs())
    }

    /// Ask the fade stage to ramp to `target` over `duration`
    pub fn request_fade(&self, target: f32, duration: Duration) {
        self.fade_target.store(target);
        self.fade_ms
            .store(duration.as_millis() as u64, Ordering::Release);
        self.fade_seq.fetch_add(1, Ordering::AcqRel);
    }

    pub fn fade_level(&self) -> f32 {
        self.fade_level.load()
    }
}

/// The concrete stages in their fixed order
pub struct SignalChain {
    controls: Arc<ChainControls>,
    volume: VolumeStage,
    fade: FadeEnvelope,
    lowpass: LowPass,
    eq: GraphicEq,
    applied_submerged: Option<bool>,
    seen_fade_seq: u64,
}

impl SignalChain {
    /// New chain starting silent; call [`ChainControls::request_fade`] to fade in
    pub fn new(controls: Arc<ChainControls>) -> Self {
        let gain = controls.target_gain();
        Self {
            controls,
            volume: VolumeStage::new(gain),
            fade: FadeEnvelope::new(0.0),
            lowpass: LowPass::new(UNDERWATER_CUTOFF_HZ),
            eq: GraphicEq::new(),
            applied_submerged: None,
            seen_fade_seq: 0,
        }
    }

    pub fn controls(&self) -> &Arc<ChainControls> {
        &self.controls
    }

    /// Stage names in processing order
    pub fn stage_names(&self) -> [&str; 4] {
        [
            self.volume.name(),
            self.fade.name(),
            self.lowpass.name(),
            self.eq.name(),
        ]
    }

    pub fn is_lowpass_enabled(&self) -> bool {
        self.lowpass.is_enabled()
    }

    pub fn eq_band_gain(&self, index: usize) -> Option<f32> {
        self.eq.band_gain(index)
    }

    fn sync_submerged(&mut self) {
        let submerged = self.controls.is_submerged();
        if self.applied_submerged == Some(submerged) {
            return;
        }
        self.lowpass.set_enabled(submerged);
        if submerged {
            self.eq.set_band_gain(SUBMERGED_BASS_BAND, SUBMERGED_BASS_DB);
            self.eq.set_band_gain(SUBMERGED_TREBLE_BAND, SUBMERGED_TREBLE_DB);
        } else {
            self.eq.set_band_gain(SUBMERGED_BASS_BAND, 0.0);
            self.eq.set_band_gain(SUBMERGED_TREBLE_BAND, 0.0);
        }
        self.applied_submerged = Some(submerged);
    }

    fn sync_fade(&mut self, sample_rate: u32) {
        let seq = self.controls.fade_seq.load(Ordering::Acquire);
        if seq == self.seen_fade_seq {
            return;
        }
        self.seen_fade_seq = seq;
        let target = self.controls.fade_target.load();
        let ms = self.controls.fade_ms.load(Ordering::Acquire);
        self.fade
            .start(target, Duration::from_millis(ms), sample_rate);
    }

    /// Run one interleaved stereo buffer through every stage
    pub fn process(&mut self, buffer: &mut [f32], sample_rate: u32) {
        self.sync_submerged();
        self.sync_fade(sample_rate);
        self.volume.set_gain(self.controls.target_gain());

        self.volume.process(buffer, sample_rate);
        self.fade.process(buffer, sample_rate);
        self.lowpass.process(buffer, sample_rate);
        self.eq.process(buffer, sample_rate);

        self.controls.fade_level.store(self.fade.level());
    }

    /// Clear filter history, e.g. after a seek
    pub fn reset(&mut self) {
        self.lowpass.reset();
        self.eq.reset();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn controls() -> Arc<ChainControls> {
        Arc::new(ChainControls::new(
            1.0,
            Levels {
                master_volume: 1.0,
                muted: false,
                host_output_scale: 1.0,
            },
            false,
            10.0,
        ))
    }

    #[test]
    fn test_fixed_stage_order() {
        let chain = SignalChain::new(controls());
        assert_eq!(chain.stage_names(), ["Volume", "Fade", "LowPass", "Graphic EQ"]);
    }

    #[test]
    fn test_starts_silent_until_faded_in() {
        let controls = controls();
        let mut chain = SignalChain::new(Arc::clone(&controls));
        let mut buffer = vec![1.0; 64];
        chain.process(&mut buffer, 48000);
        assert!(buffer.iter().all(|&s| s == 0.0));

        controls.request_fade(1.0, Duration::ZERO);
        let mut buffer = vec![0.5; 64];
        chain.process(&mut buffer, 48000);
        assert!((buffer[0] - 0.5).abs() < 1e-6);
        assert_eq!(controls.fade_level(), 1.0);
    }

    #[test]
    fn test_submerged_toggle_configures_filters() {
        let controls = controls();
        let mut chain = SignalChain::new(Arc::clone(&controls));
        let mut buffer = vec![0.0; 16];

        assert!(controls.set_submerged(true));
        chain.process(&mut buffer, 48000);
        assert!(chain.is_lowpass_enabled());
        assert_eq!(chain.eq_band_gain(SUBMERGED_BASS_BAND), Some(19.5));
        assert_eq!(chain.eq_band_gain(SUBMERGED_TREBLE_BAND), Some(13.4));

        assert!(controls.set_submerged(false));
        chain.process(&mut buffer, 48000);
        assert!(!chain.is_lowpass_enabled());
        assert_eq!(chain.eq_band_gain(SUBMERGED_BASS_BAND), Some(0.0));
        assert_eq!(chain.eq_band_gain(SUBMERGED_TREBLE_BAND), Some(0.0));
    }

    #[test]
    fn test_submerged_toggle_is_idempotent() {
        let controls = controls();
        let mut chain = SignalChain::new(Arc::clone(&controls));
        let mut buffer = vec![0.0; 16];

        assert!(controls.set_submerged(true));
        chain.process(&mut buffer, 48000);
        let once = (chain.is_lowpass_enabled(), chain.eq_band_gain(1), controls.target_gain());

        assert!(!controls.set_submerged(true));
        chain.process(&mut buffer, 48000);
        let twice = (chain.is_lowpass_enabled(), chain.eq_band_gain(1), controls.target_gain());

        assert_eq!(once, twice);
    }

    #[test]
    fn test_submerged_gain_follows_depth() {
        let controls = controls();
        controls.set_submerged(true);
        controls.set_camera_depth(-130.0);
        assert_eq!(controls.target_gain(), 0.0);
        controls.set_camera_depth(-5.0);
        assert!(controls.target_gain() <= 0.1);
    }
}
