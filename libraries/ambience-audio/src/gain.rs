//! Volume model
//!
//! Track loudness is expressed relative to the master volume: a track at or
//! above master plays at master, quieter tracks are pulled down by their
//! distance from it. Underwater, gain instead follows camera depth inside a
//! narrow band so the music sinks with the player.

use crate::effect::AudioEffect;
use ambience_core::Levels;

/// Depth at which submerged gain bottoms out
const SUBMERGED_FLOOR_Z: f32 = -130.0;

/// Upper bound of submerged gain
const SUBMERGED_CEILING: f32 = 0.1;

/// Normalize `volume` against `master` (clamped to [0, 1])
pub fn normalized_volume(volume: f32, master: f32) -> f32 {
    let master = master.clamp(0.0, 1.0);
    if volume >= master {
        return master;
    }
    (master - (volume - master).abs()).clamp(0.0, 1.0)
}

/// Linear re-mapping of `value` from one range onto another
fn map_range(value: f32, from_low: f32, from_high: f32, to_low: f32, to_high: f32) -> f32 {
    (value - from_low) * (to_high - to_low) / (from_high - from_low) + to_low
}

/// Depth-driven gain while underwater, always within [0, 0.1]
pub fn submerged_volume(camera_z: f32, volume: f32, master: f32) -> f32 {
    let normalized = normalized_volume(volume, master);
    map_range(
        camera_z,
        SUBMERGED_FLOOR_Z,
        normalized_volume(SUBMERGED_CEILING, master),
        0.0,
        normalized,
    )
    .clamp(0.0, SUBMERGED_CEILING)
}

/// Everything the effective gain depends on
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct GainInputs {
    pub track_volume: f32,
    pub levels: Levels,
    pub submerged: bool,
    pub camera_z: f32,
}

/// Effective linear gain for the volume stage
pub fn effective_gain(inputs: &GainInputs) -> f32 {
    if inputs.levels.muted {
        return 0.0;
    }
    let master = inputs.levels.master_volume;
    let base = if inputs.submerged {
        submerged_volume(inputs.camera_z, inputs.track_volume, master)
    } else {
        normalized_volume(inputs.track_volume, master)
    };
    base * inputs.levels.host_output_scale.clamp(0.0, 1.0)
}

/// Applies a gain that is ramped across each buffer to avoid zipper noise
#[derive(Debug, Clone)]
pub struct VolumeStage {
    target: f32,
    current: f32,
    enabled: bool,
}

impl VolumeStage {
    pub fn new(gain: f32) -> Self {
        Self {
            target: gain,
            current: gain,
            enabled: true,
        }
    }

    pub fn set_gain(&mut self, gain: f32) {
        self.target = gain;
    }

    pub fn gain(&self) -> f32 {
        self.current
    }
}

impl AudioEffect for VolumeStage {
    fn process(&mut self, buffer: &mut [f32], _sample_rate: u32) {
        let frames = buffer.len() / 2;
        if frames == 0 {
            return;
        }
        let start = self.current;
        let step = (self.target - start) / frames as f32;
        for (i, frame) in buffer.chunks_exact_mut(2).enumerate() {
            let g = start + step * (i + 1) as f32;
            frame[0] *= g;
            frame[1] *= g;
        }
        self.current = self.target;
    }

    fn reset(&mut self) {
        self.current = self.target;
    }

    fn set_enabled(&mut self, enabled: bool) {
        self.enabled = enabled;
    }

    fn is_enabled(&self) -> bool {
        self.enabled
    }

    fn name(&self) -> &str {
        "Volume"
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    fn inputs(track_volume: f32) -> GainInputs {
        GainInputs {
            track_volume,
            levels: Levels {
                master_volume: 0.5,
                muted: false,
                host_output_scale: 1.0,
            },
            submerged: false,
            camera_z: 10.0,
        }
    }

    #[test]
    fn test_loud_track_plays_at_master() {
        assert_eq!(normalized_volume(1.0, 0.5), 0.5);
        assert_eq!(normalized_volume(0.5, 0.5), 0.5);
    }

    #[test]
    fn test_quiet_track_pulled_down() {
        assert!((normalized_volume(0.3, 0.5) - 0.3).abs() < 1e-6);
        assert_eq!(normalized_volume(0.0, 0.5), 0.0);
    }

    #[test]
    fn test_master_is_clamped() {
        assert_eq!(normalized_volume(2.0, 4.0), 1.0);
    }

    #[test]
    fn test_muted_is_silent() {
        let mut i = inputs(1.0);
        i.levels.muted = true;
        assert_eq!(effective_gain(&i), 0.0);
    }

    #[test]
    fn test_submerged_band() {
        let mut i = inputs(1.0);
        i.submerged = true;
        i.camera_z = -130.0;
        assert_eq!(effective_gain(&i), 0.0);
        i.camera_z = -1.0;
        let g = effective_gain(&i);
        assert!(g > 0.0 && g <= 0.1, "gain was {g}");
    }

    #[test]
    fn test_host_scale_applies() {
        let mut i = inputs(1.0);
        i.levels.host_output_scale = 0.5;
        assert!((effective_gain(&i) - 0.25).abs() < 1e-6);
    }

    #[test]
    fn test_volume_stage_ramps() {
        let mut stage = VolumeStage::new(0.0);
        stage.set_gain(1.0);
        let mut buffer = vec![1.0; 8];
        stage.process(&mut buffer, 48000);
        assert!(buffer[0] < buffer[6]);
        assert_eq!(buffer[6], 1.0);
        assert_eq!(stage.gain(), 1.0);
    }

    proptest! {
        #[test]
        fn prop_gain_in_unit_range(
            volume in 0.0f32..4.0,
            master in -1.0f32..2.0,
            z in -500.0f32..500.0,
            submerged: bool,
        ) {
            let g = effective_gain(&GainInputs {
                track_volume: volume,
                levels: Levels { master_volume: master, muted: false, host_output_scale: 1.0 },
                submerged,
                camera_z: z,
            });
            prop_assert!((0.0..=1.0).contains(&g));
            if submerged {
                prop_assert!(g <= SUBMERGED_CEILING);
            }
        }
    }
}
