//! 10-band graphic equalizer
//!
//! Fixed ISO octave frequencies with per-band peaking filters. The chain
//! keeps it flat except while submerged, when the lowest bass and highest
//! treble bands are boosted to color the muffled sound.

use crate::effect::AudioEffect;
use std::f32::consts::PI;

/// 10-band ISO standard frequencies (Hz)
pub const ISO_10_BAND_FREQUENCIES: [f32; 10] = [
    31.5, 63.0, 125.0, 250.0, 500.0, 1000.0, 2000.0, 4000.0, 8000.0, 16000.0,
];

/// Octave bandwidth
const BAND_Q: f32 = 1.41;

/// Per-band gain limit in dB
pub const MAX_BAND_GAIN_DB: f32 = 24.0;

/// Peaking biquad with stereo state
#[derive(Debug, Clone)]
struct BiquadBand {
    b0: f32,
    b1: f32,
    b2: f32,
    a1: f32,
    a2: f32,

    // State (stereo)
    x1_l: f32,
    x2_l: f32,
    y1_l: f32,
    y2_l: f32,
    x1_r: f32,
    x2_r: f32,
    y1_r: f32,
    y2_r: f32,

    frequency: f32,
    gain_db: f32,
}

impl BiquadBand {
    fn new(frequency: f32) -> Self {
        Self {
            b0: 1.0,
            b1: 0.0,
            b2: 0.0,
            a1: 0.0,
            a2: 0.0,
            x1_l: 0.0,
            x2_l: 0.0,
            y1_l: 0.0,
            y2_l: 0.0,
            x1_r: 0.0,
            x2_r: 0.0,
            y1_r: 0.0,
            y2_r: 0.0,
            frequency,
            gain_db: 0.0,
        }
    }

    fn is_flat(&self) -> bool {
        self.gain_db.abs() < 0.01
    }

    fn update_coefficients(&mut self, sample_rate: f32) {
        if sample_rate < 1.0 {
            return;
        }

        if self.is_flat() {
            self.b0 = 1.0;
            self.b1 = 0.0;
            self.b2 = 0.0;
            self.a1 = 0.0;
            self.a2 = 0.0;
            return;
        }

        let a = 10.0_f32.powf(self.gain_db / 40.0);
        // Near-Nyquist peaks are unstable
        let freq = self.frequency.min(sample_rate * 0.45);
        let omega = 2.0 * PI * freq / sample_rate;
        let cos_omega = omega.cos();
        let alpha = omega.sin() / (2.0 * BAND_Q);

        let a0 = 1.0 + alpha / a;
        self.b0 = (1.0 + alpha * a) / a0;
        self.b1 = (-2.0 * cos_omega) / a0;
        self.b2 = (1.0 - alpha * a) / a0;
        self.a1 = (-2.0 * cos_omega) / a0;
        self.a2 = (1.0 - alpha / a) / a0;
    }

    #[inline]
    fn process(&mut self, left: f32, right: f32) -> (f32, f32) {
        let mut out_l = self.b0 * left + self.b1 * self.x1_l + self.b2 * self.x2_l
            - self.a1 * self.y1_l
            - self.a2 * self.y2_l;
        // Flush denormals
        if out_l.abs() < 1e-15 {
            out_l = 0.0;
        }
        self.x2_l = self.x1_l;
        self.x1_l = left;
        self.y2_l = self.y1_l;
        self.y1_l = out_l;

        let mut out_r = self.b0 * right + self.b1 * self.x1_r + self.b2 * self.x2_r
            - self.a1 * self.y1_r
            - self.a2 * self.y2_r;
        if out_r.abs() < 1e-15 {
            out_r = 0.0;
        }
        self.x2_r = self.x1_r;
        self.x1_r = right;
        self.y2_r = self.y1_r;
        self.y1_r = out_r;

        (out_l, out_r)
    }

    fn reset(&mut self) {
        self.x1_l = 0.0;
        self.x2_l = 0.0;
        self.y1_l = 0.0;
        self.y2_l = 0.0;
        self.x1_r = 0.0;
        self.x2_r = 0.0;
        self.y1_r = 0.0;
        self.y2_r = 0.0;
    }
}

pub struct GraphicEq {
    bands: Vec<BiquadBand>,
    enabled: bool,
    sample_rate: u32,
    /// Coefficients need recalculation
    needs_update: bool,
}

impl GraphicEq {
    /// Flat 10-band EQ
    pub fn new() -> Self {
        Self {
            bands: ISO_10_BAND_FREQUENCIES
                .iter()
                .map(|&f| BiquadBand::new(f))
                .collect(),
            enabled: true,
            sample_rate: 44100,
            needs_update: true,
        }
    }

    pub fn band_count(&self) -> usize {
        self.bands.len()
    }

    pub fn band_frequency(&self, index: usize) -> Option<f32> {
        self.bands.get(index).map(|b| b.frequency)
    }

    /// Gain for a band in dB
    pub fn band_gain(&self, index: usize) -> Option<f32> {
        self.bands.get(index).map(|b| b.gain_db)
    }

    /// Set a band's gain in dB, clamped to ±[`MAX_BAND_GAIN_DB`]
    pub fn set_band_gain(&mut self, index: usize, gain_db: f32) {
        if let Some(band) = self.bands.get_mut(index) {
            let gain_db = gain_db.clamp(-MAX_BAND_GAIN_DB, MAX_BAND_GAIN_DB);
            if band.gain_db != gain_db {
                band.gain_db = gain_db;
                band.reset();
                self.needs_update = true;
            }
        }
    }

    pub fn reset_to_flat(&mut self) {
        for index in 0..self.bands.len() {
            self.set_band_gain(index, 0.0);
        }
    }

    fn update_coefficients(&mut self) {
        if self.needs_update {
            let sr = self.sample_rate as f32;
            for band in &mut self.bands {
                band.update_coefficients(sr);
            }
            self.needs_update = false;
        }
    }
}

impl Default for GraphicEq {
    fn default() -> Self {
        Self::new()
    }
}

impl AudioEffect for GraphicEq {
    fn process(&mut self, buffer: &mut [f32], sample_rate: u32) {
        if !self.enabled {
            return;
        }

        if self.sample_rate != sample_rate {
            self.sample_rate = sample_rate;
            for band in &mut self.bands {
                band.reset();
            }
            self.needs_update = true;
        }
        self.update_coefficients();

        for frame in buffer.chunks_exact_mut(2) {
            let (mut l, mut r) = (frame[0], frame[1]);
            for band in self.bands.iter_mut().filter(|b| !b.is_flat()) {
                (l, r) = band.process(l, r);
            }
            frame[0] = l;
            frame[1] = r;
        }
    }

    fn reset(&mut self) {
        for band in &mut self.bands {
            band.reset();
        }
    }

    fn set_enabled(&mut self, enabled: bool) {
        self.enabled = enabled;
    }

    fn is_enabled(&self) -> bool {
        self.enabled
    }

    fn name(&self) -> &str {
        "Graphic EQ"
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn test_ten_iso_bands() {
        let eq = GraphicEq::new();
        assert_eq!(eq.band_count(), 10);
        assert_eq!(eq.band_frequency(1), Some(63.0));
        assert_eq!(eq.band_frequency(9), Some(16000.0));
    }

    #[test]
    fn test_flat_is_passthrough() {
        let mut eq = GraphicEq::new();
        let mut buffer = vec![0.5, -0.5, 0.25, -0.25];
        eq.process(&mut buffer, 48000);
        assert_eq!(buffer, vec![0.5, -0.5, 0.25, -0.25]);
    }

    #[test]
    fn test_large_boost_fits() {
        let mut eq = GraphicEq::new();
        eq.set_band_gain(1, 19.5);
        eq.set_band_gain(9, 13.4);
        assert_eq!(eq.band_gain(1), Some(19.5));
        assert_eq!(eq.band_gain(9), Some(13.4));
    }

    #[test]
    fn test_boost_raises_band_energy() {
        let mut eq = GraphicEq::new();
        eq.set_band_gain(1, 19.5);
        let mut buffer: Vec<f32> = (0..9600)
            .flat_map(|i| {
                let s = 0.01 * (2.0 * PI * 63.0 * i as f32 / 48000.0).sin();
                [s, s]
            })
            .collect();
        eq.process(&mut buffer, 48000);
        let peak = buffer[9600..].iter().fold(0.0f32, |m, s| m.max(s.abs()));
        assert!(peak > 0.05, "peak was {peak}");
    }

    #[test]
    fn test_out_of_range_index_ignored() {
        let mut eq = GraphicEq::new();
        eq.set_band_gain(42, 6.0);
        assert_eq!(eq.band_gain(42), None);
    }

    proptest! {
        #[test]
        fn prop_gain_clamped(index in 0usize..10, gain in -100.0f32..100.0) {
            let mut eq = GraphicEq::new();
            eq.set_band_gain(index, gain);
            let g = eq.band_gain(index).unwrap_or_default();
            prop_assert!((-MAX_BAND_GAIN_DB..=MAX_BAND_GAIN_DB).contains(&g));
        }
    }
}
