//! Togglable stereo low-pass used for the underwater effect

use crate::effect::AudioEffect;
use biquad::{Biquad, Coefficients, DirectForm1, ToHertz, Type, Q_BUTTERWORTH_F32};

/// Cutoff of the underwater muffling
pub const UNDERWATER_CUTOFF_HZ: f32 = 400.0;

pub struct LowPass {
    cutoff_hz: f32,
    sample_rate: u32,
    left: DirectForm1<f32>,
    right: DirectForm1<f32>,
    enabled: bool,
}

impl LowPass {
    /// Disabled filter at `cutoff_hz`
    pub fn new(cutoff_hz: f32) -> Self {
        let (left, right) = Self::filters(cutoff_hz, 44100);
        Self {
            cutoff_hz,
            sample_rate: 44100,
            left,
            right,
            enabled: false,
        }
    }

    pub fn cutoff(&self) -> f32 {
        self.cutoff_hz
    }

    fn filters(cutoff_hz: f32, sample_rate: u32) -> (DirectForm1<f32>, DirectForm1<f32>) {
        // Keep the cutoff below Nyquist so coefficient creation cannot fail
        let cutoff = cutoff_hz.min(sample_rate as f32 * 0.45).max(1.0);
        match Coefficients::<f32>::from_params(
            Type::LowPass,
            (sample_rate as f32).hz(),
            cutoff.hz(),
            Q_BUTTERWORTH_F32,
        ) {
            Ok(coeffs) => (DirectForm1::<f32>::new(coeffs), DirectForm1::<f32>::new(coeffs)),
            Err(e) => {
                tracing::warn!("low-pass coefficients rejected ({:?}), passing through", e);
                let identity = Coefficients {
                    a1: 0.0,
                    a2: 0.0,
                    b0: 1.0,
                    b1: 0.0,
                    b2: 0.0,
                };
                (DirectForm1::<f32>::new(identity), DirectForm1::<f32>::new(identity))
            }
        }
    }
}

impl AudioEffect for LowPass {
    fn process(&mut self, buffer: &mut [f32], sample_rate: u32) {
        if !self.enabled {
            return;
        }
        if sample_rate != self.sample_rate {
            self.sample_rate = sample_rate;
            let (left, right) = Self::filters(self.cutoff_hz, sample_rate);
            self.left = left;
            self.right = right;
        }
        for frame in buffer.chunks_exact_mut(2) {
            frame[0] = self.left.run(frame[0]);
            frame[1] = self.right.run(frame[1]);
        }
    }

    fn reset(&mut self) {
        self.left.reset_state();
        self.right.reset_state();
    }

    fn set_enabled(&mut self, enabled: bool) {
        if enabled && !self.enabled {
            // Stale history from the last time the filter ran would click
            self.reset();
        }
        self.enabled = enabled;
    }

    fn is_enabled(&self) -> bool {
        self.enabled
    }

    fn name(&self) -> &str {
        "LowPass"
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::f32::consts::PI;

    fn sine(freq: f32, sample_rate: u32, frames: usize) -> Vec<f32> {
        (0..frames)
            .flat_map(|i| {
                let s = (2.0 * PI * freq * i as f32 / sample_rate as f32).sin();
                [s, s]
            })
            .collect()
    }

    fn peak(buffer: &[f32]) -> f32 {
        buffer.iter().fold(0.0f32, |m, s| m.max(s.abs()))
    }

    #[test]
    fn test_disabled_is_passthrough() {
        let mut filter = LowPass::new(UNDERWATER_CUTOFF_HZ);
        let original = sine(5000.0, 48000, 512);
        let mut buffer = original.clone();
        filter.process(&mut buffer, 48000);
        assert_eq!(buffer, original);
    }

    #[test]
    fn test_attenuates_highs() {
        let mut filter = LowPass::new(UNDERWATER_CUTOFF_HZ);
        filter.set_enabled(true);
        let mut buffer = sine(5000.0, 48000, 4800);
        filter.process(&mut buffer, 48000);
        // Skip the settling period
        assert!(peak(&buffer[2000..]) < 0.1);
    }

    #[test]
    fn test_keeps_lows() {
        let mut filter = LowPass::new(UNDERWATER_CUTOFF_HZ);
        filter.set_enabled(true);
        let mut buffer = sine(60.0, 48000, 9600);
        filter.process(&mut buffer, 48000);
        assert!(peak(&buffer[4800..]) > 0.8);
    }
}
