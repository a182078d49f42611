//! Fade envelope for session starts and teardowns
//!
//! Fade curves:
//! - Linear: constant slope (default)
//! - S-Curve: slow start, fast middle, slow end
//! - Equal Power: constant perceived loudness when two sessions overlap

use crate::effect::AudioEffect;
use std::f32::consts::PI;
use std::time::Duration;

/// Fade curve type
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum FadeCurve {
    #[default]
    Linear,
    SCurve,
    EqualPower,
}

impl FadeCurve {
    /// Gain at normalized `position` (0.0 to 1.0) of a fade
    #[inline]
    pub fn calculate_gain(&self, position: f32, fade_out: bool) -> f32 {
        let position = position.clamp(0.0, 1.0);
        let t = if fade_out { 1.0 - position } else { position };

        match self {
            FadeCurve::Linear => t,
            FadeCurve::SCurve => (1.0 - (PI * t).cos()) * 0.5,
            FadeCurve::EqualPower => (t * PI * 0.5).sin(),
        }
    }
}

/// Per-frame gain ramp between two levels
#[derive(Debug, Clone)]
pub struct FadeEnvelope {
    curve: FadeCurve,
    from: f32,
    to: f32,
    total_frames: u64,
    elapsed_frames: u64,
    level: f32,
    enabled: bool,
}

impl FadeEnvelope {
    /// Envelope resting at `level`
    pub fn new(level: f32) -> Self {
        Self {
            curve: FadeCurve::default(),
            from: level,
            to: level,
            total_frames: 0,
            elapsed_frames: 0,
            level,
            enabled: true,
        }
    }

    pub fn with_curve(mut self, curve: FadeCurve) -> Self {
        self.curve = curve;
        self
    }

    /// Start ramping from the current level to `target` over `duration`
    pub fn start(&mut self, target: f32, duration: Duration, sample_rate: u32) {
        self.from = self.level;
        self.to = target.clamp(0.0, 1.0);
        self.total_frames = (duration.as_secs_f64() * f64::from(sample_rate)) as u64;
        self.elapsed_frames = 0;
        if self.total_frames == 0 {
            self.level = self.to;
        }
    }

    pub fn level(&self) -> f32 {
        self.level
    }

    pub fn is_complete(&self) -> bool {
        self.elapsed_frames >= self.total_frames
    }

    #[inline]
    fn next_gain(&mut self) -> f32 {
        if self.is_complete() {
            self.level = self.to;
            return self.level;
        }
        let position = self.elapsed_frames as f32 / self.total_frames as f32;
        self.level = if self.to >= self.from {
            self.from + (self.to - self.from) * self.curve.calculate_gain(position, false)
        } else {
            self.to + (self.from - self.to) * self.curve.calculate_gain(position, true)
        };
        self.elapsed_frames += 1;
        self.level
    }
}

impl AudioEffect for FadeEnvelope {
    fn process(&mut self, buffer: &mut [f32], _sample_rate: u32) {
        for frame in buffer.chunks_exact_mut(2) {
            let g = self.next_gain();
            frame[0] *= g;
            frame[1] *= g;
        }
    }

    fn reset(&mut self) {
        self.elapsed_frames = self.total_frames;
        self.level = self.to;
    }

    fn set_enabled(&mut self, enabled: bool) {
        self.enabled = enabled;
    }

    fn is_enabled(&self) -> bool {
        self.enabled
    }

    fn name(&self) -> &str {
        "Fade"
    }
}
