//! Streaming stereo resampler
//!
//! Wraps rubato's fixed-input resampler so arbitrary packet sizes can be
//! pushed; input is buffered until a full chunk is available.

use crate::error::{AudioError, Result};
use rubato::{FastFixedIn, PolynomialDegree, Resampler};

const CHUNK_FRAMES: usize = 1024;

pub struct StereoResampler {
    inner: FastFixedIn<f32>,
    pending: [Vec<f32>; 2],
}

impl StereoResampler {
    pub fn new(source_rate: u32, target_rate: u32) -> Result<Self> {
        let inner = FastFixedIn::<f32>::new(
            target_rate as f64 / source_rate as f64,
            2.0,
            PolynomialDegree::Linear,
            CHUNK_FRAMES,
            2,
        )
        .map_err(|e| AudioError::Codec(format!("resampler creation failed: {e}")))?;

        Ok(Self {
            inner,
            pending: [Vec::with_capacity(CHUNK_FRAMES * 2), Vec::with_capacity(CHUNK_FRAMES * 2)],
        })
    }

    /// Push interleaved stereo frames; returns whatever full chunks produced
    pub fn push(&mut self, interleaved: &[f32]) -> Result<Vec<f32>> {
        for frame in interleaved.chunks_exact(2) {
            self.pending[0].push(frame[0]);
            self.pending[1].push(frame[1]);
        }

        let mut output = Vec::new();
        loop {
            let needed = self.inner.input_frames_next();
            if self.pending[0].len() < needed {
                break;
            }
            let input = [&self.pending[0][..needed], &self.pending[1][..needed]];
            let resampled = self
                .inner
                .process(&input[..], None)
                .map_err(|e| AudioError::Codec(format!("resampling error: {e}")))?;
            interleave_into(&resampled, &mut output);
            self.pending[0].drain(..needed);
            self.pending[1].drain(..needed);
        }
        Ok(output)
    }

    /// Resample the buffered tail at end of stream
    pub fn flush(&mut self) -> Result<Vec<f32>> {
        if self.pending[0].is_empty() {
            return Ok(Vec::new());
        }
        let input = [&self.pending[0][..], &self.pending[1][..]];
        let resampled = self
            .inner
            .process_partial(Some(&input[..]), None)
            .map_err(|e| AudioError::Codec(format!("resampling error: {e}")))?;
        self.pending[0].clear();
        self.pending[1].clear();

        let mut output = Vec::new();
        interleave_into(&resampled, &mut output);
        Ok(output)
    }

    /// Drop buffered input and filter state, e.g. after a seek
    pub fn reset(&mut self) {
        self.inner.reset();
        self.pending[0].clear();
        self.pending[1].clear();
    }
}

fn interleave_into(channels: &[Vec<f32>], output: &mut Vec<f32>) {
    let frames = channels.first().map_or(0, Vec::len);
    output.reserve(frames * 2);
    for i in 0..frames {
        output.push(channels[0][i]);
        output.push(channels[1][i]);
    }
}
