//! Output callback body
//!
//! Pulls decoded chunks, runs them through the signal chain and maps the
//! stereo result onto however many channels the device has. Underruns are
//! filled with silence.

use ambience_audio::SignalChain;
use crossbeam_channel::Receiver;
use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, AtomicU32, AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

/// Interleaved stereo samples at the device rate
#[derive(Debug, Clone)]
pub struct DecodedChunk {
    /// Seek generation the chunk belongs to
    pub generation: u64,
    pub samples: Vec<f32>,
}

/// Shared playback position and stream progress
#[derive(Debug, Default)]
pub struct Playhead {
    generation: AtomicU64,
    base_ms: AtomicU64,
    frames: AtomicU64,
    sample_rate: AtomicU32,
    decoder_finished: AtomicBool,
    drained: AtomicBool,
}

impl Playhead {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set_sample_rate(&self, sample_rate: u32) {
        self.sample_rate.store(sample_rate, Ordering::Release);
    }

    pub fn sample_rate(&self) -> u32 {
        self.sample_rate.load(Ordering::Acquire)
    }

    pub fn generation(&self) -> u64 {
        self.generation.load(Ordering::Acquire)
    }

    /// Start a new generation at `position`; older chunks are discarded
    pub fn begin_seek(&self, position: Duration) -> u64 {
        self.base_ms
            .store(position.as_millis() as u64, Ordering::Release);
        self.frames.store(0, Ordering::Release);
        self.decoder_finished.store(false, Ordering::Release);
        self.drained.store(false, Ordering::Release);
        self.generation.fetch_add(1, Ordering::AcqRel) + 1
    }

    /// Frames actually rendered since the last seek
    pub fn advance(&self, frames: u64) {
        self.frames.fetch_add(frames, Ordering::AcqRel);
    }

    pub fn position(&self) -> Duration {
        let base = Duration::from_millis(self.base_ms.load(Ordering::Acquire));
        let rate = self.sample_rate();
        if rate == 0 {
            return base;
        }
        let frames = self.frames.load(Ordering::Acquire);
        base + Duration::from_secs_f64(frames as f64 / rate as f64)
    }

    pub fn mark_decoder_finished(&self) {
        self.decoder_finished.store(true, Ordering::Release);
    }

    pub fn is_decoder_finished(&self) -> bool {
        self.decoder_finished.load(Ordering::Acquire)
    }

    /// Decoder finished and every decoded frame has been played
    pub fn is_drained(&self) -> bool {
        self.drained.load(Ordering::Acquire)
    }
}

pub struct Renderer {
    chain: SignalChain,
    chunks: Receiver<DecodedChunk>,
    playhead: Arc<Playhead>,
    pending: VecDeque<f32>,
    scratch: Vec<f32>,
    seen_generation: u64,
    sample_rate: u32,
    channels: usize,
}

impl Renderer {
    pub fn new(chain: SignalChain, chunks: Receiver<DecodedChunk>, playhead: Arc<Playhead>) -> Self {
        let seen_generation = playhead.generation();
        Self {
            chain,
            chunks,
            playhead,
            pending: VecDeque::with_capacity(16 * 1024),
            scratch: Vec::with_capacity(8 * 1024),
            seen_generation,
            sample_rate: 48000,
            channels: 2,
        }
    }

    /// Bind to the negotiated device format
    pub fn configure(&mut self, sample_rate: u32, channels: u16) {
        self.sample_rate = sample_rate;
        self.channels = usize::from(channels.max(1));
        self.playhead.set_sample_rate(sample_rate);
    }

    /// Fill one device buffer
    pub fn render(&mut self, output: &mut [f32]) {
        let frames = output.len() / self.channels;

        let generation = self.playhead.generation();
        if generation != self.seen_generation {
            self.seen_generation = generation;
            self.pending.clear();
            self.chain.reset();
        }

        while self.pending.len() < frames * 2 {
            match self.chunks.try_recv() {
                Ok(chunk) if chunk.generation == generation => self.pending.extend(chunk.samples),
                Ok(_) => {}
                Err(_) => break,
            }
        }

        let available = (self.pending.len() / 2).min(frames);
        self.scratch.clear();
        self.scratch.extend(self.pending.drain(..available * 2));
        self.scratch.resize(frames * 2, 0.0);

        if available < frames
            && self.playhead.is_decoder_finished()
            && self.chunks.is_empty()
        {
            self.playhead.drained.store(true, Ordering::Release);
        }

        self.chain.process(&mut self.scratch, self.sample_rate);
        self.playhead.advance(available as u64);

        for (frame, stereo) in output
            .chunks_exact_mut(self.channels)
            .zip(self.scratch.chunks_exact(2))
        {
            match frame.len() {
                1 => frame[0] = (stereo[0] + stereo[1]) * 0.5,
                _ => {
                    frame[0] = stereo[0];
                    frame[1] = stereo[1];
                    frame[2..].fill(0.0);
                }
            }
        }
        // Trailing partial frame, if any
        let tail = frames * self.channels;
        output[tail..].fill(0.0);
    }
}
