//! Background decode worker
//!
//! Owns the symphonia format reader for one session and feeds the renderer
//! with stereo f32 chunks at the device rate.

use crate::error::{AudioError, Result};
use crate::http_source::ProgressiveSource;
use crate::renderer::{DecodedChunk, Playhead};
use crate::resample::StereoResampler;
use crossbeam_channel::{bounded, RecvTimeoutError, SendTimeoutError, Sender, TryRecvError};
use std::sync::Arc;
use std::thread;
use std::time::Duration;
use symphonia::core::audio::SampleBuffer;
use symphonia::core::codecs::{Decoder, DecoderOptions};
use symphonia::core::errors::Error as SymphoniaError;
use symphonia::core::formats::{FormatOptions, FormatReader, SeekMode, SeekTo};
use symphonia::core::io::MediaSourceStream;
use symphonia::core::meta::MetadataOptions;
use symphonia::core::probe::Hint;
use symphonia::core::units::Time;
use tracing::{debug, trace, warn};

const POLL_INTERVAL: Duration = Duration::from_millis(50);

#[derive(Debug, Clone, Copy, PartialEq)]
enum DecoderCommand {
    Seek { position: Duration, generation: u64 },
    Stop,
}

/// Handle to the decode thread; the thread exits once every clone is dropped
#[derive(Clone)]
pub struct DecodeWorker {
    commands: Sender<DecoderCommand>,
}

impl DecodeWorker {
    /// Spawn a worker decoding `source` to interleaved stereo at `target_rate`
    pub fn spawn(
        source: ProgressiveSource,
        extension_hint: Option<String>,
        target_rate: u32,
        chunks: Sender<DecodedChunk>,
        playhead: Arc<Playhead>,
        failures: Sender<String>,
    ) -> Result<Self> {
        let (commands, command_rx) = bounded(8);

        thread::Builder::new()
            .name("ambience-decode".into())
            .spawn(move || {
                let mut stream = match StreamDecoder::open(source, extension_hint.as_deref(), target_rate)
                {
                    Ok(stream) => stream,
                    Err(e) => {
                        warn!(error = %e, "failed to open stream");
                        let _ = failures.send(e.to_string());
                        return;
                    }
                };
                let mut worker = WorkerLoop {
                    commands: command_rx,
                    chunks,
                    playhead,
                    failures,
                };
                worker.run(&mut stream);
            })
            .map_err(|e| AudioError::Codec(format!("failed to spawn decode thread: {e}")))?;

        Ok(Self { commands })
    }

    /// Jump to `position`; chunks are tagged with `generation` from now on
    pub fn seek(&self, position: Duration, generation: u64) {
        let _ = self.commands.try_send(DecoderCommand::Seek {
            position,
            generation,
        });
    }

    pub fn stop(&self) {
        let _ = self.commands.try_send(DecoderCommand::Stop);
    }
}

struct StreamDecoder {
    format: Box<dyn FormatReader>,
    decoder: Box<dyn Decoder>,
    track_id: u32,
    resampler: Option<StereoResampler>,
    sample_buf: Option<SampleBuffer<f32>>,
    /// Frames still to drop after landing before a seek target
    skip_frames: u64,
}

impl StreamDecoder {
    fn open(source: ProgressiveSource, extension: Option<&str>, target_rate: u32) -> Result<Self> {
        let mss = MediaSourceStream::new(Box::new(source), Default::default());

        let mut hint = Hint::new();
        if let Some(ext) = extension {
            hint.with_extension(ext);
        }

        let probed = symphonia::default::get_probe().format(
            &hint,
            mss,
            &FormatOptions::default(),
            &MetadataOptions::default(),
        )?;
        let format = probed.format;

        let track = format
            .default_track()
            .ok_or_else(|| AudioError::Codec("no audio track found".into()))?;
        let track_id = track.id;
        let source_rate = track
            .codec_params
            .sample_rate
            .ok_or_else(|| AudioError::Codec("unknown sample rate".into()))?;

        let decoder =
            symphonia::default::get_codecs().make(&track.codec_params, &DecoderOptions::default())?;

        let resampler = if source_rate == target_rate {
            None
        } else {
            Some(StereoResampler::new(source_rate, target_rate)?)
        };

        debug!(source_rate, target_rate, "stream opened");

        Ok(Self {
            format,
            decoder,
            track_id,
            resampler,
            sample_buf: None,
            skip_frames: 0,
        })
    }

    /// Next batch of device-rate stereo samples; `None` at end of stream
    fn next_samples(&mut self) -> Result<Option<Vec<f32>>> {
        loop {
            let packet = match self.format.next_packet() {
                Ok(packet) => packet,
                Err(SymphoniaError::IoError(e)) if e.kind() == std::io::ErrorKind::UnexpectedEof => {
                    return Ok(None);
                }
                Err(SymphoniaError::ResetRequired) => {
                    self.decoder.reset();
                    continue;
                }
                Err(e) => return Err(e.into()),
            };

            if packet.track_id() != self.track_id {
                continue;
            }

            let decoded = match self.decoder.decode(&packet) {
                Ok(decoded) => decoded,
                Err(SymphoniaError::DecodeError(e)) => {
                    trace!(error = e, "skipping undecodable packet");
                    continue;
                }
                Err(e) => return Err(e.into()),
            };

            let spec = *decoded.spec();
            let channels = spec.channels.count();
            let frames = decoded.capacity();
            if self
                .sample_buf
                .as_ref()
                .map_or(true, |buf| buf.capacity() < frames * channels)
            {
                self.sample_buf = Some(SampleBuffer::new(frames as u64, spec));
            }
            let buf = self
                .sample_buf
                .get_or_insert_with(|| SampleBuffer::new(frames as u64, spec));
            buf.copy_interleaved_ref(decoded);

            let mut stereo = to_stereo(buf.samples(), channels);
            if self.skip_frames > 0 {
                let dropped = self.skip_frames.min(stereo.len() as u64 / 2);
                stereo.drain(..dropped as usize * 2);
                self.skip_frames -= dropped;
                if stereo.is_empty() {
                    continue;
                }
            }
            let samples = match &mut self.resampler {
                Some(resampler) => resampler.push(&stereo)?,
                None => stereo,
            };
            if !samples.is_empty() {
                return Ok(Some(samples));
            }
        }
    }

    fn flush(&mut self) -> Result<Vec<f32>> {
        match &mut self.resampler {
            Some(resampler) => resampler.flush(),
            None => Ok(Vec::new()),
        }
    }

    fn seek(&mut self, position: Duration) -> Result<()> {
        let time = Time::new(position.as_secs(), f64::from(position.subsec_nanos()) / 1e9);
        let seeked = self.format.seek(
            SeekMode::Accurate,
            SeekTo::Time {
                time,
                track_id: Some(self.track_id),
            },
        )?;
        self.skip_frames = seeked.required_ts.saturating_sub(seeked.actual_ts);
        self.decoder.reset();
        if let Some(resampler) = &mut self.resampler {
            resampler.reset();
        }
        Ok(())
    }
}

/// Downmix or duplicate interleaved frames to stereo
fn to_stereo(samples: &[f32], channels: usize) -> Vec<f32> {
    match channels {
        0 => Vec::new(),
        1 => samples.iter().flat_map(|&s| [s, s]).collect(),
        2 => samples.to_vec(),
        n => samples
            .chunks_exact(n)
            .flat_map(|frame| [frame[0], frame[1]])
            .collect(),
    }
}

struct WorkerLoop {
    commands: crossbeam_channel::Receiver<DecoderCommand>,
    chunks: Sender<DecodedChunk>,
    playhead: Arc<Playhead>,
    failures: Sender<String>,
}

enum Flow {
    Delivered,
    Seeked(u64),
    Exit,
}

impl WorkerLoop {
    fn run(&mut self, stream: &mut StreamDecoder) {
        let mut generation = self.playhead.generation();
        let mut at_end = false;

        loop {
            let command = if at_end {
                match self.commands.recv_timeout(POLL_INTERVAL) {
                    Ok(cmd) => Some(cmd),
                    Err(RecvTimeoutError::Timeout) => None,
                    Err(RecvTimeoutError::Disconnected) => return,
                }
            } else {
                match self.commands.try_recv() {
                    Ok(cmd) => Some(cmd),
                    Err(TryRecvError::Empty) => None,
                    Err(TryRecvError::Disconnected) => return,
                }
            };

            match command {
                Some(DecoderCommand::Stop) => return,
                Some(DecoderCommand::Seek {
                    position,
                    generation: next,
                }) => {
                    generation = next;
                    at_end = false;
                    if let Err(e) = stream.seek(position) {
                        warn!(error = %e, ?position, "seek failed");
                    }
                    continue;
                }
                None if at_end => continue,
                None => {}
            }

            match stream.next_samples() {
                Ok(Some(samples)) => match self.deliver(generation, samples, stream) {
                    Flow::Delivered => {}
                    Flow::Seeked(next) => generation = next,
                    Flow::Exit => return,
                },
                Ok(None) => {
                    let tail = match stream.flush() {
                        Ok(tail) => tail,
                        Err(e) => {
                            warn!(error = %e, "resampler flush failed");
                            Vec::new()
                        }
                    };
                    if !tail.is_empty() {
                        match self.deliver(generation, tail, stream) {
                            Flow::Delivered => {}
                            Flow::Seeked(next) => {
                                generation = next;
                                continue;
                            }
                            Flow::Exit => return,
                        }
                    }
                    debug!("decoder reached end of stream");
                    self.playhead.mark_decoder_finished();
                    at_end = true;
                }
                Err(e) => {
                    warn!(error = %e, "decode failed");
                    let _ = self.failures.send(e.to_string());
                    return;
                }
            }
        }
    }

    /// Blocking send that stays responsive to commands
    fn deliver(&mut self, generation: u64, samples: Vec<f32>, stream: &mut StreamDecoder) -> Flow {
        let mut chunk = DecodedChunk {
            generation,
            samples,
        };
        loop {
            match self.chunks.send_timeout(chunk, POLL_INTERVAL) {
                Ok(()) => return Flow::Delivered,
                Err(SendTimeoutError::Disconnected(_)) => return Flow::Exit,
                Err(SendTimeoutError::Timeout(pending)) => chunk = pending,
            }
            match self.commands.try_recv() {
                Ok(DecoderCommand::Stop) | Err(TryRecvError::Disconnected) => return Flow::Exit,
                Ok(DecoderCommand::Seek {
                    position,
                    generation: next,
                }) => {
                    // The pending chunk belongs to the old generation
                    if let Err(e) = stream.seek(position) {
                        warn!(error = %e, ?position, "seek failed");
                    }
                    return Flow::Seeked(next);
                }
                Err(TryRecvError::Empty) => {}
            }
        }
    }
}
