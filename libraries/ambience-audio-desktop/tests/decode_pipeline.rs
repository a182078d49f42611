//! Decoding a generated WAV through worker and renderer, no device needed

use ambience_audio::{ChainControls, SignalChain};
use ambience_audio_desktop::{DecodeWorker, DecodedChunk, Playhead, ProgressiveSource, Renderer};
use ambience_core::Levels;
use crossbeam_channel::bounded;
use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};

/// 16-bit PCM WAV containing a constant level
fn wav(sample_rate: u32, channels: u16, seconds: f32, level: i16) -> Vec<u8> {
    let frames = (sample_rate as f32 * seconds) as u32;
    let data_len = frames * u32::from(channels) * 2;
    let mut out = Vec::with_capacity(44 + data_len as usize);
    out.extend_from_slice(b"RIFF");
    out.extend_from_slice(&(36 + data_len).to_le_bytes());
    out.extend_from_slice(b"WAVEfmt ");
    out.extend_from_slice(&16u32.to_le_bytes());
    out.extend_from_slice(&1u16.to_le_bytes());
    out.extend_from_slice(&channels.to_le_bytes());
    out.extend_from_slice(&sample_rate.to_le_bytes());
    out.extend_from_slice(&(sample_rate * u32::from(channels) * 2).to_le_bytes());
    out.extend_from_slice(&(channels * 2).to_le_bytes());
    out.extend_from_slice(&16u16.to_le_bytes());
    out.extend_from_slice(b"data");
    out.extend_from_slice(&data_len.to_le_bytes());
    for _ in 0..frames * u32::from(channels) {
        out.extend_from_slice(&level.to_le_bytes());
    }
    out
}

fn full_volume() -> Arc<ChainControls> {
    let controls = Arc::new(ChainControls::new(
        1.0,
        Levels {
            master_volume: 1.0,
            muted: false,
            host_output_scale: 1.0,
        },
        false,
        10.0,
    ));
    controls.request_fade(1.0, Duration::ZERO);
    controls
}

fn wait_until(mut done: impl FnMut() -> bool) {
    let deadline = Instant::now() + Duration::from_secs(10);
    while !done() {
        assert!(Instant::now() < deadline, "timed out");
        thread::sleep(Duration::from_millis(5));
    }
}

#[test]
fn test_mono_wav_decodes_to_stereo_until_drained() {
    let (source, _handle) = ProgressiveSource::from_bytes(wav(8000, 1, 0.5, i16::MAX / 2));
    let playhead = Arc::new(Playhead::new());
    let (chunk_tx, chunk_rx) = bounded::<DecodedChunk>(64);
    let (failure_tx, failure_rx) = bounded(4);

    let mut renderer = Renderer::new(SignalChain::new(full_volume()), chunk_rx, Arc::clone(&playhead));
    renderer.configure(8000, 2);

    let _worker = DecodeWorker::spawn(
        source,
        Some("wav".into()),
        8000,
        chunk_tx,
        Arc::clone(&playhead),
        failure_tx,
    )
    .unwrap();

    let mut out = vec![0.0f32; 512];
    let mut heard = false;
    wait_until(|| {
        renderer.render(&mut out);
        heard |= out.iter().any(|&s| (s - 0.5).abs() < 0.01);
        playhead.is_drained()
    });

    assert!(heard);
    assert!(failure_rx.try_recv().is_err());
    let position = playhead.position();
    assert!(
        position >= Duration::from_millis(490) && position <= Duration::from_millis(510),
        "{position:?}"
    );
}

#[test]
fn test_seek_restarts_position_from_target() {
    let (source, _handle) = ProgressiveSource::from_bytes(wav(8000, 2, 2.0, 1000));
    let playhead = Arc::new(Playhead::new());
    let (chunk_tx, chunk_rx) = bounded::<DecodedChunk>(4);
    let (failure_tx, _failure_rx) = bounded(4);

    let mut renderer = Renderer::new(SignalChain::new(full_volume()), chunk_rx, Arc::clone(&playhead));
    renderer.configure(8000, 2);

    let worker = DecodeWorker::spawn(
        source,
        Some("wav".into()),
        8000,
        chunk_tx,
        Arc::clone(&playhead),
        failure_tx,
    )
    .unwrap();

    let generation = playhead.begin_seek(Duration::from_millis(1500));
    worker.seek(Duration::from_millis(1500), generation);

    let mut out = vec![0.0f32; 256];
    wait_until(|| {
        renderer.render(&mut out);
        playhead.is_drained()
    });

    let position = playhead.position();
    assert!(
        position >= Duration::from_millis(1950) && position <= Duration::from_millis(2050),
        "{position:?}"
    );
}

#[test]
fn test_garbage_input_reports_failure() {
    let (source, _handle) = ProgressiveSource::from_bytes(vec![0x42; 4096]);
    let (chunk_tx, _chunk_rx) = bounded::<DecodedChunk>(4);
    let (failure_tx, failure_rx) = bounded(4);

    let _worker = DecodeWorker::spawn(
        source,
        None,
        48000,
        chunk_tx,
        Arc::new(Playhead::new()),
        failure_tx,
    )
    .unwrap();

    let failure = failure_rx.recv_timeout(Duration::from_secs(10));
    assert!(failure.is_ok());
}
