//! One streaming track bound to an output device

use crate::decoder::DecodeWorker;
use crate::host::{AudioHost, StreamFormat};
use crate::http_source::SourceHandle;
use crate::renderer::Playhead;
use crate::retry::{retry_transient, RetryPolicy};
use ambience_audio::{ChainControls, EndOfStreamLatch};
use ambience_core::types::Track;
use ambience_core::{Levels, PlaybackPipeline, ScheduledTask};
use async_trait::async_trait;
use crossbeam_channel::Receiver;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;
use tracing::{debug, info, warn};

/// Extra time after the fade-out before the device is released
const TEARDOWN_MARGIN: Duration = Duration::from_millis(100);

pub(crate) struct SessionParts {
    pub track: Track,
    pub host: AudioHost,
    pub stream_id: u64,
    pub format: StreamFormat,
    pub controls: Arc<ChainControls>,
    pub playhead: Arc<Playhead>,
    pub decoder: DecodeWorker,
    pub source: SourceHandle,
    pub failures: Receiver<String>,
    pub end_offset: Duration,
    pub retry: RetryPolicy,
}

pub struct DesktopSession {
    track: Track,
    host: AudioHost,
    stream_id: u64,
    format: StreamFormat,
    controls: Arc<ChainControls>,
    playhead: Arc<Playhead>,
    decoder: DecodeWorker,
    source: SourceHandle,
    failures: Receiver<String>,
    latch: EndOfStreamLatch,
    retry: RetryPolicy,
    started: AtomicBool,
    teardown: Mutex<Option<ScheduledTask>>,
}

impl DesktopSession {
    pub(crate) fn new(parts: SessionParts) -> Self {
        Self {
            track: parts.track,
            host: parts.host,
            stream_id: parts.stream_id,
            format: parts.format,
            controls: parts.controls,
            playhead: parts.playhead,
            decoder: parts.decoder,
            source: parts.source,
            failures: parts.failures,
            latch: EndOfStreamLatch::new(parts.end_offset),
            retry: parts.retry,
            started: AtomicBool::new(false),
            teardown: Mutex::new(None),
        }
    }

    pub fn format(&self) -> StreamFormat {
        self.format
    }

    /// Current fade envelope level as reported by the audio callback
    pub fn fade_level(&self) -> f32 {
        self.controls.fade_level()
    }

    fn teardown(&self) -> MutexGuard<'_, Option<ScheduledTask>> {
        self.teardown.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn release(&self) {
        self.decoder.stop();
        self.source.stop();
        self.host.close(self.stream_id);
    }
}

#[async_trait]
impl PlaybackPipeline for DesktopSession {
    fn track(&self) -> &Track {
        &self.track
    }

    async fn play(&self, fade_in: Duration) -> bool {
        if self.is_disposing() {
            return false;
        }

        if !self.started.swap(true, Ordering::AcqRel) {
            let host = &self.host;
            let id = self.stream_id;
            if let Err(e) = retry_transient(self.retry, "start output stream", || host.play(id)).await {
                warn!(track = %self.track.external_id, error = %e, "failed to start playback");
                self.started.store(false, Ordering::Release);
                return false;
            }
            info!(track = %self.track.external_id, title = %self.track.title, "playback started");
        }

        self.controls.request_fade(1.0, fade_in);
        true
    }

    fn pause(&self) {
        if self.is_disposing() {
            return;
        }
        self.host.pause(self.stream_id);
    }

    fn resume(&self) {
        if self.is_disposing() {
            return;
        }
        self.host.resume(self.stream_id);
    }

    fn seek(&self, position: Duration) {
        if self.is_disposing() {
            return;
        }
        let generation = self.playhead.begin_seek(position);
        self.decoder.seek(position, generation);
        debug!(track = %self.track.external_id, ?position, "seek");
    }

    fn position(&self) -> Duration {
        let position = self.playhead.position();
        if self.track.duration.is_zero() {
            position
        } else {
            position.min(self.track.duration)
        }
    }

    fn is_buffering(&self) -> bool {
        self.source.is_buffering()
    }

    fn poll_ended(&self) -> bool {
        if self.latch.observe(self.playhead.position(), self.track.duration) {
            return true;
        }
        self.playhead.is_drained() && self.latch.fire()
    }

    fn has_ended(&self) -> bool {
        self.latch.has_fired()
    }

    fn set_submerged(&self, submerged: bool) {
        if self.controls.set_submerged(submerged) {
            debug!(track = %self.track.external_id, submerged, "submerged filters toggled");
        }
    }

    fn set_camera_depth(&self, camera_z: f32) {
        self.controls.set_camera_depth(camera_z);
    }

    fn set_levels(&self, levels: Levels) {
        self.controls.set_levels(levels);
    }

    fn take_failure(&self) -> Option<String> {
        self.failures.try_recv().ok()
    }

    fn dispose(&self, fade_out: Duration) -> ScheduledTask {
        let mut teardown = self.teardown();
        if let Some(task) = teardown.as_ref() {
            return task.clone();
        }

        debug!(track = %self.track.external_id, ?fade_out, "disposing session");
        self.controls.request_fade(0.0, fade_out);

        let decoder = self.decoder.clone();
        let source = self.source.clone();
        let host = self.host.clone();
        let id = self.stream_id;
        let task = ScheduledTask::schedule(fade_out + TEARDOWN_MARGIN, move || {
            decoder.stop();
            source.stop();
            host.close(id);
        });
        *teardown = Some(task.clone());
        task
    }

    fn is_disposing(&self) -> bool {
        self.teardown().is_some()
    }
}

impl Drop for DesktopSession {
    fn drop(&mut self) {
        // A scheduled teardown outlives its handles
        if self.teardown().is_none() {
            self.release();
        }
    }
}
