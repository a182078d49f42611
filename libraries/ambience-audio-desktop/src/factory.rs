//! Opens [`DesktopSession`]s on the shared audio host

use crate::decoder::DecodeWorker;
use crate::error::{AudioError, Result};
use crate::host::AudioHost;
use crate::http_source::ProgressiveSource;
use crate::renderer::{DecodedChunk, Playhead, Renderer};
use crate::retry::{retry_transient, RetryPolicy};
use crate::session::{DesktopSession, SessionParts};
use ambience_audio::{ChainControls, SignalChain};
use ambience_core::types::Track;
use ambience_core::{ModuleConfig, PipelineFactory, Session, SessionSetup};
use async_trait::async_trait;
use crossbeam_channel::bounded;
use std::sync::Arc;
use tracing::{info, warn};

/// Decoded chunks buffered between decoder and callback
const CHUNK_QUEUE: usize = 32;
const FAILURE_QUEUE: usize = 16;

pub struct DesktopPipelineFactory {
    host: AudioHost,
    retry: RetryPolicy,
}

impl DesktopPipelineFactory {
    pub fn new(host: AudioHost, config: &ModuleConfig) -> Self {
        Self {
            host,
            retry: RetryPolicy::from(config),
        }
    }

    /// Factory with its own audio host thread
    pub fn spawn(config: &ModuleConfig) -> Result<Self> {
        Ok(Self::new(AudioHost::spawn()?, config))
    }

    pub fn host(&self) -> &AudioHost {
        &self.host
    }

    async fn try_open(&self, track: &Track, setup: SessionSetup) -> Result<DesktopSession> {
        let url = track
            .stream_url()
            .ok_or_else(|| AudioError::NoResolvedUrl(track.external_id.clone()))?;

        let controls = Arc::new(ChainControls::new(
            track.volume,
            setup.levels,
            setup.submerged,
            setup.camera_z,
        ));
        let playhead = Arc::new(Playhead::new());
        let (failure_tx, failure_rx) = bounded(FAILURE_QUEUE);

        let (stream_id, format, chunk_tx) = retry_transient(self.retry, "open output stream", || {
            let (chunk_tx, chunk_rx) = bounded::<DecodedChunk>(CHUNK_QUEUE);
            let renderer = Renderer::new(
                SignalChain::new(Arc::clone(&controls)),
                chunk_rx,
                Arc::clone(&playhead),
            );
            let host = self.host.clone();
            let device = setup.device.clone();
            let failures = failure_tx.clone();
            async move {
                let (id, format) = host.open(device.as_deref(), renderer, failures).await?;
                Ok((id, format, chunk_tx))
            }
        })
        .await?;

        let started = ProgressiveSource::open(url).and_then(|(source, handle)| {
            let decoder = DecodeWorker::spawn(
                source,
                extension_hint(url),
                format.sample_rate,
                chunk_tx,
                Arc::clone(&playhead),
                failure_tx,
            );
            if decoder.is_err() {
                handle.stop();
            }
            decoder.map(|decoder| (decoder, handle))
        });
        let (decoder, source) = match started {
            Ok(parts) => parts,
            Err(e) => {
                self.host.close(stream_id);
                return Err(e);
            }
        };

        info!(
            track = %track.external_id,
            sample_rate = format.sample_rate,
            channels = format.channels,
            "session opened"
        );

        Ok(DesktopSession::new(SessionParts {
            track: track.clone(),
            host: self.host.clone(),
            stream_id,
            format,
            controls,
            playhead,
            decoder,
            source,
            failures: failure_rx,
            end_offset: setup.end_offset,
            retry: self.retry,
        }))
    }
}

#[async_trait]
impl PipelineFactory for DesktopPipelineFactory {
    async fn open(&self, track: &Track, setup: SessionSetup) -> Session {
        match self.try_open(track, setup).await {
            Ok(session) => Session::Active(Box::new(session)),
            Err(e) => {
                warn!(track = %track.external_id, error = %e, "could not open session");
                Session::Idle
            }
        }
    }
}

/// File extension of the URL path, used as a probe hint
fn extension_hint(url: &str) -> Option<String> {
    let parsed = reqwest::Url::parse(url).ok()?;
    let last = parsed.path_segments()?.next_back()?;
    let (_, ext) = last.rsplit_once('.')?;
    (!ext.is_empty() && ext.len() <= 5).then(|| ext.to_ascii_lowercase())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[test]
    fn test_extension_hint() {
        assert_eq!(
            extension_hint("https://cdn.example.com/a/b/track.MP3?sig=1").as_deref(),
            Some("mp3")
        );
        assert_eq!(extension_hint("https://cdn.example.com/stream"), None);
        assert_eq!(extension_hint("not a url"), None);
    }

    #[tokio::test]
    async fn test_unresolved_track_yields_idle() {
        let factory = DesktopPipelineFactory::spawn(&ModuleConfig::default()).unwrap();
        let track = Track::new(
            "t1",
            "Unresolved",
            "https://soundcloud.com/artist/t1",
            Duration::from_secs(60),
        );
        let session = factory.open(&track, SessionSetup::default()).await;
        assert!(session.is_idle());
        factory.host().shutdown();
    }
}
