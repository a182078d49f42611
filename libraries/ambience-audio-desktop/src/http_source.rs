//! Progressive HTTP byte source
//!
//! Downloads the stream into memory on a background thread while the decoder
//! reads from the front. Reads past the downloaded range block until the data
//! arrives, which is reported as buffering. Bodies larger than
//! [`MAX_STREAM_BYTES`] are rejected.

use crate::error::{AudioError, Result};
use std::io::{self, Read, Seek, SeekFrom};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Condvar, Mutex, MutexGuard, PoisonError};
use std::thread;
use symphonia::core::io::MediaSource;
use tracing::{debug, warn};

/// Largest body kept in memory for one track
pub const MAX_STREAM_BYTES: u64 = 128 * 1024 * 1024;

#[derive(Debug, Default)]
struct Download {
    bytes: Vec<u8>,
    complete: bool,
    error: Option<String>,
    total_len: Option<u64>,
}

#[derive(Debug, Default)]
struct Shared {
    download: Mutex<Download>,
    arrived: Condvar,
    stop: AtomicBool,
    buffering: AtomicBool,
}

impl Shared {
    fn lock(&self) -> MutexGuard<'_, Download> {
        self.download.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn append(&self, chunk: &[u8], limit: u64) -> Result<()> {
        {
            let mut download = self.lock();
            let size = (download.bytes.len() + chunk.len()) as u64;
            check_size(size, limit)?;
            download.bytes.extend_from_slice(chunk);
        }
        self.arrived.notify_all();
        Ok(())
    }

    fn finish(&self, error: Option<String>) {
        {
            let mut download = self.lock();
            download.complete = true;
            download.error = error;
        }
        self.arrived.notify_all();
    }
}

/// Control side of a [`ProgressiveSource`]
#[derive(Debug, Clone)]
pub struct SourceHandle {
    shared: Arc<Shared>,
}

impl SourceHandle {
    /// True while a reader is waiting for bytes that have not arrived yet
    pub fn is_buffering(&self) -> bool {
        self.shared.buffering.load(Ordering::Acquire)
    }

    /// Download error, if the transfer failed
    pub fn error(&self) -> Option<String> {
        self.shared.lock().error.clone()
    }

    pub fn downloaded(&self) -> usize {
        self.shared.lock().bytes.len()
    }

    /// Abort the download and unblock any reader
    pub fn stop(&self) {
        self.shared.stop.store(true, Ordering::Release);
        self.shared.arrived.notify_all();
    }
}

/// Seekable reader over a progressively downloaded body
#[derive(Debug)]
pub struct ProgressiveSource {
    shared: Arc<Shared>,
    position: u64,
}

impl ProgressiveSource {
    /// Start downloading `url` on a background thread
    pub fn open(url: &str) -> Result<(Self, SourceHandle)> {
        let url = reqwest::Url::parse(url).map_err(|e| AudioError::Http(e.to_string()))?;
        let shared = Arc::new(Shared::default());

        let download = Arc::clone(&shared);
        thread::Builder::new()
            .name("ambience-download".into())
            .spawn(move || download_thread(url, download))
            .map_err(|e| AudioError::Http(format!("failed to spawn download thread: {e}")))?;

        Ok(Self::with_shared(shared))
    }

    /// Source over bytes that are already in memory
    pub fn from_bytes(bytes: Vec<u8>) -> (Self, SourceHandle) {
        let shared = Arc::new(Shared::default());
        {
            let mut download = shared.lock();
            download.total_len = Some(bytes.len() as u64);
            download.bytes = bytes;
            download.complete = true;
        }
        Self::with_shared(shared)
    }

    fn with_shared(shared: Arc<Shared>) -> (Self, SourceHandle) {
        let handle = SourceHandle {
            shared: Arc::clone(&shared),
        };
        (
            Self {
                shared,
                position: 0,
            },
            handle,
        )
    }
}

impl Read for ProgressiveSource {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        if buf.is_empty() {
            return Ok(0);
        }

        let shared = Arc::clone(&self.shared);
        let mut download = shared.lock();
        loop {
            if shared.stop.load(Ordering::Acquire) {
                shared.buffering.store(false, Ordering::Release);
                return Ok(0);
            }

            let available = download.bytes.len() as u64;
            if self.position < available {
                shared.buffering.store(false, Ordering::Release);
                let start = self.position as usize;
                let n = buf.len().min(download.bytes.len() - start);
                buf[..n].copy_from_slice(&download.bytes[start..start + n]);
                self.position += n as u64;
                return Ok(n);
            }

            if download.complete {
                shared.buffering.store(false, Ordering::Release);
                return match &download.error {
                    Some(message) => Err(io::Error::other(message.clone())),
                    None => Ok(0),
                };
            }

            shared.buffering.store(true, Ordering::Release);
            download = shared
                .arrived
                .wait(download)
                .unwrap_or_else(PoisonError::into_inner);
        }
    }
}

impl Seek for ProgressiveSource {
    fn seek(&mut self, pos: SeekFrom) -> io::Result<u64> {
        let target = match pos {
            SeekFrom::Start(offset) => Some(offset),
            SeekFrom::Current(delta) => self.position.checked_add_signed(delta),
            SeekFrom::End(delta) => {
                let total = self.shared.lock().total_len.ok_or_else(|| {
                    io::Error::new(io::ErrorKind::Unsupported, "stream length unknown")
                })?;
                total.checked_add_signed(delta)
            }
        };
        let target = target
            .ok_or_else(|| io::Error::new(io::ErrorKind::InvalidInput, "seek before start"))?;
        self.position = target;
        Ok(target)
    }
}

impl MediaSource for ProgressiveSource {
    fn is_seekable(&self) -> bool {
        true
    }

    fn byte_len(&self) -> Option<u64> {
        self.shared.lock().total_len
    }
}

fn download_thread(url: reqwest::Url, shared: Arc<Shared>) {
    let runtime = match tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()
    {
        Ok(rt) => rt,
        Err(e) => {
            shared.finish(Some(format!("failed to create runtime: {e}")));
            return;
        }
    };

    let result = runtime.block_on(download(&url, &shared));
    match result {
        Ok(()) => {
            debug!(bytes = shared.lock().bytes.len(), "stream download complete");
            shared.finish(None);
        }
        Err(e) => {
            warn!(error = %e, "stream download failed");
            shared.finish(Some(e.to_string()));
        }
    }
}

async fn download(url: &reqwest::Url, shared: &Shared) -> Result<()> {
    let mut response = reqwest::Client::new().get(url.clone()).send().await?;
    let status = response.status();
    if !status.is_success() {
        return Err(AudioError::Http(format!("unexpected status {status}")));
    }
    let total_len = response.content_length();
    if let Some(len) = total_len {
        check_size(len, MAX_STREAM_BYTES)?;
    }
    shared.lock().total_len = total_len;

    while !shared.stop.load(Ordering::Acquire) {
        match response.chunk().await? {
            Some(chunk) => shared.append(&chunk, MAX_STREAM_BYTES)?,
            None => break,
        }
    }
    Ok(())
}

fn check_size(size: u64, limit: u64) -> Result<()> {
    if size > limit {
        return Err(AudioError::TooLarge(size, limit));
    }
    Ok(())
}
