//! Audio host thread
//!
//! cpal streams are not `Send` on every platform, so one dedicated thread
//! builds and owns every output stream. Sessions talk to it over a channel
//! and address their stream by id.

use crate::device::find_output_device;
use crate::error::{AudioError, Result};
use crate::renderer::Renderer;
use cpal::traits::{DeviceTrait, StreamTrait};
use cpal::{Stream, StreamConfig};
use crossbeam_channel::{bounded, Receiver, Sender};
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::thread;
use tokio::sync::oneshot;
use tracing::{debug, info, warn};

/// Negotiated device format of an open stream
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StreamFormat {
    pub sample_rate: u32,
    pub channels: u16,
}

enum HostCommand {
    Open {
        id: u64,
        device: Option<String>,
        renderer: Box<Renderer>,
        failures: Sender<String>,
        reply: oneshot::Sender<Result<StreamFormat>>,
    },
    Play {
        id: u64,
        reply: oneshot::Sender<Result<()>>,
    },
    Pause(u64),
    Resume(u64),
    Close(u64),
    Shutdown,
}

/// Cloneable handle to the audio host thread
#[derive(Clone)]
pub struct AudioHost {
    commands: Sender<HostCommand>,
    next_id: Arc<AtomicU64>,
}

impl AudioHost {
    pub fn spawn() -> Result<Self> {
        let (commands, command_rx) = bounded::<HostCommand>(64);
        thread::Builder::new()
            .name("ambience-audio-host".into())
            .spawn(move || host_thread_run(command_rx))
            .map_err(|e| AudioError::device(format!("failed to spawn audio host: {e}")))?;

        Ok(Self {
            commands,
            next_id: Arc::new(AtomicU64::new(1)),
        })
    }

    /// Build a paused output stream driven by `renderer`
    pub async fn open(
        &self,
        device: Option<&str>,
        renderer: Renderer,
        failures: Sender<String>,
    ) -> Result<(u64, StreamFormat)> {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        let (reply, response) = oneshot::channel();
        self.send(HostCommand::Open {
            id,
            device: device.map(str::to_owned),
            renderer: Box::new(renderer),
            failures,
            reply,
        })?;
        let format = response.await.map_err(|_| AudioError::HostGone)??;
        Ok((id, format))
    }

    pub async fn play(&self, id: u64) -> Result<()> {
        let (reply, response) = oneshot::channel();
        self.send(HostCommand::Play { id, reply })?;
        response.await.map_err(|_| AudioError::HostGone)?
    }

    pub fn pause(&self, id: u64) {
        let _ = self.send(HostCommand::Pause(id));
    }

    pub fn resume(&self, id: u64) {
        let _ = self.send(HostCommand::Resume(id));
    }

    /// Release the stream and its device
    pub fn close(&self, id: u64) {
        let _ = self.send(HostCommand::Close(id));
    }

    /// Drop every stream and stop the thread
    pub fn shutdown(&self) {
        let _ = self.send(HostCommand::Shutdown);
    }

    fn send(&self, command: HostCommand) -> Result<()> {
        self.commands.send(command).map_err(|_| AudioError::HostGone)
    }
}

fn host_thread_run(command_rx: Receiver<HostCommand>) {
    let mut streams: HashMap<u64, Stream> = HashMap::new();

    while let Ok(cmd) = command_rx.recv() {
        match cmd {
            HostCommand::Open {
                id,
                device,
                renderer,
                failures,
                reply,
            } => {
                let result = build_stream(device.as_deref(), *renderer, failures).map(
                    |(stream, format)| {
                        streams.insert(id, stream);
                        format
                    },
                );
                match &result {
                    Ok(format) => debug!(id, ?format, "output stream built"),
                    Err(e) => warn!(id, error = %e, "failed to build output stream"),
                }
                let _ = reply.send(result);
            }
            HostCommand::Play { id, reply } => {
                let result = match streams.get(&id) {
                    Some(stream) => stream.play().map_err(AudioError::from),
                    None => Err(AudioError::UnknownSession(id)),
                };
                let _ = reply.send(result);
            }
            HostCommand::Pause(id) => {
                if let Some(stream) = streams.get(&id) {
                    if let Err(e) = stream.pause() {
                        warn!(id, error = %e, "failed to pause stream");
                    }
                }
            }
            HostCommand::Resume(id) => {
                if let Some(stream) = streams.get(&id) {
                    if let Err(e) = stream.play() {
                        warn!(id, error = %e, "failed to resume stream");
                    }
                }
            }
            HostCommand::Close(id) => {
                if streams.remove(&id).is_some() {
                    debug!(id, "output stream closed");
                }
            }
            HostCommand::Shutdown => break,
        }
    }

    info!(open = streams.len(), "audio host stopping");
}

fn build_stream(
    device_name: Option<&str>,
    mut renderer: Renderer,
    failures: Sender<String>,
) -> Result<(Stream, StreamFormat)> {
    let device = find_output_device(device_name)?;
    let supported = device.default_output_config()?;
    let format = StreamFormat {
        sample_rate: supported.sample_rate(),
        channels: supported.channels(),
    };
    let config: StreamConfig = supported.config();
    renderer.configure(format.sample_rate, format.channels);

    let stream = device.build_output_stream(
        &config,
        move |data: &mut [f32], _: &cpal::OutputCallbackInfo| renderer.render(data),
        move |err| {
            let _ = failures.try_send(err.to_string());
        },
        None,
    )?;

    // Some backends start immediately; stay silent until asked to play
    if let Err(e) = stream.pause() {
        debug!(error = %e, "backend cannot pause a fresh stream");
    }
    Ok((stream, format))
}
