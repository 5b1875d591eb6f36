//! Real-time backend using cpal
//! Works with JACK, ALSA, CoreAudio, WASAPI, etc.
//!
//! The render graph lives inside the output callback. The control plane
//! talks to it only through a lock-free ring of [`GraphCommand`]s, drained
//! at the top of each callback, so scheduling a ramp never blocks the
//! audio thread. cpal streams are not `Send`, so a dedicated host thread
//! builds the stream and owns it until the backend is closed.

use super::{AudioBackend, BackendState, NodeRegistry};
use crate::error::{BackendError, BackendResult};
use crate::render_graph::{GraphCommand, RenderGraph};
use cpal::traits::{DeviceTrait, HostTrait, StreamTrait};
use crossbeam::channel::{bounded, unbounded, Receiver, Sender};
use ringbuf::traits::{Consumer, Producer, Split};
use ringbuf::{HeapCons, HeapProd, HeapRb};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use tracing::{error, info, warn};

/// Commands buffered between two audio callbacks
const COMMAND_CAPACITY: usize = 4096;

enum HostRequest {
    Play(Sender<BackendResult<()>>),
    Pause(Sender<BackendResult<()>>),
    Close,
}

pub struct CpalBackend {
    sample_rate: f32,
    state: BackendState,
    registry: NodeRegistry,
    commands: HeapProd<GraphCommand>,
    frames: Arc<AtomicU64>,
    requests: Sender<HostRequest>,
    host: Option<JoinHandle<()>>,
}

impl CpalBackend {
    /// Open the default output device and start the stream
    ///
    /// A device that refuses to start playing yields a backend in the
    /// `Suspended` state rather than an error.
    pub fn open() -> BackendResult<Self> {
        let (commands, consumer) = HeapRb::<GraphCommand>::new(COMMAND_CAPACITY).split();
        let frames = Arc::new(AtomicU64::new(0));
        let (ready_tx, ready_rx) = bounded(1);
        let (requests, request_rx) = unbounded();

        let frames_clone = Arc::clone(&frames);
        let host = thread::Builder::new()
            .name("geodrone-audio".into())
            .spawn(move || run_host(consumer, frames_clone, ready_tx, request_rx))
            .map_err(|e| BackendError::Unavailable(e.to_string()))?;

        let (sample_rate, state) = match ready_rx.recv() {
            Ok(Ok(ready)) => ready,
            Ok(Err(e)) => {
                let _ = host.join();
                return Err(e);
            }
            Err(_) => {
                return Err(BackendError::Unavailable(
                    "audio host thread exited during setup".into(),
                ))
            }
        };

        Ok(Self {
            sample_rate,
            state,
            registry: NodeRegistry::new(),
            commands,
            frames,
            requests,
            host: Some(host),
        })
    }

    fn request(&self, make: fn(Sender<BackendResult<()>>) -> HostRequest) -> BackendResult<()> {
        let (reply_tx, reply_rx) = bounded(1);
        self.requests
            .send(make(reply_tx))
            .map_err(|_| BackendError::Stream("audio host thread is gone".into()))?;
        reply_rx
            .recv()
            .map_err(|_| BackendError::Stream("audio host thread is gone".into()))?
    }
}

impl AudioBackend for CpalBackend {
    fn sample_rate(&self) -> f32 {
        self.sample_rate
    }

    fn current_time(&self) -> f64 {
        self.frames.load(Ordering::Acquire) as f64 / self.sample_rate as f64
    }

    fn state(&self) -> BackendState {
        self.state
    }

    fn resume(&mut self) -> BackendResult<BackendState> {
        self.ensure_open()?;
        match self.request(HostRequest::Play) {
            Ok(()) => self.state = BackendState::Running,
            Err(e) => {
                warn!("audio stream refused to resume: {}", e);
                self.state = BackendState::Suspended;
            }
        }
        Ok(self.state)
    }

    fn suspend(&mut self) -> BackendResult<()> {
        self.ensure_open()?;
        self.request(HostRequest::Pause)?;
        self.state = BackendState::Suspended;
        Ok(())
    }

    fn close(&mut self) -> BackendResult<()> {
        if self.state == BackendState::Closed {
            return Err(BackendError::AlreadyClosed);
        }
        self.state = BackendState::Closed;
        let _ = self.requests.send(HostRequest::Close);
        if let Some(host) = self.host.take() {
            if host.join().is_err() {
                return Err(BackendError::Stream("audio host thread panicked".into()));
            }
        }
        info!("audio stream closed");
        Ok(())
    }

    fn registry(&mut self) -> &mut NodeRegistry {
        &mut self.registry
    }

    fn submit(&mut self, command: GraphCommand) -> BackendResult<()> {
        self.ensure_open()?;
        self.commands
            .try_push(command)
            .map_err(|_| BackendError::CommandQueueFull)
    }
}

impl Drop for CpalBackend {
    fn drop(&mut self) {
        if self.state != BackendState::Closed {
            let _ = self.close();
        }
    }
}

fn run_host(
    consumer: HeapCons<GraphCommand>,
    frames: Arc<AtomicU64>,
    ready: Sender<BackendResult<(f32, BackendState)>>,
    requests: Receiver<HostRequest>,
) {
    let (stream, sample_rate) = match open_stream(consumer, frames) {
        Ok(opened) => opened,
        Err(e) => {
            let _ = ready.send(Err(e));
            return;
        }
    };

    let state = match stream.play() {
        Ok(()) => {
            info!("Audio stream started at {} Hz", sample_rate);
            BackendState::Running
        }
        Err(e) => {
            warn!("audio stream created but not playing: {}", e);
            BackendState::Suspended
        }
    };
    if ready.send(Ok((sample_rate, state))).is_err() {
        return;
    }

    for request in requests.iter() {
        match request {
            HostRequest::Play(reply) => {
                let _ = reply.send(stream.play().map_err(|e| BackendError::Stream(e.to_string())));
            }
            HostRequest::Pause(reply) => {
                let _ = reply.send(stream.pause().map_err(|e| BackendError::Stream(e.to_string())));
            }
            HostRequest::Close => break,
        }
    }
}

fn open_stream(
    consumer: HeapCons<GraphCommand>,
    frames: Arc<AtomicU64>,
) -> BackendResult<(cpal::Stream, f32)> {
    let host = cpal::default_host();
    info!("Audio host: {:?}", host.id());

    let device = host
        .default_output_device()
        .ok_or_else(|| BackendError::Unavailable("no audio output device found".into()))?;
    info!(
        "Audio device: {}",
        device.name().unwrap_or_else(|_| "unknown".into())
    );

    let supported = device
        .default_output_config()
        .map_err(|e| BackendError::Unavailable(e.to_string()))?;
    let sample_format = supported.sample_format();
    let config: cpal::StreamConfig = supported.into();
    let sample_rate = config.sample_rate.0 as f32;

    let stream = match sample_format {
        cpal::SampleFormat::F32 => build_stream::<f32>(&device, &config, consumer, frames),
        cpal::SampleFormat::I16 => build_stream::<i16>(&device, &config, consumer, frames),
        cpal::SampleFormat::U16 => build_stream::<u16>(&device, &config, consumer, frames),
        other => Err(BackendError::Unavailable(format!(
            "unsupported sample format {:?}",
            other
        ))),
    }?;

    Ok((stream, sample_rate))
}

fn build_stream<T>(
    device: &cpal::Device,
    config: &cpal::StreamConfig,
    mut consumer: HeapCons<GraphCommand>,
    frames: Arc<AtomicU64>,
) -> BackendResult<cpal::Stream>
where
    T: cpal::SizedSample + cpal::FromSample<f32>,
{
    let channels = config.channels as usize;
    let mut graph = RenderGraph::new(config.sample_rate.0 as f32);
    let mut scratch: Vec<f32> = Vec::new();

    device
        .build_output_stream(
            config,
            move |data: &mut [T], _: &cpal::OutputCallbackInfo| {
                while let Some(command) = consumer.try_pop() {
                    graph.apply(command);
                }

                scratch.resize(data.len(), 0.0);
                graph.render_interleaved(&mut scratch, channels);
                for (dst, src) in data.iter_mut().zip(&scratch) {
                    *dst = T::from_sample(*src);
                }

                frames.store(graph.frame(), Ordering::Release);
            },
            |err| error!("Audio stream error: {}", err),
            None,
        )
        .map_err(|e| BackendError::Unavailable(e.to_string()))
}
