//! Shared helpers for the integration tests
//!
//! - RMS / peak measurement of rendered buffers
//! - A recording backend that logs every command it forwards to an
//!   offline render graph, with optional fault injection

#![allow(dead_code)]

use geodrone::backend::{
    AudioBackend, BackendState, GraphCommand, NodeRegistry, OfflineBackend,
    OfflineBackendFactory, OfflineRenderHandle,
};
use geodrone::envelope::RampCurve;
use geodrone::error::{BackendError, BackendResult};
use parking_lot::Mutex;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

/// Calculate RMS (Root Mean Square) of a buffer
pub fn calculate_rms(buffer: &[f32]) -> f32 {
    if buffer.is_empty() {
        return 0.0;
    }
    (buffer.iter().map(|x| x * x).sum::<f32>() / buffer.len() as f32).sqrt()
}

pub fn calculate_peak(buffer: &[f32]) -> f32 {
    buffer.iter().map(|x| x.abs()).fold(0.0f32, f32::max)
}

/// Render `seconds` of interleaved stereo through a handle
pub fn render_seconds(handle: &OfflineRenderHandle, seconds: f32) -> Vec<f32> {
    let frames = (seconds * handle.sample_rate()) as usize;
    let mut buffer = vec![0.0; frames * 2];
    handle.render(&mut buffer);
    buffer
}

/// What a backend was asked to do
#[derive(Debug, Clone, PartialEq)]
pub enum Recorded {
    AddNode(usize),
    Connect(usize, usize),
    ConnectParam { from: usize, to: usize, param: usize },
    Start(usize),
    Stop(usize),
    Cancel { node: usize, param: usize },
    Ramp {
        node: usize,
        param: usize,
        target: f32,
        end_time: f64,
        curve: RampCurve,
    },
    Clear,
}

impl Recorded {
    fn of(command: &GraphCommand) -> Self {
        match command {
            GraphCommand::AddNode { id, .. } => Recorded::AddNode(*id),
            GraphCommand::Connect { from, to } => Recorded::Connect(*from, *to),
            GraphCommand::ConnectParam { from, to, param } => Recorded::ConnectParam {
                from: *from,
                to: *to,
                param: *param,
            },
            GraphCommand::Start(id) => Recorded::Start(*id),
            GraphCommand::Stop(id) => Recorded::Stop(*id),
            GraphCommand::CancelScheduled { node, param } => Recorded::Cancel {
                node: *node,
                param: *param,
            },
            GraphCommand::Ramp {
                node,
                param,
                target,
                end_time,
                curve,
            } => Recorded::Ramp {
                node: *node,
                param: *param,
                target: *target,
                end_time: *end_time,
                curve: *curve,
            },
            GraphCommand::Clear => Recorded::Clear,
        }
    }
}

pub type CommandLog = Arc<Mutex<Vec<Recorded>>>;

/// Offline backend that records its commands
pub struct RecordingBackend {
    inner: OfflineBackend,
    log: CommandLog,
    fail_ramps: Arc<AtomicBool>,
}

impl AudioBackend for RecordingBackend {
    fn sample_rate(&self) -> f32 {
        self.inner.sample_rate()
    }

    fn current_time(&self) -> f64 {
        self.inner.current_time()
    }

    fn state(&self) -> BackendState {
        self.inner.state()
    }

    fn resume(&mut self) -> BackendResult<BackendState> {
        self.inner.resume()
    }

    fn suspend(&mut self) -> BackendResult<()> {
        self.inner.suspend()
    }

    fn close(&mut self) -> BackendResult<()> {
        self.inner.close()
    }

    fn registry(&mut self) -> &mut NodeRegistry {
        self.inner.registry()
    }

    fn submit(&mut self, command: GraphCommand) -> BackendResult<()> {
        if self.fail_ramps.load(Ordering::SeqCst) && matches!(command, GraphCommand::Ramp { .. }) {
            return Err(BackendError::Stream("injected fault".into()));
        }
        self.log.lock().push(Recorded::of(&command));
        self.inner.submit(command)
    }
}

/// Everything a test needs to drive and observe an engine's backend
pub struct Recording {
    pub handle: OfflineRenderHandle,
    pub log: CommandLog,
    pub fail_ramps: Arc<AtomicBool>,
}

impl Recording {
    pub fn commands(&self) -> Vec<Recorded> {
        self.log.lock().clone()
    }

    pub fn clear(&self) {
        self.log.lock().clear();
    }

    pub fn ramps(&self) -> Vec<Recorded> {
        self.commands()
            .into_iter()
            .filter(|c| matches!(c, Recorded::Ramp { .. }))
            .collect()
    }

    pub fn set_fail_ramps(&self, fail: bool) {
        self.fail_ramps.store(fail, Ordering::SeqCst);
    }
}

/// Factory producing recording backends over one shared offline graph
pub fn recording_factory(
    offline: OfflineBackendFactory,
) -> (
    impl FnMut() -> BackendResult<Box<dyn AudioBackend>> + Send + 'static,
    Recording,
) {
    let log: CommandLog = Arc::new(Mutex::new(Vec::new()));
    let fail_ramps = Arc::new(AtomicBool::new(false));
    let recording = Recording {
        handle: offline.render_handle(),
        log: Arc::clone(&log),
        fail_ramps: Arc::clone(&fail_ramps),
    };
    let factory = move || -> BackendResult<Box<dyn AudioBackend>> {
        Ok(Box::new(RecordingBackend {
            inner: offline.build(),
            log: Arc::clone(&log),
            fail_ramps: Arc::clone(&fail_ramps),
        }))
    };
    (factory, recording)
}
