//! Control thread that owns the engine
//!
//! Collaborators (a geolocation poller, a weather fetcher, the CLI) run on
//! their own threads and talk to the engine through a cloneable
//! [`EngineHandle`]. All mutation happens on the one control thread, which
//! sleeps in `recv_timeout` until the next pulse is due and then delivers
//! a timer tick stamped with the generation current when it was armed.
//! Due pulses are also fired after every handled message, so a steady
//! stream of telemetry never holds them back.

use crate::engine::{EngineStatus, EnvironmentalAudioEngine, FrequencyObserver};
use crate::error::{EngineError, EngineResult};
use crate::snapshot::{EnvironmentalSnapshot, TelemetryUpdate};
use crossbeam::channel::{bounded, unbounded, Receiver, RecvTimeoutError, Sender};
use std::thread::{self, JoinHandle};
use std::time::Duration;
use tracing::{debug, info, warn};

/// Longest wait between two looks at the clock
///
/// A suspended backend's clock stands still, so deadlines are re-read
/// periodically rather than trusted for long sleeps.
const MAX_IDLE: Duration = Duration::from_millis(250);

pub enum ControlMessage {
    Start(Sender<EngineResult<EngineStatus>>),
    Stop(Sender<EngineResult<()>>),
    Snapshot(EnvironmentalSnapshot, Sender<EngineResult<()>>),
    Telemetry(TelemetryUpdate, Sender<EngineResult<()>>),
    Status(Sender<EngineStatus>),
    Frequencies(Sender<Vec<f32>>),
    RegisterObserver(Box<dyn FrequencyObserver>),
    ClearObserver,
    Shutdown,
}

/// Cloneable, `Send` access to the engine on its control thread
#[derive(Clone)]
pub struct EngineHandle {
    tx: Sender<ControlMessage>,
}

impl EngineHandle {
    fn send(&self, message: ControlMessage) -> EngineResult<()> {
        self.tx.send(message).map_err(|_| EngineError::ServiceGone)
    }

    fn request<T>(&self, make: impl FnOnce(Sender<T>) -> ControlMessage) -> EngineResult<T> {
        let (reply_tx, reply_rx) = bounded(1);
        self.send(make(reply_tx))?;
        reply_rx.recv().map_err(|_| EngineError::ServiceGone)
    }

    pub fn start(&self) -> EngineResult<EngineStatus> {
        self.request(ControlMessage::Start)?
    }

    pub fn stop(&self) -> EngineResult<()> {
        self.request(ControlMessage::Stop)?
    }

    /// Waits for the control thread so backend faults reach the caller
    pub fn set_environmental_data(&self, snapshot: EnvironmentalSnapshot) -> EngineResult<()> {
        self.request(|reply| ControlMessage::Snapshot(snapshot, reply))?
    }

    pub fn update_telemetry(&self, update: TelemetryUpdate) -> EngineResult<()> {
        self.request(|reply| ControlMessage::Telemetry(update, reply))?
    }

    pub fn status(&self) -> EngineResult<EngineStatus> {
        self.request(ControlMessage::Status)
    }

    pub fn frequencies(&self) -> EngineResult<Vec<f32>> {
        self.request(ControlMessage::Frequencies)
    }

    pub fn register_observer(&self, observer: impl FrequencyObserver + 'static) -> EngineResult<()> {
        self.send(ControlMessage::RegisterObserver(Box::new(observer)))
    }

    pub fn clear_observer(&self) -> EngineResult<()> {
        self.send(ControlMessage::ClearObserver)
    }
}

pub struct EngineService {
    handle: EngineHandle,
    thread: Option<JoinHandle<()>>,
}

impl EngineService {
    /// Move the engine onto its own control thread
    pub fn spawn(engine: EnvironmentalAudioEngine) -> EngineResult<Self> {
        let (tx, rx) = unbounded();
        let thread = thread::Builder::new()
            .name("geodrone-control".into())
            .spawn(move || run(engine, rx))
            .map_err(|_| EngineError::ServiceGone)?;
        Ok(Self {
            handle: EngineHandle { tx },
            thread: Some(thread),
        })
    }

    pub fn handle(&self) -> EngineHandle {
        self.handle.clone()
    }

    /// Stop the engine and wait for the control thread to exit
    pub fn shutdown(mut self) {
        self.join();
    }

    fn join(&mut self) {
        let _ = self.handle.send(ControlMessage::Shutdown);
        if let Some(thread) = self.thread.take() {
            if thread.join().is_err() {
                warn!("control thread panicked");
            }
        }
    }
}

impl Drop for EngineService {
    fn drop(&mut self) {
        self.join();
    }
}

/// Time until the engine's next pulse
fn wait_time(engine: &EnvironmentalAudioEngine) -> Duration {
    match (engine.next_deadline(), engine.current_time()) {
        (Some(deadline), Some(now)) => {
            Duration::from_secs_f64((deadline - now).clamp(0.0, MAX_IDLE.as_secs_f64()))
        }
        _ => MAX_IDLE,
    }
}

fn pulse_due(engine: &EnvironmentalAudioEngine) -> bool {
    matches!(
        (engine.next_deadline(), engine.current_time()),
        (Some(deadline), Some(now)) if deadline <= now
    )
}

fn fire(engine: &mut EnvironmentalAudioEngine, generation: u64) {
    if let Err(e) = engine.tick_with_generation(generation) {
        warn!("pulse failed: {}", e);
    }
}

fn run(mut engine: EnvironmentalAudioEngine, rx: Receiver<ControlMessage>) {
    info!("control thread running");
    serve(&mut engine, &rx);
    if let Err(e) = engine.stop() {
        warn!("engine stop fault: {}", e);
    }
    info!("control thread exited");
}

/// Handle messages until shutdown or until every handle is gone
fn serve(engine: &mut EnvironmentalAudioEngine, rx: &Receiver<ControlMessage>) {
    loop {
        let generation = engine.scheduler().generation();
        let message = match rx.recv_timeout(wait_time(engine)) {
            Ok(message) => message,
            Err(RecvTimeoutError::Timeout) => {
                fire(engine, generation);
                continue;
            }
            Err(RecvTimeoutError::Disconnected) => break,
        };

        match message {
            ControlMessage::Start(reply) => {
                let _ = reply.send(engine.start().map(|()| engine.status()));
            }
            ControlMessage::Stop(reply) => {
                let _ = reply.send(engine.stop());
            }
            ControlMessage::Snapshot(snapshot, reply) => {
                let result = engine.set_environmental_data(snapshot);
                if let Err(e) = &result {
                    warn!("snapshot update failed: {}", e);
                }
                let _ = reply.send(result);
            }
            ControlMessage::Telemetry(update, reply) => {
                let result = engine.update_telemetry(&update);
                if let Err(e) = &result {
                    warn!("telemetry update failed: {}", e);
                }
                let _ = reply.send(result);
            }
            ControlMessage::Status(reply) => {
                let _ = reply.send(engine.status());
            }
            ControlMessage::Frequencies(reply) => {
                let _ = reply.send(engine.frequencies());
            }
            ControlMessage::RegisterObserver(observer) => {
                debug!("observer registered");
                engine.register_boxed_observer(observer);
            }
            ControlMessage::ClearObserver => engine.clear_observer(),
            ControlMessage::Shutdown => break,
        }

        if pulse_due(engine) {
            let generation = engine.scheduler().generation();
            fire(engine, generation);
        }
    }
}
