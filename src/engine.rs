//! EnvironmentalAudioEngine - lifecycle and orchestration
//!
//! Owns the signal graph, the pulse scheduler and the latest snapshot.
//! A snapshot update recomputes targets through the [`ParameterMapper`]
//! and ramps the graph towards them; [`EnvironmentalAudioEngine::tick`]
//! fires due pulses against the backend clock. The engine is driven from
//! one control thread (see [`crate::service`]); it never renders audio.

use crate::backend::{BackendFactory, BackendState};
use crate::config::EngineConfig;
use crate::envelope::RampCurve;
use crate::error::{BackendResult, EngineError, EngineResult};
use crate::mapper::{ParameterMapper, TargetParameters};
use crate::scheduler::{FadeDirection, SporadicScheduler};
use crate::signal_graph::SignalGraph;
use crate::snapshot::{EnvironmentalSnapshot, TelemetryUpdate};
use rand::rngs::StdRng;
use rand::SeedableRng;
use std::time::Duration;
use tracing::{debug, info, warn};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EngineStatus {
    Stopped,
    Running,
    /// Started, but the backend stayed suspended after the resume retry
    Suspended,
}

impl EngineStatus {
    pub fn is_started(&self) -> bool {
        !matches!(self, EngineStatus::Stopped)
    }
}

/// Receives the per-channel frequencies after every recomputation
pub trait FrequencyObserver: Send {
    fn frequencies_changed(&mut self, frequencies: &[f32]);
}

impl<F> FrequencyObserver for F
where
    F: FnMut(&[f32]) + Send,
{
    fn frequencies_changed(&mut self, frequencies: &[f32]) {
        self(frequencies)
    }
}

/// Push-based observer; a full or disconnected channel drops the update
impl FrequencyObserver for crossbeam::channel::Sender<Vec<f32>> {
    fn frequencies_changed(&mut self, frequencies: &[f32]) {
        let _ = self.try_send(frequencies.to_vec());
    }
}

pub struct EnvironmentalAudioEngine {
    config: EngineConfig,
    factory: Box<dyn BackendFactory>,
    mapper: ParameterMapper,
    scheduler: SporadicScheduler,
    graph: Option<SignalGraph>,
    snapshot: EnvironmentalSnapshot,
    targets: Option<TargetParameters>,
    observer: Option<Box<dyn FrequencyObserver>>,
    rng: StdRng,
    status: EngineStatus,
}

impl EnvironmentalAudioEngine {
    pub fn new(config: EngineConfig, factory: impl BackendFactory + 'static) -> EngineResult<Self> {
        config.validate()?;
        let mapper = ParameterMapper::new(config.strategy, config.channel_count)
            .with_drift(config.drift_hz_per_degree);
        let scheduler = SporadicScheduler::new(config.pulse.clone(), config.channel_count);
        let rng = match config.seed {
            Some(seed) => StdRng::seed_from_u64(seed),
            None => StdRng::from_entropy(),
        };
        Ok(Self {
            config,
            factory: Box::new(factory),
            mapper,
            scheduler,
            graph: None,
            snapshot: EnvironmentalSnapshot::default(),
            targets: None,
            observer: None,
            rng,
            status: EngineStatus::Stopped,
        })
    }

    /// Build the backend and graph and start pulsing
    ///
    /// No-op when already started. Targets come from the latest stored
    /// snapshot (the neutral default if none was ever set).
    pub fn start(&mut self) -> EngineResult<()> {
        if self.status.is_started() {
            return Ok(());
        }

        let mut backend = self
            .factory
            .create()
            .map_err(|e| EngineError::BackendUnavailable(e.to_string()))?;

        let mut state = backend.state();
        if state == BackendState::Suspended {
            warn!("audio backend suspended, attempting resume");
            state = backend.resume()?;
            if state == BackendState::Suspended {
                std::thread::sleep(Duration::from_millis(self.config.resume_retry_delay_ms));
                state = backend.resume()?;
            }
            if state == BackendState::Suspended {
                warn!("audio backend still suspended; engine runs silent");
            }
        }

        let targets = self.mapper.map(&self.snapshot, &mut self.rng);
        let mut graph = SignalGraph::initialize(backend, &self.config, &targets, &mut self.rng)?;

        for (channel, &gain) in targets.gains.iter().enumerate() {
            self.scheduler.set_nominal_gain(channel, gain);
        }
        if let Err(e) = apply_targets(&mut graph, &self.scheduler, &self.config, &targets) {
            let _ = graph.teardown();
            return Err(e.into());
        }
        self.scheduler.arm_all(graph.current_time(), &mut self.rng);

        self.graph = Some(graph);
        self.targets = Some(targets);
        self.status = if state == BackendState::Suspended {
            EngineStatus::Suspended
        } else {
            EngineStatus::Running
        };
        info!(
            "engine started ({:?}, {} channels, {:?})",
            self.config.strategy, self.config.channel_count, self.status
        );
        self.notify();
        Ok(())
    }

    /// Cancel every pulse, then tear the graph down. Idempotent.
    pub fn stop(&mut self) -> EngineResult<()> {
        if !self.status.is_started() {
            return Ok(());
        }
        // Pulses go first so nothing can fade a graph being torn down
        self.scheduler.cancel_all();
        let result = match self.graph.take() {
            Some(mut graph) => graph.teardown(),
            None => Ok(()),
        };
        self.targets = None;
        self.status = EngineStatus::Stopped;
        info!("engine stopped");
        result.map_err(EngineError::from)
    }

    /// Try once more to resume a suspended backend
    pub fn retry_resume(&mut self) -> EngineResult<EngineStatus> {
        if self.status == EngineStatus::Suspended {
            if let Some(graph) = self.graph.as_mut() {
                if graph.backend_mut().resume()? == BackendState::Running {
                    info!("audio backend resumed");
                    self.status = EngineStatus::Running;
                }
            }
        }
        Ok(self.status)
    }

    /// Store a snapshot and, when started, ramp towards its targets
    ///
    /// A fault leaves the engine started so `stop()` stays callable.
    pub fn set_environmental_data(&mut self, snapshot: EnvironmentalSnapshot) -> EngineResult<()> {
        self.snapshot = snapshot;
        let Some(graph) = self.graph.as_mut() else {
            debug!("engine stopped; snapshot stored for next start");
            return Ok(());
        };

        let targets = self.mapper.map(&self.snapshot, &mut self.rng);
        for (channel, &gain) in targets.gains.iter().enumerate() {
            self.scheduler.set_nominal_gain(channel, gain);
        }
        apply_targets(graph, &self.scheduler, &self.config, &targets)?;
        debug!("targets updated: {:?}", targets.frequencies);

        self.targets = Some(targets);
        self.notify();
        Ok(())
    }

    /// Merge a partial reading into the current snapshot and apply it
    pub fn update_telemetry(&mut self, update: &TelemetryUpdate) -> EngineResult<()> {
        let snapshot = update.merge_into(&self.snapshot);
        self.set_environmental_data(snapshot)
    }

    /// Fire due pulses; returns the number of fades applied
    pub fn tick(&mut self) -> EngineResult<usize> {
        self.tick_with_generation(self.scheduler.generation())
    }

    /// Like [`tick`](Self::tick), but a timer armed under an older
    /// generation (before a stop) does nothing
    pub fn tick_with_generation(&mut self, generation: u64) -> EngineResult<usize> {
        if generation != self.scheduler.generation() {
            debug!("dropping stale timer (generation {})", generation);
            return Ok(0);
        }
        let Some(graph) = self.graph.as_mut() else {
            return Ok(0);
        };
        if graph.is_torn_down() {
            return Ok(0);
        }

        let now = graph.current_time();
        let requests = self.scheduler.advance(now, &mut self.rng);
        for request in &requests {
            debug!(
                "pulse: channel {} fade {} to {:.3} over {:.2}s",
                request.channel,
                match request.direction {
                    FadeDirection::In => "in",
                    FadeDirection::Out => "out",
                },
                request.target_gain,
                request.duration_secs
            );
            graph.set_channel_gain(
                request.channel,
                request.target_gain,
                request.duration_secs,
                RampCurve::Linear,
            )?;
        }
        Ok(requests.len())
    }

    /// Backend time of the next armed pulse
    pub fn next_deadline(&self) -> Option<f64> {
        self.graph.as_ref()?;
        self.scheduler.next_deadline()
    }

    /// Backend clock, when started
    pub fn current_time(&self) -> Option<f64> {
        self.graph.as_ref().map(|g| g.current_time())
    }

    /// Single slot: a new observer replaces the previous one
    pub fn register_observer(&mut self, observer: impl FrequencyObserver + 'static) {
        self.observer = Some(Box::new(observer));
    }

    pub fn register_boxed_observer(&mut self, observer: Box<dyn FrequencyObserver>) {
        self.observer = Some(observer);
    }

    pub fn clear_observer(&mut self) {
        self.observer = None;
    }

    fn notify(&mut self) {
        if let (Some(observer), Some(graph)) = (self.observer.as_mut(), self.graph.as_ref()) {
            observer.frequencies_changed(&graph.frequencies());
        }
    }

    pub fn status(&self) -> EngineStatus {
        self.status
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    pub fn snapshot(&self) -> &EnvironmentalSnapshot {
        &self.snapshot
    }

    /// Targets last applied (None while stopped)
    pub fn targets(&self) -> Option<&TargetParameters> {
        self.targets.as_ref()
    }

    pub fn scheduler(&self) -> &SporadicScheduler {
        &self.scheduler
    }

    /// Current per-channel frequencies (empty while stopped)
    pub fn frequencies(&self) -> Vec<f32> {
        self.graph
            .as_ref()
            .map(SignalGraph::frequencies)
            .unwrap_or_default()
    }
}

impl Drop for EnvironmentalAudioEngine {
    fn drop(&mut self) {
        if let Err(e) = self.stop() {
            warn!("engine shutdown fault: {}", e);
        }
    }
}

/// Ramp the graph towards `targets`
///
/// Pulsed channels only follow a new nominal gain while a pulse holds
/// them open; otherwise the scheduler owns their gain.
fn apply_targets(
    graph: &mut SignalGraph,
    scheduler: &SporadicScheduler,
    config: &EngineConfig,
    targets: &TargetParameters,
) -> BackendResult<()> {
    let ramps = config.ramps;
    for (channel, &frequency) in targets.frequencies.iter().enumerate() {
        graph.set_channel_target(channel, frequency, ramps.frequency_secs)?;
        if !scheduler.is_pulsed(channel) || scheduler.is_open(channel) {
            let gain = targets.gains.get(channel).copied().unwrap_or(0.0);
            graph.set_channel_gain(channel, gain, ramps.gain_secs, RampCurve::Linear)?;
        }
    }
    graph.set_filters(targets.lowpass_hz, targets.highpass_hz)?;
    graph.set_reverb_mix(targets.reverb)?;
    if config.vibrato {
        graph.set_vibrato(targets.vibrato.depth_hz, &targets.vibrato.rates_hz)?;
    }
    Ok(())
}
