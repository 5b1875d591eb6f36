//! SignalGraph - the fixed voice/filter/reverb topology on a backend
//!
//! ```text
//!  lfo_k ─> depth_k ─┐ (frequency)
//!                    v
//!  osc_k ─> gain_k ─┬─> lowpass ─> highpass ─┐          ┌─> dry ──────────────┐
//!                   └────────────────────────┴─> bus ───┤                     ├─> master ─> out
//!                                                       └─> convolver ─> wet ─┘
//! ```
//!
//! Which channels go through the filter pair depends on [`FilterRouting`].
//! Every change after construction is a ramp: frequencies and cutoffs move
//! exponentially, gains and mix levels linearly, and each new ramp cancels
//! the one in flight first.

use crate::backend::{AudioBackend, BackendState, NodeHandle, ParamRef};
use crate::config::{EngineConfig, FilterRouting, RampConfig};
use crate::envelope::RampCurve;
use crate::error::{BackendError, BackendResult};
use crate::impulse::ImpulseResponse;
use crate::mapper::{clamp_frequency, MappingStrategy, ReverbMix, TargetParameters};
use crate::nodes::{biquad_filter, gain, oscillator, FilterKind};
use biquad::Q_BUTTERWORTH_F32;
use rand::Rng;
use serde::Serialize;
use tracing::{debug, info, warn};

/// What a channel's pitch means musically
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ChannelRole {
    Fundamental,
    Harmonic(usize),
    FixedOctave(usize),
}

impl ChannelRole {
    pub fn for_channel(strategy: MappingStrategy, id: usize) -> Self {
        match (strategy, id) {
            (MappingStrategy::IndependentDrift, k) => ChannelRole::FixedOctave(k),
            (MappingStrategy::SolarHarmonic, 0) => ChannelRole::Fundamental,
            (MappingStrategy::SolarHarmonic, k) => ChannelRole::Harmonic(k),
        }
    }
}

#[derive(Debug, Clone, Copy)]
struct Vibrato {
    lfo: NodeHandle,
    depth: NodeHandle,
}

/// One sine voice and its gain stage
#[derive(Debug, Clone)]
pub struct OscillatorChannel {
    pub id: usize,
    pub role: ChannelRole,
    osc: NodeHandle,
    gain: NodeHandle,
    vibrato: Option<Vibrato>,
    current_frequency_hz: f32,
    current_gain: f32,
}

impl OscillatorChannel {
    pub fn frequency(&self) -> f32 {
        self.current_frequency_hz
    }

    pub fn gain(&self) -> f32 {
        self.current_gain
    }

    pub fn oscillator(&self) -> NodeHandle {
        self.osc
    }

    pub fn gain_node(&self) -> NodeHandle {
        self.gain
    }
}

pub struct SignalGraph {
    backend: Box<dyn AudioBackend>,
    channels: Vec<OscillatorChannel>,
    lowpass: Option<NodeHandle>,
    highpass: Option<NodeHandle>,
    dry: Option<NodeHandle>,
    wet: Option<NodeHandle>,
    ramps: RampConfig,
    torn_down: bool,
}

impl SignalGraph {
    /// Build the full topology and start every oscillator
    ///
    /// Channels start at their target frequency with zero gain; the caller
    /// fades them in. A backend fault tears the partial graph down.
    pub fn initialize<R: Rng>(
        backend: Box<dyn AudioBackend>,
        config: &EngineConfig,
        targets: &TargetParameters,
        rng: &mut R,
    ) -> BackendResult<Self> {
        let mut graph = Self {
            backend,
            channels: Vec::with_capacity(config.channel_count),
            lowpass: None,
            highpass: None,
            dry: None,
            wet: None,
            ramps: config.ramps,
            torn_down: false,
        };
        match graph.build(config, targets, rng) {
            Ok(()) => {
                info!(
                    "signal graph ready: {} channels, {:?} filters, reverb {}",
                    graph.channels.len(),
                    config.filter_routing,
                    if graph.wet.is_some() { "on" } else { "off" }
                );
                Ok(graph)
            }
            Err(e) => {
                let _ = graph.teardown();
                Err(e)
            }
        }
    }

    fn build<R: Rng>(
        &mut self,
        config: &EngineConfig,
        targets: &TargetParameters,
        rng: &mut R,
    ) -> BackendResult<()> {
        let b = self.backend.as_mut();

        let master = b.create_gain(config.master_gain)?;
        let out = b.destination();
        b.connect(master, out)?;

        let bus = b.create_gain(1.0)?;
        let dry = b.create_gain(targets.reverb.dry)?;
        b.connect(bus, dry)?;
        b.connect(dry, master)?;
        self.dry = Some(dry);

        if config.reverb.enabled {
            let impulse = ImpulseResponse::generate(
                b.sample_rate(),
                config.reverb.duration_secs,
                config.reverb.decay,
                rng,
            );
            let convolver = b.create_convolver(&impulse)?;
            let wet = b.create_gain(targets.reverb.wet)?;
            b.connect(bus, convolver)?;
            b.connect(convolver, wet)?;
            b.connect(wet, master)?;
            self.wet = Some(wet);
        }

        let filter_input = if config.filter_routing == FilterRouting::Bypass {
            None
        } else {
            let lowpass = b.create_filter(FilterKind::LowPass, targets.lowpass_hz, Q_BUTTERWORTH_F32)?;
            let highpass =
                b.create_filter(FilterKind::HighPass, targets.highpass_hz, Q_BUTTERWORTH_F32)?;
            b.connect(lowpass, highpass)?;
            b.connect(highpass, bus)?;
            self.lowpass = Some(lowpass);
            self.highpass = Some(highpass);
            Some(lowpass)
        };

        for id in 0..config.channel_count {
            let frequency = clamp_frequency(targets.frequencies.get(id).copied().unwrap_or(220.0));
            let osc = b.create_oscillator(frequency)?;
            let gain = b.create_gain(0.0)?;
            b.connect(osc, gain)?;

            let filtered = match config.filter_routing {
                FilterRouting::PrimaryOnly => id == 0,
                FilterRouting::AllChannels => true,
                FilterRouting::Bypass => false,
            };
            match filter_input {
                Some(lowpass) if filtered => b.connect(gain, lowpass)?,
                _ => b.connect(gain, bus)?,
            }

            let vibrato = if config.vibrato {
                let rate = targets.vibrato.rates_hz.get(id).copied().unwrap_or(5.0);
                let lfo = b.create_oscillator(rate)?;
                let depth = b.create_gain(targets.vibrato.depth_hz.max(0.0))?;
                b.connect(lfo, depth)?;
                b.connect_param(depth, ParamRef::new(osc, oscillator::FREQUENCY))?;
                b.start_oscillator(lfo)?;
                Some(Vibrato { lfo, depth })
            } else {
                None
            };

            b.start_oscillator(osc)?;
            self.channels.push(OscillatorChannel {
                id,
                role: ChannelRole::for_channel(config.strategy, id),
                osc,
                gain,
                vibrato,
                current_frequency_hz: frequency,
                current_gain: 0.0,
            });
        }
        Ok(())
    }

    fn channel(&self, id: usize) -> BackendResult<&OscillatorChannel> {
        self.channels.get(id).ok_or(BackendError::UnknownChannel(id))
    }

    fn check_live(&self) -> BackendResult<()> {
        if self.torn_down {
            Err(BackendError::Closed)
        } else {
            Ok(())
        }
    }

    /// Cancel what is in flight, then ramp to `target` over `secs`
    fn ramp(&mut self, param: ParamRef, target: f32, secs: f32, curve: RampCurve) -> BackendResult<()> {
        self.check_live()?;
        let end_time = self.backend.current_time() + secs.max(0.0) as f64;
        self.backend.cancel_scheduled(param)?;
        self.backend.schedule_ramp(param, target, end_time, curve)
    }

    /// Exponential ramp to `clamp(frequency_hz, 20, 20000)`
    pub fn set_channel_target(&mut self, id: usize, frequency_hz: f32, ramp_secs: f32) -> BackendResult<()> {
        let osc = self.channel(id)?.osc;
        let target = clamp_frequency(frequency_hz);
        self.ramp(
            ParamRef::new(osc, oscillator::FREQUENCY),
            target,
            ramp_secs,
            RampCurve::Exponential,
        )?;
        self.channels[id].current_frequency_hz = target;
        Ok(())
    }

    /// Ramp a channel's gain; negative or non-finite gains become 0
    pub fn set_channel_gain(
        &mut self,
        id: usize,
        gain: f32,
        ramp_secs: f32,
        curve: RampCurve,
    ) -> BackendResult<()> {
        let node = self.channel(id)?.gain;
        let target = if gain.is_finite() { gain.max(0.0) } else { 0.0 };
        self.ramp(ParamRef::new(node, gain::GAIN), target, ramp_secs, curve)?;
        self.channels[id].current_gain = target;
        Ok(())
    }

    /// Ramp both filter cutoffs (no-op when filters are bypassed)
    pub fn set_filters(&mut self, lowpass_hz: f32, highpass_hz: f32) -> BackendResult<()> {
        let secs = self.ramps.filter_secs;
        if let Some(lowpass) = self.lowpass {
            let param = ParamRef::new(lowpass, biquad_filter::FREQUENCY);
            self.ramp(param, clamp_frequency(lowpass_hz), secs, RampCurve::Exponential)?;
        }
        if let Some(highpass) = self.highpass {
            let param = ParamRef::new(highpass, biquad_filter::FREQUENCY);
            self.ramp(param, clamp_frequency(highpass_hz), secs, RampCurve::Exponential)?;
        }
        Ok(())
    }

    /// Ramp the independent dry and wet taps, each kept in [0, 1]
    pub fn set_reverb_mix(&mut self, mix: ReverbMix) -> BackendResult<()> {
        let secs = self.ramps.mix_secs;
        let level = |v: f32| if v.is_finite() { v.clamp(0.0, 1.0) } else { 0.0 };
        if let Some(dry) = self.dry {
            self.ramp(ParamRef::new(dry, gain::GAIN), level(mix.dry), secs, RampCurve::Linear)?;
        }
        if let Some(wet) = self.wet {
            self.ramp(ParamRef::new(wet, gain::GAIN), level(mix.wet), secs, RampCurve::Linear)?;
        }
        Ok(())
    }

    /// Ramp every channel's vibrato depth and rate
    pub fn set_vibrato(&mut self, depth_hz: f32, rates_hz: &[f32]) -> BackendResult<()> {
        let secs = self.ramps.frequency_secs;
        let depth_hz = if depth_hz.is_finite() { depth_hz.max(0.0) } else { 0.0 };
        for id in 0..self.channels.len() {
            let Some(vibrato) = self.channels[id].vibrato else {
                continue;
            };
            self.ramp(ParamRef::new(vibrato.depth, gain::GAIN), depth_hz, secs, RampCurve::Linear)?;
            if let Some(&rate) = rates_hz.get(id) {
                let rate = if rate.is_finite() { rate.clamp(0.1, 20.0) } else { 5.0 };
                let param = ParamRef::new(vibrato.lfo, oscillator::FREQUENCY);
                self.ramp(param, rate, secs, RampCurve::Exponential)?;
            }
        }
        Ok(())
    }

    /// Stop every oscillator and close the backend
    ///
    /// Safe to call repeatedly. "Already stopped" and "already closed" are
    /// expected during shutdown and swallowed; the first real fault is
    /// returned after everything else has been released.
    pub fn teardown(&mut self) -> BackendResult<()> {
        if self.torn_down {
            return Ok(());
        }
        self.torn_down = true;

        let mut first_error = None;
        let mut note = |result: BackendResult<()>| match result {
            Ok(()) => {}
            Err(e) if e.is_benign() => debug!("ignoring during teardown: {}", e),
            Err(e) => {
                warn!("teardown fault: {}", e);
                first_error.get_or_insert(e);
            }
        };

        for channel in &self.channels {
            note(self.backend.stop_oscillator(channel.osc));
            if let Some(vibrato) = channel.vibrato {
                note(self.backend.stop_oscillator(vibrato.lfo));
            }
        }
        note(self.backend.close());

        info!("signal graph torn down");
        match first_error {
            Some(e) => Err(e),
            None => Ok(()),
        }
    }

    pub fn is_torn_down(&self) -> bool {
        self.torn_down
    }

    pub fn channels(&self) -> &[OscillatorChannel] {
        &self.channels
    }

    /// Last applied frequency of every channel
    pub fn frequencies(&self) -> Vec<f32> {
        self.channels.iter().map(|c| c.current_frequency_hz).collect()
    }

    pub fn current_time(&self) -> f64 {
        self.backend.current_time()
    }

    pub fn backend_state(&self) -> BackendState {
        self.backend.state()
    }

    /// Direct access for callers that schedule on the same clock
    pub fn backend_mut(&mut self) -> &mut dyn AudioBackend {
        self.backend.as_mut()
    }
}

impl Drop for SignalGraph {
    fn drop(&mut self) {
        let _ = self.teardown();
    }
}
