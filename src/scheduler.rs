//! SporadicScheduler - randomized per-channel pulsing
//!
//! Each pulsed channel cycles `Idle -> FadingIn -> Sustaining -> FadingOut
//! -> Idle` forever, every phase length drawn fresh from the profile's
//! ranges. The scheduler is a pure state machine over an external clock:
//! the engine calls [`SporadicScheduler::advance`] with the backend time
//! and turns the returned [`FadeRequest`]s into gain ramps. It never
//! touches the signal graph itself.
//!
//! Each channel holds at most one [`ScheduledPulse`]. Cancelling drops all
//! of them at once and bumps the generation, so a timer callback that was
//! already queued with an older generation can be recognized and ignored.

use crate::envelope::EnvelopeState;
use rand::Rng;
use serde::{Deserialize, Serialize};

/// Uniform range of durations in seconds
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct SecondsRange {
    pub min: f32,
    pub max: f32,
}

impl SecondsRange {
    pub const fn new(min: f32, max: f32) -> Self {
        Self { min, max }
    }

    pub fn is_valid(&self) -> bool {
        self.min.is_finite() && self.max.is_finite() && self.min >= 0.0 && self.min <= self.max
    }

    pub fn sample<R: Rng>(&self, rng: &mut R) -> f32 {
        if self.max > self.min {
            rng.gen_range(self.min..self.max)
        } else {
            self.min
        }
    }
}

/// Which channels pulse
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PulseChannels {
    /// No pulsing: every channel drones at its nominal gain
    None,
    All,
    Only(Vec<usize>),
}

impl PulseChannels {
    pub fn includes(&self, channel: usize) -> bool {
        match self {
            PulseChannels::None => false,
            PulseChannels::All => true,
            PulseChannels::Only(list) => list.contains(&channel),
        }
    }
}

/// Timing windows of a pulse cycle
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PulseProfile {
    pub channels: PulseChannels,
    pub idle: SecondsRange,
    pub fade_in: SecondsRange,
    pub sustain: SecondsRange,
    pub fade_out: SecondsRange,
}

impl Default for PulseProfile {
    fn default() -> Self {
        Self::uniform()
    }
}

impl PulseProfile {
    /// One or two designated voices on long, slow cycles
    pub fn restrictive() -> Self {
        Self {
            channels: PulseChannels::Only(vec![3, 6]),
            idle: SecondsRange::new(8.0, 20.0),
            fade_in: SecondsRange::new(0.5, 1.0),
            sustain: SecondsRange::new(1.0, 6.0),
            fade_out: SecondsRange::new(0.5, 1.3),
        }
    }

    /// Every voice independently, shorter cycles
    pub fn uniform() -> Self {
        Self {
            channels: PulseChannels::All,
            idle: SecondsRange::new(3.0, 16.0),
            fade_in: SecondsRange::new(0.2, 0.8),
            sustain: SecondsRange::new(1.0, 6.0),
            fade_out: SecondsRange::new(0.3, 1.3),
        }
    }

    /// Baseline drone without modulation
    pub fn drone() -> Self {
        Self {
            channels: PulseChannels::None,
            ..Self::uniform()
        }
    }

    pub fn is_valid(&self) -> bool {
        [self.idle, self.fade_in, self.sustain, self.fade_out]
            .iter()
            .all(SecondsRange::is_valid)
    }

    /// Long-run fraction of time a pulsed channel is audible
    ///
    /// A cycle is audible from the start of its fade-in to the end of its
    /// fade-out, then silent for the idle window.
    pub fn duty_cycle_bounds(&self) -> (f32, f32) {
        let on_min = self.fade_in.min + self.sustain.min + self.fade_out.min;
        let on_max = self.fade_in.max + self.sustain.max + self.fade_out.max;
        let ratio = |on: f32, off: f32| if on + off > 0.0 { on / (on + off) } else { 0.0 };
        (ratio(on_min, self.idle.max), ratio(on_max, self.idle.min))
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PulsePhase {
    /// Fires the fade-in
    PendingOn,
    /// Fires the fade-out
    PendingOff,
}

/// The one armed timer of a channel
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ScheduledPulse {
    pub channel: usize,
    pub phase: PulsePhase,
    pub fire_at: f64,
    /// Fade duration chosen when the pulse was armed
    pub fade_secs: f32,
    pub generation: u64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FadeDirection {
    In,
    Out,
}

/// Gain ramp the engine should apply for a fired pulse
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct FadeRequest {
    pub channel: usize,
    pub direction: FadeDirection,
    pub target_gain: f32,
    pub duration_secs: f32,
    pub generation: u64,
}

#[derive(Debug, Clone)]
struct ChannelPulse {
    state: EnvelopeState,
    nominal_gain: f32,
    pending: Option<ScheduledPulse>,
    /// When the running fade finishes
    fade_ends_at: f64,
}

#[derive(Debug, Clone)]
pub struct SporadicScheduler {
    profile: PulseProfile,
    channels: Vec<ChannelPulse>,
    generation: u64,
    armed: bool,
}

impl SporadicScheduler {
    pub fn new(profile: PulseProfile, channel_count: usize) -> Self {
        let channels = (0..channel_count)
            .map(|_| ChannelPulse {
                state: EnvelopeState::Idle,
                nominal_gain: 0.0,
                pending: None,
                fade_ends_at: 0.0,
            })
            .collect();
        Self {
            profile,
            channels,
            generation: 0,
            armed: false,
        }
    }

    pub fn profile(&self) -> &PulseProfile {
        &self.profile
    }

    pub fn channel_count(&self) -> usize {
        self.channels.len()
    }

    pub fn generation(&self) -> u64 {
        self.generation
    }

    pub fn is_armed(&self) -> bool {
        self.armed
    }

    /// True if `channel` is driven by pulses rather than droning
    pub fn is_pulsed(&self, channel: usize) -> bool {
        channel < self.channels.len() && self.profile.channels.includes(channel)
    }

    pub fn state(&self, channel: usize) -> Option<EnvelopeState> {
        self.channels.get(channel).map(|c| c.state)
    }

    pub fn pending(&self, channel: usize) -> Option<&ScheduledPulse> {
        self.channels.get(channel).and_then(|c| c.pending.as_ref())
    }

    /// Volume a fade-in ramps to
    pub fn set_nominal_gain(&mut self, channel: usize, gain: f32) {
        if let Some(c) = self.channels.get_mut(channel) {
            c.nominal_gain = gain.max(0.0);
        }
    }

    pub fn nominal_gain(&self, channel: usize) -> Option<f32> {
        self.channels.get(channel).map(|c| c.nominal_gain)
    }

    /// True while a pulse holds the channel open (fading in or sustaining)
    pub fn is_open(&self, channel: usize) -> bool {
        matches!(
            self.state(channel),
            Some(EnvelopeState::FadingIn | EnvelopeState::Sustaining)
        )
    }

    /// Start every pulsed channel's cycle from Idle
    pub fn arm_all<R: Rng>(&mut self, now: f64, rng: &mut R) {
        self.armed = true;
        let generation = self.generation;
        for channel in 0..self.channels.len() {
            if !self.profile.channels.includes(channel) {
                continue;
            }
            let pulse = ScheduledPulse {
                channel,
                phase: PulsePhase::PendingOn,
                fire_at: now + self.profile.idle.sample(rng) as f64,
                fade_secs: self.profile.fade_in.sample(rng),
                generation,
            };
            let c = &mut self.channels[channel];
            c.state = EnvelopeState::Idle;
            c.pending = Some(pulse);
        }
    }

    /// Fire every due pulse and settle finished fades
    ///
    /// Each fired pulse re-arms its channel relative to `now`, so a late
    /// call never produces a burst of catch-up fades.
    pub fn advance<R: Rng>(&mut self, now: f64, rng: &mut R) -> Vec<FadeRequest> {
        let mut requests = Vec::new();
        if !self.armed {
            return requests;
        }
        let generation = self.generation;

        for (channel, c) in self.channels.iter_mut().enumerate() {
            settle(c, now);

            let Some(pulse) = c.pending else {
                continue;
            };
            if pulse.fire_at > now {
                continue;
            }

            let fade = pulse.fade_secs;
            c.fade_ends_at = now + fade as f64;
            match pulse.phase {
                PulsePhase::PendingOn => {
                    c.state = EnvelopeState::FadingIn;
                    requests.push(FadeRequest {
                        channel,
                        direction: FadeDirection::In,
                        target_gain: c.nominal_gain,
                        duration_secs: fade,
                        generation,
                    });
                    c.pending = Some(ScheduledPulse {
                        channel,
                        phase: PulsePhase::PendingOff,
                        fire_at: c.fade_ends_at + self.profile.sustain.sample(rng) as f64,
                        fade_secs: self.profile.fade_out.sample(rng),
                        generation,
                    });
                }
                PulsePhase::PendingOff => {
                    c.state = EnvelopeState::FadingOut;
                    requests.push(FadeRequest {
                        channel,
                        direction: FadeDirection::Out,
                        target_gain: 0.0,
                        duration_secs: fade,
                        generation,
                    });
                    c.pending = Some(ScheduledPulse {
                        channel,
                        phase: PulsePhase::PendingOn,
                        fire_at: c.fade_ends_at + self.profile.idle.sample(rng) as f64,
                        fade_secs: self.profile.fade_in.sample(rng),
                        generation,
                    });
                }
            }
            settle(c, now);
        }
        requests
    }

    /// Earliest armed pulse
    pub fn next_deadline(&self) -> Option<f64> {
        self.channels
            .iter()
            .filter_map(|c| c.pending.map(|p| p.fire_at))
            .min_by(|a, b| a.total_cmp(b))
    }

    /// Drop every armed pulse at once and invalidate the generation
    pub fn cancel_all(&mut self) {
        for c in &mut self.channels {
            c.pending = None;
            c.state = EnvelopeState::Idle;
        }
        self.armed = false;
        self.generation += 1;
    }
}

/// Finished fades move on without a timer of their own
fn settle(c: &mut ChannelPulse, now: f64) {
    if now < c.fade_ends_at {
        return;
    }
    c.state = match c.state {
        EnvelopeState::FadingIn => EnvelopeState::Sustaining,
        EnvelopeState::FadingOut => EnvelopeState::Idle,
        other => other,
    };
}
