//! Envelope primitives shared by the control plane and the render graph
//!
//! An [`EnvelopeRamp`] is a single monotonic transition of one scalar
//! parameter. Gains move linearly, frequencies exponentially, so a new
//! target never jumps the value and never clicks.

use serde::{Deserialize, Serialize};

/// Shape of a parameter transition
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RampCurve {
    /// Constant rate of change (gain, mix levels)
    Linear,
    /// Constant ratio of change (frequency, cutoff)
    Exponential,
}

/// Envelope state of one pulsed channel
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum EnvelopeState {
    #[default]
    Idle,
    FadingIn,
    Sustaining,
    FadingOut,
}

impl EnvelopeState {
    /// True while the channel is audible (anything but Idle)
    pub fn is_sounding(&self) -> bool {
        !matches!(self, EnvelopeState::Idle)
    }
}

/// A scheduled transition from `start_value` to `target`
///
/// Times are in seconds on whatever clock the owner uses (the backend's
/// audio clock in practice).
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct EnvelopeRamp {
    start_value: f32,
    target: f32,
    start_time: f64,
    end_time: f64,
    curve: RampCurve,
}

impl EnvelopeRamp {
    /// Ramp from `from` at `start_time` to `to` over `duration` seconds
    ///
    /// Exponential ramps need both endpoints strictly positive; anything
    /// else falls back to a linear ramp so the value stays finite.
    pub fn new(from: f32, to: f32, start_time: f64, duration: f64, curve: RampCurve) -> Self {
        let curve = match curve {
            RampCurve::Exponential if from > 0.0 && to > 0.0 => RampCurve::Exponential,
            _ => RampCurve::Linear,
        };
        Self {
            start_value: from,
            target: to,
            start_time,
            end_time: start_time + duration.max(0.0),
            curve,
        }
    }

    pub fn target(&self) -> f32 {
        self.target
    }

    pub fn end_time(&self) -> f64 {
        self.end_time
    }

    pub fn curve(&self) -> RampCurve {
        self.curve
    }

    /// Value of the ramp at time `t`
    ///
    /// Holds `start_value` before the ramp begins and `target` after it ends.
    pub fn value_at(&self, t: f64) -> f32 {
        if t <= self.start_time {
            return self.start_value;
        }
        if t >= self.end_time {
            return self.target;
        }
        let progress = ((t - self.start_time) / (self.end_time - self.start_time)) as f32;
        match self.curve {
            RampCurve::Linear => self.start_value + (self.target - self.start_value) * progress,
            RampCurve::Exponential => {
                self.start_value * (self.target / self.start_value).powf(progress)
            }
        }
    }

    pub fn is_complete(&self, t: f64) -> bool {
        t >= self.end_time
    }
}
