//! ParameterMapper - environmental snapshot to acoustic targets
//!
//! Two strategies share one output record:
//!
//! - [`MappingStrategy::IndependentDrift`]: eight octave-spaced voices
//!   (55·2^k Hz), each nudged by its own environmental factor through a
//!   `low + factor * span` multiplier that widens with the channel index.
//! - [`MappingStrategy::SolarHarmonic`]: a fundamental driven by solar
//!   elevation (noon is lowest, the horizon highest), a temperature drift,
//!   and harmonic or subharmonic partials colored by a compass-heading
//!   interval.
//!
//! Filter cutoffs, reverb balance and vibrato follow the same maps in both
//! strategies. Every output frequency is clamped to [20, 20000] Hz.

use crate::snapshot::{EnvironmentalSnapshot, NormalizedFactors};
use rand::Rng;
use serde::{Deserialize, Serialize};

pub const MIN_FREQUENCY_HZ: f32 = 20.0;
pub const MAX_FREQUENCY_HZ: f32 = 20_000.0;

/// Most channels either strategy defines
pub const MAX_CHANNELS: usize = 8;

/// Fundamental at or above peak elevation
pub const FUNDAMENTAL_MIN_HZ: f32 = 200.0;
/// Fundamental at or below the lower elevation bound
pub const FUNDAMENTAL_MAX_HZ: f32 = 4800.0;
/// Perceptually relevant elevation band (degrees)
pub const ELEVATION_FLOOR_DEG: f32 = -20.0;
pub const ELEVATION_CEILING_DEG: f32 = 70.0;
/// Above this the partials divide instead of multiply
pub const SUBHARMONIC_THRESHOLD_HZ: f32 = 2000.0;

const DRIFT_BASE_HZ: f32 = 55.0;

/// `(low, span)` multiplier bounds per channel, widening with pitch
const DRIFT_TABLE: [(f32, f32); MAX_CHANNELS] = [
    (0.90, 0.20),
    (0.88, 0.24),
    (0.86, 0.28),
    (0.84, 0.32),
    (0.82, 0.36),
    (0.80, 0.40),
    (0.78, 0.45),
    (0.75, 0.55),
];

const HARMONIC_TABLE: [f32; MAX_CHANNELS - 1] = [1.0, 1.5, 2.0, 3.0, 4.0, 5.0, 6.0];
const SUBHARMONIC_TABLE: [f32; MAX_CHANNELS - 1] = [
    1.0 / 2.0,
    1.0 / 3.0,
    1.0 / 4.0,
    1.0 / 5.0,
    1.0 / 6.0,
    1.0 / 8.0,
    1.0 / 10.0,
];

/// Interval at 0°, 90°, 180°, 270° and back at 360°
const COMPASS_ANCHORS: [f32; 5] = [1.5, 1.25, 1.414, 1.778, 1.5];

const VIBRATO_RATE_MIN_HZ: f32 = 5.0;
const VIBRATO_RATE_MAX_HZ: f32 = 8.0;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MappingStrategy {
    /// Octave series, one environmental factor per voice
    IndependentDrift,
    /// Solar-elevation fundamental with compass-colored partials
    #[default]
    SolarHarmonic,
}

/// Independent dry and wet tap levels, each in [0, 1]
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ReverbMix {
    pub dry: f32,
    pub wet: f32,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VibratoTargets {
    /// LFO amplitude in Hz
    pub depth_hz: f32,
    /// LFO rate per channel
    pub rates_hz: Vec<f32>,
}

/// Everything the signal graph should ramp towards
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TargetParameters {
    pub frequencies: Vec<f32>,
    /// Nominal channel volumes (what a pulse fades in to)
    pub gains: Vec<f32>,
    pub lowpass_hz: f32,
    pub highpass_hz: f32,
    pub reverb: ReverbMix,
    pub vibrato: VibratoTargets,
    /// Solar strategy only
    #[serde(skip_serializing_if = "Option::is_none")]
    pub fundamental_hz: Option<f32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub solar_elevation_deg: Option<f32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub compass_interval: Option<f32>,
}

#[derive(Debug, Clone)]
pub struct ParameterMapper {
    strategy: MappingStrategy,
    channel_count: usize,
    drift_hz_per_degree: f32,
}

impl ParameterMapper {
    /// `channel_count` is clamped to 1..=8
    pub fn new(strategy: MappingStrategy, channel_count: usize) -> Self {
        Self {
            strategy,
            channel_count: channel_count.clamp(1, MAX_CHANNELS),
            drift_hz_per_degree: 1.5,
        }
    }

    /// Temperature drift magnitude per °C away from 20 °C
    pub fn with_drift(mut self, hz_per_degree: f32) -> Self {
        self.drift_hz_per_degree = if hz_per_degree.is_finite() {
            hz_per_degree.max(0.0)
        } else {
            0.0
        };
        self
    }

    pub fn strategy(&self) -> MappingStrategy {
        self.strategy
    }

    pub fn channel_count(&self) -> usize {
        self.channel_count
    }

    /// Compute targets for a snapshot
    ///
    /// `rng` feeds the solar strategy's temperature drift; pass a seeded
    /// generator to make the result reproducible.
    pub fn map<R: Rng>(&self, snapshot: &EnvironmentalSnapshot, rng: &mut R) -> TargetParameters {
        let snapshot = snapshot.sanitized();
        let factors = snapshot.normalized();
        let n = self.channel_count;

        let (frequencies, gains, solar) = match self.strategy {
            MappingStrategy::IndependentDrift => {
                let frequencies = (0..n).map(|k| drift_frequency(k, &factors)).collect();
                (frequencies, vec![0.8 / n as f32; n], None)
            }
            MappingStrategy::SolarHarmonic => {
                let elevation = solar_elevation(snapshot.latitude, snapshot.time_of_day);
                let interval = compass_interval(snapshot.heading_degrees);
                let drift = rng.gen_range(-1.0f32..=1.0)
                    * (snapshot.temperature_c - 20.0).abs()
                    * self.drift_hz_per_degree;
                let fundamental = clamp_frequency(fundamental_for_elevation(elevation) + drift);
                let frequencies = harmonic_series(fundamental, interval, n);
                let gains = (0..n).map(|k| 0.3 / (k as f32 + 1.0)).collect();
                (frequencies, gains, Some((fundamental, elevation, interval)))
            }
        };

        TargetParameters {
            frequencies,
            gains,
            lowpass_hz: 500.0 + factors.latitude * 4500.0,
            highpass_hz: 50.0 + factors.longitude * 450.0,
            reverb: reverb_mix(&factors),
            vibrato: vibrato(&factors, n),
            fundamental_hz: solar.map(|s| s.0),
            solar_elevation_deg: solar.map(|s| s.1),
            compass_interval: solar.map(|s| s.2),
        }
    }
}

pub fn clamp_frequency(hz: f32) -> f32 {
    if hz.is_finite() {
        hz.clamp(MIN_FREQUENCY_HZ, MAX_FREQUENCY_HZ)
    } else {
        MIN_FREQUENCY_HZ
    }
}

/// Channel `k`'s factor: a single reading, a pair mean or the mean of all
fn drift_factor(k: usize, f: &NormalizedFactors) -> f32 {
    match k {
        0 => f.latitude,
        1 => f.longitude,
        2 => f.speed,
        3 => f.temperature,
        4 => f.time_of_day,
        5 => (f.latitude + f.longitude) / 2.0,
        6 => (f.speed + f.temperature) / 2.0,
        _ => (f.latitude + f.longitude + f.speed + f.temperature + f.time_of_day) / 5.0,
    }
}

fn drift_frequency(k: usize, factors: &NormalizedFactors) -> f32 {
    let k = k.min(MAX_CHANNELS - 1);
    let (low, span) = DRIFT_TABLE[k];
    let base = DRIFT_BASE_HZ * 2f32.powi(k as i32);
    clamp_frequency(base * (low + drift_factor(k, factors) * span))
}

/// Bounds of channel `k`'s drift multiplier (independent-drift strategy)
pub fn drift_bounds(k: usize) -> (f32, f32) {
    let (low, span) = DRIFT_TABLE[k.min(MAX_CHANNELS - 1)];
    (low, low + span)
}

/// Solar elevation in degrees, equinox model (declination 0)
pub fn solar_elevation(latitude_deg: f32, time_of_day: f32) -> f32 {
    let hour_angle = (time_of_day - 0.5) * std::f32::consts::TAU;
    let lat = latitude_deg.to_radians();
    let declination = 0.0f32;
    let sin_elevation =
        lat.sin() * declination.sin() + lat.cos() * declination.cos() * hour_angle.cos();
    sin_elevation.clamp(-1.0, 1.0).asin().to_degrees().clamp(-90.0, 90.0)
}

/// Elevation band [-20°, 70°] inverted onto [4800 Hz, 200 Hz]
pub fn fundamental_for_elevation(elevation_deg: f32) -> f32 {
    let e = elevation_deg.clamp(ELEVATION_FLOOR_DEG, ELEVATION_CEILING_DEG);
    let t = (e - ELEVATION_FLOOR_DEG) / (ELEVATION_CEILING_DEG - ELEVATION_FLOOR_DEG);
    FUNDAMENTAL_MAX_HZ - t * (FUNDAMENTAL_MAX_HZ - FUNDAMENTAL_MIN_HZ)
}

/// Musical interval for a compass heading, piecewise linear per quadrant
pub fn compass_interval(heading_deg: f32) -> f32 {
    let heading = if heading_deg.is_finite() {
        heading_deg.rem_euclid(360.0)
    } else {
        0.0
    };
    let quadrant = ((heading / 90.0) as usize).min(3);
    let frac = (heading - quadrant as f32 * 90.0) / 90.0;
    let (a, b) = (COMPASS_ANCHORS[quadrant], COMPASS_ANCHORS[quadrant + 1]);
    a + (b - a) * frac
}

/// Fundamental plus `n - 1` partials; odd partials carry the interval
fn harmonic_series(fundamental: f32, interval: f32, n: usize) -> Vec<f32> {
    let table = if fundamental > SUBHARMONIC_THRESHOLD_HZ {
        &SUBHARMONIC_TABLE
    } else {
        &HARMONIC_TABLE
    };
    let mut frequencies = Vec::with_capacity(n);
    frequencies.push(fundamental);
    for k in 1..n {
        let mut partial = fundamental * table[k - 1];
        if k % 2 == 1 {
            partial *= interval;
        }
        frequencies.push(clamp_frequency(partial));
    }
    frequencies
}

fn reverb_mix(f: &NormalizedFactors) -> ReverbMix {
    ReverbMix {
        dry: (0.9 - f.humidity * 0.5).clamp(0.0, 1.0),
        wet: (0.1 + f.humidity * 0.6).clamp(0.0, 1.0),
    }
}

/// More vibrato at rest, less in motion
fn vibrato(f: &NormalizedFactors, n: usize) -> VibratoTargets {
    let rates_hz = (0..n)
        .map(|k| {
            if n > 1 {
                VIBRATO_RATE_MIN_HZ
                    + (VIBRATO_RATE_MAX_HZ - VIBRATO_RATE_MIN_HZ) * k as f32 / (n - 1) as f32
            } else {
                VIBRATO_RATE_MIN_HZ
            }
        })
        .collect();
    VibratoTargets {
        depth_hz: 5.5 - 5.0 * f.speed,
        rates_hz,
    }
}
