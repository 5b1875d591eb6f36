//! Engine configuration
//!
//! Loaded from TOML; every field has a default so a config file only needs
//! the values it changes:
//!
//! ```toml
//! channel_count = 8
//! strategy = "solar_harmonic"
//! filter_routing = "primary_only"
//!
//! [pulse]
//! channels = { only = [3, 6] }
//! idle = { min = 8.0, max = 20.0 }
//! ```

use crate::error::ConfigError;
use crate::mapper::{MappingStrategy, MAX_CHANNELS};
use crate::scheduler::{PulseChannels, PulseProfile};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// Which channels pass through the lowpass/highpass pair
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FilterRouting {
    /// Channel 0 is filtered, the rest go straight to the mixer
    #[default]
    PrimaryOnly,
    AllChannels,
    /// No filters in the graph
    Bypass,
}

/// Ramp durations in seconds
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RampConfig {
    pub frequency_secs: f32,
    pub gain_secs: f32,
    pub filter_secs: f32,
    pub mix_secs: f32,
}

impl Default for RampConfig {
    fn default() -> Self {
        Self {
            frequency_secs: 2.0,
            gain_secs: 1.0,
            filter_secs: 2.0,
            mix_secs: 2.0,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ReverbConfig {
    /// Impulse response length
    pub duration_secs: f32,
    /// Decay exponent of the impulse envelope
    pub decay: f32,
    pub enabled: bool,
}

impl Default for ReverbConfig {
    fn default() -> Self {
        Self {
            duration_secs: 3.25,
            decay: 2.25,
            enabled: true,
        }
    }
}

/// Upper bound on any ramp; keeps control operations bounded
pub const MAX_RAMP_SECS: f32 = 10.0;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    pub channel_count: usize,
    pub strategy: MappingStrategy,
    /// Fixed RNG seed for reproducible renders
    #[serde(skip_serializing_if = "Option::is_none")]
    pub seed: Option<u64>,
    /// Sample rate of offline renders
    pub sample_rate: u32,
    pub master_gain: f32,
    pub filter_routing: FilterRouting,
    /// Per-channel vibrato LFOs
    pub vibrato: bool,
    pub ramps: RampConfig,
    pub reverb: ReverbConfig,
    pub pulse: PulseProfile,
    /// Temperature drift of the solar fundamental (Hz per °C from 20 °C)
    pub drift_hz_per_degree: f32,
    /// Pause before the second resume attempt of a suspended backend
    pub resume_retry_delay_ms: u64,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            channel_count: MAX_CHANNELS,
            strategy: MappingStrategy::default(),
            seed: None,
            sample_rate: 44100,
            master_gain: 0.7,
            filter_routing: FilterRouting::default(),
            vibrato: true,
            ramps: RampConfig::default(),
            reverb: ReverbConfig::default(),
            pulse: PulseProfile::default(),
            drift_hz_per_degree: 1.5,
            resume_retry_delay_ms: 250,
        }
    }
}

impl EngineConfig {
    /// Load and validate a TOML config file
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_toml_str(&content)
    }

    pub fn from_toml_str(content: &str) -> Result<Self, ConfigError> {
        let config: EngineConfig = toml::from_str(content)?;
        config.validate()?;
        Ok(config)
    }

    pub fn to_toml_string(&self) -> Result<String, ConfigError> {
        Ok(toml::to_string_pretty(self)?)
    }

    /// Write as TOML, creating parent directories
    pub fn write_to_file(&self, path: &Path) -> Result<(), ConfigError> {
        let io_err = |source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        };
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent).map_err(io_err)?;
        }
        std::fs::write(path, self.to_toml_string()?).map_err(io_err)
    }

    /// `<config dir>/geodrone/config.toml`
    pub fn default_path() -> Option<PathBuf> {
        dirs::config_dir().map(|dir| dir.join("geodrone").join("config.toml"))
    }

    /// Load the default config file if present, else built-in defaults
    pub fn load_or_default() -> Result<Self, ConfigError> {
        match Self::default_path() {
            Some(path) if path.exists() => Self::load(&path),
            _ => Ok(Self::default()),
        }
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        let invalid = |msg: String| Err(ConfigError::Invalid(msg));

        if !(1..=MAX_CHANNELS).contains(&self.channel_count) {
            return invalid(format!(
                "channel_count must be between 1 and {}, got {}",
                MAX_CHANNELS, self.channel_count
            ));
        }
        if !(8000..=192_000).contains(&self.sample_rate) {
            return invalid(format!("sample_rate {} out of range", self.sample_rate));
        }
        if !self.master_gain.is_finite() || !(0.0..=2.0).contains(&self.master_gain) {
            return invalid(format!("master_gain {} out of range", self.master_gain));
        }

        let ramps = [
            ("frequency_secs", self.ramps.frequency_secs),
            ("gain_secs", self.ramps.gain_secs),
            ("filter_secs", self.ramps.filter_secs),
            ("mix_secs", self.ramps.mix_secs),
        ];
        for (name, secs) in ramps {
            if !secs.is_finite() || !(0.0..=MAX_RAMP_SECS).contains(&secs) {
                return invalid(format!("ramps.{} must be within 0..={}", name, MAX_RAMP_SECS));
            }
        }

        let reverb = &self.reverb;
        if !reverb.duration_secs.is_finite() || !(0.1..=10.0).contains(&reverb.duration_secs) {
            return invalid(format!("reverb.duration_secs {} out of range", reverb.duration_secs));
        }
        if !reverb.decay.is_finite() || reverb.decay <= 0.0 {
            return invalid(format!("reverb.decay must be positive, got {}", reverb.decay));
        }

        if !self.pulse.is_valid() {
            return invalid("pulse ranges need 0 <= min <= max".into());
        }
        if let PulseChannels::Only(channels) = &self.pulse.channels {
            if let Some(bad) = channels.iter().find(|&&c| c >= self.channel_count) {
                return invalid(format!(
                    "pulse channel {} does not exist with {} channels",
                    bad, self.channel_count
                ));
            }
        }

        if !self.drift_hz_per_degree.is_finite() || self.drift_hz_per_degree < 0.0 {
            return invalid("drift_hz_per_degree must be >= 0".into());
        }
        if self.resume_retry_delay_ms > 5000 {
            return invalid("resume_retry_delay_ms must be at most 5000".into());
        }
        Ok(())
    }
}
