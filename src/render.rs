//! Offline rendering of telemetry scripts
//!
//! Provides functionality to replay recorded or hand-written telemetry
//! through the engine and write the result to a WAV file. The engine runs
//! unchanged against an offline backend; its clock advances only as the
//! renderer pulls blocks.

use crate::audio_node::BLOCK_SIZE;
use crate::backend::OfflineBackendFactory;
use crate::config::EngineConfig;
use crate::engine::EnvironmentalAudioEngine;
use crate::error::RenderError;
use crate::snapshot::{EnvironmentalSnapshot, TelemetryUpdate};
use serde::{Deserialize, Serialize};
use std::path::Path;
use tracing::{debug, info};

/// A telemetry update applied at a point in render time
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TelemetryEvent {
    /// Seconds from the start of the render
    pub at: f64,
    pub update: TelemetryUpdate,
}

/// Timed telemetry to replay
///
/// ```json
/// {
///   "initial": {"latitude": 51.5, "temperatureCelsius": 12.0},
///   "events": [{"at": 5.0, "update": {"speed": 8.0}}]
/// }
/// ```
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct TelemetryScript {
    /// Snapshot in place when the engine starts
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub initial: Option<EnvironmentalSnapshot>,
    #[serde(default)]
    pub events: Vec<TelemetryEvent>,
}

impl TelemetryScript {
    pub fn from_json_str(json: &str) -> Result<Self, RenderError> {
        let mut script: TelemetryScript = serde_json::from_str(json)?;
        script.events.retain(|e| e.at.is_finite());
        script.events.sort_by(|a, b| a.at.total_cmp(&b.at));
        Ok(script)
    }

    pub fn load(path: &Path) -> Result<Self, RenderError> {
        let json = std::fs::read_to_string(path).map_err(|source| RenderError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_json_str(&json)
    }
}

/// Statistics about rendered audio
#[derive(Debug, Clone, PartialEq)]
pub struct RenderStats {
    /// Stereo frames rendered
    pub frames: usize,
    pub duration_secs: f32,
    pub rms: f32,
    pub peak: f32,
    pub dc_offset: f32,
}

impl RenderStats {
    fn from_samples(samples: &[f32], sample_rate: u32) -> Self {
        let count = samples.len().max(1) as f32;
        let sum_squares: f32 = samples.iter().map(|x| x * x).sum();
        let frames = samples.len() / 2;
        Self {
            frames,
            duration_secs: frames as f32 / sample_rate as f32,
            rms: (sum_squares / count).sqrt(),
            peak: samples.iter().map(|x| x.abs()).fold(0.0f32, f32::max),
            dc_offset: samples.iter().sum::<f32>() / count,
        }
    }

    pub fn print_summary(&self) {
        println!("Render Statistics:");
        println!("  Duration:      {:.3} seconds", self.duration_secs);
        println!("  Frames:        {}", self.frames);
        println!("  RMS:           {:.3}", self.rms);
        println!("  Peak:          {:.3}", self.peak);
        println!("  DC Offset:     {:.6}", self.dc_offset);
    }
}

/// Renders scripts with one engine configuration
pub struct Renderer {
    config: EngineConfig,
    /// Linear fade at the end of the file (seconds)
    fade_out: f32,
}

impl Renderer {
    pub fn new(config: EngineConfig) -> Self {
        Self {
            config,
            fade_out: 0.5,
        }
    }

    pub fn with_fade_out(mut self, seconds: f32) -> Self {
        self.fade_out = seconds.max(0.0);
        self
    }

    /// Render `duration_secs` of interleaved stereo
    pub fn render_to_buffer(
        &self,
        script: &TelemetryScript,
        duration_secs: f32,
    ) -> Result<Vec<f32>, RenderError> {
        let sample_rate = self.config.sample_rate;
        let factory = OfflineBackendFactory::new(sample_rate as f32);
        let handle = factory.render_handle();

        let mut engine = EnvironmentalAudioEngine::new(self.config.clone(), factory)?;
        if let Some(initial) = script.initial {
            engine.set_environmental_data(initial)?;
        }
        engine.start()?;

        let total_frames = (duration_secs.max(0.0) * sample_rate as f32) as usize;
        let mut samples = vec![0.0f32; total_frames * 2];
        let mut rendered = 0usize;
        let mut events = script.events.iter().peekable();

        for chunk in samples.chunks_mut(BLOCK_SIZE * 2) {
            let now = rendered as f64 / sample_rate as f64;
            while let Some(event) = events.next_if(|e| e.at <= now) {
                debug!("t={:.2}s telemetry {:?}", now, event.update);
                engine.update_telemetry(&event.update)?;
            }
            engine.tick()?;

            handle.render(chunk);
            rendered += chunk.len() / 2;
        }
        engine.stop()?;

        self.apply_fade_out(&mut samples);
        Ok(samples)
    }

    /// Render to a 16-bit stereo WAV file
    pub fn render_to_file(
        &self,
        script: &TelemetryScript,
        duration_secs: f32,
        output_path: &Path,
    ) -> Result<RenderStats, RenderError> {
        let samples = self.render_to_buffer(script, duration_secs)?;
        let stats = RenderStats::from_samples(&samples, self.config.sample_rate);
        self.write_wav(output_path, &samples)?;
        info!(
            "rendered {:.1}s to {} (peak {:.3})",
            stats.duration_secs,
            output_path.display(),
            stats.peak
        );
        Ok(stats)
    }

    fn apply_fade_out(&self, samples: &mut [f32]) {
        let fade_frames = (self.fade_out * self.config.sample_rate as f32) as usize;
        let frames = samples.len() / 2;
        let fade_frames = fade_frames.min(frames);
        if fade_frames == 0 {
            return;
        }
        let start = frames - fade_frames;
        for (i, frame) in samples[start * 2..].chunks_mut(2).enumerate() {
            let gain = 1.0 - (i as f32 + 1.0) / fade_frames as f32;
            for sample in frame {
                *sample *= gain;
            }
        }
    }

    fn write_wav(&self, path: &Path, samples: &[f32]) -> Result<(), RenderError> {
        let spec = hound::WavSpec {
            channels: 2,
            sample_rate: self.config.sample_rate,
            bits_per_sample: 16,
            sample_format: hound::SampleFormat::Int,
        };

        let mut writer = hound::WavWriter::create(path, spec)?;
        for &sample in samples {
            // Clamp to prevent overflow
            let scaled = (sample.clamp(-1.0, 1.0) * 32767.0) as i16;
            writer.write_sample(scaled)?;
        }
        writer.finalize()?;
        Ok(())
    }
}
