//! # Geodrone - Environmental Ambient Drone Engine
//!
//! Geodrone turns a stream of real-world telemetry (position, speed,
//! heading, temperature, humidity, time of day) into an evolving drone:
//! a bank of sine voices whose pitches follow the environment, filtered
//! and sent through a convolution room, with voices fading in and out on
//! independent randomized timers.
//!
//! ## Core Features
//!
//! - **Two mapping strategies**: octave-spaced voices drifting with their
//!   own environmental factor, or a solar-elevation fundamental with
//!   compass-colored harmonic partials
//! - **Click-free control**: every change is an exponential (pitch) or
//!   linear (level) ramp
//! - **Sporadic pulsing**: per-voice idle/fade-in/sustain/fade-out cycles
//! - **Realtime and offline backends**: cpal output, or WAV rendering of
//!   telemetry scripts
//!
//! ## Quick Start
//!
//! ```no_run
//! use geodrone::backend::CpalBackend;
//! use geodrone::config::EngineConfig;
//! use geodrone::engine::EnvironmentalAudioEngine;
//! use geodrone::backend::AudioBackend;
//! use geodrone::snapshot::EnvironmentalSnapshot;
//!
//! let factory = || CpalBackend::open().map(|b| Box::new(b) as Box<dyn AudioBackend>);
//! let mut engine = EnvironmentalAudioEngine::new(EngineConfig::default(), factory)?;
//! engine.register_observer(|freqs: &[f32]| println!("{:?}", freqs));
//! engine.start()?;
//!
//! let snapshot = EnvironmentalSnapshot::new(51.5, -0.1, 1.2, 14.0, 0.62)
//!     .with_humidity(70.0)
//!     .with_heading(135.0);
//! engine.set_environmental_data(snapshot)?;
//! # Ok::<(), geodrone::error::EngineError>(())
//! ```
//!
//! ## Architecture
//!
//! - [`engine`] - Orchestrator: lifecycle, target recomputation, pulses
//! - [`mapper`] - Snapshot to frequencies, cutoffs, reverb mix, vibrato
//! - [`scheduler`] - Per-channel sporadic pulse state machine
//! - [`signal_graph`] - Voice/filter/reverb topology on a backend
//! - [`backend`] - Backend capability surface, cpal and offline backends
//! - [`render_graph`] / [`nodes`] - Block-based render side
//! - [`service`] - Control thread owning the engine
//! - [`render`] - Offline rendering of telemetry scripts

pub mod audio_node;
pub mod backend;
pub mod config;
pub mod engine;
pub mod envelope;
pub mod error;
pub mod impulse;
pub mod mapper;
pub mod nodes;
pub mod render;
pub mod render_graph;
pub mod scheduler;
pub mod service;
pub mod signal_graph;
pub mod snapshot;

pub use config::EngineConfig;
pub use engine::{EngineStatus, EnvironmentalAudioEngine, FrequencyObserver};
pub use error::{BackendError, EngineError};
pub use mapper::{MappingStrategy, ParameterMapper, TargetParameters};
pub use snapshot::{EnvironmentalSnapshot, TelemetryUpdate};
