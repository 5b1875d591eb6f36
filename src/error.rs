//! Error types for the backend, the engine and configuration loading

use crate::backend::NodeHandle;
use std::path::PathBuf;
use thiserror::Error;

/// Errors reported by an audio backend
#[derive(Debug, Error)]
pub enum BackendError {
    /// No backend could be constructed on this platform
    #[error("audio backend unavailable: {0}")]
    Unavailable(String),

    /// The oscillator was already stopped (benign during teardown)
    #[error("oscillator {0:?} already stopped")]
    AlreadyStopped(NodeHandle),

    /// The backend was already closed (benign during teardown)
    #[error("audio backend already closed")]
    AlreadyClosed,

    /// Operation attempted on a closed backend (benign during teardown)
    #[error("audio backend is closed")]
    Closed,

    #[error("unknown node {0:?}")]
    UnknownNode(NodeHandle),

    #[error("no oscillator channel {0}")]
    UnknownChannel(usize),

    /// Node exists but does not support the requested operation
    #[error("node {node:?} does not support {operation}")]
    Unsupported {
        node: NodeHandle,
        operation: &'static str,
    },

    /// Parameter index out of range for the node
    #[error("node {node:?} has no parameter {index}")]
    UnknownParam { node: NodeHandle, index: usize },

    /// The render thread is not draining commands fast enough
    #[error("render command queue is full")]
    CommandQueueFull,

    /// Stream or device failure reported by the platform layer
    #[error("audio stream error: {0}")]
    Stream(String),
}

impl BackendError {
    /// Benign races between scheduler shutdown and backend teardown
    pub fn is_benign(&self) -> bool {
        matches!(
            self,
            BackendError::AlreadyStopped(_)
                | BackendError::AlreadyClosed
                | BackendError::Closed
        )
    }
}

/// Errors surfaced by [`crate::engine::EnvironmentalAudioEngine`]
#[derive(Debug, Error)]
pub enum EngineError {
    /// `start()` could not construct an audio backend. Not retried.
    #[error("no audio backend could be constructed: {0}")]
    BackendUnavailable(String),

    /// The backend faulted during a ramp or topology change
    #[error("audio backend error: {0}")]
    Backend(#[from] BackendError),

    #[error(transparent)]
    Config(#[from] ConfigError),

    /// The control thread driving the engine has exited
    #[error("engine control thread is gone")]
    ServiceGone,
}

/// Errors loading or validating an [`crate::config::EngineConfig`]
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("invalid config TOML: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("failed to serialize config: {0}")]
    Serialize(#[from] toml::ser::Error),

    #[error("invalid config: {0}")]
    Invalid(String),
}

pub type BackendResult<T> = Result<T, BackendError>;
pub type EngineResult<T> = Result<T, EngineError>;

/// Errors from offline rendering
#[derive(Debug, Error)]
pub enum RenderError {
    #[error(transparent)]
    Engine(#[from] EngineError),

    #[error("failed to read {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("invalid telemetry script: {0}")]
    Script(#[from] serde_json::Error),

    #[error("failed to write WAV: {0}")]
    Wav(#[from] hound::Error),
}
