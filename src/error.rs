//! Error types for the detector, the microphone layer, configuration and the recorder.
//! Nothing here is ever raised as a panic across the public API.

use thiserror::Error;

use crate::audio::MicOwner;

/// Failures reported by the audio capture peripheral.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum PeripheralError {
    #[error("no audio input device available")]
    NoDevice,
    #[error("microphone is held by {holder}")]
    Busy { holder: MicOwner },
    #[error("microphone already active in an incompatible mode")]
    IncompatibleMode,
    #[error("audio stream error: {0}")]
    Stream(String),
    #[error("frame read timed out")]
    Timeout,
    #[error("microphone is not active")]
    NotActive,
}

/// Errors surfaced by `WakeWordDetector`.
#[derive(Debug, Error)]
pub enum DetectorError {
    #[error("failed to allocate {what}")]
    Allocation { what: &'static str },
    #[error("microphone unavailable: {0}")]
    Peripheral(#[from] PeripheralError),
    #[error("failed to spawn wake-word worker: {0}")]
    WorkerSpawn(String),
}

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read config: {0}")]
    Io(#[from] std::io::Error),
    #[error("failed to parse config: {0}")]
    Parse(#[from] serde_json::Error),
    #[error("invalid config: {0}")]
    Invalid(String),
}

#[derive(Debug, Error)]
pub enum RecorderError {
    #[error("microphone unavailable: {0}")]
    Peripheral(#[from] PeripheralError),
    #[error("recorder is not recording")]
    NotRecording,
}
