//! Typed configuration for the wake gate and the recorder.
//!
//! Everything has a working default. A JSON file (`WAKEGATE_CONFIG`) and a
//! few `WAKEGATE_*` environment variables can override it; `validate()` runs
//! after every overlay.

use std::path::Path;

use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::error::ConfigError;
use crate::wake::pattern::PatternTuning;

pub const DEFAULT_SENSITIVITY: f32 = 0.5;

pub const ENV_CONFIG_PATH: &str = "WAKEGATE_CONFIG";
pub const ENV_SENSITIVITY: &str = "WAKEGATE_SENSITIVITY";
pub const ENV_COOLDOWN_MS: &str = "WAKEGATE_COOLDOWN_MS";
pub const ENV_VAD_THRESHOLD: &str = "WAKEGATE_VAD_THRESHOLD";

/// Thresholds derived from sensitivity. Read once per frame by the worker.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct Thresholds {
    pub energy: f32,
    pub trigger: f32,
}

/// Wake-word detector configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DetectorConfig {
    /// 0.0 (hardest to trigger) to 1.0 (easiest).
    pub sensitivity: f32,
    /// Energy threshold at sensitivity 0.0, in RMS sample units.
    pub base_energy_threshold: f32,
    pub base_trigger_threshold: f32,
    pub cooldown_ms: u64,
    pub sample_rate: u32,
    pub frame_size: usize,
    pub history_size: usize,
    pub read_timeout_ms: u64,
    /// Pause after each frame so the worker never spins.
    pub frame_yield_ms: u64,
    /// Capacity of each `subscribe()` queue.
    pub event_queue: usize,
    pub pattern: PatternTuning,
}

impl Default for DetectorConfig {
    fn default() -> Self {
        Self {
            sensitivity: DEFAULT_SENSITIVITY,
            base_energy_threshold: 1200.0,
            base_trigger_threshold: 0.75,
            cooldown_ms: 2000,
            sample_rate: 16_000,
            frame_size: 512, // ~32ms at 16kHz
            history_size: 32,
            read_timeout_ms: 100,
            frame_yield_ms: 10,
            event_queue: 4,
            pattern: PatternTuning::default(),
        }
    }
}

/// Clamp to [0, 1]; NaN falls back to the default.
pub fn clamp_sensitivity(sensitivity: f32) -> f32 {
    if sensitivity.is_nan() {
        DEFAULT_SENSITIVITY
    } else {
        sensitivity.clamp(0.0, 1.0)
    }
}

impl DetectorConfig {
    /// Higher sensitivity divides the base thresholds by a larger factor,
    /// so the detector triggers more easily.
    pub fn thresholds(&self, sensitivity: f32) -> Thresholds {
        let sensitivity = clamp_sensitivity(sensitivity);
        let factor = 1.0 + sensitivity; // 1.0 to 2.0
        Thresholds {
            energy: self.base_energy_threshold / factor,
            trigger: self.base_trigger_threshold / factor,
        }
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if !(0.0..=1.0).contains(&self.sensitivity) {
            return Err(invalid(format!(
                "sensitivity must be within [0, 1], got {}",
                self.sensitivity
            )));
        }
        if !(self.base_energy_threshold.is_finite() && self.base_energy_threshold > 0.0) {
            return Err(invalid("base_energy_threshold must be positive".into()));
        }
        if !(self.base_trigger_threshold.is_finite() && self.base_trigger_threshold > 0.0) {
            return Err(invalid("base_trigger_threshold must be positive".into()));
        }
        if self.sample_rate == 0 || self.frame_size == 0 || self.history_size == 0 {
            return Err(invalid(
                "sample_rate, frame_size and history_size must be non-zero".into(),
            ));
        }
        if self.read_timeout_ms == 0 {
            return Err(invalid("read_timeout_ms must be non-zero".into()));
        }
        if self.event_queue == 0 {
            return Err(invalid("event_queue must be non-zero".into()));
        }
        self.pattern.validate().map_err(invalid)
    }
}

/// Full-fidelity recorder configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RecorderConfig {
    pub sample_rate: u32,
    pub chunk_size: usize,
    pub max_seconds: u32,
    /// Mean absolute level above which a chunk counts as voice.
    pub vad_threshold: i32,
    /// Silence longer than this ends the recording.
    pub vad_silence_ms: u64,
    pub read_timeout_ms: u64,
}

impl Default for RecorderConfig {
    fn default() -> Self {
        Self {
            sample_rate: 16_000,
            chunk_size: 512,
            max_seconds: 10,
            vad_threshold: 500,
            vad_silence_ms: 1500,
            read_timeout_ms: 10,
        }
    }
}

impl RecorderConfig {
    pub fn max_samples(&self) -> usize {
        self.sample_rate as usize * self.max_seconds as usize
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.sample_rate == 0 || self.chunk_size == 0 || self.max_seconds == 0 {
            return Err(invalid(
                "recorder sample_rate, chunk_size and max_seconds must be non-zero".into(),
            ));
        }
        if self.vad_threshold < 0 {
            return Err(invalid("vad_threshold must not be negative".into()));
        }
        Ok(())
    }
}

/// Top-level configuration.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub detector: DetectorConfig,
    pub recorder: RecorderConfig,
}

impl Config {
    pub fn from_json_file(path: &Path) -> Result<Self, ConfigError> {
        let raw = std::fs::read_to_string(path)?;
        let config: Config = serde_json::from_str(&raw)?;
        config.validate()?;
        debug!(path = %path.display(), "config_file_loaded");
        Ok(config)
    }

    /// Defaults, then the file named by `WAKEGATE_CONFIG` if set, then env overrides.
    pub fn load() -> Result<Self, ConfigError> {
        let mut config = match std::env::var(ENV_CONFIG_PATH) {
            Ok(path) => Self::from_json_file(Path::new(&path))?,
            Err(_) => Self::default(),
        };
        config.apply_env_with(|key| std::env::var(key).ok())?;
        info!(
            sensitivity = config.detector.sensitivity,
            cooldown_ms = config.detector.cooldown_ms,
            vad_threshold = config.recorder.vad_threshold,
            "config_loaded"
        );
        Ok(config)
    }

    pub fn apply_env_with<F>(&mut self, lookup: F) -> Result<(), ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(raw) = lookup(ENV_SENSITIVITY) {
            self.detector.sensitivity = parse_env(ENV_SENSITIVITY, &raw)?;
        }
        if let Some(raw) = lookup(ENV_COOLDOWN_MS) {
            self.detector.cooldown_ms = parse_env(ENV_COOLDOWN_MS, &raw)?;
        }
        if let Some(raw) = lookup(ENV_VAD_THRESHOLD) {
            self.recorder.vad_threshold = parse_env(ENV_VAD_THRESHOLD, &raw)?;
        }
        self.validate()
    }

    /// Listener and recorder share one capture stream, so their rates must match.
    pub fn validate(&self) -> Result<(), ConfigError> {
        self.detector.validate()?;
        self.recorder.validate()?;
        if self.detector.sample_rate != self.recorder.sample_rate {
            return Err(invalid(format!(
                "detector sample_rate {} differs from recorder sample_rate {}",
                self.detector.sample_rate, self.recorder.sample_rate
            )));
        }
        Ok(())
    }
}

fn parse_env<T: std::str::FromStr>(key: &str, raw: &str) -> Result<T, ConfigError> {
    raw.trim()
        .parse()
        .map_err(|_| invalid(format!("{key}: cannot parse {raw:?}")))
}

fn invalid(msg: String) -> ConfigError {
    ConfigError::Invalid(msg)
}
