//! Audio peripheral layer.
//! Manages: microphone device → ring buffer → exclusive lease → consumer
//! (wake listener or recorder). Capture runs on cpal's callback thread;
//! consumers pull fixed-size frames with a bounded wait.

pub mod capture;
pub mod recorder;
pub mod ring_buffer;
pub mod shared;
pub mod vad;

use std::time::Duration;

use serde::Serialize;

use crate::error::PeripheralError;

pub use capture::CpalMicrophone;
pub use recorder::{Recorder, RecorderStatus, Recording};
pub use ring_buffer::RingBuffer;
pub use shared::{MicLease, SharedMicrophone};
pub use vad::LevelVad;

/// Capture format requested from the peripheral.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct AudioFormat {
    pub sample_rate: u32,
    pub bits_per_sample: u16,
    pub channels: u16,
}

impl AudioFormat {
    /// 16-bit mono at `sample_rate`.
    pub fn mono16(sample_rate: u32) -> Self {
        Self {
            sample_rate,
            bits_per_sample: 16,
            channels: 1,
        }
    }
}

impl Default for AudioFormat {
    fn default() -> Self {
        Self::mono16(16_000)
    }
}

/// The microphone peripheral as consumed by the wake listener and the recorder.
///
/// The driver may already be running under another owner: `configure` with
/// the active format must succeed without side effects. `release` stops
/// delivering samples but leaves the driver installed.
pub trait AudioSource: Send + Sync {
    fn configure(&self, format: AudioFormat) -> Result<(), PeripheralError>;

    /// Read up to `buf.len()` samples, waiting at most `timeout` for data.
    /// `Ok(0)` means nothing arrived in time.
    fn read_frame(&self, buf: &mut [i16], timeout: Duration) -> Result<usize, PeripheralError>;

    fn release(&self);
}

/// The two consumers that take turns on the microphone.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub enum MicOwner {
    WakeListener,
    Recorder,
}

impl std::fmt::Display for MicOwner {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            MicOwner::WakeListener => write!(f, "wake listener"),
            MicOwner::Recorder => write!(f, "recorder"),
        }
    }
}
