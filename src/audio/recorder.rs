//! Full-fidelity recorder: the second owner of the shared microphone.
//!
//! Holds a `MicLease` for the whole recording, so the wake listener cannot
//! read at the same time. A recording ends on silence timeout, on a full
//! buffer, or when the caller stops it.

use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use tracing::{debug, info};

use super::shared::{MicLease, SharedMicrophone};
use super::vad::LevelVad;
use super::{AudioFormat, MicOwner};
use crate::clock::Clock;
use crate::config::RecorderConfig;
use crate::error::{PeripheralError, RecorderError};

/// Outcome of one `Recorder::process` step.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RecorderStatus {
    /// Still capturing; `level` is the last chunk's mean absolute amplitude.
    Recording { level: i32 },
    SilenceTimeout,
    BufferFull,
}

/// Captured audio handed to downstream consumers (e.g. a speech-to-text client).
#[derive(Debug, Clone, Default)]
pub struct Recording {
    pub samples: Vec<i16>,
    pub sample_rate: u32,
}

impl Recording {
    pub fn duration_ms(&self) -> u64 {
        if self.sample_rate == 0 {
            return 0;
        }
        self.samples.len() as u64 * 1000 / self.sample_rate as u64
    }

    pub fn is_empty(&self) -> bool {
        self.samples.is_empty()
    }
}

pub struct Recorder {
    mic: SharedMicrophone,
    config: RecorderConfig,
    vad: LevelVad,
    buffer: Vec<i16>,
    chunk: Vec<i16>,
    lease: Option<MicLease>,
}

impl Recorder {
    pub fn new(mic: SharedMicrophone, config: RecorderConfig) -> Self {
        let vad = LevelVad::new(config.vad_threshold, config.vad_silence_ms);
        let chunk = vec![0i16; config.chunk_size];
        Self {
            mic,
            config,
            vad,
            buffer: Vec::new(),
            chunk,
            lease: None,
        }
    }

    pub fn is_recording(&self) -> bool {
        self.lease.is_some()
    }

    /// Take the microphone and start a fresh recording.
    /// Fails with `Busy` while the wake listener still holds the microphone.
    pub fn start(&mut self, now_ms: u64) -> Result<(), RecorderError> {
        if self.is_recording() {
            return Ok(());
        }
        let format = AudioFormat::mono16(self.config.sample_rate);
        let lease = self.mic.acquire(MicOwner::Recorder, format)?;
        self.buffer = Vec::with_capacity(self.config.max_samples());
        self.vad.reset(now_ms);
        self.lease = Some(lease);
        info!("recording started");
        Ok(())
    }

    /// Read one chunk and update the voice gate.
    pub fn process(&mut self, now_ms: u64) -> Result<RecorderStatus, RecorderError> {
        let lease = self.lease.as_ref().ok_or(RecorderError::NotRecording)?;
        let timeout = Duration::from_millis(self.config.read_timeout_ms);
        let read = match lease.read_frame(&mut self.chunk, timeout) {
            Ok(n) => n,
            Err(PeripheralError::Timeout) => 0,
            Err(e) => return Err(e.into()),
        };
        let samples = &self.chunk[..read];

        let space_left = self.config.max_samples() - self.buffer.len();
        let to_copy = samples.len().min(space_left);
        self.buffer.extend_from_slice(&samples[..to_copy]);

        if self.buffer.len() >= self.config.max_samples() {
            debug!(samples = self.buffer.len(), "recording buffer full");
            return Ok(RecorderStatus::BufferFull);
        }
        if !self.vad.process(samples, now_ms) {
            return Ok(RecorderStatus::SilenceTimeout);
        }
        Ok(RecorderStatus::Recording {
            level: self.vad.level(),
        })
    }

    /// Release the microphone and hand over what was captured.
    pub fn stop(&mut self) -> Recording {
        self.lease = None;
        let recording = Recording {
            samples: std::mem::take(&mut self.buffer),
            sample_rate: self.config.sample_rate,
        };
        info!(
            samples = recording.samples.len(),
            duration_ms = recording.duration_ms(),
            "recording stopped"
        );
        recording
    }

    /// Record until silence, a full buffer, or `stop` is raised.
    /// The microphone is released before returning, including on error.
    pub fn record_utterance(
        &mut self,
        clock: &dyn Clock,
        stop: &AtomicBool,
    ) -> Result<Recording, RecorderError> {
        self.start(clock.now_ms())?;
        loop {
            if stop.load(Ordering::Relaxed) {
                break;
            }
            match self.process(clock.now_ms()) {
                Ok(RecorderStatus::Recording { .. }) => {}
                Ok(status) => {
                    debug!(?status, "recording finished");
                    break;
                }
                Err(e) => {
                    self.stop();
                    return Err(e);
                }
            }
        }
        Ok(self.stop())
    }
}
