//! Scripted microphone and synthetic cues shared by the integration tests.

#![allow(dead_code)]

use std::collections::VecDeque;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use parking_lot::Mutex;
use wakegate::{AudioFormat, AudioSource, DetectorConfig, ManualClock, PeripheralError, SharedMicrophone, WakeWordDetector};

pub const FRAME: usize = 512;
pub const STEP_MS: u64 = 50;

/// Replays queued frames and read errors. Each delivered frame advances the
/// shared clock by `STEP_MS`; an empty queue reads as zero samples.
pub struct ScriptedSource {
    script: Mutex<VecDeque<Result<Vec<i16>, PeripheralError>>>,
    clock: Arc<ManualClock>,
    configure_error: Mutex<Option<PeripheralError>>,
    /// While set, every read fails with this error and the script is untouched.
    read_error: Mutex<Option<PeripheralError>>,
    pub configures: AtomicUsize,
    pub releases: AtomicUsize,
    pub reads: AtomicUsize,
}

impl ScriptedSource {
    pub fn new(clock: Arc<ManualClock>) -> Arc<Self> {
        Arc::new(Self {
            script: Mutex::new(VecDeque::new()),
            clock,
            configure_error: Mutex::new(None),
            read_error: Mutex::new(None),
            configures: AtomicUsize::new(0),
            releases: AtomicUsize::new(0),
            reads: AtomicUsize::new(0),
        })
    }

    pub fn push(&self, frames: impl IntoIterator<Item = Vec<i16>>) {
        self.script.lock().extend(frames.into_iter().map(Ok));
    }

    /// Queue a single failed read.
    pub fn push_error(&self, error: PeripheralError) {
        self.script.lock().push_back(Err(error));
    }

    pub fn remaining(&self) -> usize {
        self.script.lock().len()
    }

    pub fn fail_reads(&self, error: Option<PeripheralError>) {
        *self.read_error.lock() = error;
    }

    pub fn fail_configure(&self, error: Option<PeripheralError>) {
        *self.configure_error.lock() = error;
    }

    /// Block until every queued frame has been handed out.
    pub fn wait_drained(&self, timeout: Duration) -> bool {
        let deadline = Instant::now() + timeout;
        while Instant::now() < deadline {
            if self.remaining() == 0 {
                return true;
            }
            std::thread::sleep(Duration::from_millis(1));
        }
        false
    }
}

impl AudioSource for ScriptedSource {
    fn configure(&self, _format: AudioFormat) -> Result<(), PeripheralError> {
        self.configures.fetch_add(1, Ordering::SeqCst);
        match self.configure_error.lock().clone() {
            Some(err) => Err(err),
            None => Ok(()),
        }
    }

    fn read_frame(&self, buf: &mut [i16], _timeout: Duration) -> Result<usize, PeripheralError> {
        self.reads.fetch_add(1, Ordering::SeqCst);
        if let Some(err) = self.read_error.lock().clone() {
            return Err(err);
        }
        let mut script = self.script.lock();
        match script.pop_front() {
            Some(Ok(frame)) => {
                self.clock.advance(STEP_MS);
                let n = frame.len().min(buf.len());
                buf[..n].copy_from_slice(&frame[..n]);
                Ok(n)
            }
            Some(Err(err)) => Err(err),
            None => {
                drop(script);
                std::thread::sleep(Duration::from_millis(1));
                Ok(0)
            }
        }
    }

    fn release(&self) {
        self.releases.fetch_add(1, Ordering::SeqCst);
    }
}

/// 400 Hz tone: ZCR ~0.05, well inside the voiced band.
pub fn tone(amplitude: f32) -> Vec<i16> {
    (0..FRAME)
        .map(|i| {
            let t = i as f32 / 16_000.0;
            (amplitude * (2.0 * std::f32::consts::PI * 400.0 * t).sin()) as i16
        })
        .collect()
}

pub fn silence(frames: usize) -> Vec<Vec<i16>> {
    vec![vec![0i16; FRAME]; frames]
}

/// Silence, a 400 ms voiced burst, then decay. Detected on its 13th frame at
/// the default sensitivity when `amplitude` is 1400 (RMS ~990).
pub fn wake_cue(amplitude: f32) -> Vec<Vec<i16>> {
    let mut frames = silence(3);
    frames.extend(std::iter::repeat(tone(amplitude)).take(8));
    frames.extend(silence(4));
    frames
}

pub struct Rig {
    pub clock: Arc<ManualClock>,
    pub source: Arc<ScriptedSource>,
    pub mic: SharedMicrophone,
}

impl Rig {
    pub fn new() -> Self {
        let clock = Arc::new(ManualClock::new(0));
        let source = ScriptedSource::new(Arc::clone(&clock));
        let mic = SharedMicrophone::new(source.clone());
        Self { clock, source, mic }
    }

    pub fn detector(&self) -> WakeWordDetector {
        let config = DetectorConfig {
            frame_yield_ms: 0,
            read_timeout_ms: 5,
            ..DetectorConfig::default()
        };
        WakeWordDetector::new(config, self.mic.clone()).with_clock(self.clock.clone())
    }
}
