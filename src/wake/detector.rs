//! Wake-word listener: lifecycle, background worker, cooldown and delivery.
//!
//! The worker thread owns the frame buffer, the classifier and the microphone
//! lease for the length of one listening session. `stop_listening` joins it
//! and takes the buffers back, so nothing is ever read into freed memory and
//! the recorder can acquire the microphone as soon as the call returns.

use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::thread::JoinHandle;
use std::time::{Duration, Instant};

use crossbeam_channel as cb;
use parking_lot::{Mutex, RwLock};
use serde::Serialize;
use tracing::{debug, error, info, trace, warn};

use super::{EnergyPatternDetector, WakeDetector};
use crate::audio::{AudioFormat, MicLease, MicOwner, SharedMicrophone};
use crate::clock::{Clock, MonotonicClock};
use crate::config::{clamp_sensitivity, DetectorConfig, Thresholds};
use crate::error::{DetectorError, PeripheralError};
use crate::metrics::{metric_names, MetricsRegistry};

/// One accepted detection, as seen by `subscribe()` receivers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct DetectionEvent {
    /// Value of the detection counter after this event.
    pub count: u64,
    pub at_ms: u64,
}

type Callback = Arc<dyn Fn() + Send + Sync>;

#[derive(Debug, Clone, Copy)]
struct Levels {
    sensitivity: f32,
    thresholds: Thresholds,
}

/// State touched by both the foreground API and the worker.
struct DetectorShared {
    enabled: AtomicBool,
    stop: AtomicBool,
    levels: RwLock<Levels>,
    callback: RwLock<Option<Callback>>,
    detection_count: AtomicU64,
    last_detection_ms: Mutex<Option<u64>>,
    subscribers: Mutex<Vec<cb::Sender<DetectionEvent>>>,
    cooldown_ms: u64,
}

impl DetectorShared {
    /// Cooldown gate. The first detection is always accepted; later ones once
    /// at least `cooldown_ms` has passed since the last accepted one.
    fn accept_detection(&self, now_ms: u64) -> Option<DetectionEvent> {
        let mut last = self.last_detection_ms.lock();
        if let Some(prev) = *last {
            let elapsed = now_ms.saturating_sub(prev);
            if elapsed < self.cooldown_ms {
                debug!(elapsed_ms = elapsed, cooldown_ms = self.cooldown_ms, "wake_suppressed_by_cooldown");
                return None;
            }
        }
        *last = Some(now_ms);
        let count = self.detection_count.fetch_add(1, Ordering::SeqCst) + 1;
        Some(DetectionEvent { count, at_ms: now_ms })
    }

    fn notify(&self, event: DetectionEvent) {
        // Clone out so the callback runs without the lock held.
        let callback = self.callback.read().clone();
        if let Some(callback) = callback {
            callback();
        }

        let mut subscribers = self.subscribers.lock();
        subscribers.retain(|tx| match tx.try_send(event) {
            Ok(()) => true,
            Err(cb::TrySendError::Full(_)) => {
                warn!(count = event.count, "detection_event_dropped_queue_full");
                true
            }
            Err(cb::TrySendError::Disconnected(_)) => false,
        });
    }
}

/// Buffers allocated by `begin` and lent to the worker while listening.
struct Session {
    frame: Vec<i16>,
    classifier: EnergyPatternDetector,
}

impl Session {
    fn allocate(config: &DetectorConfig) -> Result<Self, DetectorError> {
        if config.frame_size == 0 {
            return Err(DetectorError::Allocation { what: "frame buffer" });
        }
        let mut frame = Vec::new();
        frame
            .try_reserve_exact(config.frame_size)
            .map_err(|_| DetectorError::Allocation { what: "frame buffer" })?;
        frame.resize(config.frame_size, 0);
        let classifier = EnergyPatternDetector::try_new(config.history_size, config.pattern.clone())?;
        Ok(Self { frame, classifier })
    }
}

pub struct WakeWordDetector {
    config: DetectorConfig,
    mic: SharedMicrophone,
    shared: Arc<DetectorShared>,
    clock: Arc<dyn Clock>,
    metrics: Option<Arc<MetricsRegistry>>,
    session: Option<Session>,
    worker: Option<JoinHandle<Session>>,
}

impl WakeWordDetector {
    pub fn new(config: DetectorConfig, mic: SharedMicrophone) -> Self {
        let sensitivity = clamp_sensitivity(config.sensitivity);
        let shared = Arc::new(DetectorShared {
            enabled: AtomicBool::new(true),
            stop: AtomicBool::new(false),
            levels: RwLock::new(Levels {
                sensitivity,
                thresholds: config.thresholds(sensitivity),
            }),
            callback: RwLock::new(None),
            detection_count: AtomicU64::new(0),
            last_detection_ms: Mutex::new(None),
            subscribers: Mutex::new(Vec::new()),
            cooldown_ms: config.cooldown_ms,
        });
        Self {
            config,
            mic,
            shared,
            clock: Arc::new(MonotonicClock::new()),
            metrics: None,
            session: None,
            worker: None,
        }
    }

    /// Replace the time source used for the duration window and cooldown.
    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    pub fn with_metrics(mut self, metrics: Arc<MetricsRegistry>) -> Self {
        self.metrics = Some(metrics);
        self
    }

    /// Allocate the frame buffer and feature history. Idempotent.
    pub fn begin(&mut self) -> Result<(), DetectorError> {
        if self.is_initialized() {
            return Ok(());
        }
        match Session::allocate(&self.config) {
            Ok(session) => {
                self.session = Some(session);
                info!(
                    frame_size = self.config.frame_size,
                    history_size = self.config.history_size,
                    "wake_detector_initialized"
                );
                Ok(())
            }
            Err(e) => {
                error!(error = %e, "wake_detector_init_failed");
                Err(e)
            }
        }
    }

    /// Stop listening and free the buffers. `begin` must be called again before reuse.
    pub fn end(&mut self) {
        self.stop_listening();
        if self.session.take().is_some() {
            info!("wake_detector_released");
        }
    }

    pub fn is_initialized(&self) -> bool {
        self.session.is_some() || self.worker.is_some()
    }

    /// Acquire the microphone and start the `wake-word` worker.
    ///
    /// Returns `Ok` without doing anything when already listening, disabled or
    /// not initialised. A microphone failure is returned once; nothing retries.
    pub fn start_listening(&mut self) -> Result<(), DetectorError> {
        if self.is_listening() {
            return Ok(());
        }
        if !self.is_enabled() {
            debug!("start_listening ignored: detector disabled");
            return Ok(());
        }
        let Some(mut session) = self.session.take() else {
            debug!("start_listening ignored: detector not initialized");
            return Ok(());
        };

        session.classifier.reset();
        let format = AudioFormat::mono16(self.config.sample_rate);
        let lease = match self.mic.acquire(MicOwner::WakeListener, format) {
            Ok(lease) => lease,
            Err(e) => {
                self.session = Some(session);
                warn!(error = %e, "wake_listen_start_failed");
                return Err(e.into());
            }
        };

        self.shared.stop.store(false, Ordering::SeqCst);
        let worker = Worker {
            shared: Arc::clone(&self.shared),
            lease,
            session,
            clock: Arc::clone(&self.clock),
            metrics: self.metrics.clone(),
            read_timeout: Duration::from_millis(self.config.read_timeout_ms),
            frame_yield: Duration::from_millis(self.config.frame_yield_ms),
        };

        let spawned = std::thread::Builder::new()
            .name("wake-word".into())
            .spawn(move || worker.run());
        match spawned {
            Ok(handle) => {
                self.worker = Some(handle);
                info!(sample_rate = format.sample_rate, "wake_listening_started");
                Ok(())
            }
            Err(e) => {
                // The closure, lease included, was dropped with the failed spawn.
                error!(error = %e, "wake_worker_spawn_failed");
                self.session = Session::allocate(&self.config).ok();
                Err(DetectorError::WorkerSpawn(e.to_string()))
            }
        }
    }

    /// Signal the worker and wait for it to exit. The microphone is free on return.
    pub fn stop_listening(&mut self) {
        let Some(handle) = self.worker.take() else {
            return;
        };
        self.shared.stop.store(true, Ordering::SeqCst);
        match handle.join() {
            Ok(session) => {
                self.session = Some(session);
                info!("wake_listening_stopped");
            }
            Err(_) => {
                error!("wake-word worker panicked; begin() required before listening again");
            }
        }
    }

    pub fn is_listening(&self) -> bool {
        self.worker.is_some()
    }

    /// Replace the detection callback. Runs on the worker thread, so keep it short.
    pub fn set_callback<F>(&self, callback: F)
    where
        F: Fn() + Send + Sync + 'static,
    {
        *self.shared.callback.write() = Some(Arc::new(callback));
    }

    pub fn clear_callback(&self) {
        *self.shared.callback.write() = None;
    }

    /// Bounded queue of accepted detections. A full queue drops events; it never blocks the worker.
    pub fn subscribe(&self) -> cb::Receiver<DetectionEvent> {
        let (tx, rx) = cb::bounded(self.config.event_queue);
        self.shared.subscribers.lock().push(tx);
        rx
    }

    /// Clamp to [0, 1] and recompute thresholds. Takes effect on the next frame.
    pub fn set_sensitivity(&self, sensitivity: f32) {
        let sensitivity = clamp_sensitivity(sensitivity);
        let thresholds = self.config.thresholds(sensitivity);
        *self.shared.levels.write() = Levels {
            sensitivity,
            thresholds,
        };
        info!(
            sensitivity,
            energy_threshold = thresholds.energy,
            trigger_threshold = thresholds.trigger,
            "sensitivity_updated"
        );
    }

    pub fn sensitivity(&self) -> f32 {
        self.shared.levels.read().sensitivity
    }

    pub fn thresholds(&self) -> Thresholds {
        self.shared.levels.read().thresholds
    }

    /// Persistent gate: while disabled, `start_listening` does nothing.
    pub fn set_enabled(&self, enabled: bool) {
        let was = self.shared.enabled.swap(enabled, Ordering::SeqCst);
        if was != enabled {
            info!(enabled, "wake_detector_enabled_changed");
        }
    }

    pub fn is_enabled(&self) -> bool {
        self.shared.enabled.load(Ordering::SeqCst)
    }

    pub fn detection_count(&self) -> u64 {
        self.shared.detection_count.load(Ordering::SeqCst)
    }

    pub fn config(&self) -> &DetectorConfig {
        &self.config
    }
}

impl Drop for WakeWordDetector {
    fn drop(&mut self) {
        self.end();
    }
}

struct Worker {
    shared: Arc<DetectorShared>,
    lease: MicLease,
    session: Session,
    clock: Arc<dyn Clock>,
    metrics: Option<Arc<MetricsRegistry>>,
    read_timeout: Duration,
    frame_yield: Duration,
}

impl Worker {
    fn run(mut self) -> Session {
        debug!("wake-word worker started");
        while !self.shared.stop.load(Ordering::SeqCst) {
            match self.lease.read_frame(&mut self.session.frame, self.read_timeout) {
                Ok(0) | Err(PeripheralError::Timeout) => trace!("wake_frame_empty"),
                Ok(n) => self.process_frame(n),
                Err(e) => {
                    warn!(error = %e, "wake_frame_read_failed");
                    std::thread::sleep(self.read_timeout);
                }
            }

            // Every pass yields, including empty reads from a non-blocking source.
            if !self.frame_yield.is_zero() {
                std::thread::sleep(self.frame_yield);
            }
        }

        let Worker { lease, session, .. } = self;
        drop(lease);
        debug!("wake-word worker exiting");
        session
    }

    fn process_frame(&mut self, read: usize) {
        let started = Instant::now();
        let energy_threshold = self.shared.levels.read().thresholds.energy;
        let now_ms = self.clock.now_ms();
        let matched = self.session.classifier.process_frame(
            &self.session.frame[..read],
            energy_threshold,
            now_ms,
        );
        if let Some(metrics) = &self.metrics {
            metrics.record(metric_names::FRAME_PROCESS, started.elapsed());
        }
        if !matched {
            return;
        }

        let Some(event) = self.shared.accept_detection(now_ms) else {
            return;
        };
        info!(count = event.count, at_ms = event.at_ms, "wake_detected");
        let started = Instant::now();
        self.shared.notify(event);
        if let Some(metrics) = &self.metrics {
            metrics.record(metric_names::WAKE_CALLBACK, started.elapsed());
        }
    }
}
