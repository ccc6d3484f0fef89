//! wakegate: wake-word gate for a voice assistant.
//! Main library: listener/recorder wiring around one shared microphone,
//! tracing setup, and the foreground loop used by the binary.

pub mod audio;
pub mod clock;
pub mod config;
pub mod error;
pub mod metrics;
pub mod wake;

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use anyhow::Context;
use tracing::{info, warn};

pub use audio::{AudioFormat, AudioSource, CpalMicrophone, MicOwner, Recorder, Recording, SharedMicrophone};
pub use clock::{Clock, ManualClock, MonotonicClock};
pub use config::{Config, DetectorConfig, RecorderConfig, Thresholds};
pub use error::{ConfigError, DetectorError, PeripheralError, RecorderError};
pub use metrics::MetricsRegistry;
pub use wake::{DetectionEvent, WakeWordDetector};

/// Env var selecting JSON log lines instead of the human format.
pub const ENV_LOG_FORMAT: &str = "WAKEGATE_LOG_FORMAT";

const EVENT_POLL: Duration = Duration::from_millis(200);
const CAPTURE_BUFFER_SECS: f32 = 1.0;

/// Install the global tracing subscriber. `RUST_LOG` overrides the default filter.
pub fn init_tracing() {
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("wakegate=debug"));
    let json = std::env::var(ENV_LOG_FORMAT).is_ok_and(|v| v.eq_ignore_ascii_case("json"));

    let builder = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(true)
        .with_thread_ids(true);
    // try_init: tests and embedders may already have a subscriber.
    let _ = if json {
        builder.json().try_init()
    } else {
        builder.try_init()
    };
}

/// Listen for the wake cue, record one utterance per detection, resume listening.
/// Runs until Ctrl-C.
pub fn run() -> anyhow::Result<()> {
    init_tracing();
    info!("wakegate starting");

    let config = Config::load().context("failed to load configuration")?;
    let metrics = Arc::new(MetricsRegistry::new());
    let clock: Arc<dyn Clock> = Arc::new(MonotonicClock::new());

    let source = Arc::new(CpalMicrophone::new(
        config.detector.sample_rate,
        CAPTURE_BUFFER_SECS,
    ));
    let mic = SharedMicrophone::new(source.clone());

    let mut detector = WakeWordDetector::new(config.detector.clone(), mic.clone())
        .with_clock(Arc::clone(&clock))
        .with_metrics(Arc::clone(&metrics));
    let events = detector.subscribe();
    let mut recorder = Recorder::new(mic, config.recorder.clone());

    let shutdown = Arc::new(AtomicBool::new(false));
    {
        let shutdown = Arc::clone(&shutdown);
        ctrlc::set_handler(move || shutdown.store(true, Ordering::SeqCst))
            .context("failed to install Ctrl-C handler")?;
    }

    match detector.begin() {
        Ok(()) => {
            if let Err(e) = detector.start_listening() {
                warn!(error = %e, "wake listening unavailable, manual activation only");
            }
        }
        Err(e) => warn!(error = %e, "wake detector unavailable, manual activation only"),
    }

    info!("wakegate ready");

    while !shutdown.load(Ordering::SeqCst) {
        let event = match events.recv_timeout(EVENT_POLL) {
            Ok(event) => event,
            Err(crossbeam_channel::RecvTimeoutError::Timeout) => continue,
            Err(crossbeam_channel::RecvTimeoutError::Disconnected) => break,
        };

        let handoff = metrics.span(metrics::metric_names::HANDOFF);
        detector.stop_listening();
        handoff.finish();

        let recording_span = metrics.span(metrics::metric_names::RECORDING);
        match recorder.record_utterance(clock.as_ref(), &shutdown) {
            Ok(recording) => {
                recording_span.finish();
                info!(
                    detection = event.count,
                    samples = recording.samples.len(),
                    duration_ms = recording.duration_ms(),
                    "utterance_captured"
                );
            }
            Err(e) => warn!(error = %e, "utterance recording failed"),
        }

        if let Err(e) = detector.start_listening() {
            warn!(error = %e, "wake listening not resumed");
        }
    }

    info!(detections = detector.detection_count(), "wakegate shutting down");
    detector.end();
    source.shutdown();

    match serde_json::to_string(&metrics.summary()) {
        Ok(summary) => info!(%summary, "metrics_summary"),
        Err(e) => warn!(error = %e, "metrics summary unavailable"),
    }
    Ok(())
}
