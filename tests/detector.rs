mod common;

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use common::{silence, wake_cue, Rig};
use wakegate::{DetectionEvent, DetectorError, MicOwner, PeripheralError};

const DRAIN: Duration = Duration::from_secs(5);

fn counting_callback(detector: &wakegate::WakeWordDetector) -> Arc<AtomicUsize> {
    let calls = Arc::new(AtomicUsize::new(0));
    let seen = Arc::clone(&calls);
    detector.set_callback(move || {
        seen.fetch_add(1, Ordering::SeqCst);
    });
    calls
}

#[test]
fn single_cue_fires_once() {
    let rig = Rig::new();
    let mut detector = rig.detector();
    let calls = counting_callback(&detector);
    let events = detector.subscribe();

    detector.begin().unwrap();
    detector.start_listening().unwrap();
    rig.source.push(wake_cue(1400.0));
    assert!(rig.source.wait_drained(DRAIN));
    detector.stop_listening();

    assert_eq!(calls.load(Ordering::SeqCst), 1);
    assert_eq!(detector.detection_count(), 1);
    // 13th frame, one STEP_MS per frame
    assert_eq!(events.try_recv().unwrap(), DetectionEvent { count: 1, at_ms: 650 });
    assert!(events.try_recv().is_err());
}

#[test]
fn back_to_back_cues_within_cooldown_fire_once() {
    let rig = Rig::new();
    let mut detector = rig.detector();
    let calls = counting_callback(&detector);

    detector.begin().unwrap();
    detector.start_listening().unwrap();
    rig.source.push(wake_cue(1400.0));
    rig.source.push(wake_cue(1400.0));
    assert!(rig.source.wait_drained(DRAIN));
    detector.stop_listening();

    assert_eq!(calls.load(Ordering::SeqCst), 1);
    assert_eq!(detector.detection_count(), 1);
}

#[test]
fn cues_spaced_beyond_cooldown_fire_twice() {
    let rig = Rig::new();
    let mut detector = rig.detector();
    let calls = counting_callback(&detector);
    let events = detector.subscribe();

    detector.begin().unwrap();
    detector.start_listening().unwrap();
    rig.source.push(wake_cue(1400.0));
    rig.source.push(silence(40));
    rig.source.push(wake_cue(1400.0));
    assert!(rig.source.wait_drained(DRAIN));
    detector.stop_listening();

    assert_eq!(calls.load(Ordering::SeqCst), 2);
    let first = events.try_recv().unwrap();
    let second = events.try_recv().unwrap();
    assert_eq!(second.count, 2);
    assert!(second.at_ms - first.at_ms > 2000);
}

#[test]
fn start_before_begin_is_a_no_op() {
    let rig = Rig::new();
    let mut detector = rig.detector();
    detector.start_listening().unwrap();
    assert!(!detector.is_listening());
    assert_eq!(rig.source.configures.load(Ordering::SeqCst), 0);
    assert_eq!(rig.mic.holder(), None);
}

#[test]
fn disabled_detector_ignores_start() {
    let rig = Rig::new();
    let mut detector = rig.detector();
    detector.begin().unwrap();
    detector.set_enabled(false);
    assert!(!detector.is_enabled());
    detector.start_listening().unwrap();
    assert!(!detector.is_listening());
    assert_eq!(rig.source.configures.load(Ordering::SeqCst), 0);
}

#[test]
fn peripheral_failure_leaves_detector_idle_without_retrying() {
    let rig = Rig::new();
    let mut detector = rig.detector();
    detector.begin().unwrap();
    rig.source.fail_configure(Some(PeripheralError::NoDevice));

    let err = detector.start_listening().unwrap_err();
    assert!(matches!(err, DetectorError::Peripheral(PeripheralError::NoDevice)));
    assert!(!detector.is_listening());
    assert_eq!(rig.mic.holder(), None);

    std::thread::sleep(Duration::from_millis(20));
    assert_eq!(rig.source.configures.load(Ordering::SeqCst), 1);

    // Buffers survive the failure; a later attempt can succeed.
    rig.source.fail_configure(None);
    detector.start_listening().unwrap();
    assert!(detector.is_listening());
    assert_eq!(rig.mic.holder(), Some(MicOwner::WakeListener));
}

#[test]
fn sensitivity_change_applies_while_listening() {
    let rig = Rig::new();
    let mut detector = rig.detector();
    detector.begin().unwrap();
    detector.start_listening().unwrap();

    // RMS ~707: under the default 800 threshold, over 600 at full sensitivity.
    rig.source.push(wake_cue(1000.0));
    assert!(rig.source.wait_drained(DRAIN));
    assert_eq!(detector.detection_count(), 0);

    detector.set_sensitivity(1.0);
    assert!(detector.is_listening());
    rig.source.push(wake_cue(1000.0));
    assert!(rig.source.wait_drained(DRAIN));
    detector.stop_listening();

    assert_eq!(detector.detection_count(), 1);
}

#[test]
fn stop_releases_microphone_and_restart_resets_matcher() {
    let rig = Rig::new();
    let mut detector = rig.detector();
    detector.begin().unwrap();
    detector.start_listening().unwrap();

    // Onset and half the voiced burst, then stop mid-cue.
    let cue = wake_cue(1400.0);
    rig.source.push(cue[..6].to_vec());
    assert!(rig.source.wait_drained(DRAIN));
    detector.stop_listening();
    assert_eq!(rig.mic.holder(), None);
    assert_eq!(rig.source.releases.load(Ordering::SeqCst), 1);

    // The tail alone must not complete the interrupted cue.
    detector.start_listening().unwrap();
    rig.source.push(cue[6..].to_vec());
    assert!(rig.source.wait_drained(DRAIN));
    detector.stop_listening();
    assert_eq!(detector.detection_count(), 0);
}

#[test]
fn end_requires_begin_again() {
    let rig = Rig::new();
    let mut detector = rig.detector();
    detector.begin().unwrap();
    detector.start_listening().unwrap();
    detector.end();
    assert!(!detector.is_listening());
    assert!(!detector.is_initialized());
    assert_eq!(rig.mic.holder(), None);

    detector.start_listening().unwrap();
    assert!(!detector.is_listening());

    detector.begin().unwrap();
    detector.start_listening().unwrap();
    assert!(detector.is_listening());
}

#[test]
fn read_timeouts_are_skipped_without_disturbing_the_cue() {
    let rig = Rig::new();
    let mut detector = rig.detector();
    let events = detector.subscribe();
    detector.begin().unwrap();
    detector.start_listening().unwrap();

    let cue = wake_cue(1400.0);
    rig.source.push(cue[..5].to_vec());
    rig.source.push_error(PeripheralError::Timeout);
    rig.source.push_error(PeripheralError::Timeout);
    rig.source.push(cue[5..].to_vec());
    assert!(rig.source.wait_drained(DRAIN));
    assert!(detector.is_listening());
    detector.stop_listening();

    // Timeouts consume no clock time and no matcher step.
    assert_eq!(events.try_recv().unwrap(), DetectionEvent { count: 1, at_ms: 650 });
}

#[test]
fn read_failures_back_off_and_listening_recovers() {
    let rig = Rig::new();
    let mut detector = rig.detector();
    detector.begin().unwrap();
    detector.start_listening().unwrap();

    let before = rig.source.reads.load(Ordering::SeqCst);
    rig.source.fail_reads(Some(PeripheralError::Stream("overrun".into())));
    std::thread::sleep(Duration::from_millis(100));
    let failed_reads = rig.source.reads.load(Ordering::SeqCst) - before;
    // read_timeout_ms = 5 in the rig: each failure waits it out
    assert!(failed_reads >= 1);
    assert!(failed_reads <= 40, "retried {failed_reads} times in 100ms");
    assert!(detector.is_listening());
    assert_eq!(rig.mic.holder(), Some(MicOwner::WakeListener));

    rig.source.fail_reads(None);
    rig.source.push_error(PeripheralError::NotActive);
    rig.source.push(wake_cue(1400.0));
    assert!(rig.source.wait_drained(DRAIN));
    detector.stop_listening();
    assert_eq!(detector.detection_count(), 1);
}
