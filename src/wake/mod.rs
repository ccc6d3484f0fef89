//! Wake word detection.
//! Pipeline: audio frame → features (RMS, ZCR) → rolling baseline → envelope matcher.
//! The matcher is a hand-tuned pre-filter; a cloud recognizer does the real work
//! after the wake event.

pub mod detector;
pub mod features;
pub mod history;
pub mod pattern;

pub use detector::{DetectionEvent, WakeWordDetector};
pub use features::FeatureSample;
pub use history::FeatureHistory;
pub use pattern::{PatternMatcher, PatternState, PatternTuning};

use crate::error::DetectorError;

/// Per-frame wake classifier (swap point for a real keyword-spotting model).
pub trait WakeDetector: Send {
    /// Classify one frame of PCM i16 samples. Returns `true` once per detected cue.
    fn process_frame(&mut self, samples: &[i16], energy_threshold: f32, now_ms: u64) -> bool;

    /// Reset internal state between listening sessions.
    fn reset(&mut self);
}

/// Energy/ZCR envelope detector: features feed both the history and the matcher.
pub struct EnergyPatternDetector {
    history: FeatureHistory,
    matcher: PatternMatcher,
}

impl EnergyPatternDetector {
    pub fn new(history_size: usize, tuning: PatternTuning) -> Self {
        Self {
            history: FeatureHistory::new(history_size),
            matcher: PatternMatcher::new(tuning),
        }
    }

    /// Fallible variant used by `WakeWordDetector::begin`.
    pub fn try_new(history_size: usize, tuning: PatternTuning) -> Result<Self, DetectorError> {
        Ok(Self {
            history: FeatureHistory::try_new(history_size)?,
            matcher: PatternMatcher::new(tuning),
        })
    }

    /// Feed precomputed features.
    pub fn process_features(
        &mut self,
        sample: FeatureSample,
        energy_threshold: f32,
        now_ms: u64,
    ) -> bool {
        self.history.push(sample);
        let baseline = self.history.mean_energy();
        self.matcher.process(sample, baseline, energy_threshold, now_ms)
    }

    pub fn state(&self) -> PatternState {
        self.matcher.state()
    }

    pub fn history(&self) -> &FeatureHistory {
        &self.history
    }
}

impl WakeDetector for EnergyPatternDetector {
    fn process_frame(&mut self, samples: &[i16], energy_threshold: f32, now_ms: u64) -> bool {
        self.process_features(FeatureSample::from_frame(samples), energy_threshold, now_ms)
    }

    fn reset(&mut self) {
        self.history.reset();
        self.matcher.reset();
    }
}
