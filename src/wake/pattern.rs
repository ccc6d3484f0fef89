//! Energy-envelope pattern matcher.
//!
//! Looks for the coarse shape of a short spoken cue: silence, an abrupt
//! onset, a sustained voiced segment of plausible length, then decay.
//! Sustained non-speech noise fails the ZCR band; clicks and pops fail the
//! minimum sustained-frame count.
//!
//! One transition is evaluated per frame. Every threshold is expressed as a
//! ratio of the sensitivity-derived energy threshold, so they all scale
//! together.

use serde::{Deserialize, Serialize};
use tracing::trace;

use super::features::{non_negative, FeatureSample};

/// Matcher state. Exactly one live instance per detector.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub enum PatternState {
    Idle,
    RisingEdge,
    Sustained,
    FallingEdge,
    Detected,
}

impl std::fmt::Display for PatternState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            PatternState::Idle => write!(f, "Idle"),
            PatternState::RisingEdge => write!(f, "RisingEdge"),
            PatternState::Sustained => write!(f, "Sustained"),
            PatternState::FallingEdge => write!(f, "FallingEdge"),
            PatternState::Detected => write!(f, "Detected"),
        }
    }
}

/// Empirically chosen matcher constants.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PatternTuning {
    /// Onset must exceed the rolling baseline by this factor.
    pub rise_ratio: f32,
    /// Voiced-frame energy floor during the rising edge.
    pub voiced_energy_ratio: f32,
    /// Below this during the rising edge the onset is abandoned.
    pub drop_ratio: f32,
    /// Energy floor that keeps the sustained segment alive.
    pub sustain_ratio: f32,
    pub voiced_zcr_min: f32,
    pub voiced_zcr_max: f32,
    /// Voiced frames needed to leave the rising edge.
    pub rising_frames: u32,
    /// Voiced + sustained frames needed for a detection.
    pub min_sustained_frames: u32,
    pub min_duration_ms: u64,
    pub max_duration_ms: u64,
    /// A sustained segment longer than this is not a wake cue.
    pub max_sustain_ms: u64,
}

impl Default for PatternTuning {
    fn default() -> Self {
        Self {
            rise_ratio: 1.5,
            voiced_energy_ratio: 0.8,
            drop_ratio: 0.3,
            sustain_ratio: 0.5,
            voiced_zcr_min: 0.02,
            voiced_zcr_max: 0.2,
            rising_frames: 3,
            min_sustained_frames: 5,
            min_duration_ms: 300,
            max_duration_ms: 1200,
            max_sustain_ms: 1500,
        }
    }
}

impl PatternTuning {
    pub fn validate(&self) -> Result<(), String> {
        let ratios = [
            ("rise_ratio", self.rise_ratio),
            ("voiced_energy_ratio", self.voiced_energy_ratio),
            ("drop_ratio", self.drop_ratio),
            ("sustain_ratio", self.sustain_ratio),
        ];
        for (name, value) in ratios {
            if !(value.is_finite() && value > 0.0) {
                return Err(format!("{name} must be positive, got {value}"));
            }
        }
        if !(self.voiced_zcr_min >= 0.0 && self.voiced_zcr_min < self.voiced_zcr_max) {
            return Err("voiced_zcr_min must be below voiced_zcr_max".into());
        }
        if self.min_duration_ms > self.max_duration_ms {
            return Err("min_duration_ms must not exceed max_duration_ms".into());
        }
        if self.rising_frames == 0 {
            return Err("rising_frames must be non-zero".into());
        }
        Ok(())
    }

    #[inline]
    fn is_voiced(&self, sample: FeatureSample, threshold: f32) -> bool {
        sample.energy > threshold * self.voiced_energy_ratio
            && sample.zcr > self.voiced_zcr_min
            && sample.zcr < self.voiced_zcr_max
    }
}

/// Five-state wake-shape matcher.
#[derive(Debug, Clone)]
pub struct PatternMatcher {
    tuning: PatternTuning,
    state: PatternState,
    start_ms: u64,
    sustained_frames: u32,
}

impl PatternMatcher {
    pub fn new(tuning: PatternTuning) -> Self {
        Self {
            tuning,
            state: PatternState::Idle,
            start_ms: 0,
            sustained_frames: 0,
        }
    }

    pub fn state(&self) -> PatternState {
        self.state
    }

    pub fn sustained_frames(&self) -> u32 {
        self.sustained_frames
    }

    pub fn reset(&mut self) {
        self.state = PatternState::Idle;
        self.start_ms = 0;
        self.sustained_frames = 0;
    }

    /// Feed one frame. Returns `true` only on the FallingEdge → Detected
    /// transition. Non-finite or negative inputs are read as zero.
    pub fn process(
        &mut self,
        sample: FeatureSample,
        avg_energy: f32,
        energy_threshold: f32,
        now_ms: u64,
    ) -> bool {
        let sample = sample.sanitized();
        let avg_energy = non_negative(avg_energy);
        let threshold = energy_threshold;
        let t = &self.tuning;
        let prev = self.state;
        let mut detected = false;

        self.state = match self.state {
            PatternState::Idle => {
                if sample.energy > threshold && sample.energy > avg_energy * t.rise_ratio {
                    self.start_ms = now_ms;
                    self.sustained_frames = 0;
                    PatternState::RisingEdge
                } else {
                    PatternState::Idle
                }
            }
            PatternState::RisingEdge => {
                if t.is_voiced(sample, threshold) {
                    self.sustained_frames += 1;
                    if self.sustained_frames >= t.rising_frames {
                        PatternState::Sustained
                    } else {
                        PatternState::RisingEdge
                    }
                } else if sample.energy < threshold * t.drop_ratio {
                    // dropped too fast
                    PatternState::Idle
                } else {
                    PatternState::RisingEdge
                }
            }
            PatternState::Sustained => {
                if sample.energy > threshold * t.sustain_ratio {
                    self.sustained_frames += 1;
                    if now_ms.saturating_sub(self.start_ms) > t.max_sustain_ms {
                        PatternState::Idle
                    } else {
                        PatternState::Sustained
                    }
                } else {
                    PatternState::FallingEdge
                }
            }
            PatternState::FallingEdge => {
                let elapsed = now_ms.saturating_sub(self.start_ms);
                if (t.min_duration_ms..=t.max_duration_ms).contains(&elapsed)
                    && self.sustained_frames >= t.min_sustained_frames
                {
                    detected = true;
                    PatternState::Detected
                } else {
                    PatternState::Idle
                }
            }
            PatternState::Detected => PatternState::Idle,
        };

        if prev != self.state {
            trace!(
                from = %prev,
                to = %self.state,
                energy = sample.energy,
                zcr = sample.zcr,
                sustained = self.sustained_frames,
                "pattern_transition"
            );
        }
        detected
    }
}
