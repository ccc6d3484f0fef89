//! Per-frame audio features: RMS energy and zero-crossing rate.
//! Both are pure and allocation-free; safe for the real-time loop.

const FULL_SCALE: f32 = 32768.0;

/// Features of one frame.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct FeatureSample {
    /// RMS amplitude in sample units (0 ..= ~32767).
    pub energy: f32,
    /// Fraction of adjacent sample pairs that change sign, in [0, 1).
    pub zcr: f32,
}

impl FeatureSample {
    pub fn new(energy: f32, zcr: f32) -> Self {
        Self { energy, zcr }
    }

    pub fn from_frame(samples: &[i16]) -> Self {
        Self {
            energy: energy(samples),
            zcr: zero_crossing_rate(samples),
        }
    }

    /// Replace non-finite or negative values with zero.
    pub fn sanitized(self) -> Self {
        Self {
            energy: non_negative(self.energy),
            zcr: non_negative(self.zcr),
        }
    }
}

#[inline]
pub(crate) fn non_negative(v: f32) -> f32 {
    if v.is_finite() && v > 0.0 {
        v
    } else {
        0.0
    }
}

/// RMS energy of a frame, normalised to full scale then rescaled to sample units.
#[inline]
pub fn energy(samples: &[i16]) -> f32 {
    if samples.is_empty() {
        return 0.0;
    }
    let sum: f32 = samples
        .iter()
        .map(|&s| {
            let normalized = s as f32 / FULL_SCALE;
            normalized * normalized
        })
        .sum();
    (sum / samples.len() as f32).sqrt() * FULL_SCALE
}

/// Sign changes between consecutive samples divided by frame length.
/// Zero counts as non-negative.
#[inline]
pub fn zero_crossing_rate(samples: &[i16]) -> f32 {
    if samples.len() <= 1 {
        return 0.0;
    }
    let crossings = samples
        .windows(2)
        .filter(|pair| (pair[0] >= 0) != (pair[1] >= 0))
        .count();
    crossings as f32 / samples.len() as f32
}
