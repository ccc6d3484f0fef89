//! Fixed ring of recent feature samples, used for the adaptive baseline.
//! Means always cover every slot, including zero-filled ones, so the
//! baseline starts low after a reset.

use super::features::FeatureSample;
use crate::error::DetectorError;

pub struct FeatureHistory {
    slots: Box<[FeatureSample]>,
    pos: usize,
}

impl FeatureHistory {
    /// Panics if `capacity` is zero.
    pub fn new(capacity: usize) -> Self {
        assert!(capacity > 0, "feature history capacity must be > 0");
        Self {
            slots: vec![FeatureSample::default(); capacity].into_boxed_slice(),
            pos: 0,
        }
    }

    /// Fallible allocation for `WakeWordDetector::begin`.
    pub fn try_new(capacity: usize) -> Result<Self, DetectorError> {
        let what = "feature history";
        if capacity == 0 {
            return Err(DetectorError::Allocation { what });
        }
        let mut slots = Vec::new();
        slots
            .try_reserve_exact(capacity)
            .map_err(|_| DetectorError::Allocation { what })?;
        slots.resize(capacity, FeatureSample::default());
        Ok(Self {
            slots: slots.into_boxed_slice(),
            pos: 0,
        })
    }

    /// Overwrite the oldest slot.
    #[inline]
    pub fn push(&mut self, sample: FeatureSample) {
        self.slots[self.pos] = sample;
        self.pos = (self.pos + 1) % self.slots.len();
    }

    pub fn mean_energy(&self) -> f32 {
        self.slots.iter().map(|s| s.energy).sum::<f32>() / self.slots.len() as f32
    }

    pub fn mean_zcr(&self) -> f32 {
        self.slots.iter().map(|s| s.zcr).sum::<f32>() / self.slots.len() as f32
    }

    /// Zero every slot and rewind.
    pub fn reset(&mut self) {
        self.slots.fill(FeatureSample::default());
        self.pos = 0;
    }

    pub fn capacity(&self) -> usize {
        self.slots.len()
    }
}
