//! Level-based voice activity detection for the recorder.
//! Mean absolute amplitude against a fixed threshold, plus a silence timeout
//! that ends the recording once the speaker stops.

/// Mean absolute amplitude of a chunk. Returns 0 for an empty chunk.
#[inline]
pub fn average_level(samples: &[i16]) -> i32 {
    if samples.is_empty() {
        return 0;
    }
    let sum: i64 = samples.iter().map(|&s| (s as i64).abs()).sum();
    (sum / samples.len() as i64) as i32
}

/// Voice/silence gate driven by chunk levels.
#[derive(Debug, Clone)]
pub struct LevelVad {
    threshold: i32,
    silence_ms: u64,
    last_sound_ms: u64,
    level: i32,
}

impl LevelVad {
    pub fn new(threshold: i32, silence_ms: u64) -> Self {
        Self {
            threshold,
            silence_ms,
            last_sound_ms: 0,
            level: 0,
        }
    }

    /// Strictly above the threshold counts as voice.
    #[inline]
    pub fn is_voice(&self, level: i32) -> bool {
        level > self.threshold
    }

    /// Strictly longer than the silence window has elapsed.
    #[inline]
    pub fn silence_timed_out(&self, last_sound_ms: u64, now_ms: u64) -> bool {
        now_ms.saturating_sub(last_sound_ms) > self.silence_ms
    }

    /// Start a new utterance window at `now_ms`.
    pub fn reset(&mut self, now_ms: u64) {
        self.last_sound_ms = now_ms;
        self.level = 0;
    }

    /// Update with one chunk. Returns `true` while the utterance should continue.
    pub fn process(&mut self, samples: &[i16], now_ms: u64) -> bool {
        self.level = average_level(samples);
        if self.is_voice(self.level) {
            self.last_sound_ms = now_ms;
            return true;
        }
        !self.silence_timed_out(self.last_sound_ms, now_ms)
    }

    pub fn level(&self) -> i32 {
        self.level
    }

    pub fn last_sound_ms(&self) -> u64 {
        self.last_sound_ms
    }
}
