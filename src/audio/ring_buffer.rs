//! Capture ring buffer: fixed pre-allocated circular buffer for PCM samples.
//! Sits between the cpal callback (writer) and the frame reader.

/// Fixed-size ring buffer for PCM i16 samples. Pre-allocated, never grows.
/// When full, writes overwrite the oldest unread samples.
pub struct RingBuffer {
    buffer: Box<[i16]>,
    write_pos: usize,
    read_pos: usize,
    len: usize,
}

impl RingBuffer {
    /// Create a ring buffer sized for `duration_secs` at `sample_rate` Hz, mono.
    pub fn new(sample_rate: u32, duration_secs: f32) -> Self {
        let capacity = ((sample_rate as f32 * duration_secs) as usize).max(1);
        Self::with_capacity(capacity)
    }

    pub fn with_capacity(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        Self {
            buffer: vec![0i16; capacity].into_boxed_slice(),
            write_pos: 0,
            read_pos: 0,
            len: 0,
        }
    }

    /// Write samples into the ring buffer. Overwrites oldest data if full.
    /// Called from the audio callback: no allocation.
    #[inline]
    pub fn write(&mut self, samples: &[i16]) {
        let capacity = self.buffer.len();
        for &s in samples {
            self.buffer[self.write_pos] = s;
            self.write_pos = (self.write_pos + 1) % capacity;
            if self.len == capacity {
                self.read_pos = (self.read_pos + 1) % capacity;
            } else {
                self.len += 1;
            }
        }
    }

    /// Read available samples into output buffer.
    /// Returns the number of samples actually read.
    #[inline]
    pub fn read(&mut self, output: &mut [i16]) -> usize {
        let capacity = self.buffer.len();
        let to_read = output.len().min(self.len);
        for slot in output.iter_mut().take(to_read) {
            *slot = self.buffer[self.read_pos];
            self.read_pos = (self.read_pos + 1) % capacity;
        }
        self.len -= to_read;
        to_read
    }

    /// Number of unread samples available.
    #[inline]
    pub fn available(&self) -> usize {
        self.len
    }

    pub fn capacity(&self) -> usize {
        self.buffer.len()
    }

    /// Discard unread data.
    pub fn clear(&mut self) {
        self.read_pos = self.write_pos;
        self.len = 0;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sized_from_duration() {
        assert_eq!(RingBuffer::new(16_000, 0.5).capacity(), 8000);
    }

    #[test]
    fn reads_in_write_order() {
        let mut rb = RingBuffer::with_capacity(8);
        rb.write(&[1, 2, 3]);
        let mut out = [0i16; 2];
        assert_eq!(rb.read(&mut out), 2);
        assert_eq!(out, [1, 2]);
        rb.write(&[4, 5]);
        let mut out = [0i16; 8];
        assert_eq!(rb.read(&mut out), 3);
        assert_eq!(&out[..3], &[3, 4, 5]);
        assert_eq!(rb.available(), 0);
    }

    #[test]
    fn overflow_keeps_newest_samples() {
        let mut rb = RingBuffer::with_capacity(4);
        rb.write(&[1, 2, 3, 4, 5, 6]);
        assert_eq!(rb.available(), 4);
        let mut out = [0i16; 4];
        assert_eq!(rb.read(&mut out), 4);
        assert_eq!(out, [3, 4, 5, 6]);
    }

    #[test]
    fn clear_discards_unread() {
        let mut rb = RingBuffer::with_capacity(4);
        rb.write(&[1, 2, 3]);
        rb.clear();
        assert_eq!(rb.available(), 0);
        rb.write(&[9]);
        let mut out = [0i16; 2];
        assert_eq!(rb.read(&mut out), 1);
        assert_eq!(out[0], 9);
    }
}
