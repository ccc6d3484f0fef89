//! Exclusive access to the one physical microphone.
//!
//! The wake listener and the recorder must never read concurrently. Reads go
//! through a `MicLease`, and only one lease exists at a time: the application
//! stops listening (dropping the listener's lease) before recording, and
//! restarts listening once the recorder's lease is gone.

use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;
use tracing::{debug, warn};

use super::{AudioFormat, AudioSource, MicOwner};
use crate::error::PeripheralError;

/// Cloneable handle shared by every consumer of the microphone.
#[derive(Clone)]
pub struct SharedMicrophone {
    inner: Arc<Inner>,
}

struct Inner {
    source: Arc<dyn AudioSource>,
    holder: Mutex<Option<MicOwner>>,
}

impl SharedMicrophone {
    pub fn new(source: Arc<dyn AudioSource>) -> Self {
        Self {
            inner: Arc::new(Inner {
                source,
                holder: Mutex::new(None),
            }),
        }
    }

    /// Configure the peripheral and take exclusive ownership.
    /// Fails with `Busy` while another lease is alive.
    pub fn acquire(&self, owner: MicOwner, format: AudioFormat) -> Result<MicLease, PeripheralError> {
        let mut holder = self.inner.holder.lock();
        if let Some(current) = *holder {
            warn!(requested_by = %owner, held_by = %current, "mic_acquire_refused");
            return Err(PeripheralError::Busy { holder: current });
        }
        self.inner.source.configure(format)?;
        *holder = Some(owner);
        debug!(owner = %owner, sample_rate = format.sample_rate, "mic_acquired");
        Ok(MicLease {
            inner: Arc::clone(&self.inner),
            owner,
        })
    }

    /// Current lease holder, if any.
    pub fn holder(&self) -> Option<MicOwner> {
        *self.inner.holder.lock()
    }
}

/// Proof of exclusive microphone ownership. Dropping it releases the peripheral.
pub struct MicLease {
    inner: Arc<Inner>,
    owner: MicOwner,
}

impl MicLease {
    pub fn owner(&self) -> MicOwner {
        self.owner
    }

    #[inline]
    pub fn read_frame(&self, buf: &mut [i16], timeout: Duration) -> Result<usize, PeripheralError> {
        self.inner.source.read_frame(buf, timeout)
    }
}

impl Drop for MicLease {
    fn drop(&mut self) {
        self.inner.source.release();
        *self.inner.holder.lock() = None;
        debug!(owner = %self.owner, "mic_released");
    }
}
