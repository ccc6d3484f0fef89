//! cpal-backed microphone.
//!
//! The cpal stream lives on its own `mic-stream` thread for its whole
//! lifetime (streams are not `Send` on every platform). The audio callback
//! only writes into the ring buffer and wakes any waiting reader.
//! `release()` stops accepting samples but keeps the stream installed, so
//! the next `configure()` with the same format is instant.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread::JoinHandle;
use std::time::{Duration, Instant};

use crossbeam_channel as cb;
use parking_lot::{Condvar, Mutex};
use tracing::{debug, error, info, warn};

use super::ring_buffer::RingBuffer;
use super::{AudioFormat, AudioSource};
use crate::error::PeripheralError;

const STREAM_START_TIMEOUT: Duration = Duration::from_secs(2);

/// State shared between the cpal callback and frame readers.
struct CaptureShared {
    ring: Mutex<RingBuffer>,
    data_ready: Condvar,
    accepting: AtomicBool,
}

struct StreamThread {
    format: AudioFormat,
    shutdown_tx: cb::Sender<()>,
    handle: JoinHandle<()>,
}

pub struct CpalMicrophone {
    shared: Arc<CaptureShared>,
    stream: Mutex<Option<StreamThread>>,
}

impl CpalMicrophone {
    /// `buffer_secs` of audio are kept between callback and reader.
    pub fn new(sample_rate: u32, buffer_secs: f32) -> Self {
        Self {
            shared: Arc::new(CaptureShared {
                ring: Mutex::new(RingBuffer::new(sample_rate, buffer_secs)),
                data_ready: Condvar::new(),
                accepting: AtomicBool::new(false),
            }),
            stream: Mutex::new(None),
        }
    }

    pub fn is_active(&self) -> bool {
        self.shared.accepting.load(Ordering::SeqCst)
    }

    /// Tear down the stream and its thread. Unlike `release`, the next
    /// `configure` rebuilds the device stream.
    pub fn shutdown(&self) {
        self.shared.accepting.store(false, Ordering::SeqCst);
        self.shared.data_ready.notify_all();
        if let Some(stream) = self.stream.lock().take() {
            let _ = stream.shutdown_tx.send(());
            if stream.handle.join().is_err() {
                error!("mic-stream thread panicked");
            }
            info!("microphone shut down");
        }
    }

    fn spawn_stream(&self, format: AudioFormat) -> Result<StreamThread, PeripheralError> {
        let (ready_tx, ready_rx) = cb::bounded::<Result<(), PeripheralError>>(1);
        let (shutdown_tx, shutdown_rx) = cb::bounded::<()>(1);
        let shared = Arc::clone(&self.shared);

        let handle = std::thread::Builder::new()
            .name("mic-stream".into())
            .spawn(move || {
                let stream = match build_input_stream(format, shared) {
                    Ok(stream) => {
                        let _ = ready_tx.send(Ok(()));
                        stream
                    }
                    Err(e) => {
                        let _ = ready_tx.send(Err(e));
                        return;
                    }
                };
                // Park until shutdown; dropping the stream stops capture.
                let _ = shutdown_rx.recv();
                drop(stream);
                info!("audio capture stream stopped");
            })
            .map_err(|e| PeripheralError::Stream(format!("failed to spawn mic-stream thread: {e}")))?;

        match ready_rx.recv_timeout(STREAM_START_TIMEOUT) {
            Ok(Ok(())) => Ok(StreamThread {
                format,
                shutdown_tx,
                handle,
            }),
            Ok(Err(e)) => {
                let _ = handle.join();
                Err(e)
            }
            Err(_) => {
                warn!("audio stream did not start in time");
                let _ = shutdown_tx.send(());
                Err(PeripheralError::Timeout)
            }
        }
    }
}

impl AudioSource for CpalMicrophone {
    fn configure(&self, format: AudioFormat) -> Result<(), PeripheralError> {
        if format.bits_per_sample != 16 {
            return Err(PeripheralError::IncompatibleMode);
        }
        let mut stream = self.stream.lock();
        match stream.as_ref() {
            Some(active) if active.format == format => {
                debug!("microphone already active, reusing stream");
            }
            Some(active) => {
                warn!(
                    active_rate = active.format.sample_rate,
                    requested_rate = format.sample_rate,
                    "microphone active in another format"
                );
                return Err(PeripheralError::IncompatibleMode);
            }
            None => *stream = Some(self.spawn_stream(format)?),
        }
        self.shared.ring.lock().clear();
        self.shared.accepting.store(true, Ordering::SeqCst);
        Ok(())
    }

    fn read_frame(&self, buf: &mut [i16], timeout: Duration) -> Result<usize, PeripheralError> {
        if !self.shared.accepting.load(Ordering::SeqCst) {
            return Err(PeripheralError::NotActive);
        }
        let deadline = Instant::now() + timeout;
        let mut ring = self.shared.ring.lock();
        while ring.available() < buf.len() {
            if self
                .shared
                .data_ready
                .wait_until(&mut ring, deadline)
                .timed_out()
            {
                break;
            }
            if !self.shared.accepting.load(Ordering::SeqCst) {
                return Ok(0);
            }
        }
        Ok(ring.read(buf))
    }

    fn release(&self) {
        self.shared.accepting.store(false, Ordering::SeqCst);
        self.shared.ring.lock().clear();
        self.shared.data_ready.notify_all();
    }
}

impl Drop for CpalMicrophone {
    fn drop(&mut self) {
        self.shutdown();
    }
}

/// Build and start the cpal input stream.
fn build_input_stream(
    format: AudioFormat,
    shared: Arc<CaptureShared>,
) -> Result<cpal::Stream, PeripheralError> {
    use cpal::traits::{DeviceTrait, HostTrait, StreamTrait};

    let host = cpal::default_host();
    let device = host
        .default_input_device()
        .ok_or(PeripheralError::NoDevice)?;

    let stream_config = cpal::StreamConfig {
        channels: format.channels,
        sample_rate: cpal::SampleRate(format.sample_rate),
        buffer_size: cpal::BufferSize::Default,
    };

    let stream = device
        .build_input_stream(
            &stream_config,
            move |data: &[i16], _: &cpal::InputCallbackInfo| {
                // Audio callback: write to ring buffer only. No allocation.
                if !shared.accepting.load(Ordering::Relaxed) {
                    return;
                }
                shared.ring.lock().write(data);
                shared.data_ready.notify_one();
            },
            |err| {
                error!(error = %err, "audio capture error");
            },
            None,
        )
        .map_err(|e| PeripheralError::Stream(format!("failed to build input stream: {e}")))?;

    stream
        .play()
        .map_err(|e| PeripheralError::Stream(format!("failed to start audio stream: {e}")))?;
    info!(
        sample_rate = format.sample_rate,
        channels = format.channels,
        "audio capture stream started"
    );

    Ok(stream)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn read_before_configure_is_not_active() {
        let mic = CpalMicrophone::new(16_000, 0.5);
        let mut buf = [0i16; 16];
        assert_eq!(
            mic.read_frame(&mut buf, Duration::from_millis(1)),
            Err(PeripheralError::NotActive)
        );
        assert!(!mic.is_active());
    }

    #[test]
    fn non_16_bit_format_is_rejected_without_touching_device() {
        let mic = CpalMicrophone::new(16_000, 0.5);
        let format = AudioFormat {
            bits_per_sample: 24,
            ..AudioFormat::default()
        };
        assert_eq!(mic.configure(format), Err(PeripheralError::IncompatibleMode));
    }
}
