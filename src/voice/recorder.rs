//! Recording controller
//!
//! Arms a [`CaptureDevice`], drains it into an ordered list of chunks on a
//! fixed cadence, and finalizes the chunks into one [`AudioBlob`] on stop.

use std::sync::{Arc, Mutex};
use std::time::Duration;

use thiserror::Error;
use tokio::task::JoinHandle;

use super::capture::{AudioBlob, CaptureDevice, CaptureStream, ChunkFormat, pcm16_to_wav};

/// Default interval between chunk drains (one second of audio)
pub const CHUNK_INTERVAL: Duration = Duration::from_secs(1);

/// Upper bound on drain calls during finalization
const MAX_FINAL_DRAINS: usize = 64;

/// Capture failures
#[derive(Debug, Error)]
pub enum CaptureError {
    /// Permission denied or no input device
    #[error("capture device unavailable: {0}")]
    DeviceUnavailable(String),

    /// Stop produced zero bytes of audio
    #[error("no audio data captured")]
    EmptyCapture,

    /// Stop called while nothing is recording
    #[error("not recording")]
    NotRecording,

    /// Captured audio could not be packaged
    #[error("failed to finalize capture: {0}")]
    Finalize(String),
}

/// Stream and the chunks drained from it, guarded together
///
/// Every drain takes the chunk and appends it under the same lock, and a
/// closed buffer never accepts another chunk.
struct CaptureBuffer {
    stream: Box<dyn CaptureStream>,
    chunks: Vec<Vec<u8>>,
    closed: bool,
}

impl CaptureBuffer {
    /// Move one chunk from the stream into the list; false when none was ready
    fn drain_once(&mut self) -> bool {
        if self.closed {
            return false;
        }

        let chunk = self.stream.take_chunk();
        if chunk.is_empty() {
            return false;
        }

        tracing::trace!(bytes = chunk.len(), "audio chunk captured");
        self.chunks.push(chunk);
        true
    }
}

type SharedBuffer = Arc<Mutex<CaptureBuffer>>;

struct ActiveCapture {
    buffer: SharedBuffer,
    ticker: JoinHandle<()>,
}

/// Owns the capture device for the duration of one recording
pub struct RecordingController {
    device: Arc<dyn CaptureDevice>,
    chunk_interval: Duration,
    active: Option<ActiveCapture>,
}

impl RecordingController {
    /// Create a controller draining every [`CHUNK_INTERVAL`]
    #[must_use]
    pub fn new(device: Arc<dyn CaptureDevice>) -> Self {
        Self::with_interval(device, CHUNK_INTERVAL)
    }

    /// Create a controller with a custom drain interval
    #[must_use]
    pub fn with_interval(device: Arc<dyn CaptureDevice>, chunk_interval: Duration) -> Self {
        Self {
            device,
            chunk_interval,
            active: None,
        }
    }

    /// Whether a recording is in progress
    #[must_use]
    pub const fn is_recording(&self) -> bool {
        self.active.is_some()
    }

    /// Number of chunks buffered so far
    #[must_use]
    pub fn chunk_count(&self) -> usize {
        self.active
            .as_ref()
            .and_then(|a| a.buffer.lock().ok().map(|b| b.chunks.len()))
            .unwrap_or_default()
    }

    /// Acquire the device and begin buffering
    ///
    /// Must be called from within a tokio runtime. Calling while already
    /// recording is a no-op.
    ///
    /// # Errors
    ///
    /// Returns [`CaptureError::DeviceUnavailable`] if the device cannot be
    /// acquired; no recording is started in that case
    pub fn start(&mut self) -> Result<(), CaptureError> {
        if self.active.is_some() {
            tracing::debug!("recording already in progress");
            return Ok(());
        }

        let stream = self.device.acquire().map_err(|e| {
            tracing::error!(error = %e, "failed to acquire capture device");
            CaptureError::DeviceUnavailable(e.to_string())
        })?;

        let buffer: SharedBuffer = Arc::new(Mutex::new(CaptureBuffer {
            stream,
            chunks: Vec::new(),
            closed: false,
        }));
        let ticker = spawn_ticker(Arc::clone(&buffer), self.chunk_interval);

        self.active = Some(ActiveCapture { buffer, ticker });
        tracing::info!("recording started");
        Ok(())
    }

    /// Release the device and finalize buffered audio into a single blob
    ///
    /// The device is released before this returns, whatever the outcome.
    ///
    /// # Errors
    ///
    /// Returns [`CaptureError::EmptyCapture`] if no audio was buffered, or
    /// [`CaptureError::NotRecording`] if no recording was in progress
    pub fn stop(&mut self) -> Result<AudioBlob, CaptureError> {
        let active = self.active.take().ok_or(CaptureError::NotRecording)?;
        active.ticker.abort();

        let (format, chunks) = {
            let mut buffer = active
                .buffer
                .lock()
                .map_err(|_| CaptureError::Finalize("capture buffer lock poisoned".to_string()))?;

            for _ in 0..MAX_FINAL_DRAINS {
                if !buffer.drain_once() {
                    break;
                }
            }

            buffer.closed = true;
            buffer.stream.release();
            (buffer.stream.format(), std::mem::take(&mut buffer.chunks))
        };

        let total: usize = chunks.iter().map(Vec::len).sum();
        tracing::info!(chunks = chunks.len(), bytes = total, "recording stopped");

        if total == 0 {
            return Err(CaptureError::EmptyCapture);
        }

        finalize(format, &chunks)
    }

    /// Stop and release the device if still held, discarding audio
    ///
    /// Safe to call any number of times.
    pub fn teardown(&mut self) {
        if let Some(active) = self.active.take() {
            active.ticker.abort();
            if let Ok(mut buffer) = active.buffer.lock() {
                buffer.closed = true;
                buffer.chunks.clear();
                buffer.stream.release();
            }
            tracing::debug!("recording torn down");
        }
    }
}

impl Drop for RecordingController {
    fn drop(&mut self) {
        self.teardown();
    }
}

/// Periodically move captured audio from the stream into the chunk list
fn spawn_ticker(buffer: SharedBuffer, interval: Duration) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval_at(tokio::time::Instant::now() + interval, interval);
        loop {
            ticker.tick().await;

            let Ok(mut guard) = buffer.lock() else {
                break;
            };
            if guard.closed {
                break;
            }
            guard.drain_once();
        }
    })
}

/// Join chunks into one blob according to the stream format
fn finalize(format: ChunkFormat, chunks: &[Vec<u8>]) -> Result<AudioBlob, CaptureError> {
    let joined = chunks.concat();

    match format {
        ChunkFormat::Pcm16 { sample_rate } => {
            let wav = pcm16_to_wav(&joined, sample_rate)
                .map_err(|e| CaptureError::Finalize(e.to_string()))?;
            Ok(AudioBlob::new(wav, "audio/wav"))
        }
        ChunkFormat::Encoded { content_type } => Ok(AudioBlob::new(joined, content_type)),
    }
}
