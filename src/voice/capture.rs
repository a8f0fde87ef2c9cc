//! Audio capture devices
//!
//! A [`CaptureDevice`] hands out exclusive [`CaptureStream`]s. Streams deliver
//! audio incrementally through [`CaptureStream::take_chunk`] and must stop
//! every underlying track when [`CaptureStream::release`] returns.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, mpsc};
use std::thread::JoinHandle;

use cpal::traits::{DeviceTrait, HostTrait, StreamTrait};
use cpal::{SampleFormat, SampleRate, StreamConfig};

use crate::{Error, Result};

/// Preferred sample rate for capture (16kHz for speech)
pub const SAMPLE_RATE: u32 = 16000;

/// A finalized piece of audio tagged with its MIME type
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AudioBlob {
    pub bytes: Vec<u8>,
    pub content_type: String,
}

impl AudioBlob {
    /// Create a new blob
    pub fn new(bytes: Vec<u8>, content_type: impl Into<String>) -> Self {
        Self {
            bytes,
            content_type: content_type.into(),
        }
    }

    /// Size in bytes
    #[must_use]
    pub fn len(&self) -> usize {
        self.bytes.len()
    }

    /// Whether the blob holds no audio at all
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.bytes.is_empty()
    }

    /// Upload filename matching the MIME type, e.g. `audio.wav`
    #[must_use]
    pub fn file_name(&self) -> String {
        format!("audio.{}", extension_for_mime(&self.content_type))
    }
}

/// Get file extension for an audio MIME type
///
/// Parameters such as `;codecs=opus` are ignored.
#[must_use]
pub fn extension_for_mime(mime_type: &str) -> &'static str {
    let base = mime_type.split(';').next().unwrap_or_default().trim();
    match base {
        "audio/mp4" | "audio/m4a" | "audio/x-m4a" => "m4a",
        "audio/wav" | "audio/x-wav" | "audio/wave" => "wav",
        "audio/webm" => "webm",
        "audio/ogg" => "ogg",
        "audio/flac" => "flac",
        _ => "mp3",
    }
}

/// How the bytes produced by a stream should be joined into one blob
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ChunkFormat {
    /// Raw little-endian 16-bit mono PCM; finalized by adding a WAV header
    Pcm16 { sample_rate: u32 },
    /// Already-encoded container chunks that concatenate cleanly
    Encoded { content_type: String },
}

/// Source of capture streams
pub trait CaptureDevice: Send + Sync {
    /// Request exclusive access to the device
    ///
    /// # Errors
    ///
    /// Returns error if permission is denied or no device exists
    fn acquire(&self) -> Result<Box<dyn CaptureStream>>;
}

/// An armed capture stream
pub trait CaptureStream: Send {
    /// Encoding of the chunks returned by [`Self::take_chunk`]
    fn format(&self) -> ChunkFormat;

    /// Drain the audio captured since the previous call
    ///
    /// Returns an empty vector when nothing new is buffered.
    fn take_chunk(&mut self) -> Vec<u8>;

    /// Stop all tracks and give the device back. Idempotent.
    fn release(&mut self);
}

/// Default system microphone
#[derive(Debug, Clone, Default)]
pub struct Microphone {
    preferred_device: Option<String>,
}

impl Microphone {
    /// Use the system default input device
    #[must_use]
    pub const fn new() -> Self {
        Self {
            preferred_device: None,
        }
    }

    /// Prefer an input device by name, falling back to the default
    #[must_use]
    pub fn with_device(name: impl Into<String>) -> Self {
        Self {
            preferred_device: Some(name.into()),
        }
    }
}

impl CaptureDevice for Microphone {
    fn acquire(&self) -> Result<Box<dyn CaptureStream>> {
        let stream = MicrophoneStream::open(self.preferred_device.clone())?;
        Ok(Box::new(stream))
    }
}

/// Live microphone stream
///
/// `cpal::Stream` is `!Send`, so it is built, played and dropped on a
/// dedicated thread. This handle only owns the shared sample buffer and the
/// means to stop and join that thread.
pub struct MicrophoneStream {
    buffer: Arc<Mutex<Vec<f32>>>,
    running: Arc<AtomicBool>,
    stop_tx: Option<mpsc::Sender<()>>,
    thread: Option<JoinHandle<()>>,
    sample_rate: u32,
}

impl MicrophoneStream {
    fn open(preferred_device: Option<String>) -> Result<Self> {
        let buffer = Arc::new(Mutex::new(Vec::new()));
        let running = Arc::new(AtomicBool::new(true));
        let (ready_tx, ready_rx) = mpsc::channel::<Result<u32>>();
        let (stop_tx, stop_rx) = mpsc::channel::<()>();

        let thread_buffer = Arc::clone(&buffer);
        let thread_running = Arc::clone(&running);
        let thread = std::thread::Builder::new()
            .name("keyvoice-capture".to_string())
            .spawn(move || {
                let stream = match build_input_stream(
                    preferred_device.as_deref(),
                    thread_buffer,
                    thread_running,
                ) {
                    Ok((stream, sample_rate)) => {
                        let _ = ready_tx.send(Ok(sample_rate));
                        stream
                    }
                    Err(e) => {
                        let _ = ready_tx.send(Err(e));
                        return;
                    }
                };

                // Park until released or the handle is dropped
                let _ = stop_rx.recv();
                drop(stream);
                tracing::debug!("audio capture stopped");
            })?;

        let sample_rate = match ready_rx.recv() {
            Ok(Ok(rate)) => rate,
            Ok(Err(e)) => {
                let _ = thread.join();
                return Err(e);
            }
            Err(_) => {
                let _ = thread.join();
                return Err(Error::Audio("capture thread exited unexpectedly".to_string()));
            }
        };

        tracing::debug!(sample_rate, "audio capture started");

        Ok(Self {
            buffer,
            running,
            stop_tx: Some(stop_tx),
            thread: Some(thread),
            sample_rate,
        })
    }
}

impl CaptureStream for MicrophoneStream {
    fn format(&self) -> ChunkFormat {
        ChunkFormat::Pcm16 {
            sample_rate: self.sample_rate,
        }
    }

    fn take_chunk(&mut self) -> Vec<u8> {
        let samples = self
            .buffer
            .lock()
            .map(|mut buf| std::mem::take(&mut *buf))
            .unwrap_or_default();

        samples_to_pcm16(&samples)
    }

    fn release(&mut self) {
        self.running.store(false, Ordering::Release);

        if let Some(tx) = self.stop_tx.take() {
            let _ = tx.send(());
        }
        if let Some(thread) = self.thread.take() {
            if thread.join().is_err() {
                tracing::warn!("capture thread panicked during release");
            }
        }
    }
}

impl Drop for MicrophoneStream {
    fn drop(&mut self) {
        self.release();
    }
}

/// Open an input device and start streaming mono f32 samples into `buffer`
fn build_input_stream(
    preferred_device: Option<&str>,
    buffer: Arc<Mutex<Vec<f32>>>,
    running: Arc<AtomicBool>,
) -> Result<(cpal::Stream, u32)> {
    let host = cpal::default_host();

    let preferred = preferred_device.and_then(|name| {
        let found = host
            .input_devices()
            .ok()?
            .find(|d| d.name().is_ok_and(|n| n == name));
        if found.is_none() {
            tracing::warn!(device = name, "preferred input device not found, falling back");
        }
        found
    });

    let device = preferred
        .or_else(|| host.default_input_device())
        .ok_or_else(|| Error::Audio("no input device available".to_string()))?;

    // Prefer 16kHz mono, otherwise take whatever the device offers and downmix
    let supported = device
        .supported_input_configs()
        .map_err(|e| Error::Audio(e.to_string()))?
        .find(|c| {
            c.channels() == 1
                && c.sample_format() == SampleFormat::F32
                && c.min_sample_rate() <= SampleRate(SAMPLE_RATE)
                && c.max_sample_rate() >= SampleRate(SAMPLE_RATE)
        })
        .map(|c| c.with_sample_rate(SampleRate(SAMPLE_RATE)));

    let supported = match supported {
        Some(c) => c,
        None => device
            .default_input_config()
            .map_err(|e| Error::Audio(e.to_string()))?,
    };

    let sample_rate = supported.sample_rate().0;
    let channels = usize::from(supported.channels());
    let config = StreamConfig {
        channels: supported.channels(),
        sample_rate: SampleRate(sample_rate),
        buffer_size: cpal::BufferSize::Default,
    };

    tracing::debug!(
        device = device.name().unwrap_or_default(),
        sample_rate,
        channels,
        "opening input device"
    );

    let on_error = |err: cpal::StreamError| tracing::error!(error = %err, "audio capture error");

    let stream = match supported.sample_format() {
        SampleFormat::F32 => device.build_input_stream(
            &config,
            move |data: &[f32], _: &cpal::InputCallbackInfo| {
                if !running.load(Ordering::Relaxed) {
                    return;
                }
                if let Ok(mut buf) = buffer.lock() {
                    push_downmixed(&mut buf, data, channels, |s| s);
                }
            },
            on_error,
            None,
        ),
        SampleFormat::I16 => device.build_input_stream(
            &config,
            move |data: &[i16], _: &cpal::InputCallbackInfo| {
                if !running.load(Ordering::Relaxed) {
                    return;
                }
                if let Ok(mut buf) = buffer.lock() {
                    push_downmixed(&mut buf, data, channels, |s| f32::from(s) / 32768.0);
                }
            },
            on_error,
            None,
        ),
        other => {
            return Err(Error::Audio(format!("unsupported sample format: {other:?}")));
        }
    }
    .map_err(|e| Error::Audio(e.to_string()))?;

    stream.play().map_err(|e| Error::Audio(e.to_string()))?;
    Ok((stream, sample_rate))
}

/// Append interleaved frames to `out` as mono f32
#[allow(clippy::cast_precision_loss)]
fn push_downmixed<T: Copy>(out: &mut Vec<f32>, data: &[T], channels: usize, to_f32: impl Fn(T) -> f32) {
    if channels <= 1 {
        out.extend(data.iter().map(|&s| to_f32(s)));
        return;
    }

    out.extend(
        data.chunks(channels)
            .map(|frame| frame.iter().map(|&s| to_f32(s)).sum::<f32>() / frame.len() as f32),
    );
}

/// Convert f32 samples in [-1.0, 1.0] to little-endian 16-bit PCM bytes
#[must_use]
pub fn samples_to_pcm16(samples: &[f32]) -> Vec<u8> {
    let mut bytes = Vec::with_capacity(samples.len() * 2);
    for &sample in samples {
        #[allow(clippy::cast_possible_truncation)]
        let sample_i16 = (sample * 32767.0).clamp(-32768.0, 32767.0) as i16;
        bytes.extend_from_slice(&sample_i16.to_le_bytes());
    }
    bytes
}

/// Wrap little-endian 16-bit mono PCM in a WAV container
///
/// # Errors
///
/// Returns error if WAV encoding fails
pub fn pcm16_to_wav(pcm: &[u8], sample_rate: u32) -> Result<Vec<u8>> {
    let spec = hound::WavSpec {
        channels: 1,
        sample_rate,
        bits_per_sample: 16,
        sample_format: hound::SampleFormat::Int,
    };

    let mut cursor = std::io::Cursor::new(Vec::new());
    {
        let mut writer =
            hound::WavWriter::new(&mut cursor, spec).map_err(|e| Error::Audio(e.to_string()))?;

        for pair in pcm.chunks_exact(2) {
            writer
                .write_sample(i16::from_le_bytes([pair[0], pair[1]]))
                .map_err(|e| Error::Audio(e.to_string()))?;
        }

        writer.finalize().map_err(|e| Error::Audio(e.to_string()))?;
    }

    Ok(cursor.into_inner())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_extension_for_mime() {
        assert_eq!(extension_for_mime("audio/mpeg"), "mp3");
        assert_eq!(extension_for_mime("audio/wav"), "wav");
        assert_eq!(extension_for_mime("audio/webm;codecs=opus"), "webm");
        assert_eq!(extension_for_mime("audio/ogg"), "ogg");
        assert_eq!(extension_for_mime("application/octet-stream"), "mp3");
    }

    #[test]
    fn test_blob_file_name() {
        let blob = AudioBlob::new(vec![1, 2, 3], "audio/webm");
        assert_eq!(blob.file_name(), "audio.webm");
        assert_eq!(blob.len(), 3);
        assert!(!blob.is_empty());
    }

    #[test]
    fn test_samples_to_pcm16() {
        let bytes = samples_to_pcm16(&[0.0, 1.0, -1.0]);
        assert_eq!(bytes.len(), 6);
        assert_eq!(i16::from_le_bytes([bytes[0], bytes[1]]), 0);
        assert_eq!(i16::from_le_bytes([bytes[2], bytes[3]]), 32767);
        assert_eq!(i16::from_le_bytes([bytes[4], bytes[5]]), -32767);
    }

    #[test]
    fn test_downmix_stereo() {
        let mut out = Vec::new();
        push_downmixed(&mut out, &[0.5f32, -0.5, 1.0, 0.0], 2, |s| s);
        assert_eq!(out, vec![0.0, 0.5]);
    }

    #[test]
    fn test_pcm16_to_wav() {
        let pcm = samples_to_pcm16(&[0.0, 0.5, -0.5, 0.25]);
        let wav = pcm16_to_wav(&pcm, SAMPLE_RATE).unwrap();

        assert_eq!(&wav[0..4], b"RIFF");
        assert_eq!(&wav[8..12], b"WAVE");

        let mut reader = hound::WavReader::new(std::io::Cursor::new(wav)).unwrap();
        assert_eq!(reader.spec().sample_rate, SAMPLE_RATE);
        assert_eq!(reader.spec().channels, 1);
        let samples: Vec<i16> = reader.samples::<i16>().map(|s| s.unwrap()).collect();
        assert_eq!(samples.len(), 4);
    }
}
