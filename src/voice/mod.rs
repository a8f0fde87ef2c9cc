//! Voice processing module
//!
//! Handles audio capture and recording, speech-to-text, text-to-speech and
//! playback of synthesized clips.

mod capture;
mod playback;
mod recorder;
mod stt;
mod tts;

pub use capture::{
    AudioBlob, CaptureDevice, CaptureStream, ChunkFormat, Microphone, MicrophoneStream,
    SAMPLE_RATE, extension_for_mime, pcm16_to_wav, samples_to_pcm16,
};
pub use playback::{ClipPlayer, DecodedClip, decode_mp3, resample_linear};
pub use recorder::{CHUNK_INTERVAL, CaptureError, RecordingController};
pub use stt::{SpeechToText, SttProvider, TranscriptResult, Transcriber};
pub use tts::{Synthesizer, TextToSpeech, TtsProvider};
