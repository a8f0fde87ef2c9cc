//! Shared test utilities

#![allow(dead_code)]

use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use keyvoice::voice::{
    AudioBlob, CaptureDevice, CaptureStream, ChunkFormat, Synthesizer, TranscriptResult,
    Transcriber,
};
use keyvoice::{
    App, Error, KeywordDictionary, MemoryStore, PipelineOptions, Result, StorageGateway,
    VoicePipeline,
};

/// Public base URL used by every test gateway
pub const BASE_URL: &str = "https://pub.example.dev";

/// Transcriber that replays a fixed script, one line per call
#[derive(Default)]
pub struct ScriptedTranscriber {
    lines: Mutex<VecDeque<String>>,
    calls: AtomicUsize,
}

impl ScriptedTranscriber {
    pub fn new(lines: &[&str]) -> Self {
        Self {
            lines: Mutex::new(lines.iter().map(|l| (*l).to_string()).collect()),
            calls: AtomicUsize::new(0),
        }
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl Transcriber for ScriptedTranscriber {
    async fn transcribe(&self, audio: &AudioBlob, _language: &str) -> Result<TranscriptResult> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        assert!(!audio.is_empty(), "empty blobs must never reach transcription");

        let next = self.lines.lock().expect("script lock").pop_front();
        next.map(|text| TranscriptResult { text })
            .ok_or_else(|| Error::Stt("no scripted transcript left".to_string()))
    }

    fn name(&self) -> &'static str {
        "scripted"
    }
}

/// Synthesizer returning a fake MP3 frame tagged with the input text
#[derive(Default)]
pub struct FixedSynthesizer {
    calls: AtomicUsize,
    texts: Mutex<Vec<String>>,
}

impl FixedSynthesizer {
    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    pub fn texts(&self) -> Vec<String> {
        self.texts.lock().expect("texts lock").clone()
    }
}

#[async_trait]
impl Synthesizer for FixedSynthesizer {
    async fn synthesize(&self, text: &str, _voice: &str, _language: &str) -> Result<Vec<u8>> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.texts.lock().expect("texts lock").push(text.to_string());

        let mut audio = vec![0xFF, 0xFB, 0x90, 0x00];
        audio.extend_from_slice(text.as_bytes());
        Ok(audio)
    }

    fn name(&self) -> &'static str {
        "fixed"
    }
}

/// Capture stream yielding pre-recorded chunks
pub struct ScriptedStream {
    chunks: VecDeque<Vec<u8>>,
    released: Arc<AtomicBool>,
}

impl CaptureStream for ScriptedStream {
    fn format(&self) -> ChunkFormat {
        ChunkFormat::Encoded {
            content_type: "audio/webm".to_string(),
        }
    }

    fn take_chunk(&mut self) -> Vec<u8> {
        self.chunks.pop_front().unwrap_or_default()
    }

    fn release(&mut self) {
        self.released.store(true, Ordering::SeqCst);
    }
}

/// Capture device handing out [`ScriptedStream`]s
pub struct ScriptedCaptureDevice {
    chunks: Vec<Vec<u8>>,
    available: bool,
    released: Arc<AtomicBool>,
}

impl ScriptedCaptureDevice {
    pub fn new(chunks: Vec<Vec<u8>>) -> Self {
        Self {
            chunks,
            available: true,
            released: Arc::new(AtomicBool::new(false)),
        }
    }

    pub fn denied() -> Self {
        Self {
            available: false,
            ..Self::new(Vec::new())
        }
    }

    pub fn released(&self) -> bool {
        self.released.load(Ordering::SeqCst)
    }
}

impl CaptureDevice for ScriptedCaptureDevice {
    fn acquire(&self) -> Result<Box<dyn CaptureStream>> {
        if !self.available {
            return Err(Error::Audio("permission denied".to_string()));
        }
        self.released.store(false, Ordering::SeqCst);
        Ok(Box::new(ScriptedStream {
            chunks: self.chunks.clone().into(),
            released: Arc::clone(&self.released),
        }))
    }
}

/// App wired to in-process fakes
pub struct TestApp {
    pub app: App,
    pub store: Arc<MemoryStore>,
    pub transcriber: Arc<ScriptedTranscriber>,
    pub synthesizer: Arc<FixedSynthesizer>,
}

/// Build an app over the default dictionary and an empty memory store
pub fn test_app(transcripts: &[&str]) -> TestApp {
    let store = Arc::new(MemoryStore::new());
    let transcriber = Arc::new(ScriptedTranscriber::new(transcripts));
    let synthesizer = Arc::new(FixedSynthesizer::default());

    let pipeline = Arc::new(VoicePipeline::new(
        transcriber.clone(),
        synthesizer.clone(),
        Arc::new(KeywordDictionary::default()),
        PipelineOptions::default(),
    ));
    let gateway = StorageGateway::new(store.clone(), BASE_URL);

    TestApp {
        app: App::new(pipeline, gateway),
        store,
        transcriber,
        synthesizer,
    }
}

/// A 3200-byte recorded blob (100 ms of 16 kHz mono PCM)
pub fn recorded_blob() -> AudioBlob {
    AudioBlob::new(vec![0x11; 3200], "audio/webm")
}
