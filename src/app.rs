//! Composition root
//!
//! Every external client is constructed here, once, and injected into the
//! storage gateway and voice pipeline.

use std::sync::Arc;

use secrecy::{ExposeSecret, SecretString};

use crate::config::{ApiKeys, Config, StorageBackend, StorageConfig, VoiceConfig};
use crate::keywords::KeywordDictionary;
use crate::pipeline::VoicePipeline;
use crate::presentation::Presenter;
use crate::session::Session;
use crate::storage::{MemoryStore, ObjectStore, S3Store, StorageGateway};
use crate::voice::{SpeechToText, SttProvider, Synthesizer, TextToSpeech, Transcriber, TtsProvider};
use crate::Result;

/// Wired-up pipeline and gateway shared by every session
#[derive(Clone)]
pub struct App {
    pipeline: Arc<VoicePipeline>,
    gateway: StorageGateway,
}

impl App {
    /// Assemble from already-built parts
    #[must_use]
    pub const fn new(pipeline: Arc<VoicePipeline>, gateway: StorageGateway) -> Self {
        Self { pipeline, gateway }
    }

    /// Build every client from configuration
    ///
    /// # Errors
    ///
    /// Returns error if storage settings or provider API keys are missing or invalid
    pub fn from_config(config: &Config) -> Result<Self> {
        let dictionary = Arc::new(config.dictionary()?);
        let transcriber = build_transcriber(&config.voice, &config.api_keys)?;
        let synthesizer = build_synthesizer(&config.voice, &config.api_keys)?;

        tracing::info!(
            stt = transcriber.name(),
            tts = synthesizer.name(),
            keywords = dictionary.entries().len(),
            "voice pipeline configured"
        );

        let pipeline = Arc::new(VoicePipeline::new(
            transcriber,
            synthesizer,
            dictionary,
            config.voice.pipeline_options(),
        ));

        let store = build_store(&config.storage)?;
        let gateway = StorageGateway::new(store, config.storage.playback_base_url()?);

        Ok(Self::new(pipeline, gateway))
    }

    /// Shared voice pipeline
    #[must_use]
    pub const fn pipeline(&self) -> &Arc<VoicePipeline> {
        &self.pipeline
    }

    /// Shared storage gateway
    #[must_use]
    pub const fn gateway(&self) -> &StorageGateway {
        &self.gateway
    }

    /// Keyword dictionary in match order
    #[must_use]
    pub fn dictionary(&self) -> &KeywordDictionary {
        self.pipeline.dictionary()
    }

    /// Start a new idle session reporting to `presenter`
    #[must_use]
    pub fn session(&self, presenter: Arc<dyn Presenter>) -> Session {
        Session::new(Arc::clone(&self.pipeline), self.gateway.clone(), presenter)
    }
}

fn build_store(storage: &StorageConfig) -> Result<Arc<dyn ObjectStore>> {
    match storage.backend {
        StorageBackend::S3 => Ok(Arc::new(S3Store::new(&storage.s3_settings()?))),
        StorageBackend::Memory => {
            tracing::warn!("using in-memory storage, artifacts are lost on exit");
            Ok(Arc::new(MemoryStore::new()))
        }
    }
}

fn build_transcriber(voice: &VoiceConfig, keys: &ApiKeys) -> Result<Arc<dyn Transcriber>> {
    let key = match voice.stt_provider {
        SttProvider::Whisper => keys.openai.as_ref(),
        SttProvider::Deepgram => keys.deepgram.as_ref(),
    };
    let stt = SpeechToText::new(voice.stt_provider, owned_key(key), voice.stt_model.clone())?;
    Ok(Arc::new(stt))
}

fn build_synthesizer(voice: &VoiceConfig, keys: &ApiKeys) -> Result<Arc<dyn Synthesizer>> {
    let tts = match voice.tts_provider {
        TtsProvider::OpenAI => TextToSpeech::new_openai(
            owned_key(keys.openai.as_ref()),
            voice.tts_model.clone(),
            voice.tts_speed,
        )?,
        TtsProvider::ElevenLabs => TextToSpeech::new_elevenlabs(
            owned_key(keys.elevenlabs.as_ref()),
            voice.tts_model.clone(),
        )?,
    };
    Ok(Arc::new(tts))
}

/// Copy a configured key; a missing key becomes empty and is rejected by the provider
fn owned_key(key: Option<&SecretString>) -> SecretString {
    SecretString::from(key.map(|k| k.expose_secret().to_string()).unwrap_or_default())
}
