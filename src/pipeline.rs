//! Voice pipeline
//!
//! One run takes a recorded blob through transcription, keyword matching and
//! speech synthesis. Every step is a single attempt; the first failure ends
//! the run.

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use thiserror::Error;

use crate::keywords::KeywordDictionary;
use crate::voice::{AudioBlob, Synthesizer, Transcriber};

/// Default bound on each provider call
pub const DEFAULT_PROVIDER_TIMEOUT: Duration = Duration::from_secs(30);

/// Why a pipeline run produced no audio
#[derive(Debug, Error)]
pub enum PipelineError {
    /// The transcription provider failed or timed out
    #[error("transcription failed: {0}")]
    TranscriptionFailed(String),

    /// The transcript mentions none of the dictionary triggers
    #[error("No keywords found in the transcription.")]
    NoKeywordMatched { transcript: String },

    /// The synthesis provider failed or timed out
    #[error("speech synthesis failed: {0}")]
    SynthesisFailed(String),
}

impl PipelineError {
    /// Whether this is an expected outcome rather than a transport failure
    #[must_use]
    pub const fn is_expected(&self) -> bool {
        matches!(self, Self::NoKeywordMatched { .. })
    }
}

/// Fixed request parameters for every run
#[derive(Debug, Clone)]
pub struct PipelineOptions {
    /// Spoken language hint (ISO 639-1)
    pub language: String,
    /// Voice profile used for synthesis
    pub voice: String,
    /// Upper bound on each provider call
    pub timeout: Duration,
}

impl Default for PipelineOptions {
    fn default() -> Self {
        Self {
            language: "en".to_string(),
            voice: "alloy".to_string(),
            timeout: DEFAULT_PROVIDER_TIMEOUT,
        }
    }
}

/// Successful run result
#[derive(Debug, Clone)]
pub struct PipelineOutput {
    /// Matched trigger word
    pub trigger: String,
    /// Synthesized MP3 audio
    pub audio: Vec<u8>,
    /// Transcript the trigger was found in
    pub transcript: String,
}

/// Transcribe, match, synthesize
pub struct VoicePipeline {
    transcriber: Arc<dyn Transcriber>,
    synthesizer: Arc<dyn Synthesizer>,
    dictionary: Arc<KeywordDictionary>,
    options: PipelineOptions,
}

impl VoicePipeline {
    /// Create a new pipeline from injected providers
    #[must_use]
    pub fn new(
        transcriber: Arc<dyn Transcriber>,
        synthesizer: Arc<dyn Synthesizer>,
        dictionary: Arc<KeywordDictionary>,
        options: PipelineOptions,
    ) -> Self {
        Self {
            transcriber,
            synthesizer,
            dictionary,
            options,
        }
    }

    /// The dictionary this pipeline matches against
    #[must_use]
    pub fn dictionary(&self) -> &KeywordDictionary {
        &self.dictionary
    }

    /// Run options
    #[must_use]
    pub const fn options(&self) -> &PipelineOptions {
        &self.options
    }

    /// Run one blob through the pipeline
    ///
    /// # Errors
    ///
    /// Returns the [`PipelineError`] of the first step that failed
    pub async fn run(&self, audio: &AudioBlob) -> Result<PipelineOutput, PipelineError> {
        tracing::debug!(
            bytes = audio.len(),
            content_type = %audio.content_type,
            stt = self.transcriber.name(),
            "pipeline run started"
        );

        let transcript = bounded(
            self.options.timeout,
            self.transcriber.transcribe(audio, &self.options.language),
        )
        .await
        .map_err(PipelineError::TranscriptionFailed)?
        .text;

        let Some(entry) = self.dictionary.find_match(&transcript) else {
            tracing::info!(transcript = %transcript, "no keyword in transcript");
            return Err(PipelineError::NoKeywordMatched { transcript });
        };

        tracing::info!(trigger = %entry.trigger, "keyword matched");

        let audio = bounded(
            self.options.timeout,
            self.synthesizer
                .synthesize(&entry.response, &self.options.voice, &self.options.language),
        )
        .await
        .map_err(PipelineError::SynthesisFailed)?;

        Ok(PipelineOutput {
            trigger: entry.trigger.clone(),
            audio,
            transcript,
        })
    }
}

/// Await a provider call, folding timeout and provider errors into a message
async fn bounded<T>(
    limit: Duration,
    call: impl Future<Output = crate::Result<T>>,
) -> Result<T, String> {
    match tokio::time::timeout(limit, call).await {
        Ok(Ok(value)) => Ok(value),
        Ok(Err(e)) => {
            tracing::warn!(error = %e, "provider call failed");
            Err(e.to_string())
        }
        Err(_) => {
            tracing::warn!(timeout_secs = limit.as_secs_f64(), "provider call timed out");
            Err(format!("timed out after {:.1}s", limit.as_secs_f64()))
        }
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicUsize, Ordering};

    use async_trait::async_trait;

    use super::*;
    use crate::voice::TranscriptResult;
    use crate::{Error, Result};

    struct FixedTranscriber(&'static str);

    #[async_trait]
    impl Transcriber for FixedTranscriber {
        async fn transcribe(&self, _audio: &AudioBlob, language: &str) -> Result<TranscriptResult> {
            assert_eq!(language, "en");
            Ok(TranscriptResult {
                text: self.0.to_string(),
            })
        }

        fn name(&self) -> &'static str {
            "fixed"
        }
    }

    struct FailingTranscriber;

    #[async_trait]
    impl Transcriber for FailingTranscriber {
        async fn transcribe(&self, _audio: &AudioBlob, _language: &str) -> Result<TranscriptResult> {
            Err(Error::Stt("503 service unavailable".to_string()))
        }

        fn name(&self) -> &'static str {
            "failing"
        }
    }

    struct SlowTranscriber;

    #[async_trait]
    impl Transcriber for SlowTranscriber {
        async fn transcribe(&self, _audio: &AudioBlob, _language: &str) -> Result<TranscriptResult> {
            tokio::time::sleep(Duration::from_secs(5)).await;
            Ok(TranscriptResult {
                text: "world".to_string(),
            })
        }

        fn name(&self) -> &'static str {
            "slow"
        }
    }

    #[derive(Default)]
    struct CountingSynthesizer {
        calls: AtomicUsize,
        fail: bool,
    }

    #[async_trait]
    impl Synthesizer for CountingSynthesizer {
        async fn synthesize(&self, text: &str, voice: &str, _language: &str) -> Result<Vec<u8>> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            assert_eq!(voice, "alloy");
            if self.fail {
                return Err(Error::Tts("quota exceeded".to_string()));
            }
            Ok(text.as_bytes().to_vec())
        }

        fn name(&self) -> &'static str {
            "counting"
        }
    }

    fn pipeline(
        transcriber: Arc<dyn Transcriber>,
        synthesizer: Arc<CountingSynthesizer>,
        timeout: Duration,
    ) -> VoicePipeline {
        VoicePipeline::new(
            transcriber,
            synthesizer,
            Arc::new(KeywordDictionary::default()),
            PipelineOptions {
                timeout,
                ..PipelineOptions::default()
            },
        )
    }

    fn blob() -> AudioBlob {
        AudioBlob::new(vec![0; 3200], "audio/webm")
    }

    #[tokio::test]
    async fn test_match_and_synthesize() {
        let synth = Arc::new(CountingSynthesizer::default());
        let p = pipeline(
            Arc::new(FixedTranscriber("what is wikipedia")),
            synth.clone(),
            DEFAULT_PROVIDER_TIMEOUT,
        );

        let out = p.run(&blob()).await.unwrap();
        assert_eq!(out.trigger, "wikipedia");
        assert!(String::from_utf8(out.audio).unwrap().starts_with("Wikipedia is a free"));
        assert_eq!(synth.calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_no_keyword_skips_synthesis() {
        let synth = Arc::new(CountingSynthesizer::default());
        let p = pipeline(
            Arc::new(FixedTranscriber("good morning")),
            synth.clone(),
            DEFAULT_PROVIDER_TIMEOUT,
        );

        let err = p.run(&blob()).await.unwrap_err();
        assert!(matches!(err, PipelineError::NoKeywordMatched { ref transcript } if transcript == "good morning"));
        assert!(err.is_expected());
        assert_eq!(synth.calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_transcription_failure() {
        let synth = Arc::new(CountingSynthesizer::default());
        let p = pipeline(Arc::new(FailingTranscriber), synth.clone(), DEFAULT_PROVIDER_TIMEOUT);

        let err = p.run(&blob()).await.unwrap_err();
        assert!(matches!(err, PipelineError::TranscriptionFailed(ref m) if m.contains("503")));
        assert!(!err.is_expected());
        assert_eq!(synth.calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_synthesis_failure() {
        let synth = Arc::new(CountingSynthesizer {
            fail: true,
            ..CountingSynthesizer::default()
        });
        let p = pipeline(Arc::new(FixedTranscriber("hello world")), synth, DEFAULT_PROVIDER_TIMEOUT);

        let err = p.run(&blob()).await.unwrap_err();
        assert!(matches!(err, PipelineError::SynthesisFailed(ref m) if m.contains("quota")));
    }

    #[tokio::test]
    async fn test_timeout_maps_to_transcription_failed() {
        let synth = Arc::new(CountingSynthesizer::default());
        let p = pipeline(Arc::new(SlowTranscriber), synth, Duration::from_millis(20));

        let err = p.run(&blob()).await.unwrap_err();
        assert!(matches!(err, PipelineError::TranscriptionFailed(ref m) if m.contains("timed out")));
    }
}
