//! Session state machine
//!
//! Coordinates the recording controller, the voice pipeline and the storage
//! gateway into one observable status, and remembers the most recently
//! resolved keyword so the matching artifact can be shown.
//!
//! `Idle -> Recording -> Processing -> Idle`. Any failure lands in `Error`,
//! which the next user action clears back to `Idle`.

use std::sync::Arc;

use serde::Serialize;
use thiserror::Error;

use crate::pipeline::{PipelineError, VoicePipeline};
use crate::presentation::{DeleteOutcome, Presenter};
use crate::storage::{ArtifactEntry, ArtifactListing, StorageError, StorageGateway, artifact_key};
use crate::voice::{AudioBlob, CaptureError, RecordingController};

const UPLOADING_MESSAGE: &str = "Uploading audio... Please wait.";
const UPLOADED_MESSAGE: &str = "Audio uploaded successfully!";
const DEVICE_UNAVAILABLE_MESSAGE: &str = "Failed to start recording. Please ensure microphone access.";
const EMPTY_CAPTURE_MESSAGE: &str = "No audio data captured";

/// Observable session status
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum SessionStatus {
    #[default]
    Idle,
    Recording,
    Processing,
    Error,
}

/// Why a session action did not complete
#[derive(Debug, Error)]
pub enum SessionError {
    #[error(transparent)]
    Capture(#[from] CaptureError),

    #[error(transparent)]
    Pipeline(#[from] PipelineError),

    #[error(transparent)]
    Storage(#[from] StorageError),

    /// A run is already in flight for this session
    #[error("a recording is already being processed")]
    Busy,
}

impl SessionError {
    /// Message shown to the user for this failure
    #[must_use]
    pub fn user_message(&self) -> String {
        match self {
            Self::Capture(CaptureError::DeviceUnavailable(_)) => DEVICE_UNAVAILABLE_MESSAGE.to_string(),
            Self::Capture(CaptureError::EmptyCapture) => EMPTY_CAPTURE_MESSAGE.to_string(),
            Self::Busy => "A recording is already being processed".to_string(),
            other => format!("Error: {other}"),
        }
    }
}

/// UI projection of a session
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SessionView {
    pub status: SessionStatus,
    pub loading: bool,
    pub error: Option<String>,
    pub resolved_keyword: Option<String>,
}

/// Artifact produced by a successful run
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ResolvedArtifact {
    pub trigger: String,
    pub key: String,
    pub url: String,
    pub transcript: String,
}

/// What a toggle did
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ToggleOutcome {
    /// Recording began
    Started,
    /// Recording stopped and the run produced an artifact
    Completed(ResolvedArtifact),
}

/// One user's recording interaction
pub struct Session {
    recorder: Option<RecordingController>,
    pipeline: Arc<VoicePipeline>,
    gateway: StorageGateway,
    presenter: Arc<dyn Presenter>,
    status: SessionStatus,
    last_error: Option<String>,
    resolved_keyword: Option<String>,
    listing: ArtifactListing,
}

impl Session {
    /// Create an idle session without a local capture device
    ///
    /// Such a session only accepts externally recorded blobs through
    /// [`Self::process_blob`].
    #[must_use]
    pub fn new(
        pipeline: Arc<VoicePipeline>,
        gateway: StorageGateway,
        presenter: Arc<dyn Presenter>,
    ) -> Self {
        Self {
            recorder: None,
            pipeline,
            gateway,
            presenter,
            status: SessionStatus::Idle,
            last_error: None,
            resolved_keyword: None,
            listing: ArtifactListing::default(),
        }
    }

    /// Attach a recording controller for local capture
    #[must_use]
    pub fn with_recorder(mut self, recorder: RecordingController) -> Self {
        self.recorder = Some(recorder);
        self
    }

    /// Current status
    #[must_use]
    pub const fn status(&self) -> SessionStatus {
        self.status
    }

    /// Most recently resolved keyword
    #[must_use]
    pub fn resolved_keyword(&self) -> Option<&str> {
        self.resolved_keyword.as_deref()
    }

    /// Last fetched artifact listing
    #[must_use]
    pub const fn listing(&self) -> &ArtifactListing {
        &self.listing
    }

    /// Gateway this session stores artifacts through
    #[must_use]
    pub const fn gateway(&self) -> &StorageGateway {
        &self.gateway
    }

    /// Current UI projection
    #[must_use]
    pub fn view(&self) -> SessionView {
        SessionView {
            status: self.status,
            loading: self.status == SessionStatus::Processing,
            error: self.last_error.clone(),
            resolved_keyword: self.resolved_keyword.clone(),
        }
    }

    /// Text shown where the matching clip would be
    #[must_use]
    pub fn placeholder_text(&self) -> String {
        match (&self.resolved_keyword, self.status) {
            (None, _) => "Waiting for input".to_string(),
            (Some(keyword), SessionStatus::Processing) => format!("Loading your query: {keyword}"),
            (Some(_), _) => "Please try again".to_string(),
        }
    }

    /// Listing entry for the resolved keyword, if stored
    #[must_use]
    pub fn matching_artifact(&self) -> Option<&ArtifactEntry> {
        let keyword = self.resolved_keyword.as_deref()?;
        self.listing.find(&artifact_key(keyword))
    }

    /// Playback URL for the matching artifact, if stored
    #[must_use]
    pub fn matching_artifact_url(&self) -> Option<String> {
        self.matching_artifact()
            .map(|entry| self.gateway.playback_url(&entry.key))
    }

    /// Re-fetch the artifact listing
    pub async fn refresh(&mut self) {
        self.listing = self.gateway.list().await;
    }

    /// Clear an error back to idle
    pub fn acknowledge_error(&mut self) {
        if self.status == SessionStatus::Error {
            tracing::debug!("error acknowledged");
            self.status = SessionStatus::Idle;
            self.last_error = None;
        }
    }

    /// Start recording when idle; stop and process when recording
    ///
    /// # Errors
    ///
    /// Returns [`SessionError::Busy`] while a run is in flight, or the
    /// failure that moved the session to `Error`
    pub async fn toggle(&mut self) -> Result<ToggleOutcome, SessionError> {
        self.enter_action()?;

        if self.status == SessionStatus::Recording {
            let stopped = match self.recorder.as_mut() {
                Some(recorder) => recorder.stop(),
                None => Err(CaptureError::NotRecording),
            };
            let blob = match stopped {
                Ok(blob) => blob,
                Err(e) => return Err(self.fail(e.into())),
            };
            return self.run(blob).await.map(ToggleOutcome::Completed);
        }

        let started = match self.recorder.as_mut() {
            Some(recorder) => recorder.start(),
            None => Err(CaptureError::DeviceUnavailable(
                "no capture device attached".to_string(),
            )),
        };
        if let Err(e) = started {
            return Err(self.fail(e.into()));
        }

        self.status = SessionStatus::Recording;
        Ok(ToggleOutcome::Started)
    }

    /// Process an externally recorded blob
    ///
    /// # Errors
    ///
    /// Returns [`SessionError::Busy`] while recording or processing, or the
    /// failure that moved the session to `Error`
    pub async fn process_blob(&mut self, blob: AudioBlob) -> Result<ResolvedArtifact, SessionError> {
        self.enter_action()?;

        if self.status == SessionStatus::Recording {
            tracing::warn!("blob submitted while recording locally");
            return Err(SessionError::Busy);
        }

        if blob.is_empty() {
            return Err(self.fail(CaptureError::EmptyCapture.into()));
        }

        self.run(blob).await
    }

    /// Confirm, delete and report on one artifact
    ///
    /// Returns `Ok(false)` when the user declined.
    ///
    /// # Errors
    ///
    /// Returns [`SessionError::Busy`] while a run is in flight, or
    /// [`SessionError::Storage`] if the delete failed
    pub async fn delete_artifact(&mut self, key: &str) -> Result<bool, SessionError> {
        self.enter_action()?;

        if !self.presenter.confirm_delete(key).await {
            tracing::debug!(key, "delete declined");
            return Ok(false);
        }

        let result = self.gateway.delete(key).await;
        self.refresh().await;

        match result {
            Ok(()) => {
                self.presenter.show_delete_result(&DeleteOutcome::Deleted {
                    key: key.to_string(),
                });
                Ok(true)
            }
            Err(e) => {
                let message = match &e {
                    StorageError::DeleteFailed { message, .. } => message.clone(),
                    other => other.to_string(),
                };
                self.presenter.show_delete_result(&DeleteOutcome::Failed {
                    key: key.to_string(),
                    message,
                });

                // The dialog already reported it; no extra notification
                let err = SessionError::from(e);
                self.status = SessionStatus::Error;
                self.last_error = Some(err.user_message());
                Err(err)
            }
        }
    }

    /// Release the capture device if still held. Idempotent.
    pub fn teardown(&mut self) {
        if let Some(recorder) = self.recorder.as_mut() {
            recorder.teardown();
        }
        if self.status == SessionStatus::Recording {
            self.status = SessionStatus::Idle;
        }
    }

    /// Guard shared by every user action
    fn enter_action(&mut self) -> Result<(), SessionError> {
        match self.status {
            SessionStatus::Processing => {
                tracing::warn!("action rejected while processing");
                Err(SessionError::Busy)
            }
            SessionStatus::Error => {
                self.acknowledge_error();
                Ok(())
            }
            SessionStatus::Idle | SessionStatus::Recording => Ok(()),
        }
    }

    async fn run(&mut self, blob: AudioBlob) -> Result<ResolvedArtifact, SessionError> {
        self.status = SessionStatus::Processing;
        self.presenter.notify(UPLOADING_MESSAGE);

        let output = match self.pipeline.run(&blob).await {
            Ok(output) => output,
            Err(e) => {
                self.refresh().await;
                return Err(self.fail(e.into()));
            }
        };

        self.resolved_keyword = Some(output.trigger.clone());

        let key = match self.gateway.upload(&output.trigger, output.audio).await {
            Ok(key) => key,
            Err(e) => {
                self.refresh().await;
                return Err(self.fail(e.into()));
            }
        };

        self.refresh().await;
        self.status = SessionStatus::Idle;
        self.presenter.notify(UPLOADED_MESSAGE);

        Ok(ResolvedArtifact {
            url: self.gateway.playback_url(&key),
            trigger: output.trigger,
            key,
            transcript: output.transcript,
        })
    }

    /// Move to `Error` and notify once
    fn fail(&mut self, err: SessionError) -> SessionError {
        match &err {
            SessionError::Pipeline(e) if e.is_expected() => {
                tracing::info!(error = %err, "run ended without a match");
            }
            _ => tracing::error!(error = %err, "session action failed"),
        }

        let message = err.user_message();
        self.presenter.notify(&message);
        self.status = SessionStatus::Error;
        self.last_error = Some(message);
        err
    }
}

impl Drop for Session {
    fn drop(&mut self) {
        self.teardown();
    }
}

#[cfg(test)]
mod tests {
    use std::collections::VecDeque;
    use std::sync::atomic::{AtomicBool, Ordering};
    use std::sync::Mutex;

    use async_trait::async_trait;

    use super::*;
    use crate::keywords::KeywordDictionary;
    use crate::pipeline::PipelineOptions;
    use crate::presentation::{PresentationEvent, RecordingPresenter};
    use crate::storage::{MemoryStore, ObjectStore, WriteFailureKind};
    use crate::voice::{
        CaptureDevice, CaptureStream, ChunkFormat, Synthesizer, TranscriptResult, Transcriber,
    };
    use crate::{Error, Result};

    const BASE_URL: &str = "https://pub.example.dev";

    struct ScriptedTranscriber(Mutex<VecDeque<&'static str>>);

    impl ScriptedTranscriber {
        fn new(lines: &[&'static str]) -> Self {
            Self(Mutex::new(lines.iter().copied().collect()))
        }
    }

    #[async_trait]
    impl Transcriber for ScriptedTranscriber {
        async fn transcribe(&self, _audio: &AudioBlob, _language: &str) -> Result<TranscriptResult> {
            let next = self.0.lock().unwrap().pop_front();
            next.map(|text| TranscriptResult {
                text: text.to_string(),
            })
            .ok_or_else(|| Error::Stt("script exhausted".to_string()))
        }

        fn name(&self) -> &'static str {
            "scripted"
        }
    }

    struct EchoSynthesizer;

    #[async_trait]
    impl Synthesizer for EchoSynthesizer {
        async fn synthesize(&self, text: &str, _voice: &str, _language: &str) -> Result<Vec<u8>> {
            Ok(text.as_bytes().to_vec())
        }

        fn name(&self) -> &'static str {
            "echo"
        }
    }

    struct OneChunkStream {
        chunk: Option<Vec<u8>>,
        released: Arc<AtomicBool>,
    }

    impl CaptureStream for OneChunkStream {
        fn format(&self) -> ChunkFormat {
            ChunkFormat::Encoded {
                content_type: "audio/webm".to_string(),
            }
        }

        fn take_chunk(&mut self) -> Vec<u8> {
            self.chunk.take().unwrap_or_default()
        }

        fn release(&mut self) {
            self.released.store(true, Ordering::SeqCst);
        }
    }

    struct OneChunkDevice {
        bytes: usize,
        available: bool,
        released: Arc<AtomicBool>,
    }

    impl CaptureDevice for OneChunkDevice {
        fn acquire(&self) -> Result<Box<dyn CaptureStream>> {
            if !self.available {
                return Err(Error::Audio("permission denied".to_string()));
            }
            Ok(Box::new(OneChunkStream {
                chunk: (self.bytes > 0).then(|| vec![7; self.bytes]),
                released: Arc::clone(&self.released),
            }))
        }
    }

    struct Harness {
        session: Session,
        store: Arc<MemoryStore>,
        presenter: Arc<RecordingPresenter>,
    }

    fn harness(transcripts: &[&'static str]) -> Harness {
        let store = Arc::new(MemoryStore::new());
        let presenter = Arc::new(RecordingPresenter::new(true));
        let pipeline = Arc::new(VoicePipeline::new(
            Arc::new(ScriptedTranscriber::new(transcripts)),
            Arc::new(EchoSynthesizer),
            Arc::new(KeywordDictionary::default()),
            PipelineOptions::default(),
        ));
        let gateway = StorageGateway::new(store.clone(), BASE_URL);
        let session = Session::new(pipeline, gateway, presenter.clone());
        Harness {
            session,
            store,
            presenter,
        }
    }

    fn device(bytes: usize, available: bool) -> Arc<OneChunkDevice> {
        Arc::new(OneChunkDevice {
            bytes,
            available,
            released: Arc::new(AtomicBool::new(false)),
        })
    }

    fn blob() -> AudioBlob {
        AudioBlob::new(vec![0; 3200], "audio/webm")
    }

    #[tokio::test]
    async fn test_process_blob_resolves_artifact() {
        let mut h = harness(&["what is wikipedia"]);

        let artifact = h.session.process_blob(blob()).await.unwrap();
        assert_eq!(artifact.trigger, "wikipedia");
        assert_eq!(artifact.key, "wikipedia.mp3");
        assert_eq!(artifact.url, format!("{BASE_URL}/wikipedia.mp3"));

        assert_eq!(h.session.status(), SessionStatus::Idle);
        assert!(h.session.listing().contains("wikipedia.mp3"));
        assert_eq!(h.session.matching_artifact().unwrap().key, "wikipedia.mp3");
        assert_eq!(
            h.session.matching_artifact_url().as_deref(),
            Some("https://pub.example.dev/wikipedia.mp3")
        );
        assert_eq!(
            h.presenter.notifications(),
            [UPLOADING_MESSAGE, UPLOADED_MESSAGE]
        );
    }

    #[tokio::test]
    async fn test_no_keyword_leaves_listing_unchanged() {
        let mut h = harness(&["good morning"]);
        h.store.put("usa.mp3", vec![1], "audio/mpeg").await.unwrap();
        h.session.refresh().await;
        let before = h.session.listing().clone();

        let err = h.session.process_blob(blob()).await.unwrap_err();
        assert!(matches!(err, SessionError::Pipeline(PipelineError::NoKeywordMatched { .. })));

        assert_eq!(h.session.status(), SessionStatus::Error);
        assert_eq!(h.session.listing(), &before);
        assert_eq!(
            h.presenter.notifications().last().unwrap(),
            "Error: No keywords found in the transcription."
        );
        assert_eq!(h.session.placeholder_text(), "Waiting for input");
    }

    #[tokio::test]
    async fn test_empty_blob_skips_pipeline() {
        let mut h = harness(&[]);

        let err = h
            .session
            .process_blob(AudioBlob::new(Vec::new(), "audio/webm"))
            .await
            .unwrap_err();
        assert!(matches!(err, SessionError::Capture(CaptureError::EmptyCapture)));
        assert_eq!(h.presenter.notifications(), [EMPTY_CAPTURE_MESSAGE]);
        assert_eq!(h.session.view().error.as_deref(), Some(EMPTY_CAPTURE_MESSAGE));
    }

    #[tokio::test]
    async fn test_toggle_records_then_processes() {
        let h = harness(&["tell me about USA please"]);
        let device = device(3200, true);
        let mut session = h
            .session
            .with_recorder(RecordingController::new(device.clone()));

        assert_eq!(session.toggle().await.unwrap(), ToggleOutcome::Started);
        assert_eq!(session.status(), SessionStatus::Recording);

        let ToggleOutcome::Completed(artifact) = session.toggle().await.unwrap() else {
            panic!("expected a completed run");
        };
        assert_eq!(artifact.key, "usa.mp3");
        assert!(device.released.load(Ordering::SeqCst));
        assert_eq!(session.status(), SessionStatus::Idle);
        assert!(h.store.get("usa.mp3").is_some());
    }

    #[tokio::test]
    async fn test_toggle_without_device_permission() {
        let h = harness(&[]);
        let mut session = h
            .session
            .with_recorder(RecordingController::new(device(3200, false)));

        let err = session.toggle().await.unwrap_err();
        assert!(matches!(err, SessionError::Capture(CaptureError::DeviceUnavailable(_))));
        assert_eq!(session.status(), SessionStatus::Error);
        assert_eq!(h.presenter.notifications(), [DEVICE_UNAVAILABLE_MESSAGE]);
    }

    #[tokio::test]
    async fn test_empty_recording_moves_to_error_then_clears() {
        let h = harness(&["hello world"]);
        let mut session = h
            .session
            .with_recorder(RecordingController::new(device(0, true)));

        session.toggle().await.unwrap();
        let err = session.toggle().await.unwrap_err();
        assert!(matches!(err, SessionError::Capture(CaptureError::EmptyCapture)));
        assert_eq!(session.status(), SessionStatus::Error);

        // Next action clears the error and starts over
        assert_eq!(session.toggle().await.unwrap(), ToggleOutcome::Started);
        assert_eq!(session.status(), SessionStatus::Recording);
        assert!(session.view().error.is_none());
        session.teardown();
        session.teardown();
        assert_eq!(session.status(), SessionStatus::Idle);
    }

    #[tokio::test]
    async fn test_upload_failure_refreshes_and_reports() {
        let mut h = harness(&["hello world"]);
        h.store.fail_writes(Some(WriteFailureKind::AccessDenied));

        let err = h.session.process_blob(blob()).await.unwrap_err();
        assert!(matches!(err, SessionError::Storage(StorageError::WriteFailed { .. })));
        assert_eq!(h.session.resolved_keyword(), Some("world"));
        assert!(h.session.matching_artifact().is_none());
        assert_eq!(h.session.placeholder_text(), "Please try again");
        assert!(h.presenter.notifications().last().unwrap().contains("Access Denied"));
    }

    #[tokio::test]
    async fn test_delete_confirmed_and_missing() {
        let mut h = harness(&[]);
        h.store.put("google.mp3", vec![1], "audio/mpeg").await.unwrap();
        h.session.refresh().await;

        assert!(h.session.delete_artifact("google.mp3").await.unwrap());
        assert!(!h.session.listing().contains("google.mp3"));

        let err = h.session.delete_artifact("google.mp3").await.unwrap_err();
        assert!(matches!(err, SessionError::Storage(StorageError::DeleteFailed { .. })));
        assert!(!h.session.listing().contains("google.mp3"));

        let results: Vec<_> = h
            .presenter
            .events()
            .into_iter()
            .filter(|e| matches!(e, PresentationEvent::DeleteResult { .. }))
            .collect();
        assert_eq!(results.len(), 2);
        assert!(h.presenter.notifications().is_empty());
    }

    #[tokio::test]
    async fn test_delete_declined() {
        let store = Arc::new(MemoryStore::new());
        store.put("usa.mp3", vec![1], "audio/mpeg").await.unwrap();
        let presenter = Arc::new(RecordingPresenter::new(false));
        let pipeline = Arc::new(VoicePipeline::new(
            Arc::new(ScriptedTranscriber::new(&[])),
            Arc::new(EchoSynthesizer),
            Arc::new(KeywordDictionary::default()),
            PipelineOptions::default(),
        ));
        let mut session = Session::new(
            pipeline,
            StorageGateway::new(store.clone(), BASE_URL),
            presenter.clone(),
        );

        assert!(!session.delete_artifact("usa.mp3").await.unwrap());
        assert!(store.get("usa.mp3").is_some());
        assert_eq!(presenter.events().len(), 1);
    }

    /// Synthesizer that never answers, pinning a run in `Processing`
    struct StalledSynthesizer;

    #[async_trait]
    impl Synthesizer for StalledSynthesizer {
        async fn synthesize(&self, _text: &str, _voice: &str, _language: &str) -> Result<Vec<u8>> {
            std::future::pending::<Result<Vec<u8>>>().await
        }

        fn name(&self) -> &'static str {
            "stalled"
        }
    }

    #[tokio::test]
    async fn test_actions_rejected_while_processing() {
        let store = Arc::new(MemoryStore::new());
        let presenter = Arc::new(RecordingPresenter::new(true));
        let pipeline = Arc::new(VoicePipeline::new(
            Arc::new(ScriptedTranscriber::new(&["what is wikipedia", "hello world"])),
            Arc::new(StalledSynthesizer),
            Arc::new(KeywordDictionary::default()),
            PipelineOptions::default(),
        ));
        let mut session = Session::new(
            pipeline,
            StorageGateway::new(store.clone(), BASE_URL),
            presenter.clone(),
        )
        .with_recorder(RecordingController::new(device(100, true)));

        // Abandon the run mid-synthesis
        let stalled =
            tokio::time::timeout(std::time::Duration::from_millis(50), session.process_blob(blob())).await;
        assert!(stalled.is_err());
        assert_eq!(session.status(), SessionStatus::Processing);
        let events_before = presenter.events().len();

        assert!(matches!(
            session.process_blob(blob()).await,
            Err(SessionError::Busy)
        ));
        assert!(matches!(session.toggle().await, Err(SessionError::Busy)));

        assert_eq!(session.status(), SessionStatus::Processing);
        assert!(session.view().loading);
        assert!(session.view().error.is_none());
        assert_eq!(presenter.events().len(), events_before);
        assert!(store.list_keys().await.unwrap().is_empty());
    }

    #[test]
    fn test_user_messages() {
        assert_eq!(
            SessionError::Capture(CaptureError::DeviceUnavailable("denied".to_string())).user_message(),
            DEVICE_UNAVAILABLE_MESSAGE
        );
        assert_eq!(
            SessionError::Pipeline(PipelineError::TranscriptionFailed("503".to_string())).user_message(),
            "Error: transcription failed: 503"
        );
    }
}
