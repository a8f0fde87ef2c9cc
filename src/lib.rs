//! keyvoice - Keyword-triggered voice responses
//!
//! Records a short utterance, transcribes it, looks for a known keyword in
//! the transcript, synthesizes the keyword's canned response and stores the
//! clip in an S3-compatible bucket under `{keyword}.mp3`.
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────┐
//! │                    Interfaces                        │
//! │        HTTP API  │  CLI recorder  │  Web UI          │
//! └────────────────────┬────────────────────────────────┘
//!                      │
//! ┌────────────────────▼────────────────────────────────┐
//! │                    Session                           │
//! │   Recorder  │  Pipeline (STT → match → TTS)          │
//! └────────────────────┬────────────────────────────────┘
//!                      │
//! ┌────────────────────▼────────────────────────────────┐
//! │               Storage Gateway                        │
//! │        S3 / R2 bucket  │  in-memory store            │
//! └─────────────────────────────────────────────────────┘
//! ```

pub mod api;
pub mod app;
pub mod config;
pub mod error;
pub mod keywords;
pub mod pipeline;
pub mod presentation;
pub mod session;
pub mod storage;
pub mod voice;

pub use app::App;
pub use config::Config;
pub use error::{Error, Result};
pub use keywords::{KeywordDictionary, KeywordEntry, find_match};
pub use pipeline::{PipelineError, PipelineOptions, PipelineOutput, VoicePipeline};
pub use presentation::{
    DeleteOutcome, PresentationEvent, Presenter, RecordingPresenter, TerminalPresenter,
};
pub use session::{ResolvedArtifact, Session, SessionError, SessionStatus, SessionView, ToggleOutcome};
pub use storage::{
    ArtifactEntry, ArtifactListing, MemoryStore, ObjectStore, StorageError, StorageGateway,
    WriteFailureKind, artifact_key,
};
