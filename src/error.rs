//! Error types for keyvoice

use thiserror::Error;

use crate::pipeline::PipelineError;
use crate::session::SessionError;
use crate::storage::StorageError;
use crate::voice::CaptureError;

/// Result type alias for keyvoice operations
pub type Result<T> = std::result::Result<T, Error>;

/// Errors that can occur in keyvoice
#[derive(Debug, Error)]
pub enum Error {
    /// Configuration error
    #[error("configuration error: {0}")]
    Config(String),

    /// Audio device or encoding error
    #[error("audio error: {0}")]
    Audio(String),

    /// Speech-to-text error
    #[error("STT error: {0}")]
    Stt(String),

    /// Text-to-speech error
    #[error("TTS error: {0}")]
    Tts(String),

    /// Audio capture failure
    #[error(transparent)]
    Capture(#[from] CaptureError),

    /// Voice pipeline failure
    #[error(transparent)]
    Pipeline(#[from] PipelineError),

    /// Object storage failure
    #[error(transparent)]
    Storage(#[from] StorageError),

    /// Session state machine failure
    #[error(transparent)]
    Session(#[from] SessionError),

    /// IO error
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    /// HTTP error
    #[error("http error: {0}")]
    Http(#[from] reqwest::Error),

    /// Serialization error
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// TOML parsing error
    #[error("toml error: {0}")]
    Toml(#[from] toml::de::Error),
}
