//! Artifact storage
//!
//! Synthesized clips are stored under `{trigger}.mp3` in an S3-compatible
//! bucket. The key naming convention is the only persisted layout.

mod memory;
mod s3;

pub use memory::{MemoryStore, StoredObject};
pub use s3::{S3Settings, S3Store};

use std::sync::Arc;

use async_trait::async_trait;
use serde::Serialize;
use thiserror::Error;

/// Extension every stored artifact carries
pub const AUDIO_EXTENSION: &str = ".mp3";

/// Content type every stored artifact carries
pub const AUDIO_CONTENT_TYPE: &str = "audio/mpeg";

/// Backend classification of a failed write
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum WriteFailureKind {
    AccessDenied,
    BucketNotFound,
    Other,
}

impl WriteFailureKind {
    /// Classify a backend error code
    #[must_use]
    pub fn from_code(code: Option<&str>) -> Self {
        match code {
            Some("AccessDenied" | "Forbidden") => Self::AccessDenied,
            Some("NoSuchBucket") => Self::BucketNotFound,
            _ => Self::Other,
        }
    }

    /// Operator hint shown next to the raw backend message
    #[must_use]
    pub const fn hint(self) -> Option<&'static str> {
        match self {
            Self::AccessDenied => Some("Access denied. Check your bucket permissions."),
            Self::BucketNotFound => Some("Bucket not found. Check your bucket name."),
            Self::Other => None,
        }
    }
}

/// Object storage failures
#[derive(Debug, Error)]
pub enum StorageError {
    /// Upload rejected
    #[error("failed to store artifact ({kind:?}): {message}")]
    WriteFailed {
        kind: WriteFailureKind,
        message: String,
    },

    /// Delete rejected or object missing
    #[error("failed to delete '{key}': {message}")]
    DeleteFailed { key: String, message: String },

    /// Listing the bucket failed
    #[error("failed to list artifacts: {0}")]
    ListFailed(String),
}

/// S3-style object storage
#[async_trait]
pub trait ObjectStore: Send + Sync {
    /// All keys in the container, in backend order
    ///
    /// # Errors
    ///
    /// Returns [`StorageError::ListFailed`] if the backend cannot be listed
    async fn list_keys(&self) -> Result<Vec<String>, StorageError>;

    /// Write an object, replacing any existing one with the same key
    ///
    /// # Errors
    ///
    /// Returns [`StorageError::WriteFailed`] if the backend rejects the write
    async fn put(&self, key: &str, body: Vec<u8>, content_type: &str) -> Result<(), StorageError>;

    /// Delete an object
    ///
    /// # Errors
    ///
    /// Returns [`StorageError::DeleteFailed`] if the object does not exist
    /// or the backend rejects the delete
    async fn delete(&self, key: &str) -> Result<(), StorageError>;

    /// Backend name for logging
    fn name(&self) -> &'static str;
}

/// One stored artifact
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ArtifactEntry {
    pub key: String,
}

impl ArtifactEntry {
    /// Trigger the artifact was named after
    #[must_use]
    pub fn trigger(&self) -> &str {
        self.key.strip_suffix(AUDIO_EXTENSION).unwrap_or(&self.key)
    }
}

/// Point-in-time snapshot of stored artifacts
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(transparent)]
pub struct ArtifactListing {
    entries: Vec<ArtifactEntry>,
}

impl ArtifactListing {
    /// Build a listing from raw keys, keeping only audio artifacts
    pub fn from_keys<I, S>(keys: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            entries: keys
                .into_iter()
                .map(Into::<String>::into)
                .filter(|k| k.ends_with(AUDIO_EXTENSION))
                .map(|key| ArtifactEntry { key })
                .collect(),
        }
    }

    /// Entries in backend order
    #[must_use]
    pub fn entries(&self) -> &[ArtifactEntry] {
        &self.entries
    }

    /// Find an entry by key
    #[must_use]
    pub fn find(&self, key: &str) -> Option<&ArtifactEntry> {
        self.entries.iter().find(|e| e.key == key)
    }

    /// Whether the key is present
    #[must_use]
    pub fn contains(&self, key: &str) -> bool {
        self.find(key).is_some()
    }

    /// Number of artifacts
    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Whether there are no artifacts
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

/// Storage key for a trigger's artifact
#[must_use]
pub fn artifact_key(trigger: &str) -> String {
    format!("{trigger}{AUDIO_EXTENSION}")
}

/// Uploads, lists and deletes voice artifacts
#[derive(Clone)]
pub struct StorageGateway {
    store: Arc<dyn ObjectStore>,
    public_base_url: String,
}

impl StorageGateway {
    /// Create a gateway over an object store
    ///
    /// `public_base_url` is the prefix under which stored keys are publicly
    /// playable.
    #[must_use]
    pub fn new(store: Arc<dyn ObjectStore>, public_base_url: impl Into<String>) -> Self {
        Self {
            store,
            public_base_url: public_base_url.into().trim_end_matches('/').to_string(),
        }
    }

    /// Store synthesized audio under `{trigger}.mp3`, overwriting
    ///
    /// # Errors
    ///
    /// Returns [`StorageError::WriteFailed`] if the backend rejects the write
    pub async fn upload(&self, trigger: &str, audio: Vec<u8>) -> Result<String, StorageError> {
        let key = artifact_key(trigger);
        let bytes = audio.len();

        match self.store.put(&key, audio, AUDIO_CONTENT_TYPE).await {
            Ok(()) => {
                tracing::info!(key = %key, bytes, backend = self.store.name(), "artifact uploaded");
                Ok(key)
            }
            Err(e) => {
                tracing::error!(key = %key, error = %e, "artifact upload failed");
                if let StorageError::WriteFailed { kind, .. } = &e {
                    if let Some(hint) = kind.hint() {
                        tracing::error!("{hint}");
                    }
                }
                Err(e)
            }
        }
    }

    /// Current audio artifacts
    ///
    /// Listing is a non-critical read: failures are logged and yield an
    /// empty listing.
    pub async fn list(&self) -> ArtifactListing {
        match self.store.list_keys().await {
            Ok(keys) => {
                let listing = ArtifactListing::from_keys(keys);
                tracing::debug!(count = listing.len(), "artifacts listed");
                listing
            }
            Err(e) => {
                tracing::warn!(error = %e, backend = self.store.name(), "error fetching audio files");
                ArtifactListing::default()
            }
        }
    }

    /// Delete an artifact by key
    ///
    /// # Errors
    ///
    /// Returns [`StorageError::DeleteFailed`] if it does not exist or the
    /// backend rejects the delete
    pub async fn delete(&self, key: &str) -> Result<(), StorageError> {
        self.store.delete(key).await.inspect_err(|e| {
            tracing::error!(key, error = %e, "artifact delete failed");
        })?;

        tracing::info!(key, "artifact deleted");
        Ok(())
    }

    /// Public URL where `key` can be played
    #[must_use]
    pub fn playback_url(&self, key: &str) -> String {
        format!("{}/{}", self.public_base_url, urlencoding::encode(key))
    }
}
