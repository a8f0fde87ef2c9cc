//! In-process object store
//!
//! Keeps objects in insertion order. Used for local runs without a bucket
//! and as a test double; failures can be injected per operation.

use std::sync::Mutex;
use std::sync::atomic::{AtomicBool, Ordering};

use async_trait::async_trait;

use super::{ObjectStore, StorageError, WriteFailureKind};

/// A stored object
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StoredObject {
    pub body: Vec<u8>,
    pub content_type: String,
}

/// Object store backed by a `Vec`
#[derive(Debug, Default)]
pub struct MemoryStore {
    objects: Mutex<Vec<(String, StoredObject)>>,
    fail_lists: AtomicBool,
    fail_writes: Mutex<Option<WriteFailureKind>>,
}

impl MemoryStore {
    /// Create an empty store
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Make subsequent listings fail
    pub fn fail_lists(&self, fail: bool) {
        self.fail_lists.store(fail, Ordering::SeqCst);
    }

    /// Make subsequent writes fail with the given classification
    pub fn fail_writes(&self, kind: Option<WriteFailureKind>) {
        if let Ok(mut slot) = self.fail_writes.lock() {
            *slot = kind;
        }
    }

    /// Fetch a stored object
    #[must_use]
    pub fn get(&self, key: &str) -> Option<StoredObject> {
        self.objects
            .lock()
            .ok()?
            .iter()
            .find(|(k, _)| k == key)
            .map(|(_, o)| o.clone())
    }

    fn poisoned() -> String {
        "memory store lock poisoned".to_string()
    }
}

#[async_trait]
impl ObjectStore for MemoryStore {
    async fn list_keys(&self) -> Result<Vec<String>, StorageError> {
        if self.fail_lists.load(Ordering::SeqCst) {
            return Err(StorageError::ListFailed("injected list failure".to_string()));
        }

        let objects = self
            .objects
            .lock()
            .map_err(|_| StorageError::ListFailed(Self::poisoned()))?;
        Ok(objects.iter().map(|(k, _)| k.clone()).collect())
    }

    async fn put(&self, key: &str, body: Vec<u8>, content_type: &str) -> Result<(), StorageError> {
        let injected = self.fail_writes.lock().ok().and_then(|slot| *slot);
        if let Some(kind) = injected {
            let message = match kind {
                WriteFailureKind::AccessDenied => "Access Denied",
                WriteFailureKind::BucketNotFound => "The specified bucket does not exist",
                WriteFailureKind::Other => "Internal Error",
            };
            return Err(StorageError::WriteFailed {
                kind,
                message: message.to_string(),
            });
        }

        let mut objects = self.objects.lock().map_err(|_| StorageError::WriteFailed {
            kind: WriteFailureKind::Other,
            message: Self::poisoned(),
        })?;

        let object = StoredObject {
            body,
            content_type: content_type.to_string(),
        };

        if let Some(slot) = objects.iter_mut().find(|(k, _)| k == key) {
            slot.1 = object;
        } else {
            objects.push((key.to_string(), object));
        }
        Ok(())
    }

    async fn delete(&self, key: &str) -> Result<(), StorageError> {
        let mut objects = self.objects.lock().map_err(|_| StorageError::DeleteFailed {
            key: key.to_string(),
            message: Self::poisoned(),
        })?;

        let Some(index) = objects.iter().position(|(k, _)| k == key) else {
            return Err(StorageError::DeleteFailed {
                key: key.to_string(),
                message: "object does not exist".to_string(),
            });
        };

        objects.remove(index);
        Ok(())
    }

    fn name(&self) -> &'static str {
        "memory"
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_put_keeps_insertion_order() {
        let store = MemoryStore::new();
        store.put("b.mp3", vec![1], "audio/mpeg").await.unwrap();
        store.put("a.mp3", vec![2], "audio/mpeg").await.unwrap();
        store.put("b.mp3", vec![3], "audio/mpeg").await.unwrap();

        assert_eq!(store.list_keys().await.unwrap(), ["b.mp3", "a.mp3"]);
        assert_eq!(store.get("b.mp3").unwrap().body, vec![3]);
    }

    #[tokio::test]
    async fn test_injected_write_failure() {
        let store = MemoryStore::new();
        store.fail_writes(Some(WriteFailureKind::BucketNotFound));

        let err = store.put("a.mp3", vec![1], "audio/mpeg").await.unwrap_err();
        assert!(matches!(
            err,
            StorageError::WriteFailed {
                kind: WriteFailureKind::BucketNotFound,
                ..
            }
        ));

        store.fail_writes(None);
        assert!(store.put("a.mp3", vec![1], "audio/mpeg").await.is_ok());
    }

    #[tokio::test]
    async fn test_delete() {
        let store = MemoryStore::new();
        store.put("a.mp3", vec![1], "audio/mpeg").await.unwrap();

        store.delete("a.mp3").await.unwrap();
        assert!(store.get("a.mp3").is_none());
        assert!(store.delete("a.mp3").await.is_err());
    }
}
