//! S3-compatible object store (Cloudflare R2, MinIO, AWS S3)

use async_trait::async_trait;
use aws_sdk_s3::config::{BehaviorVersion, Builder, Credentials, Region};
use aws_sdk_s3::error::{DisplayErrorContext, ProvideErrorMetadata};
use aws_sdk_s3::primitives::ByteStream;
use secrecy::{ExposeSecret, SecretString};

use super::{ObjectStore, StorageError, WriteFailureKind};

/// Connection settings for an S3-compatible bucket
#[derive(Debug)]
pub struct S3Settings {
    /// Endpoint URL, e.g. `https://<account>.r2.cloudflarestorage.com`
    pub endpoint: String,
    /// Signing region (`auto` for R2)
    pub region: String,
    /// Bucket holding the artifacts
    pub bucket: String,
    pub access_key_id: SecretString,
    pub secret_access_key: SecretString,
}

/// Object store over the S3 API
#[derive(Clone)]
pub struct S3Store {
    client: aws_sdk_s3::Client,
    bucket: String,
}

impl S3Store {
    /// Build a client for the given bucket
    ///
    /// Uses path-style addressing, which R2 and most self-hosted backends
    /// require.
    #[must_use]
    pub fn new(settings: &S3Settings) -> Self {
        let credentials = Credentials::new(
            settings.access_key_id.expose_secret(),
            settings.secret_access_key.expose_secret(),
            None,
            None,
            "keyvoice",
        );

        let config = Builder::new()
            .behavior_version(BehaviorVersion::latest())
            .region(Region::new(settings.region.clone()))
            .endpoint_url(&settings.endpoint)
            .credentials_provider(credentials)
            .force_path_style(true)
            .build();

        tracing::debug!(
            endpoint = %settings.endpoint,
            bucket = %settings.bucket,
            "S3 client initialized"
        );

        Self {
            client: aws_sdk_s3::Client::from_conf(config),
            bucket: settings.bucket.clone(),
        }
    }
}

#[async_trait]
impl ObjectStore for S3Store {
    async fn list_keys(&self) -> Result<Vec<String>, StorageError> {
        let mut keys = Vec::new();
        let mut continuation: Option<String> = None;

        loop {
            let page = self
                .client
                .list_objects_v2()
                .bucket(&self.bucket)
                .set_continuation_token(continuation.take())
                .send()
                .await
                .map_err(|e| StorageError::ListFailed(DisplayErrorContext(&e).to_string()))?;

            keys.extend(
                page.contents()
                    .iter()
                    .filter_map(|object| object.key().map(str::to_string)),
            );

            match page.next_continuation_token() {
                Some(token) if !token.is_empty() => continuation = Some(token.to_string()),
                _ => break,
            }
        }

        Ok(keys)
    }

    async fn put(&self, key: &str, body: Vec<u8>, content_type: &str) -> Result<(), StorageError> {
        self.client
            .put_object()
            .bucket(&self.bucket)
            .key(key)
            .body(ByteStream::from(body))
            .content_type(content_type)
            .send()
            .await
            .map_err(|e| StorageError::WriteFailed {
                kind: WriteFailureKind::from_code(e.code()),
                message: e
                    .message()
                    .map_or_else(|| DisplayErrorContext(&e).to_string(), str::to_string),
            })?;

        Ok(())
    }

    async fn delete(&self, key: &str) -> Result<(), StorageError> {
        // S3 deletes are idempotent, so check existence first to report
        // missing objects
        if let Err(e) = self
            .client
            .head_object()
            .bucket(&self.bucket)
            .key(key)
            .send()
            .await
        {
            let missing = e
                .as_service_error()
                .is_some_and(aws_sdk_s3::operation::head_object::HeadObjectError::is_not_found);
            let message = if missing {
                "object does not exist".to_string()
            } else {
                DisplayErrorContext(&e).to_string()
            };
            return Err(StorageError::DeleteFailed {
                key: key.to_string(),
                message,
            });
        }

        self.client
            .delete_object()
            .bucket(&self.bucket)
            .key(key)
            .send()
            .await
            .map_err(|e| StorageError::DeleteFailed {
                key: key.to_string(),
                message: e
                    .message()
                    .map_or_else(|| DisplayErrorContext(&e).to_string(), str::to_string),
            })?;

        Ok(())
    }

    fn name(&self) -> &'static str {
        "s3"
    }
}
