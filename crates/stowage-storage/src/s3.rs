use crate::content_type;
use crate::keys;
use crate::traits::{
    ByteReader, ByteStream, Capabilities, StorageAdapter, StorageError, StorageResult,
    UrlAction,
};
use async_trait::async_trait;
use bytes::Bytes;
use futures::StreamExt;
use http::Method;
use object_store::aws::{AmazonS3, AmazonS3Builder};
use object_store::path::Path;
use object_store::signer::Signer;
use object_store::Error as ObjectStoreError;
use object_store::{ObjectStoreExt, PutPayload, Result as ObjectResult};
use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::Duration;
use stowage_core::FileDescriptor;
use tokio::io::AsyncReadExt;

/// S3 storage implementation
///
/// One `AmazonS3` client is built per bucket on first use and reused after.
#[derive(Clone)]
pub struct S3Storage {
    stores: Arc<Mutex<HashMap<String, AmazonS3>>>,
    region: String,
    endpoint_url: Option<String>, // Custom endpoint for S3-compatible providers
}

impl S3Storage {
    /// Create a new S3Storage instance
    ///
    /// # Arguments
    /// * `bucket` - Bucket whose client is built eagerly to surface configuration errors
    /// * `region` - AWS region (or region identifier for S3-compatible providers)
    /// * `endpoint_url` - Optional custom endpoint URL for S3-compatible providers
    ///   (e.g., "http://localhost:9000" for MinIO)
    pub async fn new(
        bucket: String,
        region: String,
        endpoint_url: Option<String>,
    ) -> StorageResult<Self> {
        let storage = S3Storage {
            stores: Arc::new(Mutex::new(HashMap::new())),
            region,
            endpoint_url,
        };
        storage.store(&bucket)?;
        Ok(storage)
    }

    fn build_store(&self, bucket: &str) -> StorageResult<AmazonS3> {
        // Build AmazonS3 object store from environment and explicit settings.
        let mut builder = AmazonS3Builder::from_env()
            .with_region(self.region.clone())
            .with_bucket_name(bucket.to_string());

        if let Some(ref endpoint) = self.endpoint_url {
            let allow_http = endpoint.starts_with("http://");
            builder = builder
                .with_endpoint(endpoint.clone())
                .with_allow_http(allow_http);
        }

        builder
            .build()
            .map_err(|e| StorageError::ConfigError(e.to_string()))
    }

    fn store(&self, bucket: &str) -> StorageResult<AmazonS3> {
        let mut stores = self.stores.lock().unwrap_or_else(|e| e.into_inner());
        if let Some(store) = stores.get(bucket) {
            return Ok(store.clone());
        }

        let store = self.build_store(bucket)?;
        stores.insert(bucket.to_string(), store.clone());
        Ok(store)
    }

    fn locate(&self, descriptor: &FileDescriptor) -> StorageResult<(AmazonS3, Path)> {
        keys::validate(descriptor)?;
        let store = self.store(&descriptor.bucket)?;
        Ok((store, Path::from(descriptor.key.clone())))
    }
}

#[async_trait]
impl StorageAdapter for S3Storage {
    fn name(&self) -> &'static str {
        "s3"
    }

    fn capabilities(&self) -> Capabilities {
        Capabilities::all()
    }

    async fn create(
        &self,
        descriptor: &FileDescriptor,
        mut source: ByteReader,
    ) -> StorageResult<FileDescriptor> {
        let (store, location) = self.locate(descriptor)?;
        let start = std::time::Instant::now();

        // Single put of the whole body; multipart uploads are not used.
        let mut buffer = Vec::new();
        source.read_to_end(&mut buffer).await.map_err(|e| {
            StorageError::UploadFailed(format!("Failed to read from stream: {}", e))
        })?;

        let size = buffer.len() as u64;
        let bytes = Bytes::from(buffer);

        let result: ObjectResult<_> = store.put(&location, PutPayload::from(bytes)).await;

        result.map_err(|e| {
            tracing::error!(
                error = %e,
                bucket = %descriptor.bucket,
                key = %descriptor.key,
                size_bytes = size,
                duration_ms = start.elapsed().as_secs_f64() * 1000.0,
                "S3 upload failed"
            );
            StorageError::UploadFailed(e.to_string())
        })?;

        tracing::info!(
            bucket = %descriptor.bucket,
            key = %descriptor.key,
            size_bytes = size,
            duration_ms = start.elapsed().as_secs_f64() * 1000.0,
            "S3 upload successful"
        );

        let mut created = descriptor.clone();
        created.size = Some(size);
        created.last_modified = Some(chrono::Utc::now());
        if created.content_type.is_none() {
            created.content_type = Some(content_type::guess_from_key(&descriptor.key).to_string());
        }
        Ok(created)
    }

    async fn get_readable(&self, descriptor: &FileDescriptor) -> StorageResult<ByteStream> {
        let (store, location) = self.locate(descriptor)?;
        let start = std::time::Instant::now();

        let result: ObjectResult<_> = store.get(&location).await;

        let result = result.map_err(|e| match e {
            ObjectStoreError::NotFound { .. } => StorageError::NotFound(descriptor.identity()),
            other => {
                tracing::error!(
                    error = %other,
                    bucket = %descriptor.bucket,
                    key = %descriptor.key,
                    duration_ms = start.elapsed().as_secs_f64() * 1000.0,
                    "S3 download failed"
                );
                StorageError::DownloadFailed(other.to_string())
            }
        })?;

        let bucket = descriptor.bucket.clone();
        let key = descriptor.key.clone();

        let stream = result.into_stream().map(move |res| match res {
            Ok(bytes) => Ok(bytes),
            Err(e) => {
                tracing::error!(
                    bucket = %bucket,
                    key = %key,
                    duration_ms = start.elapsed().as_secs_f64() * 1000.0,
                    "S3 stream download error"
                );
                Err(StorageError::DownloadFailed(e.to_string()))
            }
        });

        Ok(Box::pin(stream))
    }

    async fn copy(
        &self,
        source: &FileDescriptor,
        destination: &FileDescriptor,
    ) -> StorageResult<FileDescriptor> {
        let (store, from) = self.locate(source)?;
        let (destination_store, to) = self.locate(destination)?;
        let start = std::time::Instant::now();

        if source.bucket == destination.bucket {
            let copy_result: ObjectResult<_> = store.copy(&from, &to).await;
            copy_result.map_err(|e| match e {
                ObjectStoreError::NotFound { .. } => StorageError::NotFound(source.identity()),
                other => StorageError::BackendError(other.to_string()),
            })?;
        } else {
            // Cross-bucket: object_store copies within one store only.
            let result: ObjectResult<_> = store.get(&from).await;
            let bytes = result
                .map_err(|e| match e {
                    ObjectStoreError::NotFound { .. } => StorageError::NotFound(source.identity()),
                    other => StorageError::DownloadFailed(other.to_string()),
                })?
                .bytes()
                .await
                .map_err(|e| StorageError::DownloadFailed(e.to_string()))?;

            let put_result: ObjectResult<_> = destination_store
                .put(&to, PutPayload::from(bytes))
                .await;
            put_result.map_err(|e| StorageError::UploadFailed(e.to_string()))?;
        }

        tracing::info!(
            from = %source.identity(),
            to = %destination.identity(),
            duration_ms = start.elapsed().as_secs_f64() * 1000.0,
            "S3 copy successful"
        );

        let mut copied = self.metadata(destination).await?;
        if copied.content_type.is_none() {
            copied.content_type = source.content_type.clone();
        }
        Ok(copied)
    }

    async fn signed_url(
        &self,
        descriptor: &FileDescriptor,
        expires_in: Duration,
        action: UrlAction,
    ) -> StorageResult<String> {
        let (store, location) = self.locate(descriptor)?;
        let method = match action {
            UrlAction::Read => Method::GET,
            UrlAction::Write => Method::PUT,
        };

        let url_result: ObjectResult<_> = store.signed_url(method, &location, expires_in).await;

        let url = url_result
            .map_err(|e| StorageError::BackendError(e.to_string()))?
            .to_string();

        Ok(url)
    }

    async fn delete(&self, descriptor: &FileDescriptor) -> StorageResult<bool> {
        let (store, location) = self.locate(descriptor)?;
        let start = std::time::Instant::now();

        // S3 deletes are idempotent; a HEAD tells us whether anything was there.
        match store.head(&location).await {
            Ok(_) => {}
            Err(ObjectStoreError::NotFound { .. }) => return Ok(false),
            Err(e) => return Err(StorageError::BackendError(e.to_string())),
        }

        let result: ObjectResult<_> = store.delete(&location).await;

        result.map_err(|e| {
            tracing::error!(
                error = %e,
                bucket = %descriptor.bucket,
                key = %descriptor.key,
                duration_ms = start.elapsed().as_secs_f64() * 1000.0,
                "S3 delete failed"
            );
            StorageError::DeleteFailed(e.to_string())
        })?;

        tracing::info!(
            bucket = %descriptor.bucket,
            key = %descriptor.key,
            duration_ms = start.elapsed().as_secs_f64() * 1000.0,
            "S3 delete successful"
        );

        Ok(true)
    }

    async fn metadata(&self, descriptor: &FileDescriptor) -> StorageResult<FileDescriptor> {
        let (store, location) = self.locate(descriptor)?;
        let meta = match store.head(&location).await {
            Ok(meta) => meta,
            Err(ObjectStoreError::NotFound { .. }) => {
                return Err(StorageError::NotFound(descriptor.identity()))
            }
            Err(e) => return Err(StorageError::BackendError(e.to_string())),
        };

        let mut described = descriptor.clone();
        described.size = Some(meta.size as u64);
        described.last_modified = Some(meta.last_modified);
        if described.content_type.is_none() {
            described.content_type =
                Some(content_type::guess_from_key(&descriptor.key).to_string());
        }
        Ok(described)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::traits::Capability;

    fn storage() -> S3Storage {
        S3Storage {
            stores: Arc::new(Mutex::new(HashMap::new())),
            region: "us-east-1".to_string(),
            endpoint_url: Some("http://localhost:9000".to_string()),
        }
    }

    #[test]
    fn test_store_is_cached_per_bucket() {
        let storage = storage();
        storage.store("media").unwrap();
        storage.store("media").unwrap();
        storage.store("archive").unwrap();
        assert_eq!(storage.stores.lock().unwrap().len(), 2);
    }

    #[test]
    fn test_invalid_keys_rejected_before_network() {
        let storage = storage();
        let result = storage.locate(&FileDescriptor::new("media", "../secret"));
        assert!(matches!(result, Err(StorageError::InvalidKey(_))));
        assert!(storage.stores.lock().unwrap().is_empty());
    }

    #[test]
    fn test_capabilities() {
        let caps = storage().capabilities();
        assert!(caps.supports(Capability::Copy));
        assert!(caps.supports(Capability::UploadUrl));
        assert!(caps.supports(Capability::Thumbnail));
    }
}
