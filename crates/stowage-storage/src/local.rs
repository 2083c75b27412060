use crate::content_type;
use crate::keys;
use crate::traits::{
    ByteReader, ByteStream, Capabilities, Capability, StorageAdapter, StorageError,
    StorageResult, UrlAction,
};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use futures::StreamExt;
use hmac::{Hmac, Mac};
use sha2::Sha256;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;
use stowage_core::{CoreError, FileDescriptor};
use tokio::fs;
use uuid::Uuid;

type HmacSha256 = Hmac<Sha256>;

/// Local filesystem storage implementation
///
/// Objects live at `{base_path}/{bucket}/{key}`. Writes go to a sibling
/// `.partial` file that is renamed into place once fully synced, so readers
/// never observe a half-written object.
///
/// Read URLs are only offered once a signing key is set: they carry
/// `expires` and an HMAC-SHA256 `signature` over `bucket/key:expires`,
/// checked by [`LocalStorage::verify_signed_url`].
#[derive(Clone)]
pub struct LocalStorage {
    base_path: PathBuf,
    base_url: String,
    signing_key: Option<Arc<[u8]>>,
}

impl LocalStorage {
    /// Create a new LocalStorage instance
    ///
    /// # Arguments
    /// * `base_path` - Root directory for file storage (e.g., "/var/lib/stowage")
    /// * `base_url` - Base URL for serving files (e.g., "http://localhost:3000/files")
    pub async fn new(base_path: impl Into<PathBuf>, base_url: String) -> StorageResult<Self> {
        let base_path = base_path.into();

        fs::create_dir_all(&base_path).await.map_err(|e| {
            StorageError::ConfigError(format!(
                "Failed to create storage directory {}: {}",
                base_path.display(),
                e
            ))
        })?;

        Ok(LocalStorage {
            base_path,
            base_url,
            signing_key: None,
        })
    }

    /// Enable signed read URLs keyed with `key`
    pub fn with_signing_key(mut self, key: impl AsRef<[u8]>) -> Self {
        self.signing_key = Some(Arc::from(key.as_ref()));
        self
    }

    fn mac(&self, descriptor: &FileDescriptor, expires: i64) -> StorageResult<HmacSha256> {
        let key = self.signing_key.as_deref().ok_or(StorageError::Unsupported {
            adapter: "local",
            operation: "signed_url",
        })?;
        let mut mac = HmacSha256::new_from_slice(key)
            .map_err(|e| StorageError::ConfigError(format!("Invalid signing key: {}", e)))?;
        mac.update(format!("{}:{}", descriptor.identity(), expires).as_bytes());
        Ok(mac)
    }

    /// Check the `expires` and `signature` query values of a URL produced by
    /// `signed_url` for `descriptor`
    pub fn verify_signed_url(
        &self,
        descriptor: &FileDescriptor,
        expires: i64,
        signature: &str,
    ) -> StorageResult<()> {
        if Utc::now().timestamp() > expires {
            return Err(StorageError::Rejected(CoreError::Validation(
                "Signed URL has expired".to_string(),
            )));
        }

        let signature = hex::decode(signature).map_err(|_| {
            StorageError::Rejected(CoreError::Validation("Malformed URL signature".to_string()))
        })?;

        self.mac(descriptor, expires)?
            .verify_slice(&signature)
            .map_err(|_| {
                StorageError::Rejected(CoreError::Validation("Invalid URL signature".to_string()))
            })
    }

    /// Convert a descriptor to a filesystem path with security validation
    ///
    /// Rejects keys with traversal sequences and keys that resolve outside the
    /// base storage directory through symlinks.
    fn descriptor_to_path(&self, descriptor: &FileDescriptor) -> StorageResult<PathBuf> {
        keys::validate(descriptor)?;

        let path = self.base_path.join(&descriptor.bucket).join(&descriptor.key);

        let base_canonical = self.base_path.canonicalize().map_err(|e| {
            StorageError::ConfigError(format!("Failed to canonicalize base path: {}", e))
        })?;

        if let Ok(canonical) = path.canonicalize() {
            if canonical.strip_prefix(&base_canonical).is_err() {
                return Err(StorageError::InvalidKey(
                    "Storage key resolves outside storage directory".to_string(),
                ));
            }
        }

        Ok(path)
    }

    /// Generate public URL for file
    fn generate_url(&self, descriptor: &FileDescriptor) -> String {
        format!(
            "{}/{}/{}",
            self.base_url.trim_end_matches('/'),
            descriptor.bucket,
            descriptor.key
        )
    }

    /// Ensure parent directory exists
    async fn ensure_parent_dir(&self, path: &Path) -> StorageResult<()> {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).await?;
        }
        Ok(())
    }

    async fn exists(path: &Path) -> bool {
        fs::try_exists(path).await.unwrap_or(false)
    }
}

#[async_trait]
impl StorageAdapter for LocalStorage {
    fn name(&self) -> &'static str {
        "local"
    }

    fn capabilities(&self) -> Capabilities {
        let capabilities = Capabilities::none()
            .with(Capability::Copy)
            .with(Capability::Thumbnail);

        if self.signing_key.is_some() {
            capabilities.with(Capability::SignedUrl)
        } else {
            capabilities
        }
    }

    async fn create(
        &self,
        descriptor: &FileDescriptor,
        mut source: ByteReader,
    ) -> StorageResult<FileDescriptor> {
        let path = self.descriptor_to_path(descriptor)?;
        let start = std::time::Instant::now();

        self.ensure_parent_dir(&path).await?;

        let partial = path.with_file_name(format!(
            ".{}.{}.partial",
            descriptor.file_name(),
            Uuid::new_v4()
        ));

        let write = async {
            let mut file = fs::File::create(&partial).await.map_err(|e| {
                StorageError::UploadFailed(format!(
                    "Failed to create file {}: {}",
                    partial.display(),
                    e
                ))
            })?;

            let bytes_copied = tokio::io::copy(&mut source, &mut file).await.map_err(|e| {
                StorageError::UploadFailed(format!(
                    "Failed to write stream to file {}: {}",
                    path.display(),
                    e
                ))
            })?;

            file.sync_all().await.map_err(|e| {
                StorageError::UploadFailed(format!("Failed to sync file {}: {}", path.display(), e))
            })?;

            fs::rename(&partial, &path).await.map_err(|e| {
                StorageError::UploadFailed(format!(
                    "Failed to commit file {}: {}",
                    path.display(),
                    e
                ))
            })?;

            Ok::<u64, StorageError>(bytes_copied)
        };

        let size = match write.await {
            Ok(size) => size,
            Err(e) => {
                let _ = fs::remove_file(&partial).await;
                return Err(e);
            }
        };

        tracing::info!(
            path = %path.display(),
            key = %descriptor.key,
            size_bytes = size,
            duration_ms = start.elapsed().as_secs_f64() * 1000.0,
            "Local storage upload successful"
        );

        let mut created = descriptor.clone();
        created.size = Some(size);
        created.last_modified = Some(Utc::now());
        if created.content_type.is_none() {
            created.content_type = Some(content_type::guess_from_key(&descriptor.key).to_string());
        }
        Ok(created)
    }

    async fn get_readable(&self, descriptor: &FileDescriptor) -> StorageResult<ByteStream> {
        let path = self.descriptor_to_path(descriptor)?;
        let start = std::time::Instant::now();

        if !Self::exists(&path).await {
            return Err(StorageError::NotFound(descriptor.identity()));
        }

        let file = fs::File::open(&path).await.map_err(|e| {
            StorageError::DownloadFailed(format!("Failed to open file {}: {}", path.display(), e))
        })?;

        let reader = tokio_util::io::ReaderStream::new(file);

        let key = descriptor.key.clone();
        let path_display = path.display().to_string();
        let stream = reader.map(move |result| {
            result.map_err(|e| {
                tracing::error!(
                    path = %path_display,
                    key = %key,
                    duration_ms = start.elapsed().as_secs_f64() * 1000.0,
                    "Local storage stream download error"
                );
                StorageError::DownloadFailed(format!("Failed to read chunk: {}", e))
            })
        });

        Ok(Box::pin(stream))
    }

    async fn copy(
        &self,
        source: &FileDescriptor,
        destination: &FileDescriptor,
    ) -> StorageResult<FileDescriptor> {
        let from_path = self.descriptor_to_path(source)?;
        let to_path = self.descriptor_to_path(destination)?;

        if !Self::exists(&from_path).await {
            return Err(StorageError::NotFound(source.identity()));
        }

        self.ensure_parent_dir(&to_path).await?;

        let size = fs::copy(&from_path, &to_path).await.map_err(|e| {
            StorageError::BackendError(format!(
                "Failed to copy {} to {}: {}",
                from_path.display(),
                to_path.display(),
                e
            ))
        })?;

        tracing::info!(
            from = %source.identity(),
            to = %destination.identity(),
            size_bytes = size,
            "Local storage copy successful"
        );

        let mut copied = destination.clone();
        copied.size = Some(size);
        copied.content_type = destination
            .content_type
            .clone()
            .or_else(|| source.content_type.clone());
        copied.last_modified = Some(Utc::now());
        Ok(copied)
    }

    async fn signed_url(
        &self,
        descriptor: &FileDescriptor,
        expires_in: Duration,
        action: UrlAction,
    ) -> StorageResult<String> {
        if action == UrlAction::Write {
            return Err(StorageError::Unsupported {
                adapter: self.name(),
                operation: "upload_url",
            });
        }

        self.descriptor_to_path(descriptor)?;
        let expires_at = Utc::now()
            + chrono::Duration::from_std(expires_in)
                .map_err(|e| StorageError::InvalidKey(format!("Invalid expiry: {}", e)))?;
        let expires = expires_at.timestamp();
        let signature = hex::encode(self.mac(descriptor, expires)?.finalize().into_bytes());

        Ok(format!(
            "{}?expires={}&signature={}",
            self.generate_url(descriptor),
            expires,
            signature
        ))
    }

    async fn delete(&self, descriptor: &FileDescriptor) -> StorageResult<bool> {
        let path = self.descriptor_to_path(descriptor)?;
        let start = std::time::Instant::now();

        match fs::remove_file(&path).await {
            Ok(()) => {}
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(false),
            Err(e) => {
                return Err(StorageError::DeleteFailed(format!(
                    "Failed to delete file {}: {}",
                    path.display(),
                    e
                )))
            }
        }

        tracing::info!(
            path = %path.display(),
            key = %descriptor.key,
            duration_ms = start.elapsed().as_secs_f64() * 1000.0,
            "Local storage delete successful"
        );

        Ok(true)
    }

    async fn metadata(&self, descriptor: &FileDescriptor) -> StorageResult<FileDescriptor> {
        let path = self.descriptor_to_path(descriptor)?;
        let meta = match fs::metadata(&path).await {
            Ok(meta) if meta.is_file() => meta,
            Ok(_) => return Err(StorageError::NotFound(descriptor.identity())),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                return Err(StorageError::NotFound(descriptor.identity()))
            }
            Err(e) => return Err(StorageError::BackendError(e.to_string())),
        };

        let mut described = descriptor.clone();
        described.size = Some(meta.len());
        described.last_modified = meta.modified().ok().map(DateTime::<Utc>::from);
        if described.content_type.is_none() {
            described.content_type =
                Some(content_type::guess_from_key(&descriptor.key).to_string());
        }
        Ok(described)
    }
}
