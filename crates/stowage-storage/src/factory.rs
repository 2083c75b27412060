#[cfg(feature = "storage-local")]
use crate::LocalStorage;
#[cfg(feature = "storage-s3")]
use crate::S3Storage;
use crate::{MemoryStorage, ServiceRegistries, StorageAdapter, StorageBackend, StorageError, StorageResult};
use std::sync::Arc;
use stowage_core::StorageConfig;

/// Create a storage backend based on configuration
pub async fn create_storage(config: &StorageConfig) -> StorageResult<Arc<dyn StorageAdapter>> {
    config
        .validate()
        .map_err(|e| StorageError::ConfigError(e.to_string()))?;

    match config.backend {
        #[cfg(feature = "storage-s3")]
        StorageBackend::S3 => {
            let bucket = config
                .s3_bucket
                .clone()
                .ok_or_else(|| StorageError::ConfigError("S3_BUCKET not configured".to_string()))?;
            let region = config.s3_region.clone().ok_or_else(|| {
                StorageError::ConfigError("S3_REGION or AWS_REGION not configured".to_string())
            })?;
            let endpoint = config.s3_endpoint.clone();

            let storage = S3Storage::new(bucket, region, endpoint).await?;
            Ok(Arc::new(storage))
        }

        #[cfg(not(feature = "storage-s3"))]
        StorageBackend::S3 => Err(StorageError::ConfigError(
            "S3 storage backend not available (storage-s3 feature not enabled)".to_string(),
        )),

        #[cfg(feature = "storage-local")]
        StorageBackend::Local => {
            let base_path = config.local_storage_path.clone().ok_or_else(|| {
                StorageError::ConfigError("LOCAL_STORAGE_PATH not configured".to_string())
            })?;
            let base_url = config.local_storage_base_url.clone().ok_or_else(|| {
                StorageError::ConfigError("LOCAL_STORAGE_BASE_URL not configured".to_string())
            })?;

            let storage = LocalStorage::new(base_path, base_url).await?;
            let storage = match &config.local_storage_signing_key {
                Some(key) => storage.with_signing_key(key),
                None => storage,
            };
            Ok(Arc::new(storage))
        }

        #[cfg(not(feature = "storage-local"))]
        StorageBackend::Local => Err(StorageError::ConfigError(
            "Local storage backend not available (storage-local feature not enabled)".to_string(),
        )),

        StorageBackend::Memory => Ok(Arc::new(MemoryStorage::new())),
    }
}

/// Create the configured backend and register it in the storage registry
/// under the configured alias, as the default.
pub async fn register_storage(
    registries: &ServiceRegistries,
    config: &StorageConfig,
) -> StorageResult<Arc<dyn StorageAdapter>> {
    let storage = create_storage(config).await?;
    registries
        .storage
        .register(config.alias.clone(), storage.clone(), true);

    tracing::info!(
        backend = %config.backend,
        alias = %config.alias,
        "Storage adapter registered"
    );

    Ok(storage)
}

#[cfg(test)]
mod tests {
    use super::*;
    use stowage_core::ErrorKind;

    fn config(backend: StorageBackend) -> StorageConfig {
        StorageConfig {
            backend,
            alias: "primary".to_string(),
            local_storage_path: None,
            local_storage_base_url: None,
            local_storage_signing_key: None,
            s3_bucket: None,
            s3_region: None,
            s3_endpoint: None,
        }
    }

    #[tokio::test]
    async fn test_memory_backend_registers_as_default() {
        let registries = ServiceRegistries::new();
        let storage = register_storage(&registries, &config(StorageBackend::Memory))
            .await
            .unwrap();

        assert_eq!(storage.name(), "memory");
        assert_eq!(registries.storage.default_alias().as_deref(), Some("primary"));
        assert_eq!(registries.storage.resolve(None).unwrap().name(), "memory");
    }

    #[cfg(feature = "storage-local")]
    #[tokio::test]
    async fn test_local_backend() {
        let dir = tempfile::tempdir().unwrap();
        let mut config = config(StorageBackend::Local);
        config.local_storage_path = Some(dir.path().join("objects").display().to_string());
        config.local_storage_base_url = Some("http://localhost:3000/files".to_string());

        let storage = create_storage(&config).await.unwrap();
        assert_eq!(storage.name(), "local");
        assert!(dir.path().join("objects").is_dir());
        assert!(!storage.capabilities().supports(crate::Capability::SignedUrl));

        config.local_storage_signing_key = Some("s3cret".to_string());
        let signed = create_storage(&config).await.unwrap();
        assert!(signed.capabilities().supports(crate::Capability::SignedUrl));
    }

    #[tokio::test]
    async fn test_configured_backend_replaces_existing_default() {
        let registries = ServiceRegistries::new();
        registries
            .storage
            .register("scratch", Arc::new(MemoryStorage::new()), true);

        register_storage(&registries, &config(StorageBackend::Memory))
            .await
            .unwrap();

        assert_eq!(registries.storage.default_alias().as_deref(), Some("primary"));
        assert!(registries.storage.contains("scratch"));
    }

    #[tokio::test]
    async fn test_missing_settings_are_config_errors() {
        let err = create_storage(&config(StorageBackend::Local))
            .await
            .err()
            .unwrap();
        assert_eq!(err.kind(), ErrorKind::Validation);

        let err = create_storage(&config(StorageBackend::S3)).await.err().unwrap();
        assert!(matches!(err, StorageError::ConfigError(_)));
    }
}
