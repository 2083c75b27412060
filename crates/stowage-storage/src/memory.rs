//! In-memory storage
//!
//! Keeps objects in a process-local map. Supports every optional operation,
//! which makes it the reference adapter for tests of code that sits on top of
//! [`StorageAdapter`].

use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;

use async_trait::async_trait;
use bytes::Bytes;
use chrono::{DateTime, Utc};
use futures::stream;
use stowage_core::FileDescriptor;
use tokio::io::AsyncReadExt;

use crate::content_type;
use crate::keys;
use crate::traits::{
    ByteReader, ByteStream, Capabilities, StorageAdapter, StorageError, StorageResult, UrlAction,
};

const CHUNK_SIZE: usize = 64 * 1024;

#[derive(Debug, Clone)]
struct StoredObject {
    data: Bytes,
    content_type: String,
    last_modified: DateTime<Utc>,
}

type ObjectMap = HashMap<(String, String), StoredObject>;

/// Storage backed by a shared in-memory map. Clones share the same objects.
#[derive(Clone, Default)]
pub struct MemoryStorage {
    objects: Arc<Mutex<ObjectMap>>,
}

impl MemoryStorage {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, ObjectMap> {
        self.objects.lock().unwrap_or_else(|e| e.into_inner())
    }

    fn slot(descriptor: &FileDescriptor) -> (String, String) {
        (descriptor.bucket.clone(), descriptor.key.clone())
    }

    /// Store `data` directly, bypassing validation and logging
    pub fn insert(&self, descriptor: &FileDescriptor, data: impl Into<Bytes>) {
        let content_type = descriptor
            .content_type
            .clone()
            .unwrap_or_else(|| content_type::guess_from_key(&descriptor.key).to_string());
        self.lock().insert(
            Self::slot(descriptor),
            StoredObject {
                data: data.into(),
                content_type,
                last_modified: Utc::now(),
            },
        );
    }

    /// Stored bytes of an object
    pub fn contents(&self, descriptor: &FileDescriptor) -> Option<Bytes> {
        self.lock()
            .get(&Self::slot(descriptor))
            .map(|object| object.data.clone())
    }

    pub fn contains(&self, descriptor: &FileDescriptor) -> bool {
        self.lock().contains_key(&Self::slot(descriptor))
    }

    /// Sorted keys stored in `bucket`
    pub fn keys(&self, bucket: &str) -> Vec<String> {
        let mut keys: Vec<String> = self
            .lock()
            .keys()
            .filter(|(b, _)| b == bucket)
            .map(|(_, k)| k.clone())
            .collect();
        keys.sort();
        keys
    }

    pub fn len(&self) -> usize {
        self.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.lock().is_empty()
    }

    fn describe(descriptor: &FileDescriptor, object: &StoredObject) -> FileDescriptor {
        let mut described = descriptor.clone();
        described.size = Some(object.data.len() as u64);
        described.content_type = Some(object.content_type.clone());
        described.last_modified = Some(object.last_modified);
        described
    }
}

#[async_trait]
impl StorageAdapter for MemoryStorage {
    fn name(&self) -> &'static str {
        "memory"
    }

    fn capabilities(&self) -> Capabilities {
        Capabilities::all()
    }

    async fn create(
        &self,
        descriptor: &FileDescriptor,
        mut source: ByteReader,
    ) -> StorageResult<FileDescriptor> {
        keys::validate(descriptor)?;

        let mut buffer = Vec::new();
        source.read_to_end(&mut buffer).await.map_err(|e| {
            StorageError::UploadFailed(format!("Failed to read upload source: {}", e))
        })?;

        self.insert(descriptor, buffer);

        let guard = self.lock();
        let object = guard
            .get(&Self::slot(descriptor))
            .ok_or_else(|| StorageError::UploadFailed(descriptor.identity()))?;

        tracing::debug!(
            key = %descriptor.identity(),
            size_bytes = object.data.len(),
            "Memory storage upload successful"
        );

        Ok(Self::describe(descriptor, object))
    }

    async fn get_readable(&self, descriptor: &FileDescriptor) -> StorageResult<ByteStream> {
        keys::validate(descriptor)?;

        let data = self
            .contents(descriptor)
            .ok_or_else(|| StorageError::NotFound(descriptor.identity()))?;

        let chunks: Vec<Result<Bytes, StorageError>> = (0..data.len())
            .step_by(CHUNK_SIZE)
            .map(|start| Ok(data.slice(start..(start + CHUNK_SIZE).min(data.len()))))
            .collect();

        Ok(Box::pin(stream::iter(chunks)))
    }

    async fn copy(
        &self,
        source: &FileDescriptor,
        destination: &FileDescriptor,
    ) -> StorageResult<FileDescriptor> {
        keys::validate(source)?;
        keys::validate(destination)?;

        let mut objects = self.lock();
        let mut object = objects
            .get(&Self::slot(source))
            .cloned()
            .ok_or_else(|| StorageError::NotFound(source.identity()))?;
        if let Some(content_type) = &destination.content_type {
            object.content_type = content_type.clone();
        }
        object.last_modified = Utc::now();

        let copied = Self::describe(destination, &object);
        objects.insert(Self::slot(destination), object);
        Ok(copied)
    }

    async fn signed_url(
        &self,
        descriptor: &FileDescriptor,
        expires_in: Duration,
        action: UrlAction,
    ) -> StorageResult<String> {
        keys::validate(descriptor)?;

        let mode = match action {
            UrlAction::Read => "read",
            UrlAction::Write => "write",
        };
        Ok(format!(
            "memory://{}/{}?mode={}&expires_in={}",
            descriptor.bucket,
            descriptor.key,
            mode,
            expires_in.as_secs()
        ))
    }

    async fn delete(&self, descriptor: &FileDescriptor) -> StorageResult<bool> {
        keys::validate(descriptor)?;
        Ok(self.lock().remove(&Self::slot(descriptor)).is_some())
    }

    async fn metadata(&self, descriptor: &FileDescriptor) -> StorageResult<FileDescriptor> {
        keys::validate(descriptor)?;
        self.lock()
            .get(&Self::slot(descriptor))
            .map(|object| Self::describe(descriptor, object))
            .ok_or_else(|| StorageError::NotFound(descriptor.identity()))
    }
}
