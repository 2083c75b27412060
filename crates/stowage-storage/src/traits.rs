//! Storage abstraction trait
//!
//! This module defines the `StorageAdapter` contract every storage backend
//! implements, plus the capability set adapters use to declare which optional
//! operations they support. Optional operations default to an `Unsupported`
//! error instead of silently succeeding.

use std::fmt::{Display, Formatter, Result as FmtResult};
use std::path::PathBuf;
use std::pin::Pin;
use std::time::Duration;

use async_trait::async_trait;
use bytes::Bytes;
use futures::Stream;
use stowage_core::{CoreError, ErrorKind, FileDescriptor};
use thiserror::Error;
use tokio::io::AsyncRead;

use crate::transfer;

/// Storage operation errors
#[derive(Debug, Error)]
pub enum StorageError {
    #[error("Upload failed: {0}")]
    UploadFailed(String),

    #[error("Download failed: {0}")]
    DownloadFailed(String),

    #[error("Delete failed: {0}")]
    DeleteFailed(String),

    #[error("File not found: {0}")]
    NotFound(String),

    #[error("Invalid storage key: {0}")]
    InvalidKey(String),

    #[error("{adapter} storage does not support {operation}")]
    Unsupported {
        adapter: &'static str,
        operation: &'static str,
    },

    #[error("Storage backend error: {0}")]
    BackendError(String),

    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),

    #[error("Configuration error: {0}")]
    ConfigError(String),

    #[error(transparent)]
    Rejected(#[from] CoreError),
}

impl StorageError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            StorageError::NotFound(_) => ErrorKind::NotFound,
            StorageError::InvalidKey(_) | StorageError::ConfigError(_) => ErrorKind::Validation,
            StorageError::Unsupported { .. } => ErrorKind::Unsupported,
            StorageError::UploadFailed(_)
            | StorageError::DownloadFailed(_)
            | StorageError::DeleteFailed(_)
            | StorageError::BackendError(_) => ErrorKind::VendorFailure,
            StorageError::IoError(_) => ErrorKind::Internal,
            StorageError::Rejected(e) => e.kind(),
        }
    }
}

/// Result type for storage operations
pub type StorageResult<T> = Result<T, StorageError>;

/// Readable source handed to [`StorageAdapter::create`]
pub type ByteReader = Pin<Box<dyn AsyncRead + Send + Unpin>>;

/// Chunked object content returned by [`StorageAdapter::get_readable`]
pub type ByteStream = Pin<Box<dyn Stream<Item = Result<Bytes, StorageError>> + Send>>;

/// Optional operations an adapter may support
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Capability {
    /// Server-side `copy` (and therefore `move_object`)
    Copy,
    /// Time-bounded read URLs
    SignedUrl,
    /// Time-bounded write URLs
    UploadUrl,
    /// Can host derived thumbnails next to the original object
    Thumbnail,
}

impl Capability {
    const ALL: [Capability; 4] = [
        Capability::Copy,
        Capability::SignedUrl,
        Capability::UploadUrl,
        Capability::Thumbnail,
    ];

    fn bit(self) -> u8 {
        1 << (self as u8)
    }
}

impl Display for Capability {
    fn fmt(&self, f: &mut Formatter<'_>) -> FmtResult {
        match self {
            Capability::Copy => write!(f, "copy"),
            Capability::SignedUrl => write!(f, "signed_url"),
            Capability::UploadUrl => write!(f, "upload_url"),
            Capability::Thumbnail => write!(f, "thumbnail"),
        }
    }
}

/// Set of [`Capability`] values declared by an adapter
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Capabilities(u8);

impl Capabilities {
    pub const fn none() -> Self {
        Capabilities(0)
    }

    pub fn all() -> Self {
        Capability::ALL
            .iter()
            .fold(Self::none(), |set, capability| set.with(*capability))
    }

    pub fn with(self, capability: Capability) -> Self {
        Capabilities(self.0 | capability.bit())
    }

    pub fn supports(&self, capability: Capability) -> bool {
        self.0 & capability.bit() != 0
    }

    pub fn iter(&self) -> impl Iterator<Item = Capability> + '_ {
        Capability::ALL
            .iter()
            .copied()
            .filter(move |capability| self.supports(*capability))
    }
}

impl FromIterator<Capability> for Capabilities {
    fn from_iter<I: IntoIterator<Item = Capability>>(iter: I) -> Self {
        iter.into_iter().fold(Self::none(), Capabilities::with)
    }
}

/// Where [`StorageAdapter::download`] puts the object
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DownloadTarget {
    /// Stream into a local file, creating or truncating it
    Path(PathBuf),
    /// Collect into memory
    Memory,
}

/// Result of a download, matching the requested [`DownloadTarget`]
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Downloaded {
    Path(PathBuf),
    Bytes(Bytes),
}

/// Signed URL direction
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UrlAction {
    Read,
    Write,
}

/// Outcome of [`StorageAdapter::move_object`]
#[derive(Debug)]
pub enum MoveOutcome {
    /// Destination written and source removed
    Completed(FileDescriptor),
    /// Destination written but the source could not be removed; the object
    /// now exists in both places
    SourceRetained {
        destination: FileDescriptor,
        reason: StorageError,
    },
}

impl MoveOutcome {
    pub fn is_complete(&self) -> bool {
        matches!(self, MoveOutcome::Completed(_))
    }

    pub fn destination(&self) -> &FileDescriptor {
        match self {
            MoveOutcome::Completed(destination) => destination,
            MoveOutcome::SourceRetained { destination, .. } => destination,
        }
    }
}

/// Storage abstraction trait
///
/// All storage backends implement this trait so the media pipeline and every
/// other caller work against any vendor without knowing which one is bound.
/// Vendor failures keep the underlying SDK message and are never retried here.
#[async_trait]
pub trait StorageAdapter: Send + Sync {
    /// Short adapter name used in logs and errors, e.g. `local`
    fn name(&self) -> &'static str;

    /// Optional operations this adapter supports
    fn capabilities(&self) -> Capabilities;

    /// Store the full content of `source` at `descriptor`.
    ///
    /// The reader is consumed to EOF before the object becomes visible. The
    /// returned descriptor has `size` (and `last_modified` where known) filled.
    async fn create(
        &self,
        descriptor: &FileDescriptor,
        source: ByteReader,
    ) -> StorageResult<FileDescriptor>;

    /// Open the object as a stream of chunks. `NotFound` if it does not exist.
    async fn get_readable(&self, descriptor: &FileDescriptor) -> StorageResult<ByteStream>;

    /// Retrieve the full object into a local file or into memory.
    ///
    /// Streams chunk by chunk and logs download progress when the object size
    /// is known.
    async fn download(
        &self,
        descriptor: &FileDescriptor,
        target: DownloadTarget,
    ) -> StorageResult<Downloaded> {
        let total = match descriptor.size {
            Some(size) => Some(size),
            // Size only feeds progress logging; a failed lookup is not fatal.
            None => self.metadata(descriptor).await.ok().and_then(|m| m.size),
        };
        let stream = self.get_readable(descriptor).await?;

        match target {
            DownloadTarget::Path(path) => {
                transfer::write_stream_to_path(stream, &path, total, &descriptor.key).await?;
                Ok(Downloaded::Path(path))
            }
            DownloadTarget::Memory => {
                let bytes = transfer::collect_stream(stream, total, &descriptor.key).await?;
                Ok(Downloaded::Bytes(bytes))
            }
        }
    }

    /// Copy an object to another descriptor, returning the destination
    async fn copy(
        &self,
        _source: &FileDescriptor,
        _destination: &FileDescriptor,
    ) -> StorageResult<FileDescriptor> {
        Err(StorageError::Unsupported {
            adapter: self.name(),
            operation: "copy",
        })
    }

    /// Copy then delete the source.
    ///
    /// Only reports [`MoveOutcome::Completed`] once the source deletion
    /// succeeded; a failed deletion yields [`MoveOutcome::SourceRetained`].
    /// Moving an object onto itself is rejected before anything is touched.
    async fn move_object(
        &self,
        source: &FileDescriptor,
        destination: &FileDescriptor,
    ) -> StorageResult<MoveOutcome> {
        if source.same_object(destination) {
            return Err(StorageError::InvalidKey(format!(
                "Cannot move {} onto itself",
                source.identity()
            )));
        }

        let copied = self.copy(source, destination).await?;

        match self.delete(source).await {
            Ok(_) => Ok(MoveOutcome::Completed(copied)),
            Err(reason) => {
                tracing::warn!(
                    adapter = self.name(),
                    source = %source.identity(),
                    destination = %copied.identity(),
                    error = %reason,
                    "Move left source in place"
                );
                Ok(MoveOutcome::SourceRetained {
                    destination: copied,
                    reason,
                })
            }
        }
    }

    /// Time-bounded URL for reading or writing the object
    async fn signed_url(
        &self,
        _descriptor: &FileDescriptor,
        _expires_in: Duration,
        action: UrlAction,
    ) -> StorageResult<String> {
        Err(StorageError::Unsupported {
            adapter: self.name(),
            operation: match action {
                UrlAction::Read => "signed_url",
                UrlAction::Write => "upload_url",
            },
        })
    }

    /// Time-bounded URL clients can upload to directly
    async fn upload_url(
        &self,
        descriptor: &FileDescriptor,
        expires_in: Duration,
    ) -> StorageResult<String> {
        self.signed_url(descriptor, expires_in, UrlAction::Write)
            .await
    }

    /// Delete an object. `false` when it was already absent.
    async fn delete(&self, descriptor: &FileDescriptor) -> StorageResult<bool>;

    /// Descriptor with `size`, `content_type` and `last_modified` filled
    async fn metadata(&self, descriptor: &FileDescriptor) -> StorageResult<FileDescriptor>;
}
