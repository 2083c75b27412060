//! Stowage Storage Library
//!
//! This crate provides the `StorageAdapter` capability contract and its
//! implementations (local filesystem, in-memory, S3-compatible), streaming
//! transfer helpers with progress accounting, a middleware-guarded adapter
//! decorator, and the per-category provider registries.
//!
//! # Object layout
//!
//! Objects are addressed by a [`FileDescriptor`]'s `bucket` and `key`. Keys
//! must not contain `..` or start with `/`; bucket names must not contain `/`.
//! Validation is centralized in the `keys` module so all backends agree.

pub mod content_type;
pub mod factory;
pub mod guarded;
pub(crate) mod keys;
#[cfg(feature = "storage-local")]
pub mod local;
pub mod memory;
#[cfg(feature = "storage-s3")]
pub mod s3;
pub mod services;
pub mod traits;
pub mod transfer;

// Re-export commonly used types
pub use factory::{create_storage, register_storage};
pub use guarded::MiddlewareStorage;
#[cfg(feature = "storage-local")]
pub use local::LocalStorage;
pub use memory::MemoryStorage;
#[cfg(feature = "storage-s3")]
pub use s3::S3Storage;
pub use services::ServiceRegistries;
pub use stowage_core::{FileDescriptor, StorageBackend};
pub use traits::{
    ByteReader, ByteStream, Capabilities, Capability, DownloadTarget, Downloaded, MoveOutcome,
    StorageAdapter, StorageError, StorageResult, UrlAction,
};
pub use transfer::{ProgressEvent, TransferDirection, TransferProgress};
