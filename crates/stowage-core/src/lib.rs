//! Stowage Core Library
//!
//! This crate provides the pieces shared by every Stowage component: error
//! types, environment-driven configuration, the `FileDescriptor` model, the
//! generic provider registry, the middleware chain and the capability traits
//! for the non-storage service categories.

pub mod config;
pub mod error;
pub mod middleware;
pub mod models;
pub mod providers;
pub mod registry;
pub mod storage_types;
pub mod telemetry;

// Re-export commonly used types
pub use config::{Config, LogConfig, LogFormat, StorageConfig, ThumbnailConfig, TimeoutPolicy};
pub use error::{CoreError, CoreResult, ErrorKind};
pub use middleware::{Action, Middleware, MiddlewareChain};
pub use models::FileDescriptor;
pub use providers::{
    AuthProvider, BackendProvider, Identity, MessagingProvider, Notification, QueueMessage,
    QueueProvider,
};
pub use registry::{ProviderRegistry, ServiceCategory};
pub use storage_types::StorageBackend;
