//! Stowage Processing Library
//!
//! Media thumbnail generation on top of any [`StorageAdapter`]: content-type
//! classification, per-invocation workspaces, external tool orchestration
//! (`ffmpeg`, `ffprobe`, ImageMagick `convert`), concurrent per-size
//! rendering with failure isolation, and media metadata probing.
//!
//! [`StorageAdapter`]: stowage_storage::StorageAdapter

pub mod classify;
#[cfg(feature = "document")]
pub mod document;
pub mod error;
pub mod probe;
#[cfg(feature = "image")]
pub mod raster;
pub mod thumbnail;
pub mod tools;
#[cfg(feature = "video")]
pub mod video;
pub mod workspace;

// Re-export commonly used types
pub use classify::MediaClass;
pub use error::{ProcessingError, ProcessingResult};
pub use probe::{MediaProbe, VideoMetadata};
pub use thumbnail::{thumbnail_descriptor, thumbnail_label, ThumbnailPipeline, ThumbnailSet};
pub use tools::{
    ConfiguredTools, ProcessRunner, Tool, ToolContext, ToolInvocation, ToolLocator, ToolOutput,
    ToolRunner,
};
pub use workspace::Workspace;
