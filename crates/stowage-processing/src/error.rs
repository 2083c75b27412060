//! Processing errors
//!
//! Per-size failures (`ToolFailed`, `ToolTimedOut`, `Image`, `Upload`, ...)
//! are normally caught by the thumbnail pipeline and recorded next to the
//! sizes that did succeed. Only staging, invalid input, an all-sizes failure
//! or a pipeline-wide timeout reach the caller.

use std::collections::BTreeMap;
use std::time::Duration;

use stowage_core::ErrorKind;
use stowage_storage::StorageError;
use thiserror::Error;

use crate::classify::MediaClass;

#[derive(Debug, Error)]
pub enum ProcessingError {
    #[error("Failed to stage {identity}: {source}")]
    Staging {
        identity: String,
        #[source]
        source: StorageError,
    },

    #[error("{tool} exited with {}: {stderr}", exit_label(.status))]
    ToolFailed {
        tool: String,
        status: Option<i32>,
        stderr: String,
    },

    #[error("{tool} did not finish within {timeout:?}")]
    ToolTimedOut { tool: String, timeout: Duration },

    #[error("Failed to launch {tool}: {source}")]
    ToolLaunch {
        tool: String,
        #[source]
        source: std::io::Error,
    },

    #[error("Invalid tool path: {0}")]
    InvalidToolPath(String),

    #[cfg(feature = "image")]
    #[error("Image processing failed: {0}")]
    Image(#[from] image::ImageError),

    #[error("Failed to probe media: {0}")]
    Probe(#[source] anyhow::Error),

    #[error("Failed to upload {key}: {source}")]
    Upload {
        key: String,
        #[source]
        source: StorageError,
    },

    #[error("Thumbnail key {key} is the source object itself")]
    OverwritesSource { key: String },

    #[error("All thumbnail sizes failed for {identity}")]
    AllSizesFailed {
        identity: String,
        failures: BTreeMap<String, String>,
    },

    #[error("Invalid thumbnail size: {0}")]
    InvalidSize(u32),

    #[error("{adapter} storage cannot host thumbnails")]
    Unsupported { adapter: &'static str },

    #[error("No thumbnail renderer for {0} files")]
    UnsupportedMedia(MediaClass),

    #[error("Thumbnail generation exceeded {0:?}")]
    TimedOut(Duration),

    #[error("Failed to create workspace: {0}")]
    Workspace(#[source] std::io::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl ProcessingError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            ProcessingError::Staging { source, .. } | ProcessingError::Upload { source, .. } => {
                source.kind()
            }
            ProcessingError::ToolFailed { .. }
            | ProcessingError::ToolTimedOut { .. }
            | ProcessingError::ToolLaunch { .. }
            | ProcessingError::Probe(_)
            | ProcessingError::AllSizesFailed { .. }
            | ProcessingError::TimedOut(_) => ErrorKind::ExternalToolFailure,
            ProcessingError::InvalidToolPath(_)
            | ProcessingError::InvalidSize(_)
            | ProcessingError::OverwritesSource { .. } => ErrorKind::Validation,
            ProcessingError::Unsupported { .. } | ProcessingError::UnsupportedMedia(_) => {
                ErrorKind::Unsupported
            }
            #[cfg(feature = "image")]
            ProcessingError::Image(_) => ErrorKind::Internal,
            ProcessingError::Workspace(_) | ProcessingError::Io(_) => ErrorKind::Internal,
        }
    }

    /// Whether this failure came from a tool that ran past its timeout
    pub fn is_timeout(&self) -> bool {
        matches!(
            self,
            ProcessingError::ToolTimedOut { .. } | ProcessingError::TimedOut(_)
        )
    }
}

fn exit_label(status: &Option<i32>) -> String {
    match status {
        Some(code) => code.to_string(),
        None => "signal".to_string(),
    }
}

pub type ProcessingResult<T> = Result<T, ProcessingError>;
