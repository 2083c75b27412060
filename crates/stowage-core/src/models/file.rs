//! Stored object descriptor

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Identity plus metadata of one object in a storage namespace.
///
/// `bucket` + `key` identify the object. Everything else is metadata that
/// adapters and the media pipeline fill in as they learn it.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct FileDescriptor {
    pub bucket: String,
    pub key: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub label: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub content_type: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub size: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_modified: Option<DateTime<Utc>>,

    // Media fields
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub width: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub height: Option<u32>,
    /// Seconds
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub duration: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub framerate: Option<f32>,
    /// Bits per second
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub bitrate: Option<u64>,
    /// Thumbnail label (`thumb<size>`) → key of the stored thumbnail
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub thumbnails: BTreeMap<String, String>,
}

impl FileDescriptor {
    pub fn new(bucket: impl Into<String>, key: impl Into<String>) -> Self {
        Self {
            bucket: bucket.into(),
            key: key.into(),
            ..Default::default()
        }
    }

    pub fn with_content_type(mut self, content_type: impl Into<String>) -> Self {
        self.content_type = Some(content_type.into());
        self
    }

    pub fn with_label(mut self, label: impl Into<String>) -> Self {
        self.label = Some(label.into());
        self
    }

    pub fn with_size(mut self, size: u64) -> Self {
        self.size = Some(size);
        self
    }

    /// `bucket/key`, the identity used for logging and workspace naming
    pub fn identity(&self) -> String {
        format!("{}/{}", self.bucket, self.key)
    }

    /// Whether both descriptors address the same stored object
    pub fn same_object(&self, other: &FileDescriptor) -> bool {
        self.bucket == other.bucket && self.key == other.key
    }

    /// Last path segment of the key
    pub fn file_name(&self) -> &str {
        self.key.rsplit('/').next().unwrap_or(&self.key)
    }

    /// Lowercased extension of the file name, if any
    pub fn extension(&self) -> Option<String> {
        let name = self.file_name();
        match name.rfind('.') {
            Some(idx) if idx > 0 && idx + 1 < name.len() => Some(name[idx + 1..].to_lowercase()),
            _ => None,
        }
    }

    /// Key prefix before the file name, without trailing slash. Empty when the
    /// object sits at the bucket root.
    pub fn directory(&self) -> &str {
        match self.key.rfind('/') {
            Some(idx) => &self.key[..idx],
            None => "",
        }
    }

    /// Descriptor for `file_name` in the same bucket and directory
    pub fn sibling(&self, file_name: &str) -> FileDescriptor {
        let dir = self.directory();
        let key = if dir.is_empty() {
            file_name.to_string()
        } else {
            format!("{}/{}", dir, file_name)
        };
        FileDescriptor::new(self.bucket.clone(), key)
    }
}
