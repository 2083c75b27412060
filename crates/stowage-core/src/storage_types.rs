use std::fmt::{Display, Formatter, Result as FmtResult};
use std::str::FromStr;

use crate::error::CoreError;

/// Storage backend types
///
/// Selects which adapter the storage factory builds. Defined in core because
/// configuration parses it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StorageBackend {
    S3,
    Local,
    Memory,
}

impl FromStr for StorageBackend {
    type Err = CoreError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "s3" => Ok(StorageBackend::S3),
            "local" => Ok(StorageBackend::Local),
            "memory" => Ok(StorageBackend::Memory),
            _ => Err(CoreError::Validation(format!(
                "Invalid storage backend: {}",
                s
            ))),
        }
    }
}

impl Display for StorageBackend {
    fn fmt(&self, f: &mut Formatter<'_>) -> FmtResult {
        match self {
            StorageBackend::S3 => write!(f, "s3"),
            StorageBackend::Local => write!(f, "local"),
            StorageBackend::Memory => write!(f, "memory"),
        }
    }
}
