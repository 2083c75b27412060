//! Shared key validation for storage backends.
//!
//! Keys are relative object paths inside a bucket. They must not be empty,
//! contain `..` or start with `/`. Bucket names are a single path segment.

use crate::traits::{StorageError, StorageResult};
use stowage_core::FileDescriptor;

/// Validate a descriptor's bucket and key
pub fn validate(descriptor: &FileDescriptor) -> StorageResult<()> {
    validate_bucket(&descriptor.bucket)?;
    validate_key(&descriptor.key)
}

pub fn validate_bucket(bucket: &str) -> StorageResult<()> {
    if bucket.is_empty() || bucket.contains('/') || bucket.contains("..") {
        return Err(StorageError::InvalidKey(format!(
            "Invalid bucket name: '{}'",
            bucket
        )));
    }
    Ok(())
}

pub fn validate_key(key: &str) -> StorageResult<()> {
    if key.is_empty() || key.ends_with('/') {
        return Err(StorageError::InvalidKey(format!("Empty object key: '{}'", key)));
    }
    if key.contains("..") || key.starts_with('/') || key.contains('\\') {
        return Err(StorageError::InvalidKey(
            "Storage key contains invalid characters".to_string(),
        ));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_valid_keys() {
        assert!(validate(&FileDescriptor::new("media", "a/b/c.png")).is_ok());
        assert!(validate(&FileDescriptor::new("media", "c.png")).is_ok());
    }

    #[test]
    fn test_invalid_keys() {
        for key in ["", "/etc/passwd", "../x", "a/../../b", "dir/", "a\\b"] {
            assert!(
                matches!(validate_key(key), Err(StorageError::InvalidKey(_))),
                "{key} should be rejected"
            );
        }
    }

    #[test]
    fn test_invalid_buckets() {
        for bucket in ["", "a/b", ".."] {
            assert!(validate_bucket(bucket).is_err(), "{bucket} should be rejected");
        }
    }
}
