//! Content type guessing from file extensions
//!
//! Backends that cannot store a content type alongside the object (the local
//! filesystem, S3 `HEAD` through `object_store`) report the type implied by
//! the key's extension instead.

pub const OCTET_STREAM: &str = "application/octet-stream";

/// MIME type for a key's extension, `application/octet-stream` when unknown
pub fn guess_from_key(key: &str) -> &'static str {
    mime_guess::from_path(key).first_raw().unwrap_or(OCTET_STREAM)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_guess() {
        assert_eq!(guess_from_key("a/b/photo.JPG"), "image/jpeg");
        assert_eq!(guess_from_key("clip.mov"), "video/quicktime");
        assert_eq!(guess_from_key("dir/report.pdf"), "application/pdf");
        assert_eq!(guess_from_key("dir.png/noext"), OCTET_STREAM);
        assert_eq!(guess_from_key(".png"), OCTET_STREAM);
    }

    #[test]
    fn test_less_common_media_types() {
        assert_eq!(guess_from_key("vector/logo.svg"), "image/svg+xml");
        assert!(guess_from_key("phone/clip.3gp").starts_with("video/"));
        assert!(guess_from_key("clip.ogv").starts_with("video/"));
    }
}
