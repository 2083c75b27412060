//! Coarse media classification

use std::fmt::{Display, Formatter, Result as FmtResult};

use mime_guess::mime;
use stowage_core::FileDescriptor;

/// What kind of thumbnail renderer a file needs
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum MediaClass {
    Image,
    Video,
    Document,
    Other,
}

const DOCUMENT_MIME_MARKERS: [&str; 7] = [
    "pdf",
    "msword",
    "officedocument",
    "opendocument",
    "ms-excel",
    "ms-powerpoint",
    "rtf",
];

const DOCUMENT_EXTENSIONS: [&str; 11] = [
    "pdf", "doc", "docx", "xls", "xlsx", "ppt", "pptx", "odt", "ods", "odp", "rtf",
];

impl MediaClass {
    /// Classify by content type when present, else by extension
    pub fn of(descriptor: &FileDescriptor) -> Self {
        match descriptor.content_type.as_deref() {
            Some(content_type) if !content_type.trim().is_empty() => {
                Self::from_content_type(content_type)
            }
            _ => descriptor
                .extension()
                .map(|ext| Self::from_extension(&ext))
                .unwrap_or(MediaClass::Other),
        }
    }

    pub fn from_content_type(content_type: &str) -> Self {
        let content_type = content_type.trim().to_lowercase();

        if content_type.starts_with("image/") {
            MediaClass::Image
        } else if content_type.starts_with("video/") {
            MediaClass::Video
        } else if DOCUMENT_MIME_MARKERS
            .iter()
            .any(|marker| content_type.contains(marker))
        {
            MediaClass::Document
        } else {
            MediaClass::Other
        }
    }

    /// Documents by the fixed extension list, images and video by the
    /// top-level type of the MIME type guessed for the extension
    pub fn from_extension(extension: &str) -> Self {
        let extension = extension.trim_start_matches('.').to_lowercase();

        if DOCUMENT_EXTENSIONS.contains(&extension.as_str()) {
            return MediaClass::Document;
        }

        match mime_guess::from_ext(&extension).first() {
            Some(guessed) if guessed.type_() == mime::IMAGE => MediaClass::Image,
            Some(guessed) if guessed.type_() == mime::VIDEO => MediaClass::Video,
            _ => MediaClass::Other,
        }
    }

    pub fn is_thumbnailable(&self) -> bool {
        !matches!(self, MediaClass::Other)
    }
}

impl Display for MediaClass {
    fn fmt(&self, f: &mut Formatter<'_>) -> FmtResult {
        match self {
            MediaClass::Image => write!(f, "image"),
            MediaClass::Video => write!(f, "video"),
            MediaClass::Document => write!(f, "document"),
            MediaClass::Other => write!(f, "other"),
        }
    }
}
