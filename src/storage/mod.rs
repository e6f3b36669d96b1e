//! Image uploads.
//!
//! Product and design images are stored under `{user_id}/{uuid}.{ext}` in
//! either the platform's object storage or, for development, a local
//! directory served under `/uploads`.

use async_trait::async_trait;
use thiserror::Error;
use uuid::Uuid;

pub mod local;
pub mod platform;

pub use local::LocalStore;
pub use platform::PlatformStore;

#[derive(Debug, Error)]
pub enum StorageError {
    #[error("no file field in upload")]
    MissingFile,

    #[error("malformed upload: {0}")]
    Multipart(String),

    #[error("unsupported file type: {0}")]
    UnsupportedType(String),

    #[error("file exceeds the {limit} byte limit")]
    TooLarge { limit: usize },

    #[error("storage I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// HTTP request failed.
    #[error("storage request failed: {0}")]
    Request(String),

    #[error("storage backend error ({status}): {message}")]
    Backend { status: u16, message: String },
}

/// Accepted image formats.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ImageKind {
    Jpeg,
    Png,
    Webp,
    Gif,
}

impl ImageKind {
    pub fn from_content_type(content_type: &str) -> Result<Self, StorageError> {
        let essence = content_type.split(';').next().unwrap_or_default().trim().to_ascii_lowercase();
        match essence.as_str() {
            "image/jpeg" | "image/jpg" => Ok(Self::Jpeg),
            "image/png" => Ok(Self::Png),
            "image/webp" => Ok(Self::Webp),
            "image/gif" => Ok(Self::Gif),
            _ => Err(StorageError::UnsupportedType(content_type.to_string())),
        }
    }

    /// Whether the first bytes carry this format's signature.
    pub fn matches(self, bytes: &[u8]) -> bool {
        match self {
            Self::Jpeg => bytes.starts_with(&[0xFF, 0xD8, 0xFF]),
            Self::Png => bytes.starts_with(b"\x89PNG\r\n\x1a\n"),
            Self::Webp => bytes.len() >= 12 && &bytes[..4] == b"RIFF" && &bytes[8..12] == b"WEBP",
            Self::Gif => bytes.starts_with(b"GIF87a") || bytes.starts_with(b"GIF89a"),
        }
    }

    pub fn extension(self) -> &'static str {
        match self {
            Self::Jpeg => "jpg",
            Self::Png => "png",
            Self::Webp => "webp",
            Self::Gif => "gif",
        }
    }

    pub fn content_type(self) -> &'static str {
        match self {
            Self::Jpeg => "image/jpeg",
            Self::Png => "image/png",
            Self::Webp => "image/webp",
            Self::Gif => "image/gif",
        }
    }
}

/// Object key for a new upload.
pub fn object_key(user_id: Uuid, kind: ImageKind) -> String {
    format!("{user_id}/{}.{}", Uuid::new_v4(), kind.extension())
}

#[async_trait]
pub trait BlobStore: Send + Sync {
    /// Stores `bytes` under `key` and returns the public URL.
    async fn put(&self, key: &str, kind: ImageKind, bytes: Vec<u8>) -> Result<String, StorageError>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_content_types() {
        assert_eq!(ImageKind::from_content_type("image/png").unwrap(), ImageKind::Png);
        assert_eq!(ImageKind::from_content_type("IMAGE/JPEG; charset=binary").unwrap(), ImageKind::Jpeg);
        assert!(matches!(ImageKind::from_content_type("image/svg+xml"), Err(StorageError::UnsupportedType(_))));
        assert!(ImageKind::from_content_type("application/pdf").is_err());
    }

    #[test]
    fn test_signatures() {
        assert!(ImageKind::Png.matches(b"\x89PNG\r\n\x1a\n...."));
        assert!(ImageKind::Webp.matches(b"RIFF\x00\x00\x00\x00WEBPVP8 "));
        assert!(ImageKind::Gif.matches(b"GIF89a"));
        assert!(!ImageKind::Jpeg.matches(b"<svg"));
    }

    #[test]
    fn test_object_key_layout() {
        let user = Uuid::new_v4();
        let key = object_key(user, ImageKind::Webp);
        let (prefix, file) = key.split_once('/').unwrap();
        assert_eq!(prefix, user.to_string());
        assert!(file.ends_with(".webp"));
        assert!(Uuid::parse_str(file.trim_end_matches(".webp")).is_ok());
    }
}
